use std::fmt;
use std::sync::Arc;

use lexicon_db::{Lexicon, StoreError};
use lexicon_types::{Entry, EntrySet, TranslationCandidate, dedup_candidates};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::BridgeResolver;
use crate::config::EnrichConfig;
use crate::filter::{MergeStats, SemanticFilter};
use crate::normalize::{NormalizeParams, normalize};
use crate::similarity::SimilarityScorer;
use crate::translate::{BackendChoice, Backends, ProviderError, ReinsertError, collect, reinsert};

/// A query as sent by clients.
///
/// `lang` and `tl_model` are accepted as aliases of `source_lang` and
/// `backend`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QueryRequest {
    pub word: String,
    #[serde(alias = "lang")]
    pub source_lang: String,
    pub target_lang: String,
    #[serde(default, alias = "tl_model")]
    pub backend: BackendChoice,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Fetching,
    Collecting,
    Translating,
    Reinserting,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Pending => "pending",
            JobState::Fetching => "fetching",
            JobState::Collecting => "collecting",
            JobState::Translating => "translating",
            JobState::Reinserting => "reinserting",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        })
    }
}

/// Human-readable progress for one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub state: JobState,
    pub message: String,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl ProgressSink for () {
    fn emit(&self, _event: ProgressEvent) {}
}

impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // A closed receiver means nobody is listening any more.
        let _ = self.send(event);
    }
}

#[derive(Debug, Error)]
pub enum JobErrorKind {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Lookup(#[from] StoreError),
    #[error(transparent)]
    Translation(#[from] ProviderError),
    #[error(transparent)]
    Reinsert(#[from] ReinsertError),
    #[error("worker failed: {0}")]
    Worker(String),
}

impl JobErrorKind {
    /// Whether the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            JobErrorKind::InvalidRequest(_) | JobErrorKind::Lookup(StoreError::UnknownLanguage(_))
        )
    }
}

/// A failed job: the stage it failed in and why.
#[derive(Debug, Error)]
#[error("query failed while {stage}: {kind}")]
pub struct JobError {
    pub stage: JobState,
    pub kind: JobErrorKind,
}

#[derive(Debug)]
pub enum QueryOutcome {
    Completed(EntrySet),
    Cancelled,
}

/// Per-request job state.
#[derive(Clone, Debug)]
pub struct QueryJob {
    pub state: JobState,
    pub word: String,
    pub source_lang: String,
    pub target_lang: String,
    pub backend: BackendChoice,
}

impl QueryJob {
    pub fn new(request: &QueryRequest) -> Self {
        Self {
            state: JobState::Pending,
            word: request.word.trim().to_lowercase(),
            source_lang: request.source_lang.trim().to_string(),
            target_lang: request.target_lang.trim().to_string(),
            backend: request.backend,
        }
    }

    /// Move to `next` unless cancellation was requested.
    fn advance(
        &mut self,
        next: JobState,
        message: String,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        debug!("query `{}`: {} -> {next}", self.word, self.state);
        self.state = next;
        progress.emit(ProgressEvent {
            state: next,
            message,
        });
        true
    }

    fn cancel(&mut self) -> QueryOutcome {
        info!("query `{}` cancelled while {}", self.word, self.state);
        self.state = JobState::Cancelled;
        QueryOutcome::Cancelled
    }

    fn fail(&mut self, kind: JobErrorKind) -> JobError {
        let stage = self.state;
        warn!("query `{}` failed while {stage}: {kind}", self.word);
        self.state = JobState::Failed;
        JobError { stage, kind }
    }
}

/// Runs query jobs against shared, read-only services.
pub struct Orchestrator {
    lexicon: Arc<Lexicon>,
    filter: SemanticFilter,
    backends: Backends,
    config: EnrichConfig,
}

impl Orchestrator {
    /// Bridged candidates are scored by `scorer` against
    /// `config.similarity_threshold`.
    pub fn new(
        lexicon: Arc<Lexicon>,
        scorer: Arc<dyn SimilarityScorer>,
        backends: Backends,
        config: EnrichConfig,
    ) -> Self {
        Self {
            lexicon,
            filter: SemanticFilter::new(scorer, config.similarity_threshold),
            backends,
            config,
        }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn filter(&self) -> &SemanticFilter {
        &self.filter
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }

    /// Resolve, enrich and translate one word.
    ///
    /// Cancellation is honoured between stages and while waiting on the
    /// corpus, the similarity backend or the translation backend. A
    /// cancelled job never writes translations into its result.
    pub async fn run(
        &self,
        request: QueryRequest,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<QueryOutcome, JobError> {
        let mut job = QueryJob::new(&request);
        progress.emit(ProgressEvent {
            state: JobState::Pending,
            message: format!("Querying for word: {}", request.word.trim()),
        });
        self.validate(&job).map_err(|kind| job.fail(kind))?;
        let source = job.source_lang.clone();
        let target = job.target_lang.clone();

        if !job.advance(JobState::Fetching, "Fetching word data".to_string(), cancel, progress) {
            return Ok(job.cancel());
        }
        let lexicon = Arc::clone(&self.lexicon);
        let params = FetchParams {
            word: job.word.clone(),
            source_lang: source.clone(),
            target_lang: target.clone(),
            bridge_lang: self.config.bridge_lang.clone(),
        };
        let lookup = tokio::task::spawn_blocking(move || fetch(&lexicon, &params));
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(job.cancel()),
            joined = lookup => joined
                .map_err(|e| job.fail(JobErrorKind::Worker(e.to_string())))?
                .map_err(|e| job.fail(e.into()))?,
        };

        let mut set = EntrySet::new(job.word.clone(), source.clone(), target.clone());
        let merged = async {
            let mut totals = MergeStats::default();
            for Fetched { mut entry, candidates } in fetched {
                if !candidates.is_empty() {
                    let stats = self.filter.merge(&mut entry, &target, candidates).await;
                    totals.accepted += stats.accepted;
                    totals.rejected += stats.rejected;
                    totals.duplicates += stats.duplicates;
                }
                set.entries.push(entry);
            }
            totals
        };
        let totals = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(job.cancel()),
            totals = merged => totals,
        };
        debug!(
            "query `{}`: {} entries, bridged candidates {} accepted / {} rejected",
            job.word,
            set.entries.len(),
            totals.accepted,
            totals.rejected
        );

        if !job.advance(
            JobState::Collecting,
            "Collecting translatable text".to_string(),
            cancel,
            progress,
        ) {
            return Ok(job.cancel());
        }
        let batch = collect(&set);

        if !job.advance(
            JobState::Translating,
            format!("Translating entries using {} model", job.backend),
            cancel,
            progress,
        ) {
            return Ok(job.cancel());
        }
        let chain = self.backends.chain_for(job.backend);
        let texts = batch.texts();
        let translated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(job.cancel()),
            result = chain.translate(&texts, &source, &target) => {
                result.map_err(|e| job.fail(e.into()))?
            }
        };

        if !job.advance(
            JobState::Reinserting,
            "Inserting translations".to_string(),
            cancel,
            progress,
        ) {
            return Ok(job.cancel());
        }
        let written = reinsert(&mut set, &batch, translated).map_err(|e| job.fail(e.into()))?;

        job.state = JobState::Completed;
        info!(
            "query `{}` {source}->{target}: {} entries, {written} texts translated",
            job.word,
            set.entries.len()
        );
        Ok(QueryOutcome::Completed(set))
    }

    fn validate(&self, job: &QueryJob) -> Result<(), JobErrorKind> {
        if job.word.is_empty() {
            return Err(JobErrorKind::InvalidRequest("word must not be empty".into()));
        }
        if job.target_lang.is_empty() {
            return Err(JobErrorKind::InvalidRequest(
                "target_lang must not be empty".into(),
            ));
        }
        if !self.lexicon.has_language(&job.source_lang) {
            return Err(JobErrorKind::InvalidRequest(format!(
                "unknown source language `{}`",
                job.source_lang
            )));
        }
        Ok(())
    }
}

struct FetchParams {
    word: String,
    source_lang: String,
    target_lang: String,
    bridge_lang: String,
}

struct Fetched {
    entry: Entry,
    candidates: Vec<TranslationCandidate>,
}

/// Lookup, normalization and bridge resolution; blocking corpus I/O.
fn fetch(lexicon: &Lexicon, params: &FetchParams) -> Result<Vec<Fetched>, StoreError> {
    let records = lexicon.records(&params.source_lang, &params.word)?;
    let normalized = normalize(
        &records,
        &NormalizeParams {
            source_lang: &params.source_lang,
            target_lang: &params.target_lang,
            bridge_lang: &params.bridge_lang,
        },
    );

    let mut resolver = BridgeResolver::new(lexicon, &params.bridge_lang, &params.target_lang);
    let bridging = resolver.available();
    if !bridging && normalized.iter().any(|n| !n.bridge_words.is_empty()) {
        warn!(
            "no `{}` corpus loaded; skipping bridge resolution for `{}`",
            params.bridge_lang, params.word
        );
    }

    let mut out = Vec::with_capacity(normalized.len());
    for item in normalized {
        let mut candidates = Vec::new();
        if bridging {
            for (sense, bridge_word) in &item.bridge_words {
                candidates.extend(resolver.resolve(sense, bridge_word)?);
            }
        }
        out.push(Fetched {
            entry: item.entry,
            candidates: dedup_candidates(candidates),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_client_field_names() {
        let request: QueryRequest = serde_json::from_str(
            r#"{"word": "Haus", "lang": "de", "target_lang": "ko", "tl_model": "DeepL"}"#,
        )
        .unwrap();
        assert_eq!(request.source_lang, "de");
        assert_eq!(request.backend, BackendChoice::Deepl);

        let request: QueryRequest =
            serde_json::from_str(r#"{"word": "Haus", "source_lang": "de", "target_lang": "ko"}"#)
                .unwrap();
        assert_eq!(request.backend, BackendChoice::Nllb);
    }

    #[test]
    fn job_lowercases_the_word() {
        let job = QueryJob::new(&QueryRequest {
            word: "  HAUS ".into(),
            source_lang: "de".into(),
            target_lang: "ko".into(),
            backend: BackendChoice::Nllb,
        });
        assert_eq!(job.word, "haus");
        assert_eq!(job.state, JobState::Pending);
        assert!(!job.state.is_terminal());
    }

    #[test]
    fn client_errors_are_classified() {
        assert!(JobErrorKind::InvalidRequest("x".into()).is_client_error());
        assert!(JobErrorKind::Lookup(StoreError::UnknownLanguage("fr".into())).is_client_error());
        assert!(!JobErrorKind::Translation(ProviderError::RateLimited).is_client_error());
    }
}
