use std::sync::Arc;

use lexicon_types::{Entry, Origin, TranslationCandidate, dedup_candidates};
use tracing::{debug, warn};

use crate::similarity::{SimilarityError, SimilarityScorer};

/// Outcome of scoring one candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Verdict {
    Accepted(f32),
    Rejected(f32),
    /// The scorer failed; treated as a rejection.
    Unscored,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }
}

/// Counters from merging one entry's candidates.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MergeStats {
    pub accepted: usize,
    pub rejected: usize,
    pub duplicates: usize,
}

/// Drops bridged candidates that do not fit the sense they were found for.
#[derive(Clone)]
pub struct SemanticFilter {
    scorer: Arc<dyn SimilarityScorer>,
    threshold: f32,
}

impl SemanticFilter {
    pub fn new(scorer: Arc<dyn SimilarityScorer>, threshold: f32) -> Self {
        Self { scorer, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Similarity of `candidate` to the sense gloss.
    ///
    /// The similarity to `original_word` is computed and logged but does not
    /// take part in the decision.
    pub async fn score(
        &self,
        original_word: &str,
        gloss: &str,
        candidate: &str,
    ) -> Result<f32, SimilarityError> {
        match self.scorer.similarity(original_word, candidate).await {
            Ok(word_score) => {
                debug!("word similarity {original_word}/{candidate}: {word_score:.3}")
            }
            Err(err) => debug!("word similarity {original_word}/{candidate} unavailable: {err}"),
        }
        self.scorer.similarity(candidate, gloss).await
    }

    pub async fn judge(&self, original_word: &str, gloss: &str, candidate: &str) -> Verdict {
        match self.score(original_word, gloss, candidate).await {
            Ok(score) if score >= self.threshold => Verdict::Accepted(score),
            Ok(score) => Verdict::Rejected(score),
            Err(err) => {
                warn!("rejecting `{candidate}` for `{original_word}`: similarity failed: {err}");
                Verdict::Unscored
            }
        }
    }

    /// Score bridged candidates against their senses and append the accepted
    /// ones to `entry`.
    pub async fn merge(
        &self,
        entry: &mut Entry,
        target_lang: &str,
        candidates: Vec<TranslationCandidate>,
    ) -> MergeStats {
        let mut stats = MergeStats::default();
        for candidate in dedup_candidates(candidates) {
            if candidate.origin != Origin::Bridged || candidate.language != target_lang {
                continue;
            }
            let Some(sense) = entry.sense(&candidate.sense) else {
                continue;
            };
            if sense.has_translation(target_lang, &candidate.word) {
                stats.duplicates += 1;
                continue;
            }
            let gloss = sense.gloss.source.clone();

            match self.judge(&entry.word, &gloss, &candidate.word).await {
                Verdict::Accepted(score) => {
                    debug!(
                        "accepted `{}` for {}#{} ({score:.3})",
                        candidate.word, entry.word, candidate.sense
                    );
                    if let Some(sense) = entry.sense_mut(&candidate.sense) {
                        sense.push_bridged(target_lang, &candidate.word);
                    }
                    stats.accepted += 1;
                }
                Verdict::Rejected(score) => {
                    debug!(
                        "rejected `{}` for {}#{} ({score:.3} < {})",
                        candidate.word, entry.word, candidate.sense, self.threshold
                    );
                    stats.rejected += 1;
                }
                Verdict::Unscored => stats.rejected += 1,
            }
        }
        stats
    }
}
