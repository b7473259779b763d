use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lexicon_db::{CorpusStore, Lexicon, LoadMode, OffsetIndex, corpus_file_name};
use lexicon_enrich::{
    BackendChoice, Backends, EnrichConfig, JobErrorKind, JobState, Orchestrator, ProgressEvent,
    ProgressSink, ProviderError, QueryOutcome, QueryRequest, SimilarityError, SimilarityScorer,
    TranslationProvider,
};
use tokio_util::sync::CancellationToken;

const DE: &str = concat!(
    r#"{"word": "Haus", "lang_code": "de", "pos": "noun", "senses": [{"sense_index": "1", "glosses": ["Gebäude, in dem Menschen wohnen"], "examples": [{"text": "Das Haus ist alt."}]}], "translations": [{"word": "house", "lang_code": "en", "sense_index": "1"}]}"#,
    "\n",
    r#"{"word": "Baum", "lang_code": "de", "pos": "noun", "senses": [{"glosses": ["Holzgewächs"]}]}"#,
    "\n",
);

const EN: &str = concat!(
    r#"{"word": "house", "lang_code": "en", "pos": "noun", "translations": [{"word": "집", "code": "ko"}, {"word": "maison", "code": "fr"}]}"#,
    "\n",
);

fn write_corpus(dir: &Path, lang: &str, body: &str) {
    fs::write(dir.join(corpus_file_name(lang)), body).unwrap();
}

fn lexicon(dir: &Path) -> Arc<Lexicon> {
    write_corpus(dir, "de", DE);
    write_corpus(dir, "en", EN);
    let mut index = OffsetIndex::new();
    let mut store = CorpusStore::new(LoadMode::Handle);
    for lang in ["de", "en"] {
        let path = dir.join(corpus_file_name(lang));
        index.build(&path, lang).unwrap();
        store.register(lang, path, None);
    }
    Arc::new(Lexicon::new(index, store))
}

struct FixedScorer(f32);

#[async_trait]
impl SimilarityScorer for FixedScorer {
    async fn similarity(&self, _a: &str, _b: &str) -> Result<f32, SimilarityError> {
        Ok(self.0)
    }
}

struct FakeProvider {
    name: &'static str,
    failure: Option<ProviderError>,
    calls: AtomicUsize,
}

impl FakeProvider {
    fn echo(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            failure: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(name: &'static str, err: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            name,
            failure: Some(err),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for FakeProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn translate(
        &self,
        texts: &[String],
        _source: &str,
        target: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(texts.iter().map(|t| format!("{target}:{t}")).collect())
    }
}

/// Records every event; cancels the token once `cancel_at` is reached.
struct Recorder {
    events: Mutex<Vec<ProgressEvent>>,
    cancel_at: Option<(JobState, CancellationToken)>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel_at: None,
        }
    }

    fn states(&self) -> Vec<JobState> {
        self.events.lock().unwrap().iter().map(|e| e.state).collect()
    }

    fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }
}

impl ProgressSink for Recorder {
    fn emit(&self, event: ProgressEvent) {
        if let Some((state, token)) = &self.cancel_at
            && *state == event.state
        {
            token.cancel();
        }
        self.events.lock().unwrap().push(event);
    }
}

fn orchestrator(lexicon: Arc<Lexicon>, score: f32, backends: Backends) -> Orchestrator {
    Orchestrator::new(
        lexicon,
        Arc::new(FixedScorer(score)),
        backends,
        EnrichConfig::default(),
    )
}

fn request(word: &str, backend: BackendChoice) -> QueryRequest {
    QueryRequest {
        word: word.into(),
        source_lang: "de".into(),
        target_lang: "ko".into(),
        backend,
    }
}

#[tokio::test]
async fn bridged_candidate_is_accepted_and_text_translated() {
    let dir = tempfile::tempdir().unwrap();
    let nllb = FakeProvider::echo("nllb");
    let orch = orchestrator(
        lexicon(dir.path()),
        0.8,
        Backends::new().with(BackendChoice::Nllb, nllb.clone()),
    );
    let progress = Recorder::new();

    let outcome = orch
        .run(request("Haus", BackendChoice::Nllb), &CancellationToken::new(), &progress)
        .await
        .unwrap();
    let QueryOutcome::Completed(set) = outcome else {
        panic!("expected a result");
    };

    assert_eq!(set.word, "haus");
    assert_eq!(set.entries.len(), 1);
    let sense = &set.entries[0].senses[0];
    assert_eq!(sense.direct["en"], vec!["house"]);
    assert!(sense.direct["ko"].is_empty());
    assert_eq!(sense.bridged, vec!["집"]);
    assert_eq!(sense.gloss.source, "Gebäude, in dem Menschen wohnen");
    assert_eq!(sense.gloss.target, "ko:Gebäude, in dem Menschen wohnen");
    assert_eq!(sense.examples[0].target, "ko:Das Haus ist alt.");
    assert_eq!(nllb.calls(), 1);

    assert_eq!(
        progress.messages(),
        [
            "Querying for word: Haus",
            "Fetching word data",
            "Collecting translatable text",
            "Translating entries using NLLB model",
            "Inserting translations",
        ]
    );

    let json = serde_json::to_value(&set).unwrap();
    let offset = set.entries[0].id.to_string();
    assert_eq!(json["entries"][&offset]["senses"]["1"]["bridged"][0], "집");
}

#[tokio::test]
async fn low_similarity_rejects_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        lexicon(dir.path()),
        0.1,
        Backends::new().with(BackendChoice::Nllb, FakeProvider::echo("nllb")),
    );
    let outcome = orch
        .run(request("haus", BackendChoice::Nllb), &CancellationToken::new(), &())
        .await
        .unwrap();
    let QueryOutcome::Completed(set) = outcome else {
        panic!("expected a result");
    };
    assert!(set.entries[0].senses[0].bridged.is_empty());
    assert_eq!(set.entries[0].senses[0].direct["en"], vec!["house"]);
}

#[tokio::test]
async fn unknown_word_yields_an_empty_set_without_translating() {
    let dir = tempfile::tempdir().unwrap();
    let nllb = FakeProvider::echo("nllb");
    let orch = orchestrator(
        lexicon(dir.path()),
        0.8,
        Backends::new().with(BackendChoice::Nllb, nllb.clone()),
    );
    let outcome = orch
        .run(request("Katze", BackendChoice::Nllb), &CancellationToken::new(), &())
        .await
        .unwrap();
    assert!(matches!(outcome, QueryOutcome::Completed(set) if set.is_empty()));
    assert_eq!(nllb.calls(), 0);
}

#[tokio::test]
async fn cancellation_after_fetching_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let lexicon = lexicon(dir.path());
    let corpus_before = fs::read(dir.path().join("de_dict.jsonl")).unwrap();
    let nllb = FakeProvider::echo("nllb");
    let orch = orchestrator(
        lexicon,
        0.8,
        Backends::new().with(BackendChoice::Nllb, nllb.clone()),
    );
    let token = CancellationToken::new();
    let progress = Recorder {
        events: Mutex::new(Vec::new()),
        cancel_at: Some((JobState::Collecting, token.clone())),
    };

    let outcome = orch
        .run(request("Haus", BackendChoice::Nllb), &token, &progress)
        .await
        .unwrap();
    assert!(matches!(outcome, QueryOutcome::Cancelled));
    assert_eq!(nllb.calls(), 0);
    assert_eq!(
        progress.states(),
        [JobState::Pending, JobState::Fetching, JobState::Collecting]
    );
    assert_eq!(
        fs::read(dir.path().join("de_dict.jsonl")).unwrap(),
        corpus_before
    );
}

#[tokio::test]
async fn cancelled_before_start_never_fetches() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(lexicon(dir.path()), 0.8, Backends::new());
    let token = CancellationToken::new();
    token.cancel();
    let progress = Recorder::new();
    let outcome = orch
        .run(request("Haus", BackendChoice::Nllb), &token, &progress)
        .await
        .unwrap();
    assert!(matches!(outcome, QueryOutcome::Cancelled));
    assert_eq!(progress.states(), [JobState::Pending]);
}

#[tokio::test]
async fn falls_back_to_nllb_on_rate_limit_and_bad_json() {
    for (choice, failure) in [
        (BackendChoice::Deepseek, ProviderError::RateLimited),
        (
            BackendChoice::Deepl,
            ProviderError::InvalidResponse("reply holds no JSON array".into()),
        ),
    ] {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeProvider::failing("remote", failure);
        let nllb = FakeProvider::echo("nllb");
        let orch = orchestrator(
            lexicon(dir.path()),
            0.8,
            Backends::new()
                .with(choice, remote.clone())
                .with(BackendChoice::Nllb, nllb.clone()),
        );
        let outcome = orch
            .run(request("Haus", choice), &CancellationToken::new(), &())
            .await
            .unwrap();
        let QueryOutcome::Completed(set) = outcome else {
            panic!("expected a result");
        };
        assert_eq!(set.entries[0].senses[0].gloss.target, "ko:Gebäude, in dem Menschen wohnen");
        assert_eq!((remote.calls(), nllb.calls()), (1, 1));
    }
}

#[tokio::test]
async fn exhausted_chain_fails_while_translating() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        lexicon(dir.path()),
        0.8,
        Backends::new()
            .with(BackendChoice::Deepl, FakeProvider::failing("deepl", ProviderError::RateLimited))
            .with(
                BackendChoice::Nllb,
                FakeProvider::failing("nllb", ProviderError::Unavailable("down".into())),
            ),
    );
    let err = orch
        .run(request("Haus", BackendChoice::Deepl), &CancellationToken::new(), &())
        .await
        .unwrap_err();
    assert_eq!(err.stage, JobState::Translating);
    assert!(matches!(
        err.kind,
        JobErrorKind::Translation(ProviderError::Unavailable(_))
    ));
}

#[tokio::test]
async fn invalid_requests_fail_before_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(lexicon(dir.path()), 0.8, Backends::new());

    let mut unknown = request("Haus", BackendChoice::Nllb);
    unknown.source_lang = "fr".into();
    let err = orch
        .run(unknown, &CancellationToken::new(), &())
        .await
        .unwrap_err();
    assert_eq!(err.stage, JobState::Pending);
    assert!(err.kind.is_client_error());

    let err = orch
        .run(request("   ", BackendChoice::Nllb), &CancellationToken::new(), &())
        .await
        .unwrap_err();
    assert!(matches!(err.kind, JobErrorKind::InvalidRequest(_)));
}

#[tokio::test]
async fn missing_bridge_corpus_skips_bridging() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), "de", DE);
    let path = dir.path().join(corpus_file_name("de"));
    let mut index = OffsetIndex::new();
    index.build(&path, "de").unwrap();
    let mut store = CorpusStore::new(LoadMode::Mmap);
    store.register("de", path, None);
    let orch = orchestrator(
        Arc::new(Lexicon::new(index, store)),
        0.8,
        Backends::new().with(BackendChoice::Nllb, FakeProvider::echo("nllb")),
    );

    let outcome = orch
        .run(request("Haus", BackendChoice::Nllb), &CancellationToken::new(), &())
        .await
        .unwrap();
    let QueryOutcome::Completed(set) = outcome else {
        panic!("expected a result");
    };
    assert!(set.entries[0].senses[0].bridged.is_empty());
}

#[tokio::test]
async fn configured_threshold_decides_bridged_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let config = EnrichConfig {
        similarity_threshold: 0.6,
        ..EnrichConfig::default()
    };
    let orch = Orchestrator::new(
        lexicon(dir.path()),
        Arc::new(FixedScorer(0.5)),
        Backends::new().with(BackendChoice::Nllb, FakeProvider::echo("nllb")),
        config,
    );
    assert_eq!(orch.filter().threshold(), 0.6);

    let outcome = orch
        .run(request("Haus", BackendChoice::Nllb), &CancellationToken::new(), &())
        .await
        .unwrap();
    let QueryOutcome::Completed(set) = outcome else {
        panic!("expected a result");
    };
    assert!(set.entries[0].senses[0].bridged.is_empty());
}
