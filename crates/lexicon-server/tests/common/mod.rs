use std::sync::Arc;

use async_trait::async_trait;
use lexicon_db::{CorpusStore, Lexicon, LoadMode, OffsetIndex, corpus_file_name};
use lexicon_enrich::{
    BackendChoice, Backends, EnrichConfig, Orchestrator, ProviderError, SimilarityError,
    SimilarityScorer, TranslationProvider,
};
use tempfile::TempDir;

use lexicon_server::handlers::AppState;

const DE: &str = concat!(
    r#"{"word": "Haus", "lang_code": "de", "pos": "noun", "senses": [{"sense_index": "1", "glosses": ["Gebäude"]}], "translations": [{"word": "house", "lang_code": "en", "sense_index": "1"}]}"#,
    "\n"
);
const EN: &str = concat!(
    r#"{"word": "house", "lang_code": "en", "translations": [{"word": "집", "code": "ko"}]}"#,
    "\n"
);

struct Always(f32);

#[async_trait]
impl SimilarityScorer for Always {
    async fn similarity(&self, _a: &str, _b: &str) -> Result<f32, SimilarityError> {
        Ok(self.0)
    }
}

/// Answers `[<target>] <text>`, or fails with the given error.
pub struct Prefixing(pub Option<ProviderError>);

#[async_trait]
impl TranslationProvider for Prefixing {
    fn name(&self) -> &str {
        "test"
    }

    async fn translate(
        &self,
        texts: &[String],
        _source: &str,
        target: &str,
    ) -> Result<Vec<String>, ProviderError> {
        match &self.0 {
            Some(err) => Err(err.clone()),
            None => Ok(texts.iter().map(|t| format!("[{target}] {t}")).collect()),
        }
    }
}

/// Service state over a de/en fixture corpus, translating with `provider`.
/// The returned directory must outlive the state.
pub fn app_state(provider: Arc<dyn TranslationProvider>) -> (AppState, TempDir) {
    let tempdir = tempfile::tempdir().unwrap();
    let mut index = OffsetIndex::new();
    let mut store = CorpusStore::new(LoadMode::Mmap);
    for (lang, body) in [("de", DE), ("en", EN)] {
        let path = tempdir.path().join(corpus_file_name(lang));
        std::fs::write(&path, body).unwrap();
        index.build(&path, lang).unwrap();
        store.register(lang, path, None);
    }
    let orchestrator = Orchestrator::new(
        Arc::new(Lexicon::new(index, store)),
        Arc::new(Always(0.9)),
        Backends::new().with(BackendChoice::Nllb, provider),
        EnrichConfig::default(),
    );
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };
    (state, tempdir)
}
