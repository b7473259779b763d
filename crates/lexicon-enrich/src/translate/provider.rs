use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProviderError {
    #[error("rate limited")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

/// A machine translation backend.
///
/// Output must have the same length and order as `texts`.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Providers tried in order until one succeeds.
#[derive(Clone, Default)]
pub struct FallbackChain {
    providers: Vec<Arc<dyn TranslationProvider>>,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn TranslationProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Translate with the first provider that returns a well-formed answer.
    ///
    /// A reply with a different number of texts than was sent counts as
    /// [`ProviderError::InvalidResponse`] and moves on to the next provider,
    /// so a finished chain always hands back exactly one text per input.
    /// Fails with the last provider's error once the chain is exhausted.
    pub async fn translate(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
    ) -> Result<Vec<String>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut last = ProviderError::Unavailable("no translation provider configured".to_string());
        for provider in &self.providers {
            debug!(
                "translating {} text(s) {source}->{target} with {}",
                texts.len(),
                provider.name()
            );
            match provider.translate(texts, source, target).await {
                Ok(out) if out.len() == texts.len() => return Ok(out),
                Ok(out) => {
                    last = ProviderError::InvalidResponse(format!(
                        "{} returned {} translations for {} texts",
                        provider.name(),
                        out.len(),
                        texts.len()
                    ));
                }
                Err(err) => last = err,
            }
            warn!("{} failed ({last}); trying next provider", provider.name());
        }
        Err(last)
    }
}

/// Backend named by a query.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BackendChoice {
    #[default]
    #[serde(rename = "NLLB", alias = "nllb")]
    Nllb,
    #[serde(rename = "Deepseek", alias = "deepseek")]
    Deepseek,
    #[serde(rename = "DeepL", alias = "deepl")]
    Deepl,
}

impl fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendChoice::Nllb => "NLLB",
            BackendChoice::Deepseek => "Deepseek",
            BackendChoice::Deepl => "DeepL",
        })
    }
}

/// Configured providers, keyed by the choice that selects them.
#[derive(Clone, Default)]
pub struct Backends {
    providers: HashMap<BackendChoice, Arc<dyn TranslationProvider>>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, choice: BackendChoice, provider: Arc<dyn TranslationProvider>) -> Self {
        self.insert(choice, provider);
        self
    }

    pub fn insert(&mut self, choice: BackendChoice, provider: Arc<dyn TranslationProvider>) {
        self.providers.insert(choice, provider);
    }

    pub fn configured(&self) -> Vec<BackendChoice> {
        let mut out: Vec<_> = self.providers.keys().copied().collect();
        out.sort_by_key(|choice| choice.to_string());
        out
    }

    /// The chosen provider followed by the local NLLB fallback.
    pub fn chain_for(&self, choice: BackendChoice) -> FallbackChain {
        let mut providers = Vec::new();
        if let Some(provider) = self.providers.get(&choice) {
            providers.push(Arc::clone(provider));
        }
        if choice != BackendChoice::Nllb
            && let Some(fallback) = self.providers.get(&BackendChoice::Nllb)
        {
            providers.push(Arc::clone(fallback));
        }
        FallbackChain::new(providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fake {
        name: &'static str,
        outcome: Result<Option<usize>, ProviderError>,
        calls: AtomicUsize,
    }

    impl Fake {
        fn ok(name: &'static str) -> Arc<Self> {
            Self::with(name, Ok(None))
        }

        fn failing(name: &'static str, err: ProviderError) -> Arc<Self> {
            Self::with(name, Err(err))
        }

        fn with(name: &'static str, outcome: Result<Option<usize>, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranslationProvider for Fake {
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
            let keep = self.outcome.clone()?.unwrap_or(texts.len());
            Ok(texts
                .iter()
                .take(keep)
                .map(|t| format!("{}[{target}]{t}", self.name))
                .collect())
        }
    }

    fn texts() -> Vec<String> {
        vec!["Gebäude".into(), "Das Haus ist alt.".into()]
    }

    #[tokio::test]
    async fn empty_input_calls_nothing() {
        let provider = Fake::ok("nllb");
        let chain = FallbackChain::new(vec![provider.clone()]);
        assert_eq!(chain.translate(&[], "de", "ko").await, Ok(vec![]));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn falls_back_on_each_failure_kind() {
        for err in [
            ProviderError::RateLimited,
            ProviderError::InvalidResponse("not json".into()),
            ProviderError::Unavailable("connection refused".into()),
        ] {
            let first = Fake::failing("remote", err);
            let second = Fake::ok("nllb");
            let chain = FallbackChain::new(vec![first.clone(), second.clone()]);
            let out = chain.translate(&texts(), "de", "ko").await.unwrap();
            assert_eq!(out[0], "nllb[ko]Gebäude");
            assert_eq!((first.calls(), second.calls()), (1, 1));
        }
    }

    #[tokio::test]
    async fn short_answer_counts_as_invalid() {
        let short = Fake::with("remote", Ok(Some(1)));
        let chain = FallbackChain::new(vec![short.clone()]);
        let err = chain.translate(&texts(), "de", "ko").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));

        let nllb = Fake::ok("nllb");
        let chain = FallbackChain::new(vec![short, nllb.clone()]);
        let out = chain.translate(&texts(), "de", "ko").await.unwrap();
        assert_eq!(out.len(), texts().len());
        assert_eq!(nllb.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_last_error() {
        let chain = FallbackChain::new(vec![
            Fake::failing("remote", ProviderError::RateLimited),
            Fake::failing("nllb", ProviderError::Unavailable("down".into())),
        ]);
        assert_eq!(
            chain.translate(&texts(), "de", "ko").await,
            Err(ProviderError::Unavailable("down".into()))
        );
        let empty = FallbackChain::default();
        assert!(matches!(
            empty.translate(&texts(), "de", "ko").await,
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[test]
    fn chain_puts_nllb_last_once() {
        let backends = Backends::new()
            .with(BackendChoice::Nllb, Fake::ok("nllb"))
            .with(BackendChoice::Deepl, Fake::ok("deepl"));
        assert_eq!(backends.chain_for(BackendChoice::Deepl).names(), ["deepl", "nllb"]);
        assert_eq!(backends.chain_for(BackendChoice::Nllb).names(), ["nllb"]);
        assert_eq!(backends.chain_for(BackendChoice::Deepseek).names(), ["nllb"]);
        assert!(Backends::new().chain_for(BackendChoice::Deepl).is_empty());
    }

    #[test]
    fn backend_choice_accepts_client_spellings() {
        let parse = |s: &str| serde_json::from_str::<BackendChoice>(s).unwrap();
        assert_eq!(parse(r#""NLLB""#), BackendChoice::Nllb);
        assert_eq!(parse(r#""deepseek""#), BackendChoice::Deepseek);
        assert_eq!(parse(r#""DeepL""#), BackendChoice::Deepl);
        assert_eq!(BackendChoice::Deepl.to_string(), "DeepL");
    }
}
