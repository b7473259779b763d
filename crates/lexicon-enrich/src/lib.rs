//! Query pipeline on top of [`lexicon_db`]: normalize corpus records into
//! entries, fill missing target-language translations through a bridge
//! language, drop bridged candidates that do not fit their sense, and
//! translate glosses and examples with a fallback chain of providers.
//!
//! [`Orchestrator::run`] sequences all of it as one cancellable job.

mod bridge;
mod config;
mod filter;
mod http;
mod normalize;
mod orchestrator;
mod similarity;
pub mod translate;

pub use bridge::BridgeResolver;
pub use config::{DEFAULT_BRIDGE_LANG, DEFAULT_SIMILARITY_THRESHOLD, EnrichConfig};
pub use filter::{MergeStats, SemanticFilter, Verdict};
pub use normalize::{NormalizeParams, Normalized, normalize, normalize_record};
pub use orchestrator::{
    JobError, JobErrorKind, JobState, Orchestrator, ProgressEvent, ProgressSink, QueryJob,
    QueryOutcome, QueryRequest,
};
pub use similarity::{EmbeddingScorer, SimilarityError, SimilarityScorer, cosine};
pub use translate::{
    BackendChoice, Backends, FallbackChain, ProviderError, ReinsertError, TranslationBatch,
    TranslationProvider,
};
