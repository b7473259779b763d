pub const DEFAULT_BRIDGE_LANG: &str = "en";
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;

/// Knobs shared by every query job.
#[derive(Clone, Debug, PartialEq)]
pub struct EnrichConfig {
    /// Language used to hop from source to target when no direct
    /// translation exists.
    pub bridge_lang: String,
    /// Minimum candidate/gloss similarity for a bridged candidate to be kept.
    pub similarity_threshold: f32,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            bridge_lang: DEFAULT_BRIDGE_LANG.to_string(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}
