//! Collect translatable text out of an [`EntrySet`], send it through a
//! provider chain, and write the results back to the same leaves.

mod chat;
mod deepl;
mod nllb;
mod provider;

use lexicon_types::{EntrySet, TranslationPath};
use thiserror::Error;

pub use chat::ChatCompletionProvider;
pub use deepl::DeepLProvider;
pub use nllb::{NllbProvider, nllb_code};
pub use provider::{BackendChoice, Backends, FallbackChain, ProviderError, TranslationProvider};

/// Ordered `(text, path)` pairs awaiting translation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TranslationBatch {
    items: Vec<(String, TranslationPath)>,
}

impl TranslationBatch {
    pub fn push(&mut self, text: impl Into<String>, path: TranslationPath) {
        self.items.push((text.into(), path));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn texts(&self) -> Vec<String> {
        self.items.iter().map(|(text, _)| text.clone()).collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &TranslationPath> + '_ {
        self.items.iter().map(|(_, path)| path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TranslationPath)> + '_ {
        self.items.iter().map(|(text, path)| (text.as_str(), path))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ReinsertError {
    #[error("backend returned {found} translations for {expected} texts")]
    LengthMismatch { expected: usize, found: usize },
    #[error("translation path {0} does not resolve")]
    UnresolvedPath(String),
}

/// Every non-empty target slot of `set`: per entry and sense, the gloss and
/// then each example, in order.
pub fn collect(set: &EntrySet) -> TranslationBatch {
    let mut batch = TranslationBatch::default();
    for entry in &set.entries {
        for sense in &entry.senses {
            if !sense.gloss.target.is_empty() {
                batch.push(
                    sense.gloss.target.as_str(),
                    TranslationPath::gloss(entry.id, &sense.id),
                );
            }
            for (idx, example) in sense.examples.iter().enumerate() {
                if !example.target.is_empty() {
                    batch.push(
                        example.target.as_str(),
                        TranslationPath::example(entry.id, &sense.id, idx),
                    );
                }
            }
        }
    }
    batch
}

/// Write `translated[i]` to the slot at the `i`-th path of `batch`.
///
/// Nothing is written unless the lengths match and every path resolves.
pub fn reinsert(
    set: &mut EntrySet,
    batch: &TranslationBatch,
    translated: Vec<String>,
) -> Result<usize, ReinsertError> {
    if translated.len() != batch.len() {
        return Err(ReinsertError::LengthMismatch {
            expected: batch.len(),
            found: translated.len(),
        });
    }
    if let Some(path) = batch.paths().find(|path| set.slot(path).is_none()) {
        return Err(ReinsertError::UnresolvedPath(path.to_string()));
    }

    for (path, text) in batch.paths().zip(translated) {
        let Some(slot) = set.slot_mut(path) else {
            return Err(ReinsertError::UnresolvedPath(path.to_string()));
        };
        *slot = text;
    }
    Ok(batch.len())
}
