//! Byte-offset index and random-access reader for line-delimited dictionary
//! corpora.
//!
//! Each language has one corpus file (`<lang>_dict.jsonl`, one JSON record per
//! line) and one persisted index (`<lang>.offsets`) mapping lowercased
//! headwords to the byte offsets of the lines that define them. The index is
//! built once per corpus snapshot and only read afterwards.
//!
//! # Features
//! - Single-pass index build that skips malformed lines.
//! - Fingerprinted index files: a corpus that changed after indexing is
//!   refused instead of being read at stale offsets.
//! - Runtime backing choice for corpus reads: [`LoadMode::Mmap`] or a
//!   mutex-guarded [`LoadMode::Handle`].
//! - [`Lexicon`] ties both together: `records(lang, word)` returns every
//!   readable record for a word and skips corrupt lines.
//!
//! # Example
//! ```no_run
//! use lexicon_db::{Lexicon, LoadMode};
//!
//! # fn main() -> anyhow::Result<()> {
//! let lexicon = Lexicon::open("wiktionary", "wiktionary/offsets", &["de", "en"], LoadMode::Mmap)?;
//! for located in lexicon.records("de", "Haus")? {
//!     println!("{}: {} ({:?})", located.offset, located.record.word, located.record.pos);
//! }
//! # Ok(()) }
//! ```
//!
//! For a runnable demo, see `cargo run -p lexicon-db --example lookup -- <corpus-dir> <index-dir> <lang> <word>`.

mod fingerprint;
mod index;
mod store;

use std::path::Path;

use anyhow::{Context, Result};
use lexicon_types::CorpusRecord;
use tracing::{error, warn};

pub use fingerprint::Fingerprint;
pub use index::{BuildStats, LanguageIndex, OffsetIndex, index_file_name, normalize_word};
pub use store::{CorpusStore, LoadMode, StoreError};

/// Name of the corpus file for `language`.
pub fn corpus_file_name(language: &str) -> String {
    format!("{language}_dict.jsonl")
}

/// A parsed record together with the offset it was read from.
#[derive(Clone, Debug)]
pub struct LocatedRecord {
    pub offset: u64,
    pub record: CorpusRecord,
}

/// Offset index plus corpus files, shared read-only by all queries.
pub struct Lexicon {
    index: OffsetIndex,
    store: CorpusStore,
}

impl Lexicon {
    pub fn new(index: OffsetIndex, store: CorpusStore) -> Self {
        Self { index, store }
    }

    /// Load persisted indexes and register the matching corpus files.
    ///
    /// Every corpus is opened and checked against its index fingerprint
    /// before this returns.
    pub fn open(
        corpus_dir: impl AsRef<Path>,
        index_dir: impl AsRef<Path>,
        languages: &[&str],
        mode: LoadMode,
    ) -> Result<Self> {
        let corpus_dir = corpus_dir.as_ref();
        let index = OffsetIndex::load_dir(index_dir, languages)?;
        let mut store = CorpusStore::new(mode);
        for language in languages {
            let expected = index.language(language).and_then(LanguageIndex::fingerprint);
            if expected.is_none() {
                warn!("{language} index has no corpus fingerprint; offsets are unchecked");
            }
            store.register(language, corpus_dir.join(corpus_file_name(language)), expected);
        }
        store
            .open_all()
            .with_context(|| format!("open corpora in {}", corpus_dir.display()))?;
        Ok(Self { index, store })
    }

    pub fn has_language(&self, language: &str) -> bool {
        self.store.has_language(language)
    }

    pub fn index(&self) -> &OffsetIndex {
        &self.index
    }

    pub fn store(&self) -> &CorpusStore {
        &self.store
    }

    /// Offsets of `word` in `language`.
    pub fn lookup(&self, language: &str, word: &str) -> &[u64] {
        self.index.lookup(language, word)
    }

    /// Every readable record indexed under `word`.
    ///
    /// An unknown word yields an empty list. Corrupt lines are logged and
    /// skipped; any other read failure aborts the lookup.
    pub fn records(&self, language: &str, word: &str) -> Result<Vec<LocatedRecord>, StoreError> {
        if !self.store.has_language(language) {
            return Err(StoreError::UnknownLanguage(language.to_string()));
        }

        let offsets = self.index.lookup(language, word);
        let mut out = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            match self.store.read(language, offset) {
                Ok(record) => out.push(LocatedRecord { offset, record }),
                Err(err @ StoreError::CorruptRecord { .. }) => warn!("skipping: {err}"),
                Err(err) => {
                    if matches!(err, StoreError::OffsetOutOfRange { .. }) {
                        error!("index/corpus mismatch while reading `{word}`: {err}");
                    }
                    return Err(err);
                }
            }
        }
        Ok(out)
    }
}
