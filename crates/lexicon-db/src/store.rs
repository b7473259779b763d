use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use lexicon_types::CorpusRecord;
use memmap2::Mmap;
use thiserror::Error;
use tracing::info;

use crate::fingerprint::Fingerprint;

/// Strategy for reading corpus files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadMode {
    /// Memory-map each corpus file; reads never block each other.
    Mmap,
    /// One file handle per language; seek+read runs under a mutex.
    Handle,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no corpus registered for language `{0}`")]
    UnknownLanguage(String),
    #[error(
        "offset {offset} is past the end of the `{language}` corpus ({len} bytes); the index is stale"
    )]
    OffsetOutOfRange {
        language: String,
        offset: u64,
        len: u64,
    },
    #[error("corrupt `{language}` record at offset {offset}: {source}")]
    CorruptRecord {
        language: String,
        offset: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{language}` corpus does not match its index (indexed {expected}, found {found})")]
    FingerprintMismatch {
        language: String,
        expected: Fingerprint,
        found: Fingerprint,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

enum Backing {
    Mmap(Mmap),
    Handle(Mutex<BufReader<File>>),
}

struct CorpusFile {
    path: PathBuf,
    len: u64,
    backing: Backing,
}

impl CorpusFile {
    fn open(path: &Path, mode: LoadMode) -> Result<Self, StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();
        let backing = match mode {
            LoadMode::Mmap => Backing::Mmap(unsafe { Mmap::map(&file) }.map_err(io_err)?),
            LoadMode::Handle => Backing::Handle(Mutex::new(BufReader::new(file))),
        };
        Ok(Self {
            path: path.to_path_buf(),
            len,
            backing,
        })
    }

    /// Bytes of the line starting at `offset`, newline included.
    fn read_line(&self, offset: u64) -> Result<Vec<u8>, std::io::Error> {
        match &self.backing {
            Backing::Mmap(map) => {
                let rest = &map[offset as usize..];
                let end = rest
                    .iter()
                    .position(|b| *b == b'\n')
                    .map_or(rest.len(), |pos| pos + 1);
                Ok(rest[..end].to_vec())
            }
            Backing::Handle(handle) => {
                let mut reader = handle.lock().unwrap_or_else(PoisonError::into_inner);
                reader.seek(SeekFrom::Start(offset))?;
                let mut line = Vec::new();
                reader.read_until(b'\n', &mut line)?;
                Ok(line)
            }
        }
    }
}

struct CorpusSource {
    path: PathBuf,
    expected: Option<Fingerprint>,
}

/// Random-access reader over per-language corpus files.
///
/// Files are opened on first use and cached for the life of the store.
pub struct CorpusStore {
    mode: LoadMode,
    sources: HashMap<String, CorpusSource>,
    open: DashMap<String, Arc<CorpusFile>>,
}

impl CorpusStore {
    pub fn new(mode: LoadMode) -> Self {
        Self {
            mode,
            sources: HashMap::new(),
            open: DashMap::new(),
        }
    }

    /// Register the corpus file for `language`.
    ///
    /// With `expected` set, opening the file fails unless its fingerprint
    /// matches.
    pub fn register(
        &mut self,
        language: &str,
        path: impl Into<PathBuf>,
        expected: Option<Fingerprint>,
    ) {
        self.open.remove(language);
        self.sources.insert(
            language.to_string(),
            CorpusSource {
                path: path.into(),
                expected,
            },
        );
    }

    pub fn has_language(&self, language: &str) -> bool {
        self.sources.contains_key(language)
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    /// Open and verify every registered corpus now rather than on first read.
    pub fn open_all(&self) -> Result<(), StoreError> {
        for language in self.sources.keys() {
            self.file(language)?;
        }
        Ok(())
    }

    /// Read and parse the record whose line starts at `offset`.
    pub fn read(&self, language: &str, offset: u64) -> Result<CorpusRecord, StoreError> {
        let line = self.read_line(language, offset)?;
        serde_json::from_slice(&line).map_err(|source| StoreError::CorruptRecord {
            language: language.to_string(),
            offset,
            source,
        })
    }

    /// Raw bytes of the line starting at `offset`.
    pub fn read_line(&self, language: &str, offset: u64) -> Result<Vec<u8>, StoreError> {
        let file = self.file(language)?;
        if offset >= file.len {
            return Err(StoreError::OffsetOutOfRange {
                language: language.to_string(),
                offset,
                len: file.len,
            });
        }
        file.read_line(offset).map_err(|source| StoreError::Io {
            path: file.path.clone(),
            source,
        })
    }

    fn file(&self, language: &str) -> Result<Arc<CorpusFile>, StoreError> {
        if let Some(file) = self.open.get(language) {
            return Ok(Arc::clone(file.value()));
        }

        let source = self
            .sources
            .get(language)
            .ok_or_else(|| StoreError::UnknownLanguage(language.to_string()))?;
        if let Some(expected) = source.expected {
            let found = Fingerprint::of_file(&source.path).map_err(|e| StoreError::Io {
                path: source.path.clone(),
                source: e,
            })?;
            if found != expected {
                return Err(StoreError::FingerprintMismatch {
                    language: language.to_string(),
                    expected,
                    found,
                });
            }
        }

        let file = Arc::new(CorpusFile::open(&source.path, self.mode)?);
        info!(
            "opened {} corpus {} ({} bytes, {:?})",
            language,
            source.path.display(),
            file.len,
            self.mode
        );
        let entry = self.open.entry(language.to_string()).or_insert(file);
        Ok(Arc::clone(entry.value()))
    }
}
