use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::fingerprint::Fingerprint;

const FORMAT_TAG: &str = "# lexicon-offsets v1";
const PROGRESS_EVERY: u64 = 1_000_000;

/// Name of the persisted index table for `language`.
pub fn index_file_name(language: &str) -> String {
    format!("{language}.offsets")
}

/// Lowercased lookup key for a headword.
pub fn normalize_word(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Counters reported by a full corpus scan.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BuildStats {
    pub lines: u64,
    pub indexed: u64,
    pub skipped: u64,
    pub bytes: u64,
}

/// Offsets of every headword occurrence in one language's corpus file.
#[derive(Clone, Debug, Default)]
pub struct LanguageIndex {
    language: String,
    fingerprint: Option<Fingerprint>,
    offsets: HashMap<String, Vec<u64>>,
}

impl LanguageIndex {
    /// Scan `corpus_path` once and record the line-start offset of each record.
    pub fn build(corpus_path: impl AsRef<Path>, language: &str) -> Result<(Self, BuildStats)> {
        let path = corpus_path.as_ref();
        let fingerprint = Fingerprint::of_file(path)
            .with_context(|| format!("fingerprint {}", path.display()))?;
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let started = Instant::now();
        let (mut index, stats) = Self::build_from_reader(BufReader::new(file), language)
            .with_context(|| format!("scan {}", path.display()))?;
        index.fingerprint = Some(fingerprint);
        info!(
            "indexed {} corpus: {} words, {} records, {} skipped in {} ms",
            language,
            index.word_count(),
            stats.indexed,
            stats.skipped,
            started.elapsed().as_millis()
        );
        Ok((index, stats))
    }

    /// Scan line-delimited records from `reader`.
    ///
    /// Malformed lines are skipped but still advance the offset. The result
    /// carries no fingerprint.
    pub fn build_from_reader<R: BufRead>(
        mut reader: R,
        language: &str,
    ) -> Result<(Self, BuildStats)> {
        let mut offsets: HashMap<String, Vec<u64>> = HashMap::new();
        let mut stats = BuildStats::default();
        let mut line = Vec::with_capacity(4096);

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            let offset = stats.bytes;
            stats.lines += 1;
            match headword(&line) {
                Some(word) => {
                    offsets.entry(word).or_default().push(offset);
                    stats.indexed += 1;
                }
                None => {
                    stats.skipped += 1;
                    debug!("{language}: skipping malformed line at offset {offset}");
                }
            }
            stats.bytes += read as u64;
            if stats.lines % PROGRESS_EVERY == 0 {
                info!("{language}: scanned {} lines", stats.lines);
            }
        }

        Ok((
            Self {
                language: language.to_string(),
                fingerprint: None,
                offsets,
            },
            stats,
        ))
    }

    /// Offsets for `word` (lowercased), ascending; empty when unknown.
    pub fn lookup(&self, word: &str) -> &[u64] {
        self.offsets
            .get(&normalize_word(word))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    /// Number of distinct words.
    pub fn word_count(&self) -> usize {
        self.offsets.len()
    }

    /// Number of stored offsets across all words.
    pub fn offset_count(&self) -> usize {
        self.offsets.values().map(Vec::len).sum()
    }

    /// Persist as a table of `offset<TAB>word` rows, replacing `path` atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("create temp file in {}", dir.display()))?;

        let mut rows: Vec<(u64, &str)> = Vec::with_capacity(self.offset_count());
        for (word, offsets) in &self.offsets {
            if word.contains('\n') {
                warn!("{}: not persisting word with embedded newline", self.language);
                continue;
            }
            rows.extend(offsets.iter().map(|off| (*off, word.as_str())));
        }
        rows.sort_unstable();

        let mut out = BufWriter::new(tmp.as_file());
        let fingerprint = self
            .fingerprint
            .map(|fp| fp.to_string())
            .unwrap_or_else(|| "none".to_string());
        writeln!(out, "{FORMAT_TAG} lang={} fingerprint={fingerprint}", self.language)?;
        for (offset, word) in rows {
            writeln!(out, "{offset}\t{word}")?;
        }
        out.flush()
            .with_context(|| format!("write {}", tmp.path().display()))?;
        drop(out);

        tmp.persist(path)
            .with_context(|| format!("persist {}", path.display()))?;
        Ok(())
    }

    /// Load a table written by [`LanguageIndex::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();

        let header = lines
            .next()
            .transpose()?
            .with_context(|| format!("{}: empty index file", path.display()))?;
        let (language, fingerprint) = parse_header(&header)
            .with_context(|| format!("{}: bad header {header:?}", path.display()))?;

        let mut offsets: HashMap<String, Vec<u64>> = HashMap::new();
        for (lineno, line) in lines.enumerate() {
            let line = line.with_context(|| format!("read {}", path.display()))?;
            if line.is_empty() {
                continue;
            }
            let (offset, word) = line.split_once('\t').with_context(|| {
                format!("{}:{} malformed index row", path.display(), lineno + 2)
            })?;
            let offset: u64 = offset
                .parse()
                .with_context(|| format!("{}:{} offset", path.display(), lineno + 2))?;
            offsets.entry(word.to_string()).or_default().push(offset);
        }
        for list in offsets.values_mut() {
            list.sort_unstable();
            list.dedup();
        }

        Ok(Self {
            language,
            fingerprint,
            offsets,
        })
    }
}

fn parse_header(header: &str) -> Option<(String, Option<Fingerprint>)> {
    let rest = header.strip_prefix(FORMAT_TAG)?;
    let mut language = None;
    let mut fingerprint = None;
    for field in rest.split_ascii_whitespace() {
        match field.split_once('=')? {
            ("lang", value) => language = Some(value.to_string()),
            ("fingerprint", "none") => {}
            ("fingerprint", value) => fingerprint = Some(value.parse().ok()?),
            _ => {}
        }
    }
    Some((language?, fingerprint))
}

fn headword(line: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct Headword {
        word: Option<String>,
    }

    let parsed: Headword = serde_json::from_slice(line).ok()?;
    let word = normalize_word(&parsed.word?);
    (!word.is_empty()).then_some(word)
}

/// Per-language offset indexes, read-only once built or loaded.
#[derive(Debug, Default)]
pub struct OffsetIndex {
    languages: HashMap<String, LanguageIndex>,
}

impl OffsetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a corpus file and add (or replace) its language's index.
    pub fn build(&mut self, corpus_path: impl AsRef<Path>, language: &str) -> Result<BuildStats> {
        let (index, stats) = LanguageIndex::build(corpus_path, language)?;
        self.insert(index);
        Ok(stats)
    }

    pub fn insert(&mut self, index: LanguageIndex) {
        self.languages.insert(index.language.clone(), index);
    }

    /// Load `<lang>.offsets` for each language from `dir`.
    pub fn load_dir(dir: impl AsRef<Path>, languages: &[&str]) -> Result<Self> {
        let dir = dir.as_ref();
        let mut index = Self::new();
        for language in languages {
            let path = dir.join(index_file_name(language));
            let started = Instant::now();
            let loaded = LanguageIndex::load(&path)?;
            anyhow::ensure!(
                loaded.language == *language,
                "{} holds the `{}` index, expected `{language}`",
                path.display(),
                loaded.language
            );
            info!(
                "loaded {language} index ({} words) in {} ms",
                loaded.word_count(),
                started.elapsed().as_millis()
            );
            index.insert(loaded);
        }
        Ok(index)
    }

    /// Offsets for `word` in `language`; empty for unknown words or languages.
    pub fn lookup(&self, language: &str, word: &str) -> &[u64] {
        self.languages
            .get(language)
            .map(|idx| idx.lookup(word))
            .unwrap_or(&[])
    }

    pub fn language(&self, language: &str) -> Option<&LanguageIndex> {
        self.languages.get(language)
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> + '_ {
        self.languages.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CORPUS: &str = concat!(
        r#"{"word": "Haus", "lang_code": "de", "pos": "noun"}"#,
        "\n",
        r#"{"word": "Baum", "lang_code": "de"}"#,
        "\n",
        "this line is not json\n",
        r#"{"lang_code": "de"}"#,
        "\n",
        r#"{"word": "haus", "lang_code": "de", "pos": "verb"}"#,
        "\n",
    );

    fn build(text: &str) -> (LanguageIndex, BuildStats) {
        LanguageIndex::build_from_reader(Cursor::new(text.as_bytes()), "de").unwrap()
    }

    #[test]
    fn offsets_follow_line_lengths() {
        let (index, stats) = build(CORPUS);
        let lines: Vec<&str> = CORPUS.split_inclusive('\n').collect();
        let mut starts = Vec::new();
        let mut acc = 0u64;
        for line in &lines {
            starts.push(acc);
            acc += line.len() as u64;
        }

        assert_eq!(index.lookup("haus"), &[starts[0], starts[4]]);
        assert_eq!(index.lookup("baum"), &[starts[1]]);
        assert_eq!(starts[2], starts[1] + lines[1].len() as u64);
        assert_eq!(stats.lines, 5);
        assert_eq!(stats.indexed, 3);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.bytes, CORPUS.len() as u64);
    }

    #[test]
    fn lookup_lowercases_and_never_fails() {
        let (index, _) = build(CORPUS);
        assert_eq!(index.lookup("HAUS").len(), 2);
        assert!(index.lookup("katze").is_empty());

        let mut all = OffsetIndex::new();
        all.insert(index);
        assert!(all.lookup("fr", "haus").is_empty());
        assert_eq!(all.lookup("de", "Baum").len(), 1);
    }

    #[test]
    fn counts_multibyte_lines_in_bytes() {
        let text = "{\"word\": \"집\"}\n{\"word\": \"가옥\"}\n";
        let (index, _) = build(text);
        let first_len = "{\"word\": \"집\"}\n".len() as u64;
        assert_eq!(index.lookup("가옥"), &[first_len]);
    }

    #[test]
    fn last_line_without_newline_is_indexed() {
        let (index, stats) = build("{\"word\": \"a\"}\n{\"word\": \"b\"}");
        assert_eq!(index.lookup("b"), &[14]);
        assert_eq!(stats.lines, 2);
    }

    #[test]
    fn parses_header_fields() {
        let (lang, fp) = parse_header("# lexicon-offsets v1 lang=en fingerprint=none").unwrap();
        assert_eq!(lang, "en");
        assert!(fp.is_none());
        assert!(parse_header("# something else").is_none());
        assert!(parse_header("# lexicon-offsets v1 fingerprint=none").is_none());
    }
}
