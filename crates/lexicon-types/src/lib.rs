//! Shared types for line-delimited dictionary corpora and the entries built
//! from them.
//!
//! Raw records ([`CorpusRecord`], [`RawSense`], [`RawTranslation`]) mirror one
//! JSON line of a corpus file and tolerate missing fields. Normalized results
//! ([`EntrySet`], [`Entry`], [`Sense`]) use explicit, always-present
//! collections. Leaves inside an [`EntrySet`] are addressed with a
//! [`TranslationPath`] made of [`PathSegment`]s.
//!
//! ```rust
//! use lexicon_types::{EntrySet, SenseId, TranslationPath};
//!
//! let set = EntrySet::new("haus", "de", "ko");
//! let path = TranslationPath::gloss(1740, &SenseId::from("1"));
//! assert_eq!(path.to_string(), "1740/senses/1/gloss/target");
//! assert!(set.slot(&path).is_none());
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const SENSES: &str = "senses";
pub const GLOSS: &str = "gloss";
pub const EXAMPLES: &str = "examples";
pub const TARGET: &str = "target";

/// Identity of a sense within one entry.
///
/// Either the corpus-provided `sense_index` or the 1-based ordinal of the
/// sense inside its record.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SenseId(String);

impl SenseId {
    pub fn ordinal(position: usize) -> Self {
        SenseId((position + 1).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SenseId {
    fn from(value: &str) -> Self {
        SenseId(value.to_string())
    }
}

impl From<String> for SenseId {
    fn from(value: String) -> Self {
        SenseId(value)
    }
}

impl fmt::Display for SenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One line of a language's corpus file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CorpusRecord {
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub lang_code: String,
    #[serde(default)]
    pub pos: Option<String>,
    #[serde(default)]
    pub senses: Vec<RawSense>,
    #[serde(default)]
    pub translations: Vec<RawTranslation>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RawSense {
    #[serde(default, deserialize_with = "optional_sense_id")]
    pub sense_index: Option<SenseId>,
    #[serde(default)]
    pub glosses: Vec<String>,
    #[serde(default)]
    pub raw_tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<RawExample>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RawExample {
    #[serde(default)]
    pub text: Option<String>,
}

/// Translation line of a record.
///
/// Source-language corpora code the language under `lang_code`, the English
/// corpus under `code`; [`RawTranslation::language`] reads either.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RawTranslation {
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub lang_code: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "optional_sense_id")]
    pub sense_index: Option<SenseId>,
}

impl RawTranslation {
    pub fn language(&self) -> Option<&str> {
        self.lang_code.as_deref().or(self.code.as_deref())
    }

    /// Trimmed, non-empty translation word.
    pub fn text(&self) -> Option<&str> {
        self.word
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
    }
}

fn optional_sense_id<'de, D>(deserializer: D) -> Result<Option<SenseId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    let raw = Option::<RawId>::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| {
        let text = match raw {
            RawId::Text(s) => s.trim().to_string(),
            RawId::Number(n) => n.to_string(),
        };
        (!text.is_empty()).then_some(SenseId(text))
    }))
}

/// Where a translation candidate came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Direct,
    Bridged,
}

/// A proposed translation tied to one sense.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TranslationCandidate {
    pub word: String,
    pub language: String,
    pub sense: SenseId,
    pub origin: Origin,
}

/// Drop repeated words per (sense, language), keeping the first occurrence.
pub fn dedup_candidates(candidates: Vec<TranslationCandidate>) -> Vec<TranslationCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.sense.clone(), c.language.clone(), c.word.clone())))
        .collect()
}

/// Text in the record's own language plus a slot for the target language.
///
/// `target` starts as a copy of `source` and is overwritten by translation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct LocalizedText {
    pub source: String,
    pub target: String,
}

impl LocalizedText {
    pub fn placeholder(text: impl Into<String>) -> Self {
        let source = text.into();
        Self {
            target: source.clone(),
            source,
        }
    }
}

/// Normalized view of one sense.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Sense {
    #[serde(skip)]
    pub id: SenseId,
    pub gloss: LocalizedText,
    pub examples: Vec<LocalizedText>,
    pub tags: Vec<String>,
    /// Direct translations keyed by language code.
    pub direct: BTreeMap<String, Vec<String>>,
    /// Target-language translations found through the bridge language.
    pub bridged: Vec<String>,
}

impl Sense {
    /// Record a direct translation; returns `false` for a duplicate.
    pub fn push_direct(&mut self, language: &str, word: &str) -> bool {
        let words = self.direct.entry(language.to_string()).or_default();
        if words.iter().any(|w| w == word) {
            return false;
        }
        words.push(word.to_string());
        true
    }

    /// Whether `word` is already listed for `target`, directly or bridged.
    pub fn has_translation(&self, target: &str, word: &str) -> bool {
        self.bridged.iter().any(|w| w == word)
            || self
                .direct
                .get(target)
                .is_some_and(|words| words.iter().any(|w| w == word))
    }

    /// Record a bridged translation; returns `false` if already present.
    pub fn push_bridged(&mut self, target: &str, word: &str) -> bool {
        if self.has_translation(target, word) {
            return false;
        }
        self.bridged.push(word.to_string());
        true
    }
}

/// Canonical entry built from one corpus record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Entry {
    /// Byte offset of the source record; doubles as the entry id.
    #[serde(skip)]
    pub id: u64,
    pub word: String,
    pub pos: Option<String>,
    #[serde(serialize_with = "senses_by_id")]
    pub senses: Vec<Sense>,
}

impl Entry {
    pub fn sense(&self, id: &SenseId) -> Option<&Sense> {
        self.senses.iter().find(|s| &s.id == id)
    }

    pub fn sense_mut(&mut self, id: &SenseId) -> Option<&mut Sense> {
        self.senses.iter_mut().find(|s| &s.id == id)
    }
}

/// All entries resolved for one query word.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EntrySet {
    pub word: String,
    pub source_lang: String,
    pub target_lang: String,
    #[serde(serialize_with = "entries_by_id")]
    pub entries: Vec<Entry>,
}

impl EntrySet {
    pub fn new(
        word: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            word: word.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: u64) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Resolve a leaf path to its text slot.
    pub fn slot(&self, path: &TranslationPath) -> Option<&String> {
        let loc = locate(path)?;
        let sense = self.entry(loc.entry)?.sense(&SenseId::from(loc.sense))?;
        match loc.leaf {
            Leaf::Gloss => Some(&sense.gloss.target),
            Leaf::Example(idx) => sense.examples.get(idx).map(|ex| &ex.target),
        }
    }

    /// Resolve a leaf path to its text slot for writing.
    pub fn slot_mut(&mut self, path: &TranslationPath) -> Option<&mut String> {
        let loc = locate(path)?;
        let sense = self
            .entries
            .iter_mut()
            .find(|e| e.id == loc.entry)?
            .sense_mut(&SenseId::from(loc.sense))?;
        match loc.leaf {
            Leaf::Gloss => Some(&mut sense.gloss.target),
            Leaf::Example(idx) => sense.examples.get_mut(idx).map(|ex| &mut ex.target),
        }
    }
}

fn entries_by_id<S: Serializer>(entries: &[Entry], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(entries.iter().map(|e| (e.id.to_string(), e)))
}

fn senses_by_id<S: Serializer>(senses: &[Sense], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(senses.iter().map(|s| (s.id.as_str(), s)))
}

/// One step of a [`TranslationPath`]: a named field/key or a list position.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(idx) => write!(f, "[{idx}]"),
        }
    }
}

/// Location of one translatable leaf inside an [`EntrySet`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TranslationPath(Vec<PathSegment>);

impl TranslationPath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathSegment::Key(key.into()));
        self
    }

    pub fn index(mut self, idx: usize) -> Self {
        self.0.push(PathSegment::Index(idx));
        self
    }

    /// Path of a sense's target-language gloss.
    pub fn gloss(entry: u64, sense: &SenseId) -> Self {
        Self::new()
            .key(entry.to_string())
            .key(SENSES)
            .key(sense.as_str())
            .key(GLOSS)
            .key(TARGET)
    }

    /// Path of a sense's `idx`-th target-language example.
    pub fn example(entry: u64, sense: &SenseId, idx: usize) -> Self {
        Self::new()
            .key(entry.to_string())
            .key(SENSES)
            .key(sense.as_str())
            .key(EXAMPLES)
            .index(idx)
            .key(TARGET)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for TranslationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

enum Leaf {
    Gloss,
    Example(usize),
}

struct Location<'p> {
    entry: u64,
    sense: &'p str,
    leaf: Leaf,
}

fn locate(path: &TranslationPath) -> Option<Location<'_>> {
    use PathSegment::{Index, Key};

    let [Key(entry), Key(senses), Key(sense), rest @ ..] = path.segments() else {
        return None;
    };
    if senses != SENSES {
        return None;
    }
    let leaf = match rest {
        [Key(gloss), Key(target)] if gloss == GLOSS && target == TARGET => Leaf::Gloss,
        [Key(examples), Index(idx), Key(target)] if examples == EXAMPLES && target == TARGET => {
            Leaf::Example(*idx)
        }
        _ => return None,
    };
    Some(Location {
        entry: entry.parse().ok()?,
        sense: sense.as_str(),
        leaf,
    })
}
