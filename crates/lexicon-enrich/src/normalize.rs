use std::collections::{HashMap, HashSet};

use lexicon_db::LocatedRecord;
use lexicon_types::{CorpusRecord, Entry, LocalizedText, RawSense, Sense, SenseId};
use tracing::trace;

/// Languages a normalization pass cares about.
#[derive(Clone, Copy, Debug)]
pub struct NormalizeParams<'a> {
    pub source_lang: &'a str,
    pub target_lang: &'a str,
    pub bridge_lang: &'a str,
}

/// An entry plus the bridge-language words found on its senses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Normalized {
    pub entry: Entry,
    /// `(sense, bridge word)` pairs, deduplicated, in record order.
    pub bridge_words: Vec<(SenseId, String)>,
}

/// Normalize every record that belongs to the source language.
pub fn normalize(records: &[LocatedRecord], params: &NormalizeParams<'_>) -> Vec<Normalized> {
    records
        .iter()
        .filter_map(|located| normalize_record(located.offset, &located.record, params))
        .collect()
}

/// Build the canonical entry for one record, or `None` for a record of
/// another language.
pub fn normalize_record(
    offset: u64,
    record: &CorpusRecord,
    params: &NormalizeParams<'_>,
) -> Option<Normalized> {
    if record.lang_code != params.source_lang {
        return None;
    }

    // Corpus ids win over positional fallbacks, whatever their order.
    let reserved: HashSet<&SenseId> = record
        .senses
        .iter()
        .filter_map(|raw| raw.sense_index.as_ref())
        .collect();
    let mut senses = Vec::with_capacity(record.senses.len());
    // First sense carrying each corpus id, for attaching translations.
    let mut by_corpus_id: HashMap<SenseId, usize> = HashMap::new();
    let mut used: HashSet<SenseId> = HashSet::new();

    for (position, raw) in record.senses.iter().enumerate() {
        let id = match &raw.sense_index {
            Some(corpus_id) if !used.contains(corpus_id) => {
                by_corpus_id.insert(corpus_id.clone(), position);
                corpus_id.clone()
            }
            Some(corpus_id) => unique_id(corpus_id, position, &used, &reserved),
            None => {
                let ordinal = SenseId::ordinal(position);
                if used.contains(&ordinal) || reserved.contains(&ordinal) {
                    unique_id(&ordinal, position, &used, &reserved)
                } else {
                    ordinal
                }
            }
        };
        used.insert(id.clone());
        senses.push(sense_view(id, raw, params));
    }

    let mut bridge_words = Vec::new();
    let mut seen_bridge: HashSet<(usize, String)> = HashSet::new();
    for translation in &record.translations {
        let Some(language) = translation.language() else {
            continue;
        };
        if language != params.target_lang && language != params.bridge_lang {
            continue;
        }
        let Some(word) = translation.text() else {
            continue;
        };

        let position = match &translation.sense_index {
            Some(id) => by_corpus_id.get(id).copied(),
            None if senses.len() == 1 => Some(0),
            None => None,
        };
        let Some(position) = position else {
            trace!(
                "{}@{offset}: dropping {language} translation `{word}` with no matching sense ({:?})",
                record.word,
                translation.sense_index
            );
            continue;
        };

        let sense = &mut senses[position];
        sense.push_direct(language, word);
        if language == params.bridge_lang
            && params.target_lang != params.bridge_lang
            && seen_bridge.insert((position, word.to_string()))
        {
            bridge_words.push((sense.id.clone(), word.to_string()));
        }
    }

    Some(Normalized {
        entry: Entry {
            id: offset,
            word: record.word.clone(),
            pos: record.pos.clone(),
            senses,
        },
        bridge_words,
    })
}

/// `<base>.<position>`, with a further counter when that is taken too.
fn unique_id(
    base: &SenseId,
    position: usize,
    used: &HashSet<SenseId>,
    reserved: &HashSet<&SenseId>,
) -> SenseId {
    let stem = format!("{base}.{}", position + 1);
    let mut id = SenseId::from(stem.clone());
    let mut counter = 2;
    while used.contains(&id) || reserved.contains(&id) {
        id = SenseId::from(format!("{stem}.{counter}"));
        counter += 1;
    }
    id
}

fn sense_view(id: SenseId, raw: &RawSense, params: &NormalizeParams<'_>) -> Sense {
    let gloss = raw
        .glosses
        .iter()
        .rev()
        .map(|g| g.trim())
        .find(|g| !g.is_empty())
        .unwrap_or_default();
    let examples = raw
        .examples
        .iter()
        .filter_map(|ex| ex.text.as_deref().map(str::trim))
        .filter(|text| !text.is_empty())
        .map(LocalizedText::placeholder)
        .collect();

    let mut sense = Sense {
        id,
        gloss: LocalizedText::placeholder(gloss),
        examples,
        tags: raw.raw_tags.clone(),
        ..Sense::default()
    };
    sense.direct.insert(params.target_lang.to_string(), Vec::new());
    sense.direct.insert(params.bridge_lang.to_string(), Vec::new());
    sense
}
