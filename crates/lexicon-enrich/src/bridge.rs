use std::collections::{HashMap, HashSet};

use lexicon_db::{Lexicon, StoreError, normalize_word};
use lexicon_types::{Origin, SenseId, TranslationCandidate};
use tracing::debug;

/// Resolves bridge-language words to target-language candidates.
///
/// Lookups are memoized for the life of the resolver, which is one query job.
pub struct BridgeResolver<'a> {
    lexicon: &'a Lexicon,
    bridge_lang: &'a str,
    target_lang: &'a str,
    memo: HashMap<String, Vec<String>>,
}

impl<'a> BridgeResolver<'a> {
    pub fn new(lexicon: &'a Lexicon, bridge_lang: &'a str, target_lang: &'a str) -> Self {
        Self {
            lexicon,
            bridge_lang,
            target_lang,
            memo: HashMap::new(),
        }
    }

    /// Whether the bridge corpus is loaded at all.
    pub fn available(&self) -> bool {
        self.lexicon.has_language(self.bridge_lang)
    }

    /// Target-language words listed for `bridge_word` in the bridge corpus,
    /// deduplicated in corpus order.
    pub fn target_words(&mut self, bridge_word: &str) -> Result<&[String], StoreError> {
        let key = normalize_word(bridge_word);
        if !self.memo.contains_key(&key) {
            let words = self.scan(&key)?;
            debug!(
                "bridge {}:{key} -> {} {} word(s)",
                self.bridge_lang,
                words.len(),
                self.target_lang
            );
            self.memo.insert(key.clone(), words);
        }
        Ok(self.memo.get(&key).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Bridged candidates for `sense`, reached through `bridge_word`.
    pub fn resolve(
        &mut self,
        sense: &SenseId,
        bridge_word: &str,
    ) -> Result<Vec<TranslationCandidate>, StoreError> {
        let language = self.target_lang.to_string();
        Ok(self
            .target_words(bridge_word)?
            .iter()
            .map(|word| TranslationCandidate {
                word: word.clone(),
                language: language.clone(),
                sense: sense.clone(),
                origin: Origin::Bridged,
            })
            .collect())
    }

    fn scan(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut seen = HashSet::new();
        let mut words = Vec::new();
        for located in self.lexicon.records(self.bridge_lang, key)? {
            if located.record.lang_code != self.bridge_lang {
                continue;
            }
            for translation in &located.record.translations {
                if translation.language() != Some(self.target_lang) {
                    continue;
                }
                if let Some(word) = translation.text()
                    && seen.insert(word.to_string())
                {
                    words.push(word.to_string());
                }
            }
        }
        Ok(words)
    }
}
