use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::services::error::EngineError;
use crate::services::knowledge::{GrammarStatus, KnowledgeStore, VocabularyStatus};
use crate::services::pattern_detector;
use crate::services::tokenizer::{base_form_candidates, unique_words};

/// Known/unknown split of a text's unique words for one learner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// `true` = known. Ignored words are absent.
    pub words: BTreeMap<String, bool>,
    /// Counted words in order of first appearance.
    pub order: Vec<String>,
    pub ignored: Vec<String>,
    /// Catalog patterns found in the text; `true` = known to the learner.
    pub patterns: BTreeMap<String, bool>,
}

impl Classification {
    pub fn known_count(&self) -> usize {
        self.words.values().filter(|known| **known).count()
    }

    pub fn unknown_count(&self) -> usize {
        self.words.len() - self.known_count()
    }

    pub fn unknown_words(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|w| self.words.get(*w) == Some(&false))
            .map(String::as_str)
    }

    pub fn is_known(&self, word: &str) -> bool {
        self.words.get(word).copied().unwrap_or(false)
    }

    pub fn unknown_patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns
            .iter()
            .filter(|(_, known)| !**known)
            .map(|(id, _)| id.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierConfig {
    pub infer_inflections: bool,
}

impl ClassifierConfig {
    pub fn from_env() -> Self {
        Self {
            infer_inflections: crate::config::env_bool("CLASSIFIER_INFER_INFLECTIONS").unwrap_or(false),
        }
    }
}

pub struct Classifier {
    knowledge: Arc<KnowledgeStore>,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(knowledge: Arc<KnowledgeStore>, config: ClassifierConfig) -> Self {
        Self { knowledge, config }
    }

    pub async fn classify(&self, text: &str, learner_id: &str) -> Result<Classification, EngineError> {
        let words = unique_words(text);
        let statuses = self.knowledge.word_statuses(learner_id, &words).await?;

        let inferred_known = if self.config.infer_inflections {
            self.infer_known(learner_id, &words, &statuses).await?
        } else {
            HashSet::new()
        };

        let mut out = Classification::default();
        for word in words {
            match statuses.get(&word) {
                Some(VocabularyStatus::Ignore) => out.ignored.push(word),
                Some(status) => {
                    out.words.insert(word.clone(), *status == VocabularyStatus::Known);
                    out.order.push(word);
                }
                None => {
                    out.words.insert(word.clone(), inferred_known.contains(&word));
                    out.order.push(word);
                }
            }
        }

        out.patterns = self.classify_patterns(text, learner_id).await?;

        tracing::debug!(
            learner_id,
            counted = out.words.len(),
            known = out.known_count(),
            ignored = out.ignored.len(),
            patterns = out.patterns.len(),
            "text classified"
        );
        Ok(out)
    }

    /// Practice and unmarked patterns both count as unknown.
    async fn classify_patterns(&self, text: &str, learner_id: &str) -> Result<BTreeMap<String, bool>, EngineError> {
        let found = pattern_detector::detect(text);
        if found.is_empty() {
            return Ok(BTreeMap::new());
        }
        let known: HashSet<String> = self
            .knowledge
            .grammar_entries(learner_id)
            .await?
            .into_iter()
            .filter(|e| e.status == GrammarStatus::Known)
            .map(|e| e.pattern_id)
            .collect();
        Ok(found
            .into_iter()
            .map(|id| (id.to_string(), known.contains(id)))
            .collect())
    }

    /// Unseen words whose base form the learner already knows.
    async fn infer_known(
        &self,
        learner_id: &str,
        words: &[String],
        statuses: &std::collections::HashMap<String, VocabularyStatus>,
    ) -> Result<HashSet<String>, EngineError> {
        let candidates: Vec<(String, Vec<String>)> = words
            .iter()
            .filter(|w| !statuses.contains_key(*w))
            .map(|w| (w.clone(), base_form_candidates(w)))
            .filter(|(_, bases)| !bases.is_empty())
            .collect();
        if candidates.is_empty() {
            return Ok(HashSet::new());
        }

        let lookup: Vec<String> = candidates
            .iter()
            .flat_map(|(_, bases)| bases.iter().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let base_statuses = self.knowledge.word_statuses(learner_id, &lookup).await?;

        Ok(candidates
            .into_iter()
            .filter(|(_, bases)| {
                bases
                    .iter()
                    .any(|b| base_statuses.get(b) == Some(&VocabularyStatus::Known))
            })
            .map(|(word, _)| word)
            .collect())
    }
}
