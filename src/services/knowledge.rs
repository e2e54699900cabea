use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::KeyedLocks;
use crate::db::operations::{grammar as grammar_ops, vocabulary as vocabulary_ops};
use crate::db::{now_iso, DatabaseProxy};
use crate::services::error::{validate_learner_id, within_store_timeout, EngineError};
use crate::services::grammar_catalog::{self, CefrLevel, CATALOG_VERSION};
use crate::services::tokenizer::normalize_word;

const MAX_TRANSLATION_LEN: usize = 500;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabularyStatus {
    Known,
    Unknown,
    Learning,
    Ignore,
}

impl VocabularyStatus {
    pub const ALL: [VocabularyStatus; 4] = [
        VocabularyStatus::Known,
        VocabularyStatus::Unknown,
        VocabularyStatus::Learning,
        VocabularyStatus::Ignore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Known => "known",
            Self::Unknown => "unknown",
            Self::Learning => "learning",
            Self::Ignore => "ignore",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "known" => Some(Self::Known),
            "unknown" => Some(Self::Unknown),
            "learning" => Some(Self::Learning),
            "ignore" | "ignored" => Some(Self::Ignore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrammarStatus {
    Known,
    Practice,
}

impl GrammarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Known => "known",
            Self::Practice => "practice",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "known" => Some(Self::Known),
            "practice" | "practicing" => Some(Self::Practice),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyEntry {
    pub id: String,
    pub learner_id: String,
    pub word: String,
    pub status: VocabularyStatus,
    pub translation: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarEntry {
    pub id: String,
    pub learner_id: String,
    pub pattern_id: String,
    pub status: GrammarStatus,
    pub catalog_version: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkOutcome<E, S> {
    pub entry: E,
    pub created: bool,
    pub changed: bool,
    pub previous_status: Option<S>,
}

pub type VocabularyMark = MarkOutcome<VocabularyEntry, VocabularyStatus>;
pub type GrammarMark = MarkOutcome<GrammarEntry, GrammarStatus>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyStats {
    pub known: i64,
    pub unknown: i64,
    pub learning: i64,
    pub ignore: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarTierOverview {
    pub level: CefrLevel,
    pub known: Vec<String>,
    pub practicing: Vec<String>,
    pub missing: Vec<String>,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarOverview {
    pub catalog_version: i64,
    pub tiers: Vec<GrammarTierOverview>,
}

/// Inputs the level engine needs, gathered in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeCounts {
    pub known_vocabulary: u64,
    pub known_grammar: BTreeMap<CefrLevel, u64>,
    pub known_patterns: BTreeSet<String>,
}

pub struct KnowledgeStore {
    proxy: Arc<DatabaseProxy>,
    locks: KeyedLocks,
}

impl KnowledgeStore {
    pub fn new(proxy: Arc<DatabaseProxy>) -> Self {
        Self {
            proxy,
            locks: KeyedLocks::new(),
        }
    }

    pub fn proxy(&self) -> &Arc<DatabaseProxy> {
        &self.proxy
    }

    pub async fn mark_vocabulary(
        &self,
        learner_id: &str,
        word: &str,
        status: &str,
        translation: Option<&str>,
    ) -> Result<VocabularyMark, EngineError> {
        validate_learner_id(learner_id)?;
        let status = VocabularyStatus::parse(status).ok_or_else(|| {
            EngineError::validation(format!(
                "unknown vocabulary status '{status}', expected known, unknown, learning or ignore"
            ))
        })?;
        let word = normalize_word(word)?;
        let translation = normalize_translation(translation)?;

        let _guard = self.locks.lock(learner_id).await;
        let outcome = within_store_timeout(self.proxy.store_timeout(), async {
            let mut tx = self.proxy.pool().begin().await?;
            let existing = vocabulary_ops::find_entry(&mut *tx, learner_id, &word).await?;

            let outcome = match existing {
                None => {
                    let now = now_iso();
                    let entry = VocabularyEntry {
                        id: Uuid::new_v4().to_string(),
                        learner_id: learner_id.to_string(),
                        word: word.clone(),
                        status,
                        translation,
                        created_at: now.clone(),
                        updated_at: now,
                    };
                    vocabulary_ops::insert_entry(&mut *tx, &entry).await?;
                    MarkOutcome { entry, created: true, changed: true, previous_status: None }
                }
                Some(current) => {
                    let translation_changed =
                        translation.is_some() && translation != current.translation;
                    if current.status == status && !translation_changed {
                        let previous = current.status;
                        MarkOutcome { entry: current, created: false, changed: false, previous_status: Some(previous) }
                    } else {
                        let previous = current.status;
                        let entry = VocabularyEntry {
                            status,
                            translation: translation.or(current.translation),
                            updated_at: now_iso(),
                            ..current
                        };
                        vocabulary_ops::update_entry(&mut *tx, &entry).await?;
                        MarkOutcome { entry, created: false, changed: true, previous_status: Some(previous) }
                    }
                }
            };

            tx.commit().await?;
            Ok(outcome)
        })
        .await?;

        tracing::debug!(
            learner_id,
            word = %outcome.entry.word,
            status = status.as_str(),
            created = outcome.created,
            changed = outcome.changed,
            "vocabulary marked"
        );
        Ok(outcome)
    }

    pub async fn mark_grammar(
        &self,
        learner_id: &str,
        pattern_id: &str,
        status: &str,
    ) -> Result<GrammarMark, EngineError> {
        validate_learner_id(learner_id)?;
        let status = GrammarStatus::parse(status).ok_or_else(|| {
            EngineError::validation(format!(
                "unknown grammar status '{status}', expected known or practice"
            ))
        })?;
        let pattern = grammar_catalog::find_pattern(pattern_id).ok_or_else(|| {
            EngineError::validation(format!("unknown grammar pattern '{}'", pattern_id.trim()))
        })?;

        let _guard = self.locks.lock(learner_id).await;
        let outcome = within_store_timeout(self.proxy.store_timeout(), async {
            let mut tx = self.proxy.pool().begin().await?;
            let existing = grammar_ops::find_entry(&mut *tx, learner_id, pattern.id).await?;

            let outcome = match existing {
                None => {
                    let now = now_iso();
                    let entry = GrammarEntry {
                        id: Uuid::new_v4().to_string(),
                        learner_id: learner_id.to_string(),
                        pattern_id: pattern.id.to_string(),
                        status,
                        catalog_version: CATALOG_VERSION,
                        created_at: now.clone(),
                        updated_at: now,
                    };
                    grammar_ops::insert_entry(&mut *tx, &entry).await?;
                    MarkOutcome { entry, created: true, changed: true, previous_status: None }
                }
                Some(current) if current.status == status => {
                    let previous = current.status;
                    MarkOutcome { entry: current, created: false, changed: false, previous_status: Some(previous) }
                }
                Some(current) => {
                    let previous = current.status;
                    let entry = GrammarEntry {
                        status,
                        catalog_version: CATALOG_VERSION,
                        updated_at: now_iso(),
                        ..current
                    };
                    grammar_ops::update_entry(&mut *tx, &entry).await?;
                    MarkOutcome { entry, created: false, changed: true, previous_status: Some(previous) }
                }
            };

            tx.commit().await?;
            Ok(outcome)
        })
        .await?;

        tracing::debug!(
            learner_id,
            pattern_id = pattern.id,
            status = status.as_str(),
            created = outcome.created,
            "grammar marked"
        );
        Ok(outcome)
    }

    pub async fn forget_word(&self, learner_id: &str, word: &str) -> Result<bool, EngineError> {
        validate_learner_id(learner_id)?;
        let word = normalize_word(word)?;

        let _guard = self.locks.lock(learner_id).await;
        let removed = within_store_timeout(self.proxy.store_timeout(), async {
            Ok(vocabulary_ops::delete_entry(self.proxy.pool(), learner_id, &word).await?)
        })
        .await?;

        tracing::debug!(learner_id, word = %word, removed, "vocabulary entry forgotten");
        Ok(removed)
    }

    pub async fn list_vocabulary(
        &self,
        learner_id: &str,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<VocabularyEntry>, EngineError> {
        validate_learner_id(learner_id)?;
        let status = match status {
            Some(raw) => Some(
                VocabularyStatus::parse(raw)
                    .ok_or_else(|| EngineError::validation(format!("unknown vocabulary status '{raw}'")))?,
            ),
            None => None,
        };
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = offset.max(0);

        within_store_timeout(self.proxy.store_timeout(), async {
            Ok(vocabulary_ops::list_entries(self.proxy.pool(), learner_id, status, limit, offset).await?)
        })
        .await
    }

    pub async fn vocabulary_stats(&self, learner_id: &str) -> Result<VocabularyStats, EngineError> {
        validate_learner_id(learner_id)?;
        let counts = within_store_timeout(self.proxy.store_timeout(), async {
            Ok(vocabulary_ops::count_by_status(self.proxy.pool(), learner_id).await?)
        })
        .await?;

        let get = |status| counts.get(&status).copied().unwrap_or(0);
        let stats = VocabularyStats {
            known: get(VocabularyStatus::Known),
            unknown: get(VocabularyStatus::Unknown),
            learning: get(VocabularyStatus::Learning),
            ignore: get(VocabularyStatus::Ignore),
            total: counts.values().sum(),
        };
        Ok(stats)
    }

    pub async fn grammar_entries(&self, learner_id: &str) -> Result<Vec<GrammarEntry>, EngineError> {
        validate_learner_id(learner_id)?;
        within_store_timeout(self.proxy.store_timeout(), async {
            Ok(grammar_ops::list_entries(self.proxy.pool(), learner_id).await?)
        })
        .await
    }

    pub async fn grammar_overview(&self, learner_id: &str) -> Result<GrammarOverview, EngineError> {
        let entries = self.grammar_entries(learner_id).await?;
        let statuses: HashMap<&str, GrammarStatus> = entries
            .iter()
            .map(|e| (e.pattern_id.as_str(), e.status))
            .collect();

        let tiers = CefrLevel::ALL
            .iter()
            .map(|&level| {
                let mut tier = GrammarTierOverview {
                    level,
                    known: Vec::new(),
                    practicing: Vec::new(),
                    missing: Vec::new(),
                    completion_percentage: 0.0,
                };
                for pattern in grammar_catalog::patterns_for(level) {
                    match statuses.get(pattern.id) {
                        Some(GrammarStatus::Known) => tier.known.push(pattern.id.to_string()),
                        Some(GrammarStatus::Practice) => tier.practicing.push(pattern.id.to_string()),
                        None => tier.missing.push(pattern.id.to_string()),
                    }
                }
                let required = grammar_catalog::required_count(level).max(1) as f64;
                tier.completion_percentage =
                    (tier.known.len() as f64 / required * 1000.0).round() / 10.0;
                tier
            })
            .collect();

        Ok(GrammarOverview {
            catalog_version: CATALOG_VERSION,
            tiers,
        })
    }

    pub async fn knowledge_counts(&self, learner_id: &str) -> Result<KnowledgeCounts, EngineError> {
        let stats = self.vocabulary_stats(learner_id).await?;
        let entries = self.grammar_entries(learner_id).await?;

        let mut known_grammar = BTreeMap::new();
        let mut known_patterns = BTreeSet::new();
        for entry in entries.iter().filter(|e| e.status == GrammarStatus::Known) {
            // entries for patterns dropped from the catalog no longer count
            if let Some(pattern) = grammar_catalog::find_pattern(&entry.pattern_id) {
                *known_grammar.entry(pattern.level).or_insert(0) += 1;
                known_patterns.insert(pattern.id.to_string());
            }
        }

        Ok(KnowledgeCounts {
            known_vocabulary: stats.known.max(0) as u64,
            known_grammar,
            known_patterns,
        })
    }

    pub async fn word_statuses(
        &self,
        learner_id: &str,
        words: &[String],
    ) -> Result<HashMap<String, VocabularyStatus>, EngineError> {
        validate_learner_id(learner_id)?;
        if words.is_empty() {
            return Ok(HashMap::new());
        }
        within_store_timeout(self.proxy.store_timeout(), async {
            Ok(vocabulary_ops::statuses_for_words(self.proxy.pool(), learner_id, words).await?)
        })
        .await
    }

    /// Sample of recently learned words, newest first.
    pub async fn known_words(&self, learner_id: &str, limit: usize) -> Result<Vec<String>, EngineError> {
        validate_learner_id(learner_id)?;
        let limit = limit.min(i64::MAX as usize) as i64;
        within_store_timeout(self.proxy.store_timeout(), async {
            Ok(vocabulary_ops::recent_words(self.proxy.pool(), learner_id, VocabularyStatus::Known, limit).await?)
        })
        .await
    }
}

fn normalize_translation(translation: Option<&str>) -> Result<Option<String>, EngineError> {
    let Some(raw) = translation.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if raw.chars().count() > MAX_TRANSLATION_LEN {
        return Err(EngineError::validation("translation is too long"));
    }
    Ok(Some(raw.to_string()))
}
