use std::sync::Arc;

use serde::Serialize;

use crate::config::{env_parse, env_string};
use crate::services::difficulty::round1;
use crate::services::error::EngineError;
use crate::services::grammar_catalog::{self, CefrLevel};
use crate::services::knowledge::{KnowledgeCounts, KnowledgeStore};

pub const DEFAULT_VOCABULARY_THRESHOLDS: [u64; 6] = [1_000, 2_000, 5_000, 7_500, 10_000, 15_000];
const DEFAULT_VOCABULARY_WEIGHT: f64 = 0.5;
const DEFAULT_BALANCE_MARGIN: f64 = 15.0;
const MAX_RECOMMENDATIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierRequirement {
    pub level: CefrLevel,
    pub vocabulary_required: u64,
    pub grammar_required: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelConfig {
    pub tiers: Vec<TierRequirement>,
    /// Share of `vocabulary_score` in `total_score`; grammar gets the rest.
    pub vocabulary_weight: f64,
    pub balance_margin: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        match Self::with_thresholds(&DEFAULT_VOCABULARY_THRESHOLDS) {
            Ok(config) => config,
            Err(_) => Self {
                tiers: Vec::new(),
                vocabulary_weight: DEFAULT_VOCABULARY_WEIGHT,
                balance_margin: DEFAULT_BALANCE_MARGIN,
            },
        }
    }
}

impl LevelConfig {
    /// Builds the tier ladder from vocabulary thresholds (A1..C2); grammar
    /// requirements come from the catalog.
    pub fn with_thresholds(thresholds: &[u64]) -> Result<Self, String> {
        if thresholds.len() != CefrLevel::ALL.len() {
            return Err(format!(
                "expected {} vocabulary thresholds, got {}",
                CefrLevel::ALL.len(),
                thresholds.len()
            ));
        }

        let tiers = CefrLevel::ALL
            .iter()
            .zip(thresholds)
            .map(|(&level, &vocabulary_required)| TierRequirement {
                level,
                vocabulary_required,
                grammar_required: grammar_catalog::required_count(level) as u64,
            })
            .collect();

        let config = Self {
            tiers,
            vocabulary_weight: DEFAULT_VOCABULARY_WEIGHT,
            balance_margin: DEFAULT_BALANCE_MARGIN,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = match env_string("LEVEL_VOCAB_THRESHOLDS") {
            Some(raw) => {
                let parsed: Result<Vec<u64>, _> =
                    raw.split(',').map(|v| v.trim().parse::<u64>()).collect();
                match parsed.map_err(|e| e.to_string()).and_then(|v| Self::with_thresholds(&v)) {
                    Ok(config) => config,
                    Err(err) => {
                        tracing::warn!(error = %err, "invalid LEVEL_VOCAB_THRESHOLDS, using defaults");
                        Self::default()
                    }
                }
            }
            None => Self::default(),
        };

        if let Some(weight) = env_parse::<f64>("LEVEL_VOCAB_WEIGHT") {
            if (0.0..=1.0).contains(&weight) {
                config.vocabulary_weight = weight;
            } else {
                tracing::warn!(weight, "LEVEL_VOCAB_WEIGHT outside [0, 1], ignored");
            }
        }
        if let Some(margin) = env_parse::<f64>("LEVEL_BALANCE_MARGIN") {
            if margin >= 0.0 {
                config.balance_margin = margin;
            }
        }

        config
    }

    /// Vocabulary thresholds must strictly increase; every tier needs at least
    /// one grammar pattern so the cumulative grammar requirement increases too.
    pub fn validate(&self) -> Result<(), String> {
        if self.tiers.is_empty() {
            return Err("at least one tier is required".to_string());
        }
        let mut previous_vocabulary = 0;
        for tier in &self.tiers {
            if tier.vocabulary_required <= previous_vocabulary {
                return Err(format!(
                    "vocabulary threshold for {} must exceed {}",
                    tier.level, previous_vocabulary
                ));
            }
            if tier.grammar_required == 0 {
                return Err(format!("tier {} has no grammar patterns", tier.level));
            }
            previous_vocabulary = tier.vocabulary_required;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Balance {
    Balanced,
    VocabularyStrong,
    GrammarStrong,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub vocabulary_count: u64,
    pub vocabulary_required: u64,
    pub vocabulary_remaining: u64,
    pub vocabulary_progress: f64,
    pub grammar_known: u64,
    pub grammar_required: u64,
    pub grammar_remaining: u64,
    pub grammar_progress: f64,
    pub overall_progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierProgress {
    pub level: CefrLevel,
    pub vocabulary_required: u64,
    pub vocabulary_progress: f64,
    pub grammar_known: u64,
    pub grammar_required: u64,
    pub grammar_progress: f64,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarRecommendation {
    pub pattern_id: String,
    pub name: String,
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelSnapshot {
    pub level: CefrLevel,
    pub next_level: Option<CefrLevel>,
    pub vocabulary_score: f64,
    pub grammar_score: f64,
    pub total_score: f64,
    pub balance: Balance,
    pub current_level_progress: LevelProgress,
    pub tiers: Vec<TierProgress>,
    pub recommendations: Vec<GrammarRecommendation>,
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        1.0
    } else {
        (part as f64 / whole as f64).min(1.0)
    }
}

/// Scores a learner from their knowledge counts. Pure; never fails.
///
/// Tiers unlock in order: the learner sits in the first tier whose vocabulary
/// or grammar requirement is not yet met (or the top tier). Scores place the
/// learner on the whole ladder, each tier worth an equal band, so more known
/// words never lower `vocabulary_score`.
pub fn compute_snapshot(config: &LevelConfig, counts: &KnowledgeCounts) -> LevelSnapshot {
    let tier_count = config.tiers.len().max(1) as f64;
    let band = 100.0 / tier_count;

    let mut tiers = Vec::with_capacity(config.tiers.len());
    let mut vocabulary_score = 0.0_f64;
    let mut grammar_score = 0.0_f64;
    let mut previous_required = 0u64;

    for tier in &config.tiers {
        let grammar_known = counts.known_grammar.get(&tier.level).copied().unwrap_or(0);
        let vocabulary_progress = ratio(counts.known_vocabulary, tier.vocabulary_required);
        let grammar_progress = ratio(grammar_known, tier.grammar_required);

        let span = tier.vocabulary_required.saturating_sub(previous_required);
        let band_fill = ratio(counts.known_vocabulary.saturating_sub(previous_required), span);
        vocabulary_score += band * band_fill;
        grammar_score += band * grammar_progress;
        previous_required = tier.vocabulary_required;

        tiers.push(TierProgress {
            level: tier.level,
            vocabulary_required: tier.vocabulary_required,
            vocabulary_progress: round1(vocabulary_progress * 100.0),
            grammar_known,
            grammar_required: tier.grammar_required,
            grammar_progress: round1(grammar_progress * 100.0),
            completed: vocabulary_progress >= 1.0 && grammar_progress >= 1.0,
        });
    }

    let current_index = tiers
        .iter()
        .position(|t| !t.completed)
        .unwrap_or(tiers.len().saturating_sub(1));

    let vocabulary_score = round1(vocabulary_score.min(100.0));
    let grammar_score = round1(grammar_score.min(100.0));
    let total_score = round1(
        config.vocabulary_weight * vocabulary_score + (1.0 - config.vocabulary_weight) * grammar_score,
    );

    let balance = if vocabulary_score - grammar_score > config.balance_margin {
        Balance::VocabularyStrong
    } else if grammar_score - vocabulary_score > config.balance_margin {
        Balance::GrammarStrong
    } else {
        Balance::Balanced
    };

    let Some(current) = config.tiers.get(current_index) else {
        return LevelSnapshot {
            level: CefrLevel::A1,
            next_level: CefrLevel::A1.next(),
            vocabulary_score,
            grammar_score,
            total_score,
            balance,
            current_level_progress: LevelProgress {
                vocabulary_count: counts.known_vocabulary,
                vocabulary_required: 0,
                vocabulary_remaining: 0,
                vocabulary_progress: 0.0,
                grammar_known: 0,
                grammar_required: 0,
                grammar_remaining: 0,
                grammar_progress: 0.0,
                overall_progress: 0.0,
            },
            tiers,
            recommendations: Vec::new(),
        };
    };

    let grammar_known = counts.known_grammar.get(&current.level).copied().unwrap_or(0);
    let vocabulary_progress = round1(ratio(counts.known_vocabulary, current.vocabulary_required) * 100.0);
    let grammar_progress = round1(ratio(grammar_known, current.grammar_required) * 100.0);

    let recommendations = grammar_catalog::patterns_for(current.level)
        .filter(|p| !counts.known_patterns.contains(p.id))
        .take(MAX_RECOMMENDATIONS)
        .map(|p| GrammarRecommendation {
            pattern_id: p.id.to_string(),
            name: p.name.to_string(),
            example: p.example.to_string(),
        })
        .collect();

    LevelSnapshot {
        level: current.level,
        next_level: config.tiers.get(current_index + 1).map(|t| t.level),
        vocabulary_score,
        grammar_score,
        total_score,
        balance,
        current_level_progress: LevelProgress {
            vocabulary_count: counts.known_vocabulary,
            vocabulary_required: current.vocabulary_required,
            vocabulary_remaining: current.vocabulary_required.saturating_sub(counts.known_vocabulary),
            vocabulary_progress,
            grammar_known,
            grammar_required: current.grammar_required,
            grammar_remaining: current.grammar_required.saturating_sub(grammar_known),
            grammar_progress,
            overall_progress: vocabulary_progress.min(grammar_progress),
        },
        tiers,
        recommendations,
    }
}

pub struct LevelEngine {
    knowledge: Arc<KnowledgeStore>,
    config: LevelConfig,
}

impl LevelEngine {
    pub fn new(knowledge: Arc<KnowledgeStore>, config: LevelConfig) -> Self {
        Self { knowledge, config }
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub async fn snapshot(&self, learner_id: &str) -> Result<LevelSnapshot, EngineError> {
        Ok(self.snapshot_with_counts(learner_id).await?.0)
    }

    /// Snapshot together with the counts it was scored from, read in one
    /// store round.
    pub async fn snapshot_with_counts(&self, learner_id: &str) -> Result<(LevelSnapshot, KnowledgeCounts), EngineError> {
        let counts = self.knowledge.knowledge_counts(learner_id).await?;
        let snapshot = compute_snapshot(&self.config, &counts);
        tracing::debug!(
            learner_id,
            level = %snapshot.level,
            total_score = snapshot.total_score,
            "level computed"
        );
        Ok((snapshot, counts))
    }
}
