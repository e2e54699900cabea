use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::env_parse;
use crate::db::now_iso;
use crate::db::operations::adaptations as adaptation_ops;
use crate::services::difficulty::{round1, validate_text, DifficultyAnalyzer, TextAnalysis, MAX_TEXT_CHARS};
use crate::services::error::{validate_learner_id, within_store_timeout, EngineError};
use crate::services::grammar_catalog::{self, CefrLevel};
use crate::services::knowledge::KnowledgeStore;
use crate::services::level::LevelEngine;
use crate::services::llm_provider::{GenerationRequest, TextGenerator};

const DEFAULT_TOLERANCE: f64 = 3.0;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_WALL_CLOCK_MS: u64 = 90_000;
const DEFAULT_TARGET: f64 = 10.0;
const DEFAULT_KNOWN_WORDS_LIMIT: usize = 100;
const MAX_AVOID_PATTERNS: usize = 15;
const MAX_KNOWN_PATTERNS: usize = 20;

const SYSTEM_PROMPT: &str = "You are an expert English teacher who rewrites texts so that a specific \
learner can read them. You preserve meaning, never add commentary, and reply with the rewritten text only.";

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationConfig {
    /// Accepted distance, in percentage points, from the target unknown share.
    pub tolerance: f64,
    pub max_attempts: u32,
    pub wall_clock: Duration,
    pub default_target: f64,
    pub known_words_limit: usize,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wall_clock: Duration::from_millis(DEFAULT_WALL_CLOCK_MS),
            default_target: DEFAULT_TARGET,
            known_words_limit: DEFAULT_KNOWN_WORDS_LIMIT,
        }
    }
}

impl AdaptationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tolerance: env_parse::<f64>("ADAPT_TOLERANCE")
                .filter(|t| t.is_finite() && *t >= 0.0)
                .unwrap_or(defaults.tolerance),
            max_attempts: env_parse::<u32>("ADAPT_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            wall_clock: env_parse::<u64>("ADAPT_WALL_CLOCK_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.wall_clock),
            default_target: env_parse::<f64>("ADAPT_DEFAULT_TARGET")
                .filter(|t| (0.0..=100.0).contains(t))
                .unwrap_or(defaults.default_target),
            known_words_limit: env_parse::<usize>("PROMPT_KNOWN_WORDS_LIMIT")
                .unwrap_or(defaults.known_words_limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationRecord {
    pub id: String,
    pub learner_id: String,
    pub source_hash: String,
    pub target_unknown_percentage: f64,
    pub adapted_text: String,
    pub unknown_percentage: f64,
    pub converged: bool,
    pub attempts: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationResult {
    pub adapted_text: String,
    pub analysis: TextAnalysis,
    pub converged: bool,
    pub attempts: u32,
    pub target_unknown_percentage: f64,
    pub baseline: TextAnalysis,
    pub cached: bool,
}

/// How the next candidate should move relative to the last one.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Feedback {
    Simpler { measured: f64 },
    Richer { measured: f64 },
    Unusable,
}

#[derive(Debug, Clone, Default)]
struct PromptContext {
    level: Option<CefrLevel>,
    known_words: Vec<String>,
    known_patterns: Vec<String>,
    avoid_patterns: Vec<String>,
}

pub struct AdaptationEngine {
    analyzer: Arc<DifficultyAnalyzer>,
    knowledge: Arc<KnowledgeStore>,
    levels: Arc<LevelEngine>,
    generator: Arc<dyn TextGenerator>,
    config: AdaptationConfig,
}

impl AdaptationEngine {
    pub fn new(
        analyzer: Arc<DifficultyAnalyzer>,
        knowledge: Arc<KnowledgeStore>,
        levels: Arc<LevelEngine>,
        generator: Arc<dyn TextGenerator>,
        config: AdaptationConfig,
    ) -> Self {
        Self {
            analyzer,
            knowledge,
            levels,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &AdaptationConfig {
        &self.config
    }

    /// Rewrites `text` toward `target` percent unknown words for the learner.
    ///
    /// Runs a bounded search: each candidate is measured against the
    /// learner's current knowledge and the closest one is kept. Failing to
    /// converge is reported through `converged`, not as an error.
    pub async fn adapt(
        &self,
        text: &str,
        learner_id: &str,
        target: Option<f64>,
    ) -> Result<AdaptationResult, EngineError> {
        validate_learner_id(learner_id)?;
        validate_text(text)?;
        let target = target.unwrap_or(self.config.default_target);
        if !target.is_finite() || !(0.0..=100.0).contains(&target) {
            return Err(EngineError::validation("targetUnknownPercentage must be within 0..=100"));
        }

        let deadline = Instant::now() + self.config.wall_clock;
        let baseline = self
            .before_deadline(deadline, self.analyzer.analyze(text, learner_id))
            .await?;

        if self.within_tolerance(&baseline, target) {
            tracing::debug!(learner_id, unknown = baseline.unknown_percentage, "source already at target");
            return Ok(AdaptationResult {
                adapted_text: text.to_string(),
                analysis: baseline.clone(),
                converged: true,
                attempts: 0,
                target_unknown_percentage: target,
                baseline,
                cached: false,
            });
        }

        let hash = source_hash(text);
        if let Some(result) = self
            .before_deadline(deadline, self.reuse_stored(learner_id, &hash, target, &baseline))
            .await?
        {
            return Ok(result);
        }

        if !self.generator.is_available() {
            tracing::warn!(learner_id, "generator unavailable, returning source text");
            return Ok(self.unchanged(text, baseline, target, 0));
        }

        let context = self.before_deadline(deadline, self.prompt_context(learner_id)).await?;

        let mut best: Option<(String, TextAnalysis)> = None;
        let mut feedback: Option<Feedback> = None;
        let mut attempts = 0;

        while attempts < self.config.max_attempts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(learner_id, attempts, "adaptation wall-clock budget exhausted");
                break;
            }
            attempts += 1;

            let prompt = build_prompt(&context, text, target, feedback);
            let request = GenerationRequest::new(SYSTEM_PROMPT, prompt)
                .with_temperature(0.3 + 0.1 * attempts as f32);

            let raw = match tokio::time::timeout(remaining, self.generator.generate(request)).await {
                Ok(Ok(raw)) => raw,
                Ok(Err(err)) => {
                    tracing::warn!(learner_id, attempts, error = %err, "adaptation candidate request failed");
                    break;
                }
                Err(_) => {
                    tracing::warn!(learner_id, attempts, "adaptation candidate timed out");
                    break;
                }
            };

            let candidate = clean_candidate(&raw);
            if candidate.is_empty() || candidate.chars().count() > MAX_TEXT_CHARS {
                feedback = Some(Feedback::Unusable);
                continue;
            }

            let measuring = self.analyzer.measure_candidate(&candidate, learner_id);
            let analysis = match tokio::time::timeout_at(deadline, measuring).await {
                Ok(analysis) => analysis?,
                Err(_) => {
                    tracing::warn!(learner_id, attempts, "adaptation budget exhausted while measuring");
                    break;
                }
            };
            if analysis.total_unique_words == 0 {
                feedback = Some(Feedback::Unusable);
                continue;
            }

            let measured = analysis.unknown_percentage;
            let distance = (measured - target).abs();
            tracing::debug!(learner_id, attempts, measured, target, "adaptation candidate measured");

            feedback = Some(if measured > target {
                Feedback::Simpler { measured }
            } else {
                Feedback::Richer { measured }
            });

            let closer = best
                .as_ref()
                .map_or(true, |(_, b)| distance < (b.unknown_percentage - target).abs());
            if closer {
                best = Some((candidate, analysis));
            }
            if distance <= self.config.tolerance {
                break;
            }
        }

        let Some((adapted_text, analysis)) = best else {
            tracing::info!(learner_id, attempts, "no usable adaptation candidate");
            return Ok(self.unchanged(text, baseline, target, attempts));
        };

        let converged = self.within_tolerance(&analysis, target);
        let record = AdaptationRecord {
            id: Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            source_hash: hash,
            target_unknown_percentage: target,
            adapted_text: adapted_text.clone(),
            unknown_percentage: analysis.unknown_percentage,
            converged,
            attempts,
            created_at: now_iso(),
        };
        let proxy = self.knowledge.proxy();
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::warn!(learner_id, "adaptation budget exhausted, result not persisted");
        } else if let Err(err) = within_store_timeout(remaining.min(proxy.store_timeout()), async {
            Ok(adaptation_ops::insert(proxy.pool(), &record).await?)
        })
        .await
        {
            tracing::warn!(learner_id, error = %err, "failed to persist adaptation result");
        }

        tracing::info!(
            learner_id,
            attempts,
            converged,
            baseline = baseline.unknown_percentage,
            result = analysis.unknown_percentage,
            target,
            "text adapted"
        );

        Ok(AdaptationResult {
            adapted_text,
            analysis,
            converged,
            attempts,
            target_unknown_percentage: target,
            baseline,
            cached: false,
        })
    }

    pub async fn history(&self, learner_id: &str, limit: i64) -> Result<Vec<AdaptationRecord>, EngineError> {
        validate_learner_id(learner_id)?;
        let proxy = self.knowledge.proxy();
        within_store_timeout(proxy.store_timeout(), async {
            Ok(adaptation_ops::list_for_learner(proxy.pool(), learner_id, limit.clamp(1, 100)).await?)
        })
        .await
    }

    /// Store work ahead of the candidate loop counts against the same
    /// wall-clock budget as generation.
    async fn before_deadline<T>(
        &self,
        deadline: Instant,
        work: impl std::future::Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout_at(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(budget = ?self.config.wall_clock, "adaptation budget spent before generation");
                Err(EngineError::StoreTimeout(self.config.wall_clock))
            }
        }
    }

    fn within_tolerance(&self, analysis: &TextAnalysis, target: f64) -> bool {
        analysis.total_unique_words > 0
            && (analysis.unknown_percentage - target).abs() <= self.config.tolerance + f64::EPSILON
    }

    fn unchanged(&self, text: &str, baseline: TextAnalysis, target: f64, attempts: u32) -> AdaptationResult {
        AdaptationResult {
            adapted_text: text.to_string(),
            analysis: baseline.clone(),
            converged: false,
            attempts,
            target_unknown_percentage: target,
            baseline,
            cached: false,
        }
    }

    /// A stored result is reused only if it still measures within tolerance
    /// against the learner's knowledge today.
    async fn reuse_stored(
        &self,
        learner_id: &str,
        hash: &str,
        target: f64,
        baseline: &TextAnalysis,
    ) -> Result<Option<AdaptationResult>, EngineError> {
        let proxy = self.knowledge.proxy();
        let stored = within_store_timeout(proxy.store_timeout(), async {
            Ok(adaptation_ops::find_latest_converged(proxy.pool(), learner_id, hash, target).await?)
        })
        .await?;
        let Some(stored) = stored else {
            return Ok(None);
        };

        let analysis = self.analyzer.measure_candidate(&stored.adapted_text, learner_id).await?;
        if !self.within_tolerance(&analysis, target) {
            return Ok(None);
        }

        tracing::debug!(learner_id, record_id = %stored.id, "reusing stored adaptation");
        Ok(Some(AdaptationResult {
            adapted_text: stored.adapted_text,
            analysis,
            converged: true,
            attempts: stored.attempts,
            target_unknown_percentage: target,
            baseline: baseline.clone(),
            cached: true,
        }))
    }

    async fn prompt_context(&self, learner_id: &str) -> Result<PromptContext, EngineError> {
        let known_words = self
            .knowledge
            .known_words(learner_id, self.config.known_words_limit)
            .await?;
        let (snapshot, counts) = self.levels.snapshot_with_counts(learner_id).await?;

        // patterns more than one tier above the learner are off limits
        let avoid_patterns = grammar_catalog::catalog()
            .iter()
            .filter(|p| p.level.index() > snapshot.level.index() + 1)
            .filter(|p| !counts.known_patterns.contains(p.id))
            .take(MAX_AVOID_PATTERNS)
            .map(|p| p.id.to_string())
            .collect();

        Ok(PromptContext {
            level: Some(snapshot.level),
            known_words,
            known_patterns: counts.known_patterns.into_iter().take(MAX_KNOWN_PATTERNS).collect(),
            avoid_patterns,
        })
    }
}

fn build_prompt(context: &PromptContext, text: &str, target: f64, feedback: Option<Feedback>) -> String {
    let list = |items: &[String]| {
        if items.is_empty() {
            "(none recorded)".to_string()
        } else {
            items.join(", ")
        }
    };

    let mut prompt = String::new();
    prompt.push_str("Rewrite the text below for this English learner.\n\nLearner profile:\n");
    if let Some(level) = context.level {
        prompt.push_str(&format!("- Current level: {level}\n"));
    }
    prompt.push_str(&format!("- Known words (sample): {}\n", list(&context.known_words)));
    prompt.push_str(&format!("- Known grammar: {}\n", list(&context.known_patterns)));
    prompt.push_str(&format!("- Avoid grammar: {}\n\n", list(&context.avoid_patterns)));

    prompt.push_str(&format!(
        "Goal: about {target:.0}% of the distinct words should be new to the learner; \
         every other word should come from the learner's known vocabulary.\n\
         Keep the meaning and all key information. Prefer short, clear sentences.\n"
    ));

    match feedback {
        Some(Feedback::Simpler { measured }) => prompt.push_str(&format!(
            "Your previous version had {:.1}% unknown words, above the goal. \
             Use simpler, more common words and shorter sentences.\n",
            round1(measured)
        )),
        Some(Feedback::Richer { measured }) => prompt.push_str(&format!(
            "Your previous version had {:.1}% unknown words, below the goal. \
             Keep more of the original, less common vocabulary.\n",
            round1(measured)
        )),
        Some(Feedback::Unusable) => {
            prompt.push_str("Your previous reply contained no usable text. Reply with the rewritten text.\n")
        }
        None => {}
    }

    prompt.push_str("\nReply with the rewritten text only.\n\nText:\n\"\"\"\n");
    prompt.push_str(text.trim());
    prompt.push_str("\n\"\"\"");
    prompt
}

/// Strips code fences, a leading label and wrapping quotes from model output.
pub fn clean_candidate(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        text = rest.split_once('\n').map_or("", |(_, body)| body);
        text = text.trim_end();
        text = text.strip_suffix("```").unwrap_or(text).trim();
    }

    for label in ["Adapted text:", "Rewritten text:", "Text:"] {
        if let Some(head) = text.get(..label.len()) {
            if head.eq_ignore_ascii_case(label) {
                text = text[label.len()..].trim_start();
                break;
            }
        }
    }

    for (open, close) in [('"', '"'), ('\u{201C}', '\u{201D}'), ('\'', '\'')] {
        if text.chars().count() >= 2 && text.starts_with(open) && text.ends_with(close) {
            let inner = &text[open.len_utf8()..text.len() - close.len_utf8()];
            if !inner.contains(open) && !inner.contains(close) {
                text = inner.trim();
                break;
            }
        }
    }

    text.trim().to_string()
}

/// SHA-256 of the text with whitespace runs collapsed.
pub fn source_hash(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_fences_labels_and_quotes() {
        assert_eq!(clean_candidate("```text\nThe cat is big.\n```"), "The cat is big.");
        assert_eq!(clean_candidate("  \"The cat is big.\"  "), "The cat is big.");
        assert_eq!(clean_candidate("Adapted text: The cat is big."), "The cat is big.");
        assert_eq!(clean_candidate("\u{201C}Hi there\u{201D}"), "Hi there");
        assert_eq!(clean_candidate("\"A\" and \"B\""), "\"A\" and \"B\"");
        assert_eq!(clean_candidate("```\n```"), "");
    }

    #[test]
    fn hash_ignores_whitespace_layout() {
        assert_eq!(source_hash("a  b\nc"), source_hash(" a b c "));
        assert_ne!(source_hash("a b c"), source_hash("a b d"));
        assert_eq!(source_hash("x").len(), 64);
    }

    #[test]
    fn prompt_carries_constraints_and_feedback() {
        let context = PromptContext {
            level: Some(CefrLevel::A2),
            known_words: vec!["cat".into(), "big".into()],
            known_patterns: vec!["present_simple".into()],
            avoid_patterns: vec!["inversion".into()],
        };
        let prompt = build_prompt(&context, "The enormous feline.", 10.0, Some(Feedback::Simpler { measured: 42.0 }));
        assert!(prompt.contains("Current level: A2"));
        assert!(prompt.contains("cat, big"));
        assert!(prompt.contains("Avoid grammar: inversion"));
        assert!(prompt.contains("about 10%"));
        assert!(prompt.contains("42.0% unknown words, above the goal"));
        assert!(prompt.ends_with("The enormous feline.\n\"\"\""));

        let prompt = build_prompt(&PromptContext::default(), "x", 10.0, Some(Feedback::Richer { measured: 1.0 }));
        assert!(prompt.contains("below the goal"));
        assert!(prompt.contains("(none recorded)"));
    }

    #[test]
    fn config_defaults() {
        let config = AdaptationConfig::default();
        assert_eq!(config.tolerance, 3.0);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.default_target, 10.0);
    }
}
