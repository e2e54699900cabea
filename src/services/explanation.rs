use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{OnceCell, Semaphore};

use crate::config::{env_parse, env_string};
use crate::db::operations::explanations as explanation_ops;
use crate::db::{now_iso, DatabaseProxy};
use crate::services::error::{within_store_timeout, EngineError};
use crate::services::llm_provider::{extract_json_object, GenerationRequest, TextGenerator};
use crate::services::tokenizer::normalize_word;

const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_WARM_CONCURRENCY: usize = 4;
const DEFAULT_MAX_WARM_WORDS: usize = 100;
const DEFAULT_TARGET_LANGUAGE: &str = "Turkish";
const MAX_FIELD_CHARS: usize = 1_000;

#[derive(Debug, Clone)]
pub struct ExplanationConfig {
    pub generation_timeout: Duration,
    pub warm_concurrency: usize,
    pub max_warm_words: usize,
    pub target_language: String,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_millis(DEFAULT_GENERATION_TIMEOUT_MS),
            warm_concurrency: DEFAULT_WARM_CONCURRENCY,
            max_warm_words: DEFAULT_MAX_WARM_WORDS,
            target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
        }
    }
}

impl ExplanationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            generation_timeout: env_parse::<u64>("EXPLANATION_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.generation_timeout),
            warm_concurrency: env_parse::<usize>("EXPLANATION_WARM_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.warm_concurrency),
            max_warm_words: env_parse::<usize>("EXPLANATION_MAX_WARM_WORDS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_warm_words),
            target_language: env_string("EXPLANATION_TARGET_LANGUAGE")
                .unwrap_or(defaults.target_language),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationSource {
    Cached,
    Generated,
    Placeholder,
}

/// Row shape of the global explanation cache.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredExplanation {
    pub word: String,
    pub meaning: String,
    pub example_sentence: String,
    pub example_translation: String,
    pub difficulty_rating: u8,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub word: String,
    pub meaning: String,
    pub example_sentence: String,
    pub example_translation: String,
    pub difficulty_rating: u8,
    pub created_at: Option<String>,
    pub source: ExplanationSource,
}

impl Explanation {
    fn from_stored(stored: StoredExplanation, source: ExplanationSource) -> Self {
        Self {
            word: stored.word,
            meaning: stored.meaning,
            example_sentence: stored.example_sentence,
            example_translation: stored.example_translation,
            difficulty_rating: stored.difficulty_rating,
            created_at: Some(stored.created_at),
            source,
        }
    }

    fn placeholder(word: &str) -> Self {
        Self {
            word: word.to_string(),
            meaning: format!("An explanation for \"{word}\" is not available right now."),
            example_sentence: format!("Example with {word}."),
            example_translation: String::new(),
            difficulty_rating: 1,
            created_at: None,
            source: ExplanationSource::Placeholder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedExplanation {
    #[serde(alias = "turkish_meaning", alias = "definition")]
    meaning: String,
    #[serde(alias = "english_example", alias = "example_sentence")]
    example: String,
    #[serde(alias = "exampleTranslation")]
    example_translation: String,
    #[serde(alias = "difficulty_level", alias = "difficultyRating")]
    difficulty_rating: serde_json::Value,
}

/// Validates raw generator output against the explanation contract.
pub fn parse_generated(word: &str, raw: &str) -> Result<StoredExplanation, String> {
    let json = extract_json_object(raw).ok_or("no JSON object in output")?;
    let parsed: GeneratedExplanation = serde_json::from_str(json).map_err(|e| e.to_string())?;

    let rating = match &parsed.difficulty_rating {
        serde_json::Value::Number(n) => n.as_f64().map(f64::round),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().map(f64::round),
        _ => None,
    }
    .ok_or("difficulty_rating is not a number")?;
    if !(1.0..=10.0).contains(&rating) {
        return Err(format!("difficulty_rating {rating} outside 1..=10"));
    }

    let field = |name: &str, value: &str| -> Result<String, String> {
        let value = value.trim();
        if value.is_empty() {
            return Err(format!("{name} is empty"));
        }
        if value.chars().count() > MAX_FIELD_CHARS {
            return Err(format!("{name} is too long"));
        }
        Ok(value.to_string())
    };

    Ok(StoredExplanation {
        word: word.to_string(),
        meaning: field("meaning", &parsed.meaning)?,
        example_sentence: field("example", &parsed.example)?,
        example_translation: field("example_translation", &parsed.example_translation)?,
        difficulty_rating: rating as u8,
        created_at: now_iso(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmReport {
    pub requested: usize,
    pub cached: usize,
    pub generated: usize,
    pub placeholder: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_cached_words: i64,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub generated: u64,
    pub placeholders: u64,
    pub recent_words: Vec<String>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    generated: AtomicU64,
    placeholders: AtomicU64,
}

/// Global word explanation cache with a per-word single-flight guard:
/// concurrent misses on one word share a single generation call.
pub struct ExplanationCache {
    proxy: Arc<DatabaseProxy>,
    generator: Arc<dyn TextGenerator>,
    config: ExplanationConfig,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<Explanation>>>>,
    /// Shared by every `warm` call on this cache.
    warm_slots: Arc<Semaphore>,
    counters: Counters,
}

impl ExplanationCache {
    pub fn new(proxy: Arc<DatabaseProxy>, generator: Arc<dyn TextGenerator>, config: ExplanationConfig) -> Self {
        let warm_slots = Arc::new(Semaphore::new(config.warm_concurrency.max(1)));
        Self {
            proxy,
            generator,
            config,
            in_flight: Mutex::new(HashMap::new()),
            warm_slots,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &ExplanationConfig {
        &self.config
    }

    pub async fn get(&self, word: &str) -> Result<Explanation, EngineError> {
        let key = normalize_word(word)?;

        if let Some(stored) = self.lookup(&key).await? {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(word = %key, "explanation cache hit");
            return Ok(Explanation::from_stored(stored, ExplanationSource::Cached));
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let cell = {
            let mut in_flight = self.in_flight.lock();
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };

        let result = cell.get_or_try_init(|| self.resolve_miss(&key)).await.cloned();

        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                in_flight.remove(&key);
            }
        }

        result
    }

    async fn lookup(&self, key: &str) -> Result<Option<StoredExplanation>, EngineError> {
        within_store_timeout(self.proxy.store_timeout(), async {
            Ok(explanation_ops::find(self.proxy.pool(), key).await?)
        })
        .await
    }

    async fn resolve_miss(&self, key: &str) -> Result<Explanation, EngineError> {
        // another flight may have finished between the first lookup and now
        if let Some(stored) = self.lookup(key).await? {
            return Ok(Explanation::from_stored(stored, ExplanationSource::Cached));
        }

        let generated = match self.generate(key).await {
            Ok(generated) => generated,
            Err(reason) => {
                self.counters.placeholders.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(word = %key, %reason, "explanation unavailable, serving placeholder");
                return Ok(Explanation::placeholder(key));
            }
        };

        let inserted = within_store_timeout(self.proxy.store_timeout(), async {
            Ok(explanation_ops::insert_if_absent(self.proxy.pool(), &generated).await?)
        })
        .await?;

        if !inserted {
            if let Some(existing) = self.lookup(key).await? {
                return Ok(Explanation::from_stored(existing, ExplanationSource::Cached));
            }
        }

        self.counters.generated.fetch_add(1, Ordering::Relaxed);
        tracing::info!(word = %key, rating = generated.difficulty_rating, "explanation generated");
        Ok(Explanation::from_stored(generated, ExplanationSource::Generated))
    }

    async fn generate(&self, key: &str) -> Result<StoredExplanation, String> {
        if !self.generator.is_available() {
            return Err("generator not configured".to_string());
        }

        let request = GenerationRequest::new(
            "You are an English teacher writing short dictionary entries for language learners. \
             Reply with a single JSON object and nothing else.",
            explanation_prompt(key, &self.config.target_language),
        );

        let raw = match tokio::time::timeout(self.config.generation_timeout, self.generator.generate(request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return Err(err.to_string()),
            Err(_) => return Err(format!("timed out after {:?}", self.config.generation_timeout)),
        };

        parse_generated(key, &raw)
    }

    /// Resolves many words. At most `warm_concurrency` warm-up lookups run at
    /// once across all concurrent `warm` calls on this cache.
    pub async fn warm(&self, words: &[String]) -> WarmReport {
        let mut keys: Vec<String> = Vec::new();
        for word in words {
            if let Ok(key) = normalize_word(word) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys.truncate(self.config.max_warm_words);

        let tasks: Vec<_> = keys
            .iter()
            .map(|key| {
                let sem = Arc::clone(&self.warm_slots);
                async move {
                    let _permit = sem.acquire().await.ok();
                    self.get(key).await
                }
            })
            .collect();

        let mut report = WarmReport {
            requested: keys.len(),
            ..WarmReport::default()
        };
        for result in join_all(tasks).await {
            match result.map(|e| e.source) {
                Ok(ExplanationSource::Cached) => report.cached += 1,
                Ok(ExplanationSource::Generated) => report.generated += 1,
                Ok(ExplanationSource::Placeholder) => report.placeholder += 1,
                Err(err) => {
                    tracing::warn!(error = %err, "explanation warm-up failed for one word");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            requested = report.requested,
            generated = report.generated,
            placeholder = report.placeholder,
            "explanation warm-up finished"
        );
        report
    }

    pub async fn stats(&self) -> Result<CacheStats, EngineError> {
        let (total, recent) = within_store_timeout(self.proxy.store_timeout(), async {
            let pool = self.proxy.pool();
            Ok((explanation_ops::count(pool).await?, explanation_ops::recent_words(pool, 10).await?))
        })
        .await?;

        Ok(CacheStats {
            total_cached_words: total,
            in_flight: self.in_flight.lock().len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            generated: self.counters.generated.load(Ordering::Relaxed),
            placeholders: self.counters.placeholders.load(Ordering::Relaxed),
            recent_words: recent,
        })
    }
}

fn explanation_prompt(word: &str, language: &str) -> String {
    format!(
        r#"Explain the English word "{word}" for {language}-speaking learners.

Provide:
1. meaning: a clear, simple {language} translation
2. example: a natural English sentence using the word in its most common sense
3. example_translation: the {language} translation of that sentence
4. difficulty_rating: an integer from 1 (basic) to 10 (advanced)

Output format:
{{"meaning": "...", "example": "...", "example_translation": "...", "difficulty_rating": 3}}"#
    )
}
