use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use lexiflow_backend::config::EngineConfig;
use lexiflow_backend::db::DatabaseProxy;
use lexiflow_backend::services::difficulty::DifficultyLabel;
use lexiflow_backend::services::explanation::ExplanationSource;
use lexiflow_backend::services::llm_provider::TextGenerator;
use lexiflow_backend::services::{Engine, EngineError};

mod common;

use common::{explanation_json, words, ScriptedGenerator};

async fn mark_known(engine: &Engine, learner: &str, list: &[String]) {
    for word in list {
        engine.mark_vocabulary(learner, word, "known", None).await.unwrap();
    }
}

#[tokio::test]
async fn concurrent_misses_share_one_generation() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .reply(explanation_json("okyanus", 4))
            .with_delay(Duration::from_millis(100)),
    );
    let engine = common::engine_with(Arc::clone(&generator)).await;

    let results = join_all((0..8).map(|_| engine.get_explanation("ocean"))).await;

    assert_eq!(generator.calls(), 1);
    for result in &results {
        let explanation = result.as_ref().unwrap();
        assert_eq!(explanation.meaning, "okyanus");
        assert_eq!(explanation.difficulty_rating, 4);
        assert_ne!(explanation.source, ExplanationSource::Placeholder);
    }

    let again = engine.get_explanation("OCEAN").await.unwrap();
    assert_eq!(again.source, ExplanationSource::Cached);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn different_words_generate_independently() {
    let generator = Arc::new(ScriptedGenerator::new().always(explanation_json("anlam", 5)));
    let engine = common::engine_with(Arc::clone(&generator)).await;

    let (a, b) = tokio::join!(engine.get_explanation("north"), engine.get_explanation("south"));
    assert_eq!(a.unwrap().word, "north");
    assert_eq!(b.unwrap().word, "south");
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn placeholder_is_retried_on_next_request() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .fail("upstream 503")
            .reply(explanation_json("bulut", 2)),
    );
    let engine = common::engine_with(Arc::clone(&generator)).await;

    let first = engine.get_explanation("cloud").await.unwrap();
    assert_eq!(first.source, ExplanationSource::Placeholder);
    assert!(first.created_at.is_none());

    let second = engine.get_explanation("cloud").await.unwrap();
    assert_eq!(second.source, ExplanationSource::Generated);
    assert_eq!(second.meaning, "bulut");
}

#[tokio::test]
async fn explanation_rejects_non_words() {
    let engine = common::engine_with(Arc::new(ScriptedGenerator::new())).await;
    let err = engine.get_explanation("two words").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn adaptation_converges_with_feedback() {
    let known = words("k", 18);
    let unknown = words("z", 10);

    let halfway = format!("{} {}", known[..10].join(" "), unknown.join(" "));
    let close = format!("{} {}", known.join(" "), unknown[..2].join(" "));

    let generator = Arc::new(ScriptedGenerator::new().reply(halfway).reply(close.clone()));
    let engine = common::engine_with(Arc::clone(&generator)).await;
    mark_known(&engine, "ana", &known).await;

    let source = unknown.join(" ");
    let result = engine.adapt_text("ana", &source, Some(10.0)).await.unwrap();

    assert!(result.converged);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.adapted_text, close);
    assert_eq!(result.analysis.unknown_percentage, 10.0);
    assert_eq!(result.baseline.unknown_percentage, 100.0);
    assert!(!result.cached);

    let prompts = generator.prompts();
    assert!(prompts[0].contains("Known words (sample)"));
    assert!(prompts[1].contains("50.0% unknown words, above the goal"));

    let history = engine.adaptation().history("ana", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].converged);

    let reused = engine.adapt_text("ana", &source, Some(10.0)).await.unwrap();
    assert!(reused.cached);
    assert_eq!(reused.adapted_text, close);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn adaptation_reports_non_convergence_with_best_candidate() {
    let known = words("k", 10);
    let unknown = words("z", 10);
    let halfway = format!("{} {}", known.join(" "), unknown.join(" "));

    let generator = Arc::new(ScriptedGenerator::new().always(halfway.clone()));
    let engine = common::engine_with(Arc::clone(&generator)).await;
    mark_known(&engine, "ana", &known).await;

    let result = engine.adapt_text("ana", &unknown.join(" "), Some(10.0)).await.unwrap();

    assert!(!result.converged);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.adapted_text, halfway);
    assert_eq!(result.analysis.unknown_percentage, 50.0);
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn adaptation_upstream_failure_returns_source() {
    let generator = Arc::new(ScriptedGenerator::new().fail("rate limited"));
    let engine = common::engine_with(Arc::clone(&generator)).await;
    let source = "Ephemeral lanterns shimmer.";

    let result = engine.adapt_text("ana", source, None).await.unwrap();
    assert!(!result.converged);
    assert_eq!(result.adapted_text, source);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.target_unknown_percentage, 10.0);
}

#[tokio::test]
async fn adaptation_skips_generation_when_already_on_target() {
    let known = words("k", 20);
    let generator = Arc::new(ScriptedGenerator::new());
    let engine = common::engine_with(Arc::clone(&generator)).await;
    mark_known(&engine, "ana", &known[..18]).await;

    let result = engine.adapt_text("ana", &known.join(" "), Some(10.0)).await.unwrap();
    assert!(result.converged);
    assert_eq!(result.attempts, 0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn adaptation_respects_wall_clock_budget() {
    let mut config = EngineConfig::default();
    config.adaptation.wall_clock = Duration::from_millis(150);

    let generator = Arc::new(
        ScriptedGenerator::new()
            .always("anything at all")
            .with_delay(Duration::from_millis(500)),
    );
    let engine = common::engine_with_config(Arc::clone(&generator), config).await;

    let started = std::time::Instant::now();
    let result = engine.adapt_text("ana", "Obscure verbiage abounds.", Some(10.0)).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(450));
    assert!(!result.converged);
    assert_eq!(result.attempts, 1);
}

#[tokio::test]
async fn learners_are_isolated() {
    let engine = common::engine_with(Arc::new(ScriptedGenerator::new())).await;
    engine.mark_vocabulary("ana", "harbor", "known", None).await.unwrap();

    let ana = engine.classify_text("ana", "harbor").await.unwrap();
    let ben = engine.classify_text("ben", "harbor").await.unwrap();
    assert_eq!(ana.known_count, 1);
    assert_eq!(ben.known_count, 0);
}

#[tokio::test]
async fn concurrent_marks_for_one_learner_all_land() {
    let engine = common::engine_with(Arc::new(ScriptedGenerator::new())).await;
    let list = words("m", 30);

    join_all(list.iter().map(|w| engine.mark_vocabulary("ana", w, "known", None)))
        .await
        .into_iter()
        .for_each(|r| assert!(r.unwrap().created));

    let stats = engine.knowledge().vocabulary_stats("ana").await.unwrap();
    assert_eq!(stats.known, 30);
}

#[tokio::test]
async fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("lexiflow.db").display());
    let generator: Arc<dyn TextGenerator> = Arc::new(ScriptedGenerator::offline());

    {
        let proxy = Arc::new(DatabaseProxy::connect(&url, Duration::from_secs(5)).await.unwrap());
        let engine = Engine::new(proxy, Arc::clone(&generator), &EngineConfig::default());
        engine.mark_vocabulary("ana", "lighthouse", "known", Some("deniz feneri")).await.unwrap();
        engine.mark_grammar("ana", "present_simple", "known").await.unwrap();
    }

    let proxy = Arc::new(DatabaseProxy::connect(&url, Duration::from_secs(5)).await.unwrap());
    let engine = Engine::new(proxy, generator, &EngineConfig::default());

    let analysis = engine.classify_text("ana", "The lighthouse").await.unwrap();
    assert_eq!(analysis.words.get("lighthouse"), Some(&true));

    let level = engine.get_level("ana").await.unwrap();
    assert_eq!(level.current_level_progress.grammar_known, 1);
    assert_eq!(level.current_level_progress.vocabulary_count, 1);
}

#[tokio::test]
async fn concurrent_warm_calls_share_one_concurrency_budget() {
    let mut config = EngineConfig::default();
    config.explanation.warm_concurrency = 1;
    let generator = Arc::new(
        ScriptedGenerator::new()
            .always(explanation_json("anlam", 3))
            .with_delay(Duration::from_millis(30)),
    );
    let engine = common::engine_with_config(Arc::clone(&generator), config).await;
    let cache = engine.explanations();

    let (words_a, words_b, words_c) = (words("a", 3), words("b", 3), words("c", 3));
    let (a, b, c) = tokio::join!(
        cache.warm(&words_a),
        cache.warm(&words_b),
        cache.warm(&words_c),
    );

    assert_eq!(a.generated + b.generated + c.generated, 9);
    assert_eq!(generator.calls(), 9);
    assert_eq!(generator.peak_concurrency(), 1);
}

#[tokio::test]
async fn slow_generation_serves_placeholders_then_caches_later() {
    let proxy = common::memory_proxy().await;
    let mut config = EngineConfig::default();
    config.explanation.generation_timeout = Duration::from_millis(50);

    let slow = Arc::new(
        ScriptedGenerator::new()
            .always(explanation_json("liman", 3))
            .with_delay(Duration::from_millis(500)),
    );
    let engine = common::engine_over(Arc::clone(&proxy), slow, config.clone());

    let started = std::time::Instant::now();
    let results = join_all((0..5).map(|_| engine.get_explanation("harbor"))).await;
    assert!(started.elapsed() < Duration::from_millis(400));
    for result in &results {
        assert_eq!(result.as_ref().unwrap().source, ExplanationSource::Placeholder);
    }

    let stats = engine.explanations().stats().await.unwrap();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.total_cached_words, 0);

    let fast = Arc::new(ScriptedGenerator::new().always(explanation_json("liman", 3)));
    let engine = common::engine_over(proxy, Arc::clone(&fast), config);
    let generated = engine.get_explanation("harbor").await.unwrap();
    assert_eq!(generated.source, ExplanationSource::Generated);
    assert_eq!(generated.meaning, "liman");
    let cached = engine.get_explanation("harbor").await.unwrap();
    assert_eq!(cached.source, ExplanationSource::Cached);
    assert_eq!(fast.calls(), 1);
}

#[tokio::test]
async fn adaptation_budget_covers_blocked_store() {
    let proxy = common::memory_proxy().await;
    let mut config = EngineConfig::default();
    config.adaptation.wall_clock = Duration::from_millis(100);
    let generator = Arc::new(ScriptedGenerator::new().always("anything at all"));
    let engine = common::engine_over(Arc::clone(&proxy), Arc::clone(&generator), config);

    // the in-memory store has a single connection
    let held = proxy.pool().acquire().await.unwrap();

    let started = std::time::Instant::now();
    let err = engine.adapt_text("ana", "Obscure verbiage abounds.", Some(10.0)).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(err, EngineError::StoreTimeout(_)));
    assert_eq!(generator.calls(), 0);
    drop(held);
}

#[tokio::test]
async fn adaptation_prompt_carries_level_and_known_grammar() {
    let generator = Arc::new(ScriptedGenerator::new().fail("rate limited"));
    let engine = common::engine_with(Arc::clone(&generator)).await;
    engine.mark_grammar("ana", "articles", "known").await.unwrap();

    let result = engine.adapt_text("ana", "Obscure verbiage abounds.", Some(10.0)).await.unwrap();
    assert!(!result.converged);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("- Current level: A1"));
    assert!(prompts[0].contains("- Known grammar: articles"));
}

#[tokio::test]
async fn classification_follows_marked_share_of_fifty_words() {
    let engine = common::engine_with(Arc::new(ScriptedGenerator::new())).await;
    let list = words("n", 50);
    let text = list.join(" ");

    let fresh = engine.classify_text("ana", &text).await.unwrap();
    assert_eq!(fresh.total_unique_words, 50);
    assert_eq!(fresh.unknown_percentage, 100.0);
    assert_eq!(fresh.known_percentage, 0.0);
    assert_eq!(fresh.difficulty_label, DifficultyLabel::Hard);

    mark_known(&engine, "ana", &list[..45]).await;

    let later = engine.classify_text("ana", &text).await.unwrap();
    assert_eq!(later.known_count, 45);
    assert_eq!(later.unknown_percentage, 10.0);
    assert_eq!(later.known_percentage, 90.0);
    assert_eq!(later.difficulty_label, DifficultyLabel::EasyReady);
}
