use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

mod common;

use common::{body_json, explanation_json, get, json_request, ScriptedGenerator};

#[tokio::test]
async fn test_health_root() {
    let app = common::create_test_app().await;
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_health_without_store_is_degraded() {
    let app = common::create_storeless_app();
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_live() {
    let app = common::create_test_app().await;
    let response = app.oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = common::create_test_app().await;
    let response = app.oneshot(get("/api/nowhere")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_learner_routes_need_a_store() {
    let app = common::create_storeless_app();
    let response = app.oneshot(get("/api/learners/ana/level")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn test_marked_word_moves_to_known_set() {
    let app = common::create_test_app().await;

    let before = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/learners/ana/text/analyze",
            json!({ "text": "The cat sleeps." }),
        ))
        .await
        .unwrap();
    assert_eq!(before.status(), StatusCode::OK);
    let before = body_json(before).await;
    assert_eq!(before["data"]["words"]["cat"], false);
    assert_eq!(before["data"]["unknownPercentage"], 100.0);
    assert_eq!(before["data"]["difficultyLabel"], "hard");
    assert_eq!(before["data"]["patterns"]["articles"], false);

    let marked = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/learners/ana/vocabulary",
            json!({ "word": "Cat", "status": "known", "translation": "kedi" }),
        ))
        .await
        .unwrap();
    assert_eq!(marked.status(), StatusCode::OK);
    let marked = body_json(marked).await;
    assert_eq!(marked["data"]["created"], true);
    assert_eq!(marked["data"]["entry"]["word"], "cat");

    let after = app
        .oneshot(json_request(
            "POST",
            "/api/learners/ana/text/analyze",
            json!({ "text": "The cat sleeps." }),
        ))
        .await
        .unwrap();
    let after = body_json(after).await;
    assert_eq!(after["data"]["words"]["cat"], true);
    assert_eq!(after["data"]["knownCount"], 1);
}

#[tokio::test]
async fn test_repeated_mark_is_a_noop() {
    let app = common::create_test_app().await;
    let mark = || json_request("PUT", "/api/learners/ana/vocabulary", json!({ "word": "tree", "status": "learning" }));

    let first = body_json(app.clone().oneshot(mark()).await.unwrap()).await;
    assert_eq!(first["data"]["created"], true);

    let second = body_json(app.oneshot(mark()).await.unwrap()).await;
    assert_eq!(second["data"]["created"], false);
    assert_eq!(second["data"]["changed"], false);
    assert_eq!(second["data"]["previousStatus"], "learning");
}

#[tokio::test]
async fn test_invalid_requests_are_validation_errors() {
    let app = common::create_test_app().await;

    let bad_status = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/learners/ana/vocabulary",
            json!({ "word": "tree", "status": "mastered" }),
        ))
        .await
        .unwrap();
    assert_eq!(bad_status.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(bad_status).await["code"], "VALIDATION_ERROR");

    let malformed = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/learners/ana/text/analyze")
                .header("content-type", "application/json")
                .body(axum::body::Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let empty_text = app
        .clone()
        .oneshot(json_request("POST", "/api/learners/ana/text/analyze", json!({ "text": "" })))
        .await
        .unwrap();
    assert_eq!(empty_text.status(), StatusCode::BAD_REQUEST);

    let bad_learner = app
        .oneshot(get("/api/learners/bad%20id/level"))
        .await
        .unwrap();
    assert_eq!(bad_learner.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_vocabulary_listing_stats_and_forget() {
    let app = common::create_test_app().await;
    for (word, status) in [("apple", "known"), ("pear", "known"), ("plum", "unknown")] {
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/learners/ana/vocabulary",
                json!({ "word": word, "status": status }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let stats = body_json(app.clone().oneshot(get("/api/learners/ana/vocabulary/stats")).await.unwrap()).await;
    assert_eq!(stats["data"]["known"], 2);
    assert_eq!(stats["data"]["total"], 3);

    let known = body_json(
        app.clone()
            .oneshot(get("/api/learners/ana/vocabulary?status=known"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(known["data"].as_array().unwrap().len(), 2);

    let removed = app
        .clone()
        .oneshot(json_request("DELETE", "/api/learners/ana/vocabulary/plum", json!({})))
        .await
        .unwrap();
    assert_eq!(removed.status(), StatusCode::OK);

    let missing = app
        .oneshot(json_request("DELETE", "/api/learners/ana/vocabulary/plum", json!({})))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_new_learner_level_and_grammar() {
    let app = common::create_test_app().await;

    let level = body_json(app.clone().oneshot(get("/api/learners/ana/level")).await.unwrap()).await;
    assert_eq!(level["data"]["level"], "A1");
    assert_eq!(level["data"]["nextLevel"], "A2");
    assert_eq!(level["data"]["vocabularyScore"], 0.0);
    assert_eq!(level["data"]["recommendations"].as_array().unwrap().len(), 3);

    for pattern in ["present_simple", "articles", "basic_questions"] {
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/learners/ana/grammar",
                json!({ "patternId": pattern, "status": "known" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let unknown_pattern = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/learners/ana/grammar",
            json!({ "patternId": "time_travel", "status": "known" }),
        ))
        .await
        .unwrap();
    assert_eq!(unknown_pattern.status(), StatusCode::BAD_REQUEST);

    let level = body_json(app.clone().oneshot(get("/api/learners/ana/level")).await.unwrap()).await;
    let progress = &level["data"]["currentLevelProgress"];
    assert_eq!(level["data"]["level"], "A1");
    assert_eq!(progress["grammarKnown"], 3);
    assert_eq!(progress["grammarProgress"], 50.0);

    let overview = body_json(app.clone().oneshot(get("/api/learners/ana/grammar")).await.unwrap()).await;
    let a1 = &overview["data"]["tiers"][0];
    assert_eq!(a1["level"], "A1");
    assert_eq!(a1["known"].as_array().unwrap().len(), 3);
    assert_eq!(a1["completionPercentage"], 50.0);

    let catalog = body_json(app.oneshot(get("/api/grammar/catalog")).await.unwrap()).await;
    assert_eq!(catalog["data"]["version"], 1);
    assert_eq!(catalog["data"]["patterns"].as_array().unwrap().len(), 41);
}

#[tokio::test]
async fn test_explanation_generated_then_cached() {
    let generator = Arc::new(ScriptedGenerator::new().reply(explanation_json("elma", 2)));
    let app = common::create_test_app_with(Arc::clone(&generator)).await;

    let first = body_json(app.clone().oneshot(get("/api/explanations/Apple")).await.unwrap()).await;
    assert_eq!(first["data"]["word"], "apple");
    assert_eq!(first["data"]["meaning"], "elma");
    assert_eq!(first["data"]["source"], "generated");

    let second = body_json(app.clone().oneshot(get("/api/explanations/apple")).await.unwrap()).await;
    assert_eq!(second["data"]["source"], "cached");
    assert_eq!(generator.calls(), 1);

    let stats = body_json(app.oneshot(get("/api/explanations/stats")).await.unwrap()).await;
    assert_eq!(stats["data"]["totalCachedWords"], 1);
    assert_eq!(stats["data"]["hits"], 1);
}

#[tokio::test]
async fn test_explanation_failure_serves_uncached_placeholder() {
    let generator = Arc::new(ScriptedGenerator::new().reply("I cannot help with that."));
    let app = common::create_test_app_with(Arc::clone(&generator)).await;

    let first = body_json(app.clone().oneshot(get("/api/explanations/quince")).await.unwrap()).await;
    assert_eq!(first["data"]["source"], "placeholder");
    assert_eq!(first["data"]["difficultyRating"], 1);

    let stats = body_json(app.oneshot(get("/api/explanations/stats")).await.unwrap()).await;
    assert_eq!(stats["data"]["totalCachedWords"], 0);
}

#[tokio::test]
async fn test_warm_explanations_reports_counts() {
    let generator = Arc::new(ScriptedGenerator::new().always(explanation_json("anlam", 3)));
    let app = common::create_test_app_with(Arc::clone(&generator)).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/explanations/warm",
            json!({ "words": ["river", "River", "stone", "42"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["data"]["requested"], 2);
    assert_eq!(report["data"]["generated"], 2);
    assert_eq!(generator.calls(), 2);

    let empty = app
        .oneshot(json_request("POST", "/api/explanations/warm", json!({ "words": [] })))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_adapt_without_generator_returns_source() {
    let app = common::create_test_app().await;
    let text = "Quantum entanglement perplexes physicists.";

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/learners/ana/text/adapt",
            json!({ "text": text, "targetUnknownPercentage": 10 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["adaptedText"], text);
    assert_eq!(body["data"]["converged"], false);
    assert_eq!(body["data"]["attempts"], 0);

    let out_of_range = app
        .oneshot(json_request(
            "POST",
            "/api/learners/ana/text/adapt",
            json!({ "text": text, "targetUnknownPercentage": 120 }),
        ))
        .await
        .unwrap();
    assert_eq!(out_of_range.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_suggestions_rank_unknown_words() {
    let app = common::create_test_app().await;
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/learners/ana/text/suggestions",
            json!({ "text": "river river river stone stone cloud" }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    let ranked = body["data"].as_array().unwrap();
    assert_eq!(ranked[0]["word"], "river");
    assert_eq!(ranked[0]["frequency"], 3);
    assert_eq!(ranked.len(), 3);
}
