//! Integration tests for `/todos` and `/todos-advanced`.

mod common;

use axum::http::StatusCode;
use rstest::rstest;
use serde_json::json;

use common::{ALICE, BOB, TestApp};

// =============================================================================
// CRUD
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_create_and_list_todos_newest_first() {
    let app = TestApp::new();
    let first = app
        .create_todo(
            ALICE,
            json!({
                "text": "Buy milk",
                "date": "2024-03-12",
                "time": "09:30",
                "priority": "high"
            }),
        )
        .await;
    app.create_todo(ALICE, json!({ "text": "Call mum" })).await;

    assert_eq!(first["text"], "Buy milk");
    assert_eq!(first["date"], "2024-03-12");
    assert_eq!(first["time"], "09:30");
    assert_eq!(first["priority"], "high");
    assert_eq!(first["completed"], false);
    assert!(first.get("owner").is_none());

    assert_eq!(app.texts(ALICE, "/todos").await, vec!["Call mum", "Buy milk"]);
}

#[rstest]
#[case(json!({ "text": "" }), "text")]
#[case(json!({ "text": "x", "date": "2024-13-01" }), "date")]
#[case(json!({ "text": "x", "priority": "urgent" }), "priority")]
#[case(json!({ "text": "x", "repeat": "hourly" }), "repeat")]
#[tokio::test]
async fn test_create_todo_rejects_invalid_fields(
    #[case] body: serde_json::Value,
    #[case] field: &str,
) {
    let app = TestApp::new();

    let (status, body) = app.post(ALICE, "/todos", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(body["details"][0]["field"], field);
}

#[rstest]
#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let app = TestApp::new();
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/todos")
        .header("authorization", format!("Bearer {ALICE}"))
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();

    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[rstest]
#[tokio::test]
async fn test_patch_updates_and_null_clears() {
    let app = TestApp::new();
    let todo = app
        .create_todo(
            ALICE,
            json!({ "text": "Gym", "date": "2024-03-11", "note": "legs", "repeat": "weekly" }),
        )
        .await;
    let uri = format!("/todos/{}", todo["id"]);

    let (status, body) = app
        .patch(
            ALICE,
            &uri,
            json!({ "completed": true, "date": null, "note": null, "repeat": null }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let updated = &body["data"];
    assert_eq!(updated["text"], "Gym");
    assert_eq!(updated["completed"], true);
    assert!(updated["date"].is_null());
    assert!(updated["note"].is_null());
    assert_eq!(updated["repeat"], "none");
}

#[rstest]
#[tokio::test]
async fn test_patch_missing_todo_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app.patch(ALICE, "/todos/4242", json!({ "text": "x" })).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Todo not found: 4242");
}

#[rstest]
#[tokio::test]
async fn test_patch_with_category_on_missing_or_foreign_todo_is_not_found() {
    let app = TestApp::new();
    let work = app.create_category(ALICE, "Work").await;
    let bobs = app.create_todo(BOB, json!({ "text": "Bob's" })).await;
    let patch = json!({ "category_id": work["id"] });

    let (missing, _) = app.patch(ALICE, "/todos/4242", patch.clone()).await;
    let (foreign, _) = app
        .patch(ALICE, &format!("/todos/{}", bobs["id"]), patch)
        .await;

    assert_eq!(missing, StatusCode::NOT_FOUND);
    assert_eq!(foreign, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_delete_todo_then_delete_again() {
    let app = TestApp::new();
    let todo = app.create_todo(ALICE, json!({ "text": "Temp" })).await;
    let uri = format!("/todos/{}", todo["id"]);

    let (status, body) = app.delete(ALICE, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "data": { "success": true } }));

    let (status, _) = app.delete(ALICE, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.texts(ALICE, "/todos").await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_todo_with_foreign_category_is_rejected() {
    let app = TestApp::new();
    let category = app.create_category(BOB, "Bob's").await;

    let (status, _) = app
        .post(ALICE, "/todos", json!({ "text": "x", "category_id": category["id"] }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Search
// =============================================================================

async fn seeded() -> TestApp {
    let app = TestApp::new();
    let work = app.create_category(ALICE, "Work").await;
    for body in [
        json!({
            "text": "Write report",
            "date": "2024-03-08",
            "priority": "high",
            "category_id": work["id"]
        }),
        json!({ "text": "Pay rent", "date": "2024-03-10", "time": "18:00", "priority": "high" }),
        json!({ "text": "Read book", "note": "the report chapter", "priority": "low" }),
        json!({ "text": "Plan trip", "date": "2024-03-20", "category_id": work["id"] }),
        json!({ "text": "Old chore", "date": "2024-03-01", "completed": true }),
    ] {
        app.create_todo(ALICE, body).await;
    }
    app
}

#[rstest]
#[case("/todos-advanced/search?query=report", vec!["Read book", "Write report"])]
#[case("/todos-advanced/search?priority=high", vec!["Pay rent", "Write report"])]
#[case("/todos-advanced/search?status=completed", vec!["Old chore"])]
#[case(
    "/todos-advanced/search?startDate=2024-03-09&endDate=2024-03-31",
    vec!["Plan trip", "Pay rent"]
)]
#[case("/todos-advanced/search?query=report&priority=high", vec!["Write report"])]
#[case(
    "/todos-advanced/search?priority=bogus",
    vec!["Old chore", "Plan trip", "Read book", "Pay rent", "Write report"]
)]
#[tokio::test]
async fn test_search_filters(#[case] uri: &str, #[case] expected: Vec<&str>) {
    let app = seeded().await;
    assert_eq!(app.texts(ALICE, uri).await, expected);
}

#[rstest]
#[tokio::test]
async fn test_search_by_category() {
    let app = seeded().await;
    let (_, categories) = app.get(ALICE, "/categories").await;
    let work_id = &categories["data"][0]["id"];

    let texts = app
        .texts(ALICE, &format!("/todos-advanced/search?category={work_id}"))
        .await;

    assert_eq!(texts, vec!["Plan trip", "Write report"]);
}

#[rstest]
#[tokio::test]
async fn test_search_paginates_and_orders() {
    let app = seeded().await;

    let page_one = app
        .texts(ALICE, "/todos-advanced/search?order=text&direction=asc&limit=2&page=1")
        .await;
    let page_two = app
        .texts(ALICE, "/todos-advanced/search?order=text&direction=asc&limit=2&page=2")
        .await;
    let past_end = app
        .texts(ALICE, "/todos-advanced/search?order=text&direction=asc&limit=2&page=9")
        .await;

    assert_eq!(page_one, vec!["Old chore", "Pay rent"]);
    assert_eq!(page_two, vec!["Plan trip", "Read book"]);
    assert!(past_end.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_search_orders_by_date_with_undated_last() {
    let app = seeded().await;

    let texts = app
        .texts(ALICE, "/todos-advanced/search?order=date&direction=asc")
        .await;

    assert_eq!(
        texts,
        vec!["Old chore", "Write report", "Pay rent", "Plan trip", "Read book"]
    );
}

#[rstest]
#[case("page=0")]
#[case("limit=abc")]
#[case("order=owner")]
#[case("direction=sideways")]
#[tokio::test]
async fn test_search_rejects_bad_pagination(#[case] params: &str) {
    let app = seeded().await;

    let (status, body) = app
        .get(ALICE, &format!("/todos-advanced/search?{params}"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// =============================================================================
// Due-date views and stats
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_overdue_today_and_upcoming_views() {
    let app = seeded().await;

    assert_eq!(
        app.texts(ALICE, "/todos-advanced/overdue").await,
        vec!["Write report"]
    );
    assert_eq!(app.texts(ALICE, "/todos-advanced/today").await, vec!["Pay rent"]);
    assert_eq!(
        app.texts(ALICE, "/todos-advanced/upcoming").await,
        vec!["Plan trip"]
    );
}

#[rstest]
#[tokio::test]
async fn test_stats_summary() {
    let app = seeded().await;

    let (status, body) = app.get(ALICE, "/todos-advanced/stats").await;

    assert_eq!(status, StatusCode::OK);
    let stats = &body["data"];
    assert_eq!(stats["total"], 5);
    assert_eq!(stats["completed"], 1);
    assert_eq!(stats["pending"], 4);
    assert_eq!(stats["overdue"], 1);
    assert_eq!(stats["todayCount"], 1);
    assert_eq!(stats["upcomingCount"], 1);
    assert_eq!(stats["byCategory"]["Work"], 2);
    assert_eq!(stats["byPriority"]["high"], 2);
    assert_eq!(stats["byPriority"]["medium"], 2);
    assert_eq!(stats["byPriority"]["low"], 1);
}

// =============================================================================
// Batch and reorder
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_batch_create_returns_rows_owned_by_caller() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            ALICE,
            "/todos-advanced/batch",
            json!({ "operation": "create", "items": [{ "text": "a" }, { "text": "b" }] }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(app.texts(ALICE, "/todos").await, vec!["b", "a"]);
    assert!(app.texts(BOB, "/todos").await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_batch_invalid_operation() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            ALICE,
            "/todos-advanced/batch",
            json!({ "operation": "merge", "items": [] }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid operation: merge");
}

#[rstest]
#[tokio::test]
async fn test_batch_update_and_delete() {
    let app = TestApp::new();
    let a = app.create_todo(ALICE, json!({ "text": "a" })).await;
    let b = app.create_todo(ALICE, json!({ "text": "b" })).await;

    let (status, body) = app
        .post(
            ALICE,
            "/todos-advanced/batch",
            json!({ "operation": "update", "items": [
                { "id": a["id"], "completed": true },
                { "id": b["id"], "priority": "low" }
            ] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"][0]["completed"], true);
    assert_eq!(body["data"][1]["priority"], "low");

    let (status, body) = app
        .post(
            ALICE,
            "/todos-advanced/batch",
            json!({ "operation": "delete", "items": [{ "id": a["id"] }] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(app.texts(ALICE, "/todos").await, vec!["b"]);
}

#[rstest]
#[tokio::test]
async fn test_batch_update_missing_row_rolls_back() {
    let app = TestApp::new();
    let a = app.create_todo(ALICE, json!({ "text": "a" })).await;

    let (status, _) = app
        .post(
            ALICE,
            "/todos-advanced/batch",
            json!({ "operation": "update", "items": [
                { "id": a["id"], "text": "changed" },
                { "id": 999, "text": "ghost" }
            ] }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.texts(ALICE, "/todos").await, vec!["a"]);
}

#[rstest]
#[tokio::test]
async fn test_batch_best_effort_mode() {
    let app = TestApp::new();
    let a = app.create_todo(ALICE, json!({ "text": "a" })).await;

    let (status, body) = app
        .post(
            ALICE,
            "/todos-advanced/batch",
            json!({ "operation": "update", "mode": "best_effort", "items": [
                { "id": a["id"], "text": "changed" },
                { "id": 999, "text": "ghost" }
            ] }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated"][0]["text"], "changed");
    assert_eq!(body["data"]["failed"][0]["id"], 999);
}

#[rstest]
#[tokio::test]
async fn test_batch_size_limit() {
    let app = TestApp::with_config(todo_api::api::AppConfig {
        max_batch_size: 1,
        ..todo_api::api::AppConfig::default()
    });

    let (status, _) = app
        .post(
            ALICE,
            "/todos-advanced/batch",
            json!({ "operation": "create", "items": [{ "text": "a" }, { "text": "b" }] }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.texts(ALICE, "/todos").await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_reorder_sets_positions() {
    let app = TestApp::new();
    let a = app.create_todo(ALICE, json!({ "text": "a" })).await;
    let b = app.create_todo(ALICE, json!({ "text": "b" })).await;
    let c = app.create_todo(ALICE, json!({ "text": "c" })).await;

    let (status, body) = app
        .post(
            ALICE,
            "/todos-advanced/reorder",
            json!({ "items": [
                { "id": c["id"], "position": 0 },
                { "id": a["id"], "position": 1 },
                { "id": b["id"], "position": 2 }
            ] }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "data": { "success": true, "updated": 3 } }));
    assert_eq!(
        app.texts(ALICE, "/todos-advanced/search?order=position&direction=asc")
            .await,
        vec!["c", "a", "b"]
    );
}

#[rstest]
#[tokio::test]
async fn test_reorder_with_unknown_id_changes_nothing() {
    let app = TestApp::new();
    let a = app.create_todo(ALICE, json!({ "text": "a" })).await;

    let (status, _) = app
        .post(
            ALICE,
            "/todos-advanced/reorder",
            json!({ "items": [{ "id": a["id"], "position": 7 }, { "id": 999, "position": 0 }] }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = app.get(ALICE, "/todos").await;
    assert_eq!(body["data"][0]["position"], a["position"]);
}
