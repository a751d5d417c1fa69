//! API integration tests

use axum::body::Body;
use axum::Router;
use crewlist::AppState;
use hyper::{Request, StatusCode};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

async fn setup_app() -> Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    crewlist::api::router(AppState::new(pool))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    acting: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = acting {
        builder = builder.header("x-user-id", user.to_string());
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn signup(app: &Router, name: &str) -> Uuid {
    let (status, body) = send(app, "POST", "/users", None, Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().parse().unwrap()
}

/// Form a teammate relationship between two users through the ledger routes.
async fn team_up(app: &Router, a: Uuid, b: Uuid) {
    let (status, request) = send(
        app,
        "POST",
        "/team/requests",
        Some(a),
        Some(json!({ "target": b })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/team/requests/{}/accept", request["id"].as_str().unwrap());
    let (status, _) = send(app, "POST", &uri, Some(b), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;
    let (status, _) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_signup_creates_user() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/users",
        None,
        Some(json!({ "name": "Alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Alice");
    assert_eq!(body["total_tasks"], 0);
    assert!(body["id"].as_str().is_some());
}

#[tokio::test]
async fn test_missing_identity_header() {
    let app = setup_app().await;
    let (status, _) = send(&app, "GET", "/team/requests", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_team_request_flow() {
    let app = setup_app().await;
    let alice = signup(&app, "Alice").await;
    let bob = signup(&app, "Bob").await;

    let (status, request) = send(
        &app,
        "POST",
        "/team/requests",
        Some(alice),
        Some(json!({ "target": bob })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["kind"], "request");
    assert_eq!(request["processed"], false);

    // Duplicate is a conflict
    let (status, _) = send(
        &app,
        "POST",
        "/team/requests",
        Some(alice),
        Some(json!({ "target": bob })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Bob sees the request, newest first
    let (status, requests) = send(&app, "GET", "/team/requests", Some(bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(requests.as_array().unwrap().len(), 1);

    // Accept links the team both ways
    let uri = format!("/team/requests/{}/accept", request["id"].as_str().unwrap());
    let (status, accepted) = send(&app, "POST", &uri, Some(bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["processed"], true);

    let (_, team) = send(&app, "GET", "/team", Some(alice), None).await;
    assert_eq!(team[0]["name"], "Bob");
    let (_, team) = send(&app, "GET", "/team", Some(bob), None).await;
    assert_eq!(team[0]["name"], "Alice");

    // Accepting again is a conflict
    let (status, _) = send(&app, "POST", &uri, Some(bob), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Alice got exactly one official confirmation
    let (_, notifications) = send(&app, "GET", "/team/notifications", Some(alice), None).await;
    let notifications = notifications.as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["kind"], "notification");
    assert_eq!(notifications[0]["official"], true);
}

#[tokio::test]
async fn test_accept_unknown_request() {
    let app = setup_app().await;
    let alice = signup(&app, "Alice").await;

    let uri = format!("/team/requests/{}/accept", Uuid::new_v4());
    let (status, _) = send(&app, "POST", &uri, Some(alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_notifications_marked_seen_on_read() {
    let app = setup_app().await;
    let alice = signup(&app, "Alice").await;
    let bob = signup(&app, "Bob").await;
    team_up(&app, alice, bob).await;

    // First read shows the entry unread
    let (_, first) = send(&app, "GET", "/team/notifications", Some(alice), None).await;
    assert_eq!(first[0]["processed"], false);

    // Second read shows it already seen
    let (_, second) = send(&app, "GET", "/team/notifications", Some(alice), None).await;
    assert_eq!(second[0]["processed"], true);
}

#[tokio::test]
async fn test_dismiss_notification() {
    let app = setup_app().await;
    let alice = signup(&app, "Alice").await;
    let bob = signup(&app, "Bob").await;
    team_up(&app, alice, bob).await;

    let (_, notifications) = send(&app, "GET", "/team/notifications", Some(alice), None).await;
    let entry_id = notifications[0]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/ledger/{}", entry_id),
        Some(alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, notifications) = send(&app, "GET", "/team/notifications", Some(alice), None).await;
    assert!(notifications.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_teammate() {
    let app = setup_app().await;
    let alice = signup(&app, "Alice").await;
    let bob = signup(&app, "Bob").await;
    team_up(&app, alice, bob).await;

    let (status, _) = send(&app, "DELETE", &format!("/team/{}", bob), Some(alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, team) = send(&app, "GET", "/team", Some(alice), None).await;
    assert!(team.as_array().unwrap().is_empty());
    let (_, team) = send(&app, "GET", "/team", Some(bob), None).await;
    assert!(team.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delegate_and_resolve_views() {
    let app = setup_app().await;
    let alice = signup(&app, "Alice").await;
    let bob = signup(&app, "Bob").await;
    team_up(&app, alice, bob).await;

    let (status, delegation) = send(
        &app,
        "POST",
        "/assignments",
        Some(alice),
        Some(json!({
            "recipients": [bob],
            "task": { "description": "Review the draft", "important": true }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let tasks = delegation["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);

    // The copy surfaces in Bob's "Today" view with a source mapping
    let (status, today) = send(&app, "GET", "/groups/virtual/0", Some(bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(today["tasks"].as_array().unwrap().len(), 1);
    let task_id = today["tasks"][0]["id"].as_str().unwrap();
    let group_id = today["tasks"][0]["group_id"].as_str().unwrap();
    assert_eq!(today["sources"][task_id], group_id);

    // And in Bob's "Important" view
    let (_, important) = send(&app, "GET", "/groups/virtual/1", Some(bob), None).await;
    assert_eq!(important["tasks"].as_array().unwrap().len(), 1);

    // The real group behind the mapping is readable
    let (status, group) = send(
        &app,
        "GET",
        &format!("/groups/{}", group_id),
        Some(bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["group"]["name"], "Delegated to me");
    assert_eq!(group["tasks"].as_array().unwrap().len(), 1);

    // Alice sees one aggregated record in "Delegated by me"
    let (status, delegated) = send(&app, "GET", "/groups/virtual/4", Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let assignments = delegated["assignments"].as_array().unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0]["assigned_to"].as_array().unwrap().len(), 1);
    assert_eq!(
        assignments[0]["original_task_ids"].as_array().unwrap().len(),
        1
    );
    assert_eq!(assignments[0]["completed"], false);

    // Alice's own Today view carries no bookkeeping copies
    let (_, today) = send(&app, "GET", "/groups/virtual/0", Some(alice), None).await;
    assert!(today["tasks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delegate_to_stranger_is_conflict() {
    let app = setup_app().await;
    let alice = signup(&app, "Alice").await;
    let bob = signup(&app, "Bob").await;
    let mallory = signup(&app, "Mallory").await;
    team_up(&app, alice, bob).await;

    let (status, _) = send(
        &app,
        "POST",
        "/assignments",
        Some(alice),
        Some(json!({
            "recipients": [bob, mallory],
            "task": { "description": "Review the draft" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Nothing committed for the valid recipient either
    let (_, today) = send(&app, "GET", "/groups/virtual/0", Some(bob), None).await;
    assert!(today["tasks"].as_array().unwrap().is_empty());
    let (_, notifications) = send(&app, "GET", "/team/notifications", Some(bob), None).await;
    assert!(notifications.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_withdraw_routes() {
    let app = setup_app().await;
    let alice = signup(&app, "Alice").await;
    let bob = signup(&app, "Bob").await;
    let carol = signup(&app, "Carol").await;
    team_up(&app, alice, bob).await;
    team_up(&app, alice, carol).await;

    let (_, delegation) = send(
        &app,
        "POST",
        "/assignments",
        Some(alice),
        Some(json!({
            "recipients": [bob, carol],
            "task": { "description": "Review the draft" }
        })),
    )
    .await;
    let assignment_id = delegation["assignment"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/assignments/{}/recipients/{}", assignment_id, bob),
        Some(alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, progress) = send(
        &app,
        "GET",
        &format!("/assignments/{}/status", assignment_id),
        Some(alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress.as_object().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/assignments/{}", assignment_id),
        Some(alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/assignments/{}/status", assignment_id),
        Some(alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_virtual_group_index_3_is_not_virtual() {
    let app = setup_app().await;
    let alice = signup(&app, "Alice").await;

    let (status, _) = send(&app, "GET", "/groups/virtual/3", Some(alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/groups/virtual/9", Some(alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_real_group_not_leaked_to_other_users() {
    let app = setup_app().await;
    let alice = signup(&app, "Alice").await;
    let bob = signup(&app, "Bob").await;
    team_up(&app, alice, bob).await;

    let (_, delegation) = send(
        &app,
        "POST",
        "/assignments",
        Some(alice),
        Some(json!({
            "recipients": [bob],
            "task": { "description": "Review the draft" }
        })),
    )
    .await;
    let group_id = delegation["tasks"][0]["group_id"].as_str().unwrap().to_string();

    // Bob's group is invisible to Alice
    let (status, _) = send(&app, "GET", &format!("/groups/{}", group_id), Some(alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
