//! Router-level tests for authentication, authorization, and the
//! template authoring endpoints.

mod common;

use axum::http::StatusCode;
use common::{
    assert_status, build_test_app, get, get_public, post_json, post_json_public, put_json,
    seed_user, token_for,
};
use praxis_api::handlers::workflow_template::graph_from_inputs;
use praxis_core::workflow::validator::validate;
use praxis_db::models::workflow_template::{ConnectionInput, NodeInput};
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_login_returns_usable_token(pool: PgPool) {
    let user_id = seed_user(&pool, "alice", "manager", "s3cret-pw-alice").await;
    let app = build_test_app(pool);

    let response = post_json_public(
        app.clone(),
        "/api/v1/auth/login",
        json!({"username": "alice", "password": "s3cret-pw-alice"}),
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["user"]["id"], user_id);
    assert_eq!(body["user"]["role"], "manager");
    let token = body["access_token"].as_str().unwrap().to_string();
    assert!(!token.is_empty());

    // The issued token is accepted by a protected endpoint.
    let response = get(app, "/api/v1/workflow-templates", &token).await;
    assert_status(response, StatusCode::OK).await;
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_login_rejects_bad_password(pool: PgPool) {
    seed_user(&pool, "bob", "member", "correct-horse-1").await;
    let app = build_test_app(pool);

    let response = post_json_public(
        app,
        "/api/v1/auth/login",
        json!({"username": "bob", "password": "wrong"}),
    )
    .await;
    let body = assert_status(response, StatusCode::UNAUTHORIZED).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_protected_routes_require_token(pool: PgPool) {
    let app = build_test_app(pool);

    let response = get_public(app.clone(), "/api/v1/workflow-templates").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get(app, "/api/v1/workflow-templates", "not-a-jwt").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_member_cannot_manage_templates(pool: PgPool) {
    let member = seed_user(&pool, "carol", "member", "pw-carol-1234").await;
    let app = build_test_app(pool);
    let token = token_for(member, "member");

    // Members can list but not author.
    let response = get(app.clone(), "/api/v1/workflow-templates", &token).await;
    assert_status(response, StatusCode::OK).await;

    let response = post_json(
        app,
        "/api/v1/workflow-templates",
        &token,
        json!({"name": "forbidden"}),
    )
    .await;
    let body = assert_status(response, StatusCode::FORBIDDEN).await;
    assert_eq!(body["code"], "FORBIDDEN");
}

// ---------------------------------------------------------------------------
// Template lifecycle
// ---------------------------------------------------------------------------

fn linear_graph() -> serde_json::Value {
    json!({
        "nodes": [
            {"key": "start", "label": "Start", "kind": {"type": "start"}},
            {"key": "review", "label": "Review", "kind": {"type": "role"}},
            {"key": "end", "label": "Done", "kind": {"type": "end"}}
        ],
        "connections": [
            {"from_key": "start", "to_key": "review"},
            {"from_key": "review", "to_key": "end"}
        ]
    })
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_create_validate_activate_lifecycle(pool: PgPool) {
    let manager = seed_user(&pool, "dave", "manager", "pw-dave-1234").await;
    let app = build_test_app(pool);
    let token = token_for(manager, "manager");

    let mut payload = linear_graph();
    payload["name"] = json!("Purchase approval");
    payload["description"] = json!("Linear review chain");
    let response = post_json(app.clone(), "/api/v1/workflow-templates", &token, payload).await;
    let body = assert_status(response, StatusCode::CREATED).await;
    let template_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["is_active"], false);
    assert_eq!(body["data"]["nodes"].as_array().unwrap().len(), 3);

    let response = post_json(
        app.clone(),
        &format!("/api/v1/workflow-templates/{template_id}/validate"),
        &token,
        json!({}),
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["errors"].as_array().unwrap().len(), 0);

    let response = post_json(
        app.clone(),
        &format!("/api/v1/workflow-templates/{template_id}/activate"),
        &token,
        json!({}),
    )
    .await;
    assert_status(response, StatusCode::OK).await;

    let response = get(
        app,
        &format!("/api/v1/workflow-templates/{template_id}"),
        &token,
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["is_active"], true);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_activate_rejects_invalid_graph_with_report(pool: PgPool) {
    let manager = seed_user(&pool, "erin", "manager", "pw-erin-1234").await;
    let app = build_test_app(pool);
    let token = token_for(manager, "manager");

    // Two start nodes is a hard error, not a mere warning.
    let response = post_json(
        app.clone(),
        "/api/v1/workflow-templates",
        &token,
        json!({
            "name": "broken",
            "nodes": [
                {"key": "start", "label": "Start", "kind": {"type": "start"}},
                {"key": "start2", "label": "Second start", "kind": {"type": "start"}},
                {"key": "review", "label": "Review", "kind": {"type": "role"}},
                {"key": "end", "label": "End", "kind": {"type": "end"}}
            ],
            "connections": [
                {"from_key": "start", "to_key": "review"},
                {"from_key": "start2", "to_key": "review"},
                {"from_key": "review", "to_key": "end"}
            ]
        }),
    )
    .await;
    let body = assert_status(response, StatusCode::CREATED).await;
    let template_id = body["data"]["id"].as_i64().unwrap();

    let response = post_json(
        app.clone(),
        &format!("/api/v1/workflow-templates/{template_id}/activate"),
        &token,
        json!({}),
    )
    .await;
    let body = assert_status(response, StatusCode::UNPROCESSABLE_ENTITY).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(!body["report"]["errors"].as_array().unwrap().is_empty());

    // The template stays inactive after a refused activation.
    let response = get(
        app,
        &format!("/api/v1/workflow-templates/{template_id}"),
        &token,
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["is_active"], false);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_replace_graph_round_trips_validation(pool: PgPool) {
    let manager = seed_user(&pool, "frank", "manager", "pw-frank-123").await;
    let app = build_test_app(pool);
    let token = token_for(manager, "manager");

    let response = post_json(
        app.clone(),
        "/api/v1/workflow-templates",
        &token,
        json!({"name": "editable"}),
    )
    .await;
    let body = assert_status(response, StatusCode::CREATED).await;
    let template_id = body["data"]["id"].as_i64().unwrap();

    let graph = linear_graph();
    let response = put_json(
        app.clone(),
        &format!("/api/v1/workflow-templates/{template_id}/graph"),
        &token,
        graph.clone(),
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["connection_count"], 2);

    // The stored graph must validate exactly like the submitted payload.
    let nodes: Vec<NodeInput> = serde_json::from_value(graph["nodes"].clone()).unwrap();
    let connections: Vec<ConnectionInput> =
        serde_json::from_value(graph["connections"].clone()).unwrap();
    let local_report = validate(&graph_from_inputs(&nodes, &connections));

    let response = post_json(
        app,
        &format!("/api/v1/workflow-templates/{template_id}/validate"),
        &token,
        json!({}),
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["valid"], json!(local_report.valid));
    let stored_codes: Vec<String> = body["data"]["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["code"].as_str().unwrap().to_string())
        .collect();
    let local_codes: Vec<String> = local_report
        .errors
        .iter()
        .map(|f| f.code.to_string())
        .collect();
    assert_eq!(stored_codes, local_codes);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_graph_inputs_are_checked_for_key_consistency(pool: PgPool) {
    let manager = seed_user(&pool, "grace", "manager", "pw-grace-123").await;
    let app = build_test_app(pool);
    let token = token_for(manager, "manager");

    // A connection naming an unknown node key is refused up front.
    let response = post_json(
        app,
        "/api/v1/workflow-templates",
        &token,
        json!({
            "name": "dangling",
            "nodes": [
                {"key": "start", "label": "Start", "kind": {"type": "start"}}
            ],
            "connections": [
                {"from_key": "start", "to_key": "missing"}
            ]
        }),
    )
    .await;
    let body = assert_status(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_create_rejects_empty_name(pool: PgPool) {
    let manager = seed_user(&pool, "hank", "manager", "pw-hank-1234").await;
    let app = build_test_app(pool);
    let token = token_for(manager, "manager");

    let response = post_json(
        app,
        "/api/v1/workflow-templates",
        &token,
        json!({"name": ""}),
    )
    .await;
    let body = assert_status(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_update_and_delete_template(pool: PgPool) {
    let manager = seed_user(&pool, "heidi", "manager", "pw-heidi-123").await;
    let app = build_test_app(pool);
    let token = token_for(manager, "manager");

    let response = post_json(
        app.clone(),
        "/api/v1/workflow-templates",
        &token,
        json!({"name": "draft"}),
    )
    .await;
    let body = assert_status(response, StatusCode::CREATED).await;
    let template_id = body["data"]["id"].as_i64().unwrap();

    let response = put_json(
        app.clone(),
        &format!("/api/v1/workflow-templates/{template_id}"),
        &token,
        json!({"name": "renamed", "description": "now described"}),
    )
    .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["name"], "renamed");

    let response = common::delete(
        app.clone(),
        &format!("/api/v1/workflow-templates/{template_id}"),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(
        app,
        &format!("/api/v1/workflow-templates/{template_id}"),
        &token,
    )
    .await;
    let body = assert_status(response, StatusCode::NOT_FOUND).await;
    assert_eq!(body["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_health_endpoints_are_public(pool: PgPool) {
    let app = build_test_app(pool);

    let response = get_public(app.clone(), "/health").await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_healthy"], true);

    let response = get_public(app, "/health/db").await;
    assert_eq!(response.status(), StatusCode::OK);
}
