//! Shared helpers for HTTP-level integration tests.
//!
//! Builds the full application router (same middleware stack as
//! production) against the per-test database provided by `#[sqlx::test]`,
//! plus seeding helpers for users, roles, projects, and template graphs.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use praxis_api::auth::jwt::{generate_access_token, JwtConfig};
use praxis_api::auth::password::hash_password;
use praxis_api::config::ServerConfig;
use praxis_api::engine::executor::WorkflowEngine;
use praxis_api::router::build_app_router;
use praxis_api::state::AppState;
use praxis_core::types::DbId;
use praxis_core::workflow::graph::{EdgeCondition, NodeKind};
use praxis_db::models::workflow_template::{ConnectionInput, NodeInput};
use praxis_db::repositories::WorkflowTemplateRepo;

/// Build a test `ServerConfig` with a fixed JWT secret so tokens can be
/// minted without going through the login endpoint.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "integration-test-secret-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 60,
        },
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool. Mirrors the production router construction.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let engine = Arc::new(WorkflowEngine::new(pool.clone()));
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        engine,
    };
    build_app_router(state, &config)
}

/// Mint a valid access token for a seeded user.
pub fn token_for(user_id: DbId, role: &str) -> String {
    generate_access_token(user_id, role, &test_config().jwt).expect("token generation")
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn put_json(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method("PUT")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn delete(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST without an Authorization header, for public endpoints and
/// rejection tests.
pub async fn post_json_public(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_public(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("response body should be valid JSON")
}

/// Assert a response status with the body in the failure message.
pub async fn assert_status(response: Response<Body>, expected: StatusCode) -> serde_json::Value {
    let status = response.status();
    let json = body_json(response).await;
    assert_eq!(status, expected, "unexpected status, body: {json}");
    json
}

// ---------------------------------------------------------------------------
// Seeding helpers
// ---------------------------------------------------------------------------

/// Insert a user with a real Argon2 hash of `password`.
pub async fn seed_user(pool: &PgPool, username: &str, role: &str, password: &str) -> DbId {
    let hash = hash_password(password).expect("hashing");
    let (id,): (DbId,) = sqlx::query_as(
        "INSERT INTO users (username, email, password_hash, role)
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(username)
    .bind(format!("{username}@example.test"))
    .bind(hash)
    .bind(role)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

pub async fn seed_department(pool: &PgPool, name: &str) -> DbId {
    let (id,): (DbId,) = sqlx::query_as("INSERT INTO departments (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap();
    id
}

pub async fn seed_role(pool: &PgPool, name: &str, department_id: Option<DbId>) -> DbId {
    let (id,): (DbId,) =
        sqlx::query_as("INSERT INTO roles (name, department_id) VALUES ($1, $2) RETURNING id")
            .bind(name)
            .bind(department_id)
            .fetch_one(pool)
            .await
            .unwrap();
    id
}

pub async fn grant_role(pool: &PgPool, user_id: DbId, role_id: DbId) {
    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(role_id)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn seed_project(pool: &PgPool, name: &str, owner_id: DbId) -> DbId {
    let (id,): (DbId,) =
        sqlx::query_as("INSERT INTO projects (name, owner_id) VALUES ($1, $2) RETURNING id")
            .bind(name)
            .bind(owner_id)
            .fetch_one(pool)
            .await
            .unwrap();
    id
}

// ---------------------------------------------------------------------------
// Graph building helpers
// ---------------------------------------------------------------------------

pub fn node(key: &str, kind: NodeKind) -> NodeInput {
    NodeInput {
        key: key.to_string(),
        label: key.to_string(),
        required_entity_id: None,
        kind,
    }
}

pub fn role_node(key: &str, required_role: Option<DbId>) -> NodeInput {
    NodeInput {
        key: key.to_string(),
        label: key.to_string(),
        required_entity_id: required_role,
        kind: NodeKind::Role,
    }
}

pub fn connect(from: &str, to: &str) -> ConnectionInput {
    ConnectionInput {
        from_key: from.to_string(),
        to_key: to.to_string(),
        condition: None,
    }
}

pub fn connect_decision(from: &str, to: &str, decision: &str) -> ConnectionInput {
    ConnectionInput {
        from_key: from.to_string(),
        to_key: to.to_string(),
        condition: Some(EdgeCondition {
            decision: serde_json::from_value(serde_json::Value::String(decision.to_string())).ok(),
            ..Default::default()
        }),
    }
}

pub fn connect_route(from: &str, to: &str, route: &str) -> ConnectionInput {
    ConnectionInput {
        from_key: from.to_string(),
        to_key: to.to_string(),
        condition: Some(EdgeCondition {
            condition_value: Some(route.to_string()),
            ..Default::default()
        }),
    }
}

/// Store a graph under a fresh active template and return the template id
/// plus a node-key -> node-id map.
pub async fn seed_template(
    pool: &PgPool,
    name: &str,
    nodes: &[NodeInput],
    connections: &[ConnectionInput],
) -> (DbId, HashMap<String, DbId>) {
    let template = WorkflowTemplateRepo::create(
        pool,
        &praxis_db::models::workflow_template::CreateWorkflowTemplate {
            name: name.to_string(),
            description: None,
        },
    )
    .await
    .unwrap();

    let replaced = WorkflowTemplateRepo::replace_graph(pool, template.id, nodes, connections)
        .await
        .unwrap();
    WorkflowTemplateRepo::set_active(pool, template.id, true)
        .await
        .unwrap();

    let ids = replaced
        .nodes
        .into_iter()
        .map(|n| (n.node_key, n.id))
        .collect();
    (template.id, ids)
}
