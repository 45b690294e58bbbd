pub mod auth;
pub mod health;
pub mod workflow_instance;
pub mod workflow_template;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/login                                   login (public)
///
/// /workflow-templates                           list, create
/// /workflow-templates/{id}                      get, update, delete
/// /workflow-templates/{id}/validate             structural validation (POST)
/// /workflow-templates/{id}/activate             validate + activate (POST)
/// /workflow-templates/{id}/graph                destructive graph replace (PUT)
///
/// /workflow-instances                           start (POST)
/// /workflow-instances/{id}                      get
/// /workflow-instances/{id}/progress             handoff event (POST)
/// /workflow-instances/{id}/steps                actionable steps (GET)
/// /workflow-instances/{id}/all-steps            actionable + waiting steps (GET)
/// /workflow-instances/{id}/complete             completion flag (GET)
/// /workflow-instances/{id}/next-nodes           structural successors (GET)
/// /workflow-instances/{id}/history              handoff audit trail (GET)
/// /workflow-instances/{id}/assignments          pre-assignments (GET, POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Authentication routes (login).
        .nest("/auth", auth::router())
        // Template authoring, validation, and activation.
        .nest("/workflow-templates", workflow_template::router())
        // Instance execution and projections.
        .nest("/workflow-instances", workflow_instance::router())
}
