//! Route definitions for the `/workflow-instances` group.
//!
//! ```text
//! POST   /                     start_instance        (execute)
//! GET    /{id}                 get_instance          (execute)
//! POST   /{id}/progress        progress_step         (execute; skip cap for out-of-order)
//! GET    /{id}/steps           list_active_steps     (execute)
//! GET    /{id}/all-steps       list_all_steps        (execute)
//! GET    /{id}/complete        get_completion        (execute)
//! GET    /{id}/next-nodes      list_next_nodes       (execute)
//! GET    /{id}/history         list_history          (execute)
//! POST   /{id}/assignments     create_assignment     (manage)
//! GET    /{id}/assignments     list_assignments      (execute)
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::workflow_instance as handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::start_instance))
        .route("/{id}", get(handlers::get_instance))
        .route("/{id}/progress", post(handlers::progress_step))
        .route("/{id}/steps", get(handlers::list_active_steps))
        .route("/{id}/all-steps", get(handlers::list_all_steps))
        .route("/{id}/complete", get(handlers::get_completion))
        .route("/{id}/next-nodes", get(handlers::list_next_nodes))
        .route("/{id}/history", get(handlers::list_history))
        .route(
            "/{id}/assignments",
            post(handlers::create_assignment).get(handlers::list_assignments),
        )
}
