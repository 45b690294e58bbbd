//! Route definitions for the `/workflow-templates` group.
//!
//! ```text
//! POST   /                     create_template       (manage)
//! GET    /                     list_templates        (execute)
//! GET    /{id}                 get_template          (execute)
//! PUT    /{id}                 update_template       (manage)
//! DELETE /{id}                 delete_template       (manage)
//! POST   /{id}/validate        validate_template     (manage)
//! POST   /{id}/activate        activate_template     (manage)
//! PUT    /{id}/graph           replace_graph         (manage)
//! ```

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::workflow_template as handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handlers::create_template).get(handlers::list_templates),
        )
        .route(
            "/{id}",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route("/{id}/validate", post(handlers::validate_template))
        .route("/{id}/activate", post(handlers::activate_template))
        .route("/{id}/graph", put(handlers::replace_graph))
}
