//! Route definitions for the `/auth` group.
//!
//! ```text
//! POST   /login     login (public)
//! ```

use axum::routing::post;
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/login", post(auth::login))
}
