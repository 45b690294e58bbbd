use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::executor::WorkflowEngine;

/// State handed to every handler through `State<AppState>`. Cloning is
/// cheap; the pool and engine are shared.
#[derive(Clone)]
pub struct AppState {
    pub pool: praxis_db::DbPool,
    pub config: Arc<ServerConfig>,
    pub engine: Arc<WorkflowEngine>,
}
