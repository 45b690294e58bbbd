use crate::types::DbId;

/// A workflow operation rejected because of the instance's runtime state.
///
/// These are surfaced to the caller as rejected actions with a
/// human-readable reason, never as silent no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Workflow template is not active")]
    TemplateNotActive,

    #[error("Project already has an active workflow instance")]
    AlreadyRunning,

    #[error("Active step not found or already completed")]
    StepNotFound,

    #[error("No outgoing connection matches the submitted data")]
    NoMatchingPath,

    #[error("User is not eligible for assignment to this node")]
    IneligibleAssignment,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Internal error: {0}")]
    Internal(String),
}
