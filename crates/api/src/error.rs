//! HTTP-facing error type and its status/code classification.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use praxis_core::error::{CoreError, StateError};
use serde_json::json;

/// Error type returned by every handler. Domain failures arrive as
/// [`CoreError`], persistence failures as [`sqlx::Error`]; both are
/// rendered as `{ "error", "code" }` JSON with a mapped status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<StateError> for AppError {
    fn from(err: StateError) -> Self {
        AppError::Core(CoreError::State(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({ "error": message, "code": code });
        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::State(state) => classify_state_error(*state),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Map workflow execution state errors onto HTTP semantics.
///
/// Preconditions on the instance or template (`TemplateNotActive`,
/// `AlreadyRunning`) are conflicts with current server state: 409. A
/// missing or already-completed step is a stale reference: 404. Routing
/// and eligibility failures are well-formed requests the workflow graph
/// cannot satisfy: 422.
fn classify_state_error(err: StateError) -> (StatusCode, &'static str, String) {
    let (status, code) = match err {
        StateError::TemplateNotActive => (StatusCode::CONFLICT, "TEMPLATE_NOT_ACTIVE"),
        StateError::AlreadyRunning => (StatusCode::CONFLICT, "ALREADY_RUNNING"),
        StateError::StepNotFound => (StatusCode::NOT_FOUND, "STEP_NOT_FOUND"),
        StateError::NoMatchingPath => (StatusCode::UNPROCESSABLE_ENTITY, "NO_MATCHING_PATH"),
        StateError::IneligibleAssignment => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INELIGIBLE_ASSIGNMENT")
        }
    };
    (status, code, err.to_string())
}

/// `RowNotFound` is a 404; a `23505` unique violation on one of the
/// `uq_*` constraints is a 409; anything else is logged and sanitized
/// to a 500.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_error_status_codes() {
        let cases = [
            (StateError::TemplateNotActive, StatusCode::CONFLICT),
            (StateError::AlreadyRunning, StatusCode::CONFLICT),
            (StateError::StepNotFound, StatusCode::NOT_FOUND),
            (StateError::NoMatchingPath, StatusCode::UNPROCESSABLE_ENTITY),
            (
                StateError::IneligibleAssignment,
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(classify_state_error(err).0, expected, "{err:?}");
        }
    }
}
