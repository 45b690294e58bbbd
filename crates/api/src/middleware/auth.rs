//! Bearer-token authentication extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use praxis_core::error::CoreError;
use praxis_core::types::DbId;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller, decoded from the `Authorization: Bearer`
/// header. Handlers take it as an extractor parameter; requests without a
/// valid token never reach the handler body.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Database id of the user (the token's `sub` claim).
    pub user_id: DbId,
    /// System role name carried in the token, resolved to capabilities
    /// by the rbac extractors.
    pub role: String,
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CoreError::Unauthorized("Missing Authorization header".into()))?;
    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| CoreError::Unauthorized("Expected a Bearer token".into()).into())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = validate_token(token, &state.config.jwt)
            .map_err(|_| CoreError::Unauthorized("Invalid or expired token".into()))?;

        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}
