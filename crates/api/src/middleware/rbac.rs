//! Capability-based access control extractors.
//!
//! Each extractor wraps [`AuthUser`] and rejects requests whose role does not
//! grant the required capability. Capabilities are resolved from the role in
//! the JWT via [`praxis_core::capabilities`], so no database lookup happens
//! on the request path.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use praxis_core::capabilities::{
    role_has_capability, CAP_EXECUTE_WORKFLOWS, CAP_MANAGE_WORKFLOWS,
};
use praxis_core::error::CoreError;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

fn require_capability(user: &AuthUser, capability: &str) -> Result<(), AppError> {
    if !role_has_capability(&user.role, capability) {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Capability '{capability}' required"
        ))));
    }
    Ok(())
}

/// Requires the `workflows.manage` capability. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn create_template(RequireManageWorkflows(user): RequireManageWorkflows) -> AppResult<Json<()>> {
///     // user is guaranteed to hold workflows.manage here
///     Ok(Json(()))
/// }
/// ```
pub struct RequireManageWorkflows(pub AuthUser);

impl FromRequestParts<AppState> for RequireManageWorkflows {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        require_capability(&user, CAP_MANAGE_WORKFLOWS)?;
        Ok(RequireManageWorkflows(user))
    }
}

/// Requires the `workflows.execute` capability. Rejects with 403 Forbidden otherwise.
pub struct RequireExecuteWorkflows(pub AuthUser);

impl FromRequestParts<AppState> for RequireExecuteWorkflows {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        require_capability(&user, CAP_EXECUTE_WORKFLOWS)?;
        Ok(RequireExecuteWorkflows(user))
    }
}
