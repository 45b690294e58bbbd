//! Repository for roles and role membership lookups.

use praxis_core::types::DbId;
use praxis_core::workflow::eligibility::RoleMembership;

/// Provides role membership queries used for step eligibility.
pub struct RoleRepo;

impl RoleRepo {
    /// The role memberships held by a user, with each role's department.
    pub async fn user_memberships<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        user_id: DbId,
    ) -> Result<Vec<RoleMembership>, sqlx::Error> {
        let rows: Vec<(DbId, Option<DbId>)> = sqlx::query_as(
            "SELECT r.id, r.department_id
             FROM user_roles ur
             JOIN roles r ON r.id = ur.role_id
             WHERE ur.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(exec)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(role_id, department_id)| RoleMembership {
                role_id,
                department_id,
            })
            .collect())
    }
}
