//! Lookup queries for user accounts.
//!
//! Accounts are provisioned out of band (seed data or an admin tool), so
//! this repo only needs the lookups the auth layer performs.

use crate::models::user::User;

const COLUMNS: &str =
    "id, username, email, password_hash, role, is_active, created_at, updated_at";

pub struct UserRepo;

impl UserRepo {
    /// Username lookup used by login. Usernames carry a unique index, so at
    /// most one row can match.
    pub async fn find_by_username<'e, E: sqlx::PgExecutor<'e>>(
        executor: E,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as(&query)
            .bind(username)
            .fetch_optional(executor)
            .await
    }
}
