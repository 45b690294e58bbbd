//! User row model.
//!
//! User CRUD is out of scope for this service; the row struct exists for
//! the login lookup and test seeding.

use serde::Serialize;
use sqlx::FromRow;

use praxis_core::types::{DbId, Timestamp};

/// A user row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// System role name (`admin`, `manager`, `member`) driving capabilities.
    pub role: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
