//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - Status string constants where a table carries a TEXT status column

pub mod user;
pub mod workflow_instance;
pub mod workflow_template;
