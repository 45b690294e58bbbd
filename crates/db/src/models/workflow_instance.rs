//! Workflow instance models: the instance row, its active steps ("tokens"
//! of execution), the append-only handoff history, and node
//! pre-assignments.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use praxis_core::types::{DbId, Timestamp};

/// Status values for `workflow_instances.status`.
pub mod instance_status {
    pub const ACTIVE: &str = "active";
    pub const COMPLETED: &str = "completed";
    pub const CANCELLED: &str = "cancelled";
}

/// Status values for `workflow_active_steps.status`.
pub mod step_status {
    /// Awaiting action by its assignee.
    pub const ACTIVE: &str = "active";
    /// Arrived at a sync node, blocked pending sibling branches.
    pub const WAITING: &str = "waiting";
    /// Acted upon; terminal.
    pub const COMPLETED: &str = "completed";
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// One running execution of a template against a project.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowInstance {
    pub id: DbId,
    pub template_id: DbId,
    pub project_id: DbId,
    pub status: String,
    /// Legacy single pointer; NULL while branches run in parallel.
    pub current_node_id: Option<DbId>,
    pub has_parallel_paths: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// A live position of execution within an instance. Many coexist when
/// branches have forked.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowActiveStep {
    pub id: DbId,
    pub instance_id: DbId,
    pub node_id: DbId,
    pub branch_id: String,
    pub status: String,
    pub assigned_user_id: Option<DbId>,
    pub activated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// One handoff record. Append-only.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowHistoryEntry {
    pub id: DbId,
    pub instance_id: DbId,
    pub from_node_id: Option<DbId>,
    pub to_node_id: DbId,
    pub handed_off_by: DbId,
    pub handed_off_to: Option<DbId>,
    pub decision: Option<String>,
    pub form_response_id: Option<DbId>,
    pub notes: Option<String>,
    pub out_of_order: bool,
    pub created_at: Timestamp,
}

/// A user bound to a future node before the frontier reaches it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowNodeAssignment {
    pub id: DbId,
    pub instance_id: DbId,
    pub node_id: DbId,
    pub user_id: DbId,
    pub assigned_by: DbId,
    pub assigned_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Create DTOs
// ---------------------------------------------------------------------------

/// Input for appending a history row.
#[derive(Debug, Clone)]
pub struct CreateHistoryEntry {
    pub instance_id: DbId,
    pub from_node_id: Option<DbId>,
    pub to_node_id: DbId,
    pub handed_off_by: DbId,
    pub handed_off_to: Option<DbId>,
    pub decision: Option<String>,
    pub form_response_id: Option<DbId>,
    pub notes: Option<String>,
    pub out_of_order: bool,
}

/// Request body for creating a node pre-assignment.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNodeAssignment {
    pub node_id: DbId,
    pub user_id: DbId,
}
