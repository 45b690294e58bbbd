//! Workflow template models and DTOs.
//!
//! Defines the row structs for `workflow_templates`, `workflow_nodes`, and
//! `workflow_connections`, plus the graph-input DTOs used by the
//! destructive replace operation. Node inputs carry an externally-stable
//! `key` so replaces are diff-able; connection inputs reference nodes by
//! key and are resolved to fresh ids on insert.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use praxis_core::types::{DbId, Timestamp};
use praxis_core::workflow::graph::{EdgeCondition, NodeKind};

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A workflow template row from the `workflow_templates` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowTemplate {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A node row from the `workflow_nodes` table. `settings` holds the
/// serialized `NodeKind` payload.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowNodeRow {
    pub id: DbId,
    pub template_id: DbId,
    pub node_key: String,
    pub node_type: String,
    pub label: String,
    pub required_entity_id: Option<DbId>,
    pub settings: serde_json::Value,
    pub created_at: Timestamp,
}

/// A connection row from the `workflow_connections` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowConnectionRow {
    pub id: DbId,
    pub template_id: DbId,
    pub from_node_id: DbId,
    pub to_node_id: DbId,
    pub condition: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Create / update DTOs
// ---------------------------------------------------------------------------

/// Input for creating a new template record.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowTemplate {
    pub name: String,
    pub description: Option<String>,
}

/// Input for updating template metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateWorkflowTemplate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// One node of a graph being stored. The `key` is the editor-supplied
/// stable identifier, unique within the template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInput {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub required_entity_id: Option<DbId>,
    /// Tagged type-specific settings (`{"type": "approval", ...}`).
    pub kind: NodeKind,
}

/// One connection of a graph being stored, referencing nodes by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInput {
    pub from_key: String,
    pub to_key: String,
    #[serde(default)]
    pub condition: Option<EdgeCondition>,
}
