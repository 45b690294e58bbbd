//! Assignment eligibility rules.
//!
//! Whether a user may be assigned to act on a node is decided from an
//! explicit [`EligibilityContext`] the caller builds up front (role and
//! department memberships plus any explicit node pre-assignments), never
//! from ambient session state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::DbId;
use crate::workflow::graph::{GraphNode, NodeType};

/// One role a user holds, with the department that role belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMembership {
    pub role_id: DbId,
    pub department_id: Option<DbId>,
}

/// Everything the eligibility decision needs about one candidate user.
#[derive(Debug, Clone, Default)]
pub struct EligibilityContext {
    pub roles: Vec<RoleMembership>,
    /// Nodes this user has been explicitly pre-assigned to for the
    /// instance at hand. Pre-assignment overrides structural eligibility.
    pub preassigned_nodes: HashSet<DbId>,
}

impl EligibilityContext {
    pub fn holds_role(&self, role_id: DbId) -> bool {
        self.roles.iter().any(|m| m.role_id == role_id)
    }

    pub fn in_department(&self, department_id: DbId) -> bool {
        self.roles
            .iter()
            .any(|m| m.department_id == Some(department_id))
    }
}

/// Decide whether the user described by `ctx` may act on `node`.
///
/// Role and approval nodes require the node's entity as a held role;
/// department nodes require any held role in that department. Nodes
/// without a required entity are eligible to anyone.
pub fn is_eligible(node: &GraphNode, ctx: &EligibilityContext) -> bool {
    if ctx.preassigned_nodes.contains(&node.id) {
        return true;
    }

    let Some(required) = node.required_entity_id else {
        return true;
    };

    match node.node_type() {
        NodeType::Role | NodeType::Approval => ctx.holds_role(required),
        NodeType::Department => ctx.in_department(required),
        _ => true,
    }
}
