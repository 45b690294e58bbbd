//! Capability names and the role -> capability mapping.
//!
//! The API boundary checks exactly one capability per endpoint before the
//! workflow engine is reached. Capabilities are resolved from the caller's
//! system role (carried in the JWT), so no database round-trip is needed.

/// Author, edit, validate, activate, and replace workflow templates;
/// pre-assign users to future nodes.
pub const CAP_MANAGE_WORKFLOWS: &str = "workflows.manage";

/// Start workflow instances and progress active steps.
pub const CAP_EXECUTE_WORKFLOWS: &str = "workflows.execute";

/// Hand off to a node other than the structurally next one.
pub const CAP_SKIP_WORKFLOW_NODES: &str = "workflows.skip_nodes";

/// Full access, including template management.
pub const ROLE_ADMIN: &str = "admin";

/// Manages templates and runs workflows, may skip nodes.
pub const ROLE_MANAGER: &str = "manager";

/// Acts on steps assigned to them.
pub const ROLE_MEMBER: &str = "member";

/// All recognised system roles.
pub const ALL_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_MANAGER, ROLE_MEMBER];

/// Capabilities granted to a system role. Unknown roles get nothing.
pub fn role_capabilities(role: &str) -> &'static [&'static str] {
    match role {
        ROLE_ADMIN | ROLE_MANAGER => &[
            CAP_MANAGE_WORKFLOWS,
            CAP_EXECUTE_WORKFLOWS,
            CAP_SKIP_WORKFLOW_NODES,
        ],
        ROLE_MEMBER => &[CAP_EXECUTE_WORKFLOWS],
        _ => &[],
    }
}

/// Check whether a system role grants a capability.
pub fn role_has_capability(role: &str, capability: &str) -> bool {
    role_capabilities(role).contains(&capability)
}
