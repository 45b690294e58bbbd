//! Dotted branch identifiers for fork/join lineage.
//!
//! The unforked root lineage is `"main"`. A fork into N edges derives one
//! child id per edge by appending a 1-based position (`main.1`, `main.2`);
//! nested forks nest the suffix (`main.1.2`). The join logic uses the
//! parent prefix to decide which sibling branches must all arrive at a
//! sync node before it opens.

/// Branch id of the unforked root lineage.
pub const ROOT_BRANCH: &str = "main";

/// Derive child branch ids for a fork with `count` outgoing branches.
pub fn child_branches(parent: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{parent}.{i}")).collect()
}

/// The parent lineage of a branch, or `None` for the root.
pub fn parent_branch(branch: &str) -> Option<&str> {
    branch.rsplit_once('.').map(|(parent, _)| parent)
}

/// Whether two branch ids were created by the same fork.
pub fn are_siblings(a: &str, b: &str) -> bool {
    match (parent_branch(a), parent_branch(b)) {
        (Some(pa), Some(pb)) => pa == pb,
        _ => false,
    }
}
