//! Static template validation.
//!
//! Pure functions over a [`TemplateGraph`] producing errors (which block
//! activation) and warnings (advisory only). Every finding carries the
//! offending node's id and label so the template editor can highlight it.
//! Nothing is ever fixed silently; the author re-edits the graph.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::types::DbId;
use crate::workflow::graph::{Decision, GraphNode, NodeType, TemplateGraph};

/// Stable finding codes, matched on by the template editor.
pub mod codes {
    pub const EMPTY_TEMPLATE: &str = "EMPTY_TEMPLATE";
    pub const NO_START_NODE: &str = "NO_START_NODE";
    pub const MULTIPLE_START_NODES: &str = "MULTIPLE_START_NODES";
    pub const CYCLE_DETECTED: &str = "CYCLE_DETECTED";
    pub const PARALLEL_WITHOUT_SYNC: &str = "PARALLEL_WITHOUT_SYNC";
    pub const APPROVAL_NO_OUTGOING: &str = "APPROVAL_NO_OUTGOING";
    pub const APPROVAL_MISSING_APPROVED_PATH: &str = "APPROVAL_MISSING_APPROVED_PATH";
    pub const CONDITIONAL_NO_OUTGOING: &str = "CONDITIONAL_NO_OUTGOING";

    pub const NO_END_NODE: &str = "NO_END_NODE";
    pub const ORPHAN_NODE: &str = "ORPHAN_NODE";
    pub const SYNC_FEW_INPUTS: &str = "SYNC_FEW_INPUTS";
    pub const SYNC_NO_OUTPUT: &str = "SYNC_NO_OUTPUT";
    pub const CONDITIONAL_ALL_DEFAULT: &str = "CONDITIONAL_ALL_DEFAULT";
    pub const CONDITIONAL_NO_FALLBACK: &str = "CONDITIONAL_NO_FALLBACK";
}

/// One structural defect or advisory note.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationFinding {
    pub code: &'static str,
    pub message: String,
    pub node_id: Option<DbId>,
    pub node_label: Option<String>,
}

impl ValidationFinding {
    fn new(code: &'static str, message: String) -> Self {
        Self {
            code,
            message,
            node_id: None,
            node_label: None,
        }
    }

    fn at(code: &'static str, message: String, node: &GraphNode) -> Self {
        Self {
            code,
            message,
            node_id: Some(node.id),
            node_label: Some(node.label.clone()),
        }
    }
}

/// Outcome of validating a template graph.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationFinding>,
    pub warnings: Vec<ValidationFinding>,
}

impl ValidationReport {
    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|f| f.code == code)
    }

    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|f| f.code == code)
    }
}

/// Validate a template graph. Side-effect free.
pub fn validate(graph: &TemplateGraph) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if graph.nodes().is_empty() {
        errors.push(ValidationFinding::new(
            codes::EMPTY_TEMPLATE,
            "Template has no nodes".to_string(),
        ));
        return ValidationReport {
            valid: false,
            errors,
            warnings,
        };
    }

    check_start_node(graph, &mut errors);
    check_cycles(graph, &mut errors);
    check_forks(graph, &mut errors);
    check_approvals(graph, &mut errors);
    check_conditionals(graph, &mut errors, &mut warnings);
    check_end_node(graph, &mut warnings);
    check_orphans(graph, &mut warnings);
    check_syncs(graph, &mut warnings);

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_start_node(graph: &TemplateGraph, errors: &mut Vec<ValidationFinding>) {
    let starts = graph.start_nodes();
    match starts.len() {
        0 => errors.push(ValidationFinding::new(
            codes::NO_START_NODE,
            "Template has no start node".to_string(),
        )),
        1 => {}
        n => {
            for start in starts {
                errors.push(ValidationFinding::at(
                    codes::MULTIPLE_START_NODES,
                    format!("Template has {n} start nodes, expected exactly one"),
                    start,
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first walk over every node; a back-edge is a cycle error unless it
/// is a send-back edge (decision or condition value `rejected`), which is a
/// permitted loop and skipped entirely.
fn check_cycles(graph: &TemplateGraph, errors: &mut Vec<ValidationFinding>) {
    let mut color: HashMap<DbId, Color> = graph
        .nodes()
        .iter()
        .map(|n| (n.id, Color::White))
        .collect();

    for node in graph.nodes() {
        if color[&node.id] == Color::White {
            visit(graph, node.id, &mut color, errors);
        }
    }
}

fn visit(
    graph: &TemplateGraph,
    id: DbId,
    color: &mut HashMap<DbId, Color>,
    errors: &mut Vec<ValidationFinding>,
) {
    color.insert(id, Color::Gray);

    for edge in graph.outgoing(id) {
        if edge.is_send_back() {
            continue;
        }
        let Some(target) = graph.node(edge.to_node_id) else {
            continue;
        };
        match color.get(&target.id).copied().unwrap_or(Color::White) {
            Color::Gray => errors.push(ValidationFinding::at(
                codes::CYCLE_DETECTED,
                format!("Cycle detected at node '{}'", target.label),
                target,
            )),
            Color::White => visit(graph, target.id, color, errors),
            Color::Black => {}
        }
    }

    color.insert(id, Color::Black);
}

// ---------------------------------------------------------------------------
// Fork/join balance
// ---------------------------------------------------------------------------

/// Every branch of a parallel fork must reach the same single sync node
/// before continuing. A branch that dead-ends, hits an end node, or reaches
/// a different sync than its siblings is an error.
fn check_forks(graph: &TemplateGraph, errors: &mut Vec<ValidationFinding>) {
    for node in graph.nodes() {
        let branches = graph.unconditioned_outgoing(node.id);
        if branches.len() < 2 {
            continue;
        }

        let mut resolved: Vec<(String, Option<DbId>)> = Vec::new();
        for (i, edge) in branches.iter().enumerate() {
            let label = edge
                .branch_label()
                .map(str::to_string)
                .or_else(|| graph.node(edge.to_node_id).map(|n| n.label.clone()))
                .unwrap_or_else(|| format!("branch {}", i + 1));

            let mut seen = HashSet::new();
            let mut fork_stack = HashSet::from([node.id]);
            let sync = first_sync(graph, edge.to_node_id, &mut seen, &mut fork_stack);
            resolved.push((label, sync));
        }

        let missing: Vec<&str> = resolved
            .iter()
            .filter(|(_, sync)| sync.is_none())
            .map(|(label, _)| label.as_str())
            .collect();
        if !missing.is_empty() {
            for label in missing {
                errors.push(ValidationFinding::at(
                    codes::PARALLEL_WITHOUT_SYNC,
                    format!(
                        "Parallel branch '{}' from node '{}' never reaches a sync node",
                        label, node.label
                    ),
                    node,
                ));
            }
            continue;
        }

        let syncs: HashSet<DbId> = resolved.iter().filter_map(|(_, s)| *s).collect();
        if syncs.len() > 1 {
            errors.push(ValidationFinding::at(
                codes::PARALLEL_WITHOUT_SYNC,
                format!(
                    "Parallel branches from node '{}' reach different sync nodes",
                    node.label
                ),
                node,
            ));
        }
    }
}

/// First sync node reachable from `start` along non-send-back edges.
///
/// A nested fork found on the way is resolved to its own convergence sync
/// first and the walk continues past it, so an inner join is not mistaken
/// for the outer branch's convergence point. `fork_stack` guards against
/// re-entering a fork that is already being resolved.
fn first_sync(
    graph: &TemplateGraph,
    start: DbId,
    seen: &mut HashSet<DbId>,
    fork_stack: &mut HashSet<DbId>,
) -> Option<DbId> {
    if !seen.insert(start) {
        return None;
    }
    let node = graph.node(start)?;
    if node.node_type() == NodeType::Sync {
        return Some(start);
    }

    if graph.is_fork(start) && !fork_stack.contains(&start) {
        let inner_join = resolve_fork(graph, start, fork_stack)?;
        for edge in graph.outgoing(inner_join) {
            if edge.is_send_back() {
                continue;
            }
            if let Some(sync) = first_sync(graph, edge.to_node_id, seen, fork_stack) {
                return Some(sync);
            }
        }
        return None;
    }

    for edge in graph.outgoing(start) {
        if edge.is_send_back() {
            continue;
        }
        if let Some(sync) = first_sync(graph, edge.to_node_id, seen, fork_stack) {
            return Some(sync);
        }
    }
    None
}

/// The single sync all branches of `fork` converge at, or `None` when they
/// diverge or some branch never reaches one.
fn resolve_fork(
    graph: &TemplateGraph,
    fork: DbId,
    fork_stack: &mut HashSet<DbId>,
) -> Option<DbId> {
    fork_stack.insert(fork);

    let mut converged: Option<DbId> = None;
    let mut consistent = true;
    for edge in graph.unconditioned_outgoing(fork) {
        let mut seen = HashSet::new();
        match first_sync(graph, edge.to_node_id, &mut seen, fork_stack) {
            Some(sync) => match converged {
                None => converged = Some(sync),
                Some(existing) if existing == sync => {}
                Some(_) => consistent = false,
            },
            None => consistent = false,
        }
    }

    fork_stack.remove(&fork);
    if consistent {
        converged
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Per-type completeness
// ---------------------------------------------------------------------------

fn check_approvals(graph: &TemplateGraph, errors: &mut Vec<ValidationFinding>) {
    for node in graph.nodes() {
        if node.node_type() != NodeType::Approval {
            continue;
        }
        let outgoing = graph.outgoing(node.id);
        if outgoing.is_empty() {
            errors.push(ValidationFinding::at(
                codes::APPROVAL_NO_OUTGOING,
                format!("Approval node '{}' has no outgoing connection", node.label),
                node,
            ));
        } else if outgoing.len() > 1
            && !outgoing
                .iter()
                .any(|e| e.decision() == Some(Decision::Approved))
        {
            errors.push(ValidationFinding::at(
                codes::APPROVAL_MISSING_APPROVED_PATH,
                format!(
                    "Approval node '{}' has multiple outgoing connections but none tagged 'approved'",
                    node.label
                ),
                node,
            ));
        }
    }
}

fn check_conditionals(
    graph: &TemplateGraph,
    errors: &mut Vec<ValidationFinding>,
    warnings: &mut Vec<ValidationFinding>,
) {
    for node in graph.nodes() {
        if node.node_type() != NodeType::Conditional {
            continue;
        }
        let outgoing = graph.outgoing(node.id);
        if outgoing.is_empty() {
            errors.push(ValidationFinding::at(
                codes::CONDITIONAL_NO_OUTGOING,
                format!("Conditional node '{}' has no outgoing connection", node.label),
                node,
            ));
            continue;
        }

        let tagged = outgoing
            .iter()
            .filter(|e| e.condition_value().is_some())
            .count();
        let has_default = outgoing.iter().any(|e| e.is_unconditioned());

        if tagged == 0 {
            warnings.push(ValidationFinding::at(
                codes::CONDITIONAL_ALL_DEFAULT,
                format!(
                    "Conditional node '{}' has no condition-tagged connections; everything falls through as default",
                    node.label
                ),
                node,
            ));
        } else if !has_default && tagged < 2 {
            warnings.push(ValidationFinding::at(
                codes::CONDITIONAL_NO_FALLBACK,
                format!(
                    "Conditional node '{}' has a single condition branch and no default fallback",
                    node.label
                ),
                node,
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

fn check_end_node(graph: &TemplateGraph, warnings: &mut Vec<ValidationFinding>) {
    if !graph.nodes().iter().any(|n| n.node_type() == NodeType::End) {
        warnings.push(ValidationFinding::new(
            codes::NO_END_NODE,
            "Template has no end node".to_string(),
        ));
    }
}

/// A node other than start/end with no connection at all. Start nodes are
/// exempt from requiring an incoming edge, end nodes from an outgoing one.
fn check_orphans(graph: &TemplateGraph, warnings: &mut Vec<ValidationFinding>) {
    for node in graph.nodes() {
        if matches!(node.node_type(), NodeType::Start | NodeType::End) {
            continue;
        }
        if graph.outgoing(node.id).is_empty() && graph.incoming(node.id).is_empty() {
            warnings.push(ValidationFinding::at(
                codes::ORPHAN_NODE,
                format!("Node '{}' has no connections", node.label),
                node,
            ));
        }
    }
}

fn check_syncs(graph: &TemplateGraph, warnings: &mut Vec<ValidationFinding>) {
    for node in graph.nodes() {
        if node.node_type() != NodeType::Sync {
            continue;
        }
        let incoming = graph.incoming(node.id).len();
        if incoming < 2 {
            warnings.push(ValidationFinding::at(
                codes::SYNC_FEW_INPUTS,
                format!(
                    "Sync node '{}' has fewer than 2 incoming connections",
                    node.label
                ),
                node,
            ));
        }
        if graph.outgoing(node.id).is_empty() {
            warnings.push(ValidationFinding::at(
                codes::SYNC_NO_OUTPUT,
                format!("Sync node '{}' has no outgoing connection", node.label),
                node,
            ));
        }
    }
}
