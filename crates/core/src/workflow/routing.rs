//! Outgoing-edge selection for a handoff event.
//!
//! Given the node being completed plus the event payload (an approval
//! decision, or form data for conditional routing), decides which outgoing
//! connections fire. Two or more fired unconditioned edges constitute a
//! parallel fork; the runtime engine derives child branches for them.

use serde_json::Value;

use crate::error::{CoreError, StateError};
use crate::workflow::condition::select_route;
use crate::workflow::graph::{Decision, GraphEdge, GraphNode, NodeKind, TemplateGraph};

/// Select the outgoing connections that fire when `node` is completed.
///
/// - approval node: the connection(s) tagged with the supplied decision;
///   with no tagged edges at all, the unconditioned edge carries both
///   outcomes;
/// - conditional node: the first matching clause's connection, else the
///   default/unconditioned connection, else [`StateError::NoMatchingPath`];
/// - any other node: its unconditioned outgoing edges (one = plain move,
///   two or more = parallel fork); none = [`StateError::NoMatchingPath`].
pub fn select_edges<'g>(
    graph: &'g TemplateGraph,
    node: &GraphNode,
    decision: Option<Decision>,
    form_data: Option<&Value>,
) -> Result<Vec<&'g GraphEdge>, CoreError> {
    match &node.kind {
        NodeKind::Approval { .. } => {
            let decision = decision.ok_or_else(|| {
                CoreError::Validation(format!(
                    "A decision is required to progress approval node '{}'",
                    node.label
                ))
            })?;

            let tagged: Vec<&GraphEdge> = graph
                .outgoing(node.id)
                .into_iter()
                .filter(|e| e.decision() == Some(decision))
                .collect();
            if !tagged.is_empty() {
                return Ok(tagged);
            }

            // A single untagged edge serves both outcomes.
            let fallback = graph.unconditioned_outgoing(node.id);
            if fallback.is_empty() {
                return Err(StateError::NoMatchingPath.into());
            }
            Ok(fallback)
        }

        NodeKind::Conditional { clauses, .. } => {
            let matched_route = form_data.and_then(|data| select_route(clauses, data));

            if let Some(route) = matched_route {
                let routed: Vec<&GraphEdge> = graph
                    .outgoing(node.id)
                    .into_iter()
                    .filter(|e| e.condition_value() == Some(route))
                    .collect();
                if !routed.is_empty() {
                    return Ok(routed);
                }
            }

            let default = graph.unconditioned_outgoing(node.id);
            if default.is_empty() {
                return Err(StateError::NoMatchingPath.into());
            }
            Ok(default)
        }

        _ => {
            let unconditioned = graph.unconditioned_outgoing(node.id);
            if unconditioned.is_empty() {
                return Err(StateError::NoMatchingPath.into());
            }
            Ok(unconditioned)
        }
    }
}
