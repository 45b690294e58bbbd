//! The workflow executor: start, progress, and read projections.
//!
//! All mutation runs inside a single transaction that begins by locking
//! the instance row (`SELECT ... FOR UPDATE`). That makes step resolution,
//! edge selection, and the sync-node join a per-instance critical section:
//! two handoffs racing on a fork's last two branches serialize on the row
//! lock, so exactly one of them observes "all siblings arrived" and opens
//! the join.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use praxis_core::error::{CoreError, StateError};
use praxis_core::types::DbId;
use praxis_core::workflow::branch::{child_branches, parent_branch, ROOT_BRANCH};
use praxis_core::workflow::eligibility::{is_eligible, EligibilityContext};
use praxis_core::workflow::graph::{Decision, NodeType, TemplateGraph};
use praxis_core::workflow::routing::select_edges;
use praxis_db::models::workflow_instance::{
    instance_status, step_status, CreateHistoryEntry, WorkflowActiveStep, WorkflowInstance,
};
use praxis_db::repositories::{RoleRepo, WorkflowInstanceRepo, WorkflowTemplateRepo};

use crate::error::{AppError, AppResult};

/// Explicit per-node assignment requests accompanying a handoff,
/// node id -> user id.
pub type AssignmentRequest = HashMap<DbId, DbId>;

/// A node the execution frontier may move to, for UI preview.
#[derive(Debug, Clone, Serialize)]
pub struct NextNode {
    pub node_id: DbId,
    pub label: String,
    pub node_type: String,
}

/// The result of one handoff event.
#[derive(Debug, Serialize)]
pub struct ProgressOutcome {
    pub instance: WorkflowInstance,
    /// Nodes that now hold an actionable step.
    pub next_nodes: Vec<NextNode>,
    pub new_active_steps: Vec<WorkflowActiveStep>,
}

/// One pending traversal in the progression loop. The first hop carries
/// the caller's event payload; hops queued by a join do not.
struct Hop {
    from_node_id: DbId,
    branch: String,
    decision: Option<Decision>,
    first: bool,
}

/// The parameters of a progress call, bundled so the drain loop does not
/// take a dozen arguments.
pub struct ProgressRequest {
    pub instance_id: DbId,
    /// Explicit step to complete; `None` falls back to the instance's
    /// single current node.
    pub step_id: Option<DbId>,
    pub actor: DbId,
    pub decision: Option<Decision>,
    pub form_data: Option<Value>,
    pub assignments: AssignmentRequest,
    pub notes: Option<String>,
    pub out_of_order: bool,
}

/// Advances workflow instances through their template graphs.
pub struct WorkflowEngine {
    pool: PgPool,
}

impl WorkflowEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // -------------------------------------------------------------------
    // start
    // -------------------------------------------------------------------

    /// Start a new instance of `template_id` for `project_id`.
    ///
    /// Fails with [`StateError::TemplateNotActive`] unless the template has
    /// been activated, and with [`StateError::AlreadyRunning`] if the
    /// project already has a live instance. The new instance gets one
    /// active step at the start node on the root branch, plus the first
    /// history row (`from_node_id = NULL`).
    pub async fn start_workflow(
        &self,
        template_id: DbId,
        project_id: DbId,
        initiator: DbId,
    ) -> AppResult<WorkflowInstance> {
        let template = WorkflowTemplateRepo::find_by_id(&self.pool, template_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "workflow template",
                id: template_id,
            })?;
        if !template.is_active {
            return Err(StateError::TemplateNotActive.into());
        }

        let graph = WorkflowTemplateRepo::load_graph(&self.pool, template_id).await?;
        let start = graph.start_node().ok_or_else(|| {
            CoreError::Validation("Template does not have exactly one start node".into())
        })?;
        let start_id = start.id;

        let mut tx = self.pool.begin().await?;

        if WorkflowInstanceRepo::find_active_by_project(&mut *tx, project_id)
            .await?
            .is_some()
        {
            return Err(StateError::AlreadyRunning.into());
        }

        let instance = WorkflowInstanceRepo::create(&mut *tx, template_id, project_id).await?;

        let assignee =
            WorkflowInstanceRepo::find_assignment_for_node(&mut *tx, instance.id, start_id).await?;
        WorkflowInstanceRepo::insert_step(
            &mut *tx,
            instance.id,
            start_id,
            ROOT_BRANCH,
            step_status::ACTIVE,
            assignee,
        )
        .await?;
        WorkflowInstanceRepo::set_current_node(&mut *tx, instance.id, Some(start_id)).await?;

        WorkflowInstanceRepo::append_history(
            &mut *tx,
            &CreateHistoryEntry {
                instance_id: instance.id,
                from_node_id: None,
                to_node_id: start_id,
                handed_off_by: initiator,
                handed_off_to: assignee,
                decision: None,
                form_response_id: None,
                notes: None,
                out_of_order: false,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            instance_id = instance.id,
            template_id,
            project_id,
            "Started workflow instance",
        );

        // Re-read so the returned row reflects the current_node update.
        WorkflowInstanceRepo::find_by_id(&self.pool, instance.id)
            .await?
            .ok_or_else(|| AppError::InternalError("Instance vanished after creation".into()))
    }

    // -------------------------------------------------------------------
    // progress
    // -------------------------------------------------------------------

    /// Complete one step and move the execution frontier.
    ///
    /// See the module docs for the locking discipline. Routing follows the
    /// completed node's type: approval nodes need the caller's decision,
    /// conditional nodes evaluate their clauses against `form_data`, and
    /// two or more fired connections fork into derived branches. A step
    /// landing on a sync node is parked as `waiting` until every sibling
    /// branch has arrived; the last arrival completes the parked steps and
    /// continues past the sync on the parent branch.
    pub async fn progress_step(&self, req: ProgressRequest) -> AppResult<ProgressOutcome> {
        let mut tx = self.pool.begin().await?;

        let instance = WorkflowInstanceRepo::lock(&mut *tx, req.instance_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "workflow instance",
                id: req.instance_id,
            })?;

        let graph = WorkflowTemplateRepo::load_graph(&self.pool, instance.template_id).await?;

        // Resolve the step being completed.
        let step = match req.step_id {
            Some(step_id) => WorkflowInstanceRepo::find_step(&mut *tx, step_id)
                .await?
                .filter(|s| s.instance_id == instance.id),
            None => match instance.current_node_id {
                Some(node_id) => {
                    WorkflowInstanceRepo::find_live_step_for_node(&mut *tx, instance.id, node_id)
                        .await?
                }
                None => None,
            },
        };
        let step = step
            .filter(|s| s.status != step_status::COMPLETED)
            .ok_or(StateError::StepNotFound)?;

        let node = graph.node(step.node_id).ok_or(CoreError::NotFound {
            entity: "workflow node",
            id: step.node_id,
        })?;

        // Select fired connections before mutating anything, so a routing
        // failure leaves the step untouched.
        select_edges(&graph, node, req.decision, req.form_data.as_ref())?;

        if !WorkflowInstanceRepo::complete_step(&mut *tx, step.id).await? {
            return Err(StateError::StepNotFound.into());
        }

        let mut new_active_steps = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(Hop {
            from_node_id: step.node_id,
            branch: step.branch_id.clone(),
            decision: req.decision,
            first: true,
        });

        while let Some(hop) = queue.pop_front() {
            let from = graph.node(hop.from_node_id).ok_or(CoreError::NotFound {
                entity: "workflow node",
                id: hop.from_node_id,
            })?;
            let form_data = if hop.first { req.form_data.as_ref() } else { None };
            let edges = select_edges(&graph, from, hop.decision, form_data)?;

            // Two or more fired connections are a parallel fork; each
            // branch gets a derived id.
            let branches: Vec<String> = if edges.len() >= 2 {
                WorkflowInstanceRepo::set_parallel_paths(&mut *tx, instance.id, true).await?;
                child_branches(&hop.branch, edges.len())
            } else {
                vec![hop.branch.clone()]
            };

            for (edge, branch) in edges.iter().zip(branches) {
                self.arrive(
                    &mut tx,
                    &instance,
                    &graph,
                    &req,
                    &hop,
                    edge.to_node_id,
                    branch,
                    &mut queue,
                    &mut new_active_steps,
                )
                .await?;
            }
        }

        // Maintain the aggregate pointers, then close out the instance if
        // nothing is left running.
        let live = WorkflowInstanceRepo::live_steps(&mut *tx, instance.id).await?;
        if live.is_empty() {
            WorkflowInstanceRepo::set_status(&mut *tx, instance.id, instance_status::COMPLETED)
                .await?;
            WorkflowInstanceRepo::set_current_node(&mut *tx, instance.id, None).await?;
            WorkflowInstanceRepo::set_parallel_paths(&mut *tx, instance.id, false).await?;
            tracing::info!(instance_id = instance.id, "Workflow instance completed");
        } else {
            let branches: HashSet<&str> = live.iter().map(|s| s.branch_id.as_str()).collect();
            if branches.len() <= 1 {
                WorkflowInstanceRepo::set_parallel_paths(&mut *tx, instance.id, false).await?;
            }
            let current = match live.as_slice() {
                [single] => Some(single.node_id),
                _ => None,
            };
            WorkflowInstanceRepo::set_current_node(&mut *tx, instance.id, current).await?;
        }

        tx.commit().await?;

        let instance = WorkflowInstanceRepo::find_by_id(&self.pool, req.instance_id)
            .await?
            .ok_or_else(|| AppError::InternalError("Instance vanished during progress".into()))?;

        let next_nodes = self.describe_nodes(
            &graph,
            new_active_steps
                .iter()
                .filter(|s| s.status == step_status::ACTIVE)
                .map(|s| s.node_id),
        )?;

        Ok(ProgressOutcome {
            instance,
            next_nodes,
            new_active_steps,
        })
    }

    /// Land one fired connection on its target node: record history, then
    /// either finish the branch (end node), park or join (sync node), or
    /// create the next actionable step.
    #[allow(clippy::too_many_arguments)]
    async fn arrive(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        instance: &WorkflowInstance,
        graph: &TemplateGraph,
        req: &ProgressRequest,
        hop: &Hop,
        to_node_id: DbId,
        branch: String,
        queue: &mut VecDeque<Hop>,
        new_active_steps: &mut Vec<WorkflowActiveStep>,
    ) -> AppResult<()> {
        let target = graph.node(to_node_id).ok_or(CoreError::NotFound {
            entity: "workflow node",
            id: to_node_id,
        })?;

        let assignee = self
            .resolve_assignee(tx, instance.id, graph, to_node_id, &req.assignments)
            .await?;

        WorkflowInstanceRepo::append_history(
            &mut **tx,
            &CreateHistoryEntry {
                instance_id: instance.id,
                from_node_id: Some(hop.from_node_id),
                to_node_id,
                handed_off_by: req.actor,
                handed_off_to: assignee,
                decision: hop
                    .first
                    .then(|| hop.decision.map(|d| d.as_str().to_string()))
                    .flatten(),
                form_response_id: None,
                notes: if hop.first { req.notes.clone() } else { None },
                out_of_order: hop.first && req.out_of_order,
            },
        )
        .await?;

        match target.node_type() {
            // An end node completes its branch on arrival.
            NodeType::End => {
                WorkflowInstanceRepo::insert_step(
                    &mut **tx,
                    instance.id,
                    to_node_id,
                    &branch,
                    step_status::COMPLETED,
                    None,
                )
                .await?;
            }

            NodeType::Sync => {
                let Some(parent) = parent_branch(&branch).map(str::to_string) else {
                    // The root lineage was never forked; nothing to wait for.
                    WorkflowInstanceRepo::insert_step(
                        &mut **tx,
                        instance.id,
                        to_node_id,
                        &branch,
                        step_status::COMPLETED,
                        None,
                    )
                    .await?;
                    queue.push_back(Hop {
                        from_node_id: to_node_id,
                        branch,
                        decision: None,
                        first: false,
                    });
                    return Ok(());
                };

                WorkflowInstanceRepo::insert_step(
                    &mut **tx,
                    instance.id,
                    to_node_id,
                    &branch,
                    step_status::WAITING,
                    None,
                )
                .await?;

                let live = WorkflowInstanceRepo::live_steps(&mut **tx, instance.id).await?;

                // The join covers every live lineage descending from this
                // branch's parent, not just direct children: a sibling that
                // forked again is still in flight under grandchild ids until
                // its own inner sync collapses it back to the sibling branch.
                // The join opens once each of those lineages is parked here.
                let descendant_prefix = format!("{parent}.");
                let siblings: Vec<&WorkflowActiveStep> = live
                    .iter()
                    .filter(|s| s.branch_id.starts_with(&descendant_prefix))
                    .collect();
                let all_arrived = siblings
                    .iter()
                    .all(|s| s.node_id == to_node_id && s.status == step_status::WAITING);

                if all_arrived {
                    for waiting in &siblings {
                        WorkflowInstanceRepo::complete_step(&mut **tx, waiting.id).await?;
                    }
                    tracing::debug!(
                        instance_id = instance.id,
                        node_id = to_node_id,
                        merged = siblings.len(),
                        parent_branch = %parent,
                        "Sync node opened",
                    );
                    queue.push_back(Hop {
                        from_node_id: to_node_id,
                        branch: parent,
                        decision: None,
                        first: false,
                    });
                }
            }

            _ => {
                let created = WorkflowInstanceRepo::insert_step(
                    &mut **tx,
                    instance.id,
                    to_node_id,
                    &branch,
                    step_status::ACTIVE,
                    assignee,
                )
                .await?;
                new_active_steps.push(created);
            }
        }

        Ok(())
    }

    /// Resolve who the new step is assigned to.
    ///
    /// An explicit request from the handoff payload is checked through the
    /// eligibility rules and rejected with
    /// [`StateError::IneligibleAssignment`] if the user neither fits the
    /// node's role/department requirement nor holds a pre-assignment.
    /// Without an explicit request, a stored pre-assignment applies; a
    /// structurally restricted node with no one eligible stays unassigned.
    async fn resolve_assignee(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        instance_id: DbId,
        graph: &TemplateGraph,
        node_id: DbId,
        assignments: &AssignmentRequest,
    ) -> AppResult<Option<DbId>> {
        let node = graph.node(node_id).ok_or(CoreError::NotFound {
            entity: "workflow node",
            id: node_id,
        })?;

        if let Some(&user_id) = assignments.get(&node_id) {
            let roles = RoleRepo::user_memberships(&mut **tx, user_id).await?;
            let preassigned =
                WorkflowInstanceRepo::preassigned_node_ids(&mut **tx, instance_id, user_id)
                    .await?;
            let ctx = EligibilityContext {
                roles,
                preassigned_nodes: preassigned.into_iter().collect(),
            };
            if !is_eligible(node, &ctx) {
                return Err(StateError::IneligibleAssignment.into());
            }
            return Ok(Some(user_id));
        }

        Ok(WorkflowInstanceRepo::find_assignment_for_node(&mut **tx, instance_id, node_id).await?)
    }

    // -------------------------------------------------------------------
    // read projections
    // -------------------------------------------------------------------

    /// Steps currently awaiting action (excludes steps parked at syncs).
    pub async fn active_steps(&self, instance_id: DbId) -> AppResult<Vec<WorkflowActiveStep>> {
        Ok(WorkflowInstanceRepo::active_steps(&self.pool, instance_id).await?)
    }

    /// Every live step, including those waiting at a sync node.
    pub async fn active_and_waiting_steps(
        &self,
        instance_id: DbId,
    ) -> AppResult<Vec<WorkflowActiveStep>> {
        Ok(WorkflowInstanceRepo::live_steps(&self.pool, instance_id).await?)
    }

    /// Whether the instance has run to completion.
    pub async fn is_complete(&self, instance_id: DbId) -> AppResult<bool> {
        let instance = WorkflowInstanceRepo::find_by_id(&self.pool, instance_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "workflow instance",
                id: instance_id,
            })?;
        Ok(instance.status == instance_status::COMPLETED)
    }

    /// The structural successors of the current frontier, independent of
    /// eligibility. Intended for UI preview of where work can go next.
    pub async fn next_available_nodes(&self, instance_id: DbId) -> AppResult<Vec<NextNode>> {
        let instance = WorkflowInstanceRepo::find_by_id(&self.pool, instance_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "workflow instance",
                id: instance_id,
            })?;
        let graph = WorkflowTemplateRepo::load_graph(&self.pool, instance.template_id).await?;
        let active = WorkflowInstanceRepo::active_steps(&self.pool, instance_id).await?;

        let mut successor_ids: Vec<DbId> = Vec::new();
        let mut seen = HashSet::new();
        for step in &active {
            for edge in graph.outgoing(step.node_id) {
                if seen.insert(edge.to_node_id) {
                    successor_ids.push(edge.to_node_id);
                }
            }
        }

        self.describe_nodes(&graph, successor_ids.into_iter())
    }

    fn describe_nodes(
        &self,
        graph: &TemplateGraph,
        ids: impl Iterator<Item = DbId>,
    ) -> AppResult<Vec<NextNode>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            let node = graph.node(id).ok_or(CoreError::NotFound {
                entity: "workflow node",
                id,
            })?;
            out.push(NextNode {
                node_id: node.id,
                label: node.label.clone(),
                node_type: node.node_type().as_str().to_string(),
            });
        }
        Ok(out)
    }
}
