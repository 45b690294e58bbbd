//! Integration tests for the workflow executor, driven directly against
//! the engine with a per-test database.

mod common;

use std::collections::HashMap;

use assert_matches::assert_matches;
use common::{
    connect, connect_decision, connect_route, grant_role, node, role_node, seed_project,
    seed_role, seed_template, seed_user,
};
use praxis_api::engine::executor::{ProgressRequest, WorkflowEngine};
use praxis_api::error::AppError;
use praxis_core::error::{CoreError, StateError};
use praxis_core::types::DbId;
use praxis_core::workflow::condition::{ConditionClause, ConditionOperator};
use praxis_core::workflow::graph::{Decision, NodeKind};
use praxis_db::models::workflow_instance::step_status;
use praxis_db::repositories::WorkflowInstanceRepo;
use serde_json::json;
use sqlx::PgPool;

fn progress(instance_id: DbId, step_id: Option<DbId>, actor: DbId) -> ProgressRequest {
    ProgressRequest {
        instance_id,
        step_id,
        actor,
        decision: None,
        form_data: None,
        assignments: HashMap::new(),
        notes: None,
        out_of_order: false,
    }
}

// ---------------------------------------------------------------------------
// Linear walk
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_linear_walk_completes_only_at_end(pool: PgPool) {
    let user = seed_user(&pool, "alice", "manager", "pw-alice-123").await;
    let project = seed_project(&pool, "Linear", user).await;
    let (template, ids) = seed_template(
        &pool,
        "linear",
        &[
            node("start", NodeKind::Start),
            node("review", NodeKind::Role),
            node("end", NodeKind::End),
        ],
        &[connect("start", "review"), connect("review", "end")],
    )
    .await;

    let engine = WorkflowEngine::new(pool.clone());
    let instance = engine.start_workflow(template, project, user).await.unwrap();
    assert_eq!(instance.current_node_id, Some(ids["start"]));
    assert!(!engine.is_complete(instance.id).await.unwrap());

    // start -> review
    let outcome = engine.progress_step(progress(instance.id, None, user)).await.unwrap();
    assert_eq!(outcome.new_active_steps.len(), 1);
    assert_eq!(outcome.new_active_steps[0].node_id, ids["review"]);
    assert_eq!(outcome.new_active_steps[0].branch_id, "main");
    assert!(!engine.is_complete(instance.id).await.unwrap());

    // review -> end
    let outcome = engine.progress_step(progress(instance.id, None, user)).await.unwrap();
    assert!(outcome.new_active_steps.is_empty());
    assert!(engine.is_complete(instance.id).await.unwrap());
    assert!(engine.active_steps(instance.id).await.unwrap().is_empty());

    // History: start entry plus one row per traversed connection.
    let history = WorkflowInstanceRepo::history(&pool, instance.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].from_node_id, None);
    assert_eq!(history[0].to_node_id, ids["start"]);
}

// ---------------------------------------------------------------------------
// Fork / join
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_fork_waits_then_joins(pool: PgPool) {
    let user = seed_user(&pool, "bob", "manager", "pw-bob-1234").await;
    let project = seed_project(&pool, "Parallel", user).await;
    let (template, ids) = seed_template(
        &pool,
        "parallel",
        &[
            node("start", NodeKind::Start),
            node("a", NodeKind::Role),
            node("b", NodeKind::Role),
            node("sync", NodeKind::Sync),
            node("end", NodeKind::End),
        ],
        &[
            connect("start", "a"),
            connect("start", "b"),
            connect("a", "sync"),
            connect("b", "sync"),
            connect("sync", "end"),
        ],
    )
    .await;

    let engine = WorkflowEngine::new(pool.clone());
    let instance = engine.start_workflow(template, project, user).await.unwrap();

    // start forks into two derived branches.
    let outcome = engine.progress_step(progress(instance.id, None, user)).await.unwrap();
    assert_eq!(outcome.new_active_steps.len(), 2);
    let mut branches: Vec<&str> = outcome
        .new_active_steps
        .iter()
        .map(|s| s.branch_id.as_str())
        .collect();
    branches.sort();
    assert_eq!(branches, ["main.1", "main.2"]);

    let instance_row = WorkflowInstanceRepo::find_by_id(&pool, instance.id)
        .await
        .unwrap()
        .unwrap();
    assert!(instance_row.has_parallel_paths);
    assert_eq!(instance_row.current_node_id, None);

    // Complete branch a: it parks at the sync, nothing actionable appears.
    let step_a = outcome
        .new_active_steps
        .iter()
        .find(|s| s.node_id == ids["a"])
        .unwrap();
    let outcome_a = engine
        .progress_step(progress(instance.id, Some(step_a.id), user))
        .await
        .unwrap();
    assert!(outcome_a.new_active_steps.is_empty());

    let live = engine.active_and_waiting_steps(instance.id).await.unwrap();
    assert!(live
        .iter()
        .any(|s| s.node_id == ids["sync"] && s.status == step_status::WAITING));
    let active = engine.active_steps(instance.id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].node_id, ids["b"]);
    assert!(!engine.is_complete(instance.id).await.unwrap());

    // Complete branch b: the join opens and falls straight through to end.
    let step_b = active[0].id;
    engine
        .progress_step(progress(instance.id, Some(step_b), user))
        .await
        .unwrap();
    assert!(engine.is_complete(instance.id).await.unwrap());

    let instance_row = WorkflowInstanceRepo::find_by_id(&pool, instance.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!instance_row.has_parallel_paths);
    assert!(instance_row.completed_at.is_some());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_outer_join_waits_for_nested_fork(pool: PgPool) {
    let user = seed_user(&pool, "nora", "manager", "pw-nora-123").await;
    let project = seed_project(&pool, "Nested", user).await;
    let (template, ids) = seed_template(
        &pool,
        "nested",
        &[
            node("start", NodeKind::Start),
            node("fan", NodeKind::Role),
            node("inner", NodeKind::Role),
            node("b1", NodeKind::Role),
            node("b2", NodeKind::Role),
            node("plain", NodeKind::Role),
            node("inner_sync", NodeKind::Sync),
            node("outer_sync", NodeKind::Sync),
            node("end", NodeKind::End),
        ],
        &[
            connect("start", "fan"),
            connect("fan", "inner"),
            connect("fan", "plain"),
            connect("inner", "b1"),
            connect("inner", "b2"),
            connect("b1", "inner_sync"),
            connect("b2", "inner_sync"),
            connect("inner_sync", "outer_sync"),
            connect("plain", "outer_sync"),
            connect("outer_sync", "end"),
        ],
    )
    .await;

    let engine = WorkflowEngine::new(pool.clone());
    let instance = engine.start_workflow(template, project, user).await.unwrap();
    engine.progress_step(progress(instance.id, None, user)).await.unwrap();

    // fan forks; the inner branch forks again below it.
    let outcome = engine.progress_step(progress(instance.id, None, user)).await.unwrap();
    let step_inner = outcome
        .new_active_steps
        .iter()
        .find(|s| s.node_id == ids["inner"])
        .unwrap();
    let step_plain = outcome
        .new_active_steps
        .iter()
        .find(|s| s.node_id == ids["plain"])
        .unwrap();
    engine
        .progress_step(progress(instance.id, Some(step_inner.id), user))
        .await
        .unwrap();

    // The plain branch reaches the outer sync while b1/b2 are still in
    // flight under grandchild lineages. The outer join must stay shut.
    engine
        .progress_step(progress(instance.id, Some(step_plain.id), user))
        .await
        .unwrap();
    assert!(!engine.is_complete(instance.id).await.unwrap());
    let steps = WorkflowInstanceRepo::steps(&pool, instance.id).await.unwrap();
    assert!(!steps.iter().any(|s| s.node_id == ids["end"]));
    let mut active: Vec<DbId> = engine
        .active_steps(instance.id)
        .await
        .unwrap()
        .iter()
        .map(|s| s.node_id)
        .collect();
    active.sort();
    let mut grandchildren = [ids["b1"], ids["b2"]];
    grandchildren.sort();
    assert_eq!(active, grandchildren);

    // Draining the nested fork collapses it through both syncs exactly
    // once and on to the end.
    for node_id in [ids["b1"], ids["b2"]] {
        let step = engine
            .active_steps(instance.id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.node_id == node_id)
            .unwrap();
        engine
            .progress_step(progress(instance.id, Some(step.id), user))
            .await
            .unwrap();
    }
    assert!(engine.is_complete(instance.id).await.unwrap());
    let steps = WorkflowInstanceRepo::steps(&pool, instance.id).await.unwrap();
    assert_eq!(
        steps.iter().filter(|s| s.node_id == ids["end"]).count(),
        1
    );
    assert_eq!(
        steps.iter().filter(|s| s.node_id == ids["outer_sync"]).count(),
        2
    );
}

// ---------------------------------------------------------------------------
// Stale step references
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_double_progress_rejected_and_state_unchanged(pool: PgPool) {
    let user = seed_user(&pool, "carol", "manager", "pw-carol-12").await;
    let project = seed_project(&pool, "Stale", user).await;
    let (template, ids) = seed_template(
        &pool,
        "stale",
        &[
            node("start", NodeKind::Start),
            node("review", NodeKind::Role),
            node("end", NodeKind::End),
        ],
        &[connect("start", "review"), connect("review", "end")],
    )
    .await;

    let engine = WorkflowEngine::new(pool.clone());
    let instance = engine.start_workflow(template, project, user).await.unwrap();

    let steps = engine.active_steps(instance.id).await.unwrap();
    let start_step = steps[0].id;
    engine
        .progress_step(progress(instance.id, Some(start_step), user))
        .await
        .unwrap();

    // Completing the same step again must fail, twice, without moving
    // the frontier.
    for _ in 0..2 {
        let err = engine
            .progress_step(progress(instance.id, Some(start_step), user))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            AppError::Core(CoreError::State(StateError::StepNotFound))
        );
    }

    let active = engine.active_steps(instance.id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].node_id, ids["review"]);
}

// ---------------------------------------------------------------------------
// Approval routing and the send-back loop
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_approval_reject_loops_back_then_approve_completes(pool: PgPool) {
    let user = seed_user(&pool, "dave", "manager", "pw-dave-123").await;
    let project = seed_project(&pool, "Approvals", user).await;
    let (template, ids) = seed_template(
        &pool,
        "approvals",
        &[
            node("start", NodeKind::Start),
            node("draft", NodeKind::Role),
            node(
                "approve",
                NodeKind::Approval {
                    required_approvals: 1,
                    allow_feedback: false,
                    allow_send_back: true,
                },
            ),
            node("end", NodeKind::End),
        ],
        &[
            connect("start", "draft"),
            connect("draft", "approve"),
            connect_decision("approve", "end", "approved"),
            connect_decision("approve", "draft", "rejected"),
        ],
    )
    .await;

    let engine = WorkflowEngine::new(pool.clone());
    let instance = engine.start_workflow(template, project, user).await.unwrap();
    engine.progress_step(progress(instance.id, None, user)).await.unwrap(); // -> draft
    engine.progress_step(progress(instance.id, None, user)).await.unwrap(); // -> approve

    // A decision is mandatory at an approval node.
    let err = engine
        .progress_step(progress(instance.id, None, user))
        .await
        .unwrap_err();
    assert_matches!(err, AppError::Core(CoreError::Validation(_)));

    // Reject: the send-back edge returns the work to draft.
    let mut reject = progress(instance.id, None, user);
    reject.decision = Some(Decision::Rejected);
    let outcome = engine.progress_step(reject).await.unwrap();
    assert_eq!(outcome.new_active_steps[0].node_id, ids["draft"]);

    // Second pass: draft -> approve -> approved -> end.
    engine.progress_step(progress(instance.id, None, user)).await.unwrap();
    let mut approve = progress(instance.id, None, user);
    approve.decision = Some(Decision::Approved);
    engine.progress_step(approve).await.unwrap();
    assert!(engine.is_complete(instance.id).await.unwrap());

    let history = WorkflowInstanceRepo::history(&pool, instance.id).await.unwrap();
    let decisions: Vec<Option<&str>> = history.iter().map(|h| h.decision.as_deref()).collect();
    assert!(decisions.contains(&Some("rejected")));
    assert!(decisions.contains(&Some("approved")));
}

// ---------------------------------------------------------------------------
// Conditional routing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_conditional_routes_by_clause_then_default(pool: PgPool) {
    let user = seed_user(&pool, "erin", "manager", "pw-erin-123").await;
    let (template, ids) = seed_template(
        &pool,
        "conditional",
        &[
            node("start", NodeKind::Start),
            node(
                "form",
                NodeKind::Form {
                    schema: json!({"fields": [{"name": "amount", "type": "number"}]}),
                    draft: false,
                    allow_attachments: false,
                },
            ),
            node(
                "gate",
                NodeKind::Conditional {
                    source_node_id: None,
                    clauses: vec![ConditionClause {
                        field: "amount".to_string(),
                        operator: ConditionOperator::GreaterThan,
                        value: json!(1000),
                        route: "high".to_string(),
                    }],
                },
            ),
            node("high", NodeKind::Role),
            node("low", NodeKind::Role),
            node("end", NodeKind::End),
        ],
        &[
            connect("start", "form"),
            connect("form", "gate"),
            connect_route("gate", "high", "high"),
            connect("gate", "low"),
            connect("high", "end"),
            connect("low", "end"),
        ],
    )
    .await;

    let engine = WorkflowEngine::new(pool.clone());

    // High-value submission routes through the tagged connection.
    let project_a = seed_project(&pool, "Cond A", user).await;
    let instance = engine.start_workflow(template, project_a, user).await.unwrap();
    engine.progress_step(progress(instance.id, None, user)).await.unwrap(); // -> form
    engine.progress_step(progress(instance.id, None, user)).await.unwrap(); // -> gate
    let mut high = progress(instance.id, None, user);
    high.form_data = Some(json!({"amount": 5000}));
    let outcome = engine.progress_step(high).await.unwrap();
    assert_eq!(outcome.new_active_steps[0].node_id, ids["high"]);

    // Low-value submission falls through to the default connection.
    let project_b = seed_project(&pool, "Cond B", user).await;
    let instance = engine.start_workflow(template, project_b, user).await.unwrap();
    engine.progress_step(progress(instance.id, None, user)).await.unwrap();
    engine.progress_step(progress(instance.id, None, user)).await.unwrap();
    let mut low = progress(instance.id, None, user);
    low.form_data = Some(json!({"amount": 10}));
    let outcome = engine.progress_step(low).await.unwrap();
    assert_eq!(outcome.new_active_steps[0].node_id, ids["low"]);
}

// ---------------------------------------------------------------------------
// Start preconditions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_one_live_instance_per_project(pool: PgPool) {
    let user = seed_user(&pool, "frank", "manager", "pw-frank-12").await;
    let project = seed_project(&pool, "Busy", user).await;
    let (template, _) = seed_template(
        &pool,
        "busy",
        &[node("start", NodeKind::Start), node("end", NodeKind::End)],
        &[connect("start", "end")],
    )
    .await;

    let engine = WorkflowEngine::new(pool.clone());
    let instance = engine.start_workflow(template, project, user).await.unwrap();

    let err = engine.start_workflow(template, project, user).await.unwrap_err();
    assert_matches!(
        err,
        AppError::Core(CoreError::State(StateError::AlreadyRunning))
    );

    // Completing the instance frees the project for a new run.
    engine.progress_step(progress(instance.id, None, user)).await.unwrap();
    assert!(engine.is_complete(instance.id).await.unwrap());
    engine.start_workflow(template, project, user).await.unwrap();
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_inactive_template_cannot_start(pool: PgPool) {
    let user = seed_user(&pool, "grace", "manager", "pw-grace-12").await;
    let project = seed_project(&pool, "Inactive", user).await;

    let template = praxis_db::repositories::WorkflowTemplateRepo::create(
        &pool,
        &praxis_db::models::workflow_template::CreateWorkflowTemplate {
            name: "never-activated".to_string(),
            description: None,
        },
    )
    .await
    .unwrap();

    let engine = WorkflowEngine::new(pool.clone());
    let err = engine
        .start_workflow(template.id, project, user)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        AppError::Core(CoreError::State(StateError::TemplateNotActive))
    );
}

// ---------------------------------------------------------------------------
// Eligibility and pre-assignment
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_assignment_eligibility_and_preassignment_override(pool: PgPool) {
    let manager = seed_user(&pool, "heidi", "manager", "pw-heidi-12").await;
    let outsider = seed_user(&pool, "ivan", "member", "pw-ivan-123").await;
    let reviewer_role = seed_role(&pool, "reviewer", None).await;
    let project = seed_project(&pool, "Eligibility", manager).await;

    let (template, ids) = seed_template(
        &pool,
        "eligibility",
        &[
            node("start", NodeKind::Start),
            role_node("review", Some(reviewer_role)),
            node("end", NodeKind::End),
        ],
        &[connect("start", "review"), connect("review", "end")],
    )
    .await;

    let engine = WorkflowEngine::new(pool.clone());
    let instance = engine.start_workflow(template, project, manager).await.unwrap();

    // Explicitly assigning a user who lacks the role is rejected.
    let mut req = progress(instance.id, None, manager);
    req.assignments = HashMap::from([(ids["review"], outsider)]);
    let err = engine.progress_step(req).await.unwrap_err();
    assert_matches!(
        err,
        AppError::Core(CoreError::State(StateError::IneligibleAssignment))
    );

    // A pre-assignment overrides the structural requirement.
    WorkflowInstanceRepo::create_assignment(&pool, instance.id, ids["review"], outsider, manager)
        .await
        .unwrap();
    let mut req = progress(instance.id, None, manager);
    req.assignments = HashMap::from([(ids["review"], outsider)]);
    let outcome = engine.progress_step(req).await.unwrap();
    assert_eq!(outcome.new_active_steps[0].assigned_user_id, Some(outsider));

    // A member who actually holds the role is eligible without any
    // pre-assignment.
    grant_role(&pool, outsider, reviewer_role).await;
    let outcome = engine.progress_step(progress(instance.id, None, manager)).await.unwrap();
    assert!(outcome.new_active_steps.is_empty(), "review -> end");
    assert!(engine.is_complete(instance.id).await.unwrap());
}
