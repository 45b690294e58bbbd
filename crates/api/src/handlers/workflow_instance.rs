//! Handlers for the `/workflow-instances` resource: starting, handoffs,
//! step projections, history, and node pre-assignments.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use praxis_core::capabilities::{role_has_capability, CAP_SKIP_WORKFLOW_NODES};
use praxis_core::error::CoreError;
use praxis_core::types::DbId;
use praxis_core::workflow::graph::Decision;
use praxis_db::models::workflow_instance::{
    CreateNodeAssignment, WorkflowActiveStep, WorkflowHistoryEntry, WorkflowInstance,
    WorkflowNodeAssignment,
};
use praxis_db::repositories::WorkflowInstanceRepo;
use serde::{Deserialize, Serialize};

use crate::engine::executor::{NextNode, ProgressOutcome, ProgressRequest};
use crate::error::{AppError, AppResult};
use crate::middleware::rbac::{RequireExecuteWorkflows, RequireManageWorkflows};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /workflow-instances`.
#[derive(Debug, Deserialize)]
pub struct StartInstanceRequest {
    pub template_id: DbId,
    pub project_id: DbId,
}

/// Request body for `POST /workflow-instances/{id}/progress`.
///
/// JSON object keys are strings, so the assignment map arrives keyed by
/// stringified node ids and is parsed before it reaches the engine.
#[derive(Debug, Deserialize)]
pub struct ProgressStepRequest {
    /// The step to complete; omitted when the instance has a single
    /// unambiguous current node.
    pub step_id: Option<DbId>,
    pub decision: Option<Decision>,
    pub form_data: Option<serde_json::Value>,
    #[serde(default)]
    pub assignments: HashMap<String, DbId>,
    pub notes: Option<String>,
    #[serde(default)]
    pub out_of_order: bool,
}

/// Response payload for the completion projection.
#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub complete: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/workflow-instances
///
/// Start a workflow for a project from an active template.
pub async fn start_instance(
    RequireExecuteWorkflows(user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Json(input): Json<StartInstanceRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<WorkflowInstance>>)> {
    let instance = state
        .engine
        .start_workflow(input.template_id, input.project_id, user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: instance })))
}

/// GET /api/v1/workflow-instances/{id}
pub async fn get_instance(
    RequireExecuteWorkflows(_user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<WorkflowInstance>>> {
    let instance = find_instance(&state, id).await?;
    Ok(Json(DataResponse { data: instance }))
}

/// POST /api/v1/workflow-instances/{id}/progress
///
/// The handoff event. Out-of-order handoffs additionally require the
/// `workflows.skip_nodes` capability; the engine records the flag but
/// routes identically.
pub async fn progress_step(
    RequireExecuteWorkflows(user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ProgressStepRequest>,
) -> AppResult<Json<DataResponse<ProgressOutcome>>> {
    if input.out_of_order && !role_has_capability(&user.role, CAP_SKIP_WORKFLOW_NODES) {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Capability '{CAP_SKIP_WORKFLOW_NODES}' required for out-of-order handoff"
        ))));
    }

    let mut assignments = HashMap::with_capacity(input.assignments.len());
    for (key, user_id) in &input.assignments {
        let node_id: DbId = key
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid node id '{key}' in assignments")))?;
        assignments.insert(node_id, *user_id);
    }

    let outcome = state
        .engine
        .progress_step(ProgressRequest {
            instance_id: id,
            step_id: input.step_id,
            actor: user.user_id,
            decision: input.decision,
            form_data: input.form_data,
            assignments,
            notes: input.notes,
            out_of_order: input.out_of_order,
        })
        .await?;

    Ok(Json(DataResponse { data: outcome }))
}

/// GET /api/v1/workflow-instances/{id}/steps
///
/// Steps currently awaiting action.
pub async fn list_active_steps(
    RequireExecuteWorkflows(_user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<WorkflowActiveStep>>>> {
    find_instance(&state, id).await?;
    let steps = state.engine.active_steps(id).await?;
    Ok(Json(DataResponse { data: steps }))
}

/// GET /api/v1/workflow-instances/{id}/all-steps
///
/// Every live step, including those waiting at sync nodes.
pub async fn list_all_steps(
    RequireExecuteWorkflows(_user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<WorkflowActiveStep>>>> {
    find_instance(&state, id).await?;
    let steps = state.engine.active_and_waiting_steps(id).await?;
    Ok(Json(DataResponse { data: steps }))
}

/// GET /api/v1/workflow-instances/{id}/complete
pub async fn get_completion(
    RequireExecuteWorkflows(_user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<CompletionResponse>>> {
    let complete = state.engine.is_complete(id).await?;
    Ok(Json(DataResponse {
        data: CompletionResponse { complete },
    }))
}

/// GET /api/v1/workflow-instances/{id}/next-nodes
///
/// Structural successors of the current frontier, for UI preview.
pub async fn list_next_nodes(
    RequireExecuteWorkflows(_user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<NextNode>>>> {
    let nodes = state.engine.next_available_nodes(id).await?;
    Ok(Json(DataResponse { data: nodes }))
}

/// GET /api/v1/workflow-instances/{id}/history
pub async fn list_history(
    RequireExecuteWorkflows(_user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<WorkflowHistoryEntry>>>> {
    find_instance(&state, id).await?;
    let history = WorkflowInstanceRepo::history(&state.pool, id).await?;
    Ok(Json(DataResponse { data: history }))
}

/// POST /api/v1/workflow-instances/{id}/assignments
///
/// Pre-assign a user to a future node. Pre-assignment overrides the
/// node's structural eligibility requirement, so no eligibility check
/// happens here.
pub async fn create_assignment(
    RequireManageWorkflows(user): RequireManageWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CreateNodeAssignment>,
) -> AppResult<(StatusCode, Json<DataResponse<WorkflowNodeAssignment>>)> {
    find_instance(&state, id).await?;
    let assignment = WorkflowInstanceRepo::create_assignment(
        &state.pool,
        id,
        input.node_id,
        input.user_id,
        user.user_id,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse { data: assignment }),
    ))
}

/// GET /api/v1/workflow-instances/{id}/assignments
pub async fn list_assignments(
    RequireExecuteWorkflows(_user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<WorkflowNodeAssignment>>>> {
    find_instance(&state, id).await?;
    let assignments = WorkflowInstanceRepo::assignments(&state.pool, id).await?;
    Ok(Json(DataResponse { data: assignments }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_instance(state: &AppState, id: DbId) -> AppResult<WorkflowInstance> {
    WorkflowInstanceRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| {
            CoreError::NotFound {
                entity: "workflow instance",
                id,
            }
            .into()
        })
}
