//! Handlers for the `/workflow-templates` resource: CRUD, validation,
//! activation, and the destructive graph replace.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use praxis_core::error::CoreError;
use praxis_core::types::DbId;
use praxis_core::workflow::graph::{GraphEdge, GraphNode, TemplateGraph};
use praxis_core::workflow::validator::{validate, ValidationReport};
use praxis_db::models::workflow_template::{
    ConnectionInput, CreateWorkflowTemplate, NodeInput, UpdateWorkflowTemplate,
    WorkflowConnectionRow, WorkflowNodeRow, WorkflowTemplate,
};
use praxis_db::repositories::WorkflowTemplateRepo;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::{RequireExecuteWorkflows, RequireManageWorkflows};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /workflow-templates`: metadata plus an optional
/// initial graph.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 2000, message = "description is limited to 2000 characters"))]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeInput>,
    #[serde(default)]
    pub connections: Vec<ConnectionInput>,
}

/// Request body for `PUT /workflow-templates/{id}/graph`.
#[derive(Debug, Deserialize)]
pub struct ReplaceGraphRequest {
    pub nodes: Vec<NodeInput>,
    pub connections: Vec<ConnectionInput>,
}

/// Pagination query parameters for template listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// A template with its stored graph rows.
#[derive(Debug, Serialize)]
pub struct TemplateDetail {
    #[serde(flatten)]
    pub template: WorkflowTemplate,
    pub nodes: Vec<WorkflowNodeRow>,
    pub connections: Vec<WorkflowConnectionRow>,
}

/// Response payload for a graph replace.
#[derive(Debug, Serialize)]
pub struct ReplacedGraphResponse {
    pub nodes: Vec<WorkflowNodeRow>,
    pub connection_count: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/workflow-templates
///
/// Create a template, optionally storing an initial graph in the same
/// request. Templates are created inactive; activation is gated on
/// validation.
pub async fn create_template(
    RequireManageWorkflows(_user): RequireManageWorkflows,
    State(state): State<AppState>,
    Json(input): Json<CreateTemplateRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<TemplateDetail>>)> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    check_graph_inputs(&input.nodes, &input.connections)?;

    let template = WorkflowTemplateRepo::create(
        &state.pool,
        &CreateWorkflowTemplate {
            name: input.name,
            description: input.description,
        },
    )
    .await?;

    if !input.nodes.is_empty() {
        WorkflowTemplateRepo::replace_graph(
            &state.pool,
            template.id,
            &input.nodes,
            &input.connections,
        )
        .await?;
    }

    let detail = template_detail(&state, template).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: detail })))
}

/// GET /api/v1/workflow-templates
pub async fn list_templates(
    RequireExecuteWorkflows(_user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<DataResponse<Vec<WorkflowTemplate>>>> {
    let templates =
        WorkflowTemplateRepo::list(&state.pool, query.limit.clamp(1, 200), query.offset.max(0))
            .await?;
    Ok(Json(DataResponse { data: templates }))
}

/// GET /api/v1/workflow-templates/{id}
///
/// Returns the template with its full stored graph.
pub async fn get_template(
    RequireExecuteWorkflows(_user): RequireExecuteWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<TemplateDetail>>> {
    let template = find_template(&state, id).await?;
    let detail = template_detail(&state, template).await?;
    Ok(Json(DataResponse { data: detail }))
}

/// PUT /api/v1/workflow-templates/{id}
///
/// Update template metadata only; the graph has its own endpoint.
pub async fn update_template(
    RequireManageWorkflows(_user): RequireManageWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateWorkflowTemplate>,
) -> AppResult<Json<DataResponse<WorkflowTemplate>>> {
    let template = WorkflowTemplateRepo::update(&state.pool, id, &input)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "workflow template",
            id,
        })?;
    Ok(Json(DataResponse { data: template }))
}

/// DELETE /api/v1/workflow-templates/{id}
pub async fn delete_template(
    RequireManageWorkflows(_user): RequireManageWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let deleted = WorkflowTemplateRepo::delete(&state.pool, id).await?;
    if !deleted {
        return Err(CoreError::NotFound {
            entity: "workflow template",
            id,
        }
        .into());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/workflow-templates/{id}/validate
///
/// Run the structural validator over the stored graph and return the full
/// report. Validation never mutates the template.
pub async fn validate_template(
    RequireManageWorkflows(_user): RequireManageWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ValidationReport>>> {
    find_template(&state, id).await?;
    let graph = WorkflowTemplateRepo::load_graph(&state.pool, id).await?;
    let report = validate(&graph);
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/workflow-templates/{id}/activate
///
/// Validate, then activate. A graph with validation errors cannot be
/// activated; the 422 response carries the full report so the editor can
/// surface every defect at once. Warnings do not block activation.
pub async fn activate_template(
    RequireManageWorkflows(_user): RequireManageWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Response> {
    find_template(&state, id).await?;
    let graph = WorkflowTemplateRepo::load_graph(&state.pool, id).await?;
    let report = validate(&graph);

    if !report.valid {
        let body = json!({
            "error": "Template has validation errors and cannot be activated",
            "code": "VALIDATION_ERROR",
            "report": report,
        });
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response());
    }

    WorkflowTemplateRepo::set_active(&state.pool, id, true).await?;
    tracing::info!(template_id = id, "Template activated");

    let template = find_template(&state, id).await?;
    let body = json!({ "data": { "template": template, "report": report } });
    Ok(Json(body).into_response())
}

/// PUT /api/v1/workflow-templates/{id}/graph
///
/// Destructively replace the stored graph. Running instances of the
/// template lose their step state; structural edits are replace-all.
pub async fn replace_graph(
    RequireManageWorkflows(_user): RequireManageWorkflows,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ReplaceGraphRequest>,
) -> AppResult<Json<DataResponse<ReplacedGraphResponse>>> {
    find_template(&state, id).await?;
    check_graph_inputs(&input.nodes, &input.connections)?;

    let replaced =
        WorkflowTemplateRepo::replace_graph(&state.pool, id, &input.nodes, &input.connections)
            .await?;

    Ok(Json(DataResponse {
        data: ReplacedGraphResponse {
            nodes: replaced.nodes,
            connection_count: replaced.connection_count,
        },
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_template(state: &AppState, id: DbId) -> AppResult<WorkflowTemplate> {
    WorkflowTemplateRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| {
            CoreError::NotFound {
                entity: "workflow template",
                id,
            }
            .into()
        })
}

async fn template_detail(state: &AppState, template: WorkflowTemplate) -> AppResult<TemplateDetail> {
    let nodes = WorkflowTemplateRepo::nodes(&state.pool, template.id).await?;
    let connections = WorkflowTemplateRepo::connections(&state.pool, template.id).await?;
    Ok(TemplateDetail {
        template,
        nodes,
        connections,
    })
}

/// Reject graph payloads before they reach the transactional replace:
/// node keys must be unique and every connection must reference existing
/// keys.
fn check_graph_inputs(nodes: &[NodeInput], connections: &[ConnectionInput]) -> AppResult<()> {
    let mut keys = HashMap::new();
    for node in nodes {
        if keys.insert(node.key.as_str(), ()).is_some() {
            return Err(AppError::BadRequest(format!(
                "Duplicate node key '{}'",
                node.key
            )));
        }
    }
    for connection in connections {
        for key in [&connection.from_key, &connection.to_key] {
            if !keys.contains_key(key.as_str()) {
                return Err(AppError::BadRequest(format!(
                    "Connection references unknown node key '{key}'"
                )));
            }
        }
    }
    Ok(())
}

/// Build an in-memory graph from input DTOs with synthetic ids, used to
/// validate editor payloads before they are stored.
pub fn graph_from_inputs(nodes: &[NodeInput], connections: &[ConnectionInput]) -> TemplateGraph {
    let ids_by_key: HashMap<&str, DbId> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.key.as_str(), (i + 1) as DbId))
        .collect();

    let graph_nodes = nodes
        .iter()
        .map(|n| GraphNode {
            id: ids_by_key[n.key.as_str()],
            label: n.label.clone(),
            required_entity_id: n.required_entity_id,
            kind: n.kind.clone(),
        })
        .collect();

    let graph_edges = connections
        .iter()
        .enumerate()
        .map(|(i, c)| GraphEdge {
            id: (i + 1) as DbId,
            from_node_id: ids_by_key[c.from_key.as_str()],
            to_node_id: ids_by_key[c.to_key.as_str()],
            condition: c.condition.clone(),
        })
        .collect();

    TemplateGraph::new(graph_nodes, graph_edges)
}
