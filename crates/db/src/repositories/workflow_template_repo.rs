//! Repository for workflow templates and their owned graph rows.

use std::collections::HashMap;

use sqlx::PgPool;

use praxis_core::types::DbId;
use praxis_core::workflow::graph::{GraphEdge, GraphNode, TemplateGraph};

use crate::models::workflow_template::{
    ConnectionInput, CreateWorkflowTemplate, NodeInput, UpdateWorkflowTemplate,
    WorkflowConnectionRow, WorkflowNodeRow, WorkflowTemplate,
};

/// Column list for template queries.
const TEMPLATE_COLUMNS: &str = "id, name, description, is_active, created_at, updated_at";

/// Column list for node queries.
const NODE_COLUMNS: &str =
    "id, template_id, node_key, node_type, label, required_entity_id, settings, created_at";

/// Column list for connection queries.
const CONNECTION_COLUMNS: &str =
    "id, template_id, from_node_id, to_node_id, condition, created_at";

/// The freshly stored graph returned by a replace.
#[derive(Debug)]
pub struct ReplacedGraph {
    pub nodes: Vec<WorkflowNodeRow>,
    pub connection_count: usize,
}

/// Provides CRUD operations for workflow templates and the destructive
/// graph-replace operation.
pub struct WorkflowTemplateRepo;

impl WorkflowTemplateRepo {
    /// Insert a new template, returning the created row. Templates are
    /// created inactive.
    pub async fn create(
        pool: &PgPool,
        input: &CreateWorkflowTemplate,
    ) -> Result<WorkflowTemplate, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_templates (name, description)
             VALUES ($1, $2)
             RETURNING {TEMPLATE_COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .fetch_one(pool)
            .await
    }

    /// Find a template by its primary key.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<WorkflowTemplate>, sqlx::Error> {
        let query = format!("SELECT {TEMPLATE_COLUMNS} FROM workflow_templates WHERE id = $1");
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List templates with pagination, ordered by name.
    pub async fn list(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates
             ORDER BY name
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Update template metadata, returning the updated row.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateWorkflowTemplate,
    ) -> Result<Option<WorkflowTemplate>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_templates SET
                name = COALESCE($1, name),
                description = COALESCE($2, description),
                updated_at = now()
             WHERE id = $3
             RETURNING {TEMPLATE_COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Flip the active flag. Returns `true` if a row was updated.
    pub async fn set_active(pool: &PgPool, id: DbId, active: bool) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE workflow_templates SET is_active = $1, updated_at = now() WHERE id = $2")
                .bind(active)
                .bind(id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a template (nodes and connections cascade). Returns `true`
    /// if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workflow_templates WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetch the node rows of a template, ordered by id.
    pub async fn nodes(pool: &PgPool, template_id: DbId) -> Result<Vec<WorkflowNodeRow>, sqlx::Error> {
        let query =
            format!("SELECT {NODE_COLUMNS} FROM workflow_nodes WHERE template_id = $1 ORDER BY id");
        sqlx::query_as::<_, WorkflowNodeRow>(&query)
            .bind(template_id)
            .fetch_all(pool)
            .await
    }

    /// Fetch the connection rows of a template, ordered by id.
    pub async fn connections(
        pool: &PgPool,
        template_id: DbId,
    ) -> Result<Vec<WorkflowConnectionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {CONNECTION_COLUMNS} FROM workflow_connections WHERE template_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, WorkflowConnectionRow>(&query)
            .bind(template_id)
            .fetch_all(pool)
            .await
    }

    /// Assemble the in-memory [`TemplateGraph`] for a template.
    pub async fn load_graph(pool: &PgPool, template_id: DbId) -> Result<TemplateGraph, sqlx::Error> {
        let node_rows = Self::nodes(pool, template_id).await?;
        let connection_rows = Self::connections(pool, template_id).await?;

        let nodes = node_rows
            .into_iter()
            .map(|row| {
                let kind = serde_json::from_value(row.settings)
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                Ok(GraphNode {
                    id: row.id,
                    label: row.label,
                    required_entity_id: row.required_entity_id,
                    kind,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let edges = connection_rows
            .into_iter()
            .map(|row| {
                let condition = row
                    .condition
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                Ok(GraphEdge {
                    id: row.id,
                    from_node_id: row.from_node_id,
                    to_node_id: row.to_node_id,
                    condition,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(TemplateGraph::new(nodes, edges))
    }

    /// Destructive full graph replace, in one transaction.
    ///
    /// Structural edits are replace-all, not incremental: existing
    /// instances get their `current_node_id` nulled, and their active
    /// steps, pre-assignments, and history rows (all of which reference
    /// nodes about to be deleted) are purged before the old node set is
    /// dropped and the new one inserted.
    ///
    /// Callers must have verified that every connection references an
    /// existing node key.
    pub async fn replace_graph(
        pool: &PgPool,
        template_id: DbId,
        nodes: &[NodeInput],
        connections: &[ConnectionInput],
    ) -> Result<ReplacedGraph, sqlx::Error> {
        let mut tx = pool.begin().await?;

        // Detach running instances from the node set being replaced.
        sqlx::query("UPDATE workflow_instances SET current_node_id = NULL WHERE template_id = $1")
            .bind(template_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM workflow_history
             WHERE instance_id IN (SELECT id FROM workflow_instances WHERE template_id = $1)",
        )
        .bind(template_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM workflow_active_steps
             WHERE instance_id IN (SELECT id FROM workflow_instances WHERE template_id = $1)",
        )
        .bind(template_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM workflow_node_assignments
             WHERE instance_id IN (SELECT id FROM workflow_instances WHERE template_id = $1)",
        )
        .bind(template_id)
        .execute(&mut *tx)
        .await?;

        // Drop the old graph. Connections cascade with their nodes.
        sqlx::query("DELETE FROM workflow_connections WHERE template_id = $1")
            .bind(template_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM workflow_nodes WHERE template_id = $1")
            .bind(template_id)
            .execute(&mut *tx)
            .await?;

        // Insert the new node set, mapping stable keys to fresh ids.
        let insert_node = format!(
            "INSERT INTO workflow_nodes
                (template_id, node_key, node_type, label, required_entity_id, settings)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {NODE_COLUMNS}"
        );
        let mut inserted_nodes = Vec::with_capacity(nodes.len());
        let mut ids_by_key: HashMap<&str, DbId> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let settings = serde_json::to_value(&node.kind)
                .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
            let row = sqlx::query_as::<_, WorkflowNodeRow>(&insert_node)
                .bind(template_id)
                .bind(&node.key)
                .bind(node.kind.node_type().as_str())
                .bind(&node.label)
                .bind(node.required_entity_id)
                .bind(settings)
                .fetch_one(&mut *tx)
                .await?;
            ids_by_key.insert(node.key.as_str(), row.id);
            inserted_nodes.push(row);
        }

        for connection in connections {
            let from_id = resolve_key(&ids_by_key, &connection.from_key)?;
            let to_id = resolve_key(&ids_by_key, &connection.to_key)?;
            let condition = connection
                .condition
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
            sqlx::query(
                "INSERT INTO workflow_connections (template_id, from_node_id, to_node_id, condition)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(template_id)
            .bind(from_id)
            .bind(to_id)
            .bind(condition)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE workflow_templates SET updated_at = now() WHERE id = $1")
            .bind(template_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            template_id,
            node_count = inserted_nodes.len(),
            connection_count = connections.len(),
            "Replaced template graph",
        );

        Ok(ReplacedGraph {
            nodes: inserted_nodes,
            connection_count: connections.len(),
        })
    }
}

fn resolve_key(ids_by_key: &HashMap<&str, DbId>, key: &str) -> Result<DbId, sqlx::Error> {
    ids_by_key
        .get(key)
        .copied()
        .ok_or_else(|| sqlx::Error::Protocol(format!("Connection references unknown node key '{key}'")))
}
