//! Repository for workflow instances, their live steps, history, and
//! node pre-assignments.
//!
//! Step and history writes are executor-generic so the execution engine
//! can run them inside its per-instance transaction.

use sqlx::{PgConnection, PgPool};

use praxis_core::types::DbId;

use crate::models::workflow_instance::{
    step_status, CreateHistoryEntry, WorkflowActiveStep, WorkflowHistoryEntry, WorkflowInstance,
    WorkflowNodeAssignment,
};

const INSTANCE_COLUMNS: &str = "id, template_id, project_id, status, current_node_id, \
     has_parallel_paths, created_at, updated_at, completed_at";

const STEP_COLUMNS: &str = "id, instance_id, node_id, branch_id, status, assigned_user_id, \
     activated_at, completed_at";

const HISTORY_COLUMNS: &str = "id, instance_id, from_node_id, to_node_id, handed_off_by, \
     handed_off_to, decision, form_response_id, notes, out_of_order, created_at";

const ASSIGNMENT_COLUMNS: &str = "id, instance_id, node_id, user_id, assigned_by, assigned_at";

/// Provides persistence for running workflow instances.
pub struct WorkflowInstanceRepo;

impl WorkflowInstanceRepo {
    /// Insert a new active instance.
    pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        template_id: DbId,
        project_id: DbId,
    ) -> Result<WorkflowInstance, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_instances (template_id, project_id)
             VALUES ($1, $2)
             RETURNING {INSTANCE_COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(template_id)
            .bind(project_id)
            .fetch_one(exec)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<WorkflowInstance>, sqlx::Error> {
        let query = format!("SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE id = $1");
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the active instance for a project, if any. The partial unique
    /// index guarantees at most one.
    pub async fn find_active_by_project<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        project_id: DbId,
    ) -> Result<Option<WorkflowInstance>, sqlx::Error> {
        let query = format!(
            "SELECT {INSTANCE_COLUMNS} FROM workflow_instances
             WHERE project_id = $1 AND status = 'active'"
        );
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(project_id)
            .fetch_optional(exec)
            .await
    }

    /// Lock an instance row for the duration of the caller's transaction.
    /// Concurrent progressions of the same instance queue up here.
    pub async fn lock(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<WorkflowInstance>, sqlx::Error> {
        let query =
            format!("SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    pub async fn set_status<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        id: DbId,
        status: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_instances SET status = $1, updated_at = now(),
                completed_at = CASE WHEN $1 = 'active' THEN NULL ELSE now() END
             WHERE id = $2",
        )
        .bind(status)
        .bind(id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_current_node<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        id: DbId,
        node_id: Option<DbId>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_instances SET current_node_id = $1, updated_at = now() WHERE id = $2",
        )
            .bind(node_id)
            .bind(id)
            .execute(exec)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_parallel_paths<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        id: DbId,
        parallel: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_instances SET has_parallel_paths = $1, updated_at = now() WHERE id = $2",
        )
        .bind(parallel)
        .bind(id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---------- steps ----------

    /// Insert a step row. Steps inserted as completed get a completion
    /// timestamp immediately (end nodes are recorded this way).
    pub async fn insert_step<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        instance_id: DbId,
        node_id: DbId,
        branch_id: &str,
        status: &str,
        assigned_user_id: Option<DbId>,
    ) -> Result<WorkflowActiveStep, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_active_steps
                (instance_id, node_id, branch_id, status, assigned_user_id, completed_at)
             VALUES ($1, $2, $3, $4, $5, CASE WHEN $4 = 'completed' THEN now() ELSE NULL END)
             RETURNING {STEP_COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowActiveStep>(&query)
            .bind(instance_id)
            .bind(node_id)
            .bind(branch_id)
            .bind(status)
            .bind(assigned_user_id)
            .fetch_one(exec)
            .await
    }

    pub async fn find_step<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        step_id: DbId,
    ) -> Result<Option<WorkflowActiveStep>, sqlx::Error> {
        let query = format!("SELECT {STEP_COLUMNS} FROM workflow_active_steps WHERE id = $1");
        sqlx::query_as::<_, WorkflowActiveStep>(&query)
            .bind(step_id)
            .fetch_optional(exec)
            .await
    }

    /// Find a live (non-completed) step parked at a node, oldest first.
    pub async fn find_live_step_for_node<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        instance_id: DbId,
        node_id: DbId,
    ) -> Result<Option<WorkflowActiveStep>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM workflow_active_steps
             WHERE instance_id = $1 AND node_id = $2 AND status <> 'completed'
             ORDER BY id
             LIMIT 1"
        );
        sqlx::query_as::<_, WorkflowActiveStep>(&query)
            .bind(instance_id)
            .bind(node_id)
            .fetch_optional(exec)
            .await
    }

    /// All step rows for an instance, completed ones included.
    pub async fn steps<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        instance_id: DbId,
    ) -> Result<Vec<WorkflowActiveStep>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM workflow_active_steps WHERE instance_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, WorkflowActiveStep>(&query)
            .bind(instance_id)
            .fetch_all(exec)
            .await
    }

    /// Active and waiting steps, the ones that keep an instance alive.
    pub async fn live_steps<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        instance_id: DbId,
    ) -> Result<Vec<WorkflowActiveStep>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM workflow_active_steps
             WHERE instance_id = $1 AND status <> 'completed'
             ORDER BY id"
        );
        sqlx::query_as::<_, WorkflowActiveStep>(&query)
            .bind(instance_id)
            .fetch_all(exec)
            .await
    }

    /// Steps currently awaiting action, excluding those parked at syncs.
    pub async fn active_steps<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        instance_id: DbId,
    ) -> Result<Vec<WorkflowActiveStep>, sqlx::Error> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM workflow_active_steps
             WHERE instance_id = $1 AND status = 'active'
             ORDER BY id"
        );
        sqlx::query_as::<_, WorkflowActiveStep>(&query)
            .bind(instance_id)
            .fetch_all(exec)
            .await
    }

    /// Mark a live step completed. Returns `false` if the step was
    /// already completed, which callers treat as a stale request.
    pub async fn complete_step<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        step_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflow_active_steps
             SET status = $1, completed_at = now()
             WHERE id = $2 AND status <> $1",
        )
        .bind(step_status::COMPLETED)
        .bind(step_id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---------- history ----------

    /// Append one history row. History is append-only, one row per
    /// traversed edge.
    pub async fn append_history<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        entry: &CreateHistoryEntry,
    ) -> Result<WorkflowHistoryEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_history
                (instance_id, from_node_id, to_node_id, handed_off_by, handed_off_to,
                 decision, form_response_id, notes, out_of_order)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {HISTORY_COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowHistoryEntry>(&query)
            .bind(entry.instance_id)
            .bind(entry.from_node_id)
            .bind(entry.to_node_id)
            .bind(entry.handed_off_by)
            .bind(entry.handed_off_to)
            .bind(&entry.decision)
            .bind(entry.form_response_id)
            .bind(&entry.notes)
            .bind(entry.out_of_order)
            .fetch_one(exec)
            .await
    }

    pub async fn history(
        pool: &PgPool,
        instance_id: DbId,
    ) -> Result<Vec<WorkflowHistoryEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {HISTORY_COLUMNS} FROM workflow_history WHERE instance_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, WorkflowHistoryEntry>(&query)
            .bind(instance_id)
            .fetch_all(pool)
            .await
    }

    // ---------- node assignments ----------

    /// Pre-assign a user to a node for one instance. Upserts on repeat.
    pub async fn create_assignment<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        instance_id: DbId,
        node_id: DbId,
        user_id: DbId,
        assigned_by: DbId,
    ) -> Result<WorkflowNodeAssignment, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_node_assignments (instance_id, node_id, user_id, assigned_by)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT ON CONSTRAINT uq_workflow_node_assignments DO UPDATE
                SET assigned_by = EXCLUDED.assigned_by
             RETURNING {ASSIGNMENT_COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowNodeAssignment>(&query)
            .bind(instance_id)
            .bind(node_id)
            .bind(user_id)
            .bind(assigned_by)
            .fetch_one(exec)
            .await
    }

    pub async fn assignments(
        pool: &PgPool,
        instance_id: DbId,
    ) -> Result<Vec<WorkflowNodeAssignment>, sqlx::Error> {
        let query = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM workflow_node_assignments
             WHERE instance_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, WorkflowNodeAssignment>(&query)
            .bind(instance_id)
            .fetch_all(pool)
            .await
    }

    /// Node ids a user has been pre-assigned to on an instance.
    pub async fn preassigned_node_ids<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        instance_id: DbId,
        user_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "SELECT node_id FROM workflow_node_assignments
             WHERE instance_id = $1 AND user_id = $2",
        )
        .bind(instance_id)
        .bind(user_id)
        .fetch_all(exec)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// The pre-assigned user for a node on an instance, if any. Several
    /// users may be assigned to one node; the earliest assignment wins.
    pub async fn find_assignment_for_node<'e, E: sqlx::PgExecutor<'e>>(
        exec: E,
        instance_id: DbId,
        node_id: DbId,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let row: Option<(DbId,)> = sqlx::query_as(
            "SELECT user_id FROM workflow_node_assignments
             WHERE instance_id = $1 AND node_id = $2
             ORDER BY assigned_at, id
             LIMIT 1",
        )
        .bind(instance_id)
        .bind(node_id)
        .fetch_optional(exec)
        .await?;
        Ok(row.map(|(id,)| id))
    }
}
