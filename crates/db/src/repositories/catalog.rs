use sqlx::Row;

use leadflow_core::domain::catalog::{
    Stage, StageId, StepId, TransitionId, WorkflowDefinition, WorkflowId, WorkflowStep,
    WorkflowTransition,
};
use leadflow_core::fields::{FieldKind, FieldSpec, WorkflowFieldSchema};

use super::{CatalogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_stage(row: &sqlx::sqlite::SqliteRow) -> Result<Stage, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(Stage { id: StageId(id), name })
}

fn row_to_workflow(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowDefinition, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stage_id: String =
        row.try_get("stage_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sla_hours: i64 =
        row.try_get("sla_hours").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: i64 =
        row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(WorkflowDefinition {
        id: WorkflowId(id),
        stage_id: StageId(stage_id),
        name,
        description,
        sla_hours,
        active: active != 0,
    })
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowStep, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let workflow_id: String =
        row.try_get("workflow_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let position: i64 =
        row.try_get("position").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let automated: i64 =
        row.try_get("automated").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message_template: Option<String> =
        row.try_get("message_template").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(WorkflowStep {
        id: StepId(id),
        workflow_id: WorkflowId(workflow_id),
        position,
        automated: automated != 0,
        message_template,
    })
}

fn row_to_transition(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowTransition, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source: Option<String> =
        row.try_get("source_workflow_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let target: String =
        row.try_get("target_workflow_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let condition: String =
        row.try_get("condition").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let priority: i32 =
        row.try_get("priority").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sla_override_hours: Option<i64> =
        row.try_get("sla_override_hours").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(WorkflowTransition {
        id: TransitionId(id),
        source: source.map(WorkflowId),
        target: WorkflowId(target),
        condition,
        priority,
        sla_override_hours,
    })
}

fn row_to_field(row: &sqlx::sqlite::SqliteRow) -> Result<FieldSpec, RepositoryError> {
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_json: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let required: i64 =
        row.try_get("required").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let kind: FieldKind =
        serde_json::from_str(&kind_json).map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(FieldSpec { name, kind, required: required != 0 })
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn list_stages(&self) -> Result<Vec<Stage>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name FROM stage ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_stage).collect()
    }

    async fn save_stage(&self, stage: Stage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO stage (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&stage.id.0)
        .bind(&stage.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_workflows(
        &self,
        stage: Option<&StageId>,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let rows = if let Some(stage) = stage {
            sqlx::query(
                "SELECT id, stage_id, name, description, sla_hours, active
                 FROM workflow_definition WHERE stage_id = ? ORDER BY id",
            )
            .bind(&stage.0)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, stage_id, name, description, sla_hours, active
                 FROM workflow_definition ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?
        };
        rows.iter().map(row_to_workflow).collect()
    }

    async fn find_workflow(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, stage_id, name, description, sla_hours, active
             FROM workflow_definition WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_workflow(r)?)),
            None => Ok(None),
        }
    }

    async fn save_workflow(&self, workflow: WorkflowDefinition) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workflow_definition (id, stage_id, name, description, sla_hours, active)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 stage_id = excluded.stage_id,
                 name = excluded.name,
                 description = excluded.description,
                 sla_hours = excluded.sla_hours,
                 active = excluded.active",
        )
        .bind(&workflow.id.0)
        .bind(&workflow.stage_id.0)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.sla_hours)
        .bind(workflow.active as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM workflow_field WHERE workflow_id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM workflow_step WHERE workflow_id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "DELETE FROM workflow_transition WHERE source_workflow_id = ? OR target_workflow_id = ?",
        )
        .bind(&id.0)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;
        sqlx::query("DELETE FROM workflow_definition WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_steps(
        &self,
        workflow: &WorkflowId,
    ) -> Result<Vec<WorkflowStep>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, workflow_id, position, automated, message_template
             FROM workflow_step WHERE workflow_id = ? ORDER BY position ASC",
        )
        .bind(&workflow.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_step).collect()
    }

    async fn save_step(&self, step: WorkflowStep) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workflow_step (id, workflow_id, position, automated, message_template)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 workflow_id = excluded.workflow_id,
                 position = excluded.position,
                 automated = excluded.automated,
                 message_template = excluded.message_template",
        )
        .bind(&step.id.0)
        .bind(&step.workflow_id.0)
        .bind(step.position)
        .bind(step.automated as i64)
        .bind(&step.message_template)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_step(&self, id: &StepId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM workflow_step WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_transitions(
        &self,
        source: Option<&WorkflowId>,
    ) -> Result<Vec<WorkflowTransition>, RepositoryError> {
        let rows = if let Some(source) = source {
            sqlx::query(
                "SELECT id, source_workflow_id, target_workflow_id, condition, priority, sla_override_hours
                 FROM workflow_transition WHERE source_workflow_id = ?
                 ORDER BY priority ASC, id ASC",
            )
            .bind(&source.0)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, source_workflow_id, target_workflow_id, condition, priority, sla_override_hours
                 FROM workflow_transition ORDER BY priority ASC, id ASC",
            )
            .fetch_all(&self.pool)
            .await?
        };
        rows.iter().map(row_to_transition).collect()
    }

    async fn list_entry_transitions(&self) -> Result<Vec<WorkflowTransition>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, source_workflow_id, target_workflow_id, condition, priority, sla_override_hours
             FROM workflow_transition WHERE source_workflow_id IS NULL
             ORDER BY priority ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_transition).collect()
    }

    async fn save_transition(
        &self,
        transition: WorkflowTransition,
    ) -> Result<(), RepositoryError> {
        let source = transition.source.as_ref().map(|id| id.0.clone());
        sqlx::query(
            "INSERT INTO workflow_transition
                 (id, source_workflow_id, target_workflow_id, condition, priority, sla_override_hours)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 source_workflow_id = excluded.source_workflow_id,
                 target_workflow_id = excluded.target_workflow_id,
                 condition = excluded.condition,
                 priority = excluded.priority,
                 sla_override_hours = excluded.sla_override_hours",
        )
        .bind(&transition.id.0)
        .bind(&source)
        .bind(&transition.target.0)
        .bind(&transition.condition)
        .bind(transition.priority)
        .bind(transition.sla_override_hours)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_transition(&self, id: &TransitionId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM workflow_transition WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn field_schema(
        &self,
        workflow: &WorkflowId,
    ) -> Result<WorkflowFieldSchema, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, kind, required FROM workflow_field
             WHERE workflow_id = ? ORDER BY position ASC, name ASC",
        )
        .bind(&workflow.0)
        .fetch_all(&self.pool)
        .await?;

        let fields = rows.iter().map(row_to_field).collect::<Result<Vec<_>, _>>()?;
        Ok(WorkflowFieldSchema { workflow_id: workflow.clone(), fields })
    }

    async fn save_field(
        &self,
        workflow: &WorkflowId,
        field: FieldSpec,
    ) -> Result<(), RepositoryError> {
        let kind_json = serde_json::to_string(&field.kind)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let position: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM workflow_field WHERE workflow_id = ?",
        )
        .bind(&workflow.0)
        .fetch_one(&self.pool)
        .await?
        .try_get("count")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO workflow_field (workflow_id, name, kind, required, position)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(workflow_id, name) DO UPDATE SET
                 kind = excluded.kind,
                 required = excluded.required",
        )
        .bind(&workflow.0)
        .bind(&field.name)
        .bind(&kind_json)
        .bind(field.required as i64)
        .bind(position)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
