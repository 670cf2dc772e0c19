use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;

use leadflow_core::domain::activation::{
    ActivationId, ActivationRecord, FinalOutcome, RecommendationAlignment,
};
use leadflow_core::domain::catalog::{StepId, WorkflowId};
use leadflow_core::domain::instance::{
    InstanceId, InstanceStatus, StepExecution, StepStatus, WorkflowInstance,
};
use leadflow_core::domain::subject::{SubjectId, SubjectSnapshot};

use super::{InstanceRepository, NewActivation, RepositoryError};
use crate::DbPool;

pub struct SqlInstanceRepository {
    pool: DbPool,
}

impl SqlInstanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_instance_status(s: &str) -> Result<InstanceStatus, RepositoryError> {
    match s {
        "running" => Ok(InstanceStatus::Running),
        "completed" => Ok(InstanceStatus::Completed),
        "terminated" => Ok(InstanceStatus::Terminated),
        other => Err(RepositoryError::Decode(format!("unknown instance status `{other}`"))),
    }
}

fn parse_step_status(s: &str) -> Result<StepStatus, RepositoryError> {
    match s {
        "pending" => Ok(StepStatus::Pending),
        "success" => Ok(StepStatus::Success),
        "failed" => Ok(StepStatus::Failed),
        other => Err(RepositoryError::Decode(format!("unknown step status `{other}`"))),
    }
}

fn parse_outcome(s: &str) -> Result<FinalOutcome, RepositoryError> {
    match s {
        "discount" => Ok(FinalOutcome::Discount),
        "original_price" => Ok(FinalOutcome::OriginalPrice),
        "lost" => Ok(FinalOutcome::Lost),
        other => Err(RepositoryError::Decode(format!("unknown final outcome `{other}`"))),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_instance(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowInstance, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let subject_id: String =
        row.try_get("subject_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let workflow_id: String =
        row.try_get("workflow_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let started_at_str: String =
        row.try_get("started_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let completed_at_str: Option<String> =
        row.try_get("completed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sla_deadline_str: String =
        row.try_get("sla_deadline").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let final_outcome_str: Option<String> =
        row.try_get("final_outcome").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(WorkflowInstance {
        id: InstanceId(id),
        subject_id: SubjectId(subject_id),
        workflow_id: WorkflowId(workflow_id),
        status: parse_instance_status(&status_str)?,
        started_at: parse_timestamp(&started_at_str)?,
        completed_at: completed_at_str.as_deref().map(parse_timestamp).transpose()?,
        sla_deadline: parse_timestamp(&sla_deadline_str)?,
        final_outcome: final_outcome_str.as_deref().map(parse_outcome).transpose()?,
    })
}

fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> Result<StepExecution, RepositoryError> {
    let instance_id: String =
        row.try_get("instance_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let step_id: String =
        row.try_get("step_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let executed_at_str: Option<String> =
        row.try_get("executed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let error: Option<String> =
        row.try_get("error").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(StepExecution {
        instance_id: InstanceId(instance_id),
        step_id: StepId(step_id),
        status: parse_step_status(&status_str)?,
        executed_at: executed_at_str.as_deref().map(parse_timestamp).transpose()?,
        error,
    })
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ActivationRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let instance_id: String =
        row.try_get("instance_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let parent_instance_id: Option<String> =
        row.try_get("parent_instance_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let workflow_id: String =
        row.try_get("workflow_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let parent_outcome_str: Option<String> =
        row.try_get("parent_outcome").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let rationale: Option<String> =
        row.try_get("rationale").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let snapshot_json: String =
        row.try_get("snapshot").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let custom_fields_json: String =
        row.try_get("custom_fields").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recommendation_id: Option<String> =
        row.try_get("recommendation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recommendation_aligned: Option<i64> = row
        .try_get("recommendation_aligned")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let snapshot: SubjectSnapshot =
        serde_json::from_str(&snapshot_json).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let custom_fields: BTreeMap<String, String> = serde_json::from_str(&custom_fields_json)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recommendation = recommendation_id.map(|recommendation_id| RecommendationAlignment {
        recommendation_id,
        aligned: recommendation_aligned.unwrap_or(0) != 0,
    });

    Ok(ActivationRecord {
        id: ActivationId(id),
        instance_id: InstanceId(instance_id),
        parent_instance_id: parent_instance_id.map(InstanceId),
        workflow_id: WorkflowId(workflow_id),
        parent_outcome: parent_outcome_str.as_deref().map(parse_outcome).transpose()?,
        rationale,
        snapshot,
        custom_fields,
        recommendation,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

fn map_running_conflict(error: sqlx::Error, instance: &WorkflowInstance) -> RepositoryError {
    if let sqlx::Error::Database(ref db_error) = error {
        if db_error.is_unique_violation() {
            return RepositoryError::RunningConflict {
                subject_id: instance.subject_id.0.clone(),
                workflow_id: instance.workflow_id.0.clone(),
            };
        }
    }
    RepositoryError::Database(error)
}

async fn insert_instance(
    executor: &mut sqlx::SqliteConnection,
    instance: &WorkflowInstance,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO workflow_instance
             (id, subject_id, workflow_id, status, started_at, completed_at, sla_deadline, final_outcome)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             status = excluded.status,
             completed_at = excluded.completed_at,
             final_outcome = excluded.final_outcome",
    )
    .bind(&instance.id.0)
    .bind(&instance.subject_id.0)
    .bind(&instance.workflow_id.0)
    .bind(instance.status.as_str())
    .bind(instance.started_at.to_rfc3339())
    .bind(instance.completed_at.map(|dt| dt.to_rfc3339()))
    .bind(instance.sla_deadline.to_rfc3339())
    .bind(instance.final_outcome.map(|o| o.as_str()))
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_execution(
    executor: &mut sqlx::SqliteConnection,
    execution: &StepExecution,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO step_execution (instance_id, step_id, status, executed_at, error)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(instance_id, step_id) DO UPDATE SET
             status = excluded.status,
             executed_at = excluded.executed_at,
             error = excluded.error",
    )
    .bind(&execution.instance_id.0)
    .bind(&execution.step_id.0)
    .bind(execution.status.as_str())
    .bind(execution.executed_at.map(|dt| dt.to_rfc3339()))
    .bind(&execution.error)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl InstanceRepository for SqlInstanceRepository {
    async fn find_by_id(
        &self,
        id: &InstanceId,
    ) -> Result<Option<WorkflowInstance>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, subject_id, workflow_id, status, started_at, completed_at,
                    sla_deadline, final_outcome
             FROM workflow_instance WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_instance(r)?)),
            None => Ok(None),
        }
    }

    async fn list_for_subject(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Vec<WorkflowInstance>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, subject_id, workflow_id, status, started_at, completed_at,
                    sla_deadline, final_outcome
             FROM workflow_instance WHERE subject_id = ? ORDER BY started_at ASC, id ASC",
        )
        .bind(&subject_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_instance).collect()
    }

    async fn list_executions(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<StepExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT e.instance_id, e.step_id, e.status, e.executed_at, e.error
             FROM step_execution e
             JOIN workflow_step s ON s.id = e.step_id
             WHERE e.instance_id = ?
             ORDER BY s.position ASC",
        )
        .bind(&instance_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_execution).collect()
    }

    async fn save_instance(&self, instance: WorkflowInstance) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_instance(&mut *conn, &instance)
            .await
            .map_err(|e| map_running_conflict(e, &instance))?;
        Ok(())
    }

    async fn save_execution(&self, execution: StepExecution) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_execution(&mut *conn, &execution).await?;
        Ok(())
    }

    async fn save_step_result(
        &self,
        instance: WorkflowInstance,
        execution: StepExecution,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_execution(&mut *tx, &execution).await?;
        insert_instance(&mut *tx, &instance)
            .await
            .map_err(|e| map_running_conflict(e, &instance))?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_activation(
        &self,
        activation: NewActivation,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some((parent_id, outcome)) = &activation.parent {
            sqlx::query("UPDATE workflow_instance SET final_outcome = ? WHERE id = ?")
                .bind(outcome.as_str())
                .bind(&parent_id.0)
                .execute(&mut *tx)
                .await?;
        }

        insert_instance(&mut *tx, &activation.instance)
            .await
            .map_err(|e| map_running_conflict(e, &activation.instance))?;

        for execution in &activation.executions {
            insert_execution(&mut *tx, execution).await?;
        }

        let record = &activation.record;
        let snapshot_json = serde_json::to_string(&record.snapshot)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let custom_fields_json = serde_json::to_string(&record.custom_fields)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let (recommendation_id, recommendation_aligned) = match &record.recommendation {
            Some(alignment) => {
                (Some(alignment.recommendation_id.clone()), Some(alignment.aligned as i64))
            }
            None => (None, None),
        };

        sqlx::query(
            "INSERT INTO activation_record
                 (id, instance_id, parent_instance_id, workflow_id, parent_outcome, rationale,
                  snapshot, custom_fields, recommendation_id, recommendation_aligned, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.instance_id.0)
        .bind(record.parent_instance_id.as_ref().map(|id| id.0.clone()))
        .bind(&record.workflow_id.0)
        .bind(record.parent_outcome.map(|o| o.as_str()))
        .bind(&record.rationale)
        .bind(&snapshot_json)
        .bind(&custom_fields_json)
        .bind(&recommendation_id)
        .bind(recommendation_aligned)
        .bind(record.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_record(
        &self,
        id: &ActivationId,
    ) -> Result<Option<ActivationRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, instance_id, parent_instance_id, workflow_id, parent_outcome, rationale,
                    snapshot, custom_fields, recommendation_id, recommendation_aligned, created_at
             FROM activation_record WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_record(r)?)),
            None => Ok(None),
        }
    }

    async fn workflow_in_use(&self, workflow_id: &WorkflowId) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM workflow_instance WHERE workflow_id = ?",
        )
        .bind(&workflow_id.0)
        .fetch_one(&self.pool)
        .await?
        .try_get("count")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use leadflow_core::domain::activation::{
        ActivationId, ActivationRecord, FinalOutcome, RecommendationAlignment,
    };
    use leadflow_core::domain::catalog::{
        Stage, StageId, StepId, WorkflowDefinition, WorkflowId, WorkflowStep,
    };
    use leadflow_core::domain::instance::{
        InstanceId, InstanceStatus, StepExecution, StepStatus, WorkflowInstance,
    };
    use leadflow_core::domain::subject::{Subject, SubjectId, SubjectSnapshot};

    use super::SqlInstanceRepository;
    use crate::repositories::{
        CatalogRepository, InstanceRepository, NewActivation, RepositoryError,
        SqlCatalogRepository, SqlSubjectRepository, SubjectRepository,
    };
    use crate::{connect_url, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_url("sqlite::memory:").await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_catalog(&pool).await;
        pool
    }

    async fn seed_catalog(pool: &sqlx::SqlitePool) {
        let catalog = SqlCatalogRepository::new(pool.clone());
        catalog
            .save_stage(Stage { id: StageId("S-1".to_string()), name: "Acquisition".to_string() })
            .await
            .expect("stage");
        for (id, name) in [("WF0", "First contact"), ("WF1", "Auction")] {
            catalog
                .save_workflow(WorkflowDefinition {
                    id: WorkflowId(id.to_string()),
                    stage_id: StageId("S-1".to_string()),
                    name: name.to_string(),
                    description: String::new(),
                    sla_hours: 24,
                    active: true,
                })
                .await
                .expect("workflow");
        }
        for (id, workflow, position) in [("ST-1", "WF0", 10), ("ST-2", "WF0", 20)] {
            catalog
                .save_step(WorkflowStep {
                    id: StepId(id.to_string()),
                    workflow_id: WorkflowId(workflow.to_string()),
                    position,
                    automated: false,
                    message_template: None,
                })
                .await
                .expect("step");
        }

        let subjects = SqlSubjectRepository::new(pool.clone());
        subjects
            .save(Subject {
                id: SubjectId("car-1".to_string()),
                display_name: "Toyota Vios 2019".to_string(),
                intention: "sell".to_string(),
                sale_stage: "negotiation".to_string(),
                qualification: "hot".to_string(),
                asking_price: Some(Decimal::new(420_000_000, 0)),
                highest_bid: None,
                contact: None,
            })
            .await
            .expect("subject");
    }

    fn instance(id: &str, workflow: &str, status: InstanceStatus) -> WorkflowInstance {
        let now = Utc::now();
        WorkflowInstance {
            id: InstanceId(id.to_string()),
            subject_id: SubjectId("car-1".to_string()),
            workflow_id: WorkflowId(workflow.to_string()),
            status,
            started_at: now,
            completed_at: (status == InstanceStatus::Completed).then_some(now),
            sla_deadline: now + Duration::hours(24),
            final_outcome: None,
        }
    }

    fn execution(instance_id: &str, step_id: &str) -> StepExecution {
        StepExecution {
            instance_id: InstanceId(instance_id.to_string()),
            step_id: StepId(step_id.to_string()),
            status: StepStatus::Pending,
            executed_at: None,
            error: None,
        }
    }

    fn snapshot() -> SubjectSnapshot {
        SubjectSnapshot {
            display_name: "Toyota Vios 2019".to_string(),
            intention: "sell".to_string(),
            sale_stage: "negotiation".to_string(),
            qualification: "hot".to_string(),
            asking_price: Some(Decimal::new(420_000_000, 0)),
            highest_bid: None,
        }
    }

    fn record(id: &str, instance_id: &str, workflow: &str) -> ActivationRecord {
        ActivationRecord {
            id: ActivationId(id.to_string()),
            instance_id: InstanceId(instance_id.to_string()),
            parent_instance_id: None,
            workflow_id: WorkflowId(workflow.to_string()),
            parent_outcome: None,
            rationale: None,
            snapshot: snapshot(),
            custom_fields: BTreeMap::new(),
            recommendation: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_activation_commits_instance_executions_and_record() {
        let repo = SqlInstanceRepository::new(setup().await);

        let new_instance = instance("I-1", "WF0", InstanceStatus::Running);
        repo.record_activation(NewActivation {
            parent: None,
            instance: new_instance.clone(),
            executions: vec![execution("I-1", "ST-1"), execution("I-1", "ST-2")],
            record: record("A-1", "I-1", "WF0"),
        })
        .await
        .expect("activation");

        let found = repo
            .find_by_id(&InstanceId("I-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.status, InstanceStatus::Running);

        let executions =
            repo.list_executions(&InstanceId("I-1".to_string())).await.expect("executions");
        assert_eq!(executions.len(), 2);
        assert!(executions.iter().all(|e| e.status == StepStatus::Pending));

        let stored = repo
            .find_record(&ActivationId("A-1".to_string()))
            .await
            .expect("find record")
            .expect("exists");
        assert_eq!(stored.snapshot, snapshot());
    }

    #[tokio::test]
    async fn record_activation_stamps_parent_outcome() {
        let repo = SqlInstanceRepository::new(setup().await);

        let mut parent = instance("I-0", "WF0", InstanceStatus::Completed);
        repo.save_instance(parent.clone()).await.expect("save parent");

        let mut follow_record = record("A-2", "I-1", "WF1");
        follow_record.parent_instance_id = Some(InstanceId("I-0".to_string()));
        follow_record.parent_outcome = Some(FinalOutcome::Discount);
        follow_record.rationale = Some("buyer agreed at auction".to_string());

        repo.record_activation(NewActivation {
            parent: Some((InstanceId("I-0".to_string()), FinalOutcome::Discount)),
            instance: instance("I-1", "WF1", InstanceStatus::Running),
            executions: vec![],
            record: follow_record,
        })
        .await
        .expect("activation");

        parent = repo
            .find_by_id(&InstanceId("I-0".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(parent.final_outcome, Some(FinalOutcome::Discount));
    }

    #[tokio::test]
    async fn second_running_activation_for_same_workflow_loses() {
        let repo = SqlInstanceRepository::new(setup().await);

        repo.record_activation(NewActivation {
            parent: None,
            instance: instance("I-1", "WF0", InstanceStatus::Running),
            executions: vec![],
            record: record("A-1", "I-1", "WF0"),
        })
        .await
        .expect("first activation");

        let error = repo
            .record_activation(NewActivation {
                parent: None,
                instance: instance("I-2", "WF0", InstanceStatus::Running),
                executions: vec![],
                record: record("A-2", "I-2", "WF0"),
            })
            .await
            .expect_err("second activation must lose the race");

        assert!(matches!(
            error,
            RepositoryError::RunningConflict { ref workflow_id, .. } if workflow_id == "WF0"
        ));

        // No partial state from the losing writer.
        assert!(repo
            .find_by_id(&InstanceId("I-2".to_string()))
            .await
            .expect("find")
            .is_none());
        assert!(repo
            .find_record(&ActivationId("A-2".to_string()))
            .await
            .expect("find record")
            .is_none());
    }

    #[tokio::test]
    async fn step_result_lands_instance_and_execution_together() {
        let repo = SqlInstanceRepository::new(setup().await);
        repo.record_activation(NewActivation {
            parent: None,
            instance: instance("I-1", "WF0", InstanceStatus::Running),
            executions: vec![execution("I-1", "ST-1")],
            record: record("A-1", "I-1", "WF0"),
        })
        .await
        .expect("activation");

        let mut resolved = execution("I-1", "ST-1");
        resolved.status = StepStatus::Success;
        resolved.executed_at = Some(Utc::now());
        repo.save_step_result(instance("I-1", "WF0", InstanceStatus::Completed), resolved)
            .await
            .expect("step result");

        let found = repo
            .find_by_id(&InstanceId("I-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.status, InstanceStatus::Completed);
        let executions =
            repo.list_executions(&InstanceId("I-1".to_string())).await.expect("executions");
        assert_eq!(executions[0].status, StepStatus::Success);
    }

    #[tokio::test]
    async fn failed_step_result_leaves_the_instance_untouched() {
        let repo = SqlInstanceRepository::new(setup().await);
        repo.record_activation(NewActivation {
            parent: None,
            instance: instance("I-1", "WF0", InstanceStatus::Running),
            executions: vec![execution("I-1", "ST-1")],
            record: record("A-1", "I-1", "WF0"),
        })
        .await
        .expect("activation");

        // An execution pointing at an unknown step trips the foreign key,
        // which must roll the instance update back with it.
        let mut orphan = execution("I-1", "ST-unknown");
        orphan.status = StepStatus::Success;
        orphan.executed_at = Some(Utc::now());
        let error = repo
            .save_step_result(instance("I-1", "WF0", InstanceStatus::Completed), orphan)
            .await
            .expect_err("unknown step must fail");
        assert!(matches!(error, RepositoryError::Database(_)));

        let found = repo
            .find_by_id(&InstanceId("I-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.status, InstanceStatus::Running);
        assert_eq!(found.completed_at, None);
    }

    #[tokio::test]
    async fn terminated_instance_does_not_block_reactivation() {
        let repo = SqlInstanceRepository::new(setup().await);

        repo.save_instance(instance("I-1", "WF0", InstanceStatus::Terminated))
            .await
            .expect("save terminated");

        repo.record_activation(NewActivation {
            parent: None,
            instance: instance("I-2", "WF0", InstanceStatus::Running),
            executions: vec![],
            record: record("A-2", "I-2", "WF0"),
        })
        .await
        .expect("partial index only guards running rows");
    }

    #[tokio::test]
    async fn record_snapshot_survives_subject_mutation() {
        let pool = setup().await;
        let repo = SqlInstanceRepository::new(pool.clone());
        let subjects = SqlSubjectRepository::new(pool);

        repo.record_activation(NewActivation {
            parent: None,
            instance: instance("I-1", "WF0", InstanceStatus::Running),
            executions: vec![],
            record: record("A-1", "I-1", "WF0"),
        })
        .await
        .expect("activation");

        let mut subject = subjects
            .find_by_id(&SubjectId("car-1".to_string()))
            .await
            .expect("find subject")
            .expect("exists");
        subject.qualification = "cold".to_string();
        subject.asking_price = Some(Decimal::new(100, 0));
        subjects.save(subject).await.expect("mutate subject");

        let stored = repo
            .find_record(&ActivationId("A-1".to_string()))
            .await
            .expect("find record")
            .expect("exists");
        assert_eq!(stored.snapshot.qualification, "hot");
        assert_eq!(stored.snapshot.asking_price, Some(Decimal::new(420_000_000, 0)));
    }

    #[tokio::test]
    async fn alignment_round_trips() {
        let repo = SqlInstanceRepository::new(setup().await);

        let mut aligned_record = record("A-1", "I-1", "WF0");
        aligned_record.recommendation = Some(RecommendationAlignment {
            recommendation_id: "rec-9".to_string(),
            aligned: false,
        });
        repo.record_activation(NewActivation {
            parent: None,
            instance: instance("I-1", "WF0", InstanceStatus::Running),
            executions: vec![],
            record: aligned_record,
        })
        .await
        .expect("activation");

        let stored = repo
            .find_record(&ActivationId("A-1".to_string()))
            .await
            .expect("find record")
            .expect("exists");
        let alignment = stored.recommendation.expect("alignment stored");
        assert_eq!(alignment.recommendation_id, "rec-9");
        assert!(!alignment.aligned);
    }

    #[tokio::test]
    async fn workflow_in_use_counts_any_status() {
        let repo = SqlInstanceRepository::new(setup().await);

        assert!(!repo.workflow_in_use(&WorkflowId("WF0".to_string())).await.expect("unused"));

        repo.save_instance(instance("I-1", "WF0", InstanceStatus::Terminated))
            .await
            .expect("save");

        assert!(repo.workflow_in_use(&WorkflowId("WF0".to_string())).await.expect("in use"));
        assert!(!repo.workflow_in_use(&WorkflowId("WF1".to_string())).await.expect("other"));
    }
}
