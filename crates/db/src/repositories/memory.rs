use std::collections::HashMap;

use tokio::sync::RwLock;

use leadflow_core::domain::activation::{ActivationId, ActivationRecord};
use leadflow_core::domain::catalog::{
    Stage, StageId, StepId, TransitionId, WorkflowDefinition, WorkflowId, WorkflowStep,
    WorkflowTransition,
};
use leadflow_core::domain::instance::{InstanceId, StepExecution, WorkflowInstance};
use leadflow_core::domain::subject::{Subject, SubjectId};
use leadflow_core::fields::{FieldSpec, WorkflowFieldSchema};

use super::{
    CatalogRepository, InstanceRepository, NewActivation, RepositoryError, SubjectRepository,
};

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    stages: RwLock<HashMap<String, Stage>>,
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
    steps: RwLock<HashMap<String, WorkflowStep>>,
    transitions: RwLock<HashMap<String, WorkflowTransition>>,
    fields: RwLock<HashMap<String, Vec<FieldSpec>>>,
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list_stages(&self) -> Result<Vec<Stage>, RepositoryError> {
        let stages = self.stages.read().await;
        let mut out: Vec<Stage> = stages.values().cloned().collect();
        out.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(out)
    }

    async fn save_stage(&self, stage: Stage) -> Result<(), RepositoryError> {
        let mut stages = self.stages.write().await;
        stages.insert(stage.id.0.clone(), stage);
        Ok(())
    }

    async fn list_workflows(
        &self,
        stage: Option<&StageId>,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let workflows = self.workflows.read().await;
        let mut out: Vec<WorkflowDefinition> = workflows
            .values()
            .filter(|w| stage.map(|s| w.stage_id == *s).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(out)
    }

    async fn find_workflow(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(&id.0).cloned())
    }

    async fn save_workflow(&self, workflow: WorkflowDefinition) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id.0.clone(), workflow);
        Ok(())
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), RepositoryError> {
        self.workflows.write().await.remove(&id.0);
        self.steps.write().await.retain(|_, step| step.workflow_id != *id);
        self.transitions
            .write()
            .await
            .retain(|_, t| t.source.as_ref() != Some(id) && t.target != *id);
        self.fields.write().await.remove(&id.0);
        Ok(())
    }

    async fn list_steps(
        &self,
        workflow: &WorkflowId,
    ) -> Result<Vec<WorkflowStep>, RepositoryError> {
        let steps = self.steps.read().await;
        let mut out: Vec<WorkflowStep> =
            steps.values().filter(|s| s.workflow_id == *workflow).cloned().collect();
        out.sort_by_key(|s| s.position);
        Ok(out)
    }

    async fn save_step(&self, step: WorkflowStep) -> Result<(), RepositoryError> {
        let mut steps = self.steps.write().await;
        steps.insert(step.id.0.clone(), step);
        Ok(())
    }

    async fn delete_step(&self, id: &StepId) -> Result<(), RepositoryError> {
        self.steps.write().await.remove(&id.0);
        Ok(())
    }

    async fn list_transitions(
        &self,
        source: Option<&WorkflowId>,
    ) -> Result<Vec<WorkflowTransition>, RepositoryError> {
        let transitions = self.transitions.read().await;
        let mut out: Vec<WorkflowTransition> = transitions
            .values()
            .filter(|t| source.map(|s| t.source.as_ref() == Some(s)).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(out)
    }

    async fn list_entry_transitions(&self) -> Result<Vec<WorkflowTransition>, RepositoryError> {
        let transitions = self.transitions.read().await;
        let mut out: Vec<WorkflowTransition> =
            transitions.values().filter(|t| t.source.is_none()).cloned().collect();
        out.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(out)
    }

    async fn save_transition(
        &self,
        transition: WorkflowTransition,
    ) -> Result<(), RepositoryError> {
        let mut transitions = self.transitions.write().await;
        transitions.insert(transition.id.0.clone(), transition);
        Ok(())
    }

    async fn delete_transition(&self, id: &TransitionId) -> Result<(), RepositoryError> {
        self.transitions.write().await.remove(&id.0);
        Ok(())
    }

    async fn field_schema(
        &self,
        workflow: &WorkflowId,
    ) -> Result<WorkflowFieldSchema, RepositoryError> {
        let fields = self.fields.read().await;
        Ok(WorkflowFieldSchema {
            workflow_id: workflow.clone(),
            fields: fields.get(&workflow.0).cloned().unwrap_or_default(),
        })
    }

    async fn save_field(
        &self,
        workflow: &WorkflowId,
        field: FieldSpec,
    ) -> Result<(), RepositoryError> {
        let mut fields = self.fields.write().await;
        let entry = fields.entry(workflow.0.clone()).or_default();
        match entry.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => entry.push(field),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySubjectRepository {
    subjects: RwLock<HashMap<String, Subject>>,
}

#[async_trait::async_trait]
impl SubjectRepository for InMemorySubjectRepository {
    async fn find_by_id(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError> {
        let subjects = self.subjects.read().await;
        Ok(subjects.get(&id.0).cloned())
    }

    async fn save(&self, subject: Subject) -> Result<(), RepositoryError> {
        let mut subjects = self.subjects.write().await;
        subjects.insert(subject.id.0.clone(), subject);
        Ok(())
    }
}

#[derive(Default)]
struct InstanceStoreState {
    instances: HashMap<String, WorkflowInstance>,
    executions: HashMap<String, Vec<StepExecution>>,
    records: HashMap<String, ActivationRecord>,
}

/// All instance data behind one lock so `record_activation` gets the same
/// all-or-nothing semantics as the SQL transaction.
#[derive(Default)]
pub struct InMemoryInstanceRepository {
    state: RwLock<InstanceStoreState>,
}

#[async_trait::async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn find_by_id(
        &self,
        id: &InstanceId,
    ) -> Result<Option<WorkflowInstance>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.instances.get(&id.0).cloned())
    }

    async fn list_for_subject(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Vec<WorkflowInstance>, RepositoryError> {
        let state = self.state.read().await;
        let mut out: Vec<WorkflowInstance> = state
            .instances
            .values()
            .filter(|i| i.subject_id == *subject_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(out)
    }

    async fn list_executions(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<StepExecution>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.executions.get(&instance_id.0).cloned().unwrap_or_default())
    }

    async fn save_instance(&self, instance: WorkflowInstance) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if instance.is_running() {
            if let Some(running) = state.instances.values().find(|i| {
                i.id != instance.id
                    && i.subject_id == instance.subject_id
                    && i.workflow_id == instance.workflow_id
                    && i.is_running()
            }) {
                return Err(RepositoryError::RunningConflict {
                    subject_id: running.subject_id.0.clone(),
                    workflow_id: running.workflow_id.0.clone(),
                });
            }
        }
        state.instances.insert(instance.id.0.clone(), instance);
        Ok(())
    }

    async fn save_execution(&self, execution: StepExecution) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let entry = state.executions.entry(execution.instance_id.0.clone()).or_default();
        match entry.iter_mut().find(|e| e.step_id == execution.step_id) {
            Some(existing) => *existing = execution,
            None => entry.push(execution),
        }
        Ok(())
    }

    async fn save_step_result(
        &self,
        instance: WorkflowInstance,
        execution: StepExecution,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let entry = state.executions.entry(execution.instance_id.0.clone()).or_default();
        match entry.iter_mut().find(|e| e.step_id == execution.step_id) {
            Some(existing) => *existing = execution,
            None => entry.push(execution),
        }
        state.instances.insert(instance.id.0.clone(), instance);
        Ok(())
    }

    async fn record_activation(
        &self,
        activation: NewActivation,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;

        // Conflict check before any write keeps the unit all-or-nothing.
        if let Some(running) = state.instances.values().find(|i| {
            i.subject_id == activation.instance.subject_id
                && i.workflow_id == activation.instance.workflow_id
                && i.is_running()
        }) {
            return Err(RepositoryError::RunningConflict {
                subject_id: running.subject_id.0.clone(),
                workflow_id: running.workflow_id.0.clone(),
            });
        }

        if let Some((parent_id, outcome)) = &activation.parent {
            if let Some(parent) = state.instances.get_mut(&parent_id.0) {
                parent.final_outcome = Some(*outcome);
            }
        }

        state
            .instances
            .insert(activation.instance.id.0.clone(), activation.instance.clone());
        state
            .executions
            .insert(activation.instance.id.0.clone(), activation.executions.clone());
        state.records.insert(activation.record.id.0.clone(), activation.record);
        Ok(())
    }

    async fn find_record(
        &self,
        id: &ActivationId,
    ) -> Result<Option<ActivationRecord>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.records.get(&id.0).cloned())
    }

    async fn workflow_in_use(&self, workflow_id: &WorkflowId) -> Result<bool, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.instances.values().any(|i| i.workflow_id == *workflow_id))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};

    use leadflow_core::domain::activation::{ActivationId, ActivationRecord, FinalOutcome};
    use leadflow_core::domain::catalog::WorkflowId;
    use leadflow_core::domain::instance::{InstanceId, InstanceStatus, WorkflowInstance};
    use leadflow_core::domain::subject::{SubjectId, SubjectSnapshot};

    use crate::repositories::{
        InMemoryInstanceRepository, InstanceRepository, NewActivation, RepositoryError,
    };

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

    fn record(id: &str, instance_id: &str, workflow: &str) -> ActivationRecord {
        ActivationRecord {
            id: ActivationId(id.to_string()),
            instance_id: InstanceId(instance_id.to_string()),
            parent_instance_id: None,
            workflow_id: WorkflowId(workflow.to_string()),
            parent_outcome: None,
            rationale: None,
            snapshot: SubjectSnapshot {
                display_name: "Toyota Vios 2019".to_string(),
                intention: "sell".to_string(),
                sale_stage: "negotiation".to_string(),
                qualification: "hot".to_string(),
                asking_price: None,
                highest_bid: None,
            },
            custom_fields: BTreeMap::new(),
            recommendation: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn running_conflict_mirrors_the_sql_partial_index() {
        let repo = InMemoryInstanceRepository::default();

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
            .expect_err("second activation loses");

        assert!(matches!(error, RepositoryError::RunningConflict { .. }));
        assert!(repo
            .find_record(&ActivationId("A-2".to_string()))
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn parent_outcome_is_stamped_atomically() {
        let repo = InMemoryInstanceRepository::default();
        repo.save_instance(instance("I-0", "WF0", InstanceStatus::Completed))
            .await
            .expect("parent");

        repo.record_activation(NewActivation {
            parent: Some((InstanceId("I-0".to_string()), FinalOutcome::OriginalPrice)),
            instance: instance("I-1", "WF1", InstanceStatus::Running),
            executions: vec![],
            record: record("A-1", "I-1", "WF1"),
        })
        .await
        .expect("activation");

        let parent = repo
            .find_by_id(&InstanceId("I-0".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(parent.final_outcome, Some(FinalOutcome::OriginalPrice));
    }
}
