use async_trait::async_trait;
use thiserror::Error;

use leadflow_core::domain::activation::{ActivationId, ActivationRecord, FinalOutcome};
use leadflow_core::domain::catalog::{
    Stage, StageId, StepId, TransitionId, WorkflowDefinition, WorkflowId, WorkflowStep,
    WorkflowTransition,
};
use leadflow_core::domain::instance::{InstanceId, StepExecution, WorkflowInstance};
use leadflow_core::domain::subject::{Subject, SubjectId};
use leadflow_core::fields::{FieldSpec, WorkflowFieldSchema};

pub mod catalog;
pub mod instance;
pub mod memory;
pub mod subject;

pub use catalog::SqlCatalogRepository;
pub use instance::SqlInstanceRepository;
pub use memory::{InMemoryCatalogRepository, InMemoryInstanceRepository, InMemorySubjectRepository};
pub use subject::SqlSubjectRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("a running instance already exists for subject {subject_id} and workflow {workflow_id}")]
    RunningConflict { subject_id: String, workflow_id: String },
}

/// Everything the activation coordinator commits in one atomic unit. The
/// parent stamp, the new instance with its pending executions, and the
/// append-only record land together or not at all.
#[derive(Clone, Debug)]
pub struct NewActivation {
    pub parent: Option<(InstanceId, FinalOutcome)>,
    pub instance: WorkflowInstance,
    pub executions: Vec<StepExecution>,
    pub record: ActivationRecord,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_stages(&self) -> Result<Vec<Stage>, RepositoryError>;
    async fn save_stage(&self, stage: Stage) -> Result<(), RepositoryError>;

    async fn list_workflows(
        &self,
        stage: Option<&StageId>,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError>;
    async fn find_workflow(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError>;
    async fn save_workflow(&self, workflow: WorkflowDefinition) -> Result<(), RepositoryError>;
    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), RepositoryError>;

    /// Steps for one workflow, position ascending.
    async fn list_steps(&self, workflow: &WorkflowId)
        -> Result<Vec<WorkflowStep>, RepositoryError>;
    async fn save_step(&self, step: WorkflowStep) -> Result<(), RepositoryError>;
    async fn delete_step(&self, id: &StepId) -> Result<(), RepositoryError>;

    /// `source == None` lists every transition, entry edges included.
    async fn list_transitions(
        &self,
        source: Option<&WorkflowId>,
    ) -> Result<Vec<WorkflowTransition>, RepositoryError>;
    /// Edges with no source workflow, offered to subjects with no history.
    async fn list_entry_transitions(&self) -> Result<Vec<WorkflowTransition>, RepositoryError>;
    async fn save_transition(&self, transition: WorkflowTransition)
        -> Result<(), RepositoryError>;
    async fn delete_transition(&self, id: &TransitionId) -> Result<(), RepositoryError>;

    async fn field_schema(
        &self,
        workflow: &WorkflowId,
    ) -> Result<WorkflowFieldSchema, RepositoryError>;
    async fn save_field(
        &self,
        workflow: &WorkflowId,
        field: FieldSpec,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SubjectRepository: Send + Sync {
    async fn find_by_id(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError>;
    async fn save(&self, subject: Subject) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait InstanceRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &InstanceId,
    ) -> Result<Option<WorkflowInstance>, RepositoryError>;
    async fn list_for_subject(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Vec<WorkflowInstance>, RepositoryError>;
    async fn list_executions(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<StepExecution>, RepositoryError>;
    async fn save_instance(&self, instance: WorkflowInstance) -> Result<(), RepositoryError>;
    async fn save_execution(&self, execution: StepExecution) -> Result<(), RepositoryError>;

    /// Persists a resolved execution together with its instance in one
    /// transaction, so a completed instance never lands without the final
    /// execution that completed it.
    async fn save_step_result(
        &self,
        instance: WorkflowInstance,
        execution: StepExecution,
    ) -> Result<(), RepositoryError>;

    /// Commits a validated activation atomically. The single-active-instance
    /// race resolves here: the losing writer gets `RunningConflict`.
    async fn record_activation(&self, activation: NewActivation)
        -> Result<(), RepositoryError>;

    async fn find_record(
        &self,
        id: &ActivationId,
    ) -> Result<Option<ActivationRecord>, RepositoryError>;

    /// True when any instance references the workflow, regardless of status.
    async fn workflow_in_use(&self, workflow_id: &WorkflowId) -> Result<bool, RepositoryError>;
}
