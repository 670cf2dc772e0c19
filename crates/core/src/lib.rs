pub mod activation;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod evaluator;
pub mod fields;
pub mod lifecycle;

pub use activation::{align_recommendation, build_record, validate_activation};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::activation::{
    ActivationId, ActivationKind, ActivationRecord, ActivationRequest, FinalOutcome,
    RecommendationAlignment,
};
pub use domain::catalog::{
    Stage, StageId, StepId, TransitionId, WorkflowDefinition, WorkflowId, WorkflowStep,
    WorkflowTransition,
};
pub use domain::instance::{
    InstanceId, InstanceStatus, StepExecution, StepStatus, WorkflowInstance,
};
pub use domain::subject::{Subject, SubjectId, SubjectSnapshot};
pub use errors::{ApplicationError, DomainError, ErrorKind};
pub use evaluator::{eligible_transitions, select_default_workflow};
pub use fields::{FieldKind, FieldSpec, WorkflowFieldSchema};
pub use lifecycle::{LifecycleEngine, StepOutcome, StepOutcomeResult};
