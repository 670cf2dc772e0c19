use thiserror::Error;

use crate::domain::catalog::{StepId, WorkflowId};
use crate::domain::instance::{InstanceId, InstanceStatus, StepStatus};
use crate::domain::subject::SubjectId;

/// The four recoverable error kinds callers are expected to branch on.
/// Validation and conflict errors carry enough detail for the operator to
/// correct the request; invalid-state errors signal stale client state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    InvalidState,
    NotFound,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("missing required field `{field}`")]
    MissingField { field: String },
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("transition source and target must differ (workflow {0:?})")]
    SelfLoopTransition(WorkflowId),
    #[error("workflow name `{name}` already exists in stage {stage_id}")]
    DuplicateWorkflowName { stage_id: String, name: String },
    #[error(
        "running instance {instance_id:?} already exists for subject {subject_id:?} and workflow {workflow_id:?}"
    )]
    RunningInstanceExists {
        subject_id: SubjectId,
        workflow_id: WorkflowId,
        instance_id: InstanceId,
    },
    #[error("workflow {0:?} has instances and can only be deactivated, not deleted")]
    DefinitionInUse(WorkflowId),
    #[error("instance {instance_id:?} is {status:?}, not running")]
    NotRunning { instance_id: InstanceId, status: InstanceStatus },
    #[error("step {step_id:?} of instance {instance_id:?} already resolved to {status:?}")]
    StepAlreadyResolved { instance_id: InstanceId, step_id: StepId, status: StepStatus },
    #[error(
        "parent instance {instance_id:?} is {status:?}; only completed instances can be followed"
    )]
    ParentNotCompleted { instance_id: InstanceId, status: InstanceStatus },
    #[error("instance {instance_id:?} is already {status:?}")]
    AlreadyClosed { instance_id: InstanceId, status: InstanceStatus },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField { .. }
            | Self::InvalidField { .. }
            | Self::SelfLoopTransition(_) => ErrorKind::Validation,
            Self::DuplicateWorkflowName { .. }
            | Self::RunningInstanceExists { .. }
            | Self::DefinitionInUse(_) => ErrorKind::Conflict,
            Self::NotRunning { .. }
            | Self::StepAlreadyResolved { .. }
            | Self::ParentNotCompleted { .. }
            | Self::AlreadyClosed { .. } => ErrorKind::InvalidState,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Domain errors keep their recoverable kind; infrastructure failures
    /// have none and map to 5xx at the interface.
    pub fn domain_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Domain(domain) => Some(domain.kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::catalog::WorkflowId;
    use crate::domain::instance::{InstanceId, InstanceStatus};
    use crate::domain::subject::SubjectId;

    use super::{ApplicationError, DomainError, ErrorKind};

    #[test]
    fn validation_errors_name_the_offending_field() {
        let error = DomainError::MissingField { field: "rationale".to_string() };
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(error.to_string().contains("rationale"));
    }

    #[test]
    fn conflict_errors_name_the_conflicting_instance() {
        let error = DomainError::RunningInstanceExists {
            subject_id: SubjectId("car-1".to_string()),
            workflow_id: WorkflowId("WF1".to_string()),
            instance_id: InstanceId("I-42".to_string()),
        };
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert!(error.to_string().contains("I-42"));
    }

    #[test]
    fn state_errors_signal_refresh_not_retry() {
        let error = DomainError::AlreadyClosed {
            instance_id: InstanceId("I-1".to_string()),
            status: InstanceStatus::Completed,
        };
        assert_eq!(error.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn application_layer_preserves_domain_kind() {
        let app = ApplicationError::from(DomainError::not_found("workflow", "WF9"));
        assert_eq!(app.domain_kind(), Some(ErrorKind::NotFound));
        assert_eq!(ApplicationError::Persistence("lock timeout".to_string()).domain_kind(), None);
    }
}
