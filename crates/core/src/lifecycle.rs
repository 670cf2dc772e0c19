//! Deterministic instance lifecycle engine.
//!
//! Pure state machine logic for workflow instances and their step
//! executions. The engine operates on values handed to it and returns the
//! updated values; persistence and the cross-request single-active-instance
//! guarantee belong to the store layer.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::catalog::{StepId, WorkflowDefinition, WorkflowStep};
use crate::domain::instance::{
    InstanceId, InstanceStatus, StepExecution, StepStatus, WorkflowInstance,
};
use crate::domain::subject::SubjectId;
use crate::errors::DomainError;

/// Terminal outcome an operator (or automation) reports for one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Failed,
}

/// Result of recording a step outcome. `completed` is true exactly when
/// this call moved the instance from Running to Completed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcomeResult {
    pub instance: WorkflowInstance,
    pub execution: StepExecution,
    pub completed: bool,
}

#[derive(Clone, Debug, Default)]
pub struct LifecycleEngine;

impl LifecycleEngine {
    pub fn new() -> Self {
        Self
    }

    /// Builds a fresh Running instance plus one Pending execution per step
    /// in position order. `sla_override_hours` comes from the transition
    /// that triggered the activation, when there is one.
    pub fn start(
        &self,
        workflow: &WorkflowDefinition,
        steps: &[WorkflowStep],
        subject_id: SubjectId,
        sla_override_hours: Option<i64>,
        now: DateTime<Utc>,
    ) -> (WorkflowInstance, Vec<StepExecution>) {
        let sla_hours = sla_override_hours.unwrap_or(workflow.sla_hours);
        let instance = WorkflowInstance {
            id: InstanceId(Uuid::new_v4().to_string()),
            subject_id,
            workflow_id: workflow.id.clone(),
            status: InstanceStatus::Running,
            started_at: now,
            completed_at: None,
            sla_deadline: now + Duration::hours(sla_hours),
            final_outcome: None,
        };

        let mut ordered: Vec<&WorkflowStep> = steps.iter().collect();
        ordered.sort_by_key(|step| step.position);

        let executions = ordered
            .into_iter()
            .map(|step| StepExecution {
                instance_id: instance.id.clone(),
                step_id: step.id.clone(),
                status: StepStatus::Pending,
                executed_at: None,
                error: None,
            })
            .collect();

        (instance, executions)
    }

    /// Resolves one pending execution to a terminal status.
    ///
    /// The instance completes automatically when every execution has
    /// succeeded; a failed step leaves the instance Running so the
    /// operator decides whether to terminate.
    pub fn record_step_outcome(
        &self,
        mut instance: WorkflowInstance,
        mut executions: Vec<StepExecution>,
        step_id: &StepId,
        outcome: StepOutcome,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<StepOutcomeResult, DomainError> {
        if instance.status != InstanceStatus::Running {
            return Err(DomainError::NotRunning {
                instance_id: instance.id.clone(),
                status: instance.status,
            });
        }

        let execution = executions
            .iter_mut()
            .find(|execution| execution.step_id == *step_id)
            .ok_or_else(|| DomainError::not_found("step execution", step_id.0.clone()))?;

        if execution.status.is_terminal() {
            return Err(DomainError::StepAlreadyResolved {
                instance_id: instance.id.clone(),
                step_id: step_id.clone(),
                status: execution.status,
            });
        }

        execution.status = match outcome {
            StepOutcome::Success => StepStatus::Success,
            StepOutcome::Failed => StepStatus::Failed,
        };
        execution.executed_at = Some(now);
        execution.error = match outcome {
            StepOutcome::Failed => error,
            StepOutcome::Success => None,
        };
        let execution = execution.clone();

        let all_succeeded =
            executions.iter().all(|execution| execution.status == StepStatus::Success);
        let completed = all_succeeded && outcome == StepOutcome::Success;
        if completed {
            instance.status = InstanceStatus::Completed;
            instance.completed_at = Some(now);
        }

        Ok(StepOutcomeResult { instance, execution, completed })
    }

    /// Explicit operator close-out. Running -> Terminated, absorbing.
    /// `completed_at` stays empty: it marks successful completion only, and
    /// the close time lives on the audit trail.
    pub fn terminate(&self, mut instance: WorkflowInstance) -> Result<WorkflowInstance, DomainError> {
        if instance.status != InstanceStatus::Running {
            return Err(DomainError::AlreadyClosed {
                instance_id: instance.id.clone(),
                status: instance.status,
            });
        }
        instance.status = InstanceStatus::Terminated;
        Ok(instance)
    }
}
