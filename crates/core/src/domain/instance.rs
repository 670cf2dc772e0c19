use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::activation::FinalOutcome;
use crate::domain::catalog::{StepId, WorkflowId};
use crate::domain::subject::SubjectId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Completed,
    Terminated,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Terminated => "terminated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One runtime activation of a workflow definition for one subject.
///
/// At most one instance per (subject, workflow) may be Running at a time;
/// the store enforces this with a partial unique index, the engine with an
/// explicit pre-check. Status only ever moves Running -> Completed or
/// Running -> Terminated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: InstanceId,
    pub subject_id: SubjectId,
    pub workflow_id: WorkflowId,
    pub status: InstanceStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sla_deadline: DateTime<Utc>,
    /// Stamped on the parent when a follow-up activation classifies how
    /// this workflow ended; None until then.
    pub final_outcome: Option<FinalOutcome>,
}

impl WorkflowInstance {
    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }

    /// SLA deadlines are passive timestamps compared by external
    /// reporting, never active timers.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_running() && now > self.sla_deadline
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Success,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// The recorded outcome of one step for one instance. Created lazily as
/// Pending when the instance starts and updated at most once to a terminal
/// status; re-execution requires a new instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExecution {
    pub instance_id: InstanceId,
    pub step_id: StepId,
    pub status: StepStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
