use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::catalog::WorkflowId;
use crate::domain::instance::InstanceId;
use crate::domain::subject::{SubjectId, SubjectSnapshot};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationId(pub String);

/// Final-outcome classification stamped on the *parent* instance when a
/// transition is exercised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalOutcome {
    Discount,
    OriginalPrice,
    Lost,
}

impl FinalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discount => "discount",
            Self::OriginalPrice => "original_price",
            Self::Lost => "lost",
        }
    }
}

/// Whether the operator's chosen target matched an externally computed
/// recommendation. A comparison, not a judgment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationAlignment {
    pub recommendation_id: String,
    pub aligned: bool,
}

/// How an activation enters the graph. Entry activations have no
/// predecessor and carry neither a parent outcome nor a rationale; follow
/// activations close out a completed parent instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ActivationKind {
    Entry,
    Follow {
        parent_instance_id: InstanceId,
        parent_outcome: FinalOutcome,
        rationale: String,
    },
}

impl ActivationKind {
    pub fn parent_instance_id(&self) -> Option<&InstanceId> {
        match self {
            Self::Entry => None,
            Self::Follow { parent_instance_id, .. } => Some(parent_instance_id),
        }
    }
}

/// Operator input to the activation coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub subject_id: SubjectId,
    pub workflow_id: WorkflowId,
    pub kind: ActivationKind,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    pub recommendation_id: Option<String>,
}

/// Append-only audit artifact produced when a transition is exercised.
/// Written atomically with the new instance and never mutated afterward.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub id: ActivationId,
    pub instance_id: InstanceId,
    pub parent_instance_id: Option<InstanceId>,
    pub workflow_id: WorkflowId,
    pub parent_outcome: Option<FinalOutcome>,
    pub rationale: Option<String>,
    pub snapshot: SubjectSnapshot,
    pub custom_fields: BTreeMap<String, String>,
    pub recommendation: Option<RecommendationAlignment>,
    pub created_at: DateTime<Utc>,
}
