//! Activation preconditions, record construction, and recommendation
//! alignment.
//!
//! Everything here is pure. The coordinator service (server crate) loads
//! the data, calls these functions in order, and commits the result as one
//! atomic store write.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::activation::{
    ActivationId, ActivationKind, ActivationRecord, ActivationRequest, RecommendationAlignment,
};
use crate::domain::instance::{InstanceId, InstanceStatus, WorkflowInstance};
use crate::domain::subject::SubjectSnapshot;
use crate::errors::DomainError;
use crate::fields::WorkflowFieldSchema;

/// Validates an activation request, failing fast on the first violation.
///
/// Order matters and is part of the contract: follow-mode default fields,
/// then schema-required custom fields, then parent state, then the
/// single-active-instance invariant. `parent` must be the instance named
/// by the request (or None when the request is entry-mode or the named
/// instance does not exist); `subject_instances` is the subject's full
/// instance history.
pub fn validate_activation(
    request: &ActivationRequest,
    schema: &WorkflowFieldSchema,
    parent: Option<&WorkflowInstance>,
    subject_instances: &[WorkflowInstance],
) -> Result<(), DomainError> {
    if let ActivationKind::Follow { rationale, .. } = &request.kind {
        if rationale.trim().is_empty() {
            return Err(DomainError::MissingField { field: "rationale".to_string() });
        }
    }

    schema.validate(&request.custom_fields)?;

    if let Some(parent_id) = request.kind.parent_instance_id() {
        let parent = parent
            .ok_or_else(|| DomainError::not_found("parent instance", parent_id.0.clone()))?;
        if parent.status != InstanceStatus::Completed {
            return Err(DomainError::ParentNotCompleted {
                instance_id: parent.id.clone(),
                status: parent.status,
            });
        }
    }

    if let Some(running) = subject_instances
        .iter()
        .find(|i| i.workflow_id == request.workflow_id && i.status == InstanceStatus::Running)
    {
        return Err(DomainError::RunningInstanceExists {
            subject_id: request.subject_id.clone(),
            workflow_id: request.workflow_id.clone(),
            instance_id: running.id.clone(),
        });
    }

    Ok(())
}

/// Compares the operator's chosen target with the recommended one. This is
/// a comparison, not a judgment: the recommendation itself is never
/// validated here.
pub fn align_recommendation(
    request: &ActivationRequest,
    recommendation_id: impl Into<String>,
    recommended_workflow: &crate::domain::catalog::WorkflowId,
) -> RecommendationAlignment {
    RecommendationAlignment {
        recommendation_id: recommendation_id.into(),
        aligned: request.workflow_id == *recommended_workflow,
    }
}

/// Assembles the append-only audit record for a validated request. The
/// snapshot is copied here so later subject edits cannot reach it.
pub fn build_record(
    request: &ActivationRequest,
    instance_id: InstanceId,
    snapshot: SubjectSnapshot,
    recommendation: Option<RecommendationAlignment>,
    now: DateTime<Utc>,
) -> ActivationRecord {
    let (parent_instance_id, parent_outcome, rationale) = match &request.kind {
        ActivationKind::Entry => (None, None, None),
        ActivationKind::Follow { parent_instance_id, parent_outcome, rationale } => {
            (Some(parent_instance_id.clone()), Some(*parent_outcome), Some(rationale.clone()))
        }
    };

    ActivationRecord {
        id: ActivationId(Uuid::new_v4().to_string()),
        instance_id,
        parent_instance_id,
        workflow_id: request.workflow_id.clone(),
        parent_outcome,
        rationale,
        snapshot,
        custom_fields: request.custom_fields.clone(),
        recommendation,
        created_at: now,
    }
}
