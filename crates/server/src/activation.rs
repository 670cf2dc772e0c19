//! The activation coordinator.
//!
//! Activating a workflow for a subject is the one multi-entity write in
//! the system: validate the request, start the instance, build the
//! append-only record, and commit everything through the store in a
//! single atomic unit. Step notifications render after the commit and can
//! only ever produce warnings; delivery runs on a background task so a
//! slow gateway never holds the response open, and a failed delivery
//! never rolls back an activation.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use leadflow_core::activation::{align_recommendation, build_record, validate_activation};
use leadflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use leadflow_core::domain::activation::{ActivationKind, ActivationRecord, ActivationRequest};
use leadflow_core::domain::catalog::{StepId, WorkflowId, WorkflowStep, WorkflowTransition};
use leadflow_core::domain::instance::{InstanceId, WorkflowInstance};
use leadflow_core::domain::subject::{Subject, SubjectId};
use leadflow_core::errors::DomainError;
use leadflow_core::lifecycle::LifecycleEngine;
use leadflow_db::repositories::{
    CatalogRepository, InstanceRepository, NewActivation, RepositoryError, SubjectRepository,
};
use leadflow_notify::{render_template, template_values, OutboundMessage};

use crate::errors::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/subjects/{id}/activations", post(activate))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ActivationPayload {
    workflow_id: String,
    #[serde(flatten)]
    kind: ActivationKind,
    #[serde(default)]
    custom_fields: BTreeMap<String, String>,
    recommendation_id: Option<String>,
    recommended_workflow_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ActivationResponse {
    instance: WorkflowInstance,
    record: ActivationRecord,
    warnings: Vec<String>,
}

async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ActivationPayload>,
) -> Result<Json<ActivationResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let subject_id = SubjectId(id);
    let subject = state
        .subjects
        .find_by_id(&subject_id)
        .await?
        .ok_or_else(|| DomainError::not_found("subject", subject_id.0.clone()))?;

    let workflow_id = WorkflowId(payload.workflow_id);
    let workflow = state
        .catalog
        .find_workflow(&workflow_id)
        .await?
        .ok_or_else(|| DomainError::not_found("workflow", workflow_id.0.clone()))?;
    if !workflow.active {
        return Err(DomainError::InvalidField {
            field: "workflow_id".to_string(),
            reason: format!("workflow {} is deactivated", workflow_id.0),
        }
        .into());
    }

    let request = ActivationRequest {
        subject_id: subject_id.clone(),
        workflow_id: workflow_id.clone(),
        kind: payload.kind,
        custom_fields: payload.custom_fields,
        recommendation_id: payload.recommendation_id,
    };

    let schema = state.catalog.field_schema(&workflow_id).await?;
    let parent = match request.kind.parent_instance_id() {
        Some(parent_id) => state.instances.find_by_id(parent_id).await?,
        None => None,
    };
    let history = state.instances.list_for_subject(&subject_id).await?;
    validate_activation(&request, &schema, parent.as_ref(), &history)?;

    let transition = matching_transition(&state, parent.as_ref(), &workflow_id).await?;
    let sla_override = transition.and_then(|t| t.sla_override_hours);
    let steps = state.catalog.list_steps(&workflow_id).await?;

    let now = Utc::now();
    let (instance, executions) =
        LifecycleEngine::new().start(&workflow, &steps, subject_id.clone(), sla_override, now);

    // Alignment needs both halves of the recommendation; a bare id with no
    // target to compare against is recorded as no recommendation at all.
    let recommendation = match (&request.recommendation_id, &payload.recommended_workflow_id) {
        (Some(recommendation_id), Some(recommended)) => Some(align_recommendation(
            &request,
            recommendation_id.clone(),
            &WorkflowId(recommended.clone()),
        )),
        _ => None,
    };

    let record =
        build_record(&request, instance.id.clone(), subject.snapshot(), recommendation, now);
    let parent_stamp = match &request.kind {
        ActivationKind::Entry => None,
        ActivationKind::Follow { parent_instance_id, parent_outcome, .. } => {
            Some((parent_instance_id.clone(), *parent_outcome))
        }
    };

    state
        .instances
        .record_activation(NewActivation {
            parent: parent_stamp,
            instance: instance.clone(),
            executions,
            record: record.clone(),
        })
        .await?;

    state.audit.emit(
        AuditEvent::new(
            Some(subject_id.clone()),
            Some(instance.id.clone()),
            correlation_id.clone(),
            "workflow.instance_started",
            AuditCategory::Lifecycle,
            "lifecycle-service",
            AuditOutcome::Success,
        )
        .with_metadata("workflow_id", workflow_id.0.as_str()),
    );
    state.audit.emit(
        AuditEvent::new(
            Some(subject_id.clone()),
            Some(instance.id.clone()),
            correlation_id.clone(),
            "workflow.activation_committed",
            AuditCategory::Activation,
            "activation-service",
            AuditOutcome::Success,
        )
        .with_metadata("workflow_id", workflow_id.0.as_str())
        .with_metadata(
            "mode",
            match &request.kind {
                ActivationKind::Entry => "entry",
                ActivationKind::Follow { .. } => "follow",
            },
        ),
    );

    let (messages, warnings) = if state.notify_enabled {
        render_step_notifications(&subject, &record, &steps, state.counter_offer_offset)
    } else {
        (Vec::new(), Vec::new())
    };
    spawn_delivery(&state, record.instance_id.clone(), messages, correlation_id);

    Ok(Json(ActivationResponse { instance, record, warnings }))
}

/// The transition being exercised, when the catalog has one: the
/// lowest-priority edge into the target from the parent's workflow, or an
/// entry edge when there is no parent. Activation does not require an
/// edge; without one there is simply no SLA override.
async fn matching_transition(
    state: &AppState,
    parent: Option<&WorkflowInstance>,
    target: &WorkflowId,
) -> Result<Option<WorkflowTransition>, RepositoryError> {
    let mut candidates: Vec<WorkflowTransition> = match parent {
        Some(parent) => state.catalog.list_transitions(Some(&parent.workflow_id)).await?,
        None => state.catalog.list_entry_transitions().await?,
    };
    candidates.retain(|t| t.target == *target);
    candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.0.cmp(&b.id.0)));
    Ok(candidates.into_iter().next())
}

/// Renders one message per templated step. A missing contact or a template
/// error is a warning on the response, never an error: the activation is
/// already committed.
fn render_step_notifications(
    subject: &Subject,
    record: &ActivationRecord,
    steps: &[WorkflowStep],
    counter_offer_offset: i64,
) -> (Vec<(StepId, OutboundMessage)>, Vec<String>) {
    let mut messages = Vec::new();
    let mut warnings = Vec::new();
    let templated: Vec<&WorkflowStep> =
        steps.iter().filter(|step| step.message_template.is_some()).collect();
    if templated.is_empty() {
        return (messages, warnings);
    }

    let Some(contact) = subject.contact.clone() else {
        warnings.push(format!(
            "subject {} has no contact; {} notifications skipped",
            subject.id.0,
            templated.len()
        ));
        return (messages, warnings);
    };

    let values = template_values(&record.snapshot, &record.custom_fields, counter_offer_offset);
    for step in templated {
        let Some(template) = &step.message_template else { continue };
        match render_template(template, &values) {
            Ok(body) => messages.push((
                step.id.clone(),
                OutboundMessage { subject_id: subject.id.clone(), contact: contact.clone(), body },
            )),
            Err(error) => {
                warnings.push(format!("notification for step {} not sent: {error}", step.id.0));
            }
        }
    }
    (messages, warnings)
}

/// Hands rendered messages to a background task, keeping delivery off the
/// request path. Failed dispatches are logged and audited.
fn spawn_delivery(
    state: &AppState,
    instance_id: InstanceId,
    messages: Vec<(StepId, OutboundMessage)>,
    correlation_id: String,
) {
    if messages.is_empty() {
        return;
    }
    let dispatcher = state.dispatcher.clone();
    let audit = state.audit.clone();
    tokio::spawn(async move {
        for (step_id, message) in messages {
            let subject_id = message.subject_id.clone();
            if let Err(error) = dispatcher.dispatch(message).await {
                warn!(
                    event_name = "notify.dispatch_failed",
                    correlation_id = %correlation_id,
                    step_id = %step_id.0,
                    error = %error,
                    "notification delivery failed"
                );
                audit.emit(
                    AuditEvent::new(
                        Some(subject_id),
                        Some(instance_id.clone()),
                        correlation_id.clone(),
                        "notify.dispatch_failed",
                        AuditCategory::Notification,
                        "notify-service",
                        AuditOutcome::Failed,
                    )
                    .with_metadata("step_id", step_id.0.as_str()),
                );
            }
        }
    });
}
