//! Subject board and instance lifecycle routes.
//!
//! The board is the single read model the operator UI renders: subject
//! details, instance history with executions, the full catalog graph, and
//! the transitions the subject may exercise next. Lifecycle writes go
//! through the pure engine; this module only loads, calls, and persists.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use leadflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use leadflow_core::domain::catalog::{
    StepId, WorkflowDefinition, WorkflowId, WorkflowStep, WorkflowTransition,
};
use leadflow_core::domain::instance::{InstanceId, InstanceStatus, StepExecution, WorkflowInstance};
use leadflow_core::domain::subject::{Subject, SubjectId};
use leadflow_core::errors::DomainError;
use leadflow_core::evaluator::{eligible_transitions, select_default_workflow};
use leadflow_core::lifecycle::{LifecycleEngine, StepOutcome};
use leadflow_db::repositories::{CatalogRepository, InstanceRepository, SubjectRepository};

use crate::errors::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/subjects/{id}", put(upsert_subject))
        .route("/api/v1/subjects/{id}/board", get(board))
        .route("/api/v1/instances/{id}/steps/{step_id}/outcome", post(record_step_outcome))
        .route("/api/v1/instances/{id}/terminate", post(terminate_instance))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct BoardInstance {
    #[serde(flatten)]
    instance: WorkflowInstance,
    executions: Vec<StepExecution>,
}

/// Everything the board view needs in one response, so the UI never has to
/// stitch catalog and runtime reads together itself.
#[derive(Debug, Serialize)]
struct BoardResponse {
    subject: Subject,
    instances: Vec<BoardInstance>,
    all_workflows: Vec<WorkflowDefinition>,
    all_transitions: Vec<WorkflowTransition>,
    all_workflow_steps: BTreeMap<String, Vec<WorkflowStep>>,
    eligible_transitions: Vec<WorkflowTransition>,
    default_workflow: Option<WorkflowId>,
}

async fn board(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BoardResponse>, ApiError> {
    let subject_id = SubjectId(id);
    let subject = state
        .subjects
        .find_by_id(&subject_id)
        .await?
        .ok_or_else(|| DomainError::not_found("subject", subject_id.0.clone()))?;

    let instances = state.instances.list_for_subject(&subject_id).await?;
    let mut board_instances = Vec::with_capacity(instances.len());
    for instance in &instances {
        let executions = state.instances.list_executions(&instance.id).await?;
        board_instances.push(BoardInstance { instance: instance.clone(), executions });
    }

    let all_workflows = state.catalog.list_workflows(None).await?;
    let all_transitions = state.catalog.list_transitions(None).await?;
    let mut all_workflow_steps = BTreeMap::new();
    for workflow in &all_workflows {
        all_workflow_steps
            .insert(workflow.id.0.clone(), state.catalog.list_steps(&workflow.id).await?);
    }

    let current = current_instance(&instances);
    let eligible = eligible_transitions(current, &all_transitions, &instances);
    let default_workflow = select_default_workflow(&instances, &all_workflows);

    Ok(Json(BoardResponse {
        subject,
        instances: board_instances,
        all_workflows,
        all_transitions,
        all_workflow_steps,
        eligible_transitions: eligible,
        default_workflow,
    }))
}

/// The instance the board treats as "where the subject is": the running
/// one if any, otherwise the most recently completed one. All-terminated
/// history yields None, which re-offers the entry edges.
fn current_instance(instances: &[WorkflowInstance]) -> Option<&WorkflowInstance> {
    instances
        .iter()
        .find(|i| i.status == InstanceStatus::Running)
        .or_else(|| {
            instances
                .iter()
                .filter(|i| i.status == InstanceStatus::Completed)
                .max_by_key(|i| i.completed_at)
        })
}

#[derive(Debug, Deserialize)]
struct SubjectPayload {
    display_name: String,
    intention: String,
    sale_stage: String,
    qualification: String,
    asking_price: Option<Decimal>,
    highest_bid: Option<Decimal>,
    contact: Option<String>,
}

async fn upsert_subject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SubjectPayload>,
) -> Result<Json<Subject>, ApiError> {
    if payload.display_name.trim().is_empty() {
        return Err(DomainError::MissingField { field: "display_name".to_string() }.into());
    }

    let subject = Subject {
        id: SubjectId(id),
        display_name: payload.display_name,
        intention: payload.intention,
        sale_stage: payload.sale_stage,
        qualification: payload.qualification,
        asking_price: payload.asking_price,
        highest_bid: payload.highest_bid,
        contact: payload.contact,
    };
    state.subjects.save(subject.clone()).await?;
    Ok(Json(subject))
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OutcomeCode {
    Success,
    Failed,
}

#[derive(Debug, Deserialize)]
struct StepOutcomePayload {
    outcome: OutcomeCode,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct StepOutcomeResponse {
    instance: WorkflowInstance,
    execution: StepExecution,
    completed: bool,
}

async fn record_step_outcome(
    State(state): State<AppState>,
    Path((id, step_id)): Path<(String, String)>,
    Json(payload): Json<StepOutcomePayload>,
) -> Result<Json<StepOutcomeResponse>, ApiError> {
    let instance_id = InstanceId(id);
    let step_id = StepId(step_id);
    let instance = state
        .instances
        .find_by_id(&instance_id)
        .await?
        .ok_or_else(|| DomainError::not_found("instance", instance_id.0.clone()))?;
    let executions = state.instances.list_executions(&instance_id).await?;

    let outcome = match payload.outcome {
        OutcomeCode::Success => StepOutcome::Success,
        OutcomeCode::Failed => StepOutcome::Failed,
    };
    let result = LifecycleEngine::new().record_step_outcome(
        instance,
        executions,
        &step_id,
        outcome,
        payload.error,
        Utc::now(),
    )?;

    // One transaction: a completed instance must never land without its
    // final execution, and vice versa.
    state.instances.save_step_result(result.instance.clone(), result.execution.clone()).await?;

    state.audit.emit(
        AuditEvent::new(
            Some(result.instance.subject_id.clone()),
            Some(result.instance.id.clone()),
            Uuid::new_v4().to_string(),
            "workflow.step_recorded",
            AuditCategory::Lifecycle,
            "lifecycle-service",
            AuditOutcome::Success,
        )
        .with_metadata("step_id", step_id.0.as_str())
        .with_metadata("status", result.execution.status.as_str())
        .with_metadata("completed", if result.completed { "true" } else { "false" }),
    );

    Ok(Json(StepOutcomeResponse {
        instance: result.instance,
        execution: result.execution,
        completed: result.completed,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct TerminatePayload {
    #[serde(default)]
    reason: String,
}

async fn terminate_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<TerminatePayload>,
) -> Result<Json<WorkflowInstance>, ApiError> {
    let instance_id = InstanceId(id);
    let instance = state
        .instances
        .find_by_id(&instance_id)
        .await?
        .ok_or_else(|| DomainError::not_found("instance", instance_id.0.clone()))?;

    let terminated = LifecycleEngine::new().terminate(instance)?;
    state.instances.save_instance(terminated.clone()).await?;

    state.audit.emit(
        AuditEvent::new(
            Some(terminated.subject_id.clone()),
            Some(terminated.id.clone()),
            Uuid::new_v4().to_string(),
            "workflow.instance_terminated",
            AuditCategory::Lifecycle,
            "lifecycle-service",
            AuditOutcome::Success,
        )
        .with_metadata("reason", payload.reason.as_str()),
    );

    Ok(Json(terminated))
}
