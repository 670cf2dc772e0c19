//! Catalog administration routes.
//!
//! The catalog is read-mostly configuration data: stages, workflow
//! definitions, steps, transitions, and field schemas. Writes validate
//! referential integrity before touching the store; reads are
//! side-effect-free.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use leadflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use leadflow_core::domain::catalog::{
    Stage, StageId, StepId, TransitionId, WorkflowDefinition, WorkflowId, WorkflowStep,
    WorkflowTransition,
};
use leadflow_core::errors::DomainError;
use leadflow_core::fields::{FieldSpec, WorkflowFieldSchema};
use leadflow_db::repositories::{CatalogRepository, InstanceRepository};

use crate::errors::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/catalog/stages", get(list_stages).post(create_stage))
        .route("/api/v1/catalog/workflows", get(list_workflows).post(create_workflow))
        .route(
            "/api/v1/catalog/workflows/{id}",
            axum::routing::put(update_workflow).delete(delete_workflow),
        )
        .route("/api/v1/catalog/workflows/{id}/steps", get(list_steps).post(create_step))
        .route("/api/v1/catalog/workflows/{id}/fields", get(field_schema).post(create_field))
        .route("/api/v1/catalog/steps/{id}", delete(delete_step))
        .route("/api/v1/catalog/transitions", get(list_transitions).post(create_transition))
        .route("/api/v1/catalog/transitions/{id}", delete(delete_transition))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct StagePayload {
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowPayload {
    id: Option<String>,
    stage_id: String,
    name: String,
    #[serde(default)]
    description: String,
    sla_hours: i64,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct StepPayload {
    id: Option<String>,
    position: i64,
    #[serde(default)]
    automated: bool,
    message_template: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransitionPayload {
    id: Option<String>,
    source: Option<String>,
    target: String,
    #[serde(default)]
    condition: String,
    #[serde(default)]
    priority: i32,
    sla_override_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WorkflowFilter {
    stage_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransitionFilter {
    source: Option<String>,
}

fn fresh_id(explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::MissingField { field: field.to_string() });
    }
    Ok(())
}

async fn list_stages(State(state): State<AppState>) -> Result<Json<Vec<Stage>>, ApiError> {
    Ok(Json(state.catalog.list_stages().await?))
}

async fn create_stage(
    State(state): State<AppState>,
    Json(payload): Json<StagePayload>,
) -> Result<Json<Stage>, ApiError> {
    require_non_empty("name", &payload.name)?;

    let stage = Stage { id: StageId(fresh_id(payload.id)), name: payload.name };
    state.catalog.save_stage(stage.clone()).await?;
    emit_catalog_event(&state, "catalog.stage_saved", &stage.id.0);
    Ok(Json(stage))
}

async fn list_workflows(
    State(state): State<AppState>,
    Query(filter): Query<WorkflowFilter>,
) -> Result<Json<Vec<WorkflowDefinition>>, ApiError> {
    let stage = filter.stage_id.map(StageId);
    Ok(Json(state.catalog.list_workflows(stage.as_ref()).await?))
}

async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<WorkflowPayload>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    let workflow = WorkflowDefinition {
        id: WorkflowId(fresh_id(payload.id)),
        stage_id: StageId(payload.stage_id),
        name: payload.name,
        description: payload.description,
        sla_hours: payload.sla_hours,
        active: payload.active,
    };
    validate_workflow(&state, &workflow).await?;

    state.catalog.save_workflow(workflow.clone()).await?;
    emit_catalog_event(&state, "catalog.workflow_saved", &workflow.id.0);
    Ok(Json(workflow))
}

async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<WorkflowPayload>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    let id = WorkflowId(id);
    if state.catalog.find_workflow(&id).await?.is_none() {
        return Err(DomainError::not_found("workflow", id.0).into());
    }

    let workflow = WorkflowDefinition {
        id,
        stage_id: StageId(payload.stage_id),
        name: payload.name,
        description: payload.description,
        sla_hours: payload.sla_hours,
        active: payload.active,
    };
    validate_workflow(&state, &workflow).await?;

    state.catalog.save_workflow(workflow.clone()).await?;
    emit_catalog_event(&state, "catalog.workflow_saved", &workflow.id.0);
    Ok(Json(workflow))
}

async fn validate_workflow(
    state: &AppState,
    workflow: &WorkflowDefinition,
) -> Result<(), ApiError> {
    require_non_empty("name", &workflow.name)?;
    if workflow.sla_hours <= 0 {
        return Err(DomainError::InvalidField {
            field: "sla_hours".to_string(),
            reason: "must be a positive number of hours".to_string(),
        }
        .into());
    }
    if state.catalog.list_stages().await?.iter().all(|s| s.id != workflow.stage_id) {
        return Err(DomainError::not_found("stage", workflow.stage_id.0.clone()).into());
    }

    let siblings = state.catalog.list_workflows(Some(&workflow.stage_id)).await?;
    if siblings.iter().any(|w| w.name == workflow.name && w.id != workflow.id) {
        return Err(DomainError::DuplicateWorkflowName {
            stage_id: workflow.stage_id.0.clone(),
            name: workflow.name.clone(),
        }
        .into());
    }
    Ok(())
}

async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = WorkflowId(id);
    if state.catalog.find_workflow(&id).await?.is_none() {
        return Err(DomainError::not_found("workflow", id.0).into());
    }
    if state.instances.workflow_in_use(&id).await? {
        return Err(DomainError::DefinitionInUse(id).into());
    }

    state.catalog.delete_workflow(&id).await?;
    emit_catalog_event(&state, "catalog.workflow_deleted", &id.0);
    Ok(Json(serde_json::json!({ "deleted": id.0 })))
}

async fn list_steps(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<WorkflowStep>>, ApiError> {
    Ok(Json(state.catalog.list_steps(&WorkflowId(id)).await?))
}

async fn create_step(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<StepPayload>,
) -> Result<Json<WorkflowStep>, ApiError> {
    let workflow_id = WorkflowId(id);
    if state.catalog.find_workflow(&workflow_id).await?.is_none() {
        return Err(DomainError::not_found("workflow", workflow_id.0).into());
    }
    if payload.position < 0 {
        return Err(DomainError::InvalidField {
            field: "position".to_string(),
            reason: "must not be negative".to_string(),
        }
        .into());
    }

    let step = WorkflowStep {
        id: StepId(fresh_id(payload.id)),
        workflow_id: workflow_id.clone(),
        position: payload.position,
        automated: payload.automated,
        message_template: payload.message_template,
    };

    // Positions are strictly ordered; a colliding position would make the
    // execution order ambiguous.
    let existing = state.catalog.list_steps(&workflow_id).await?;
    if existing.iter().any(|s| s.position == step.position && s.id != step.id) {
        return Err(DomainError::InvalidField {
            field: "position".to_string(),
            reason: format!("position {} is already taken", step.position),
        }
        .into());
    }

    state.catalog.save_step(step.clone()).await?;
    emit_catalog_event(&state, "catalog.step_saved", &step.id.0);
    Ok(Json(step))
}

async fn delete_step(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.catalog.delete_step(&StepId(id.clone())).await?;
    emit_catalog_event(&state, "catalog.step_deleted", &id);
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn list_transitions(
    State(state): State<AppState>,
    Query(filter): Query<TransitionFilter>,
) -> Result<Json<Vec<WorkflowTransition>>, ApiError> {
    let source = filter.source.map(WorkflowId);
    Ok(Json(state.catalog.list_transitions(source.as_ref()).await?))
}

async fn create_transition(
    State(state): State<AppState>,
    Json(payload): Json<TransitionPayload>,
) -> Result<Json<WorkflowTransition>, ApiError> {
    let transition = WorkflowTransition {
        id: TransitionId(fresh_id(payload.id)),
        source: payload.source.map(WorkflowId),
        target: WorkflowId(payload.target),
        condition: payload.condition,
        priority: payload.priority,
        sla_override_hours: payload.sla_override_hours,
    };

    if transition.is_self_loop() {
        return Err(DomainError::SelfLoopTransition(transition.target).into());
    }
    if state.catalog.find_workflow(&transition.target).await?.is_none() {
        return Err(DomainError::not_found("workflow", transition.target.0).into());
    }
    if let Some(source) = &transition.source {
        if state.catalog.find_workflow(source).await?.is_none() {
            return Err(DomainError::not_found("workflow", source.0.clone()).into());
        }
    }

    state.catalog.save_transition(transition.clone()).await?;
    emit_catalog_event(&state, "catalog.transition_saved", &transition.id.0);
    Ok(Json(transition))
}

async fn delete_transition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.catalog.delete_transition(&TransitionId(id.clone())).await?;
    emit_catalog_event(&state, "catalog.transition_deleted", &id);
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn field_schema(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowFieldSchema>, ApiError> {
    Ok(Json(state.catalog.field_schema(&WorkflowId(id)).await?))
}

async fn create_field(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(field): Json<FieldSpec>,
) -> Result<Json<FieldSpec>, ApiError> {
    let workflow_id = WorkflowId(id);
    if state.catalog.find_workflow(&workflow_id).await?.is_none() {
        return Err(DomainError::not_found("workflow", workflow_id.0).into());
    }
    require_non_empty("name", &field.name)?;

    state.catalog.save_field(&workflow_id, field.clone()).await?;
    emit_catalog_event(&state, "catalog.field_saved", &field.name);
    Ok(Json(field))
}

fn emit_catalog_event(state: &AppState, event_type: &str, entity_id: &str) {
    state.audit.emit(
        AuditEvent::new(
            None,
            None,
            Uuid::new_v4().to_string(),
            event_type,
            AuditCategory::Catalog,
            "catalog-admin",
            AuditOutcome::Success,
        )
        .with_metadata("entity_id", entity_id),
    );
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use leadflow_core::domain::catalog::WorkflowId;
    use leadflow_core::domain::instance::{InstanceId, InstanceStatus, WorkflowInstance};
    use leadflow_core::domain::subject::SubjectId;
    use leadflow_db::repositories::InstanceRepository;

    use crate::state::testing::harness;

    use super::router;

    async fn send(
        app: &axum::Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => Request::builder().method(method).uri(uri).body(Body::empty()).expect("request"),
        };

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn seed_stage_and_workflow(app: &axum::Router) {
        let (status, _) = send(
            app,
            "POST",
            "/api/v1/catalog/stages",
            Some(json!({ "id": "S-1", "name": "Acquisition" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            app,
            "POST",
            "/api/v1/catalog/workflows",
            Some(json!({
                "id": "WF0",
                "stage_id": "S-1",
                "name": "First contact",
                "sla_hours": 24
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn workflow_creation_requires_an_existing_stage() {
        let app = router(harness().state);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/catalog/workflows",
            Some(json!({ "stage_id": "S-404", "name": "Auction", "sla_hours": 24 })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn duplicate_workflow_name_within_stage_conflicts() {
        let app = router(harness().state);
        seed_stage_and_workflow(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/catalog/workflows",
            Some(json!({
                "stage_id": "S-1",
                "name": "First contact",
                "sla_hours": 48
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "conflict");
    }

    #[tokio::test]
    async fn self_loop_transition_is_rejected() {
        let app = router(harness().state);
        seed_stage_and_workflow(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/catalog/transitions",
            Some(json!({ "source": "WF0", "target": "WF0" })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn colliding_step_position_is_rejected() {
        let app = router(harness().state);
        seed_stage_and_workflow(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/catalog/workflows/WF0/steps",
            Some(json!({ "position": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/catalog/workflows/WF0/steps",
            Some(json!({ "position": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field"], "position");
    }

    #[tokio::test]
    async fn workflow_with_instances_cannot_be_deleted() {
        let harness = harness();
        let now = chrono::Utc::now();
        harness
            .state
            .instances
            .save_instance(WorkflowInstance {
                id: InstanceId("I-1".to_string()),
                subject_id: SubjectId("car-1".to_string()),
                workflow_id: WorkflowId("WF0".to_string()),
                status: InstanceStatus::Terminated,
                started_at: now,
                completed_at: None,
                sla_deadline: now,
                final_outcome: None,
            })
            .await
            .expect("seed instance");
        let app = router(harness.state);
        seed_stage_and_workflow(&app).await;

        let (status, body) = send(&app, "DELETE", "/api/v1/catalog/workflows/WF0", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "conflict");

        // Deactivation remains available.
        let (status, body) = send(
            &app,
            "PUT",
            "/api/v1/catalog/workflows/WF0",
            Some(json!({
                "stage_id": "S-1",
                "name": "First contact",
                "sla_hours": 24,
                "active": false
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], false);
    }

    #[tokio::test]
    async fn field_schema_round_trips_through_the_api() {
        let app = router(harness().state);
        seed_stage_and_workflow(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/catalog/workflows/WF0/fields",
            Some(json!({
                "name": "channel",
                "kind": { "type": "select", "options": ["phone", "zalo"] },
                "required": true
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/api/v1/catalog/workflows/WF0/fields", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fields"][0]["name"], "channel");
        assert_eq!(body["fields"][0]["required"], true);
    }
}
