//! Domain-to-HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use leadflow_core::errors::{ApplicationError, DomainError, ErrorKind};
use leadflow_db::repositories::RepositoryError;

/// Typed error body returned by every API route.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::Conflict => "conflict",
        ErrorKind::InvalidState => "invalid_state",
        ErrorKind::NotFound => "not_found",
    }
}

fn kind_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Conflict | ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
    }
}

fn offending_field(error: &DomainError) -> Option<String> {
    match error {
        DomainError::MissingField { field } | DomainError::InvalidField { field, .. } => {
            Some(field.clone())
        }
        _ => None,
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        let kind = error.kind();
        Self {
            status: kind_status(kind),
            body: ErrorBody {
                error: error.to_string(),
                kind: kind_label(kind),
                field: offending_field(&error),
            },
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::RunningConflict { subject_id, workflow_id } => Self {
                status: StatusCode::CONFLICT,
                body: ErrorBody {
                    error: format!(
                        "a running instance already exists for subject {subject_id} and workflow {workflow_id}"
                    ),
                    kind: "conflict",
                    field: None,
                },
            },
            other => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: ErrorBody {
                    error: other.to_string(),
                    kind: "unavailable",
                    field: None,
                },
            },
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(domain) => domain.into(),
            other => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: ErrorBody { error: other.to_string(), kind: "unavailable", field: None },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
