//! Declarative custom-field schemas, keyed by workflow.
//!
//! Each workflow may require extra operator input at activation time. The
//! schema is data, not code: a list of typed field specs validated against
//! the custom-field payload before anything is persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::WorkflowId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Select { options: Vec<String> },
    Textarea,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFieldSchema {
    pub workflow_id: WorkflowId,
    pub fields: Vec<FieldSpec>,
}

impl WorkflowFieldSchema {
    pub fn empty(workflow_id: WorkflowId) -> Self {
        Self { workflow_id, fields: Vec::new() }
    }

    /// Checks the payload against the schema: required fields must carry a
    /// non-empty value, select fields must use a configured option, number
    /// fields must parse. Fails on the first violation so the operator
    /// sees one concrete field to fix.
    pub fn validate(&self, values: &BTreeMap<String, String>) -> Result<(), DomainError> {
        for spec in &self.fields {
            let value = values.get(&spec.name).map(String::as_str).unwrap_or("");
            if value.trim().is_empty() {
                if spec.required {
                    return Err(DomainError::MissingField { field: spec.name.clone() });
                }
                continue;
            }
            match &spec.kind {
                FieldKind::Number => {
                    if value.trim().parse::<f64>().is_err() {
                        return Err(DomainError::InvalidField {
                            field: spec.name.clone(),
                            reason: format!("`{value}` is not a number"),
                        });
                    }
                }
                FieldKind::Select { options } => {
                    if !options.iter().any(|option| option == value) {
                        return Err(DomainError::InvalidField {
                            field: spec.name.clone(),
                            reason: format!("`{value}` is not one of the configured options"),
                        });
                    }
                }
                FieldKind::Text | FieldKind::Date | FieldKind::Textarea => {}
            }
        }
        Ok(())
    }
}
