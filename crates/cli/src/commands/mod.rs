pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::from_outcome(
            CommandOutcome {
                command: command.to_string(),
                status: "ok".to_string(),
                error_class: None,
                message: message.into(),
                details: None,
            },
            0,
        )
    }

    /// Success with a structured payload alongside the human message, so
    /// scripts do not have to parse prose.
    pub fn success_with_details(
        command: &str,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self::from_outcome(
            CommandOutcome {
                command: command.to_string(),
                status: "ok".to_string(),
                error_class: None,
                message: message.into(),
                details: Some(details),
            },
            0,
        )
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::from_outcome(
            CommandOutcome {
                command: command.to_string(),
                status: "error".to_string(),
                error_class: Some(error_class.to_string()),
                message: message.into(),
                details: None,
            },
            exit_code,
        )
    }

    fn from_outcome(outcome: CommandOutcome, exit_code: u8) -> Self {
        Self { exit_code, output: serialize_payload(outcome) }
    }
}

/// One-shot commands block on a single-threaded runtime.
pub(crate) fn current_thread_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
