use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use leadflow_core::domain::subject::SubjectId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub subject_id: SubjectId,
    pub contact: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("delivery endpoint returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, message: OutboundMessage) -> Result<(), DispatchError>;
}

/// Swallows every message. Used when notifications are disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn dispatch(&self, _message: OutboundMessage) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Captures messages for assertions in service tests.
#[derive(Default)]
pub struct RecordingDispatcher {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl RecordingDispatcher {
    pub fn messages(&self) -> Vec<OutboundMessage> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, message: OutboundMessage) -> Result<(), DispatchError> {
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use leadflow_core::domain::subject::SubjectId;

    use super::{NotificationDispatcher, OutboundMessage, RecordingDispatcher};

    #[tokio::test]
    async fn recording_dispatcher_keeps_messages_in_order() {
        let dispatcher = RecordingDispatcher::default();
        for body in ["first", "second"] {
            dispatcher
                .dispatch(OutboundMessage {
                    subject_id: SubjectId("car-1".to_string()),
                    contact: "+84 90 123 4567".to_string(),
                    body: body.to_string(),
                })
                .await
                .expect("dispatch");
        }

        let bodies: Vec<String> =
            dispatcher.messages().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["first".to_string(), "second".to_string()]);
    }
}
