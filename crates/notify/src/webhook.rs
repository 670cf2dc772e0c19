use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::dispatcher::{DispatchError, NotificationDispatcher, OutboundMessage};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts each message as JSON to a configured webhook. The actual SMS/chat
/// gateway lives behind that URL; this crate only owns the handoff.
pub struct WebhookDispatcher {
    client: Client,
    url: String,
    token: Option<SecretString>,
}

impl WebhookDispatcher {
    /// The client carries hard timeouts: a hung gateway must cap out as a
    /// failed dispatch, never hold a delivery open indefinitely.
    pub fn new(url: String, token: Option<SecretString>) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch(&self, message: OutboundMessage) -> Result<(), DispatchError> {
        let mut request = self.client.post(&self.url).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Status(status.as_u16()));
        }

        debug!(
            event_name = "notify.webhook_delivered",
            subject_id = %message.subject_id.0,
            "outbound message delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::WebhookDispatcher;

    #[test]
    fn builds_a_client_with_timeouts() {
        WebhookDispatcher::new("https://hooks.example.com/leadflow".to_string(), None)
            .expect("dispatcher");
    }
}
