//! Outbound messaging boundary.
//!
//! Workflow steps can carry a message template; when an activation starts a
//! workflow, rendered messages go out through a `NotificationDispatcher`.
//! Delivery is fire-and-forget from the coordinator's point of view: a
//! failed dispatch is logged, never rolled back.

pub mod dispatcher;
pub mod message;
pub mod webhook;

pub use dispatcher::{
    DispatchError, NoopDispatcher, NotificationDispatcher, OutboundMessage, RecordingDispatcher,
};
pub use message::{render_template, template_values, RenderError};
pub use webhook::WebhookDispatcher;
