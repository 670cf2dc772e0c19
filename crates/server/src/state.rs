use std::sync::Arc;

use leadflow_core::audit::AuditSink;
use leadflow_db::repositories::{CatalogRepository, InstanceRepository, SubjectRepository};
use leadflow_notify::NotificationDispatcher;

/// Shared handler state. Repositories are trait objects so the HTTP layer
/// tests against the in-memory store.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogRepository>,
    pub subjects: Arc<dyn SubjectRepository>,
    pub instances: Arc<dyn InstanceRepository>,
    pub audit: Arc<dyn AuditSink>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub notify_enabled: bool,
    pub counter_offer_offset: i64,
}
