use std::sync::Arc;

use axum::Router;
use leadflow_core::config::{AppConfig, ConfigError, LoadOptions};
use leadflow_db::repositories::{
    SqlCatalogRepository, SqlInstanceRepository, SqlSubjectRepository,
};
use leadflow_db::{connect, migrations, DbPool};
use leadflow_notify::{DispatchError, NoopDispatcher, NotificationDispatcher, WebhookDispatcher};
use thiserror::Error;
use tracing::info;

use crate::audit::TracingAuditSink;
use crate::state::AppState;
use crate::{activation, catalog, health, runtime};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notification dispatcher initialization failed: {0}")]
    Notify(#[source] DispatchError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    let applied = migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        applied = applied.len(),
        "database migrations applied"
    );

    Ok(Application { config, db_pool })
}

pub fn build_router(app: &Application) -> Result<Router, BootstrapError> {
    let dispatcher: Arc<dyn NotificationDispatcher> = match &app.config.notify {
        notify if notify.enabled => match &notify.webhook_url {
            Some(url) => Arc::new(
                WebhookDispatcher::new(url.clone(), notify.webhook_token.clone())
                    .map_err(BootstrapError::Notify)?,
            ),
            None => Arc::new(NoopDispatcher),
        },
        _ => Arc::new(NoopDispatcher),
    };

    let state = AppState {
        catalog: Arc::new(SqlCatalogRepository::new(app.db_pool.clone())),
        subjects: Arc::new(SqlSubjectRepository::new(app.db_pool.clone())),
        instances: Arc::new(SqlInstanceRepository::new(app.db_pool.clone())),
        audit: Arc::new(TracingAuditSink),
        dispatcher,
        notify_enabled: app.config.notify.enabled,
        counter_offer_offset: app.config.notify.counter_offer_offset,
    };

    Ok(Router::new()
        .merge(health::router(app.db_pool.clone()))
        .merge(catalog::router(state.clone()))
        .merge(runtime::router(state.clone()))
        .merge(activation::router(state)))
}

#[cfg(test)]
mod tests {
    use leadflow_core::config::{ConfigOverrides, LoadOptions};

    use super::{bootstrap, build_router};

    #[tokio::test]
    async fn bootstrap_connects_migrates_and_builds_the_router() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table'
               AND name IN ('workflow_definition', 'workflow_instance', 'activation_record')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables after bootstrap");
        assert_eq!(table_count, 3);

        let _router = build_router(&app).expect("router");
        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_configuration() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("  ".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
    }
}
