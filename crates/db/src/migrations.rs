use sqlx::migrate::{MigrateError, MigrationType, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Runs pending migrations and reports the versions applied by this call.
/// An empty list means the schema was already current.
pub async fn run_pending(pool: &DbPool) -> Result<Vec<i64>, MigrateError> {
    let already = applied_versions(pool).await?;
    MIGRATOR.run(pool).await?;
    Ok(MIGRATOR
        .iter()
        .filter(|m| !matches!(m.migration_type, MigrationType::ReversibleDown))
        .map(|m| m.version)
        .filter(|version| !already.contains(version))
        .collect())
}

async fn applied_versions(pool: &DbPool) -> Result<Vec<i64>, MigrateError> {
    let has_ledger: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await
    .map_err(MigrateError::from)?;
    if has_ledger == 0 {
        return Ok(Vec::new());
    }
    sqlx::query_scalar("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .map_err(MigrateError::from)
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_url, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "stage",
        "workflow_definition",
        "workflow_step",
        "workflow_transition",
        "workflow_field",
        "subject",
        "workflow_instance",
        "step_execution",
        "activation_record",
        "idx_workflow_instance_running",
        "idx_workflow_definition_stage_id",
        "idx_workflow_step_workflow_id",
        "idx_workflow_transition_source",
        "idx_workflow_instance_subject_id",
        "idx_step_execution_instance_id",
        "idx_activation_record_instance_id",
    ];

    async fn table_exists(pool: &sqlx::SqlitePool, name: &str) -> bool {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("query sqlite_master")
        .get::<i64, _>("count")
            == 1
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_url("sqlite::memory:").await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in [
            "stage",
            "workflow_definition",
            "workflow_step",
            "workflow_transition",
            "workflow_field",
            "subject",
            "workflow_instance",
            "step_execution",
            "activation_record",
        ] {
            assert!(table_exists(&pool, table).await, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn running_uniqueness_index_is_partial() {
        let pool = connect_url("sqlite::memory:").await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let sql = sqlx::query(
            "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = 'idx_workflow_instance_running'",
        )
        .fetch_one(&pool)
        .await
        .expect("index exists")
        .get::<String, _>("sql");

        assert!(sql.contains("WHERE status = 'running'"));
    }

    #[tokio::test]
    async fn run_pending_reports_newly_applied_versions() {
        let pool = connect_url("sqlite::memory:").await.expect("connect");

        let first = run_pending(&pool).await.expect("first run");
        assert_eq!(first, vec![1]);

        let second = run_pending(&pool).await.expect("second run");
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_url("sqlite::memory:").await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert!(!table_exists(&pool, "workflow_instance").await);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_url("sqlite::memory:").await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
