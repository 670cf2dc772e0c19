use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};

use leadflow_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens the pool described by `config`. Every connection carries the same
/// pragma set: foreign keys enforced, WAL so board reads keep flowing while
/// an activation commits, and a busy timeout so a held write lock degrades
/// into a slow request instead of an immediate SQLITE_BUSY.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(config.timeout_secs.clamp(1, 30)));

    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .connect_with(options)
        .await
}

/// Single-connection pool over a bare URL, for one-shot tooling and tests.
pub async fn connect_url(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect(&DatabaseConfig {
        url: database_url.to_string(),
        max_connections: 1,
        timeout_secs: 5,
    })
    .await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::connect_url;

    #[tokio::test]
    async fn connections_enforce_foreign_keys() {
        let pool = connect_url("sqlite::memory:").await.expect("connect");

        let enabled: i64 = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("pragma")
            .get(0);

        assert_eq!(enabled, 1);
    }
}
