use std::{collections::BTreeMap, str::FromStr};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Row, SqlitePool,
};
use tracing::info;

use super::error::SqlError;
use crate::persistence::PollStore;

/// Connect to `database_url` and bring its schema up to date.
///
/// An in-memory database only lives as long as its connection, so the pool
/// is held to a single connection in that case.
pub async fn open_pool(database_url: &str) -> Result<SqlitePool, SqlError> {
    let in_memory = database_url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    if !in_memory {
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
    }
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 4 })
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Opened database {}", database_url);
    Ok(pool)
}

/// A poll store backed by sqlite.
#[derive(Debug, Clone)]
pub struct SqlitePollStore {
    /// Connection pool
    pool: SqlitePool,
}

impl SqlitePollStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a poll offering `options`, returning its id.
    pub async fn create_poll(&self, title: &str, options: &[&str]) -> Result<i64, SqlError> {
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            r#"
                INSERT INTO polls (title)
                VALUES (?1)
            "#,
        )
        .bind(title)
        .execute(&mut tx)
        .await?
        .last_insert_rowid();
        for option in options {
            sqlx::query(
                r#"
                    INSERT INTO poll_options (poll_id, option)
                    VALUES (?1, ?2)
                "#,
            )
            .bind(id)
            .bind(*option)
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(id)
    }

    /// The current results of a poll, by option.
    pub async fn results(&self, poll_id: i64) -> Result<BTreeMap<String, i64>, SqlError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
                SELECT option, results
                FROM poll_options
                WHERE poll_id = ?1
            "#,
        )
        .bind(poll_id)
        .fetch_all(&mut conn)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("option"), r.get::<i64, _>("results")))
            .collect())
    }
}

#[async_trait::async_trait]
impl PollStore for SqlitePollStore {
    type Error = SqlError;

    async fn options(&self) -> Result<Vec<String>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
                SELECT DISTINCT option
                FROM poll_options
                ORDER BY option
            "#,
        )
        .fetch_all(&mut conn)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| r.get::<String, _>("option"))
            .collect())
    }

    async fn increment(&self, option: &str, count: u64) -> Result<u64, Self::Error> {
        let delta = i64::try_from(count).map_err(|_| SqlError::CountOverflow(count))?;
        let mut conn = self.pool.acquire().await?;
        // a single statement, so every matching poll is updated or none is
        let result = sqlx::query(
            r#"
                UPDATE poll_options
                SET results = results + ?2
                WHERE option = ?1
            "#,
        )
        .bind(option)
        .bind(delta)
        .execute(&mut conn)
        .await?;
        Ok(result.rows_affected())
    }
}
