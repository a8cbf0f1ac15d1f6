use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use crate::error::GovernanceError;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, GovernanceError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| GovernanceError::ConfigError(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        info!("Connected to {}", database_url);
        Ok(Database { pool })
    }

    /// Single-connection in-memory database with migrations applied.
    pub async fn new_in_memory() -> Result<Self, GovernanceError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| GovernanceError::ConfigError(format!("Invalid database URL: {}", e)))?
            .foreign_keys(true);

        // Every connection to :memory: is a separate database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<(), GovernanceError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Row counts for the status endpoint.
    pub async fn get_stats(&self) -> Result<DatabaseStats, GovernanceError> {
        let entities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await?;
        let boards: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM boards")
            .fetch_one(&self.pool)
            .await?;
        let open_meetings: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM board_meetings WHERE status = 'in_session'")
                .fetch_one(&self.pool)
                .await?;
        let approvals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM governance_approvals")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            entities,
            boards,
            open_meetings,
            approvals,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseStats {
    pub entities: i64,
    pub boards: i64,
    pub open_meetings: i64,
    pub approvals: i64,
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, GovernanceError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GovernanceError::DatabaseError(format!("Invalid timestamp {}: {}", value, e)))
}

pub fn parse_optional_timestamp(
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, GovernanceError> {
    value.as_deref().map(parse_timestamp).transpose()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, GovernanceError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| GovernanceError::DatabaseError(format!("Invalid date {}: {}", value, e)))
}
