//! Governance Event Log
//!
//! Every governance mutation appends one row to `governance_events`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tracing::debug;

use crate::database::{now_timestamp, parse_timestamp};
use crate::error::GovernanceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceEvent {
    pub id: i64,
    pub entity_id: Option<i64>,
    pub event_type: String,
    pub actor: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Append an event through `executor`; pass the mutation's transaction so
/// the event commits with it.
pub async fn log_event<'e, E>(
    executor: E,
    entity_id: Option<i64>,
    event_type: &str,
    actor: Option<&str>,
    details: &serde_json::Value,
) -> Result<(), GovernanceError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO governance_events (entity_id, event_type, actor, details, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(entity_id)
    .bind(event_type)
    .bind(actor)
    .bind(details.to_string())
    .bind(now_timestamp())
    .execute(executor)
    .await
    .map_err(|e| GovernanceError::DatabaseError(format!("Failed to log event: {}", e)))?;

    debug!("Logged governance event {} for entity {:?}", event_type, entity_id);
    Ok(())
}

/// Newest first.
pub async fn recent_events(
    pool: &SqlitePool,
    entity_id: i64,
    limit: i64,
) -> Result<Vec<GovernanceEvent>, GovernanceError> {
    let rows = sqlx::query(
        r#"
        SELECT id, entity_id, event_type, actor, details, created_at
        FROM governance_events
        WHERE entity_id = ?
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(entity_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(GovernanceEvent {
                id: row.get::<i64, _>("id"),
                entity_id: row.get::<Option<i64>, _>("entity_id"),
                event_type: row.get::<String, _>("event_type"),
                actor: row.get::<Option<String>, _>("actor"),
                details: serde_json::from_str(&row.get::<String, _>("details"))?,
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            })
        })
        .collect()
}
