//! `SQLite` implementation of [`EventLog`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use ruleflow_app::ports::EventLog;
use ruleflow_domain::error::RuleflowError;
use ruleflow_domain::event::EventData;

use crate::error::{StorageError, decode_error};

struct Wrapper(EventData);

fn parse_json(value: &str) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::from_str(value).map_err(decode_error)
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let data_json: String = row.try_get("data")?;
        let previous_json: Option<String> = row.try_get("previous_data")?;
        let timestamp_str: String = row.try_get("timestamp")?;

        let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(decode_error)?
            .to_utc();

        Ok(Self(EventData {
            event: row.try_get("event")?,
            table: row.try_get("table_name")?,
            operation: row.try_get("operation")?,
            data: parse_json(&data_json)?,
            previous_data: previous_json.as_deref().map(parse_json).transpose()?,
            timestamp,
            user_id: row.try_get("user_id")?,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO events (event, table_name, operation, data, previous_data, user_id, timestamp)
    VALUES (?, ?, ?, ?, ?, ?, ?)
";

const SELECT_RECENT: &str = "SELECT * FROM events ORDER BY id DESC LIMIT ?";

/// `SQLite`-backed event log.
pub struct SqliteEventLog {
    pool: SqlitePool,
}

impl SqliteEventLog {
    /// Create a new event log using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl EventLog for SqliteEventLog {
    async fn append(&self, event: EventData) -> Result<(), RuleflowError> {
        let data_json = serde_json::to_string(&event.data).map_err(StorageError::from)?;
        let previous_json = event
            .previous_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StorageError::from)?;

        sqlx::query(INSERT)
            .bind(&event.event)
            .bind(&event.table)
            .bind(&event.operation)
            .bind(&data_json)
            .bind(&previous_json)
            .bind(&event.user_id)
            .bind(event.timestamp.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<EventData>, RuleflowError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_RECENT)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use ruleflow_domain::event::names;

    async fn setup() -> SqliteEventLog {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        SqliteEventLog::new(db.pool().clone())
    }

    #[tokio::test]
    async fn should_append_and_read_back_event() {
        let log = setup().await;
        let event = EventData::new(names::USER_UPDATED, serde_json::json!({"name": "Ada"}))
            .with_table("users")
            .with_operation("update")
            .with_previous_data(serde_json::json!({"name": "ada"}))
            .with_user("admin");

        log.append(event.clone()).await.unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent, vec![event]);
    }

    #[tokio::test]
    async fn should_return_recent_events_newest_first() {
        let log = setup().await;
        for i in 0..5 {
            log.append(EventData::new("tick", serde_json::json!({"i": i})))
                .await
                .unwrap();
        }

        let recent = log.recent(3).await.unwrap();

        let seen: Vec<_> = recent.iter().map(|e| e.data["i"].clone()).collect();
        assert_eq!(
            seen,
            vec![serde_json::json!(4), serde_json::json!(3), serde_json::json!(2)]
        );
    }

    #[tokio::test]
    async fn should_return_empty_when_log_is_empty() {
        let log = setup().await;
        assert!(log.recent(10).await.unwrap().is_empty());
    }
}
