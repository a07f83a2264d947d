//! `SQLite` implementation of [`RuleRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use ruleflow_app::ports::RuleRepository;
use ruleflow_domain::automation::{Action, AutomationRule, Condition, Trigger};
use ruleflow_domain::error::RuleflowError;
use ruleflow_domain::id::RuleId;
use ruleflow_domain::time::Timestamp;

use crate::error::{StorageError, decode_error};

struct Wrapper(AutomationRule);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<AutomationRule> {
        value.map(|w| w.0)
    }
}

fn parse_timestamp(value: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.to_utc())
        .map_err(decode_error)
}

fn parse_count(row: &SqliteRow, column: &str) -> Result<u64, sqlx::Error> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(decode_error)
}

fn count_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: uuid::Uuid = row.try_get("id")?;
        let trigger_json: String = row.try_get("trigger_data")?;
        let conditions_json: String = row.try_get("conditions")?;
        let actions_json: String = row.try_get("actions")?;
        let last_executed: Option<String> = row.try_get("last_executed")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        let trigger: Trigger = serde_json::from_str(&trigger_json).map_err(decode_error)?;
        let conditions: Vec<Condition> =
            serde_json::from_str(&conditions_json).map_err(decode_error)?;
        let actions: Vec<Action> = serde_json::from_str(&actions_json).map_err(decode_error)?;

        Ok(Self(AutomationRule {
            id: RuleId::from_uuid(id),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            enabled: row.try_get("enabled")?,
            trigger,
            conditions,
            actions,
            execution_count: parse_count(row, "execution_count")?,
            success_count: parse_count(row, "success_count")?,
            error_count: parse_count(row, "error_count")?,
            last_executed: last_executed.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO rules (
        id, name, description, enabled, trigger_data, conditions, actions,
        execution_count, success_count, error_count, last_executed, created_at, updated_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET
        name = excluded.name,
        description = excluded.description,
        enabled = excluded.enabled,
        trigger_data = excluded.trigger_data,
        conditions = excluded.conditions,
        actions = excluded.actions,
        execution_count = excluded.execution_count,
        success_count = excluded.success_count,
        error_count = excluded.error_count,
        last_executed = excluded.last_executed,
        updated_at = excluded.updated_at
";

const SELECT_ALL: &str = "SELECT * FROM rules ORDER BY name";
const SELECT_BY_ID: &str = "SELECT * FROM rules WHERE id = ?";
const DELETE_BY_ID: &str = "DELETE FROM rules WHERE id = ?";

/// `SQLite`-backed rule repository.
pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl RuleRepository for SqliteRuleRepository {
    async fn get_all(&self) -> Result<Vec<AutomationRule>, RuleflowError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn get_by_id(&self, id: RuleId) -> Result<Option<AutomationRule>, RuleflowError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn save(&self, rule: AutomationRule) -> Result<AutomationRule, RuleflowError> {
        let trigger_json = serde_json::to_string(&rule.trigger).map_err(StorageError::from)?;
        let conditions_json =
            serde_json::to_string(&rule.conditions).map_err(StorageError::from)?;
        let actions_json = serde_json::to_string(&rule.actions).map_err(StorageError::from)?;

        sqlx::query(UPSERT)
            .bind(rule.id.as_uuid())
            .bind(&rule.name)
            .bind(&rule.description)
            .bind(rule.enabled)
            .bind(&trigger_json)
            .bind(&conditions_json)
            .bind(&actions_json)
            .bind(count_column(rule.execution_count))
            .bind(count_column(rule.success_count))
            .bind(count_column(rule.error_count))
            .bind(rule.last_executed.map(|ts| ts.to_rfc3339()))
            .bind(rule.created_at.to_rfc3339())
            .bind(rule.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rule)
    }

    async fn delete(&self, id: RuleId) -> Result<(), RuleflowError> {
        sqlx::query(DELETE_BY_ID)
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}
