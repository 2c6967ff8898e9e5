//! The execution log writer.

use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};

use quiver_core::sql::rewrite_placeholders;
use quiver_core::{Dialect, Persona, TableNames};
use quiver_store::rows::{get_i64, get_opt_string};

use crate::entry::{ExecutionEntry, ExecutionStatus};
use crate::error::AuditError;

/// Writes and queries the execution log.
///
/// Each write opens its own transaction and commits before returning, so an
/// entry persists even when the dispatched call it describes blew up the
/// caller's work. A failed audit write is logged and swallowed: audit must
/// never turn a tool failure into a bigger failure.
#[derive(Clone)]
pub struct ExecutionRecorder {
    pool: AnyPool,
    dialect: Dialect,
    table: String,
}

impl ExecutionRecorder {
    pub fn new(pool: AnyPool, dialect: Dialect, tables: &TableNames) -> Self {
        Self {
            pool,
            dialect,
            table: tables.qualified(&tables.execution_log),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), AuditError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                timestamp TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                persona TEXT NOT NULL,
                arguments TEXT NOT NULL,
                status TEXT NOT NULL,
                result_summary TEXT NOT NULL,
                error_traceback TEXT
            )",
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    /// Record an entry in its own transaction. Errors are reported via
    /// tracing and swallowed.
    pub async fn record(&self, entry: &ExecutionEntry) {
        if let Err(e) = self.try_record(entry).await {
            tracing::warn!(error = %e, tool = %entry.tool_name, "failed to write execution log");
        }
    }

    async fn try_record(&self, entry: &ExecutionEntry) -> Result<(), AuditError> {
        let table = &self.table;
        let sql = format!(
            "INSERT INTO {table} (id, timestamp, tool_name, persona, arguments, status,
                                  result_summary, error_traceback)
             SELECT COALESCE(MAX(id), 0) + 1, :timestamp, :tool_name, :persona, :arguments,
                    :status, :result_summary, :error_traceback
             FROM {table}"
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql)
            .bind(entry.timestamp.to_rfc3339())
            .bind(entry.tool_name.as_str())
            .bind(entry.persona.as_str())
            .bind(entry.arguments.to_string())
            .bind(entry.status.as_str())
            .bind(entry.result_summary.as_str())
            .bind(entry.error_traceback.as_deref())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// The most recent failure, optionally filtered by tool name.
    pub async fn last_failure(
        &self,
        tool_name: Option<&str>,
    ) -> Result<Option<ExecutionEntry>, AuditError> {
        let mut sql = format!(
            "SELECT id, timestamp, tool_name, persona, arguments, status,
                    result_summary, error_traceback
             FROM {} WHERE status = 'FAILURE'",
            self.table
        );
        if tool_name.is_some() {
            sql.push_str(" AND tool_name = :tool_name");
        }
        sql.push_str(" ORDER BY id DESC LIMIT 1");
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);

        let query = sqlx::query(&sql);
        let query = match tool_name {
            Some(name) => query.bind(name.to_string()),
            None => query,
        };
        let row = query.fetch_optional(&self.pool).await?;
        row.map(|r| entry_from_row(&r)).transpose()
    }

    /// Entries for a tool in reverse chronological order, newest first.
    pub async fn recent(
        &self,
        tool_name: &str,
        limit: i64,
    ) -> Result<Vec<ExecutionEntry>, AuditError> {
        let sql = format!(
            "SELECT id, timestamp, tool_name, persona, arguments, status,
                    result_summary, error_traceback
             FROM {} WHERE tool_name = :tool_name
             ORDER BY id DESC LIMIT {}",
            self.table, limit
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        let rows = sqlx::query(&sql)
            .bind(tool_name)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    pub async fn count(&self) -> Result<i64, AuditError> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", self.table);
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(get_i64(&row, "n")?)
    }
}

fn entry_from_row(row: &sqlx::any::AnyRow) -> Result<ExecutionEntry, AuditError> {
    let timestamp_text: String = row.try_get("timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_text)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let arguments_text: String = row.try_get("arguments")?;
    Ok(ExecutionEntry {
        id: Some(get_i64(row, "id")?),
        timestamp,
        tool_name: row.try_get("tool_name")?,
        persona: Persona::new(row.try_get::<String, _>("persona")?),
        arguments: serde_json::from_str(&arguments_text)
            .unwrap_or(serde_json::Value::Null),
        status: ExecutionStatus::parse(&row.try_get::<String, _>("status")?)?,
        result_summary: row.try_get("result_summary")?,
        error_traceback: get_opt_string(row, "error_traceback")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_recorder() -> ExecutionRecorder {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let recorder = ExecutionRecorder::new(pool, Dialect::Sqlite, &TableNames::default());
        recorder.ensure_schema().await.unwrap();
        recorder
    }

    #[tokio::test]
    async fn records_success_and_failure() {
        let recorder = memory_recorder().await;
        let persona = Persona::default();
        recorder
            .record(&ExecutionEntry::success(
                "greet",
                &persona,
                &json!({"name": "World"}),
                "Hello, World!",
            ))
            .await;
        recorder
            .record(&ExecutionEntry::failure(
                "greet",
                &persona,
                &json!({}),
                "MissingArgument: name",
            ))
            .await;

        assert_eq!(recorder.count().await.unwrap(), 2);
        let last = recorder.last_failure(None).await.unwrap().unwrap();
        assert_eq!(last.status, ExecutionStatus::Failure);
        assert!(last
            .error_traceback
            .as_deref()
            .unwrap()
            .contains("MissingArgument"));
    }

    #[tokio::test]
    async fn last_failure_filters_by_tool() {
        let recorder = memory_recorder().await;
        let persona = Persona::default();
        recorder
            .record(&ExecutionEntry::failure("a", &persona, &json!({}), "boom a"))
            .await;
        recorder
            .record(&ExecutionEntry::failure("b", &persona, &json!({}), "boom b"))
            .await;

        let for_a = recorder.last_failure(Some("a")).await.unwrap().unwrap();
        assert_eq!(for_a.tool_name, "a");
        let latest = recorder.last_failure(None).await.unwrap().unwrap();
        assert_eq!(latest.tool_name, "b");
        assert!(recorder.last_failure(Some("zzz")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let recorder = memory_recorder().await;
        let persona = Persona::default();
        for i in 0..3 {
            recorder
                .record(&ExecutionEntry::success(
                    "t",
                    &persona,
                    &json!({"i": i}),
                    &format!("r{}", i),
                ))
                .await;
        }
        let entries = recorder.recent("t", 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].result_summary, "r2");
    }
}
