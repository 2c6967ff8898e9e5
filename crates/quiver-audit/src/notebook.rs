//! The agent notebook: durable key/value memory with history.

use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};

use quiver_core::sql::rewrite_placeholders;
use quiver_core::{Dialect, TableNames};
use quiver_store::rows::{get_bool, get_i64};

use crate::error::AuditError;

/// Domain reserved for the dispatcher's failure lessons.
pub const SELF_CORRECTION_DOMAIN: &str = "self_correction";

/// One notebook entry.
#[derive(Debug, Clone)]
pub struct NotebookEntry {
    pub domain: String,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub is_active: bool,
}

/// Notebook storage over the metadata database.
///
/// Every write also appends a history row, so the notebook's evolution is
/// fully reconstructable. Deletes are soft (`is_active = 0`).
#[derive(Clone)]
pub struct Notebook {
    pool: AnyPool,
    dialect: Dialect,
    table: String,
    history_table: String,
}

impl Notebook {
    pub fn new(pool: AnyPool, dialect: Dialect, tables: &TableNames) -> Self {
        Self {
            pool,
            dialect,
            table: tables.qualified(&tables.notebook),
            history_table: tables.qualified(&tables.notebook_history),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), AuditError> {
        let entry_ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                domain TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                updated_by TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (domain, key)
            )",
            self.table
        );
        let history_ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                domain TEXT NOT NULL,
                key TEXT NOT NULL,
                old_value TEXT,
                new_value TEXT NOT NULL,
                changed_at TEXT NOT NULL,
                changed_by TEXT NOT NULL
            )",
            self.history_table
        );
        sqlx::query(&entry_ddl).execute(&self.pool).await?;
        sqlx::query(&history_ddl).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get(&self, domain: &str, key: &str) -> Result<Option<NotebookEntry>, AuditError> {
        let sql = format!(
            "SELECT domain, key, value, created_at, updated_at, updated_by, is_active
             FROM {} WHERE domain = :domain AND key = :key AND is_active <> 0",
            self.table
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        let row = sqlx::query(&sql)
            .bind(domain)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| entry_from_row(&r)).transpose()
    }

    /// Set a value, recording the old value in history.
    pub async fn set(
        &self,
        domain: &str,
        key: &str,
        value: &str,
        updated_by: &str,
    ) -> Result<(), AuditError> {
        let now = Utc::now().to_rfc3339();
        let old_value = self.get(domain, key).await?.map(|e| e.value);

        let sql = format!(
            "INSERT INTO {} (domain, key, value, created_at, updated_at, updated_by, is_active)
             VALUES (:domain, :key, :value, :now, :now2, :updated_by, 1)
             ON CONFLICT (domain, key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at,
                 updated_by = excluded.updated_by,
                 is_active = 1",
            self.table
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        sqlx::query(&sql)
            .bind(domain)
            .bind(key)
            .bind(value)
            .bind(now.as_str())
            .bind(now.as_str())
            .bind(updated_by)
            .execute(&self.pool)
            .await?;

        self.append_history(domain, key, old_value.as_deref(), value, updated_by)
            .await
    }

    /// Append a line to an entry instead of overwriting it. Used by the
    /// self-correction domain, which is append-only by contract.
    pub async fn append_line(
        &self,
        domain: &str,
        key: &str,
        line: &str,
        updated_by: &str,
    ) -> Result<(), AuditError> {
        let existing = self.get(domain, key).await?.map(|e| e.value);
        let new_value = match &existing {
            Some(prior) => format!("{}\n{}", prior, line),
            None => line.to_string(),
        };
        self.set(domain, key, &new_value, updated_by).await
    }

    /// Record a failure lesson under `self_correction/<tool>_error`.
    pub async fn append_self_correction(
        &self,
        tool_name: &str,
        lesson: &str,
    ) -> Result<(), AuditError> {
        let key = format!("{}_error", tool_name);
        let line = format!("[{}] {}", Utc::now().to_rfc3339(), lesson);
        self.append_line(SELF_CORRECTION_DOMAIN, &key, &line, "dispatcher")
            .await
    }

    /// Soft-delete an entry.
    pub async fn delete(
        &self,
        domain: &str,
        key: &str,
        updated_by: &str,
    ) -> Result<bool, AuditError> {
        let existing = self.get(domain, key).await?;
        let Some(entry) = existing else {
            return Ok(false);
        };
        let sql = format!(
            "UPDATE {} SET is_active = 0, updated_at = :now, updated_by = :updated_by
             WHERE domain = :domain AND key = :key",
            self.table
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        sqlx::query(&sql)
            .bind(Utc::now().to_rfc3339())
            .bind(updated_by)
            .bind(domain)
            .bind(key)
            .execute(&self.pool)
            .await?;
        self.append_history(domain, key, Some(&entry.value), "", updated_by)
            .await?;
        Ok(true)
    }

    /// Active entries in a domain, ordered by key.
    pub async fn list(&self, domain: &str) -> Result<Vec<NotebookEntry>, AuditError> {
        let sql = format!(
            "SELECT domain, key, value, created_at, updated_at, updated_by, is_active
             FROM {} WHERE domain = :domain AND is_active <> 0 ORDER BY key",
            self.table
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        let rows = sqlx::query(&sql)
            .bind(domain)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// History row count for an entry. Mostly a test hook.
    pub async fn history_len(&self, domain: &str, key: &str) -> Result<i64, AuditError> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {} WHERE domain = :domain AND key = :key",
            self.history_table
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        let row = sqlx::query(&sql)
            .bind(domain)
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(get_i64(&row, "n")?)
    }

    async fn append_history(
        &self,
        domain: &str,
        key: &str,
        old_value: Option<&str>,
        new_value: &str,
        changed_by: &str,
    ) -> Result<(), AuditError> {
        let table = &self.history_table;
        let sql = format!(
            "INSERT INTO {table} (id, domain, key, old_value, new_value, changed_at, changed_by)
             SELECT COALESCE(MAX(id), 0) + 1, :domain, :key, :old_value, :new_value,
                    :changed_at, :changed_by
             FROM {table}"
        );
        let (sql, _) = rewrite_placeholders(&sql, self.dialect);
        sqlx::query(&sql)
            .bind(domain)
            .bind(key)
            .bind(old_value)
            .bind(new_value)
            .bind(Utc::now().to_rfc3339())
            .bind(changed_by)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn entry_from_row(row: &sqlx::any::AnyRow) -> Result<NotebookEntry, AuditError> {
    let parse_time = |text: String| {
        DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    };
    Ok(NotebookEntry {
        domain: row.try_get("domain")?,
        key: row.try_get("key")?,
        value: row.try_get("value")?,
        created_at: parse_time(row.try_get::<String, _>("created_at")?),
        updated_at: parse_time(row.try_get::<String, _>("updated_at")?),
        updated_by: row.try_get("updated_by")?,
        is_active: get_bool(row, "is_active")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_notebook() -> Notebook {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let notebook = Notebook::new(pool, Dialect::Sqlite, &TableNames::default());
        notebook.ensure_schema().await.unwrap();
        notebook
    }

    #[tokio::test]
    async fn set_get_and_history() {
        let notebook = memory_notebook().await;
        notebook
            .set("user_prefs", "tone", "concise", "user")
            .await
            .unwrap();
        notebook
            .set("user_prefs", "tone", "verbose", "user")
            .await
            .unwrap();

        let entry = notebook.get("user_prefs", "tone").await.unwrap().unwrap();
        assert_eq!(entry.value, "verbose");
        assert_eq!(notebook.history_len("user_prefs", "tone").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn self_correction_appends_rather_than_overwrites() {
        let notebook = memory_notebook().await;
        notebook
            .append_self_correction("greet", "first failure")
            .await
            .unwrap();
        notebook
            .append_self_correction("greet", "second failure")
            .await
            .unwrap();

        let entry = notebook
            .get(SELF_CORRECTION_DOMAIN, "greet_error")
            .await
            .unwrap()
            .unwrap();
        assert!(entry.value.contains("first failure"));
        assert!(entry.value.contains("second failure"));
        assert_eq!(entry.value.lines().count(), 2);
    }

    #[tokio::test]
    async fn delete_is_soft_and_reversible_by_set() {
        let notebook = memory_notebook().await;
        notebook.set("d", "k", "v", "user").await.unwrap();
        assert!(notebook.delete("d", "k", "user").await.unwrap());
        assert!(notebook.get("d", "k").await.unwrap().is_none());

        notebook.set("d", "k", "v2", "user").await.unwrap();
        assert_eq!(notebook.get("d", "k").await.unwrap().unwrap().value, "v2");
    }
}
