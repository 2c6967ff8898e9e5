//! The SQL executor.
//!
//! Render the template with the macro prelude, re-validate the rendered
//! statement, bind every `:name` placeholder by name, execute against the
//! data session, and normalize rows to column-name maps. Values never
//! travel through string interpolation.

use serde_json::Value;
use sqlx::AnyPool;

use quiver_core::sql::rewrite_placeholders;
use quiver_core::Dialect;
use quiver_policy::validate_select;
use quiver_store::rows::row_to_json;
use quiver_template::render_with_prelude;

use crate::error::DispatchError;
use crate::state::{DataSession, ServerState};

/// Row-limit cap applied before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPolicy {
    /// Seeded/system tools run as written.
    None,
    /// Temporary test tools: hard cap of 3 rows.
    Temp,
    /// Auto-created tools: cap of 1000 rows against runaway result sets.
    AutoCreated,
}

impl LimitPolicy {
    fn cap(&self) -> Option<u32> {
        match self {
            LimitPolicy::None => None,
            LimitPolicy::Temp => Some(3),
            LimitPolicy::AutoCreated => Some(1000),
        }
    }
}

/// Execute a `select`-kind artifact body.
pub async fn execute_select(
    state: &ServerState,
    body: &str,
    arguments: &Value,
    limit: LimitPolicy,
) -> Result<Value, DispatchError> {
    let session = state
        .data_session()
        .ok_or(DispatchError::DataBackendUnavailable)?;

    let prelude = state.macro_prelude().await?;
    let rendered = render_with_prelude(&prelude, body, arguments)?;

    // Macros could have expanded to anything; always re-validate.
    validate_select(&rendered)?;

    let rendered = apply_limit(&rendered, limit);
    let rows = run_query(&session.pool, session.dialect, &rendered, arguments).await?;
    Ok(Value::Array(rows))
}

/// Execute a validated read statement against an arbitrary session. Used
/// by the script capability surface (`query` / `meta_query`) and by
/// completion lookups.
pub async fn run_query(
    pool: &AnyPool,
    dialect: Dialect,
    sql: &str,
    arguments: &Value,
) -> Result<Vec<Value>, DispatchError> {
    let (rewritten, names) = rewrite_placeholders(sql, dialect);
    let mut query = sqlx::query(&rewritten);
    for name in &names {
        let value = arguments.get(name).ok_or_else(|| {
            DispatchError::UnboundPlaceholder { name: name.clone() }
        })?;
        query = bind_json(query, value);
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

type AnyQuery<'q> = sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>;

/// Bind one JSON value by its runtime type. Composites are bound as their
/// JSON text.
fn bind_json<'q>(query: AnyQuery<'q>, value: &'q Value) -> AnyQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                query.bind(v)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

/// Strip a trailing LIMIT clause and append the cap, when one applies.
fn apply_limit(sql: &str, policy: LimitPolicy) -> String {
    let Some(cap) = policy.cap() else {
        return sql.to_string();
    };
    let stripped = sql.trim_end().trim_end_matches(';').trim_end();
    let without_limit = match regex::Regex::new(r"(?i)\s+LIMIT\s+\d+\s*$") {
        Ok(re) => re.replace(stripped, "").into_owned(),
        Err(_) => stripped.to_string(),
    };
    format!("{} LIMIT {}", without_limit, cap)
}

/// Distinct values of a column for completion, scanning the session's
/// tables. Identifier fragments are restricted to word characters; the
/// prefix travels through a bound parameter.
pub async fn complete_column_values(
    session: &DataSession,
    column: &str,
    prefix: &str,
) -> Vec<String> {
    if !is_identifier(column) {
        return Vec::new();
    }
    let tables = list_tables(session).await;
    for table in tables {
        if !is_identifier(&table) {
            continue;
        }
        let sql = format!(
            "SELECT DISTINCT {column} AS v FROM {table} \
             WHERE {column} LIKE :prefix ORDER BY {column} LIMIT 10"
        );
        let args = serde_json::json!({ "prefix": format!("{}%", prefix) });
        match run_query(&session.pool, session.dialect, &sql, &args).await {
            Ok(rows) if !rows.is_empty() => {
                return rows
                    .iter()
                    .filter_map(|row| row.get("v"))
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect();
            }
            _ => continue,
        }
    }
    Vec::new()
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

async fn list_tables(session: &DataSession) -> Vec<String> {
    let sql = match session.dialect {
        Dialect::Sqlite => "SELECT name AS v FROM sqlite_master WHERE type = 'table'",
        Dialect::Postgres => {
            "SELECT table_name AS v FROM information_schema.tables \
             WHERE table_schema = 'public'"
        }
        Dialect::Standard => return Vec::new(),
    };
    match run_query(&session.pool, session.dialect, sql, &Value::Null).await {
        Ok(rows) => rows
            .iter()
            .filter_map(|row| row.get("v"))
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Err(_) => Vec::new(),
    }
}
