//! Write-capable data meta-tools: dialect-aware upsert and guarded DDL.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use quiver_core::sql::rewrite_placeholders;
use quiver_core::Dialect;
use quiver_policy::validate_ddl;

use super::{required_str, Builtin};
use crate::dispatcher::{CallContext, Dispatcher};
use crate::error::DispatchError;
use crate::state::DataSession;

/// `general_merge_tool`: upsert one row by key column, emitting
/// dialect-specific SQL. Identifiers are restricted to word characters;
/// every value travels through a bound parameter.
pub struct MergeTool;

#[async_trait]
impl Builtin for MergeTool {
    fn name(&self) -> &'static str {
        "general_merge_tool"
    }

    fn description(&self) -> &'static str {
        "Upsert a row (insert or update by key column) in the data database"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table_name": {"type": "string", "description": "Target table"},
                "key_column": {"type": "string", "description": "Column identifying the row"},
                "key_value": {"description": "Value of the key column"},
                "data": {"type": "object", "description": "Column/value map to upsert"}
            },
            "required": ["table_name", "key_column", "key_value", "data"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let table = required_str(arguments, "table_name")?;
        let key_column = required_str(arguments, "key_column")?;
        let key_value = arguments
            .get("key_value")
            .cloned()
            .ok_or_else(|| DispatchError::InvalidInput("key_value is required".to_string()))?;

        let mut data: Map<String, Value> = match arguments.get("data") {
            Some(Value::Object(entries)) => entries.clone(),
            Some(Value::String(text)) => serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .ok_or_else(|| {
                    DispatchError::InvalidInput("data must be a JSON object".to_string())
                })?,
            _ => {
                return Err(DispatchError::InvalidInput(
                    "data must be a JSON object".to_string(),
                ))
            }
        };
        data.insert(key_column.to_string(), key_value);

        if !is_identifier(table) || !is_identifier(key_column) {
            return Err(DispatchError::InvalidInput(
                "table and column names must be plain identifiers".to_string(),
            ));
        }
        for column in data.keys() {
            if !is_identifier(column) {
                return Err(DispatchError::InvalidInput(format!(
                    "column name '{}' is not a plain identifier",
                    column
                )));
            }
        }

        let session = dispatcher
            .state()
            .data_session()
            .ok_or(DispatchError::DataBackendUnavailable)?;

        let sql = merge_sql(session.dialect, table, key_column, &data);
        tracing::debug!(dialect = ?session.dialect, table = %table, "merge SQL generated");

        let arguments = Value::Object(data);
        let affected = execute_write(&session, &sql, &arguments).await?;
        Ok(json!(format!(
            "Merge into '{}' completed ({} row(s) affected)",
            table, affected
        )))
    }
}

/// Build the dialect-specific upsert statement.
fn merge_sql(dialect: Dialect, table: &str, key_column: &str, data: &Map<String, Value>) -> String {
    let columns: Vec<&str> = data.keys().map(String::as_str).collect();
    let column_list = columns.join(", ");
    let placeholder_list = columns
        .iter()
        .map(|c| format!(":{}", c))
        .collect::<Vec<_>>()
        .join(", ");

    match dialect {
        Dialect::Sqlite => format!(
            "INSERT OR REPLACE INTO {table} ({column_list}) VALUES ({placeholder_list})"
        ),
        Dialect::Postgres => {
            let update_set = columns
                .iter()
                .filter(|c| **c != key_column)
                .map(|c| format!("{c} = EXCLUDED.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO {table} ({column_list}) VALUES ({placeholder_list}) \
                 ON CONFLICT ({key_column}) DO UPDATE SET {update_set}"
            )
        }
        Dialect::Standard => {
            let source_columns = columns
                .iter()
                .map(|c| format!(":{c} AS {c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let update_set = columns
                .iter()
                .filter(|c| **c != key_column)
                .map(|c| format!("{c} = source.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let source_values = columns
                .iter()
                .map(|c| format!("source.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "MERGE INTO {table} AS target \
                 USING (SELECT {source_columns}) AS source \
                 ON target.{key_column} = source.{key_column} \
                 WHEN MATCHED THEN UPDATE SET {update_set} \
                 WHEN NOT MATCHED THEN INSERT ({column_list}) VALUES ({source_values})"
            )
        }
    }
}

/// `execute_ddl_tool`: CREATE/ALTER/DROP/TRUNCATE with an explicit
/// confirmation token.
pub struct DdlTool;

#[async_trait]
impl Builtin for DdlTool {
    fn name(&self) -> &'static str {
        "execute_ddl_tool"
    }

    fn description(&self) -> &'static str {
        "Execute a DDL statement (CREATE/ALTER/DROP/TRUNCATE); requires confirmation 'YES'"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ddl_command": {"type": "string", "description": "The DDL statement to execute"},
                "confirmation": {"type": "string", "description": "Must be exactly 'YES' to proceed"}
            },
            "required": ["ddl_command", "confirmation"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let ddl = required_str(arguments, "ddl_command")?;
        let confirmation = arguments
            .get("confirmation")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if confirmation != "YES" {
            return Err(DispatchError::InvalidInput(
                "DDL execution requires explicit confirmation; set 'confirmation' to 'YES'"
                    .to_string(),
            ));
        }

        validate_ddl(ddl)?;

        let session = dispatcher
            .state()
            .data_session()
            .ok_or(DispatchError::DataBackendUnavailable)?;
        execute_write(&session, ddl, &json!({})).await?;
        Ok(json!("DDL statement executed"))
    }
}

/// Execute a write statement with named binds, returning rows affected.
async fn execute_write(
    session: &DataSession,
    sql: &str,
    arguments: &Value,
) -> Result<u64, DispatchError> {
    let (rewritten, names) = rewrite_placeholders(sql, session.dialect);
    let mut query = sqlx::query(&rewritten);
    for name in &names {
        let value = arguments
            .get(name)
            .ok_or_else(|| DispatchError::UnboundPlaceholder { name: name.clone() })?;
        query = match value {
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
        };
    }
    let result = query.execute(&session.pool).await?;
    Ok(result.rows_affected())
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
