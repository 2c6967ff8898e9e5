//! Compact tabular text rendering for tool results.
//!
//! The `toon` output format renders uniform row sets as a header plus one
//! line per row, which is far cheaper for a language model to read than
//! pretty-printed JSON. Anything that is not a uniform array of flat
//! objects falls back to JSON text.

use serde_json::Value;

/// Encode a result value in the compact tabular form.
pub fn encode(value: &Value) -> String {
    match value {
        Value::Array(items) if !items.is_empty() => match uniform_columns(items) {
            Some(columns) => {
                let mut out = format!("rows[{}]{{{}}}:\n", items.len(), columns.join(","));
                for item in items {
                    let cells: Vec<String> = columns
                        .iter()
                        .map(|column| {
                            item.get(column)
                                .map(render_cell)
                                .unwrap_or_default()
                        })
                        .collect();
                    out.push_str("  ");
                    out.push_str(&cells.join(","));
                    out.push('\n');
                }
                out.trim_end().to_string()
            }
            None => fallback(value),
        },
        Value::String(s) => s.clone(),
        other => fallback(other),
    }
}

/// Column names shared by every row, when all rows are flat objects.
fn uniform_columns(items: &[Value]) -> Option<Vec<String>> {
    let first = items.first()?.as_object()?;
    let columns: Vec<String> = first.keys().cloned().collect();
    for item in items {
        let object = item.as_object()?;
        if object.keys().cloned().collect::<Vec<_>>() != columns {
            return None;
        }
        if object.values().any(|v| v.is_object() || v.is_array()) {
            return None;
        }
    }
    Some(columns)
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => {
            if s.contains(',') || s.contains('\n') {
                format!("\"{}\"", s.replace('"', "\"\""))
            } else {
                s.clone()
            }
        }
        other => other.to_string(),
    }
}

fn fallback(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
