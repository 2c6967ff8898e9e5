//! Execution log entries.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use quiver_core::Persona;

use crate::error::AuditError;

/// Upper bound on the stored result summary. Tracebacks are never
/// truncated; summaries are.
pub const RESULT_SUMMARY_LIMIT: usize = 2000;

/// Outcome of a dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failure,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failure => "FAILURE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AuditError> {
        match s {
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILURE" => Ok(ExecutionStatus::Failure),
            other => Err(AuditError::UnknownStatus(other.to_string())),
        }
    }
}

/// One row of the execution log.
#[derive(Debug, Clone)]
pub struct ExecutionEntry {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub persona: Persona,
    pub arguments: Value,
    pub status: ExecutionStatus,
    pub result_summary: String,
    pub error_traceback: Option<String>,
}

impl ExecutionEntry {
    /// Build a success entry, truncating the rendered result.
    pub fn success(
        tool_name: &str,
        persona: &Persona,
        arguments: &Value,
        result_text: &str,
    ) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            tool_name: tool_name.to_string(),
            persona: persona.clone(),
            arguments: sanitize_arguments(arguments),
            status: ExecutionStatus::Success,
            result_summary: truncate_summary(result_text),
            error_traceback: None,
        }
    }

    /// Build a failure entry carrying the full diagnostic text.
    pub fn failure(
        tool_name: &str,
        persona: &Persona,
        arguments: &Value,
        traceback: &str,
    ) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            tool_name: tool_name.to_string(),
            persona: persona.clone(),
            arguments: sanitize_arguments(arguments),
            status: ExecutionStatus::Failure,
            result_summary: "Execution failed - see error_traceback".to_string(),
            error_traceback: Some(traceback.to_string()),
        }
    }
}

/// Best-effort argument serialization: anything that is not already a JSON
/// object is wrapped under a marker key so the column stays queryable.
pub fn sanitize_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::Object(_) => arguments.clone(),
        other => json!({ "_raw": other.to_string() }),
    }
}

/// Bound a rendered result for the summary column.
pub fn truncate_summary(text: &str) -> String {
    if text.chars().count() <= RESULT_SUMMARY_LIMIT {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(RESULT_SUMMARY_LIMIT).collect();
        format!("{}... (truncated)", truncated)
    }
}
