//! The workflow chain engine.
//!
//! A chain is an ordered list of steps, each calling one tool, with
//! `${id}` / `${id.path}` references into earlier steps' results. The DAG
//! rule is positional: a step may only reference ids that appear strictly
//! earlier in the list, which is stronger than acyclicity and is checked in
//! full before any step executes.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use quiver_core::Persona;

use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

/// One step of a chain.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("duplicate step id '{id}' at step {index}")]
    DuplicateStepId { index: usize, id: String },

    #[error("step {index} (id '{id}') references future or unknown step '{referent}'")]
    ForwardReference {
        index: usize,
        id: String,
        referent: String,
    },

    #[error("step '{id}': field path '{path}' not found in result of '{referent}'")]
    FieldNotFound {
        id: String,
        referent: String,
        path: String,
    },

    #[error("chain step {index} is malformed: {reason}")]
    MalformedStep { index: usize, reason: String },
}

/// Extract the step ids referenced by `${id}` / `${id.path}` patterns
/// anywhere inside a value.
fn referenced_ids(value: &Value, out: &mut HashSet<String>) {
    match value {
        Value::String(s) => {
            let re = reference_regex();
            for captures in re.captures_iter(s) {
                if let Some(reference) = captures.get(1) {
                    let id = reference.as_str().split('.').next().unwrap_or("");
                    if !id.is_empty() {
                        out.insert(id.to_string());
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                referenced_ids(item, out);
            }
        }
        Value::Object(entries) => {
            for value in entries.values() {
                referenced_ids(value, out);
            }
        }
        _ => {}
    }
}

fn reference_regex() -> regex::Regex {
    // The pattern is fixed; construction cannot fail.
    regex::Regex::new(r"\$\{([^}]+)\}").unwrap_or_else(|_| unreachable!())
}

/// Validate ids and reference ordering before any execution.
pub fn validate_dag(steps: &[Step]) -> Result<(), ChainError> {
    let mut seen: HashSet<String> = HashSet::new();
    for (index, step) in steps.iter().enumerate() {
        if step.id.is_empty() {
            return Err(ChainError::MalformedStep {
                index,
                reason: "empty step id".to_string(),
            });
        }
        if seen.contains(&step.id) {
            return Err(ChainError::DuplicateStepId {
                index,
                id: step.id.clone(),
            });
        }
        let mut referenced = HashSet::new();
        referenced_ids(&step.args, &mut referenced);
        for referent in referenced {
            if !seen.contains(&referent) {
                return Err(ChainError::ForwardReference {
                    index,
                    id: step.id.clone(),
                    referent,
                });
            }
        }
        seen.insert(step.id.clone());
    }
    Ok(())
}

/// Substitute `${id}` and `${id.path}` references in one string.
fn substitute_string(
    text: &str,
    results: &HashMap<String, Value>,
    step_id: &str,
) -> Result<String, ChainError> {
    let re = reference_regex();
    let mut out = String::new();
    let mut last = 0;
    for captures in re.captures_iter(text) {
        let whole = match captures.get(0) {
            Some(m) => m,
            None => continue,
        };
        let reference = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        out.push_str(&text[last..whole.start()]);

        let mut segments = reference.split('.');
        let referent = segments.next().unwrap_or("");
        let value = results.get(referent).ok_or_else(|| ChainError::FieldNotFound {
            id: step_id.to_string(),
            referent: referent.to_string(),
            path: reference.to_string(),
        })?;

        let mut current = value.clone();
        for segment in segments {
            current = navigate(&current, segment).ok_or_else(|| ChainError::FieldNotFound {
                id: step_id.to_string(),
                referent: referent.to_string(),
                path: reference.to_string(),
            })?;
        }
        out.push_str(&render_value(&current));
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Navigate one path segment through a composite. Numeric segments index
/// arrays; single-row arrays are also transparently traversed by field
/// name, which keeps `${q.column}` usable on one-row query results.
fn navigate(value: &Value, segment: &str) -> Option<Value> {
    match value {
        Value::Object(entries) => entries.get(segment).cloned(),
        Value::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                return items.get(index).cloned();
            }
            if items.len() == 1 {
                return navigate(&items[0], segment);
            }
            None
        }
        _ => None,
    }
}

/// Readable rendering of a substituted value: scalars inline, composites
/// as JSON text.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn substitute(
    value: &Value,
    results: &HashMap<String, Value>,
    step_id: &str,
) -> Result<Value, ChainError> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, results, step_id)?)),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(substitute(item, results, step_id)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(entries) => {
            let mut out = Map::new();
            for (key, item) in entries {
                out.insert(key.clone(), substitute(item, results, step_id)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Execute a validated chain, step by step, halting on the first failure.
///
/// The report enumerates every attempted step in execution order; success
/// reports carry the final results snapshot, failure reports the completed
/// prefix plus the failure details.
pub async fn execute_chain(
    dispatcher: &Dispatcher,
    persona: &Persona,
    depth: u32,
    steps: Vec<Step>,
) -> Result<Value, DispatchError> {
    validate_dag(&steps)?;

    let total = steps.len();
    let mut results: HashMap<String, Value> = HashMap::new();
    let mut completed: Vec<Value> = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        let resolved = substitute(&step.args, &results, &step.id)?;
        match dispatcher
            .call_tool_at_depth(&step.tool, persona, resolved, depth + 1)
            .await
        {
            Ok(result) => {
                completed.push(json!({
                    "step": index + 1,
                    "id": step.id,
                    "tool": step.tool,
                    "status": "SUCCESS",
                    "result": result,
                }));
                results.insert(step.id.clone(), result);
            }
            Err(e) => {
                return Ok(json!({
                    "status": "FAILURE",
                    "failed_step": {
                        "step": index + 1,
                        "id": step.id,
                        "tool": step.tool,
                        "error": e.to_string(),
                    },
                    "completed_steps": completed,
                    "total_steps": total,
                }));
            }
        }
    }

    Ok(json!({
        "status": "SUCCESS",
        "completed_steps": completed,
        "total_steps": total,
        "results": results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, tool: &str, args: Value) -> Step {
        Step {
            id: id.to_string(),
            tool: tool.to_string(),
            args,
        }
    }

    #[test]
    fn forward_references_are_rejected_before_execution() {
        let steps = vec![
            step("a", "t", json!({"x": "${b}"})),
            step("b", "u", json!({})),
        ];
        let err = validate_dag(&steps).unwrap_err();
        match err {
            ChainError::ForwardReference {
                index, referent, ..
            } => {
                assert_eq!(index, 0);
                assert_eq!(referent, "b");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let steps = vec![step("a", "t", json!({})), step("a", "u", json!({}))];
        assert!(matches!(
            validate_dag(&steps).unwrap_err(),
            ChainError::DuplicateStepId { index: 1, .. }
        ));
    }

    #[test]
    fn backward_references_pass() {
        let steps = vec![
            step("loc", "get_location", json!({})),
            step("g", "greet", json!({"name": "${loc.city}"})),
        ];
        validate_dag(&steps).unwrap();
    }

    #[test]
    fn substitution_navigates_paths() {
        let mut results = HashMap::new();
        results.insert("loc".to_string(), json!({"city": "Osaka", "tags": ["a", "b"]}));
        let resolved = substitute(
            &json!({"name": "${loc.city}", "tag": "${loc.tags.1}"}),
            &results,
            "g",
        )
        .unwrap();
        assert_eq!(resolved, json!({"name": "Osaka", "tag": "b"}));
    }

    #[test]
    fn whole_reference_renders_composites_readably() {
        let mut results = HashMap::new();
        results.insert("q".to_string(), json!([{"n": 1}]));
        let resolved =
            substitute(&json!({"echo": "rows: ${q}"}), &results, "s").unwrap();
        assert_eq!(resolved, json!({"echo": "rows: [{\"n\":1}]"}));
    }

    #[test]
    fn single_row_results_traverse_by_field() {
        let mut results = HashMap::new();
        results.insert("q".to_string(), json!([{"city": "Kyoto"}]));
        let resolved = substitute(&json!({"name": "${q.city}"}), &results, "g").unwrap();
        assert_eq!(resolved, json!({"name": "Kyoto"}));
    }

    #[test]
    fn missing_nested_fields_fail_the_step() {
        let mut results = HashMap::new();
        results.insert("loc".to_string(), json!({"city": "Osaka"}));
        let err = substitute(&json!({"x": "${loc.country}"}), &results, "g").unwrap_err();
        assert!(matches!(err, ChainError::FieldNotFound { .. }));
    }
}
