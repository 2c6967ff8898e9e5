//! The script executor: bridges the synchronous interpreter to the async
//! dispatcher.
//!
//! The interpreter runs inline under `block_in_place`; its host
//! capabilities re-enter the async world with `Handle::block_on`. The
//! sub-executor capability re-enters `call_tool` with the same persona and
//! an incremented depth, which is the sole mechanism by which one tool may
//! invoke another.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};

use quiver_core::Persona;
use quiver_policy::{validate_script, validate_select};
use quiver_script::{parse, HostEnv, Interpreter, ScriptError};

use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::sql_exec::run_query;

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Capability surface handed to a running script.
struct ScriptHost {
    dispatcher: Dispatcher,
    persona: Persona,
    tool_name: String,
    depth: u32,
}

impl HostEnv for ScriptHost {
    fn log(&self, message: &str) {
        tracing::info!(tool = %self.tool_name, persona = %self.persona, "{}", message);
    }

    fn call_tool(&self, name: &str, arguments: &Value) -> Result<Value, ScriptError> {
        block_on(self.dispatcher.call_tool_at_depth(
            name,
            &self.persona,
            arguments.clone(),
            self.depth + 1,
        ))
        .map_err(|e| ScriptError::Host(e.to_string()))
    }

    fn query(&self, sql: &str, params: &Value) -> Result<Value, ScriptError> {
        validate_select(sql).map_err(|e| ScriptError::Host(e.to_string()))?;
        let session = self
            .dispatcher
            .state()
            .data_session()
            .ok_or_else(|| ScriptError::Host(DispatchError::DataBackendUnavailable.to_string()))?;
        let rows = block_on(run_query(&session.pool, session.dialect, sql, params))
            .map_err(|e| ScriptError::Host(e.to_string()))?;
        Ok(Value::Array(rows))
    }

    fn meta_query(&self, sql: &str, params: &Value) -> Result<Value, ScriptError> {
        validate_select(sql).map_err(|e| ScriptError::Host(e.to_string()))?;
        let state = self.dispatcher.state();
        let pool = state.registry().pool().clone();
        let dialect = state.registry().dialect();
        let rows = block_on(run_query(&pool, dialect, sql, params))
            .map_err(|e| ScriptError::Host(e.to_string()))?;
        Ok(Value::Array(rows))
    }
}

/// Validate and run a `script`-kind artifact body.
///
/// `extra_context` lets resource dispatch add the `uri` slot; tool dispatch
/// passes the persona and tool name only.
pub async fn execute_script(
    dispatcher: &Dispatcher,
    persona: &Persona,
    tool_name: &str,
    depth: u32,
    body: &str,
    arguments: &Value,
    extra_context: Value,
) -> Result<Value, DispatchError> {
    let script = parse(body)?;
    let policies = dispatcher.state().policy_set().await?;
    validate_script(&script, &policies)?;

    let mut context = json!({
        "persona": persona.as_str(),
        "tool_name": tool_name,
    });
    if let (Some(target), Some(extra)) = (context.as_object_mut(), extra_context.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }

    let host = Arc::new(ScriptHost {
        dispatcher: dispatcher.clone(),
        persona: persona.clone(),
        tool_name: tool_name.to_string(),
        depth,
    });
    let arguments = arguments.clone();
    tokio::task::block_in_place(move || {
        let interpreter = Interpreter::new(host, context);
        interpreter.run(&script, &arguments)
    })
    .map_err(DispatchError::from)
}

/// Run the optional `complete` method of a script tool.
pub async fn complete_script(
    dispatcher: &Dispatcher,
    persona: &Persona,
    tool_name: &str,
    body: &str,
    argument: &str,
    value: &str,
) -> Result<Vec<String>, DispatchError> {
    let script = parse(body)?;
    let policies = dispatcher.state().policy_set().await?;
    validate_script(&script, &policies)?;

    let context = json!({
        "persona": persona.as_str(),
        "tool_name": tool_name,
    });
    let host = Arc::new(ScriptHost {
        dispatcher: dispatcher.clone(),
        persona: persona.clone(),
        tool_name: tool_name.to_string(),
        depth: 0,
    });
    let argument = argument.to_string();
    let value = value.to_string();
    tokio::task::block_in_place(move || {
        let interpreter = Interpreter::new(host, context);
        interpreter.complete(&script, &argument, &value)
    })
    .map_err(DispatchError::from)
}
