//! Failure capture and the self-healing loop: execution log, last-error
//! lookup, self-correction notes.

use serde_json::json;

use quiver_core::Persona;
use quiver_registry::ToolRecord;
use quiver_store::{ArtifactKind, Digest};

use super::common::online_dispatcher;

const DIVIDER_SCRIPT: &str = r#"class Divider(Tool) {
    fn run(self, arguments) {
        return arguments["a"] / arguments["b"];
    }
}
"#;

async fn register_divider(dispatcher: &quiver_mcp::Dispatcher) {
    let record = ToolRecord {
        name: "divide".to_string(),
        persona: Persona::default(),
        description: "Divide a by b".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "a": {"type": "number"},
                "b": {"type": "number"}
            },
            "required": ["a", "b"]
        }),
        artifact_digest: Digest::of(DIVIDER_SCRIPT),
        is_auto_created: false,
        group: "general".to_string(),
        manual: None,
    };
    dispatcher
        .state()
        .registry()
        .upsert_tool_with_artifact(&record, DIVIDER_SCRIPT, ArtifactKind::Script)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn script_failure_is_logged_with_full_diagnostics() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    register_divider(&dispatcher).await;

    // A good call works.
    let ok = dispatcher
        .call_tool("divide", &persona, json!({"a": 10, "b": 2}))
        .await
        .unwrap();
    assert_eq!(ok, json!(5));

    // Division by zero fails, and the traceback lands in the log.
    let err = dispatcher
        .call_tool("divide", &persona, json!({"a": 1, "b": 0}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("division by zero"));

    let last = dispatcher
        .state()
        .recorder()
        .last_failure(Some("divide"))
        .await
        .unwrap()
        .unwrap();
    assert!(last
        .error_traceback
        .as_deref()
        .unwrap()
        .contains("division by zero"));
    assert_eq!(last.arguments, json!({"a": 1, "b": 0}));
}

#[tokio::test(flavor = "multi_thread")]
async fn get_last_error_formats_the_failure() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    register_divider(&dispatcher).await;

    let _ = dispatcher
        .call_tool("divide", &persona, json!({"a": 1, "b": 0}))
        .await;

    let report = dispatcher
        .call_tool("get_last_error", &persona, json!({"tool_name": "divide"}))
        .await
        .unwrap();
    let text = report.as_str().unwrap();
    assert!(text.contains("Last error for tool 'divide'"));
    assert!(text.contains("Time:"));
    assert!(text.contains("Persona: default"));
    assert!(text.contains("\"b\":0") || text.contains("\"b\": 0"));
    assert!(text.contains("division by zero"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failures_append_self_correction_lessons() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    register_divider(&dispatcher).await;

    let _ = dispatcher
        .call_tool("divide", &persona, json!({"a": 1, "b": 0}))
        .await;
    let _ = dispatcher
        .call_tool("divide", &persona, json!({"a": 2, "b": 0}))
        .await;

    let entry = dispatcher
        .state()
        .notebook()
        .get("self_correction", "divide_error")
        .await
        .unwrap()
        .unwrap();
    // Two failures, two appended lines; nothing overwritten.
    assert_eq!(entry.value.lines().count(), 2);
    assert!(entry.value.contains("division by zero"));
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_artifacts_are_detected() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    register_divider(&dispatcher).await;

    // Tamper with the stored body behind the digest's back.
    let record = dispatcher
        .state()
        .registry()
        .get_tool("divide", &persona)
        .await
        .unwrap()
        .unwrap();
    let tables = dispatcher.state().registry().tables().clone();
    sqlx::query(&format!(
        "UPDATE {} SET body = 'tampered' WHERE digest = ?",
        tables.qualified(&tables.artifacts)
    ))
    .bind(record.artifact_digest.as_str())
    .execute(dispatcher.state().registry().pool())
    .await
    .unwrap();

    let err = dispatcher
        .call_tool("divide", &persona, json!({"a": 1, "b": 1}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        quiver_mcp::DispatchError::ArtifactCorrupt { .. }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_calls_leave_a_terminal_failure_entry() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    // Once the signal has fired, a dispatched call fails with the
    // Cancelled diagnostic instead of running.
    dispatcher.state().cancel_all();
    let err = dispatcher
        .call_tool("utility_greet", &persona, json!({"name": "Late"}))
        .await
        .unwrap_err();
    assert!(matches!(err, quiver_mcp::DispatchError::Cancelled));

    // The audit entry is terminal: FAILURE with the cancellation text.
    let last = dispatcher
        .state()
        .recorder()
        .last_failure(Some("utility_greet"))
        .await
        .unwrap()
        .unwrap();
    assert!(last
        .error_traceback
        .as_deref()
        .unwrap()
        .contains("cancelled"));
}
