//! Offline mode: no data session.

use serde_json::json;

use quiver_core::Persona;
use quiver_mcp::{DispatchError, Dispatcher};

use super::common::offline_state;

#[tokio::test(flavor = "multi_thread")]
async fn listings_work_but_sql_dispatch_fails_recoverably() {
    let dispatcher = Dispatcher::new(offline_state().await);
    let persona = Persona::default();

    // Metadata operations keep working.
    let tools = dispatcher.list_tools(&persona).await.unwrap();
    assert!(!tools.is_empty());

    // Script tools keep working too: greet needs no data session.
    dispatcher
        .call_tool("utility_greet", &persona, json!({"name": "Offline"}))
        .await
        .unwrap();

    // A select-kind dispatch fails with the recoverable offline error.
    dispatcher
        .call_tool(
            "create_new_sql_tool",
            &persona,
            json!({
                "tool_name": "needs_data",
                "description": "needs the data db",
                "sql_query": "SELECT 1 AS n"
            }),
        )
        .await
        .unwrap();
    let err = dispatcher
        .call_tool("needs_data", &persona, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::DataBackendUnavailable));
}

#[tokio::test(flavor = "multi_thread")]
async fn db_lifecycle_tools_report_offline_state() {
    let dispatcher = Dispatcher::new(offline_state().await);
    let persona = Persona::default();

    let probe = dispatcher
        .call_tool("test_db_connection", &persona, json!({}))
        .await
        .unwrap();
    assert!(probe.as_str().unwrap().contains("offline"));

    // With no data URL configured, reconnect reports the server stays
    // offline rather than failing.
    let reconnect = dispatcher
        .call_tool("reconnect_db", &persona, json!({}))
        .await
        .unwrap();
    assert!(reconnect.as_str().unwrap().contains("unavailable"));
}
