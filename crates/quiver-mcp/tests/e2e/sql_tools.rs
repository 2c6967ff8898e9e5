//! SQL tool creation and parameterized dispatch.

use serde_json::json;

use quiver_core::Persona;
use quiver_mcp::DispatchError;

use super::common::online_dispatcher;

const SALES_TEMPLATE: &str = "SELECT store, SUM(amount) AS total FROM sales WHERE 1=1 \
    {% if arguments.store %} AND store = :store {% endif %} GROUP BY store";

#[tokio::test(flavor = "multi_thread")]
async fn created_sql_tool_filters_by_bound_parameter() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    dispatcher
        .call_tool(
            "create_new_sql_tool",
            &persona,
            json!({
                "tool_name": "get_sales_by_store",
                "description": "Sales totals per store, optionally filtered",
                "sql_query": SALES_TEMPLATE,
                "parameters": {
                    "store": {"type": "string", "description": "Store name", "required": false}
                }
            }),
        )
        .await
        .unwrap();

    // Filtered call: at most one row, for store A.
    let filtered = dispatcher
        .call_tool("get_sales_by_store", &persona, json!({"store": "A"}))
        .await
        .unwrap();
    let rows = filtered.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["store"], "A");
    assert_eq!(rows[0]["total"], 200.5);

    // Unfiltered call: one row per store.
    let all = dispatcher
        .call_tool("get_sales_by_store", &persona, json!({}))
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn created_tool_is_listed_with_auto_marker() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    dispatcher
        .call_tool(
            "create_new_sql_tool",
            &persona,
            json!({
                "tool_name": "all_sales",
                "description": "Every sales row",
                "sql_query": "SELECT * FROM sales"
            }),
        )
        .await
        .unwrap();

    let tools = dispatcher.list_tools(&persona).await.unwrap();
    let entry = tools.iter().find(|t| t.name == "all_sales").unwrap();
    assert!(entry.description.starts_with("[AUTO]"));
}

#[tokio::test(flavor = "multi_thread")]
async fn forbidden_write_is_rejected_and_nothing_is_stored() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    let artifacts_before = dispatcher.state().registry().store().count().await.unwrap();

    let err = dispatcher
        .call_tool(
            "create_new_sql_tool",
            &persona,
            json!({
                "tool_name": "nuke",
                "description": "should never exist",
                "sql_query": "DELETE FROM sales"
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Policy(quiver_policy::PolicyError::NotReadOnly { .. })
    ));

    // No artifact was stored and no tool registered.
    let artifacts_after = dispatcher.state().registry().store().count().await.unwrap();
    assert_eq!(artifacts_before, artifacts_after);
    assert!(dispatcher
        .state()
        .registry()
        .get_tool("nuke", &persona)
        .await
        .unwrap()
        .is_none());

    // The failure is on the record.
    let entries = dispatcher
        .state()
        .recorder()
        .recent("create_new_sql_tool", 10)
        .await
        .unwrap();
    assert_eq!(entries[0].status, quiver_audit::ExecutionStatus::Failure);
}

#[tokio::test(flavor = "multi_thread")]
async fn auto_created_tools_are_capped_at_1000_rows() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    dispatcher
        .call_tool(
            "create_new_sql_tool",
            &persona,
            json!({
                "tool_name": "capped",
                "description": "rows with a huge limit",
                "sql_query": "SELECT * FROM sales LIMIT 999999"
            }),
        )
        .await
        .unwrap();

    // The stored LIMIT is replaced by the 1000-row cap; with 5 rows the
    // call simply succeeds.
    let result = dispatcher
        .call_tool("capped", &persona, json!({}))
        .await
        .unwrap();
    assert_eq!(result.as_array().unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn temp_tools_cap_at_three_rows_and_list_with_marker() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    dispatcher
        .call_tool(
            "create_temp_tool",
            &persona,
            json!({
                "tool_name": "peek_sales",
                "description": "quick look at sales",
                "sql_query": "SELECT * FROM sales"
            }),
        )
        .await
        .unwrap();

    let result = dispatcher
        .call_tool("peek_sales", &persona, json!({}))
        .await
        .unwrap();
    assert_eq!(result.as_array().unwrap().len(), 3, "LIMIT 3 applies");

    let tools = dispatcher.list_tools(&persona).await.unwrap();
    let entry = tools.iter().find(|t| t.name == "peek_sales").unwrap();
    assert!(entry.description.starts_with("[TEMP]"));

    // Including a LIMIT in the body is rejected up front.
    let err = dispatcher
        .call_tool(
            "create_temp_tool",
            &persona,
            json!({
                "tool_name": "bad_temp",
                "description": "has a limit",
                "sql_query": "SELECT * FROM sales LIMIT 10"
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidInput(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn macros_are_visible_in_every_render() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    dispatcher
        .call_tool(
            "register_macro",
            &persona,
            json!({
                "name": "store_filter",
                "description": "optional store filter",
                "template": "{% macro store_filter() %}AND store = :store{% endmacro %}"
            }),
        )
        .await
        .unwrap();

    dispatcher
        .call_tool(
            "create_new_sql_tool",
            &persona,
            json!({
                "tool_name": "macro_sales",
                "description": "sales using the shared macro",
                "sql_query": "SELECT store, amount FROM sales WHERE 1=1 {{ store_filter() }}"
            }),
        )
        .await
        .unwrap();

    let rows = dispatcher
        .call_tool("macro_sales", &persona, json!({"store": "B"}))
        .await
        .unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["store"] == "B"));
}
