//! Workflow chains: DAG validation and cross-step substitution.

use serde_json::json;

use quiver_core::Persona;
use quiver_registry::ToolRecord;
use quiver_store::{ArtifactKind, Digest};

use super::common::online_dispatcher;

const LOCATION_SCRIPT: &str = r#"class Locator(Tool) {
    fn run(self, arguments) {
        return {city: "Kyoto", country: "JP"};
    }
}
"#;

async fn register_locator(dispatcher: &quiver_mcp::Dispatcher) {
    let record = ToolRecord {
        name: "get_location".to_string(),
        persona: Persona::default(),
        description: "Where are we?".to_string(),
        input_schema: json!({"type": "object", "properties": {}}),
        artifact_digest: Digest::of(LOCATION_SCRIPT),
        is_auto_created: false,
        group: "general".to_string(),
        manual: None,
    };
    dispatcher
        .state()
        .registry()
        .upsert_tool_with_artifact(&record, LOCATION_SCRIPT, ArtifactKind::Script)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn forward_references_are_rejected_before_any_step_runs() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    let err = dispatcher
        .call_tool(
            "execute_workflow",
            &persona,
            json!({
                "steps": [
                    {"id": "a", "tool": "utility_greet", "args": {"name": "${b}"}},
                    {"id": "b", "tool": "utility_greet", "args": {}}
                ]
            }),
        )
        .await
        .unwrap_err();

    let text = err.to_string();
    assert!(text.contains("future or unknown step 'b'"));
    assert!(text.contains("step 0"));

    // No step executed: the greet tool has no audit entries.
    let entries = dispatcher
        .state()
        .recorder()
        .recent("utility_greet", 10)
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn substitution_passes_fields_between_steps() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    register_locator(&dispatcher).await;

    let report = dispatcher
        .call_tool(
            "execute_workflow",
            &persona,
            json!({
                "steps": [
                    {"id": "loc", "tool": "get_location", "args": {}},
                    {"id": "g", "tool": "utility_greet", "args": {"name": "${loc.city}"}}
                ]
            }),
        )
        .await
        .unwrap();

    assert_eq!(report["status"], "SUCCESS");
    let steps = report["completed_steps"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert!(steps[1]["result"].as_str().unwrap().contains("Kyoto"));
    assert_eq!(report["results"]["loc"]["city"], "Kyoto");

    // Both audit entries recorded, in order.
    let loc_entries = dispatcher
        .state()
        .recorder()
        .recent("get_location", 10)
        .await
        .unwrap();
    let greet_entries = dispatcher
        .state()
        .recorder()
        .recent("utility_greet", 10)
        .await
        .unwrap();
    assert_eq!(loc_entries.len(), 1);
    assert_eq!(greet_entries.len(), 1);
    assert!(loc_entries[0].id.unwrap() < greet_entries[0].id.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_step_ids_are_rejected() {
    let dispatcher = online_dispatcher().await;
    let err = dispatcher
        .call_tool(
            "execute_workflow",
            &Persona::default(),
            json!({
                "steps": [
                    {"id": "x", "tool": "utility_greet", "args": {}},
                    {"id": "x", "tool": "utility_greet", "args": {}}
                ]
            }),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("duplicate step id 'x'"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_steps_halt_the_chain_with_a_partial_report() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    register_locator(&dispatcher).await;

    let report = dispatcher
        .call_tool(
            "execute_workflow",
            &persona,
            json!({
                "steps": [
                    {"id": "loc", "tool": "get_location", "args": {}},
                    {"id": "boom", "tool": "missing_tool", "args": {}},
                    {"id": "after", "tool": "utility_greet", "args": {}}
                ]
            }),
        )
        .await
        .unwrap();

    assert_eq!(report["status"], "FAILURE");
    assert_eq!(report["failed_step"]["id"], "boom");
    assert_eq!(report["failed_step"]["step"], 2);
    assert_eq!(report["completed_steps"].as_array().unwrap().len(), 1);

    // The step after the failure never ran.
    let entries = dispatcher
        .state()
        .recorder()
        .recent("utility_greet", 10)
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_nested_fields_fail_the_referencing_step() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    register_locator(&dispatcher).await;

    let err = dispatcher
        .call_tool(
            "execute_workflow",
            &persona,
            json!({
                "steps": [
                    {"id": "loc", "tool": "get_location", "args": {}},
                    {"id": "g", "tool": "utility_greet", "args": {"name": "${loc.planet}"}}
                ]
            }),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("'loc.planet'"));
}

#[tokio::test(flavor = "multi_thread")]
async fn scripts_can_compose_tools_via_the_sub_executor() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();
    register_locator(&dispatcher).await;

    let composer = r#"class Composer(Tool) {
    fn run(self, arguments) {
        let location = self.call_tool("get_location", {});
        return self.call_tool("utility_greet", {name: location["city"]});
    }
}
"#;
    let record = ToolRecord {
        name: "greet_here".to_string(),
        persona: Persona::default(),
        description: "Greet the current city".to_string(),
        input_schema: json!({"type": "object", "properties": {}}),
        artifact_digest: Digest::of(composer),
        is_auto_created: false,
        group: "general".to_string(),
        manual: None,
    };
    dispatcher
        .state()
        .registry()
        .upsert_tool_with_artifact(&record, composer, ArtifactKind::Script)
        .await
        .unwrap();

    let result = dispatcher
        .call_tool("greet_here", &persona, json!({}))
        .await
        .unwrap();
    assert!(result.as_str().unwrap().contains("Kyoto"));
}
