//! Wire-level tests for the JSON-RPC endpoint and companion routes, over
//! real HTTP round trips.

mod common;

use std::sync::Arc;

use common::{
    build_orchestrator, message_send_request, routing_json, start_test_server, test_config,
    Behavior, ScriptedAgent, ScriptedChatClient,
};

async fn light_server() -> (String, tokio::task::JoinHandle<()>) {
    let chat = Arc::new(ScriptedChatClient::repeating(&routing_json(
        "light-agent",
        &[("light-agent", "Turn on the kitchen lights")],
        0.95,
    )));
    let orchestrator = build_orchestrator(
        test_config(),
        chat,
        vec![ScriptedAgent::new(
            "light-agent",
            Behavior::Reply("Kitchen lights are on.".to_string()),
        )],
    )
    .await;
    start_test_server(orchestrator).await
}

#[tokio::test]
async fn message_send_returns_assistant_message_with_metadata() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    let body = message_send_request(1, "Turn on the kitchen lights", "C1");
    let resp = client
        .post(format!("{base_url}/a2a/lucia/v1"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["jsonrpc"], "2.0");
    assert_eq!(json["id"], 1);
    assert!(json.get("error").is_none());

    let result = &json["result"];
    assert_eq!(result["kind"], "message");
    assert_eq!(result["role"], "assistant");
    assert_eq!(result["parts"][0]["text"], "Kitchen lights are on.");
    assert_eq!(result["contextId"], "C1");
    assert_eq!(result["metadata"]["agents_used"][0], "light-agent");
    assert_eq!(result["metadata"]["task_state"], "fresh");
    assert!(result["metadata"]["execution_time_ms"].is_number());
}

#[tokio::test]
async fn empty_parts_is_invalid_params() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "message/send",
        "params": {
            "message": {
                "kind": "message",
                "role": "user",
                "parts": [],
                "messageId": "m-1",
                "contextId": "C1"
            }
        }
    });
    let resp = client
        .post(format!("{base_url}/a2a/lucia/v1"))
        .json(&body)
        .send()
        .await
        .unwrap();

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], -32602);
    assert_eq!(json["id"], 7);
}

#[tokio::test]
async fn missing_message_is_invalid_params() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 8,
        "method": "message/send",
        "params": {}
    });
    let resp = client
        .post(format!("{base_url}/a2a/lucia/v1"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], -32602);
}

#[tokio::test]
async fn malformed_json_is_parse_error() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base_url}/a2a/lucia/v1"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], -32700);
}

#[tokio::test]
async fn wrong_jsonrpc_version_is_invalid_request() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    let body = serde_json::json!({"jsonrpc": "1.0", "id": 1, "method": "message/send"});
    let resp = client
        .post(format!("{base_url}/a2a/lucia/v1"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], -32600);
}

#[tokio::test]
async fn unknown_method_and_unknown_agent_are_method_not_found() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "message/teleport"});
    let resp = client
        .post(format!("{base_url}/a2a/lucia/v1"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], -32601);

    let body = message_send_request(2, "hello", "C1");
    let resp = client
        .post(format!("{base_url}/a2a/other-agent/v1"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], -32601);
}

#[tokio::test]
async fn reserved_methods_answer_their_designated_codes() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    for (method, code) in [
        ("message/stream", -32004),
        ("tasks/get", -32001),
        ("tasks/cancel", -32002),
    ] {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": {"id": "T1"}
        });
        let resp = client
            .post(format!("{base_url}/a2a/lucia/v1"))
            .json(&body)
            .send()
            .await
            .unwrap();
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["error"]["code"], code, "method {method}");
    }
}

#[tokio::test]
async fn well_known_serves_the_orchestrator_card() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base_url}/.well-known/agent.json"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let card: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(card["id"], "lucia");
    assert!(card["description"].as_str().unwrap().contains("orchestrator"));
}

#[tokio::test]
async fn registry_api_lists_registered_agents() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base_url}/api/agents"))
        .send()
        .await
        .unwrap();
    let cards: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(cards[0]["id"], "light-agent");
}

#[tokio::test]
async fn diagnostics_health_requires_the_configured_token() {
    let chat = Arc::new(ScriptedChatClient::repeating("{}"));
    let mut config = test_config();
    config.diagnostics_token = Some("hunter2".to_string());
    let orchestrator = build_orchestrator(
        config,
        chat,
        vec![ScriptedAgent::new(
            "light-agent",
            Behavior::Reply("x".to_string()),
        )],
    )
    .await;
    let (base_url, _handle) = start_test_server(orchestrator).await;
    let client = reqwest::Client::new();

    let denied = client
        .get(format!("{base_url}/internal/orchestration/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 401);

    let allowed = client
        .get(format!("{base_url}/internal/orchestration/health"))
        .header("Authorization", "Bearer hunter2")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
    let json: serde_json::Value = allowed.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["agents"], 1);
}

#[tokio::test]
async fn routing_log_fills_after_requests() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    let body = message_send_request(1, "Turn on the kitchen lights", "C1");
    client
        .post(format!("{base_url}/a2a/lucia/v1"))
        .json(&body)
        .send()
        .await
        .unwrap();

    let resp = client
        .get(format!("{base_url}/internal/orchestration/routing-log"))
        .send()
        .await
        .unwrap();
    let log: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(log[0]["primary"], "light-agent");
    assert_eq!(log[0]["confidence"], 0.95);
}

#[tokio::test]
async fn task_diagnostics_report_the_persisted_record() {
    let (base_url, _handle) = light_server().await;
    let client = reqwest::Client::new();

    // Send a turn that persists a task record.
    let mut body = message_send_request(1, "Turn on the kitchen lights", "C1");
    body["params"]["message"]["taskId"] = serde_json::json!("T-diag");
    client
        .post(format!("{base_url}/a2a/lucia/v1"))
        .json(&body)
        .send()
        .await
        .unwrap();

    let record: serde_json::Value = client
        .get(format!("{base_url}/internal/orchestration/tasks/T-diag"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["taskId"], "T-diag");
    assert!(record["etag"].is_string());

    let rehydrated: serde_json::Value = client
        .post(format!(
            "{base_url}/internal/orchestration/tasks/T-diag/rehydrate"
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rehydrated["sessionId"], "C1");
    assert_eq!(rehydrated["turns"], 1);

    let missing = client
        .get(format!("{base_url}/internal/orchestration/tasks/T-none"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
