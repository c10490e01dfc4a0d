//! Integration tests for the Lineal HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::HeaderValue;
use axum_test::TestServer;
use lineal::api::{
    AppState, CoreState, EntityJson, ExecuteRequest, ExecuteResponse, FunctionListResponse,
    FunctionResponse, HealthResponse, HistoryResponse, LineagesResponse, RegisterRequest,
    RegisterResponse, ResolveResponse, StatusResponse, create_router,
};
use lineal::config::ServerConfig;
use serde_json::json;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Create a test server around the given engine state and config.
fn server_with(core: CoreState, config: &ServerConfig) -> TestServer {
    let state = AppState::new(core);
    let router = create_router(state, config);
    TestServer::new(router).unwrap()
}

/// Create a test server with the demo engine and default (open) config.
fn demo_server() -> TestServer {
    server_with(CoreState::demo().unwrap(), &ServerConfig::default())
}

/// The sample student's root id, via the lineages endpoint.
async fn sample_student_id(server: &TestServer) -> u64 {
    let lineages: LineagesResponse = server.get("/lineages").await.json();
    assert_eq!(lineages.lineages.len(), 1, "demo state has one lineage");
    lineages.lineages[0].latest_root
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = demo_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// STATUS ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_status_empty_state() {
    let server = server_with(CoreState::new(), &ServerConfig::default());

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.entity_count, 0);
    assert_eq!(status.tree_count, 0);
    assert_eq!(status.lineage_count, 0);
    assert_eq!(status.function_count, 0);
}

#[tokio::test]
async fn test_status_demo_state() {
    let server = demo_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.entity_count, 1);
    assert_eq!(status.tree_count, 1);
    assert_eq!(status.lineage_count, 1);
    assert_eq!(status.function_count, 3);
}

// =============================================================================
// FUNCTION ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_functions_list() {
    let server = demo_server();

    let response = server.get("/functions").await;

    response.assert_status_ok();
    let list: FunctionListResponse = response.json();
    assert_eq!(
        list.functions,
        vec![
            "new_student".to_string(),
            "raise_gpa".to_string(),
            "split_student".to_string()
        ]
    );
}

#[tokio::test]
async fn test_function_shapes() {
    let server = demo_server();

    let response = server.get("/functions/raise_gpa").await;

    response.assert_status_ok();
    let function: FunctionResponse = response.json();
    assert_eq!(function.name, "raise_gpa");
    assert_eq!(function.spec.input_shape.kind, "RaiseGpaInput");
    assert_eq!(function.spec.input_shape.fields.len(), 2);
}

#[tokio::test]
async fn test_unknown_function_is_404() {
    let server = demo_server();

    let response = server.get("/functions/nope").await;
    response.assert_status_not_found();
}

// =============================================================================
// LINEAGE ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_lineage_history() {
    let server = demo_server();

    let lineages: LineagesResponse = server.get("/lineages").await.json();
    let lineage_id = lineages.lineages[0].lineage_id;

    let response = server
        .get(&format!("/lineages/{lineage_id}/history"))
        .await;

    response.assert_status_ok();
    let history: HistoryResponse = response.json();
    assert_eq!(history.lineage_id, lineage_id);
    assert_eq!(history.versions.len(), 1);
    assert_eq!(history.versions[0], lineages.lineages[0].latest_root);
}

#[tokio::test]
async fn test_unknown_lineage_is_404() {
    let server = demo_server();

    let response = server.get("/lineages/999999/history").await;
    response.assert_status_not_found();
}

// =============================================================================
// ENTITY ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_register_then_fetch_entity() {
    let server = demo_server();

    let request = RegisterRequest {
        kind: "Course".to_string(),
        fields: json!({"title": "Databases", "credits": 6})
            .as_object()
            .unwrap()
            .clone(),
    };
    let response = server.post("/entities").json(&request).await;

    response.assert_status_ok();
    let registered: RegisterResponse = response.json();
    assert!(registered.success);
    let root_id = registered.root_id.unwrap();

    let fetched = server.get(&format!("/entities/{root_id}/{root_id}")).await;
    fetched.assert_status_ok();
    let entity: EntityJson = fetched.json();
    assert_eq!(entity.kind, "Course");
    assert_eq!(entity.fields["title"], json!("Databases"));
    assert_eq!(entity.fields["credits"], json!(6));
}

#[tokio::test]
async fn test_register_nested_entity() {
    let server = demo_server();

    let request = RegisterRequest {
        kind: "Student".to_string(),
        fields: json!({
            "name": "Grace",
            "advisor": {"kind": "Advisor", "fields": {"name": "Dr. Hopper"}}
        })
        .as_object()
        .unwrap()
        .clone(),
    };
    let response = server.post("/entities").json(&request).await;
    response.assert_status_ok();
    let registered: RegisterResponse = response.json();
    let root_id = registered.root_id.unwrap();

    // The nested advisor serializes with its own persistent id.
    let entity: EntityJson = server
        .get(&format!("/entities/{root_id}/{root_id}"))
        .await
        .json();
    let advisor = entity.fields["advisor"].as_object().unwrap();
    assert_eq!(advisor["kind"], json!("Advisor"));
    let advisor_id = advisor["ecs_id"].as_u64().unwrap();

    let nested = server
        .get(&format!("/entities/{root_id}/{advisor_id}"))
        .await;
    nested.assert_status_ok();
}

#[tokio::test]
async fn test_register_empty_kind_rejected() {
    let server = demo_server();

    let request = json!({"kind": "", "fields": {}});
    let response = server.post("/entities").json(&request).await;

    response.assert_status_bad_request();
    let registered: RegisterResponse = response.json();
    assert!(!registered.success);
    assert!(registered.error.is_some());
}

#[tokio::test]
async fn test_unknown_entity_is_404() {
    let server = demo_server();

    let response = server.get("/entities/999999/999999").await;
    response.assert_status_not_found();
}

// =============================================================================
// RESOLUTION ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_resolve_field_address() {
    let server = demo_server();
    let student_id = sample_student_id(&server).await;

    let response = server
        .get(&format!("/resolve?address=@{student_id}.name"))
        .await;

    response.assert_status_ok();
    let resolved: ResolveResponse = response.json();
    assert!(resolved.success);
    assert_eq!(resolved.value, Some(json!("Ada")));
}

#[tokio::test]
async fn test_resolve_missing_field_is_404_with_suggestions() {
    let server = demo_server();
    let student_id = sample_student_id(&server).await;

    let response = server
        .get(&format!("/resolve?address=@{student_id}.nam"))
        .await;

    response.assert_status_not_found();
    let resolved: ResolveResponse = response.json();
    assert!(!resolved.success);
    assert!(resolved.error.unwrap().contains("name"));
}

#[tokio::test]
async fn test_resolve_malformed_address_is_400() {
    let server = demo_server();

    let response = server.get("/resolve?address=notanaddress").await;
    response.assert_status_bad_request();
}

// =============================================================================
// EXECUTE ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_execute_mutation_advances_lineage() {
    let server = demo_server();
    let student_id = sample_student_id(&server).await;
    let lineages: LineagesResponse = server.get("/lineages").await.json();
    let lineage_id = lineages.lineages[0].lineage_id;

    let request = ExecuteRequest {
        function: "raise_gpa".to_string(),
        args: json!({"student": format!("@{student_id}"), "amount": 0.5})
            .as_object()
            .unwrap()
            .clone(),
    };
    let response = server.post("/execute").json(&request).await;

    response.assert_status_ok();
    let result: ExecuteResponse = response.json();
    assert!(result.success);
    assert_eq!(result.semantic.as_deref(), Some("mutation"));
    assert_eq!(result.outputs.len(), 1);
    assert_eq!(result.outputs[0].fields["gpa"], json!(3.5));

    // The student lineage gained a version.
    let history: HistoryResponse = server
        .get(&format!("/lineages/{lineage_id}/history"))
        .await
        .json();
    assert_eq!(history.versions.len(), 2);
    assert_eq!(*history.versions.last().unwrap(), result.outputs[0].ecs_id);
}

#[tokio::test]
async fn test_execute_multi_output_siblings() {
    let server = demo_server();
    let student_id = sample_student_id(&server).await;

    let request = ExecuteRequest {
        function: "split_student".to_string(),
        args: json!({"student": format!("@{student_id}")})
            .as_object()
            .unwrap()
            .clone(),
    };
    let response = server.post("/execute").json(&request).await;

    response.assert_status_ok();
    let result: ExecuteResponse = response.json();
    assert!(result.success);
    assert_eq!(result.outputs.len(), 2);
    assert_eq!(result.outputs[0].output_index, Some(0));
    assert_eq!(result.outputs[1].output_index, Some(1));
    assert_eq!(
        result.outputs[0].sibling_output_ids,
        vec![result.outputs[1].ecs_id]
    );
}

#[tokio::test]
async fn test_execute_unknown_function_is_404() {
    let server = demo_server();

    let request = ExecuteRequest {
        function: "not_registered".to_string(),
        args: serde_json::Map::new(),
    };
    let response = server.post("/execute").json(&request).await;

    response.assert_status_not_found();
    let result: ExecuteResponse = response.json();
    assert!(!result.success);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_execute_failing_callable_is_422() {
    let server = demo_server();

    // raise_gpa without a student argument makes the callable itself fail.
    let request = ExecuteRequest {
        function: "raise_gpa".to_string(),
        args: json!({"amount": 0.5}).as_object().unwrap().clone(),
    };
    let response = server.post("/execute").json(&request).await;

    assert_eq!(response.status_code().as_u16(), 422);
    let result: ExecuteResponse = response.json();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("raise_gpa"));
}

// =============================================================================
// AUTHENTICATION MIDDLEWARE TESTS
// =============================================================================

/// Create a test server with authentication enabled.
fn auth_server(api_key: &str) -> TestServer {
    let config = ServerConfig {
        api_key: Some(api_key.to_string()),
        ..ServerConfig::default()
    };
    server_with(CoreState::demo().unwrap(), &config)
}

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let api_key = "test-secret-key-12345";
    let server = auth_server(api_key);

    let response = server
        .get("/status")
        .add_header(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {api_key}").parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_valid_raw_token() {
    let api_key = "test-raw-key-67890";
    let server = auth_server(api_key);

    // Raw token format (without "Bearer " prefix)
    let response = server
        .get("/status")
        .add_header(
            axum::http::header::AUTHORIZATION,
            api_key.parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_invalid_token_rejected() {
    let server = auth_server("correct-key");

    let response = server
        .get("/status")
        .add_header(
            axum::http::header::AUTHORIZATION,
            "Bearer wrong-key".parse::<HeaderValue>().unwrap(),
        )
        .await;

    assert_eq!(response.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_auth_missing_header_rejected() {
    let server = auth_server("required-key");

    let response = server.get("/status").await;

    assert_eq!(response.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_auth_health_endpoint_bypasses_auth() {
    let server = auth_server("secret-key-for-bypass-test");

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
}

// =============================================================================
// ERROR HANDLING TESTS
// =============================================================================

#[tokio::test]
async fn test_404_on_unknown_endpoint() {
    let server = demo_server();

    let response = server.get("/unknown").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_method_not_allowed() {
    let server = demo_server();

    // /health is GET only
    let response = server.post("/health").await;
    assert_eq!(response.status_code().as_u16(), 405);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let server = demo_server();

    let response = server
        .post("/entities")
        .bytes(bytes::Bytes::from("not valid json"))
        .content_type("application/json")
        .await;

    assert!(response.status_code().is_client_error());
}
