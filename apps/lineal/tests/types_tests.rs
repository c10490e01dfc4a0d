//! Serialization tests for the API wire types and the JSON codec.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use lineal::api::{
    EntityJson, ExecuteRequest, HealthResponse, RegisterRequest, StatusResponse, json_to_value,
    value_to_json,
};
use lineal_core::{Entity, Value};
use serde_json::json;

// =============================================================================
// RESPONSE TYPE TESTS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_health_response_serialization() {
    let health = HealthResponse::default();
    let serialized = serde_json::to_value(&health).unwrap();
    assert_eq!(serialized["status"], json!("ok"));
}

#[test]
fn test_status_response_round_trip() {
    let status = StatusResponse {
        entity_count: 7,
        tree_count: 3,
        lineage_count: 2,
        function_count: 5,
    };
    let serialized = serde_json::to_string(&status).unwrap();
    let parsed: StatusResponse = serde_json::from_str(&serialized).unwrap();
    assert_eq!(parsed.entity_count, 7);
    assert_eq!(parsed.function_count, 5);
}

#[test]
fn test_execute_request_args_default_to_empty() {
    let parsed: ExecuteRequest = serde_json::from_str(r#"{"function": "raise_gpa"}"#).unwrap();
    assert_eq!(parsed.function, "raise_gpa");
    assert!(parsed.args.is_empty());
}

// =============================================================================
// JSON -> VALUE CODEC TESTS
// =============================================================================

#[test]
fn test_json_to_value_scalars() {
    assert_eq!(json_to_value(&json!(null)), Value::Null);
    assert_eq!(json_to_value(&json!(true)), Value::Bool(true));
    assert_eq!(json_to_value(&json!(42)), Value::Int(42));
    assert_eq!(json_to_value(&json!(2.5)), Value::Float(2.5));
    assert_eq!(json_to_value(&json!("hi")), Value::str("hi"));
}

#[test]
fn test_json_whole_numbers_become_ints() {
    // serde_json parses 3 as i64, so it maps to Int not Float
    assert_eq!(json_to_value(&json!(3)), Value::Int(3));
    assert_eq!(json_to_value(&json!(3.0)), Value::Float(3.0));
}

#[test]
fn test_json_array_becomes_list() {
    let value = json_to_value(&json!([1, "two", false]));
    assert_eq!(
        value,
        Value::List(vec![Value::Int(1), Value::str("two"), Value::Bool(false)])
    );
}

#[test]
fn test_json_plain_object_becomes_map() {
    let value = json_to_value(&json!({"a": 1, "b": 2}));
    let Value::Map(entries) = value else {
        panic!("expected a map");
    };
    assert_eq!(entries.get("a"), Some(&Value::Int(1)));
}

#[test]
fn test_json_kind_fields_object_becomes_entity() {
    let value = json_to_value(&json!({
        "kind": "Advisor",
        "fields": {"name": "Dr. Hopper", "tenured": true}
    }));
    let Value::Entity(entity) = value else {
        panic!("expected an entity");
    };
    assert_eq!(entity.kind.as_str(), "Advisor");
    assert_eq!(entity.field("name"), Some(&Value::str("Dr. Hopper")));
    assert_eq!(entity.field("tenured"), Some(&Value::Bool(true)));
}

#[test]
fn test_json_kind_without_fields_stays_a_map() {
    // "kind" alone is not enough to signal an entity
    let value = json_to_value(&json!({"kind": "Advisor"}));
    assert!(matches!(value, Value::Map(_)));
}

// =============================================================================
// VALUE -> JSON CODEC TESTS
// =============================================================================

#[test]
fn test_value_to_json_scalars() {
    assert_eq!(value_to_json(&Value::Null), json!(null));
    assert_eq!(value_to_json(&Value::Int(-3)), json!(-3));
    assert_eq!(value_to_json(&Value::str("x")), json!("x"));
}

#[test]
fn test_value_to_json_tuple_flattens_to_array() {
    let value = Value::Tuple(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(value_to_json(&value), json!([1, 2]));
}

#[test]
fn test_value_to_json_entity_carries_identity() {
    let advisor = Entity::new("Advisor").with_field("name", "Dr. Hopper");
    let rendered = value_to_json(&Value::entity(advisor.clone()));
    assert_eq!(rendered["kind"], json!("Advisor"));
    assert_eq!(rendered["ecs_id"], json!(advisor.ecs_id.0));
    assert_eq!(rendered["fields"]["name"], json!("Dr. Hopper"));
}

#[test]
fn test_codec_round_trip_for_nested_structures() {
    let original = json!({"grades": [1, 2, 3], "meta": {"active": true}});
    assert_eq!(value_to_json(&json_to_value(&original)), original);
}

// =============================================================================
// ENTITY JSON TESTS
// =============================================================================

#[test]
fn test_register_request_to_entity() {
    let request = RegisterRequest {
        kind: "Student".to_string(),
        fields: json!({"name": "Ada", "gpa": 3.0})
            .as_object()
            .unwrap()
            .clone(),
    };
    let entity = request.to_entity();
    assert_eq!(entity.kind.as_str(), "Student");
    assert_eq!(entity.field("name"), Some(&Value::str("Ada")));
    assert_eq!(entity.field("gpa"), Some(&Value::Float(3.0)));
}

#[test]
fn test_entity_json_from_entity() {
    let entity = Entity::new("Student")
        .with_field("name", "Ada")
        .with_field(
            "advisor",
            Value::entity(Entity::new("Advisor").with_field("name", "Dr. Hopper")),
        );

    let wire = EntityJson::from_entity(&entity);
    assert_eq!(wire.ecs_id, entity.ecs_id.0);
    assert_eq!(wire.lineage_id, entity.lineage_id.0);
    assert_eq!(wire.kind, "Student");
    assert_eq!(wire.fields["advisor"]["kind"], json!("Advisor"));
}

#[test]
fn test_entity_json_omits_empty_version_metadata() {
    let entity = Entity::new("Student");
    let serialized = serde_json::to_value(EntityJson::from_entity(&entity)).unwrap();
    let object = serialized.as_object().unwrap();
    assert!(!object.contains_key("previous_ecs_id"));
    assert!(!object.contains_key("old_ecs_ids"));
    assert!(!object.contains_key("output_index"));
    assert!(!object.contains_key("sibling_output_ids"));
}
