//! # API Request/Response Types
//!
//! JSON structures for the HTTP API, plus the codec between wire JSON and
//! core `Value`s.

use lineal_core::{CallableSpec, Entity, Value};
use serde::{Deserialize, Serialize};

// =============================================================================
// JSON <-> VALUE CODEC
// =============================================================================

/// Convert a wire JSON value into a core value.
///
/// Objects carrying a string `kind` and an object `fields` become nested
/// entities with fresh identity; any other object becomes a map. Numbers
/// with no fractional part become integers.
#[must_use]
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::str(s.clone()),
        serde_json::Value::Array(items) => {
            Value::List(items.iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(map) => {
            if let (Some(serde_json::Value::String(kind)), Some(serde_json::Value::Object(fields))) =
                (map.get("kind"), map.get("fields"))
            {
                let mut entity = Entity::new(kind.clone());
                for (name, value) in fields {
                    entity.set_field(name, json_to_value(value));
                }
                Value::entity(entity)
            } else {
                Value::Map(
                    map.iter()
                        .map(|(k, v)| (k.clone(), json_to_value(v)))
                        .collect(),
                )
            }
        }
    }
}

/// Convert a core value into wire JSON. Entities serialize with their
/// identity alongside their fields; sets and tuples flatten to arrays.
#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Entity(entity) => serde_json::to_value(EntityJson::from_entity(entity))
            .unwrap_or(serde_json::Value::Null),
        Value::List(items) | Value::Tuple(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::Set(members) => {
            serde_json::Value::Array(members.iter().map(value_to_json).collect())
        }
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Registry status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub entity_count: usize,
    pub tree_count: usize,
    pub lineage_count: usize,
    pub function_count: usize,
}

// =============================================================================
// ENTITY JSON
// =============================================================================

/// Wire representation of one entity version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityJson {
    pub ecs_id: u64,
    pub lineage_id: u64,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub previous_ecs_id: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub old_ecs_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub output_index: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub sibling_output_ids: Vec<u64>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl EntityJson {
    /// Build the wire shape from a core entity.
    #[must_use]
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            ecs_id: entity.ecs_id.0,
            lineage_id: entity.lineage_id.0,
            kind: entity.kind.as_str().to_string(),
            previous_ecs_id: entity.previous_ecs_id.map(|id| id.0),
            old_ecs_ids: entity.old_ecs_ids.iter().map(|id| id.0).collect(),
            output_index: entity.output_index,
            sibling_output_ids: entity.sibling_output_ids.iter().map(|id| id.0).collect(),
            fields: entity
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), value_to_json(value)))
                .collect(),
        }
    }
}

// =============================================================================
// REGISTER REQUEST/RESPONSE
// =============================================================================

/// Root entity registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub kind: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RegisterRequest {
    /// Build the root entity this request describes.
    #[must_use]
    pub fn to_entity(&self) -> Entity {
        let mut entity = Entity::new(self.kind.clone());
        for (name, value) in &self.fields {
            entity.set_field(name, json_to_value(value));
        }
        entity
    }
}

/// Registration response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub root_id: Option<u64>,
    pub lineage_id: Option<u64>,
    pub error: Option<String>,
}

impl RegisterResponse {
    #[must_use]
    pub fn success(root_id: u64, lineage_id: u64) -> Self {
        Self {
            success: true,
            root_id: Some(root_id),
            lineage_id: Some(lineage_id),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            root_id: None,
            lineage_id: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// FUNCTION RESPONSES
// =============================================================================

/// Registered function list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionListResponse {
    pub functions: Vec<String>,
}

/// One function's declared shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub spec: CallableSpec,
}

// =============================================================================
// LINEAGE RESPONSES
// =============================================================================

/// One lineage with its latest root id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageJson {
    pub lineage_id: u64,
    pub latest_root: u64,
}

/// Lineage list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineagesResponse {
    pub lineages: Vec<LineageJson>,
}

/// Full version history of one lineage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub lineage_id: u64,
    pub versions: Vec<u64>,
}

// =============================================================================
// EXECUTE REQUEST/RESPONSE
// =============================================================================

/// Function execution request.
///
/// Arguments pass through the codec: strings matching the address grammar
/// are borrowed, `{kind, fields}` objects become entity references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub function: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// Function execution response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub semantic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub outputs: Vec<EntityJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub input_ecs_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub audit_ecs_id: Option<u64>,
    pub error: Option<String>,
}

impl ExecuteResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            semantic: None,
            pattern: None,
            outputs: Vec::new(),
            input_ecs_id: None,
            audit_ecs_id: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// ADDRESS RESOLUTION RESPONSE
// =============================================================================

/// Address resolution response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub success: bool,
    pub value: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ResolveResponse {
    #[must_use]
    pub fn success(value: serde_json::Value) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(msg.into()),
        }
    }
}
