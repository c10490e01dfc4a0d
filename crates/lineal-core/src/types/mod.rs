//! # Core Type Definitions
//!
//! This module contains all core types for the Lineal entity graph substrate:
//! - Two-tier identity (`EcsId`, `LiveId`, `LineageId`)
//! - Deterministic dynamic values (`Value`)
//! - Schema-tagged records (`Entity`, `EntityKind`)
//! - Relationship metadata (`EntityEdge`, `EdgeKind`)
//! - Per-field provenance (`Provenance`)
//! - Error types (`LinealError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Compare floats via `f64::total_cmp` (total order, no NaN surprises)
//! - Allocate identifiers from one monotonic counter, never from addresses

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use thiserror::Error;

// =============================================================================
// IDENTIFIER ALLOCATION
// =============================================================================

/// Process-wide monotonic id source.
///
/// All three identifier kinds draw from the same counter, so a raw value is
/// never reused across kinds. Starts at 1; 0 is reserved as "never allocated".
static NEXT_RAW_ID: AtomicU64 = AtomicU64::new(1);

fn next_raw_id() -> u64 {
    NEXT_RAW_ID.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Monotonic sequence number for ordering audit records.
///
/// Drawn from the shared id counter, so every draw is totally ordered with
/// every id allocation in the process. The core has no clock; this stands
/// in for a wall-clock timestamp.
#[must_use]
pub(crate) fn execution_sequence() -> u64 {
    next_raw_id()
}

/// Persistent identifier: names exactly one *version* of a lineage.
///
/// An `EcsId` is stable for the life of that version. Versioning an entity
/// allocates a fresh `EcsId` and threads the old one into the version chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EcsId(pub u64);

impl EcsId {
    /// Allocate a fresh persistent id.
    #[must_use]
    pub fn fresh() -> Self {
        Self(next_raw_id())
    }
}

impl fmt::Display for EcsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runtime identifier: names one in-memory checkout of an entity.
///
/// Every retrieval from the registry produces a new `LiveId`, even for the
/// same `EcsId`. Never derived from a memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LiveId(pub u64);

impl LiveId {
    /// Allocate a fresh runtime id.
    #[must_use]
    pub fn fresh() -> Self {
        Self(next_raw_id())
    }
}

/// Lineage identifier: stable across all versions of one logical object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineageId(pub u64);

impl LineageId {
    /// Allocate a fresh lineage id.
    #[must_use]
    pub fn fresh() -> Self {
        Self(next_raw_id())
    }
}

// =============================================================================
// ENTITY KIND
// =============================================================================

/// The schema/type tag of an entity (e.g. `"Student"`, `"FunctionExecution"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKind(pub String);

impl EntityKind {
    /// Create a new kind tag from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the kind as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// PROVENANCE
// =============================================================================

/// Per-field provenance: which entity (by persistent id) contributed a value.
///
/// For container-valued fields the provenance is itself a parallel container,
/// one source per element or key. `None` marks an element with no recorded
/// source (a directly supplied value).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provenance {
    /// A scalar or whole-entity field sourced from one entity.
    Single(Option<EcsId>),
    /// Element-wise sources for list/tuple/set-valued fields.
    PerItem(Vec<Option<EcsId>>),
    /// Key-wise sources for map-valued fields.
    PerKey(BTreeMap<String, Option<EcsId>>),
}

impl Provenance {
    /// Build provenance for `value` attributing every element to `source`.
    ///
    /// Scalars and entities get `Single`; containers get a parallel
    /// per-element/per-key structure, as required for borrowed containers.
    #[must_use]
    pub fn for_value(value: &Value, source: EcsId) -> Self {
        match value {
            Value::List(items) | Value::Tuple(items) => {
                Self::PerItem(vec![Some(source); items.len()])
            }
            Value::Set(items) => Self::PerItem(vec![Some(source); items.len()]),
            Value::Map(entries) => Self::PerKey(
                entries
                    .keys()
                    .map(|k| (k.clone(), Some(source)))
                    .collect(),
            ),
            _ => Self::Single(Some(source)),
        }
    }
}

// =============================================================================
// VALUE
// =============================================================================

/// A deterministic dynamic value stored in an entity field.
///
/// Sub-entities are owned inline via `Value::Entity`; the graph builder
/// discovers them during traversal. All variants have a total order so
/// values can serve as `BTreeSet` members and `BTreeMap` keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Absent/null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// IEEE-754 double, ordered by `total_cmp`.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// An owned sub-entity (a node of the graph).
    Entity(Box<Entity>),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Fixed-arity ordered sequence.
    Tuple(Vec<Value>),
    /// Unordered, deduplicated collection (deterministically ordered).
    Set(BTreeSet<Value>),
    /// Key-value mapping with string keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Discriminant rank used for cross-variant ordering.
    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Str(_) => 4,
            Self::Entity(_) => 5,
            Self::List(_) => 6,
            Self::Tuple(_) => 7,
            Self::Set(_) => 8,
            Self::Map(_) => 9,
        }
    }

    /// Create a string value.
    #[must_use]
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Wrap an entity as a field value.
    #[must_use]
    pub fn entity(e: Entity) -> Self {
        Self::Entity(Box::new(e))
    }

    /// Borrow the inner entity, if this is an entity value.
    #[must_use]
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }

    /// Take the inner entity, if this is an entity value.
    #[must_use]
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Self::Entity(e) => Some(*e),
            _ => None,
        }
    }

    /// Borrow the inner float, if this is a float value.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Borrow the inner integer, if this is an integer value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Borrow the inner string, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Identity-insensitive equality.
    ///
    /// Entity values compare by kind, persistent id, and fields; runtime
    /// ids are ignored. This is the comparison the diff engine uses, since
    /// every checkout carries fresh runtime ids by design.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Entity(a), Self::Entity(b)) => a.semantic_eq(b),
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.semantic_eq(y))
            }
            (Self::Set(a), Self::Set(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.semantic_eq(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.semantic_eq(vb))
            }
            _ => self == other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Entity(a), Self::Entity(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => a.cmp(b),
            (Self::Set(a), Self::Set(b)) => a.cmp(b),
            (Self::Map(a), Self::Map(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Entity> for Value {
    fn from(v: Entity) -> Self {
        Self::Entity(Box::new(v))
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// A schema-tagged record with two-tier identity and per-field provenance.
///
/// Identity fields are engine-managed after creation: application code sets
/// them only through `Entity::new` and the registry/diff machinery.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    /// Persistent id of this version.
    pub ecs_id: EcsId,
    /// Runtime id of this in-memory instance.
    pub live_id: LiveId,
    /// Stable id of the logical object across versions.
    pub lineage_id: LineageId,
    /// The schema/type tag.
    pub kind: EntityKind,
    /// Persistent id of the tree root this entity belongs to (`None` = root).
    pub root_ecs_id: Option<EcsId>,
    /// Runtime id of the tree root instance (`None` = root).
    pub root_live_id: Option<LiveId>,
    /// Persistent id of the immediately preceding version.
    pub previous_ecs_id: Option<EcsId>,
    /// Full history of prior persistent ids, oldest first.
    pub old_ecs_ids: Vec<EcsId>,
    /// Position of this entity in a multi-entity function output.
    pub output_index: Option<usize>,
    /// Persistent ids of the other outputs produced by the same call.
    pub sibling_output_ids: Vec<EcsId>,
    /// Named field values.
    pub fields: BTreeMap<String, Value>,
    /// Per-field provenance (which entity contributed each value).
    pub attribute_source: BTreeMap<String, Provenance>,
}

impl Entity {
    /// Create a new root-less entity with fresh identity and no fields.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            ecs_id: EcsId::fresh(),
            live_id: LiveId::fresh(),
            lineage_id: LineageId::fresh(),
            kind: EntityKind::new(kind),
            root_ecs_id: None,
            root_live_id: None,
            previous_ecs_id: None,
            old_ecs_ids: Vec::new(),
            output_index: None,
            sibling_output_ids: Vec::new(),
            fields: BTreeMap::new(),
            attribute_source: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set or replace a field value.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field value by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether this entity is a tree root (no owning parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.root_ecs_id.is_none()
    }

    /// Identity-insensitive equality: kind, persistent id, and fields.
    ///
    /// Runtime ids, root pointers, and version-chain bookkeeping are
    /// ignored; this is the comparison used by attribute diffing.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.ecs_id == other.ecs_id
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.semantic_eq(vb))
    }

    /// Field-only equality, ignoring even the persistent id.
    ///
    /// Used for detecting whether a callable altered its input in place.
    #[must_use]
    pub fn fields_eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.semantic_eq(vb))
    }

    /// Thread this entity onto a new version id.
    ///
    /// The previous id moves into the chain; the lineage is untouched.
    pub fn promote_version(&mut self, new_id: EcsId) {
        let old = self.ecs_id;
        self.old_ecs_ids.push(old);
        self.previous_ecs_id = Some(old);
        self.ecs_id = new_id;
    }

    /// Detach this entity from its tree, making it a root.
    pub fn promote_to_root(&mut self) {
        self.root_ecs_id = None;
        self.root_live_id = None;
    }

    /// Visit every directly nested sub-entity in field order.
    ///
    /// Yields `(field_name, edge_kind, child)` without recursing into the
    /// children's own fields; callers drive the recursion.
    pub fn for_each_child<'a>(&'a self, mut f: impl FnMut(&'a str, EdgeKind, &'a Entity)) {
        for (name, value) in &self.fields {
            match value {
                Value::Entity(child) => f(name, EdgeKind::Direct, child),
                Value::List(items) => {
                    for (index, item) in items.iter().enumerate() {
                        if let Value::Entity(child) = item {
                            f(name, EdgeKind::ListItem { index }, child);
                        }
                    }
                }
                Value::Tuple(items) => {
                    for (index, item) in items.iter().enumerate() {
                        if let Value::Entity(child) = item {
                            f(name, EdgeKind::TupleItem { index }, child);
                        }
                    }
                }
                Value::Set(items) => {
                    for item in items {
                        if let Value::Entity(child) = item {
                            f(name, EdgeKind::SetMember, child);
                        }
                    }
                }
                Value::Map(entries) => {
                    for (key, item) in entries {
                        if let Value::Entity(child) = item {
                            f(name, EdgeKind::MapValue { key: key.clone() }, child);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

// =============================================================================
// EDGES
// =============================================================================

/// Classification of the relationship a field creates between two entities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Field value is the entity itself.
    Direct,
    /// Entity is an element of an ordered sequence.
    ListItem {
        /// Position within the list.
        index: usize,
    },
    /// Entity is an element of a fixed-arity tuple.
    TupleItem {
        /// Position within the tuple.
        index: usize,
    },
    /// Entity is a member of an unordered set.
    SetMember,
    /// Entity is a value of a key-value mapping.
    MapValue {
        /// The key under which the entity is stored.
        key: String,
    },
}

/// A directed relationship between two entities in a tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityEdge {
    /// Persistent id of the owning entity.
    pub source: EcsId,
    /// Persistent id of the owned entity.
    pub target: EcsId,
    /// Container classification of the relationship.
    pub kind: EdgeKind,
    /// Name of the field holding the target.
    pub field_name: String,
    /// Whether this is the first-discovery (ancestry) edge for the target.
    pub hierarchical: bool,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Lineal engine.
///
/// - No silent failures
/// - Build/registration errors abort only the operation in progress
/// - Execution errors are recorded for audit, then re-raised
#[derive(Debug, Error)]
pub enum LinealError {
    /// A structural invariant was violated at build or register time.
    #[error("invalid tree: {reason}")]
    InvalidTree {
        /// Which invariant failed and where.
        reason: String,
    },

    /// A runtime reference cycle was detected during graph build.
    #[error("reference cycle detected: runtime instance {live_id:?} reachable twice")]
    CyclicGraph {
        /// The runtime id encountered a second time.
        live_id: LiveId,
    },

    /// The address string is malformed (user-input error, pre-lookup).
    #[error("malformed address '{address}': {reason}")]
    AddressFormat {
        /// The offending address.
        address: String,
        /// What made it unparseable.
        reason: String,
    },

    /// A well-formed address whose id or field path does not resolve.
    #[error("cannot resolve '{address}': segment '{segment}' not found{}", suggestion_suffix(.suggestions))]
    AddressResolution {
        /// The full address being resolved.
        address: String,
        /// The segment that failed to resolve.
        segment: String,
        /// Nearby candidates (ids or field names) for diagnostics.
        suggestions: Vec<String>,
    },

    /// Execution requested for an unknown function name.
    #[error("no function registered under '{name}'{}", suggestion_suffix(.suggestions))]
    UnregisteredFunction {
        /// The requested name.
        name: String,
        /// Registered names close to the request.
        suggestions: Vec<String>,
    },

    /// Registration requested under a name that is already taken.
    #[error("function '{name}' is already registered; unregister it first")]
    DuplicateFunction {
        /// The contested name.
        name: String,
    },

    /// The registered function itself failed.
    #[error("execution of '{function}' failed: {message}")]
    Execution {
        /// Name of the failing function.
        function: String,
        /// Persistent id of the composed input entity, if one was built.
        input_ecs_id: Option<EcsId>,
        /// The original error message.
        message: String,
    },

    /// A persistent id was expected to be registered but is not.
    #[error("entity not found: {0:?}")]
    EntityNotFound(EcsId),

    /// A hardcoded input bound was exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

/// Render a suggestion list as an error-message suffix.
fn suggestion_suffix(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {})", suggestions.join(", "))
    }
}

// =============================================================================
// TESTS
// =============================================================================
