//! # lineal-core
//!
//! The versioned entity graph engine for Lineal - THE LOGIC.
//!
//! This crate implements the CORE substrate - a deterministic, in-memory
//! store of entity trees with two-tier identity (persistent ids that
//! change on versioning, runtime ids that change on every checkout),
//! lineage tracking, string-address resolution, and a callable execution
//! engine with provenance and audit records.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is the ONLY place where graph state exists (stateful)
//! - Is closed: no external logic runs besides registered callables
//! - Is deterministic: BTreeMap only, no HashMap, no randomness
//! - Has NO async, NO network dependencies, NO disk I/O (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod address;
pub mod diff;
pub mod executor;
pub mod primitives;
pub mod registry;
pub mod tree;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    EcsId, EdgeKind, Entity, EntityEdge, EntityKind, LineageId, LinealError, LiveId, Provenance,
    Value,
};

// =============================================================================
// RE-EXPORTS: Graph Engine
// =============================================================================

pub use address::{Address, AddressResolver, ArgKind, InputPattern, classify_args};
pub use diff::DiffEngine;
pub use executor::{
    Callable, CallableOutput, CallableRegistry, CallableSpec, ExecutionOutcome, ExecutionSemantic,
    ExecutionStatus, FieldKind, OutputShape, Shape, ShapeField,
};
pub use registry::EntityRegistry;
pub use tree::{EntityTree, TreeBuilder};
