//! # Engine Bounds
//!
//! Hardcoded limits for the Lineal engine.
//!
//! Every operation in the core must be computationally bounded. These values
//! are compiled into the binary and immutable at runtime; oversized input is
//! rejected with `LinealError::LimitExceeded`, never truncated.

/// Maximum number of nodes a single entity tree may contain.
///
/// Tree build aborts once traversal discovers more entities than this.
pub const MAX_TREE_NODES: usize = 100_000;

/// Maximum nesting depth of sub-entities below a root.
///
/// Bounds the traversal stack and the length of any ancestry path.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Maximum byte length of a field name.
pub const MAX_FIELD_NAME_LENGTH: usize = 256;

/// Maximum number of fields on one entity.
pub const MAX_FIELDS_PER_ENTITY: usize = 1024;

/// Maximum byte length of an address string (`@id.field...`).
///
/// Addresses longer than this are rejected before parsing to prevent
/// memory exhaustion from malicious input.
pub const MAX_ADDRESS_LENGTH: usize = 4096;

/// Maximum number of field-path segments in one address.
pub const MAX_FIELD_PATH_SEGMENTS: usize = 32;

/// Maximum number of "did you mean" candidates attached to a resolution
/// or unregistered-function error.
pub const MAX_SUGGESTIONS: usize = 5;

/// Maximum Levenshtein distance for a name to count as a suggestion.
pub const SUGGESTION_MAX_DISTANCE: usize = 2;
