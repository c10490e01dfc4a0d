//! # Address Resolver
//!
//! String addresses of the form `@<id>.<field>.<subfield>` name values
//! inside registered entities. A bare `@<id>` names the whole entity.
//!
//! - Format validation happens before any lookup; a malformed address and a
//!   well-formed-but-unknown address are distinct error kinds
//! - Resolution walks immutable checkout copies, never live registry state
//! - Failures carry "did you mean" candidates for actionable diagnostics

use crate::primitives::{
    MAX_ADDRESS_LENGTH, MAX_FIELD_PATH_SEGMENTS, MAX_SUGGESTIONS, SUGGESTION_MAX_DISTANCE,
};
use crate::registry::EntityRegistry;
use crate::{EcsId, LinealError, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// PARSED ADDRESS
// =============================================================================

/// A parsed address: target persistent id plus an optional field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// The persistent id the address points at.
    pub ecs_id: EcsId,
    /// Successive field/key/index segments, outermost first.
    pub path: Vec<String>,
}

impl Address {
    /// Parse an address string, validating the format only.
    ///
    /// Grammar: `@` + decimal id + (`.` + segment)*. Segments are non-empty
    /// runs of `[A-Za-z0-9_]`. No lookup is performed.
    pub fn parse(address: &str) -> Result<Self, LinealError> {
        let fail = |reason: &str| {
            Err(LinealError::AddressFormat {
                address: address.to_string(),
                reason: reason.to_string(),
            })
        };

        if address.len() > MAX_ADDRESS_LENGTH {
            return fail("address exceeds maximum length");
        }
        let Some(body) = address.strip_prefix('@') else {
            return fail("missing '@' prefix");
        };
        if body.is_empty() {
            return fail("empty address body");
        }

        let mut segments = body.split('.');
        let Some(id_part) = segments.next() else {
            return fail("empty address body");
        };
        if id_part.is_empty() || !id_part.bytes().all(|b| b.is_ascii_digit()) {
            return fail("id must be a decimal number");
        }
        let Ok(raw_id) = id_part.parse::<u64>() else {
            return fail("id out of range");
        };

        let mut path = Vec::new();
        for segment in segments {
            if segment.is_empty() {
                return fail("empty path segment");
            }
            if !segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
            {
                return fail("path segment contains invalid characters");
            }
            path.push(segment.to_string());
        }
        if path.len() > MAX_FIELD_PATH_SEGMENTS {
            return fail("too many path segments");
        }

        Ok(Self {
            ecs_id: EcsId(raw_id),
            path,
        })
    }

    /// Whether a string is a well-formed address.
    #[must_use]
    pub fn is_address(candidate: &str) -> bool {
        Self::parse(candidate).is_ok()
    }
}

// =============================================================================
// RESOLUTION
// =============================================================================

/// The AddressResolver turns address strings into values from the registry.
pub struct AddressResolver;

impl AddressResolver {
    /// Resolve an address to a value.
    ///
    /// The owning root is found via the registry's member index, an
    /// immutable checkout of the target entity is taken, and the field
    /// path is walked with successive lookups. A bare `@id` yields the
    /// whole entity as a value.
    pub fn resolve(registry: &EntityRegistry, address: &str) -> Result<Value, LinealError> {
        let parsed = Address::parse(address)?;

        let Some(root_id) = registry.root_of(parsed.ecs_id) else {
            return Err(LinealError::AddressResolution {
                address: address.to_string(),
                segment: format!("@{}", parsed.ecs_id),
                suggestions: suggest_ids(registry, parsed.ecs_id),
            });
        };
        let Some(entity) = registry.get_stored_entity(root_id, parsed.ecs_id) else {
            return Err(LinealError::AddressResolution {
                address: address.to_string(),
                segment: format!("@{}", parsed.ecs_id),
                suggestions: suggest_ids(registry, parsed.ecs_id),
            });
        };

        let mut current = Value::entity(entity);
        for segment in &parsed.path {
            current = descend(current, segment).map_err(|suggestions| {
                LinealError::AddressResolution {
                    address: address.to_string(),
                    segment: segment.clone(),
                    suggestions,
                }
            })?;
        }
        Ok(current)
    }
}

/// One step of path walking: entity field, map key, or sequence index.
///
/// On failure returns the suggestion list for the error.
fn descend(current: Value, segment: &str) -> Result<Value, Vec<String>> {
    match current {
        Value::Entity(entity) => {
            if let Some(value) = entity.fields.get(segment) {
                Ok(value.clone())
            } else {
                Err(suggest_names(segment, entity.fields.keys()))
            }
        }
        Value::Map(entries) => {
            if let Some(value) = entries.get(segment) {
                Ok(value.clone())
            } else {
                Err(suggest_names(segment, entries.keys()))
            }
        }
        Value::List(items) | Value::Tuple(items) => {
            let Ok(index) = segment.parse::<usize>() else {
                return Err(Vec::new());
            };
            items.into_iter().nth(index).ok_or_else(Vec::new)
        }
        _ => Err(Vec::new()),
    }
}

/// Registered ids whose decimal form is close to the requested one.
fn suggest_ids(registry: &EntityRegistry, requested: EcsId) -> Vec<String> {
    let needle = requested.0.to_string();
    let mut out: Vec<String> = registry
        .known_ids()
        .into_iter()
        .map(|id| id.0.to_string())
        .filter(|candidate| {
            candidate.starts_with(&needle)
                || needle.starts_with(candidate.as_str())
                || levenshtein(candidate, &needle) <= SUGGESTION_MAX_DISTANCE
        })
        .collect();
    out.truncate(MAX_SUGGESTIONS);
    out
}

/// Candidate names within edit distance of the requested segment.
fn suggest_names<'a>(needle: &str, candidates: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut scored: Vec<(usize, String)> = candidates
        .map(|candidate| (levenshtein(candidate, needle), candidate.clone()))
        .filter(|(distance, candidate)| {
            *distance <= SUGGESTION_MAX_DISTANCE || candidate.starts_with(needle)
        })
        .collect();
    scored.sort();
    scored
        .into_iter()
        .map(|(_, candidate)| candidate)
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// Classic two-row Levenshtein distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

// =============================================================================
// ARGUMENT CLASSIFICATION
// =============================================================================

/// Tag for one call argument, produced by an explicit classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgKind {
    /// A direct entity object reference.
    EntityRef,
    /// A string matching the address grammar (borrowing).
    Address,
    /// A plain value.
    Direct,
}

/// Overall shape of a call's argument map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputPattern {
    /// Every argument is a direct entity reference.
    PureReference,
    /// Every argument is an address string.
    PureBorrowing,
    /// Entity references and/or addresses mixed with anything else.
    Mixed,
    /// Only plain values.
    DirectOnly,
}

/// Classify an argument map.
///
/// Strings are tagged `Address` only when they fully match the grammar;
/// anything else stringy is a plain value.
#[must_use]
pub fn classify_args(args: &BTreeMap<String, Value>) -> (BTreeMap<String, ArgKind>, InputPattern) {
    let mut kinds = BTreeMap::new();
    let mut entities = 0usize;
    let mut addresses = 0usize;
    let mut direct = 0usize;

    for (name, value) in args {
        let kind = match value {
            Value::Entity(_) => {
                entities += 1;
                ArgKind::EntityRef
            }
            Value::Str(s) if Address::is_address(s) => {
                addresses += 1;
                ArgKind::Address
            }
            _ => {
                direct += 1;
                ArgKind::Direct
            }
        };
        kinds.insert(name.clone(), kind);
    }

    let pattern = match (entities, addresses, direct) {
        (0, 0, _) => InputPattern::DirectOnly,
        (e, 0, 0) if e > 0 => InputPattern::PureReference,
        (0, a, 0) if a > 0 => InputPattern::PureBorrowing,
        _ => InputPattern::Mixed,
    };
    (kinds, pattern)
}

// =============================================================================
// TESTS
// =============================================================================
