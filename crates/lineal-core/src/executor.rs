//! # Callable Execution Engine
//!
//! Registers named callables with declared input/output shapes and
//! orchestrates every call: argument classification, input composition
//! with provenance, registry isolation, invocation, semantic detection,
//! output versioning, and an audit trail.
//!
//! - Callables receive an isolated checkout; mutating it never touches
//!   registry state until outputs are explicitly registered
//! - A failed callable leaves the registry exactly as of the isolation
//!   step: the input entity is registered, no outputs are
//! - Every call, failed or not, produces a registered `FunctionExecution`
//!   audit entity

use crate::address::{classify_args, Address, AddressResolver, ArgKind, InputPattern};
use crate::registry::EntityRegistry;
use crate::tree::{EntityTree, TreeBuilder};
use crate::{EcsId, Entity, LinealError, Provenance, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// SHAPES
// =============================================================================

/// Value category of one shape field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Str,
    /// A nested entity of the named kind.
    Entity(String),
    List,
    Tuple,
    Set,
    Map,
    /// Unconstrained.
    Any,
}

/// One named, typed field of a record shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeField {
    pub name: String,
    pub kind: FieldKind,
}

impl ShapeField {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A record shape: an entity kind plus its declared fields, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub kind: String,
    pub fields: Vec<ShapeField>,
}

impl Shape {
    #[must_use]
    pub fn new(kind: impl Into<String>, fields: Vec<ShapeField>) -> Self {
        Self {
            kind: kind.into(),
            fields,
        }
    }
}

/// Declared output of a callable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputShape {
    /// One entity.
    Single(Shape),
    /// A fixed sequence of sibling entities.
    Siblings(Vec<Shape>),
    /// A plain value, wrapped in a single-field container on return.
    Wrapped(FieldKind),
}

/// Declared input and output shapes of a registered callable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableSpec {
    pub input_shape: Shape,
    pub output_shape: OutputShape,
}

// =============================================================================
// CALLABLES
// =============================================================================

/// What a callable hands back to the engine.
#[derive(Debug, Clone)]
pub enum CallableOutput {
    Entity(Entity),
    Entities(Vec<Entity>),
    Value(Value),
}

type CallableFn = Box<dyn Fn(Entity) -> Result<CallableOutput, LinealError> + Send + Sync>;

/// A registered callable: declared shapes plus the function body.
pub struct Callable {
    spec: CallableSpec,
    func: CallableFn,
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// EXECUTION RESULTS
// =============================================================================

/// Effect classification of one call, by runtime-identity comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSemantic {
    /// An argument entity came back with altered fields.
    Mutation,
    /// The output shares no runtime identity with any input.
    Creation,
    /// A previously-attached sub-entity now stands alone as a root.
    Detachment,
}

impl ExecutionSemantic {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mutation => "mutation",
            Self::Creation => "creation",
            Self::Detachment => "detachment",
        }
    }
}

/// Terminal status of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

/// Everything a successful call produced.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Final output entities, registered, with sibling links populated.
    pub outputs: Vec<Entity>,
    /// Overall call semantic (mutation wins over detachment over creation).
    pub semantic: ExecutionSemantic,
    /// The argument pattern the call was classified as.
    pub pattern: InputPattern,
    /// Persistent id of the registered composed input entity.
    pub input_ecs_id: EcsId,
    /// Persistent id of the registered `FunctionExecution` audit entity.
    pub audit_ecs_id: EcsId,
}

// =============================================================================
// CALLABLE REGISTRY
// =============================================================================

/// Owns the name → callable table and runs the call state machine.
#[derive(Debug, Default)]
pub struct CallableRegistry {
    callables: BTreeMap<String, Callable>,
}

impl CallableRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable under a unique name.
    ///
    /// Re-registration under an existing name is an error, never a
    /// silent replace.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        spec: CallableSpec,
        func: impl Fn(Entity) -> Result<CallableOutput, LinealError> + Send + Sync + 'static,
    ) -> Result<(), LinealError> {
        let name = name.into();
        if self.callables.contains_key(&name) {
            return Err(LinealError::DuplicateFunction { name });
        }
        self.callables.insert(
            name,
            Callable {
                spec,
                func: Box::new(func),
            },
        );
        Ok(())
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.callables.keys().cloned().collect()
    }

    /// Declared shapes for one callable.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&CallableSpec> {
        self.callables.get(name).map(|c| &c.spec)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callables.is_empty()
    }

    /// Execute a registered callable against the entity registry.
    ///
    /// Runs the full call state machine: classify, compose, isolate,
    /// invoke, detect semantics, version outputs, audit. On callable
    /// failure the audit entity is registered as `failed` and the error
    /// is re-raised; no output registration happens.
    pub fn execute(
        &self,
        registry: &mut EntityRegistry,
        name: &str,
        args: BTreeMap<String, Value>,
    ) -> Result<ExecutionOutcome, LinealError> {
        let Some(callable) = self.callables.get(name) else {
            return Err(LinealError::UnregisteredFunction {
                name: name.to_string(),
                suggestions: suggest_functions(name, self.callables.keys()),
            });
        };

        // Step 1: classify arguments.
        let (kinds, pattern) = classify_args(&args);

        // Step 2: compose the input entity, recording provenance.
        let input = compose_input(registry, &callable.spec.input_shape.kind, args, &kinds)?;
        let input_ecs_id = input.ecs_id;

        // Step 3: register the input and take the isolated execution copy.
        registry.register_entity(&input)?;
        let isolated = registry
            .get_stored_entity(input_ecs_id, input_ecs_id)
            .ok_or(LinealError::EntityNotFound(input_ecs_id))?;
        let pre_tree = TreeBuilder::build(&isolated)?;

        // Step 4: invoke. A failure is audited, then re-raised.
        let raw_output = (callable.func)(isolated);
        let raw_output = match raw_output {
            Ok(output) => output,
            Err(err) => {
                let error = LinealError::Execution {
                    function: name.to_string(),
                    input_ecs_id: Some(input_ecs_id),
                    message: err.to_string(),
                };
                record_audit(
                    registry,
                    name,
                    input_ecs_id,
                    &[],
                    None,
                    pattern,
                    ExecutionStatus::Failed,
                    Some(&error.to_string()),
                )?;
                return Err(error);
            }
        };

        // Step 5: unpack into a uniform output list.
        let mut outputs = match raw_output {
            CallableOutput::Entity(entity) => vec![entity],
            CallableOutput::Entities(entities) => entities,
            CallableOutput::Value(value) => {
                let mut wrapper = Entity::new("FunctionResult");
                wrapper.set_field("value", value);
                vec![wrapper]
            }
        };
        if outputs.is_empty() {
            return Err(LinealError::Execution {
                function: name.to_string(),
                input_ecs_id: Some(input_ecs_id),
                message: "callable returned an empty output sequence".to_string(),
            });
        }

        // Step 6: semantic detection by runtime identity against the
        // pre-invocation tree.
        let semantics: Vec<ExecutionSemantic> = outputs
            .iter()
            .map(|output| detect_semantic(&pre_tree, output))
            .collect();
        let semantic = overall_semantic(&semantics);

        // Step 7: provenance, then registration. Mutation outputs are
        // versioned first so sibling links carry final persistent ids.
        for output in &mut outputs {
            stamp_provenance(output, input_ecs_id);
        }
        for (output, semantic) in outputs.iter_mut().zip(&semantics) {
            if *semantic == ExecutionSemantic::Mutation {
                output.promote_to_root();
                if registry.stored_tree(output.ecs_id).is_some() {
                    registry.version_entity(output, false)?;
                } else {
                    // A mutated argument that was never registered as a root:
                    // first registration opens the entity's own lineage.
                    registry.register_entity(output)?;
                }
            }
        }
        let final_ids: Vec<EcsId> = outputs.iter().map(|o| o.ecs_id).collect();
        let multi = outputs.len() > 1;
        for (index, (output, semantic)) in outputs.iter_mut().zip(&semantics).enumerate() {
            if multi {
                output.output_index = Some(index);
                output.sibling_output_ids = final_ids
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index)
                    .map(|(_, id)| *id)
                    .collect();
            }
            if *semantic != ExecutionSemantic::Mutation {
                output.promote_to_root();
                registry.register_entity(output)?;
            }
        }

        // Step 8: audit record.
        let audit_ecs_id = record_audit(
            registry,
            name,
            input_ecs_id,
            &final_ids,
            Some(semantic),
            pattern,
            ExecutionStatus::Completed,
            None,
        )?;

        Ok(ExecutionOutcome {
            outputs,
            semantic,
            pattern,
            input_ecs_id,
            audit_ecs_id,
        })
    }
}

// =============================================================================
// CALL STATE MACHINE HELPERS
// =============================================================================

/// Build the composed input entity from classified arguments.
///
/// Address arguments are resolved and copied in with provenance pointing
/// at the addressed entity; entity arguments keep their own persistent id
/// as provenance; direct values carry none.
fn compose_input(
    registry: &EntityRegistry,
    input_kind: &str,
    args: BTreeMap<String, Value>,
    kinds: &BTreeMap<String, ArgKind>,
) -> Result<Entity, LinealError> {
    let mut input = Entity::new(input_kind);
    for (arg_name, value) in args {
        match kinds.get(&arg_name) {
            Some(ArgKind::Address) => {
                let Value::Str(address) = &value else {
                    return Err(LinealError::InvalidTree {
                        reason: format!("argument '{arg_name}' classified as address is not a string"),
                    });
                };
                let parsed = Address::parse(address)?;
                let resolved = AddressResolver::resolve(registry, address)?;
                input
                    .attribute_source
                    .insert(arg_name.clone(), Provenance::for_value(&resolved, parsed.ecs_id));
                input.set_field(arg_name, resolved);
            }
            Some(ArgKind::EntityRef) => {
                if let Value::Entity(entity) = &value {
                    input
                        .attribute_source
                        .insert(arg_name.clone(), Provenance::Single(Some(entity.ecs_id)));
                }
                input.set_field(arg_name, value);
            }
            _ => {
                input
                    .attribute_source
                    .insert(arg_name.clone(), Provenance::Single(None));
                input.set_field(arg_name, value);
            }
        }
    }
    Ok(input)
}

/// Classify one output entity against the pre-invocation input tree.
///
/// A runtime id that was a direct argument of the composed input is a
/// mutation; one that was attached deeper in the tree is a detachment;
/// an unknown runtime id is a creation.
fn detect_semantic(pre_tree: &EntityTree, output: &Entity) -> ExecutionSemantic {
    let Some(ecs_id) = pre_tree.ecs_id_for_live(output.live_id) else {
        return ExecutionSemantic::Creation;
    };
    match pre_tree.parent_of(ecs_id) {
        Some(parent) if parent == pre_tree.root_ecs_id => ExecutionSemantic::Mutation,
        Some(_) => ExecutionSemantic::Detachment,
        // The composed input root itself came back.
        None => ExecutionSemantic::Mutation,
    }
}

/// Mutation dominates detachment dominates creation.
fn overall_semantic(semantics: &[ExecutionSemantic]) -> ExecutionSemantic {
    if semantics.contains(&ExecutionSemantic::Mutation) {
        ExecutionSemantic::Mutation
    } else if semantics.contains(&ExecutionSemantic::Detachment) {
        ExecutionSemantic::Detachment
    } else {
        ExecutionSemantic::Creation
    }
}

/// Point every output field's provenance at the composed input entity.
fn stamp_provenance(output: &mut Entity, input_ecs_id: EcsId) {
    let names: Vec<String> = output.fields.keys().cloned().collect();
    for name in names {
        if let Some(value) = output.fields.get(&name) {
            let provenance = Provenance::for_value(value, input_ecs_id);
            output.attribute_source.insert(name, provenance);
        }
    }
}

/// Create and register the `FunctionExecution` audit entity.
#[allow(clippy::too_many_arguments)]
fn record_audit(
    registry: &mut EntityRegistry,
    function: &str,
    input_ecs_id: EcsId,
    output_ids: &[EcsId],
    semantic: Option<ExecutionSemantic>,
    pattern: InputPattern,
    status: ExecutionStatus,
    error: Option<&str>,
) -> Result<EcsId, LinealError> {
    let mut audit = Entity::new("FunctionExecution");
    audit.set_field("function", function);
    audit.set_field(
        "sequence",
        i64::try_from(crate::types::execution_sequence()).unwrap_or(i64::MAX),
    );
    audit.set_field("input_ecs_id", i64::try_from(input_ecs_id.0).unwrap_or(i64::MAX));
    audit.set_field(
        "output_ecs_ids",
        Value::List(
            output_ids
                .iter()
                .map(|id| Value::Int(i64::try_from(id.0).unwrap_or(i64::MAX)))
                .collect(),
        ),
    );
    audit.set_field(
        "semantic",
        semantic.map_or_else(|| Value::Null, |s| Value::str(s.as_str())),
    );
    audit.set_field(
        "pattern",
        match pattern {
            InputPattern::PureReference => "pure_reference",
            InputPattern::PureBorrowing => "pure_borrowing",
            InputPattern::Mixed => "mixed",
            InputPattern::DirectOnly => "direct_only",
        },
    );
    audit.set_field(
        "status",
        match status {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        },
    );
    if let Some(message) = error {
        audit.set_field("error", message);
    }
    registry.register_entity(&audit)
}

/// Registered function names close to the requested one.
fn suggest_functions<'a>(
    needle: &str,
    candidates: impl Iterator<Item = &'a String>,
) -> Vec<String> {
    use crate::primitives::MAX_SUGGESTIONS;
    candidates
        .filter(|candidate| {
            candidate.starts_with(needle) || needle.starts_with(candidate.as_str())
        })
        .take(MAX_SUGGESTIONS)
        .cloned()
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
