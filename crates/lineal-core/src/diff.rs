//! # Diff & Version Engine
//!
//! Compares two snapshots of the same lineage, classifies entities as
//! added/removed/moved/modified, and produces a new immutable version:
//! fresh persistent ids for every changed entity (and its full ancestry),
//! with every tree-level index rewritten through one `old → new` remap pass.
//!
//! The rewrite is a remap, never a rebuild: rebuilding would silently
//! discard edge and order metadata not derivable from entity state alone.

use crate::registry::EntityRegistry;
use crate::tree::{EntityTree, TreeBuilder};
use crate::{EcsId, EdgeKind, Entity, LinealError, Provenance, Value};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// DIFF ENGINE
// =============================================================================

/// Greedy single-pass snapshot comparison and version assignment.
pub struct DiffEngine;

/// The hierarchical position of a node: parent id, field, and container slot.
type Position = Option<(EcsId, String, EdgeKind)>;

impl DiffEngine {
    /// Entities requiring a new version when moving from `old` to `new`.
    ///
    /// Marks added, removed (via surviving ancestors), moved, and modified
    /// entities, then propagates every mark along the full ancestry path so
    /// the root always versions when any descendant changes. Neither input
    /// is mutated.
    #[must_use]
    pub fn find_modified(old: &EntityTree, new: &EntityTree) -> BTreeSet<EcsId> {
        let mut marked: BTreeSet<EcsId> = BTreeSet::new();

        // Structural diff: key-set comparison.
        for id in new.nodes.keys() {
            if !old.nodes.contains_key(id) {
                marked.insert(*id);
            }
        }
        for id in old.nodes.keys() {
            if !new.nodes.contains_key(id) {
                // The removed entity itself cannot be versioned; its surviving
                // ancestors carry the change.
                if let Some(path) = old.ancestry_paths.get(id) {
                    for step in path {
                        if new.nodes.contains_key(step) {
                            marked.insert(*step);
                        }
                    }
                }
            }
        }

        // Moved / attribute diff for entities present in both snapshots.
        for (id, node) in &new.nodes {
            let Some(old_node) = old.nodes.get(id) else {
                continue;
            };
            if Self::position_of(new, *id) != Self::position_of(old, *id) {
                // Moved-but-unmodified entities are versioned as well.
                marked.insert(*id);
            } else if !node.semantic_eq(old_node) {
                marked.insert(*id);
            }
        }

        // Upward propagation along the full ancestry path.
        let direct: Vec<EcsId> = marked.iter().copied().collect();
        for id in direct {
            if let Some(path) = new.ancestry_paths.get(&id) {
                for step in path {
                    marked.insert(*step);
                }
            }
        }

        marked
    }

    /// Version `root` against its stored tree.
    ///
    /// `root` must currently be a registered root; on success its identity
    /// (and that of its changed descendants) is advanced in place so the
    /// live instance keeps tracking its lineage. With `force` the diff is
    /// skipped and the root is treated as modified.
    ///
    /// Returns `Ok(false)` when no entity differs; nothing is registered.
    pub fn version_entity(
        registry: &mut EntityRegistry,
        root: &mut Entity,
        force: bool,
    ) -> Result<bool, LinealError> {
        let mut new_tree = TreeBuilder::build(root)?;

        let marked = {
            let Some(old_tree) = registry.stored_tree(root.ecs_id) else {
                return Err(LinealError::EntityNotFound(root.ecs_id));
            };
            if force {
                BTreeSet::from([root.ecs_id])
            } else {
                Self::find_modified(old_tree, &new_tree)
            }
        };
        if marked.is_empty() {
            return Ok(false);
        }

        // One fresh persistent id per marked entity still present in the tree.
        let remap: BTreeMap<EcsId, EcsId> = marked
            .iter()
            .filter(|id| new_tree.contains(**id))
            .map(|id| (*id, EcsId::fresh()))
            .collect();
        if remap.is_empty() {
            return Ok(false);
        }

        Self::apply_remap(&mut new_tree, &remap);
        remap_entity(root, &remap);

        registry.register_tree(new_tree)?;
        Ok(true)
    }

    /// The hierarchical position of `id` within `tree`.
    fn position_of(tree: &EntityTree, id: EcsId) -> Position {
        tree.hierarchical_edge_to(id)
            .map(|edge| (edge.source, edge.field_name.clone(), edge.kind.clone()))
    }

    /// Rewrite every index of `tree` through `remap` in a single pass each.
    fn apply_remap(tree: &mut EntityTree, remap: &BTreeMap<EcsId, EcsId>) {
        let map = |id: EcsId| remap.get(&id).copied().unwrap_or(id);

        let nodes = std::mem::take(&mut tree.nodes);
        tree.nodes = nodes
            .into_iter()
            .map(|(_, mut node)| {
                remap_entity(&mut node, remap);
                (node.ecs_id, node)
            })
            .collect();

        let edges = std::mem::take(&mut tree.edges);
        tree.edges = edges
            .into_iter()
            .map(|((source, target), mut edge)| {
                edge.source = map(source);
                edge.target = map(target);
                ((edge.source, edge.target), edge)
            })
            .collect();

        let outgoing = std::mem::take(&mut tree.outgoing_edges);
        tree.outgoing_edges = outgoing
            .into_iter()
            .map(|(id, targets)| (map(id), targets.into_iter().map(map).collect()))
            .collect();

        let incoming = std::mem::take(&mut tree.incoming_edges);
        tree.incoming_edges = incoming
            .into_iter()
            .map(|(id, sources)| (map(id), sources.into_iter().map(map).collect()))
            .collect();

        let paths = std::mem::take(&mut tree.ancestry_paths);
        tree.ancestry_paths = paths
            .into_iter()
            .map(|(id, path)| (map(id), path.into_iter().map(map).collect()))
            .collect();

        for ecs in tree.live_id_to_ecs_id.values_mut() {
            *ecs = map(*ecs);
        }

        tree.root_ecs_id = map(tree.root_ecs_id);
    }
}

/// Advance the identity of an entity (and its inline sub-entities) per `remap`.
///
/// A remapped entity gets the new persistent id threaded onto its version
/// chain; root pointers and provenance references are rewritten alongside.
fn remap_entity(entity: &mut Entity, remap: &BTreeMap<EcsId, EcsId>) {
    if let Some(new_id) = remap.get(&entity.ecs_id) {
        entity.promote_version(*new_id);
    }
    if let Some(root) = entity.root_ecs_id
        && let Some(new_root) = remap.get(&root)
    {
        entity.root_ecs_id = Some(*new_root);
    }
    for provenance in entity.attribute_source.values_mut() {
        remap_provenance(provenance, remap);
    }
    for sibling in &mut entity.sibling_output_ids {
        if let Some(new_id) = remap.get(sibling) {
            *sibling = *new_id;
        }
    }
    for value in entity.fields.values_mut() {
        remap_value(value, remap);
    }
}

fn remap_value(value: &mut Value, remap: &BTreeMap<EcsId, EcsId>) {
    match value {
        Value::Entity(child) => remap_entity(child, remap),
        Value::List(items) | Value::Tuple(items) => {
            for item in items {
                remap_value(item, remap);
            }
        }
        Value::Set(items) => {
            // Rebuild: persistent ids participate in the set order.
            let mut rebuilt = BTreeSet::new();
            for mut item in std::mem::take(items) {
                remap_value(&mut item, remap);
                rebuilt.insert(item);
            }
            *items = rebuilt;
        }
        Value::Map(entries) => {
            for item in entries.values_mut() {
                remap_value(item, remap);
            }
        }
        _ => {}
    }
}

fn remap_provenance(provenance: &mut Provenance, remap: &BTreeMap<EcsId, EcsId>) {
    let map_slot = |slot: &mut Option<EcsId>| {
        if let Some(id) = slot
            && let Some(new_id) = remap.get(id)
        {
            *slot = Some(*new_id);
        }
    };
    match provenance {
        Provenance::Single(slot) => map_slot(slot),
        Provenance::PerItem(slots) => slots.iter_mut().for_each(map_slot),
        Provenance::PerKey(slots) => slots.values_mut().for_each(map_slot),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn student(name: &str, gpa: f64) -> Entity {
        Entity::new("Student")
            .with_field("name", name)
            .with_field("gpa", gpa)
    }

    #[test]
    fn attribute_change_versions_the_root() {
        let mut registry = EntityRegistry::new();
        let mut root = student("A", 3.0);
        let first_id = registry.register_entity(&root).expect("register");
        let lineage = root.lineage_id;

        root.set_field("gpa", 3.5);
        let changed = registry.version_entity(&mut root, false).expect("version");

        assert!(changed);
        assert_ne!(root.ecs_id, first_id);
        assert_eq!(root.previous_ecs_id, Some(first_id));
        assert_eq!(root.old_ecs_ids, vec![first_id]);
        assert_eq!(root.lineage_id, lineage);
        assert_eq!(
            registry.lineage_history(lineage),
            Some(&[first_id, root.ecs_id][..])
        );
    }

    #[test]
    fn noop_versioning_returns_false_and_registers_nothing() {
        let mut registry = EntityRegistry::new();
        let mut root = student("A", 3.0);
        registry.register_entity(&root).expect("register");
        let trees_before = registry.tree_count();

        let changed = registry.version_entity(&mut root, false).expect("version");

        assert!(!changed);
        assert_eq!(registry.tree_count(), trees_before);
    }

    #[test]
    fn force_versioning_skips_the_diff() {
        let mut registry = EntityRegistry::new();
        let mut root = student("A", 3.0);
        let first_id = registry.register_entity(&root).expect("register");

        let changed = registry.version_entity(&mut root, true).expect("version");

        assert!(changed);
        assert_ne!(root.ecs_id, first_id);
        assert_eq!(registry.lineage_history(root.lineage_id).map(<[EcsId]>::len), Some(2));
    }

    #[test]
    fn child_change_propagates_to_all_ancestors() {
        let mut registry = EntityRegistry::new();
        let inner = Entity::new("Inner").with_field("n", 1i64);
        let inner_id = inner.ecs_id;
        let mid = Entity::new("Mid").with_field("inner", inner);
        let mid_id = mid.ecs_id;
        let mut root = Entity::new("Outer").with_field("mid", mid);
        let root_id = registry.register_entity(&root).expect("register");

        // Mutate the innermost entity through the live root.
        let Some(Value::Entity(mid_live)) = root.fields.get_mut("mid") else {
            unreachable!("mid field present");
        };
        let Some(Value::Entity(inner_live)) = mid_live.fields.get_mut("inner") else {
            unreachable!("inner field present");
        };
        inner_live.set_field("n", 2i64);

        let changed = registry.version_entity(&mut root, false).expect("version");
        assert!(changed);

        // Every level got a new persistent id.
        assert_ne!(root.ecs_id, root_id);
        let tree = registry.stored_tree(root.ecs_id).expect("new tree");
        assert!(!tree.contains(mid_id));
        assert!(!tree.contains(inner_id));
        assert_eq!(tree.node_count(), 3);
        tree.validate().expect("no dangling ids");

        // The old tree is still queryable under the old root id.
        assert!(registry.stored_tree(root_id).is_some());
    }

    #[test]
    fn sibling_unrelated_to_change_keeps_its_id() {
        let mut registry = EntityRegistry::new();
        let touched = Entity::new("Touched").with_field("n", 1i64);
        let untouched = Entity::new("Untouched").with_field("n", 1i64);
        let untouched_id = untouched.ecs_id;
        let mut root = Entity::new("Root")
            .with_field("touched", touched)
            .with_field("untouched", untouched);
        registry.register_entity(&root).expect("register");

        let Some(Value::Entity(live)) = root.fields.get_mut("touched") else {
            unreachable!("touched field present");
        };
        live.set_field("n", 2i64);

        registry.version_entity(&mut root, false).expect("version");

        let tree = registry.stored_tree(root.ecs_id).expect("tree");
        assert!(tree.contains(untouched_id));
    }

    #[test]
    fn removed_child_versions_the_root() {
        let mut registry = EntityRegistry::new();
        let child = Entity::new("Child");
        let mut root = Entity::new("Root").with_field("child", child);
        let first_id = registry.register_entity(&root).expect("register");

        root.fields.remove("child");
        let changed = registry.version_entity(&mut root, false).expect("version");

        assert!(changed);
        assert_ne!(root.ecs_id, first_id);
        let tree = registry.stored_tree(root.ecs_id).expect("tree");
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn moved_but_unmodified_child_is_versioned() {
        let mut registry = EntityRegistry::new();
        let child = Entity::new("Child").with_field("n", 1i64);
        let child_id = child.ecs_id;
        let mut root = Entity::new("Root").with_field("a", child);
        registry.register_entity(&root).expect("register");

        // Move the child to a different field without touching its fields.
        let Some(value) = root.fields.remove("a") else {
            unreachable!("field a present");
        };
        root.fields.insert("b".to_string(), value);

        let changed = registry.version_entity(&mut root, false).expect("version");
        assert!(changed);

        let tree = registry.stored_tree(root.ecs_id).expect("tree");
        assert!(!tree.contains(child_id), "moved child must carry a new id");
    }

    #[test]
    fn versioning_unregistered_root_is_an_error() {
        let mut registry = EntityRegistry::new();
        let mut root = student("A", 3.0);
        let err = registry.version_entity(&mut root, false).expect_err("unregistered");
        assert!(matches!(err, LinealError::EntityNotFound(_)));
    }

    #[test]
    fn diff_does_not_mutate_old_tree() {
        let mut registry = EntityRegistry::new();
        let mut root = student("A", 3.0);
        let first_id = registry.register_entity(&root).expect("register");
        let before = registry.stored_tree(first_id).expect("old").clone();

        root.set_field("gpa", 4.0);
        registry.version_entity(&mut root, false).expect("version");

        assert_eq!(registry.stored_tree(first_id), Some(&before));
    }
}
