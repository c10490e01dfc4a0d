//! # Snapshot Registry
//!
//! Process-lifetime store for entity trees, keyed by root persistent id.
//!
//! The registry is a single owned struct holding five index maps, passed by
//! handle to every component — never ambient global state. All retrievals
//! hand out deep copies with fresh runtime ids; the immutability contract of
//! the whole engine rests on `get_stored_tree` never aliasing internal state.

use crate::diff::DiffEngine;
use crate::tree::{EntityTree, TreeBuilder};
use crate::{EcsId, Entity, EntityKind, LineageId, LinealError, LiveId, Value};
use std::collections::BTreeMap;

// =============================================================================
// ENTITY REGISTRY
// =============================================================================

/// The five-index snapshot store.
///
/// Lifecycle: constructed once, lives for the process, reset only by an
/// explicit [`EntityRegistry::clear`] (test support).
#[derive(Debug, Default)]
pub struct EntityRegistry {
    /// Root persistent id → stored tree.
    tree_registry: BTreeMap<EcsId, EntityTree>,
    /// Lineage id → root persistent ids, oldest → newest.
    lineage_registry: BTreeMap<LineageId, Vec<EcsId>>,
    /// Runtime id → entity snapshot recorded at registration time.
    ///
    /// Lookup aid only; never the source of externally visible values.
    live_id_registry: BTreeMap<LiveId, Entity>,
    /// Any member persistent id → owning root persistent id.
    ecs_id_to_root_id: BTreeMap<EcsId, EcsId>,
    /// Entity kind → lineages carrying that kind's roots.
    type_registry: BTreeMap<EntityKind, Vec<LineageId>>,
}

impl EntityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Insert a tree under its root persistent id.
    ///
    /// Idempotent for the same root id: re-registration overwrites the stored
    /// tree (after pruning its superseded live-id entries) and does not append
    /// a duplicate lineage entry. A structurally invalid tree is rejected with
    /// `InvalidTree` and leaves the registry untouched.
    pub fn register_tree(&mut self, tree: EntityTree) -> Result<(), LinealError> {
        tree.validate()?;

        if let Some(previous) = self.tree_registry.get(&tree.root_ecs_id) {
            let stale: Vec<LiveId> = previous.live_id_to_ecs_id.keys().copied().collect();
            for live in stale {
                self.live_id_registry.remove(&live);
            }
        }

        let history = self.lineage_registry.entry(tree.lineage_id).or_default();
        if !history.contains(&tree.root_ecs_id) {
            history.push(tree.root_ecs_id);
        }

        for (id, node) in &tree.nodes {
            self.ecs_id_to_root_id.insert(*id, tree.root_ecs_id);
            self.live_id_registry.insert(node.live_id, node.clone());
        }

        if let Some(root) = tree.root() {
            let lineages = self.type_registry.entry(root.kind.clone()).or_default();
            if !lineages.contains(&tree.lineage_id) {
                lineages.push(tree.lineage_id);
            }
        }

        self.tree_registry.insert(tree.root_ecs_id, tree);
        Ok(())
    }

    /// Convenience: build the tree for `root` and register it.
    ///
    /// Returns the root persistent id on success.
    pub fn register_entity(&mut self, root: &Entity) -> Result<EcsId, LinealError> {
        let tree = TreeBuilder::build(root)?;
        let root_id = tree.root_ecs_id;
        self.register_tree(tree)?;
        Ok(root_id)
    }

    // =========================================================================
    // RETRIEVAL (copy-on-read)
    // =========================================================================

    /// Deep-copy the stored tree under `root_ecs_id`.
    ///
    /// Every entity in the copy is re-instantiated with a fresh runtime id;
    /// persistent ids, lineage ids, and all field data are preserved exactly.
    /// Mutating the returned copy never affects the registry.
    #[must_use]
    pub fn get_stored_tree(&self, root_ecs_id: EcsId) -> Option<EntityTree> {
        let stored = self.tree_registry.get(&root_ecs_id)?;
        let mut copy = stored.clone();

        // One fresh runtime id per persistent id, applied consistently to the
        // node entries and to every inline sub-entity copy.
        let live_map: BTreeMap<EcsId, LiveId> = copy
            .nodes
            .keys()
            .map(|id| (*id, LiveId::fresh()))
            .collect();
        let root_live = live_map.get(&copy.root_ecs_id).copied();

        copy.live_id_to_ecs_id.clear();
        for (id, node) in &mut copy.nodes {
            refresh_live_ids(node, &live_map, root_live);
            if let Some(live) = live_map.get(id) {
                copy.live_id_to_ecs_id.insert(*live, *id);
            }
        }
        Some(copy)
    }

    /// Deep-copy one node of a stored tree, with a fresh runtime id.
    ///
    /// The copy includes the node's inline sub-entities, each also refreshed.
    #[must_use]
    pub fn get_stored_entity(&self, root_ecs_id: EcsId, ecs_id: EcsId) -> Option<Entity> {
        let stored = self.tree_registry.get(&root_ecs_id)?;
        let node = stored.nodes.get(&ecs_id)?;
        let mut copy = node.clone();

        let live_map: BTreeMap<EcsId, LiveId> = stored
            .nodes
            .keys()
            .map(|id| (*id, LiveId::fresh()))
            .collect();
        let root_live = live_map.get(&root_ecs_id).copied();
        refresh_live_ids(&mut copy, &live_map, root_live);
        Some(copy)
    }

    /// Look up the entity snapshot recorded for a runtime id.
    ///
    /// Navigation aid only: returns the instance recorded at registration
    /// time, not a checkout copy.
    #[must_use]
    pub fn get_live_entity(&self, live_id: LiveId) -> Option<&Entity> {
        self.live_id_registry.get(&live_id)
    }

    /// Borrow a stored tree without copying.
    ///
    /// Internal read for the diff engine; external callers go through
    /// [`Self::get_stored_tree`].
    #[must_use]
    pub(crate) fn stored_tree(&self, root_ecs_id: EcsId) -> Option<&EntityTree> {
        self.tree_registry.get(&root_ecs_id)
    }

    // =========================================================================
    // VERSIONING
    // =========================================================================

    /// Diff `root` against its stored tree and register a new version if
    /// anything changed. See the diff engine for the full algorithm.
    ///
    /// Returns `Ok(false)` when nothing differs (and registers nothing).
    pub fn version_entity(&mut self, root: &mut Entity, force: bool) -> Result<bool, LinealError> {
        DiffEngine::version_entity(self, root, force)
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Owning root for any registered member persistent id.
    #[must_use]
    pub fn root_of(&self, ecs_id: EcsId) -> Option<EcsId> {
        self.ecs_id_to_root_id.get(&ecs_id).copied()
    }

    /// All lineages with their latest root id.
    #[must_use]
    pub fn lineages(&self) -> Vec<(LineageId, EcsId)> {
        self.lineage_registry
            .iter()
            .filter_map(|(lineage, roots)| roots.last().map(|root| (*lineage, *root)))
            .collect()
    }

    /// Full version history (root ids, oldest → newest) for one lineage.
    #[must_use]
    pub fn lineage_history(&self, lineage_id: LineageId) -> Option<&[EcsId]> {
        self.lineage_registry.get(&lineage_id).map(Vec::as_slice)
    }

    /// Latest root id of one lineage.
    #[must_use]
    pub fn latest_root(&self, lineage_id: LineageId) -> Option<EcsId> {
        self.lineage_registry
            .get(&lineage_id)?
            .last()
            .copied()
    }

    /// Registered entity kinds with their lineages.
    #[must_use]
    pub fn kinds(&self) -> Vec<(EntityKind, Vec<LineageId>)> {
        self.type_registry
            .iter()
            .map(|(kind, lineages)| (kind.clone(), lineages.clone()))
            .collect()
    }

    /// Registered member ids (decimal form), for address diagnostics.
    #[must_use]
    pub fn known_ids(&self) -> Vec<EcsId> {
        self.ecs_id_to_root_id.keys().copied().collect()
    }

    /// Number of stored trees (one per registered root version).
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.tree_registry.len()
    }

    /// Number of member entities across all stored trees.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.ecs_id_to_root_id.len()
    }

    /// Number of lineages.
    #[must_use]
    pub fn lineage_count(&self) -> usize {
        self.lineage_registry.len()
    }

    /// Reset the registry to empty. Test support.
    pub fn clear(&mut self) {
        self.tree_registry.clear();
        self.lineage_registry.clear();
        self.live_id_registry.clear();
        self.ecs_id_to_root_id.clear();
        self.type_registry.clear();
    }
}

/// Rewrite the runtime ids of an entity and all its inline sub-entities.
///
/// `live_map` assigns one fresh runtime id per persistent id, so a checkout
/// is internally consistent: a node entry and the same entity inlined in its
/// parent's field carry the same new runtime id.
fn refresh_live_ids(
    entity: &mut Entity,
    live_map: &BTreeMap<EcsId, LiveId>,
    root_live: Option<LiveId>,
) {
    if let Some(live) = live_map.get(&entity.ecs_id) {
        entity.live_id = *live;
    } else {
        entity.live_id = LiveId::fresh();
    }
    if entity.root_ecs_id.is_some() {
        entity.root_live_id = root_live;
    }
    for value in entity.fields.values_mut() {
        refresh_value(value, live_map, root_live);
    }
}

fn refresh_value(
    value: &mut Value,
    live_map: &BTreeMap<EcsId, LiveId>,
    root_live: Option<LiveId>,
) {
    match value {
        Value::Entity(child) => refresh_live_ids(child, live_map, root_live),
        Value::List(items) | Value::Tuple(items) => {
            for item in items {
                refresh_value(item, live_map, root_live);
            }
        }
        Value::Set(items) => {
            // Rebuild: runtime ids participate in the set order.
            let mut rebuilt = std::collections::BTreeSet::new();
            for mut item in std::mem::take(items) {
                refresh_value(&mut item, live_map, root_live);
                rebuilt.insert(item);
            }
            *items = rebuilt;
        }
        Value::Map(entries) => {
            for item in entries.values_mut() {
                refresh_value(item, live_map, root_live);
            }
        }
        _ => {}
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
    fn register_entity_stores_one_tree() {
        let mut registry = EntityRegistry::new();
        let root = student("A", 3.0);

        let root_id = registry.register_entity(&root).expect("register");

        assert_eq!(root_id, root.ecs_id);
        assert_eq!(registry.tree_count(), 1);
        assert_eq!(registry.entity_count(), 1);
        assert_eq!(registry.lineage_history(root.lineage_id), Some(&[root_id][..]));
    }

    #[test]
    fn register_is_idempotent_per_root_id() {
        let mut registry = EntityRegistry::new();
        let root = student("A", 3.0);

        registry.register_entity(&root).expect("first");
        registry.register_entity(&root).expect("second");

        assert_eq!(registry.tree_count(), 1);
        assert_eq!(
            registry.lineage_history(root.lineage_id),
            Some(&[root.ecs_id][..])
        );
    }

    #[test]
    fn checkout_has_fresh_runtime_ids_each_time() {
        let mut registry = EntityRegistry::new();
        let root = student("A", 3.0);
        registry.register_entity(&root).expect("register");

        let first = registry.get_stored_entity(root.ecs_id, root.ecs_id).expect("checkout");
        let second = registry.get_stored_entity(root.ecs_id, root.ecs_id).expect("checkout");

        assert_eq!(first.ecs_id, root.ecs_id);
        assert_eq!(first.lineage_id, root.lineage_id);
        assert_ne!(first.live_id, root.live_id);
        assert_ne!(first.live_id, second.live_id);
        assert!(first.semantic_eq(&second));
    }

    #[test]
    fn mutating_a_checkout_does_not_leak_into_the_registry() {
        let mut registry = EntityRegistry::new();
        let root = student("A", 3.0);
        registry.register_entity(&root).expect("register");

        let mut checkout = registry
            .get_stored_entity(root.ecs_id, root.ecs_id)
            .expect("checkout");
        checkout.set_field("gpa", 0.0);

        let fresh = registry
            .get_stored_entity(root.ecs_id, root.ecs_id)
            .expect("checkout");
        assert_eq!(fresh.field("gpa"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn checkout_tree_is_internally_consistent() {
        let mut registry = EntityRegistry::new();
        let child = Entity::new("Advisor").with_field("name", "B");
        let child_id = child.ecs_id;
        let root = student("A", 3.0).with_field("advisor", child);
        registry.register_entity(&root).expect("register");

        let tree = registry.get_stored_tree(root.ecs_id).expect("tree");
        tree.validate().expect("valid");

        let root_node = tree.root().expect("root");
        let child_node = tree.get(child_id).expect("child");
        let inline = root_node
            .field("advisor")
            .and_then(Value::as_entity)
            .expect("inline advisor");
        // Node entry and inline copy agree on the fresh runtime id.
        assert_eq!(inline.live_id, child_node.live_id);
        assert_eq!(child_node.root_live_id, Some(root_node.live_id));
        assert_eq!(
            tree.live_id_to_ecs_id.get(&child_node.live_id),
            Some(&child_id)
        );
    }

    #[test]
    fn lookups_on_unknown_ids_return_none() {
        let registry = EntityRegistry::new();
        assert!(registry.get_stored_tree(EcsId::fresh()).is_none());
        assert!(registry.get_stored_entity(EcsId::fresh(), EcsId::fresh()).is_none());
        assert!(registry.get_live_entity(LiveId::fresh()).is_none());
        assert!(registry.root_of(EcsId::fresh()).is_none());
    }

    #[test]
    fn live_lookup_returns_registered_instance() {
        let mut registry = EntityRegistry::new();
        let root = student("A", 3.0);
        registry.register_entity(&root).expect("register");

        let live = registry.get_live_entity(root.live_id).expect("live");
        assert_eq!(live.ecs_id, root.ecs_id);
        assert_eq!(live.live_id, root.live_id);
    }

    #[test]
    fn member_ids_resolve_to_owning_root() {
        let mut registry = EntityRegistry::new();
        let child = Entity::new("Advisor");
        let child_id = child.ecs_id;
        let root = student("A", 3.0).with_field("advisor", child);
        registry.register_entity(&root).expect("register");

        assert_eq!(registry.root_of(child_id), Some(root.ecs_id));
        assert_eq!(registry.root_of(root.ecs_id), Some(root.ecs_id));
    }

    #[test]
    fn type_registry_tracks_kinds() {
        let mut registry = EntityRegistry::new();
        let root = student("A", 3.0);
        registry.register_entity(&root).expect("register");

        let kinds = registry.kinds();
        assert_eq!(kinds.len(), 1);
        assert_eq!(kinds[0].0, EntityKind::new("Student"));
        assert_eq!(kinds[0].1, vec![root.lineage_id]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut registry = EntityRegistry::new();
        let root = student("A", 3.0);
        registry.register_entity(&root).expect("register");

        registry.clear();
        assert_eq!(registry.tree_count(), 0);
        assert_eq!(registry.entity_count(), 0);
        assert_eq!(registry.lineage_count(), 0);
    }
}
