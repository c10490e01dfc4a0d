//! # Entity Tree Builder
//!
//! Walks an object graph from a root entity and snapshots it into an
//! `EntityTree`: nodes keyed by persistent id, classified edges, adjacency
//! indices, ancestry paths, and the runtime-id navigation map.
//!
//! - Traversal is iterative (explicit stack, no recursion)
//! - A runtime id encountered twice is a reference cycle: hard failure
//! - A persistent id reachable through two distinct checkouts is a DAG
//!   share; the first discovery wins for ancestry
//! - The input entities are never mutated; nodes are snapshots

use crate::primitives::{
    MAX_FIELDS_PER_ENTITY, MAX_FIELD_NAME_LENGTH, MAX_NESTING_DEPTH, MAX_TREE_NODES,
};
use crate::{EcsId, Entity, EntityEdge, LineageId, LinealError, LiveId, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// ENTITY TREE
// =============================================================================

/// The snapshot of one root's reachable graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTree {
    /// Persistent id of the tree root.
    pub root_ecs_id: EcsId,
    /// Lineage of the root (and therefore of the tree).
    pub lineage_id: LineageId,
    /// Persistent id → entity snapshot.
    pub nodes: BTreeMap<EcsId, Entity>,
    /// `(source, target)` → edge metadata.
    pub edges: BTreeMap<(EcsId, EcsId), EntityEdge>,
    /// Source id → target ids (insertion order per source).
    pub outgoing_edges: BTreeMap<EcsId, Vec<EcsId>>,
    /// Target id → source ids.
    pub incoming_edges: BTreeMap<EcsId, Vec<EcsId>>,
    /// Persistent id → ordered path of persistent ids from the root.
    pub ancestry_paths: BTreeMap<EcsId, Vec<EcsId>>,
    /// Runtime id → persistent id for the instance set this tree was built from.
    pub live_id_to_ecs_id: BTreeMap<LiveId, EcsId>,
}

impl EntityTree {
    /// Number of entities in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get one node by persistent id.
    #[must_use]
    pub fn get(&self, ecs_id: EcsId) -> Option<&Entity> {
        self.nodes.get(&ecs_id)
    }

    /// Get the root node.
    #[must_use]
    pub fn root(&self) -> Option<&Entity> {
        self.nodes.get(&self.root_ecs_id)
    }

    /// Whether the tree contains the given persistent id.
    #[must_use]
    pub fn contains(&self, ecs_id: EcsId) -> bool {
        self.nodes.contains_key(&ecs_id)
    }

    /// Look up the persistent id snapshotted for a runtime id.
    #[must_use]
    pub fn ecs_id_for_live(&self, live_id: LiveId) -> Option<EcsId> {
        self.live_id_to_ecs_id.get(&live_id).copied()
    }

    /// The ancestry parent of a node: the id one step above it on its path.
    ///
    /// Returns `None` for the root and for unknown ids.
    #[must_use]
    pub fn parent_of(&self, ecs_id: EcsId) -> Option<EcsId> {
        let path = self.ancestry_paths.get(&ecs_id)?;
        if path.len() < 2 {
            return None;
        }
        path.get(path.len() - 2).copied()
    }

    /// The hierarchical (first-discovery) edge leading into a node, if any.
    #[must_use]
    pub fn hierarchical_edge_to(&self, ecs_id: EcsId) -> Option<&EntityEdge> {
        let parent = self.parent_of(ecs_id)?;
        self.edges.get(&(parent, ecs_id))
    }

    /// Check the structural invariants of the tree.
    ///
    /// 1. Every id referenced by edges, ancestry paths, or the live map is a node.
    /// 2. The root id is a node.
    /// 3. Ancestry paths run root → node.
    /// 4. Exactly one node (the root) has no owning root id; all others point
    ///    at this tree's root.
    pub fn validate(&self) -> Result<(), LinealError> {
        let fail = |reason: String| Err(LinealError::InvalidTree { reason });

        if !self.nodes.contains_key(&self.root_ecs_id) {
            return fail(format!("root {} is not a node", self.root_ecs_id));
        }

        let mut rootless = 0usize;
        for (id, node) in &self.nodes {
            if node.ecs_id != *id {
                return fail(format!("node keyed {} carries id {}", id, node.ecs_id));
            }
            match node.root_ecs_id {
                None => rootless += 1,
                Some(root) if root == self.root_ecs_id => {}
                Some(root) => {
                    return fail(format!("node {} claims foreign root {}", id, root));
                }
            }
        }
        if rootless != 1 {
            return fail(format!("expected exactly 1 root node, found {rootless}"));
        }

        for ((source, target), edge) in &self.edges {
            if edge.source != *source || edge.target != *target {
                return fail(format!("edge keyed ({source}, {target}) carries mismatched ids"));
            }
            if !self.nodes.contains_key(source) || !self.nodes.contains_key(target) {
                return fail(format!("edge ({source}, {target}) references a missing node"));
            }
        }

        for (source, targets) in &self.outgoing_edges {
            if !self.nodes.contains_key(source) {
                return fail(format!("outgoing index references missing node {source}"));
            }
            for target in targets {
                if !self.edges.contains_key(&(*source, *target)) {
                    return fail(format!("outgoing index has phantom edge ({source}, {target})"));
                }
            }
        }
        for (target, sources) in &self.incoming_edges {
            if !self.nodes.contains_key(target) {
                return fail(format!("incoming index references missing node {target}"));
            }
            for source in sources {
                if !self.edges.contains_key(&(*source, *target)) {
                    return fail(format!("incoming index has phantom edge ({source}, {target})"));
                }
            }
        }

        for (id, path) in &self.ancestry_paths {
            if !self.nodes.contains_key(id) {
                return fail(format!("ancestry path for missing node {id}"));
            }
            if path.first() != Some(&self.root_ecs_id) || path.last() != Some(id) {
                return fail(format!("ancestry path for {id} does not run root → node"));
            }
            for step in path {
                if !self.nodes.contains_key(step) {
                    return fail(format!("ancestry path for {id} crosses missing node {step}"));
                }
            }
        }
        for id in self.nodes.keys() {
            if !self.ancestry_paths.contains_key(id) {
                return fail(format!("node {id} has no ancestry path"));
            }
        }

        for (live, ecs) in &self.live_id_to_ecs_id {
            if !self.nodes.contains_key(ecs) {
                return fail(format!("live map entry {live:?} references missing node {ecs}"));
            }
        }

        Ok(())
    }
}

// =============================================================================
// TREE BUILDER
// =============================================================================

/// The TreeBuilder walks a root entity's fields and assembles an `EntityTree`.
pub struct TreeBuilder;

impl TreeBuilder {
    /// Build the snapshot tree reachable from `root`.
    ///
    /// Fails with `CyclicGraph` if any runtime instance is reachable twice,
    /// with `LimitExceeded` on depth/size/field bounds, and with
    /// `InvalidTree` if the assembled tree violates a structural invariant.
    pub fn build(root: &Entity) -> Result<EntityTree, LinealError> {
        let mut tree = EntityTree {
            root_ecs_id: root.ecs_id,
            lineage_id: root.lineage_id,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            outgoing_edges: BTreeMap::new(),
            incoming_edges: BTreeMap::new(),
            ancestry_paths: BTreeMap::new(),
            live_id_to_ecs_id: BTreeMap::new(),
        };

        let mut visited_live: BTreeSet<LiveId> = BTreeSet::new();
        // Stack entries carry the ancestry path of the entity's parent.
        let mut stack: Vec<(&Entity, Vec<EcsId>)> = vec![(root, Vec::new())];

        while let Some((entity, parent_path)) = stack.pop() {
            if parent_path.len() >= MAX_NESTING_DEPTH {
                return Err(LinealError::LimitExceeded(format!(
                    "nesting depth exceeds {MAX_NESTING_DEPTH}"
                )));
            }
            if !visited_live.insert(entity.live_id) {
                return Err(LinealError::CyclicGraph {
                    live_id: entity.live_id,
                });
            }
            tree.live_id_to_ecs_id.insert(entity.live_id, entity.ecs_id);

            if tree.nodes.contains_key(&entity.ecs_id) {
                // DAG share: another checkout of an already-discovered entity.
                // First discovery wins; the edge was recorded by the parent scan.
                continue;
            }
            if tree.nodes.len() >= MAX_TREE_NODES {
                return Err(LinealError::LimitExceeded(format!(
                    "tree exceeds {MAX_TREE_NODES} nodes"
                )));
            }

            Self::validate_fields(entity)?;

            let mut path = parent_path;
            path.push(entity.ecs_id);
            tree.ancestry_paths.insert(entity.ecs_id, path.clone());

            let mut snapshot = entity.clone();
            if snapshot.ecs_id == root.ecs_id {
                snapshot.root_ecs_id = None;
                snapshot.root_live_id = None;
            } else {
                snapshot.root_ecs_id = Some(root.ecs_id);
                snapshot.root_live_id = Some(root.live_id);
            }
            // The inline sub-entity copies inside the snapshot's fields must
            // agree with their own node entries on the owning root.
            for value in snapshot.fields.values_mut() {
                Self::stamp_root_pointers(value, root.ecs_id, root.live_id);
            }
            tree.outgoing_edges.entry(entity.ecs_id).or_default();
            tree.incoming_edges.entry(entity.ecs_id).or_default();
            tree.nodes.insert(entity.ecs_id, snapshot);

            let mut children: Vec<(&str, crate::EdgeKind, &Entity)> = Vec::new();
            entity.for_each_child(|field, kind, child| children.push((field, kind, child)));

            for (field, kind, child) in &children {
                let key = (entity.ecs_id, child.ecs_id);
                if !tree.edges.contains_key(&key) {
                    tree.outgoing_edges
                        .entry(entity.ecs_id)
                        .or_default()
                        .push(child.ecs_id);
                    tree.incoming_edges
                        .entry(child.ecs_id)
                        .or_default()
                        .push(entity.ecs_id);
                    tree.edges.insert(
                        key,
                        EntityEdge {
                            source: entity.ecs_id,
                            target: child.ecs_id,
                            kind: kind.clone(),
                            field_name: (*field).to_string(),
                            hierarchical: false,
                        },
                    );
                }
            }

            // Reverse push so the stack pops children in field order.
            for (_, _, child) in children.iter().rev() {
                stack.push((child, path.clone()));
            }
        }

        // Mark the first-discovery edge into each non-root node.
        let parents: Vec<(EcsId, EcsId)> = tree
            .nodes
            .keys()
            .filter_map(|id| tree.parent_of(*id).map(|parent| (parent, *id)))
            .collect();
        for key in parents {
            if let Some(edge) = tree.edges.get_mut(&key) {
                edge.hierarchical = true;
            }
        }

        tree.validate()?;
        Ok(tree)
    }

    /// Point every inline sub-entity under `value` at the tree's root.
    ///
    /// Sets are rebuilt because root pointers participate in member order.
    fn stamp_root_pointers(value: &mut Value, root_ecs_id: EcsId, root_live_id: LiveId) {
        match value {
            Value::Entity(child) => {
                child.root_ecs_id = Some(root_ecs_id);
                child.root_live_id = Some(root_live_id);
                for field in child.fields.values_mut() {
                    Self::stamp_root_pointers(field, root_ecs_id, root_live_id);
                }
            }
            Value::List(items) | Value::Tuple(items) => {
                for item in items {
                    Self::stamp_root_pointers(item, root_ecs_id, root_live_id);
                }
            }
            Value::Set(items) => {
                let mut rebuilt = BTreeSet::new();
                for mut item in std::mem::take(items) {
                    Self::stamp_root_pointers(&mut item, root_ecs_id, root_live_id);
                    rebuilt.insert(item);
                }
                *items = rebuilt;
            }
            Value::Map(entries) => {
                for item in entries.values_mut() {
                    Self::stamp_root_pointers(item, root_ecs_id, root_live_id);
                }
            }
            _ => {}
        }
    }

    /// Enforce field bounds before a node enters the tree.
    fn validate_fields(entity: &Entity) -> Result<(), LinealError> {
        if entity.fields.len() > MAX_FIELDS_PER_ENTITY {
            return Err(LinealError::LimitExceeded(format!(
                "entity {} has more than {MAX_FIELDS_PER_ENTITY} fields",
                entity.ecs_id
            )));
        }
        for name in entity.fields.keys() {
            if name.is_empty() || name.len() > MAX_FIELD_NAME_LENGTH {
                return Err(LinealError::LimitExceeded(format!(
                    "field name length out of bounds on entity {}",
                    entity.ecs_id
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
