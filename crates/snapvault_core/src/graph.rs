//! Dependency ordering of the entity types in an archive.
//!
//! An edge `A -> B` means B holds a foreign key into A, so A must be loaded
//! first. The graph is built per restore from the entity types actually
//! present; references to types outside the archive add no edges.

use crate::catalog::EntityCatalog;
use crate::types::EntityTypeId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// The order to load entity types in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadOrder {
    /// Every graph node exactly once, parents before children where possible.
    pub order: Vec<EntityTypeId>,
    /// Nodes that could not be ordered: those on a cycle and anything that
    /// depends on one. They sit at the end of `order`, in archive order.
    pub cyclic: Vec<EntityTypeId>,
}

impl LoadOrder {
    /// Checks whether every node was ordered topologically.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        self.cyclic.is_empty()
    }

    /// Returns the load position of an entity type.
    #[must_use]
    pub fn position(&self, entity_type: &EntityTypeId) -> Option<usize> {
        self.order.iter().position(|t| t == entity_type)
    }
}

/// "Parent before child" graph over the entity types present in an archive.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<EntityTypeId, ()>,
    index: HashMap<EntityTypeId, NodeIndex>,
}

impl DependencyGraph {
    /// Builds the graph for `present`, taken in archive order.
    ///
    /// Types unknown to the catalog are not added; they are returned
    /// separately, in archive order. Duplicates are ignored.
    pub fn build<'a, I>(catalog: &EntityCatalog, present: I) -> (Self, Vec<EntityTypeId>)
    where
        I: IntoIterator<Item = &'a EntityTypeId>,
    {
        let mut graph = Self::default();
        let mut skipped = Vec::new();

        for entity_type in present {
            if graph.index.contains_key(entity_type) || skipped.contains(entity_type) {
                continue;
            }
            if catalog.contains(entity_type) {
                let node = graph.graph.add_node(entity_type.clone());
                graph.index.insert(entity_type.clone(), node);
            } else {
                skipped.push(entity_type.clone());
            }
        }

        let nodes: Vec<(NodeIndex, EntityTypeId)> = graph
            .graph
            .node_indices()
            .filter_map(|n| graph.graph.node_weight(n).map(|t| (n, t.clone())))
            .collect();
        for (child, entity_type) in nodes {
            for parent in catalog.dependencies_of(&entity_type) {
                if let Some(&parent) = graph.index.get(&parent) {
                    graph.graph.update_edge(parent, child, ());
                }
            }
        }

        (graph, skipped)
    }

    /// Returns the number of entity types in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Checks whether an entity type is a node.
    #[must_use]
    pub fn contains(&self, entity_type: &EntityTypeId) -> bool {
        self.index.contains_key(entity_type)
    }

    /// Checks whether `child` depends on `parent`.
    #[must_use]
    pub fn has_edge(&self, parent: &EntityTypeId, child: &EntityTypeId) -> bool {
        match (self.index.get(parent), self.index.get(child)) {
            (Some(&p), Some(&c)) => self.graph.contains_edge(p, c),
            _ => false,
        }
    }

    /// Computes the load order with Kahn's algorithm.
    ///
    /// Ties are broken by archive order: the queue is seeded in that order
    /// and a node's dependents are released in that order. Nodes left over
    /// because of cycles are appended in archive order.
    #[must_use]
    pub fn load_order(&self) -> LoadOrder {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();

        // Node indices follow insertion, which is archive order.
        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| in_degree.get(n).copied().unwrap_or(0) == 0)
            .collect();

        let mut visited = vec![false; self.graph.node_count()];
        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(node) = queue.pop_front() {
            visited[node.index()] = true;
            if let Some(entity_type) = self.graph.node_weight(node) {
                order.push(entity_type.clone());
            }

            let mut dependents: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .collect();
            dependents.sort_unstable();

            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        let cyclic: Vec<EntityTypeId> = self
            .graph
            .node_indices()
            .filter(|n| !visited[n.index()])
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        if !cyclic.is_empty() {
            tracing::warn!(
                entity_types = ?cyclic.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "circular dependencies; appending in archive order"
            );
        }
        order.extend(cyclic.iter().cloned());

        LoadOrder { order, cyclic }
    }
}
