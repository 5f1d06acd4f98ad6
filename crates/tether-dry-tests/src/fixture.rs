// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Graph fixtures built without going through the writer.

use std::sync::Arc;

use tether_core::{
    compose_base, compose_id, Direction, EdgeRow, Graph, GraphResult, GraphSettings,
    MemoryEdgeStore,
};

/// Builder for a pre-populated in-memory graph.
///
/// Each edge is materialized as its forward and mirror rows, exactly as the
/// writer would store them, with fixed timestamps.
///
/// ```
/// use tether_dry_tests::GraphFixture;
///
/// let store = GraphFixture::new("ns").edge("a", "b", 0.5).store();
/// assert_eq!(store.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct GraphFixture {
    namespace: String,
    entity: String,
    settings: GraphSettings,
    rows: Vec<EdgeRow>,
}

/// Timestamp stamped on fixture rows.
pub const FIXTURE_TIME: u64 = 1_700_000_000_000;

impl GraphFixture {
    /// Empty fixture writing into `namespace` with the default entity.
    pub fn new(namespace: impl Into<String>) -> Self {
        let settings = GraphSettings::default();
        Self {
            namespace: namespace.into(),
            entity: settings.default_entity.clone(),
            settings,
            rows: Vec::new(),
        }
    }

    /// Entity used by subsequent edges.
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// Settings handed to the built graph.
    pub fn settings(mut self, settings: GraphSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Undirected edge.
    pub fn edge(self, from_node: &str, to_node: &str, distance: f64) -> Self {
        self.row_pair(from_node, None, to_node, distance)
    }

    /// Directed edge; the mirror row carries the inverted direction.
    pub fn directed(
        self,
        from_node: &str,
        direction: Direction,
        to_node: &str,
        distance: f64,
    ) -> Self {
        self.row_pair(from_node, Some(direction), to_node, distance)
    }

    /// A single row with no mirror, for exercising half-written edges.
    pub fn orphan(mut self, from_node: &str, to_node: &str, distance: f64) -> Self {
        let row = self.row(from_node, None, to_node, distance);
        self.rows.push(row);
        self
    }

    fn row(
        &self,
        from_node: &str,
        direction: Option<Direction>,
        to_node: &str,
        distance: f64,
    ) -> EdgeRow {
        EdgeRow {
            namespace: self.namespace.clone(),
            id: compose_id(from_node, &self.entity, direction, to_node, true),
            base: compose_base(&self.namespace, from_node, &self.entity, direction, true),
            distance,
            created_at: FIXTURE_TIME,
            updated_at: FIXTURE_TIME,
            ttl: None,
        }
    }

    fn row_pair(
        mut self,
        from_node: &str,
        direction: Option<Direction>,
        to_node: &str,
        distance: f64,
    ) -> Self {
        let forward = self.row(from_node, direction, to_node, distance);
        let mirror = self.row(to_node, direction.map(Direction::invert), from_node, distance);
        self.rows.push(forward);
        self.rows.push(mirror);
        self
    }

    /// Rows accumulated so far.
    pub fn rows(&self) -> &[EdgeRow] {
        &self.rows
    }

    /// A store holding the rows.
    pub fn store(&self) -> Arc<MemoryEdgeStore> {
        Arc::new(MemoryEdgeStore::from_rows(self.rows.iter().cloned()))
    }

    /// A graph over a fresh store holding the rows.
    pub fn build(&self) -> GraphResult<Graph<MemoryEdgeStore>> {
        Graph::new(self.store(), self.settings.clone())
    }
}
