// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Public façades.
//!
//! [`Graph`] takes a fully formed request for every call. [`Partition`] binds
//! a namespace once and fills in the configured default entity and an
//! undirected orientation, for callers that work inside a single graph.

use std::sync::Arc;

use futures_util::stream::Stream;
use tracing::instrument;

use crate::coalesce::{process_coalesced_writes, CoalesceOptions, CoalesceReport};
use crate::edge::{DeletedEdge, Edge, LinkedEdge};
use crate::error::GraphResult;
use crate::link::LinkWriter;
use crate::memory::MemoryEdgeStore;
use crate::request::{
    AllAllRequest, ClosestRequest, CrossLinkRequest, EdgeRequest, LinkInput, LinkRequest,
    NodeRequest,
};
use crate::settings::GraphSettings;
use crate::store::EdgeStore;
use crate::traverse::{traverse, HopJob, TraversalResult, TraverseRequest};

/// Weighted link graph over an [`EdgeStore`].
pub struct Graph<S> {
    writer: LinkWriter<S>,
}

impl<S> Clone for Graph<S> {
    fn clone(&self) -> Self {
        Self {
            writer: self.writer.clone(),
        }
    }
}

impl Graph<MemoryEdgeStore> {
    /// Graph over a fresh in-memory store.
    pub fn in_memory(settings: GraphSettings) -> GraphResult<Self> {
        Self::new(Arc::new(MemoryEdgeStore::new()), settings)
    }
}

impl<S: EdgeStore> Graph<S> {
    /// Wraps `store`, rejecting invalid `settings`.
    pub fn new(store: Arc<S>, settings: GraphSettings) -> GraphResult<Self> {
        settings.validate()?;
        Ok(Self {
            writer: LinkWriter::new(store, settings),
        })
    }

    /// The underlying writer.
    pub fn writer(&self) -> &LinkWriter<S> {
        &self.writer
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        self.writer.store()
    }

    /// The active settings.
    pub fn settings(&self) -> &GraphSettings {
        self.writer.settings()
    }

    /// Binds `namespace` for subsequent calls.
    pub fn partition(&self, namespace: impl Into<String>) -> Partition<S> {
        Partition {
            graph: self.clone(),
            namespace: namespace.into(),
        }
    }

    /// Creates or strengthens one edge.
    pub async fn link(&self, request: LinkRequest) -> GraphResult<LinkedEdge> {
        self.writer.link(request).await
    }

    /// Links one node to many targets.
    #[instrument(
        level = "debug",
        skip_all,
        fields(namespace = %request.namespace, from = %request.from_node)
    )]
    pub async fn cross_link(&self, request: CrossLinkRequest) -> GraphResult<Vec<LinkedEdge>> {
        self.writer.cross_link(request).await
    }

    /// Links every unordered pair of nodes.
    #[instrument(
        level = "debug",
        skip_all,
        fields(namespace = %request.namespace, nodes = request.nodes.len())
    )]
    pub async fn all_all(&self, request: AllAllRequest) -> GraphResult<Vec<LinkedEdge>> {
        self.writer.all_all(request).await
    }

    /// Nearest neighbors.
    #[instrument(
        level = "debug",
        skip_all,
        fields(namespace = %request.namespace, from = %request.from_node)
    )]
    pub async fn closest(&self, request: &ClosestRequest) -> GraphResult<Vec<Edge>> {
        self.writer.closest(request).await
    }

    /// Every row from a node.
    pub async fn all_by_node(&self, request: &NodeRequest) -> GraphResult<Vec<Edge>> {
        self.writer.all_by_node(request).await
    }

    /// Number of rows from a node.
    pub async fn count(&self, request: &NodeRequest) -> GraphResult<usize> {
        self.writer.count(request).await
    }

    /// Forward row of one edge.
    pub async fn get(&self, request: &EdgeRequest) -> GraphResult<Option<Edge>> {
        self.writer.get(request).await
    }

    /// Removes one edge.
    pub async fn delete(&self, request: &EdgeRequest) -> GraphResult<Option<DeletedEdge>> {
        self.writer.delete(request).await
    }

    /// Removes every edge from a node.
    pub async fn delete_by_node(&self, request: &NodeRequest) -> GraphResult<usize> {
        self.writer.delete_by_node(request).await
    }

    /// Multi-hop path search.
    pub async fn traverse(&self, request: &TraverseRequest) -> GraphResult<TraversalResult> {
        traverse(
            self.store().as_ref(),
            request,
            self.settings().traversal_concurrency,
        )
        .await
    }

    /// Merges and flushes a burst of writes.
    pub async fn process_coalesced_writes<St>(
        &self,
        items: St,
        options: &CoalesceOptions,
    ) -> GraphResult<CoalesceReport>
    where
        St: Stream<Item = LinkInput>,
    {
        process_coalesced_writes(&self.writer, items, options).await
    }
}

/// A [`Graph`] with its namespace bound.
pub struct Partition<S> {
    graph: Graph<S>,
    namespace: String,
}

impl<S> Clone for Partition<S> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl<S: EdgeStore> Partition<S> {
    /// The bound namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn entity(&self) -> &str {
        &self.graph.settings().default_entity
    }

    /// Link request in this partition, default entity, undirected.
    pub fn link_request(
        &self,
        from_node: impl Into<String>,
        to_node: impl Into<String>,
    ) -> LinkRequest {
        LinkRequest::new(self.namespace.as_str(), from_node, to_node).entity(self.entity())
    }

    /// Neighbor query in this partition, default entity, undirected.
    pub fn closest_request(&self, from_node: impl Into<String>) -> ClosestRequest {
        ClosestRequest::new(self.namespace.as_str(), from_node).entity(self.entity())
    }

    fn edge_request(&self, from_node: &str, to_node: &str) -> EdgeRequest {
        EdgeRequest::new(self.namespace.as_str(), from_node, to_node).entity(self.entity())
    }

    fn node_request(&self, from_node: &str) -> NodeRequest {
        NodeRequest::new(self.namespace.as_str(), from_node)
    }

    /// Strengthens `from_node <-> to_node` by the default weight.
    pub async fn link(&self, from_node: &str, to_node: &str) -> GraphResult<LinkedEdge> {
        self.graph.link(self.link_request(from_node, to_node)).await
    }

    /// Sets `from_node <-> to_node` to exactly `distance`.
    pub async fn link_absolute(
        &self,
        from_node: &str,
        to_node: &str,
        distance: f64,
    ) -> GraphResult<LinkedEdge> {
        self.graph
            .link(self.link_request(from_node, to_node).absolute_distance(distance))
            .await
    }

    /// Links `from_node` to every target.
    pub async fn cross_link<I, T>(
        &self,
        from_node: &str,
        to_nodes: I,
    ) -> GraphResult<Vec<LinkedEdge>>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let request = CrossLinkRequest::new(self.namespace.as_str(), from_node, to_nodes)
            .entity(self.entity());
        self.graph.cross_link(request).await
    }

    /// Links every unordered pair of `nodes`.
    pub async fn all_all<I, T>(&self, nodes: I) -> GraphResult<Vec<LinkedEdge>>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let request = AllAllRequest::new(self.namespace.as_str(), nodes).entity(self.entity());
        self.graph.all_all(request).await
    }

    /// Up to `limit` nearest neighbors of `from_node`.
    pub async fn closest(&self, from_node: &str, limit: Option<usize>) -> GraphResult<Vec<Edge>> {
        let mut request = self.closest_request(from_node);
        request.limit = limit;
        self.graph.closest(&request).await
    }

    /// Every row from `from_node`, any entity.
    pub async fn all_by_node(&self, from_node: &str) -> GraphResult<Vec<Edge>> {
        self.graph.all_by_node(&self.node_request(from_node)).await
    }

    /// Number of rows from `from_node`, any entity.
    pub async fn count(&self, from_node: &str) -> GraphResult<usize> {
        self.graph.count(&self.node_request(from_node)).await
    }

    /// Forward row of `from_node -> to_node`.
    pub async fn get(&self, from_node: &str, to_node: &str) -> GraphResult<Option<Edge>> {
        self.graph.get(&self.edge_request(from_node, to_node)).await
    }

    /// Removes `from_node <-> to_node`.
    pub async fn delete(&self, from_node: &str, to_node: &str) -> GraphResult<Option<DeletedEdge>> {
        self.graph.delete(&self.edge_request(from_node, to_node)).await
    }

    /// Removes every edge from `from_node`.
    pub async fn delete_by_node(&self, from_node: &str) -> GraphResult<usize> {
        self.graph.delete_by_node(&self.node_request(from_node)).await
    }

    /// `hops` unbounded hops over the default entity from `from_node`.
    pub async fn traverse(&self, from_node: &str, hops: usize) -> GraphResult<TraversalResult> {
        let mut request = TraverseRequest::new(self.namespace.as_str(), from_node);
        for _ in 0..hops {
            request = request.job(HopJob::new(self.entity()));
        }
        self.graph.traverse(&request).await
    }

    /// Merges and flushes writes into this partition.
    pub async fn process_coalesced_writes<St>(&self, items: St) -> GraphResult<CoalesceReport>
    where
        St: Stream<Item = LinkInput>,
    {
        let options = CoalesceOptions::for_namespace(self.namespace.as_str());
        self.graph.process_coalesced_writes(items, &options).await
    }
}
