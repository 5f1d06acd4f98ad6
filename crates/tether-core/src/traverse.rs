// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Multi-hop nearest-neighbor traversal.
//!
//! A traversal is an ordered list of [`HopJob`]s. Hop 0 reads the nearest
//! neighbors of the start node; every later hop reads the nearest neighbors
//! of each edge target produced by the previous hop, at bounded concurrency.
//! Hops at or beyond [`RemoteHops::from_hop`] are resolved by a caller-supplied
//! [`HopResolver`] instead of the local store.
//!
//! # Dedup And Frequency
//!
//! Each call owns one [`TraversalState`]. An edge is consumed at most once per
//! call, keyed by its sorted endpoints plus a direction normalised to that
//! order, so a row and its mirror are the same edge. Consuming an edge bumps
//! the visit count of its endpoints in [`Frequency`]. The check-and-insert
//! happens under one lock so concurrent hop queries cannot both consume the
//! same edge.
//!
//! # Paths
//!
//! Edges are folded into paths hop by hop: an edge extends every path that
//! ended at its `from` node on the previous hop (copying, so paths branch),
//! and starts a new path when none did. Paths are then filtered by length and
//! terminal node, and sorted by cumulative distance. Equal distances are
//! ordered by terminal node, then by node trace.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::codec::{invert_direction, Direction, INDETERMINATE};
use crate::edge::Edge;
use crate::error::{GraphError, GraphResult};
use crate::link::{nearest, LinkWriter};
use crate::request::{check_key_field, ClosestRequest};
use crate::settings::DEFAULT_ENTITY;
use crate::store::{DistanceRange, EdgeStore};

/// Resolves one hop somewhere other than the local store (another shard,
/// another service).
#[async_trait]
pub trait HopResolver: Send + Sync {
    /// Nearest neighbors for `request`, issued at hop index `hop`.
    async fn closest(&self, request: ClosestRequest, hop: usize) -> GraphResult<Vec<Edge>>;
}

#[async_trait]
impl<S: EdgeStore> HopResolver for LinkWriter<S> {
    async fn closest(&self, request: ClosestRequest, _hop: usize) -> GraphResult<Vec<Edge>> {
        LinkWriter::closest(self, &request).await
    }
}

/// Delegation of distant hops.
#[derive(Clone)]
pub struct RemoteHops {
    /// First hop index resolved remotely.
    pub from_hop: usize,
    /// Resolver used for those hops.
    pub resolver: Arc<dyn HopResolver>,
}

impl fmt::Debug for RemoteHops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHops")
            .field("from_hop", &self.from_hop)
            .finish_non_exhaustive()
    }
}

/// Query template for one hop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HopJob {
    /// Edge kind read at this hop.
    pub entity: String,
    /// Row direction read at this hop.
    pub direction: Option<Direction>,
    /// Inclusive distance bounds.
    pub range: DistanceRange,
    /// Farthest first.
    pub desc: bool,
    /// Neighbors kept per seed node.
    pub limit: Option<usize>,
}

impl Default for HopJob {
    fn default() -> Self {
        Self::new(DEFAULT_ENTITY)
    }
}

impl HopJob {
    /// Unbounded, undirected, ascending hop over `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            direction: None,
            range: DistanceRange::unbounded(),
            desc: false,
            limit: None,
        }
    }

    /// Sets the direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Sets the distance bounds.
    pub fn range(mut self, range: DistanceRange) -> Self {
        self.range = range;
        self
    }

    /// Caps neighbors per seed.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The concrete query for `from_node`.
    pub fn query(&self, namespace: &str, from_node: &str) -> ClosestRequest {
        ClosestRequest {
            namespace: namespace.to_owned(),
            from_node: from_node.to_owned(),
            entity: self.entity.clone(),
            direction: self.direction,
            range: self.range,
            desc: self.desc,
            limit: self.limit,
        }
    }
}

/// A multi-hop path search.
#[derive(Clone, Debug)]
pub struct TraverseRequest {
    /// Partition scope.
    pub namespace: String,
    /// Start node.
    pub from_node: String,
    /// One template per hop, in order.
    pub jobs: Vec<HopJob>,
    /// Shortest path (in edges) kept.
    pub min_path: usize,
    /// Longest path kept; defaults to the number of jobs.
    pub max_path: Option<usize>,
    /// Keep only paths whose length is a multiple of this.
    pub mod_path: Option<usize>,
    /// Keep only paths whose terminal node matches.
    pub terminal: Option<Regex>,
    /// Fan-out bound per hop; falls back to the configured one.
    pub concurrency: Option<usize>,
    /// Delegation of distant hops.
    pub remote: Option<RemoteHops>,
}

impl TraverseRequest {
    /// Traversal from `from_node` with no jobs yet.
    pub fn new(namespace: impl Into<String>, from_node: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            from_node: from_node.into(),
            jobs: Vec::new(),
            min_path: 1,
            max_path: None,
            mod_path: None,
            terminal: None,
            concurrency: None,
            remote: None,
        }
    }

    /// Appends a hop.
    pub fn job(mut self, job: HopJob) -> Self {
        self.jobs.push(job);
        self
    }

    /// Sets the inclusive path-length bounds.
    pub fn path_len(mut self, min_path: usize, max_path: usize) -> Self {
        self.min_path = min_path;
        self.max_path = Some(max_path);
        self
    }

    /// Keeps only lengths divisible by `modulus`.
    pub fn mod_path(mut self, modulus: usize) -> Self {
        self.mod_path = Some(modulus);
        self
    }

    /// Keeps only paths ending at a node matching `pattern`.
    pub fn terminal(mut self, pattern: Regex) -> Self {
        self.terminal = Some(pattern);
        self
    }

    /// Bounds the per-hop fan-out.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Resolves hops from `from_hop` onward through `resolver`.
    pub fn remote(mut self, from_hop: usize, resolver: Arc<dyn HopResolver>) -> Self {
        self.remote = Some(RemoteHops { from_hop, resolver });
        self
    }

    fn effective_max(&self) -> usize {
        self.max_path.unwrap_or(self.jobs.len())
    }

    /// Checks fields and shape.
    pub fn validate(&self) -> GraphResult<()> {
        check_key_field("namespace", &self.namespace)?;
        check_key_field("from_node", &self.from_node)?;
        if self.jobs.is_empty() {
            return Err(GraphError::configuration("traversal needs at least one job"));
        }
        for job in &self.jobs {
            check_key_field("entity", &job.entity)?;
            job.range.checked()?;
        }
        if self.min_path > self.effective_max() {
            return Err(GraphError::configuration(format!(
                "min_path {} exceeds max_path {}",
                self.min_path,
                self.effective_max()
            )));
        }
        if self.mod_path == Some(0) {
            return Err(GraphError::configuration("mod_path must be at least 1"));
        }
        if self.concurrency == Some(0) {
            return Err(GraphError::configuration("concurrency must be at least 1"));
        }
        Ok(())
    }
}

/// Visit counts gathered during one traversal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frequency {
    /// node -> visits, across all entities.
    pub all: BTreeMap<String, u64>,
    /// entity -> node -> visits.
    pub by_entity: BTreeMap<String, BTreeMap<String, u64>>,
}

impl Frequency {
    fn record(&mut self, entity: &str, node: &str) {
        *self.all.entry(node.to_owned()).or_default() += 1;
        *self
            .by_entity
            .entry(entity.to_owned())
            .or_default()
            .entry(node.to_owned())
            .or_default() += 1;
    }

    /// Visits of `node` across all entities.
    pub fn visits(&self, node: &str) -> u64 {
        self.all.get(node).copied().unwrap_or_default()
    }
}

/// Key under which an edge and its mirror collapse.
pub fn edge_key(from_node: &str, to_node: &str, direction: Option<Direction>) -> String {
    let (low, high, direction) = if from_node <= to_node {
        (from_node, to_node, direction)
    } else {
        (to_node, from_node, invert_direction(direction))
    };
    let direction = direction.map_or(INDETERMINATE, Direction::as_str);
    format!("{low}:{high}:{direction}")
}

/// Dedup and frequency state owned by one traversal call.
#[derive(Debug, Default)]
pub struct TraversalState {
    processed_edges: HashSet<String>,
    frequency: Frequency,
}

impl TraversalState {
    /// Consumes `edge` if unseen. Returns `false` for an edge already
    /// consumed in this traversal.
    pub fn admit(&mut self, edge: &Edge) -> bool {
        if !self
            .processed_edges
            .insert(edge_key(&edge.from_node, &edge.to_node, edge.direction))
        {
            return false;
        }
        if matches!(edge.direction, None | Some(Direction::In)) {
            self.frequency.record(&edge.entity, &edge.from_node);
        }
        if matches!(edge.direction, None | Some(Direction::Out)) {
            self.frequency.record(&edge.entity, &edge.to_node);
        }
        true
    }

    /// Number of distinct edges consumed.
    pub fn processed(&self) -> usize {
        self.processed_edges.len()
    }
}

/// One edge of a path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    /// Origin of this step.
    pub from_node: String,
    /// Target of this step.
    pub to_node: String,
    /// Edge kind.
    pub entity: String,
    /// Row direction.
    pub direction: Option<Direction>,
    /// Distance of this edge alone.
    pub distance: f64,
}

/// A path found by a traversal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraversalPath {
    /// Path origin.
    pub from_node: String,
    /// Current tail.
    pub to_node: String,
    /// Sum of step distances.
    pub distance: f64,
    /// Steps in order.
    pub steps: Vec<PathStep>,
}

impl TraversalPath {
    fn start(edge: &Edge) -> Self {
        Self {
            from_node: edge.from_node.clone(),
            to_node: edge.to_node.clone(),
            distance: edge.distance,
            steps: vec![PathStep::from(edge)],
        }
    }

    fn extended(&self, edge: &Edge) -> Self {
        let mut steps = self.steps.clone();
        steps.push(PathStep::from(edge));
        Self {
            from_node: self.from_node.clone(),
            to_node: edge.to_node.clone(),
            distance: self.distance + edge.distance,
            steps,
        }
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` for a path without steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Visited nodes in order, origin first.
    pub fn nodes(&self) -> Vec<&str> {
        let mut nodes = Vec::with_capacity(self.steps.len() + 1);
        nodes.push(self.from_node.as_str());
        nodes.extend(self.steps.iter().map(|step| step.to_node.as_str()));
        nodes
    }
}

impl From<&Edge> for PathStep {
    fn from(edge: &Edge) -> Self {
        Self {
            from_node: edge.from_node.clone(),
            to_node: edge.to_node.clone(),
            entity: edge.entity.clone(),
            direction: edge.direction,
            distance: edge.distance,
        }
    }
}

/// Output of a traversal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TraversalResult {
    /// Retained paths, closest first.
    pub paths: Vec<TraversalPath>,
    /// Visit counts.
    pub frequency: Frequency,
}

/// Folds per-hop edge lists into a branching set of paths.
///
/// Edges are taken in hop order. Each one extends every path seen so far
/// whose tail is the edge's origin, including paths grown earlier in the same
/// hop; an edge that extends nothing starts a new path. Extended paths stay
/// eligible for further branching but are left out of the result.
fn assemble(hops: &[Vec<Edge>]) -> Vec<TraversalPath> {
    let mut paths: Vec<TraversalPath> = Vec::new();
    let mut superseded: Vec<bool> = Vec::new();
    for edge in hops.iter().flatten() {
        let matching: Vec<usize> = paths
            .iter()
            .enumerate()
            .filter(|(_, path)| path.to_node == edge.from_node)
            .map(|(index, _)| index)
            .collect();
        if matching.is_empty() {
            paths.push(TraversalPath::start(edge));
            superseded.push(false);
            continue;
        }
        for index in matching {
            let grown = paths[index].extended(edge);
            superseded[index] = true;
            paths.push(grown);
            superseded.push(false);
        }
    }
    paths
        .into_iter()
        .zip(superseded)
        .filter_map(|(path, superseded)| (!superseded).then_some(path))
        .collect()
}

/// One traversal in flight.
pub struct Traversal<'a, S: ?Sized> {
    store: &'a S,
    request: &'a TraverseRequest,
    concurrency: usize,
    state: Mutex<TraversalState>,
}

impl<'a, S> Traversal<'a, S>
where
    S: EdgeStore + ?Sized,
{
    /// Prepares a traversal. `default_concurrency` applies when the request
    /// sets none; `None` for both is unbounded.
    pub fn new(
        store: &'a S,
        request: &'a TraverseRequest,
        default_concurrency: Option<usize>,
    ) -> Self {
        Self {
            store,
            request,
            concurrency: request
                .concurrency
                .or(default_concurrency)
                .unwrap_or(usize::MAX)
                .max(1),
            state: Mutex::new(TraversalState::default()),
        }
    }

    async fn closest(&self, hop: usize, from_node: &str) -> GraphResult<Vec<Edge>> {
        let Some(job) = self.request.jobs.get(hop) else {
            return Ok(Vec::new());
        };
        let query = job.query(&self.request.namespace, from_node);
        let edges = match &self.request.remote {
            Some(remote) if hop >= remote.from_hop => remote.resolver.closest(query, hop).await?,
            _ => nearest(self.store, &query).await?,
        };
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(edges.into_iter().filter(|edge| state.admit(edge)).collect())
    }

    /// Runs every hop, then assembles, filters and sorts paths.
    pub async fn run(self) -> GraphResult<TraversalResult> {
        if self.request.jobs.is_empty() {
            return Ok(TraversalResult::default());
        }

        let mut hops = vec![self.closest(0, &self.request.from_node).await?];
        for hop in 1..self.request.jobs.len() {
            let seeds: Vec<&str> = match hops.last() {
                Some(frontier) if !frontier.is_empty() => {
                    frontier.iter().map(|edge| edge.to_node.as_str()).collect()
                }
                _ => break,
            };
            let found: Vec<Vec<Edge>> = stream::iter(seeds)
                .map(|seed| self.closest(hop, seed))
                .buffer_unordered(self.concurrency)
                .try_collect()
                .await?;
            let frontier: Vec<Edge> = found.into_iter().flatten().collect();
            debug!(hop, edges = frontier.len(), "hop resolved");
            hops.push(frontier);
        }

        let mut paths = assemble(&hops);
        let (min_path, max_path) = (self.request.min_path, self.request.effective_max());
        paths.retain(|path| {
            let len = path.len();
            (min_path..=max_path).contains(&len)
                && self.request.mod_path.is_none_or(|m| len % m == 0)
                && self
                    .request
                    .terminal
                    .as_ref()
                    .is_none_or(|pattern| pattern.is_match(&path.to_node))
        });
        paths.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.to_node.cmp(&b.to_node))
                .then_with(|| a.nodes().cmp(&b.nodes()))
        });

        let state = self.state.into_inner().unwrap_or_else(|e| e.into_inner());
        debug!(paths = paths.len(), edges = state.processed(), "traversal finished");
        Ok(TraversalResult {
            paths,
            frequency: state.frequency,
        })
    }
}

/// Validates `request` and runs it against `store`.
#[instrument(
    level = "debug",
    skip_all,
    fields(namespace = %request.namespace, from = %request.from_node, hops = request.jobs.len())
)]
pub async fn traverse<S>(
    store: &S,
    request: &TraverseRequest,
    default_concurrency: Option<usize>,
) -> GraphResult<TraversalResult>
where
    S: EdgeStore + ?Sized,
{
    request.validate()?;
    Traversal::new(store, request, default_concurrency).run().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str, distance: f64) -> Edge {
        Edge {
            namespace: "ns".into(),
            from_node: from.into(),
            entity: "e".into(),
            direction: None,
            to_node: to.into(),
            distance,
            created_at: 0,
            updated_at: 0,
            ttl: None,
        }
    }

    #[test]
    fn mirror_rows_share_a_key() {
        assert_eq!(
            edge_key("a", "b", Some(Direction::Out)),
            edge_key("b", "a", Some(Direction::In))
        );
        assert_ne!(
            edge_key("a", "b", Some(Direction::Out)),
            edge_key("a", "b", Some(Direction::In))
        );
        assert_eq!(edge_key("b", "a", None), "a:b:~");
    }

    #[test]
    fn admit_counts_endpoints_by_direction() {
        let mut state = TraversalState::default();
        let mut out = edge("a", "b", 0.1);
        out.direction = Some(Direction::Out);
        assert!(state.admit(&out));
        assert_eq!(state.frequency.visits("a"), 0);
        assert_eq!(state.frequency.visits("b"), 1);

        let mut mirror = edge("b", "a", 0.1);
        mirror.direction = Some(Direction::In);
        assert!(!state.admit(&mirror));

        assert!(state.admit(&edge("b", "c", 0.1)));
        assert_eq!(state.frequency.visits("b"), 2);
        assert_eq!(state.frequency.visits("c"), 1);
        assert_eq!(state.frequency.by_entity["e"]["b"], 2);
        assert_eq!(state.processed(), 2);
    }

    #[test]
    fn assemble_branches_and_supersedes() {
        let hops = vec![
            vec![edge("a", "b", 0.1), edge("a", "c", 0.2)],
            vec![edge("b", "d", 0.3), edge("b", "e", 0.4)],
        ];
        let paths = assemble(&hops);
        let mut traces: Vec<_> = paths.iter().map(|p| (p.nodes().join(">"), p.len())).collect();
        traces.sort();
        assert_eq!(
            traces,
            [
                ("a>b>d".to_owned(), 2),
                ("a>b>e".to_owned(), 2),
                ("a>c".to_owned(), 1)
            ]
        );
        let abd = paths.iter().find(|p| p.to_node == "d").unwrap();
        assert!((abd.distance - 0.4).abs() < 1e-12);
    }

    #[test]
    fn edges_chain_onto_paths_grown_in_the_same_hop() {
        let hops = vec![
            vec![edge("a", "b", 0.1), edge("a", "c", 0.2)],
            vec![edge("b", "c", 0.05), edge("c", "d", 0.3)],
        ];
        let paths = assemble(&hops);
        let mut traces: Vec<_> = paths.iter().map(|p| p.nodes().join(">")).collect();
        traces.sort();
        assert_eq!(traces, ["a>b>c>d", "a>c>d"]);
        let longest = paths.iter().find(|p| p.len() == 3).unwrap();
        assert!((longest.distance - 0.45).abs() < 1e-12);
    }

    #[test]
    fn unmatched_edges_start_new_paths() {
        let hops = vec![vec![edge("a", "b", 0.1)], vec![edge("x", "y", 0.1)]];
        let mut traces: Vec<_> = assemble(&hops).iter().map(|p| p.nodes().join(">")).collect();
        traces.sort();
        assert_eq!(traces, ["a>b", "x>y"]);
    }

    #[test]
    fn request_shape_is_checked() {
        let empty = TraverseRequest::new("ns", "a");
        assert!(matches!(empty.validate(), Err(GraphError::Configuration(_))));

        let inverted = TraverseRequest::new("ns", "a").job(HopJob::new("e")).path_len(2, 1);
        assert!(matches!(inverted.validate(), Err(GraphError::Configuration(_))));

        let zero_mod = TraverseRequest::new("ns", "a").job(HopJob::new("e")).mod_path(0);
        assert!(matches!(zero_mod.validate(), Err(GraphError::Configuration(_))));

        let bad_node = TraverseRequest::new("ns", "").job(HopJob::new("e"));
        assert!(matches!(bad_node.validate(), Err(GraphError::Validation(_))));
    }
}
