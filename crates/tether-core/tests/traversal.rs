// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Traversal over fixture graphs: dedup, path filters, ordering, delegation.
#![allow(clippy::unwrap_used, clippy::float_cmp)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regex::Regex;
use tether_core::{
    ClosestRequest, Edge, Graph, GraphError, GraphResult, GraphSettings, HopJob, HopResolver,
    MemoryEdgeStore, StoreError, TraverseRequest,
};
use tether_dry_tests::{FailingEdgeStore, GraphFixture};

const E: &str = "related";

fn fixture() -> GraphFixture {
    GraphFixture::new("ns").entity(E)
}

fn hops(from: &str, n: usize) -> TraverseRequest {
    (0..n).fold(TraverseRequest::new("ns", from), |req, _| req.job(HopJob::new(E)))
}

fn traces(paths: &[tether_core::TraversalPath]) -> Vec<String> {
    paths.iter().map(|p| p.nodes().join(">")).collect()
}

/// a-b 0.1, a-c 0.2, b-d 0.3
fn star() -> Graph<MemoryEdgeStore> {
    fixture()
        .edge("a", "b", 0.1)
        .edge("a", "c", 0.2)
        .edge("b", "d", 0.3)
        .build()
        .unwrap()
}

#[tokio::test]
async fn mirror_rows_are_not_walked_back() {
    let graph = fixture()
        .edge("a", "b", 0.1)
        .edge("b", "c", 0.2)
        .edge("c", "d", 0.3)
        .build()
        .unwrap();
    let result = graph.traverse(&hops("a", 3)).await.unwrap();
    assert_eq!(traces(&result.paths), ["a>b>c>d"]);
    assert!((result.paths[0].distance - 0.6).abs() < 1e-12);
}

#[tokio::test]
async fn paths_sort_by_distance_and_respect_length_bounds() {
    let graph = star();

    let all = graph.traverse(&hops("a", 2)).await.unwrap();
    assert_eq!(traces(&all.paths), ["a>c", "a>b>d"]);

    let long = graph.traverse(&hops("a", 2).path_len(2, 2)).await.unwrap();
    assert_eq!(traces(&long.paths), ["a>b>d"]);

    let short = graph.traverse(&hops("a", 2).path_len(1, 1)).await.unwrap();
    assert_eq!(traces(&short.paths), ["a>c"]);

    let even = graph.traverse(&hops("a", 2).mod_path(2)).await.unwrap();
    assert_eq!(traces(&even.paths), ["a>b>d"]);
}

#[tokio::test]
async fn length_window_drops_short_paths() {
    let graph = fixture()
        .edge("a", "x", 0.9)
        .edge("a", "b", 0.1)
        .edge("b", "c", 0.1)
        .edge("c", "d", 0.1)
        .build()
        .unwrap();
    let all = graph.traverse(&hops("a", 3)).await.unwrap();
    assert_eq!(traces(&all.paths), ["a>b>c>d", "a>x"]);

    let windowed = graph.traverse(&hops("a", 3).path_len(2, 3)).await.unwrap();
    assert_eq!(traces(&windowed.paths), ["a>b>c>d"]);
}

#[tokio::test]
async fn later_edges_extend_paths_grown_in_the_same_hop() {
    let graph = fixture()
        .edge("a", "b", 0.1)
        .edge("a", "c", 0.2)
        .edge("b", "c", 0.05)
        .edge("c", "d", 0.3)
        .build()
        .unwrap();
    let result = graph.traverse(&hops("a", 3).concurrency(1)).await.unwrap();
    assert_eq!(traces(&result.paths), ["a>b>c>d", "a>c>d"]);
    assert!((result.paths[0].distance - 0.45).abs() < 1e-12);
    assert!((result.paths[1].distance - 0.5).abs() < 1e-12);
}

#[tokio::test]
async fn terminal_pattern_filters_tails() {
    let graph = star();
    let request = hops("a", 2).terminal(Regex::new("^[cd]$").unwrap());
    assert_eq!(traces(&graph.traverse(&request).await.unwrap().paths), ["a>c", "a>b>d"]);

    let request = hops("a", 2).terminal(Regex::new("^c$").unwrap());
    assert_eq!(traces(&graph.traverse(&request).await.unwrap().paths), ["a>c"]);
}

#[tokio::test]
async fn frequency_counts_each_edge_once() {
    let result = star().traverse(&hops("a", 2)).await.unwrap();
    let counts: Vec<_> = result.frequency.all.iter().map(|(n, c)| (n.as_str(), *c)).collect();
    assert_eq!(counts, [("a", 2), ("b", 2), ("c", 1), ("d", 1)]);
    assert_eq!(result.frequency.by_entity[E], result.frequency.all);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_hops_consume_shared_edges_once() {
    let graph = fixture()
        .edge("a", "b", 0.1)
        .edge("a", "c", 0.5)
        .edge("b", "c", 0.2)
        .build()
        .unwrap();
    for _ in 0..16 {
        let result = graph.traverse(&hops("a", 3)).await.unwrap();
        assert!(result.frequency.all.values().all(|&visits| visits == 2));
        assert_eq!(result.frequency.all.len(), 3);
    }
}

#[tokio::test]
async fn sequential_fan_out_is_deterministic() {
    let graph = fixture()
        .edge("a", "b", 0.1)
        .edge("a", "c", 0.5)
        .edge("b", "c", 0.2)
        .build()
        .unwrap();
    let result = graph.traverse(&hops("a", 2).concurrency(1)).await.unwrap();
    assert_eq!(traces(&result.paths), ["a>b>c", "a>c"]);
}

#[tokio::test]
async fn equal_distances_break_ties_by_terminal_node() {
    let graph = fixture().edge("a", "c", 0.2).edge("a", "b", 0.2).build().unwrap();
    let result = graph.traverse(&hops("a", 1)).await.unwrap();
    assert_eq!(traces(&result.paths), ["a>b", "a>c"]);
}

#[tokio::test]
async fn hop_limits_and_ranges_apply_per_seed() {
    let graph = star();
    let request = TraverseRequest::new("ns", "a")
        .job(HopJob::new(E).limit(1))
        .job(HopJob::new(E).range(tether_core::DistanceRange::at_least(0.25)));
    let result = graph.traverse(&request).await.unwrap();
    assert_eq!(traces(&result.paths), ["a>b>d"]);
}

#[tokio::test]
async fn empty_job_list_is_rejected() {
    let err = star().traverse(&TraverseRequest::new("ns", "a")).await.unwrap_err();
    assert!(matches!(err, GraphError::Configuration(_)));
}

#[tokio::test]
async fn remote_hops_resolve_elsewhere() {
    let local = fixture().edge("a", "b", 0.1).build().unwrap();
    let remote = fixture().edge("b", "c", 0.2).build().unwrap();

    let alone = local.traverse(&hops("a", 2)).await.unwrap();
    assert_eq!(traces(&alone.paths), ["a>b"]);

    let request = hops("a", 2).remote(1, Arc::new(remote.writer().clone()));
    let federated = local.traverse(&request).await.unwrap();
    assert_eq!(traces(&federated.paths), ["a>b>c"]);
}

#[derive(Default)]
struct SpyResolver {
    seen: Mutex<Vec<(usize, String)>>,
}

#[async_trait]
impl HopResolver for SpyResolver {
    async fn closest(&self, request: ClosestRequest, hop: usize) -> GraphResult<Vec<Edge>> {
        self.seen.lock().unwrap().push((hop, request.from_node));
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn resolver_sees_hop_index_and_seed() {
    let spy = Arc::new(SpyResolver::default());
    let request = hops("a", 3).remote(1, spy.clone());
    let result = star().traverse(&request).await.unwrap();

    let mut seen = spy.seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, [(1, "b".to_owned()), (1, "c".to_owned())]);
    assert_eq!(traces(&result.paths), ["a>b", "a>c"]);
}

#[tokio::test]
async fn store_failure_mid_traversal_fails_the_call() {
    let store = Arc::new(FailingEdgeStore::new(star().store().clone()));
    store.scan_fail_at.store(2, std::sync::atomic::Ordering::SeqCst);
    let graph = Graph::new(store, GraphSettings::default()).unwrap();

    let err = graph.traverse(&hops("a", 2)).await.unwrap_err();
    assert!(matches!(err, GraphError::Store(StoreError::Unavailable(_))));
}
