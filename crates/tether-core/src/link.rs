// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Weighted link writer: bidirectional upserts with decay, plus neighbor reads
//! and deletes.
//!
//! Every logical edge is two rows, the forward row and its mirror with the
//! direction inverted. [`LinkWriter::set_edge`] writes both independently and
//! concurrently. When one write fails the call fails, and the row that did
//! land is left in place; callers that need both rows must retry the whole
//! call (the conditional update makes an overwrite retry idempotent, an
//! accumulate retry is not).
//!
//! # Distance Semantics
//!
//! - `distance > 0` overwrites the stored distance.
//! - `distance <= 0` is added to the stored distance, a missing row counting
//!   as `1.0`.
//!
//! [`LinkWriter::link`] maps a request onto that rule: an `absolute_distance`
//! is passed through as is, otherwise `-(distance * decrement_path)` nudges the
//! stored value down.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, instrument, warn};

use crate::codec::{compose_base, compose_id, invert_direction, parse_id, scan_prefix, Direction};
use crate::edge::{DeletedEdge, Edge, LinkedEdge};
use crate::error::GraphResult;
use crate::request::{
    AllAllRequest, ClosestRequest, CrossLinkRequest, EdgeRequest, LinkRequest, NodeRequest,
};
use crate::settings::GraphSettings;
use crate::store::{
    now_millis, DistanceQuery, DistanceUpdate, DistanceWrite, EdgeStore, StoreResult,
};

/// Keys of one stored row.
struct RowKeys {
    id: String,
    base: String,
}

fn row_keys(
    namespace: &str,
    from_node: &str,
    entity: &str,
    direction: Option<Direction>,
    to_node: &str,
) -> RowKeys {
    RowKeys {
        id: compose_id(from_node, entity, direction, to_node, true),
        base: compose_base(namespace, from_node, entity, direction, true),
    }
}

/// Nearest neighbors straight from the distance index. No validation.
pub(crate) async fn nearest<S>(store: &S, request: &ClosestRequest) -> GraphResult<Vec<Edge>>
where
    S: EdgeStore + ?Sized,
{
    let query = DistanceQuery {
        base: compose_base(
            &request.namespace,
            &request.from_node,
            &request.entity,
            request.direction,
            true,
        ),
        range: request.range.checked()?,
        desc: request.desc,
        limit: request.limit,
    };
    let rows = store.scan_distance(&query).await?;
    Ok(rows.into_iter().map(Edge::from).collect())
}

fn pair<T>(
    forward: StoreResult<T>,
    mirror: StoreResult<T>,
    what: &str,
    id: &str,
) -> GraphResult<(T, T)> {
    match (forward, mirror) {
        (Ok(forward), Ok(mirror)) => Ok((forward, mirror)),
        (Err(err), Ok(_)) | (Ok(_), Err(err)) => {
            warn!(%id, %err, "{what}: one of two mirror rows failed; the other was applied");
            Err(err.into())
        }
        (Err(err), Err(_)) => Err(err.into()),
    }
}

/// Writes and reads edges through an [`EdgeStore`].
pub struct LinkWriter<S> {
    store: Arc<S>,
    settings: GraphSettings,
}

impl<S> Clone for LinkWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            settings: self.settings.clone(),
        }
    }
}

impl<S: EdgeStore> LinkWriter<S> {
    /// Wraps `store` with `settings`.
    pub fn new(store: Arc<S>, settings: GraphSettings) -> Self {
        Self { store, settings }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The active settings.
    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    fn ttl_stamp(&self, now_ms: u64) -> Option<u64> {
        self.settings
            .ttl_seconds
            .map(|ttl| (now_ms / 1000).saturating_add(ttl))
    }

    /// Writes both rows of one logical edge.
    ///
    /// Positive `distance` overwrites; zero or negative accumulates onto the
    /// stored value (missing rows start at `1.0`). Inputs are assumed valid.
    #[instrument(level = "debug", skip(self))]
    pub async fn set_edge(
        &self,
        namespace: &str,
        from_node: &str,
        entity: &str,
        direction: Option<Direction>,
        to_node: &str,
        distance: f64,
    ) -> GraphResult<LinkedEdge> {
        let now = now_millis();
        let ttl = self.ttl_stamp(now);
        let write = DistanceWrite::from_signed(distance);

        let forward_keys = row_keys(namespace, from_node, entity, direction, to_node);
        let mirror_keys = row_keys(
            namespace,
            to_node,
            entity,
            invert_direction(direction),
            from_node,
        );
        let forward_id = forward_keys.id.clone();

        let update = |keys: RowKeys| DistanceUpdate {
            namespace: namespace.to_owned(),
            id: keys.id,
            base: keys.base,
            write,
            now,
            ttl,
        };
        let (forward, mirror) = tokio::join!(
            self.store.update_distance(update(forward_keys)),
            self.store.update_distance(update(mirror_keys)),
        );
        let (forward, mirror) = pair(forward, mirror, "set_edge", &forward_id)?;
        Ok(LinkedEdge {
            forward: forward.into(),
            mirror: mirror.into(),
        })
    }

    /// Distance handed to [`LinkWriter::set_edge`] for a link request.
    pub fn link_distance(&self, request: &LinkRequest) -> f64 {
        request.absolute_distance.unwrap_or_else(|| {
            let step = request
                .decrement_path
                .unwrap_or(self.settings.decrement_path);
            -(request.distance * step)
        })
    }

    /// Creates or strengthens one logical edge.
    #[instrument(
        level = "debug",
        skip_all,
        fields(namespace = %request.namespace, from = %request.from_node, to = %request.to_node)
    )]
    pub async fn link(&self, request: LinkRequest) -> GraphResult<LinkedEdge> {
        request.validate()?;
        let distance = self.link_distance(&request);
        self.set_edge(
            &request.namespace,
            &request.from_node,
            &request.entity,
            request.direction,
            &request.to_node,
            distance,
        )
        .await
    }

    /// Links each request at `concurrency`. Stops at the first failure.
    pub async fn link_many(
        &self,
        links: Vec<LinkRequest>,
        concurrency: usize,
    ) -> GraphResult<Vec<LinkedEdge>> {
        stream::iter(links)
            .map(|link| self.link(link))
            .buffer_unordered(concurrency.max(1))
            .try_collect()
            .await
    }

    /// Links one node to every target.
    pub async fn cross_link(&self, request: CrossLinkRequest) -> GraphResult<Vec<LinkedEdge>> {
        let links = request.into_links()?;
        debug!(count = links.len(), "cross_link");
        self.link_many(links, self.settings.write_concurrency).await
    }

    /// Links every unordered pair of nodes.
    pub async fn all_all(&self, request: AllAllRequest) -> GraphResult<Vec<LinkedEdge>> {
        let links = request.into_links()?;
        debug!(count = links.len(), "all_all");
        self.link_many(links, self.settings.write_concurrency).await
    }

    /// Nearest neighbors ordered by distance.
    pub async fn closest(&self, request: &ClosestRequest) -> GraphResult<Vec<Edge>> {
        request.validate()?;
        nearest(self.store.as_ref(), request).await
    }

    /// Every row from a node, ordered by key.
    pub async fn all_by_node(&self, request: &NodeRequest) -> GraphResult<Vec<Edge>> {
        request.validate()?;
        let prefix = scan_prefix(&request.from_node, request.entity.as_deref(), request.direction);
        let rows = self.store.scan_prefix(&request.namespace, &prefix, None).await?;
        Ok(rows.into_iter().map(Edge::from).collect())
    }

    /// Number of rows [`LinkWriter::all_by_node`] would return.
    pub async fn count(&self, request: &NodeRequest) -> GraphResult<usize> {
        request.validate()?;
        let prefix = scan_prefix(&request.from_node, request.entity.as_deref(), request.direction);
        Ok(self.store.count_prefix(&request.namespace, &prefix).await?)
    }

    /// Forward row of one edge.
    pub async fn get(&self, request: &EdgeRequest) -> GraphResult<Option<Edge>> {
        request.validate()?;
        let keys = row_keys(
            &request.namespace,
            &request.from_node,
            &request.entity,
            request.direction,
            &request.to_node,
        );
        Ok(self
            .store
            .get(&request.namespace, &keys.id)
            .await?
            .map(Edge::from))
    }

    async fn delete_ids(
        &self,
        namespace: &str,
        forward_id: &str,
        mirror_id: &str,
    ) -> GraphResult<Option<DeletedEdge>> {
        let (forward, mirror) = tokio::join!(
            self.store.delete(namespace, forward_id),
            self.store.delete(namespace, mirror_id),
        );
        let (forward, mirror) = pair(forward, mirror, "delete", forward_id)?;
        if forward.is_none() && mirror.is_none() {
            return Ok(None);
        }
        Ok(Some(DeletedEdge {
            forward: forward.map(Edge::from),
            mirror: mirror.map(Edge::from),
        }))
    }

    /// Removes both rows of one edge. `None` when neither existed.
    #[instrument(
        level = "debug",
        skip_all,
        fields(namespace = %request.namespace, from = %request.from_node, to = %request.to_node)
    )]
    pub async fn delete(&self, request: &EdgeRequest) -> GraphResult<Option<DeletedEdge>> {
        request.validate()?;
        let forward = compose_id(
            &request.from_node,
            &request.entity,
            request.direction,
            &request.to_node,
            true,
        );
        let mirror = compose_id(
            &request.to_node,
            &request.entity,
            invert_direction(request.direction),
            &request.from_node,
            true,
        );
        self.delete_ids(&request.namespace, &forward, &mirror).await
    }

    /// Removes every edge from a node (both rows of each). Returns the number
    /// of logical edges removed.
    #[instrument(
        level = "debug",
        skip_all,
        fields(namespace = %request.namespace, from = %request.from_node)
    )]
    pub async fn delete_by_node(&self, request: &NodeRequest) -> GraphResult<usize> {
        request.validate()?;
        let prefix = scan_prefix(&request.from_node, request.entity.as_deref(), request.direction);
        let rows = self.store.scan_prefix(&request.namespace, &prefix, None).await?;
        let namespace = request.namespace.as_str();

        let removed: Vec<Option<DeletedEdge>> = stream::iter(rows)
            .map(|row| async move {
                let parsed = parse_id(&row.id);
                let mirror = compose_id(
                    &parsed.to_node,
                    &parsed.entity,
                    invert_direction(parsed.direction),
                    &parsed.from_node,
                    true,
                );
                self.delete_ids(namespace, &row.id, &mirror).await
            })
            .buffer_unordered(self.settings.write_concurrency.max(1))
            .try_collect()
            .await?;
        let count = removed.iter().flatten().count();
        debug!(count, "delete_by_node");
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::memory::MemoryEdgeStore;
    use crate::store::DistanceRange;

    fn writer(decrement_path: f64) -> LinkWriter<MemoryEdgeStore> {
        LinkWriter::new(
            Arc::new(MemoryEdgeStore::new()),
            GraphSettings {
                decrement_path,
                ..GraphSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn set_edge_writes_mirror_with_inverted_direction() {
        let writer = writer(0.1);
        let linked = writer
            .set_edge("ns", "a", "likes", Some(Direction::Out), "b", 0.4)
            .await
            .unwrap();
        assert_eq!(linked.forward.direction, Some(Direction::Out));
        assert_eq!(linked.mirror.direction, Some(Direction::In));
        assert_eq!(linked.mirror.from_node, "b");
        assert_eq!(linked.mirror.to_node, "a");
        assert_eq!(linked.forward.distance, linked.mirror.distance);

        let back = writer
            .get(&EdgeRequest::new("ns", "b", "a").entity("likes").direction(Direction::In))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(back.distance, 0.4);
    }

    #[tokio::test]
    async fn repeated_links_decay_from_one() {
        let writer = writer(0.1);
        for _ in 0..3 {
            writer.link(LinkRequest::new("ns", "a", "b")).await.unwrap();
        }
        let edge = writer
            .get(&EdgeRequest::new("ns", "a", "b"))
            .await
            .unwrap()
            .unwrap();
        assert!((edge.distance - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn absolute_distance_overwrites() {
        let writer = writer(0.1);
        writer.link(LinkRequest::new("ns", "a", "b")).await.unwrap();
        let linked = writer
            .link(LinkRequest::new("ns", "a", "b").absolute_distance(5.0))
            .await
            .unwrap();
        assert_eq!(linked.forward.distance, 5.0);
        assert_eq!(linked.mirror.distance, 5.0);
    }

    #[tokio::test]
    async fn created_at_survives_updates() {
        let writer = writer(0.1);
        let first = writer.link(LinkRequest::new("ns", "a", "b")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = writer.link(LinkRequest::new("ns", "a", "b")).await.unwrap();
        assert_eq!(first.forward.created_at, second.forward.created_at);
        assert!(second.forward.updated_at >= first.forward.updated_at);
    }

    #[tokio::test]
    async fn ttl_is_stamped_when_configured() {
        let writer = LinkWriter::new(
            Arc::new(MemoryEdgeStore::new()),
            GraphSettings {
                ttl_seconds: Some(60),
                ..GraphSettings::default()
            },
        );
        let linked = writer.link(LinkRequest::new("ns", "a", "b")).await.unwrap();
        let ttl = linked.forward.ttl.unwrap();
        assert!(ttl >= linked.forward.updated_at / 1000 + 60);
    }

    #[tokio::test]
    async fn validation_runs_before_store_access() {
        let writer = writer(0.1);
        let err = writer.link(LinkRequest::new("ns", "a:b", "c")).await.unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
        assert!(writer.store().is_empty());
    }

    #[tokio::test]
    async fn closest_orders_by_distance_and_honours_range() {
        let writer = writer(0.1);
        for (to, d) in [("b", 0.3), ("c", 0.1), ("d", 0.2)] {
            writer
                .link(LinkRequest::new("ns", "a", to).absolute_distance(d))
                .await
                .unwrap();
        }
        let near = writer.closest(&ClosestRequest::new("ns", "a")).await.unwrap();
        let order: Vec<_> = near.iter().map(|e| e.to_node.as_str()).collect();
        assert_eq!(order, ["c", "d", "b"]);

        let bounded = writer
            .closest(&ClosestRequest::new("ns", "a").range(DistanceRange::at_least(0.15)).limit(1))
            .await
            .unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].to_node, "d");

        let inverted = writer
            .closest(&ClosestRequest::new("ns", "a").range(DistanceRange::between(0.5, 0.1)))
            .await
            .unwrap_err();
        assert!(matches!(inverted, GraphError::Configuration(_)));
    }

    #[tokio::test]
    async fn count_matches_all_by_node() {
        let writer = writer(0.1);
        writer
            .cross_link(CrossLinkRequest::new("ns", "a", ["b", "c", "d"]).entity("likes"))
            .await
            .unwrap();
        writer
            .link(LinkRequest::new("ns", "a", "e").entity("knows"))
            .await
            .unwrap();

        let likes = NodeRequest::new("ns", "a").entity("likes");
        assert_eq!(writer.all_by_node(&likes).await.unwrap().len(), 3);
        assert_eq!(writer.count(&likes).await.unwrap(), 3);
        assert_eq!(writer.count(&NodeRequest::new("ns", "a")).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn delete_removes_both_rows_and_tolerates_missing() {
        let writer = writer(0.1);
        writer.link(LinkRequest::new("ns", "a", "b")).await.unwrap();
        let deleted = writer.delete(&EdgeRequest::new("ns", "a", "b")).await.unwrap().unwrap();
        assert!(deleted.forward.is_some());
        assert!(deleted.mirror.is_some());
        assert!(writer.store().is_empty());
        assert_eq!(writer.delete(&EdgeRequest::new("ns", "a", "b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_by_node_clears_mirrors() {
        let writer = writer(0.1);
        writer
            .all_all(AllAllRequest::new("ns", ["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(writer.store().len(), 6);
        let removed = writer.delete_by_node(&NodeRequest::new("ns", "a")).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(writer.store().len(), 2);
        assert_eq!(writer.count(&NodeRequest::new("ns", "b")).await.unwrap(), 1);
    }
}
