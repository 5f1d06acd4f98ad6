// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Coalescing write pipeline.
//!
//! A stream of loosely typed [`LinkInput`]s is folded into a [`Coalescer`]
//! before anything touches the store. Ordinary writes to the same edge are
//! merged by summing their distances. A write carrying an absolute distance
//! bumps a generation counter before and after it is bucketed, so it lands in
//! a bucket of its own and ordinary writes on either side of it never merge
//! across it. Once the stream ends every bucket is flushed through
//! [`LinkWriter::link`] at bounded concurrency.

use std::collections::BTreeMap;

use futures_util::future;
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::codec::Direction;
use crate::error::GraphResult;
use crate::link::LinkWriter;
use crate::request::{LinkInput, LinkRequest};
use crate::store::EdgeStore;

/// Identity of one coalescing bucket.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoalesceKey {
    /// Partition scope.
    pub namespace: String,
    /// Origin node.
    pub from_node: String,
    /// Edge kind.
    pub entity: String,
    /// Orientation.
    pub direction: Option<Direction>,
    /// Target node.
    pub to_node: String,
    /// Absolute-write generation the bucket belongs to.
    pub generation: u64,
}

/// Explicit accumulator for one pipeline run.
#[derive(Debug, Default)]
pub struct Coalescer {
    absolute_edge_counter: u64,
    buckets: BTreeMap<CoalesceKey, LinkRequest>,
    received: usize,
    dropped: usize,
}

impl Coalescer {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes `input` and merges it into its bucket. Invalid input is
    /// counted and dropped. Returns `false` for a dropped item.
    pub fn push(&mut self, input: LinkInput, namespace: Option<&str>, entity: &str) -> bool {
        self.received += 1;
        let request = match input.normalize(namespace, entity) {
            Ok(request) => request,
            Err(err) => {
                self.dropped += 1;
                warn!(%err, "dropping malformed link");
                return false;
            }
        };

        let absolute = request.absolute_distance.is_some();
        if absolute {
            self.absolute_edge_counter += 1;
        }
        let key = CoalesceKey {
            namespace: request.namespace.clone(),
            from_node: request.from_node.clone(),
            entity: request.entity.clone(),
            direction: request.direction,
            to_node: request.to_node.clone(),
            generation: self.absolute_edge_counter,
        };
        if absolute {
            self.absolute_edge_counter += 1;
        }

        match self.buckets.get_mut(&key) {
            Some(bucket) => {
                let distance = bucket.distance + request.distance;
                if !distance.is_finite() {
                    self.dropped += 1;
                    warn!(
                        from = %request.from_node,
                        to = %request.to_node,
                        "dropping link whose merged distance overflows"
                    );
                    return false;
                }
                *bucket = LinkRequest { distance, ..request };
            }
            None => {
                self.buckets.insert(key, request);
            }
        }
        true
    }

    /// Number of pending buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Pending writes in key order.
    pub fn pending(&self) -> impl Iterator<Item = &LinkRequest> {
        self.buckets.values()
    }

    /// Consumes the accumulator, yielding the merged writes and the tallies.
    pub fn finish(self) -> (Vec<LinkRequest>, CoalesceReport) {
        let report = CoalesceReport {
            received: self.received,
            dropped: self.dropped,
            flushed: self.buckets.len(),
        };
        (self.buckets.into_values().collect(), report)
    }
}

/// Knobs for [`process_coalesced_writes`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalesceOptions {
    /// Namespace applied to items that carry none.
    pub namespace: Option<String>,
    /// Entity applied to items that carry none; the configured default when unset.
    pub entity: Option<String>,
    /// Flush fan-out; the configured one when unset.
    pub concurrency: Option<usize>,
}

impl CoalesceOptions {
    /// Options scoped to `namespace`.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }
}

/// Tallies of one pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalesceReport {
    /// Items read from the stream.
    pub received: usize,
    /// Items dropped as malformed.
    pub dropped: usize,
    /// Merged writes sent to the store.
    pub flushed: usize,
}

/// Drains `items`, merges duplicate writes and flushes the result.
///
/// Malformed items are dropped with a warning. A store failure during the
/// flush fails the call; writes that already landed stay.
#[instrument(level = "debug", skip_all)]
pub async fn process_coalesced_writes<S, St>(
    writer: &LinkWriter<S>,
    items: St,
    options: &CoalesceOptions,
) -> GraphResult<CoalesceReport>
where
    S: EdgeStore,
    St: Stream<Item = LinkInput>,
{
    let namespace = options.namespace.as_deref();
    let entity = options
        .entity
        .as_deref()
        .unwrap_or(&writer.settings().default_entity);

    let mut coalescer = Coalescer::new();
    items
        .for_each(|input| {
            coalescer.push(input, namespace, entity);
            future::ready(())
        })
        .await;

    let (writes, report) = coalescer.finish();
    let concurrency = options
        .concurrency
        .unwrap_or(writer.settings().flush_concurrency)
        .max(1);
    debug!(
        received = report.received,
        dropped = report.dropped,
        flushing = report.flushed,
        "coalesced"
    );

    stream::iter(writes)
        .map(|write| writer.link(write))
        .buffer_unordered(concurrency)
        .try_for_each(|_| future::ready(Ok(())))
        .await?;
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn input(from: &str, to: &str, distance: f64) -> LinkInput {
        LinkInput {
            from_node: Some(from.into()),
            to_node: Some(to.into()),
            distance: Some(distance),
            ..LinkInput::default()
        }
    }

    #[test]
    fn ordinary_writes_sum_their_distances() {
        let mut coalescer = Coalescer::new();
        assert!(coalescer.push(input("a", "b", 2.0), Some("ns"), "e"));
        assert!(coalescer.push(input("a", "b", 3.0), Some("ns"), "e"));
        assert_eq!(coalescer.len(), 1);
        let (writes, report) = coalescer.finish();
        assert_eq!(writes[0].distance, 5.0);
        assert_eq!(
            report,
            CoalesceReport {
                received: 2,
                dropped: 0,
                flushed: 1
            }
        );
    }

    #[test]
    fn overflowing_merge_keeps_the_bucket_and_drops_the_item() {
        let mut coalescer = Coalescer::new();
        assert!(coalescer.push(input("a", "b", 1e308), Some("ns"), "e"));
        assert!(!coalescer.push(input("a", "b", 1e308), Some("ns"), "e"));
        assert!(coalescer.push(input("c", "d", 1.0), Some("ns"), "e"));
        let (writes, report) = coalescer.finish();
        let distances: Vec<_> = writes.iter().map(|w| (w.from_node.as_str(), w.distance)).collect();
        assert_eq!(distances, [("a", 1e308), ("c", 1.0)]);
        assert_eq!((report.received, report.dropped, report.flushed), (3, 1, 2));
    }

    #[test]
    fn absolute_writes_split_generations() {
        let mut coalescer = Coalescer::new();
        coalescer.push(input("a", "b", 1.0), Some("ns"), "e");
        coalescer.push(
            LinkInput {
                absolute_distance: Some(0.5),
                ..input("a", "b", 1.0)
            },
            Some("ns"),
            "e",
        );
        coalescer.push(input("a", "b", 1.0), Some("ns"), "e");
        coalescer.push(input("a", "b", 1.0), Some("ns"), "e");

        let (writes, _) = coalescer.finish();
        let shapes: Vec<_> = writes
            .iter()
            .map(|w| (w.distance, w.absolute_distance))
            .collect();
        assert_eq!(shapes, [(1.0, None), (1.0, Some(0.5)), (2.0, None)]);
    }

    #[test]
    fn direction_and_entity_separate_buckets() {
        let mut coalescer = Coalescer::new();
        coalescer.push(input("a", "b", 1.0), Some("ns"), "e");
        coalescer.push(
            LinkInput {
                direction: Some("OUT".into()),
                ..input("a", "b", 1.0)
            },
            Some("ns"),
            "e",
        );
        coalescer.push(
            LinkInput {
                entity: Some("other".into()),
                ..input("a", "b", 1.0)
            },
            Some("ns"),
            "e",
        );
        assert_eq!(coalescer.len(), 3);
    }

    #[test]
    fn later_items_win_non_distance_fields() {
        let mut coalescer = Coalescer::new();
        coalescer.push(input("a", "b", 1.0), Some("ns"), "e");
        coalescer.push(
            LinkInput {
                decrement_path: Some(0.25),
                ..input("a", "b", 1.0)
            },
            Some("ns"),
            "e",
        );
        let merged = coalescer.pending().next().unwrap();
        assert_eq!(merged.decrement_path, Some(0.25));
        assert_eq!(merged.distance, 2.0);
    }

    #[test]
    fn malformed_items_are_counted_and_dropped() {
        let mut coalescer = Coalescer::new();
        assert!(!coalescer.push(LinkInput::default(), Some("ns"), "e"));
        assert!(!coalescer.push(input("a", "a", 1.0), Some("ns"), "e"));
        assert!(!coalescer.push(input("a", "b", 1.0), None, "e"));
        let (writes, report) = coalescer.finish();
        assert!(writes.is_empty());
        assert_eq!(report.received, 3);
        assert_eq!(report.dropped, 3);
    }
}
