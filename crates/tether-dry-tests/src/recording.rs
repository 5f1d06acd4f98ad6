// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Edge store that records every call.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tether_core::{DistanceQuery, DistanceUpdate, EdgeRow, EdgeStore, MemoryEdgeStore, StoreResult};

/// One call observed by a [`RecordingEdgeStore`].
#[derive(Clone, Debug, PartialEq)]
pub enum StoreCall {
    /// `get(namespace, id)`.
    Get {
        /// Partition key.
        namespace: String,
        /// Sort key.
        id: String,
    },
    /// `put(row)`.
    Put(EdgeRow),
    /// `delete(namespace, id)`.
    Delete {
        /// Partition key.
        namespace: String,
        /// Sort key.
        id: String,
    },
    /// `update_distance(update)`.
    UpdateDistance(DistanceUpdate),
    /// `scan_prefix(namespace, prefix, limit)`.
    ScanPrefix {
        /// Partition key.
        namespace: String,
        /// Id prefix.
        prefix: String,
    },
    /// `scan_distance(query)`.
    ScanDistance(DistanceQuery),
    /// `count_prefix(namespace, prefix)`.
    CountPrefix {
        /// Partition key.
        namespace: String,
        /// Id prefix.
        prefix: String,
    },
}

/// Delegates to a [`MemoryEdgeStore`] and keeps a log of calls in order.
#[derive(Default)]
pub struct RecordingEdgeStore {
    inner: Arc<MemoryEdgeStore>,
    calls: Mutex<Vec<StoreCall>>,
}

impl RecordingEdgeStore {
    /// Wraps `inner`.
    pub fn new(inner: Arc<MemoryEdgeStore>) -> Self {
        Self {
            inner,
            calls: Mutex::default(),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &Arc<MemoryEdgeStore> {
        &self.inner
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Only the conditional updates.
    pub fn updates(&self) -> Vec<DistanceUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::UpdateDistance(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Forgets recorded calls; the stored rows stay.
    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }
}

#[async_trait]
impl EdgeStore for RecordingEdgeStore {
    async fn get(&self, namespace: &str, id: &str) -> StoreResult<Option<EdgeRow>> {
        self.record(StoreCall::Get {
            namespace: namespace.to_owned(),
            id: id.to_owned(),
        });
        self.inner.get(namespace, id).await
    }

    async fn put(&self, row: EdgeRow) -> StoreResult<()> {
        self.record(StoreCall::Put(row.clone()));
        self.inner.put(row).await
    }

    async fn delete(&self, namespace: &str, id: &str) -> StoreResult<Option<EdgeRow>> {
        self.record(StoreCall::Delete {
            namespace: namespace.to_owned(),
            id: id.to_owned(),
        });
        self.inner.delete(namespace, id).await
    }

    async fn update_distance(&self, update: DistanceUpdate) -> StoreResult<EdgeRow> {
        self.record(StoreCall::UpdateDistance(update.clone()));
        self.inner.update_distance(update).await
    }

    async fn scan_prefix(
        &self,
        namespace: &str,
        prefix: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<EdgeRow>> {
        self.record(StoreCall::ScanPrefix {
            namespace: namespace.to_owned(),
            prefix: prefix.to_owned(),
        });
        self.inner.scan_prefix(namespace, prefix, limit).await
    }

    async fn scan_distance(&self, query: &DistanceQuery) -> StoreResult<Vec<EdgeRow>> {
        self.record(StoreCall::ScanDistance(query.clone()));
        self.inner.scan_distance(query).await
    }

    async fn count_prefix(&self, namespace: &str, prefix: &str) -> StoreResult<usize> {
        self.record(StoreCall::CountPrefix {
            namespace: namespace.to_owned(),
            prefix: prefix.to_owned(),
        });
        self.inner.count_prefix(namespace, prefix).await
    }
}
