// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Edge store with failure injection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tether_core::{
    DistanceQuery, DistanceUpdate, EdgeRow, EdgeStore, MemoryEdgeStore, StoreError, StoreResult,
};

/// Delegates to a [`MemoryEdgeStore`] but fails on demand.
///
/// Writes fail for any id registered with [`FailingEdgeStore::fail_id`].
/// Set `*_fail_at` to a call count to fail that call and every later one;
/// 0 disables it (default). Failures surface as [`StoreError::Unavailable`].
#[derive(Default)]
pub struct FailingEdgeStore {
    inner: Arc<MemoryEdgeStore>,
    failing_ids: Mutex<HashSet<String>>,
    /// Fail `update_distance` from this call number on (0 = never).
    pub update_fail_at: AtomicU64,
    /// Fail `scan_distance` from this call number on (0 = never).
    pub scan_fail_at: AtomicU64,
    update_count: AtomicU64,
    scan_count: AtomicU64,
}

impl FailingEdgeStore {
    /// Wraps `inner`.
    pub fn new(inner: Arc<MemoryEdgeStore>) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// The wrapped store, for inspecting what landed.
    pub fn inner(&self) -> &Arc<MemoryEdgeStore> {
        &self.inner
    }

    /// Makes every write and delete of `id` fail.
    pub fn fail_id(&self, id: impl Into<String>) {
        self.failing_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.into());
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.failing_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.update_fail_at.store(0, Ordering::SeqCst);
        self.scan_fail_at.store(0, Ordering::SeqCst);
    }

    fn id_fails(&self, id: &str) -> bool {
        self.failing_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    fn should_fail(counter: &AtomicU64, fail_at: &AtomicU64) -> bool {
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let target = fail_at.load(Ordering::SeqCst);
        target != 0 && count >= target
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Unavailable(format!("injected {what} failure"))
    }
}

#[async_trait]
impl EdgeStore for FailingEdgeStore {
    async fn get(&self, namespace: &str, id: &str) -> StoreResult<Option<EdgeRow>> {
        self.inner.get(namespace, id).await
    }

    async fn put(&self, row: EdgeRow) -> StoreResult<()> {
        if self.id_fails(&row.id) {
            return Err(Self::injected("put"));
        }
        self.inner.put(row).await
    }

    async fn delete(&self, namespace: &str, id: &str) -> StoreResult<Option<EdgeRow>> {
        if self.id_fails(id) {
            return Err(Self::injected("delete"));
        }
        self.inner.delete(namespace, id).await
    }

    async fn update_distance(&self, update: DistanceUpdate) -> StoreResult<EdgeRow> {
        if Self::should_fail(&self.update_count, &self.update_fail_at)
            || self.id_fails(&update.id)
        {
            return Err(Self::injected("update_distance"));
        }
        self.inner.update_distance(update).await
    }

    async fn scan_prefix(
        &self,
        namespace: &str,
        prefix: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<EdgeRow>> {
        self.inner.scan_prefix(namespace, prefix, limit).await
    }

    async fn scan_distance(&self, query: &DistanceQuery) -> StoreResult<Vec<EdgeRow>> {
        if Self::should_fail(&self.scan_count, &self.scan_fail_at) {
            return Err(Self::injected("scan_distance"));
        }
        self.inner.scan_distance(query).await
    }

    async fn count_prefix(&self, namespace: &str, prefix: &str) -> StoreResult<usize> {
        self.inner.count_prefix(namespace, prefix).await
    }
}
