// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory ordered edge store.
//!
//! [`MemoryEdgeStore`] implements the full [`EdgeStore`] contract in process:
//! an ordered primary map per namespace plus a distance index per base. It
//! backs the CLI (via JSON snapshots) and every test in the workspace.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::store::{DistanceQuery, DistanceUpdate, EdgeRow, EdgeStore, StoreResult};

/// Total-ordered wrapper so distances can key an ordered set.
#[derive(Clone, Copy, Debug)]
struct DistanceKey(f64);

impl PartialEq for DistanceKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for DistanceKey {}

impl PartialOrd for DistanceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistanceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

type IndexEntry = (DistanceKey, String, String);

#[derive(Default)]
struct Tables {
    /// namespace -> id -> row
    rows: BTreeMap<String, BTreeMap<String, EdgeRow>>,
    /// base -> (distance, namespace, id)
    index: BTreeMap<String, BTreeSet<IndexEntry>>,
}

impl Tables {
    fn unindex(&mut self, row: &EdgeRow) {
        if let Some(entries) = self.index.get_mut(&row.base) {
            entries.remove(&(
                DistanceKey(row.distance),
                row.namespace.clone(),
                row.id.clone(),
            ));
            if entries.is_empty() {
                self.index.remove(&row.base);
            }
        }
    }

    fn insert(&mut self, row: EdgeRow) -> Option<EdgeRow> {
        let previous = self.remove(&row.namespace, &row.id);
        self.index.entry(row.base.clone()).or_default().insert((
            DistanceKey(row.distance),
            row.namespace.clone(),
            row.id.clone(),
        ));
        self.rows
            .entry(row.namespace.clone())
            .or_default()
            .insert(row.id.clone(), row);
        previous
    }

    fn remove(&mut self, namespace: &str, id: &str) -> Option<EdgeRow> {
        let partition = self.rows.get_mut(namespace)?;
        let removed = partition.remove(id)?;
        if partition.is_empty() {
            self.rows.remove(namespace);
        }
        self.unindex(&removed);
        Some(removed)
    }

    fn prefix_range<'a>(
        &'a self,
        namespace: &str,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a EdgeRow> + 'a {
        self.rows
            .get(namespace)
            .into_iter()
            .flat_map(move |partition| {
                partition
                    .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                    .take_while(move |(id, _)| id.starts_with(prefix))
                    .map(|(_, row)| row)
            })
    }
}

/// Ordered in-memory [`EdgeStore`].
///
/// A single `RwLock` guards the primary map and the distance index together,
/// so each row operation is atomic and the index never disagrees with the
/// rows.
#[derive(Default)]
pub struct MemoryEdgeStore {
    tables: RwLock<Tables>,
}

impl MemoryEdgeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `rows` (e.g. a previously taken [`snapshot`]).
    ///
    /// [`snapshot`]: MemoryEdgeStore::snapshot
    pub fn from_rows(rows: impl IntoIterator<Item = EdgeRow>) -> Self {
        let mut tables = Tables::default();
        for row in rows {
            tables.insert(row);
        }
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Every row, ordered by namespace then id.
    pub fn snapshot(&self) -> Vec<EdgeRow> {
        self.read()
            .rows
            .values()
            .flat_map(|partition| partition.values().cloned())
            .collect()
    }

    /// Total number of rows across all namespaces.
    pub fn len(&self) -> usize {
        self.read().rows.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.read().rows.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    async fn get(&self, namespace: &str, id: &str) -> StoreResult<Option<EdgeRow>> {
        Ok(self
            .read()
            .rows
            .get(namespace)
            .and_then(|partition| partition.get(id))
            .cloned())
    }

    async fn put(&self, row: EdgeRow) -> StoreResult<()> {
        self.write().insert(row);
        Ok(())
    }

    async fn delete(&self, namespace: &str, id: &str) -> StoreResult<Option<EdgeRow>> {
        Ok(self.write().remove(namespace, id))
    }

    async fn update_distance(&self, update: DistanceUpdate) -> StoreResult<EdgeRow> {
        let mut tables = self.write();
        let previous = tables.remove(&update.namespace, &update.id);
        let created_at = previous.as_ref().map_or(update.now, |row| row.created_at);
        let ttl = update
            .ttl
            .or_else(|| previous.as_ref().and_then(|row| row.ttl));
        let row = EdgeRow {
            distance: update.write.apply(previous.map(|row| row.distance)),
            namespace: update.namespace,
            id: update.id,
            base: update.base,
            created_at,
            updated_at: update.now,
            ttl,
        };
        tables.insert(row.clone());
        Ok(row)
    }

    async fn scan_prefix(
        &self,
        namespace: &str,
        prefix: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<EdgeRow>> {
        let tables = self.read();
        let rows = tables.prefix_range(namespace, prefix).cloned();
        Ok(match limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        })
    }

    async fn scan_distance(&self, query: &DistanceQuery) -> StoreResult<Vec<EdgeRow>> {
        let tables = self.read();
        let Some(entries) = tables.index.get(&query.base) else {
            return Ok(Vec::new());
        };
        let in_range = |entry: &&IndexEntry| query.range.contains(entry.0 .0);
        let ordered: Box<dyn Iterator<Item = &IndexEntry>> = if query.desc {
            Box::new(entries.iter().rev().filter(in_range))
        } else {
            Box::new(entries.iter().filter(in_range))
        };
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(ordered
            .filter_map(|(_, namespace, id)| {
                tables
                    .rows
                    .get(namespace)
                    .and_then(|partition| partition.get(id))
                    .cloned()
            })
            .take(limit)
            .collect())
    }

    async fn count_prefix(&self, namespace: &str, prefix: &str) -> StoreResult<usize> {
        Ok(self.read().prefix_range(namespace, prefix).count())
    }
}
