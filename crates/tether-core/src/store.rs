// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Backing-store contract for edge rows.
//!
//! [`EdgeStore`] is the only seam between the graph logic and persistence.
//! Implementations must provide per-row atomicity for [`EdgeStore::put`],
//! [`EdgeStore::delete`] and [`EdgeStore::update_distance`]; nothing here
//! assumes atomicity across rows.
//!
//! # Absence Semantics
//!
//! Missing rows are not errors: [`EdgeStore::get`] and [`EdgeStore::delete`]
//! return `None`. [`StoreError`] is reserved for the store itself failing.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GraphError;

/// Distance assumed for a row that has never been written.
pub const DEFAULT_DISTANCE: f64 = 1.0;

/// One persisted row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeRow {
    /// Partition key.
    pub namespace: String,
    /// Sort key (`from:entity:direction:to`).
    pub id: String,
    /// Distance-index partition key (`namespace:from:entity:direction`).
    pub base: String,
    /// Ranking score; smaller is closer.
    pub distance: f64,
    /// Milliseconds since the Unix epoch of the first write.
    pub created_at: u64,
    /// Milliseconds since the Unix epoch of the latest write.
    pub updated_at: u64,
    /// Optional expiry stamp (Unix seconds), enforced by the backing store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// Failures reported by a backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("[STORE_UNAVAILABLE] {0}")]
    Unavailable(String),
    /// The store shed load.
    #[error("[STORE_THROTTLED] {0}")]
    Throttled(String),
    /// The store refused the request.
    #[error("[STORE_REJECTED] {0}")]
    Rejected(String),
}

/// Result alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Inclusive distance bounds for an index scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceRange {
    /// Lower bound, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl DistanceRange {
    /// No bounds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// `distance >= min`.
    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    /// `distance <= max`.
    pub fn at_most(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    /// `min <= distance <= max`.
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Reads the list shape used by loosely typed callers: `[]`, `[min]` or
    /// `[min, max]`.
    pub fn from_bounds(bounds: &[f64]) -> Result<Self, GraphError> {
        let range = match bounds {
            [] => Self::unbounded(),
            [min] => Self::at_least(*min),
            [min, max] => Self::between(*min, *max),
            _ => {
                return Err(GraphError::configuration(format!(
                    "distance range takes at most two bounds, got {}",
                    bounds.len()
                )))
            }
        };
        range.checked()
    }

    /// Rejects NaN bounds and inverted ranges.
    pub fn checked(self) -> Result<Self, GraphError> {
        if self.min.is_some_and(f64::is_nan) || self.max.is_some_and(f64::is_nan) {
            return Err(GraphError::configuration("distance bound is NaN"));
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(GraphError::configuration(format!(
                    "distance range is inverted: {min} > {max}"
                )));
            }
        }
        Ok(self)
    }

    /// Returns `true` when `distance` lies within the bounds.
    pub fn contains(&self, distance: f64) -> bool {
        self.min.is_none_or(|min| distance >= min) && self.max.is_none_or(|max| distance <= max)
    }
}

/// A scan over the distance index.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceQuery {
    /// Index partition (see [`crate::codec::compose_base`]).
    pub base: String,
    /// Inclusive bounds.
    pub range: DistanceRange,
    /// Order by distance descending instead of ascending.
    pub desc: bool,
    /// Maximum number of rows returned.
    pub limit: Option<usize>,
}

/// How [`EdgeStore::update_distance`] combines the new value with the stored one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DistanceWrite {
    /// Replace the stored distance.
    Overwrite(f64),
    /// Add to the stored distance, treating a missing row as
    /// [`DEFAULT_DISTANCE`].
    Accumulate(f64),
}

impl DistanceWrite {
    /// Positive values overwrite; zero and negative values accumulate.
    pub fn from_signed(distance: f64) -> Self {
        if distance > 0.0 {
            Self::Overwrite(distance)
        } else {
            Self::Accumulate(distance)
        }
    }

    /// Resulting distance given the previously stored one.
    pub fn apply(self, previous: Option<f64>) -> f64 {
        match self {
            Self::Overwrite(distance) => distance,
            Self::Accumulate(delta) => previous.unwrap_or(DEFAULT_DISTANCE) + delta,
        }
    }
}

/// A conditional single-row upsert.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceUpdate {
    /// Partition key.
    pub namespace: String,
    /// Sort key.
    pub id: String,
    /// Index partition key written with the row.
    pub base: String,
    /// Overwrite or accumulate.
    pub write: DistanceWrite,
    /// Timestamp used for `updated_at` (and `created_at` on first write).
    pub now: u64,
    /// Expiry stamp to record, if any.
    pub ttl: Option<u64>,
}

/// Ordered key-value store holding edge rows.
#[async_trait]
pub trait EdgeStore: Send + Sync + 'static {
    /// Point read.
    async fn get(&self, namespace: &str, id: &str) -> StoreResult<Option<EdgeRow>>;

    /// Unconditional write of one row.
    async fn put(&self, row: EdgeRow) -> StoreResult<()>;

    /// Point delete. Returns the removed row, or `None` if it was absent.
    async fn delete(&self, namespace: &str, id: &str) -> StoreResult<Option<EdgeRow>>;

    /// Conditional update: overwrite or accumulate the distance, stamp
    /// `created_at` only if absent and `updated_at` always. Returns the row as
    /// stored after the update.
    async fn update_distance(&self, update: DistanceUpdate) -> StoreResult<EdgeRow>;

    /// Rows of `namespace` whose id starts with `prefix`, ordered by id.
    async fn scan_prefix(
        &self,
        namespace: &str,
        prefix: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<EdgeRow>>;

    /// Rows of one index partition ordered by distance.
    async fn scan_distance(&self, query: &DistanceQuery) -> StoreResult<Vec<EdgeRow>>;

    /// Number of rows [`EdgeStore::scan_prefix`] would return without a limit.
    async fn count_prefix(&self, namespace: &str, prefix: &str) -> StoreResult<usize>;
}

/// Milliseconds since the Unix epoch. Falls back to 0 on clock errors.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn positive_distance_overwrites() {
        assert_eq!(DistanceWrite::from_signed(5.0), DistanceWrite::Overwrite(5.0));
        assert!((DistanceWrite::from_signed(5.0).apply(Some(0.2)) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_positive_distance_accumulates_from_default() {
        assert_eq!(DistanceWrite::from_signed(0.0), DistanceWrite::Accumulate(0.0));
        let first = DistanceWrite::from_signed(-0.25).apply(None);
        assert!((first - 0.75).abs() < 1e-12);
        let second = DistanceWrite::from_signed(-0.25).apply(Some(first));
        assert!((second - 0.5).abs() < 1e-12);
    }

    #[test]
    fn range_shapes() {
        assert_eq!(DistanceRange::from_bounds(&[]), Ok(DistanceRange::unbounded()));
        assert_eq!(DistanceRange::from_bounds(&[0.5]), Ok(DistanceRange::at_least(0.5)));
        assert_eq!(
            DistanceRange::from_bounds(&[0.1, 0.9]),
            Ok(DistanceRange::between(0.1, 0.9))
        );
        assert!(DistanceRange::from_bounds(&[0.1, 0.2, 0.3]).is_err());
        assert!(DistanceRange::from_bounds(&[0.9, 0.1]).is_err());
        assert!(DistanceRange::from_bounds(&[f64::NAN]).is_err());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = DistanceRange::between(0.1, 0.9);
        assert!(range.contains(0.1));
        assert!(range.contains(0.9));
        assert!(!range.contains(0.95));
        assert!(DistanceRange::unbounded().contains(-4.0));
    }
}
