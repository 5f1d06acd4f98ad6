// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tunables shared by the link writer, traversal and coalescing pipeline.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Fraction of the supplied distance subtracted per ordinary link.
pub const DEFAULT_DECREMENT_PATH: f64 = 1e-15;

/// Entity used when a caller does not name one.
pub const DEFAULT_ENTITY: &str = "default";

/// Graph-wide settings, loadable through `tether-config` under [`GraphSettings::CONFIG_KEY`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Decay step used by `link` when the request does not carry one.
    pub decrement_path: f64,
    /// Entity supplied by the partition façade when a request omits it.
    pub default_entity: String,
    /// Fan-out bound for multi-edge writes and bulk deletes.
    pub write_concurrency: usize,
    /// Fan-out bound for flushing coalesced writes.
    pub flush_concurrency: usize,
    /// Fan-out bound for traversal hops; `None` is unbounded.
    pub traversal_concurrency: Option<usize>,
    /// Lifetime stamped on written rows, in seconds.
    pub ttl_seconds: Option<u64>,
}

impl GraphSettings {
    /// Key under which the settings are persisted.
    pub const CONFIG_KEY: &'static str = "graph";

    /// Checks the numeric fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.decrement_path.is_finite() || self.decrement_path < 0.0 {
            return Err(ValidationError::new(
                "decrement_path",
                "must be a finite, non-negative number",
            ));
        }
        if self.write_concurrency == 0 {
            return Err(ValidationError::new("write_concurrency", "must be at least 1"));
        }
        if self.flush_concurrency == 0 {
            return Err(ValidationError::new("flush_concurrency", "must be at least 1"));
        }
        if self.traversal_concurrency == Some(0) {
            return Err(ValidationError::new(
                "traversal_concurrency",
                "must be at least 1 when set",
            ));
        }
        crate::request::check_key_field("default_entity", &self.default_entity)
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            decrement_path: DEFAULT_DECREMENT_PATH,
            default_entity: DEFAULT_ENTITY.to_owned(),
            write_concurrency: 16,
            flush_concurrency: 16,
            traversal_concurrency: None,
            ttl_seconds: None,
        }
    }
}
