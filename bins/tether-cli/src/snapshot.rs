// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON snapshots of the in-memory edge store.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tether_core::{EdgeRow, MemoryEdgeStore};
use tracing::debug;

/// Loads every row from `path`; a missing file is an empty store.
pub fn load(path: &Path) -> Result<MemoryEdgeStore> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no snapshot yet");
            return Ok(MemoryEdgeStore::new());
        }
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
    };
    let rows: Vec<EdgeRow> = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a store snapshot", path.display()))?;
    debug!(rows = rows.len(), "snapshot loaded");
    Ok(MemoryEdgeStore::from_rows(rows))
}

/// Writes every row of `store` to `path`, replacing it.
pub fn save(path: &Path, store: &MemoryEdgeStore) -> Result<()> {
    let rows = store.snapshot();
    let data = serde_json::to_vec_pretty(&rows)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    debug!(rows = rows.len(), "snapshot saved");
    Ok(())
}
