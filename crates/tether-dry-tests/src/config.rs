// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store fake for testing without filesystem I/O.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use tether_config::{ConfigError, ConfigStore};

/// In-memory implementation of [`ConfigStore`] for testing.
///
/// Clones share state, so a test can hand one clone to a
/// [`ConfigService`](tether_config::ConfigService) and inspect the other.
///
/// # Example
///
/// ```
/// use tether_dry_tests::InMemoryConfigStore;
/// use tether_config::ConfigService;
/// use tether_core::GraphSettings;
///
/// let store = InMemoryConfigStore::new();
/// let service = ConfigService::new(store.clone());
///
/// let settings: GraphSettings = service.load_or_init(GraphSettings::CONFIG_KEY).unwrap();
/// assert_eq!(settings, GraphSettings::default());
/// assert_eq!(store.load_count(), 1);
/// assert_eq!(store.save_count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<InMemoryConfigStoreInner>>,
}

#[derive(Default)]
struct InMemoryConfigStoreInner {
    data: HashMap<String, Vec<u8>>,
    load_count: usize,
    save_count: usize,
    fail_on_load: bool,
    fail_on_save: bool,
}

impl InMemoryConfigStore {
    /// Create a new empty in-memory config store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `value` serialized under `key`.
    pub fn with_json(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .data
            .insert(key.to_owned(), value.as_bytes().to_vec());
        store
    }

    /// Configure the store to fail on load operations.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).fail_on_load = fail;
    }

    /// Configure the store to fail on save operations.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).fail_on_save = fail;
    }

    /// Number of `load_raw` attempts, failed ones included.
    pub fn load_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).load_count
    }

    /// Number of `save_raw` attempts, failed ones included.
    pub fn save_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).save_count
    }

    /// Raw bytes stored under `key`.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .data
            .get(key)
            .cloned()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.load_count += 1;

        if inner.fail_on_load {
            return Err(io::Error::other("simulated load failure").into());
        }

        inner.data.get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.save_count += 1;

        if inner.fail_on_save {
            return Err(io::Error::other("simulated save failure").into());
        }

        inner.data.insert(key.to_string(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tether_config::ConfigService;
    use tether_core::GraphSettings;

    #[test]
    fn stored_settings_override_defaults() {
        let store = InMemoryConfigStore::with_json("graph", r#"{ "default_entity": "likes" }"#);
        let service = ConfigService::new(store.clone());
        let settings: GraphSettings = service.load_or_init("graph").unwrap();
        assert_eq!(settings.default_entity, "likes");
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn fail_flags_surface_as_io_errors() {
        let store = InMemoryConfigStore::new();
        store.set_fail_on_save(true);
        assert!(matches!(store.save_raw("k", b"{}"), Err(ConfigError::Io(_))));
        store.set_fail_on_load(true);
        assert!(matches!(store.load_raw("k"), Err(ConfigError::Io(_))));
        assert_eq!(store.raw("k"), None);
        assert_eq!((store.load_count(), store.save_count()), (1, 1));
    }
}
