// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service and storage port for Tether tools.
//!
//! A [`ConfigStore`] moves raw bytes under a logical key; [`ConfigService`]
//! turns typed values into JSON and back. Adapters (filesystem, in-memory)
//! live in their own crates.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Byte storage for settings documents, one blob per key.
pub trait ConfigStore {
    /// Reads the blob stored under `key`; [`ConfigError::NotFound`] when absent.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Replaces the blob stored under `key`.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Failures while reading or writing settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Nothing is stored under the key.
    #[error("[CONFIG_NOT_FOUND]")]
    NotFound,
    /// Key is empty or holds characters other than ASCII alphanumerics, `-` and `_`.
    #[error("[CONFIG_KEY] invalid key `{0}`")]
    InvalidKey(String),
    /// The platform exposes no per-user config directory.
    #[error("[CONFIG_DIR] no config directory for this platform")]
    NoConfigDir,
    /// Reading or writing the backing medium failed.
    #[error("[CONFIG_IO] {0}")]
    Io(#[from] std::io::Error),
    /// The stored document is not valid JSON for the requested type.
    #[error("[CONFIG_JSON] {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejects keys that cannot double as a file stem.
pub fn check_key(key: &str) -> Result<(), ConfigError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidKey(key.to_owned()))
    }
}

/// Typed settings over a [`ConfigStore`], encoded as pretty JSON.
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Wraps `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Reads `key`. Missing and empty blobs are `Ok(None)`.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        check_key(key)?;
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Writes `value` under `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        check_key(key)?;
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Load `key`, persisting `T::default()` first when it is missing.
    pub fn load_or_init<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        if let Some(value) = self.load(key)? {
            return Ok(value);
        }
        let value = T::default();
        self.save(key, &value)?;
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct CellStore {
        data: RefCell<HashMap<String, Vec<u8>>>,
    }

    impl ConfigStore for CellStore {
        fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
            self.data.borrow().get(key).cloned().ok_or(ConfigError::NotFound)
        }

        fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
            self.data.borrow_mut().insert(key.to_owned(), data.to_vec());
            Ok(())
        }
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Knobs {
        level: u8,
    }

    #[test]
    fn missing_and_empty_blobs_load_as_none() {
        let svc = ConfigService::new(CellStore::default());
        assert_eq!(svc.load::<Knobs>("knobs").unwrap(), None);
        svc.store().save_raw("knobs", b"").unwrap();
        assert_eq!(svc.load::<Knobs>("knobs").unwrap(), None);
    }

    #[test]
    fn load_or_init_persists_defaults_once() {
        let svc = ConfigService::new(CellStore::default());
        assert_eq!(svc.load_or_init::<Knobs>("knobs").unwrap(), Knobs::default());
        assert!(svc.store().data.borrow().contains_key("knobs"));

        svc.save("knobs", &Knobs { level: 3 }).unwrap();
        assert_eq!(svc.load_or_init::<Knobs>("knobs").unwrap().level, 3);
    }

    #[test]
    fn path_like_keys_are_rejected() {
        let svc = ConfigService::new(CellStore::default());
        assert!(matches!(
            svc.save("../escape", &Knobs::default()),
            Err(ConfigError::InvalidKey(_))
        ));
        assert!(matches!(svc.load::<Knobs>(""), Err(ConfigError::InvalidKey(_))));
    }

    #[test]
    fn corrupt_blob_is_a_json_error() {
        let svc = ConfigService::new(CellStore::default());
        svc.store().save_raw("knobs", b"{ nope").unwrap();
        assert!(matches!(svc.load::<Knobs>("knobs"), Err(ConfigError::Json(_))));
    }
}
