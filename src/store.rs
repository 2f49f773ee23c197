// SPDX-License-Identifier: GPL-3.0-only

//! Persisted key/value state shared between the capture side and the studio
//!
//! Values are JSON encoded. The desktop build keeps them in a cosmic-config
//! entry next to the settings; tests and headless runs use [`MemoryStore`].

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cosmic_config::{Config, ConfigGet, ConfigSet};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::settings::APP_ID;

pub mod keys {
    /// Last capture, as a PNG data URL
    pub const CAPTURED_IMAGE: &str = "capturedImage";
    /// Last recording, as a URL the studio can load
    pub const CAPTURED_VIDEO: &str = "capturedVideo";
    pub const IS_RECORDING: &str = "isRecording";
    pub const CURRENT_TOOL: &str = "currentTool";
    pub const CURRENT_COLOR: &str = "currentColor";
}

pub trait StateStore: Send + Sync {
    /// Raw JSON stored under `key`
    ///
    /// # Errors
    /// Returns `StoreError::Config` if the backend could not be read
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// # Errors
    /// Returns `StoreError::Config` if the backend could not be written
    fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// # Errors
    /// Returns `StoreError::Config` if the backend could not be written
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed access on top of any [`StateStore`], trait objects included
pub trait StateStoreExt: StateStore {
    /// # Errors
    /// Returns `StoreError::Malformed` if the stored JSON does not fit `T`
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get_raw(key)?
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// # Errors
    /// Returns `StoreError::Malformed` if `value` cannot be encoded
    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, raw)
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self
            .values
            .lock()
            .map_err(|_| StoreError::Config("state lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.values
            .lock()
            .map_err(|_| StoreError::Config("state lock poisoned".to_string()))?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .map_err(|_| StoreError::Config("state lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}

/// State persisted through cosmic-config. A removed key is stored as `None`.
pub struct ConfigStore {
    config: Config,
}

impl ConfigStore {
    pub const VERSION: u64 = 1;

    /// # Errors
    /// Returns `StoreError::Config` if the config directory is unusable
    pub fn new() -> Result<Self, StoreError> {
        let config = Config::new(&format!("{APP_ID}.State"), Self::VERSION)
            .map_err(|err| StoreError::Config(err.to_string()))?;
        Ok(Self { config })
    }
}

impl StateStore for ConfigStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.config.get::<Option<String>>(key) {
            Ok(value) => Ok(value),
            Err(cosmic_config::Error::GetKey(_, err)) if err.kind() == io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(err) => Err(StoreError::Config(err.to_string())),
        }
    }

    fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.config
            .set(key, Some(value))
            .map_err(|err| StoreError::Config(err.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.config
            .set::<Option<String>>(key, None)
            .map_err(|err| StoreError::Config(err.to_string()))
    }
}

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Wrap PNG bytes in a `data:` URL
#[must_use]
pub fn encode_data_url(png: &[u8]) -> String {
    format!("{PNG_DATA_URL_PREFIX}{}", STANDARD.encode(png))
}

/// Payload bytes of a base64 image data URL
///
/// # Errors
/// * `StoreError::NotDataUrl` if `url` is not a base64 `data:image/...` URL
/// * `StoreError::Base64` if the payload does not decode
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, StoreError> {
    let not_data_url = || {
        let preview: String = url.chars().take(32).collect();
        StoreError::NotDataUrl(preview)
    };
    let rest = url.strip_prefix("data:image/").ok_or_else(not_data_url)?;
    let (_, payload) = rest.split_once(";base64,").ok_or_else(not_data_url)?;
    Ok(STANDARD.decode(payload.trim())?)
}
