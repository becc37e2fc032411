//! Local key-value persistence used in demo mode.
//!
//! Keys are namespaced per user so two brokers sharing a device do not see
//! each other's demo data; without a user the device-wide namespace is used.

pub mod file;
pub mod memory;

use crate::core::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use file::FileStore;
pub use memory::MemoryStore;

pub const DEVICE_NAMESPACE: &str = "device";

/// Raw string storage keyed by already-namespaced keys.
pub trait LocalStore: Send + Sync {
    fn read_raw(&self, key: &str) -> Result<Option<String>>;
    fn write_raw(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Resolves logical keys to per-user storage keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageNamespace {
    user_id: Option<String>,
}

impl StorageNamespace {
    pub fn new(user_id: Option<String>) -> Self {
        let user_id = user_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        Self { user_id }
    }

    pub fn device() -> Self {
        Self { user_id: None }
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self::new(Some(user_id.into()))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// `base:user:{id}` or `base:device`; a user named `device` stays apart
    /// from the device-wide namespace.
    pub fn key(&self, base: &str) -> String {
        match &self.user_id {
            Some(user_id) => format!("{}:user:{}", base, user_id),
            None => format!("{}:{}", base, DEVICE_NAMESPACE),
        }
    }
}

/// Reads and decodes a JSON value, returning `default` when the key is unset.
pub fn read_local<T: DeserializeOwned>(store: &dyn LocalStore, key: &str, default: T) -> Result<T> {
    match store.read_raw(key)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(default),
    }
}

pub fn write_local<T: Serialize + ?Sized>(store: &dyn LocalStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.write_raw(key, &raw)
}
