//! Persistence backends behind one interface.
//!
//! The synchronizer picks a backend once when it is composed; nothing
//! downstream branches on the operating mode.

pub mod local;
pub mod remote;

use crate::config::{PersistenceMode, SyncConfig};
use crate::core::{FieldPatch, ParentId, Prospect, ProspectId, Result, SyncError};
use crate::storage::{FileStore, LocalStore, MemoryStore, StorageNamespace};
use async_trait::async_trait;
use std::sync::Arc;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

/// Narrows `fetch_many` results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProspectFilter {
    /// Only prospects linked to this parent.
    pub parent: Option<ParentId>,
    pub status: Option<String>,
}

impl ProspectFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_group(parent: impl Into<ParentId>) -> Self {
        Self {
            parent: Some(parent.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn matches_status(&self, prospect: &Prospect) -> bool {
        self.status
            .as_deref()
            .is_none_or(|status| prospect.status == status)
    }
}

#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    fn mode(&self) -> PersistenceMode;

    async fn fetch_one(&self, id: &ProspectId) -> Result<Prospect>;

    async fn fetch_many(&self, filter: &ProspectFilter) -> Result<Vec<Prospect>>;

    /// Persists a new prospect; the backend assigns the id.
    async fn create(&self, payload: &FieldPatch) -> Result<Prospect>;

    /// Applies a partial update and returns the canonical record.
    async fn update(&self, id: &ProspectId, patch: &FieldPatch) -> Result<Prospect>;

    async fn delete(&self, id: &ProspectId) -> Result<()>;
}

/// Local persistence handles shared by the demo backend and the membership
/// index.
#[derive(Clone)]
pub struct LocalPersistence {
    pub store: Arc<dyn LocalStore>,
    pub namespace: StorageNamespace,
}

impl LocalPersistence {
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let store: Arc<dyn LocalStore> = match &config.data_dir {
            Some(dir) => Arc::new(FileStore::open(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self {
            store,
            namespace: StorageNamespace::new(config.user_id.clone()),
        })
    }
}

/// Builds the backend for `config.mode`, plus the local persistence handle in
/// demo mode.
pub fn backend_from_config(
    config: &SyncConfig,
) -> Result<(Arc<dyn PersistenceBackend>, Option<LocalPersistence>)> {
    config.validate()?;
    match config.mode {
        PersistenceMode::Demo => {
            let local = LocalPersistence::from_config(config)?;
            let backend = LocalBackend::new(local.clone(), &config.collection);
            Ok((Arc::new(backend), Some(local)))
        }
        PersistenceMode::Remote => {
            let base_url = config
                .api_base_url
                .as_deref()
                .ok_or_else(|| SyncError::config("remote mode requires an API base URL"))?;
            let backend = RemoteBackend::new(
                base_url,
                &config.collection,
                config.api_token.clone(),
                config.request_timeout,
            )?;
            Ok((Arc::new(backend), None))
        }
    }
}
