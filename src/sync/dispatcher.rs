use crate::backend::{PersistenceBackend, ProspectFilter};
use crate::cache::{CacheEvent, CacheKey, CacheReconciler, QueryCache};
use crate::config::PersistenceMode;
use crate::core::{FieldPatch, ParentId, Prospect, ProspectId, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Routes writes to the configured backend and reconciles caches with the
/// canonical result.
///
/// Writes for one prospect run one at a time; writes for different
/// prospects may overlap.
pub struct PersistenceDispatcher {
    backend: Arc<dyn PersistenceBackend>,
    reconciler: Arc<CacheReconciler>,
    id_locks: Mutex<HashMap<ProspectId, Arc<AsyncMutex<()>>>>,
}

impl PersistenceDispatcher {
    pub fn new(backend: Arc<dyn PersistenceBackend>, reconciler: Arc<CacheReconciler>) -> Self {
        Self {
            backend,
            reconciler,
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> PersistenceMode {
        self.backend.mode()
    }

    pub fn backend(&self) -> &Arc<dyn PersistenceBackend> {
        &self.backend
    }

    pub fn reconciler(&self) -> &Arc<CacheReconciler> {
        &self.reconciler
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        self.reconciler.cache()
    }

    /// Persists `patch` for `id`.
    ///
    /// An empty patch is a no-op and returns `Ok(None)`. Caches are only
    /// touched once the backend has returned the canonical record.
    pub async fn flush(&self, id: &ProspectId, patch: FieldPatch) -> Result<Option<Prospect>> {
        if patch.is_empty() {
            return Ok(None);
        }

        // Reconcile under the id lock so caches see writes in backend order.
        let lock = self.lock_for(id)?;
        let result = {
            let _serial = lock.lock().await;
            match self.backend.update(id, &patch).await {
                Ok(canonical) => self
                    .reconciler
                    .apply(CacheEvent::Updated(canonical.clone()))
                    .map(|()| canonical),
                Err(err) => Err(err),
            }
        };
        drop(lock);
        self.release(id);

        match result {
            Ok(canonical) => {
                debug!(prospect_id = %id, fields = ?patch.field_names(), "flush persisted");
                Ok(Some(canonical))
            }
            Err(err) => {
                warn!(prospect_id = %id, fields = ?patch.field_names(), error = %err, "flush failed");
                Err(err)
            }
        }
    }

    pub async fn create(&self, payload: &FieldPatch, groups: Vec<ParentId>) -> Result<Prospect> {
        let created = self.backend.create(payload).await?;
        self.reconciler.apply(CacheEvent::Created {
            prospect: created.clone(),
            groups,
        })?;
        Ok(created)
    }

    pub async fn delete(&self, id: &ProspectId) -> Result<()> {
        let lock = self.lock_for(id)?;
        let result = {
            let _serial = lock.lock().await;
            match self.backend.delete(id).await {
                Ok(()) => self.reconciler.apply(CacheEvent::Deleted(id.clone())),
                Err(err) => Err(err),
            }
        };
        drop(lock);
        self.release(id);
        result
    }

    /// Adds an existing prospect to a group view and its membership.
    pub fn link(&self, parent: ParentId, prospect: Prospect) -> Result<()> {
        self.reconciler.apply(CacheEvent::Linked { parent, prospect })
    }

    pub fn unlink(&self, parent: ParentId, id: ProspectId) -> Result<()> {
        self.reconciler.apply(CacheEvent::Unlinked { parent, id })
    }

    /// Fetches the list behind `key` and installs it in the cache.
    pub async fn load(&self, key: CacheKey) -> Result<Arc<Vec<Prospect>>> {
        let filter = match &key {
            CacheKey::All => ProspectFilter::all(),
            CacheKey::Group(parent) => ProspectFilter::in_group(parent.clone()),
        };
        let prospects = self.backend.fetch_many(&filter).await?;
        self.reconciler.hydrate(key, prospects)
    }

    /// Cached copy if there is one, otherwise a backend read.
    pub async fn fetch(&self, id: &ProspectId) -> Result<Prospect> {
        if let Some(cached) = self.cache().find(id)? {
            return Ok(cached);
        }
        self.backend.fetch_one(id).await
    }

    /// Number of prospects with a write queued or running.
    pub fn in_flight(&self) -> usize {
        self.id_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    fn lock_for(&self, id: &ProspectId) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self.id_locks.lock()?;
        Ok(locks.entry(id.clone()).or_default().clone())
    }

    fn release(&self, id: &ProspectId) {
        let Ok(mut locks) = self.id_locks.lock() else {
            return;
        };
        if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(id);
        }
    }
}
