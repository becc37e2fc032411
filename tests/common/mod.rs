#![allow(dead_code)]

use async_trait::async_trait;
use prospect_sync::{
    CacheReconciler, EditSynchronizer, FieldPatch, PersistenceBackend, PersistenceMode, Prospect,
    ProspectFilter, ProspectId, QueryCache, Result, SyncConfig, SyncError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchOne(ProspectId),
    FetchMany,
    Create(FieldPatch),
    Update(ProspectId, FieldPatch),
    Delete(ProspectId),
}

/// In-memory backend that records every call.
#[derive(Default)]
pub struct RecordingBackend {
    records: Mutex<HashMap<ProspectId, Prospect>>,
    calls: Mutex<Vec<Call>>,
    fail_updates: AtomicBool,
    update_delay: Mutex<Option<Duration>>,
    active_updates: AtomicUsize,
    max_active_updates: AtomicUsize,
}

impl RecordingBackend {
    pub fn with_records(records: Vec<Prospect>) -> Arc<Self> {
        let backend = Self::default();
        {
            let mut stored = backend.records.lock().unwrap();
            for record in records {
                stored.insert(record.id.clone(), record);
            }
        }
        Arc::new(backend)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(ProspectId, FieldPatch)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update(id, patch) => Some((id, patch)),
                _ => None,
            })
            .collect()
    }

    pub fn record(&self, id: &str) -> Option<Prospect> {
        self.records.lock().unwrap().get(&ProspectId::new(id)).cloned()
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn delay_updates(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = Some(delay);
    }

    /// Highest number of updates that were running at the same time.
    pub fn max_concurrent_updates(&self) -> usize {
        self.max_active_updates.load(Ordering::SeqCst)
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PersistenceBackend for RecordingBackend {
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Remote
    }

    async fn fetch_one(&self, id: &ProspectId) -> Result<Prospect> {
        self.log(Call::FetchOne(id.clone()));
        self.records
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    async fn fetch_many(&self, filter: &ProspectFilter) -> Result<Vec<Prospect>> {
        self.log(Call::FetchMany);
        let mut records: Vec<Prospect> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|prospect| filter.matches_status(prospect))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(records)
    }

    async fn create(&self, payload: &FieldPatch) -> Result<Prospect> {
        self.log(Call::Create(payload.clone()));
        let id = ProspectId::new(format!("p{}", self.records.lock().unwrap().len() + 1));
        let created = Prospect::from_payload(id.clone(), payload)?;
        self.records.lock().unwrap().insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: &ProspectId, patch: &FieldPatch) -> Result<Prospect> {
        self.log(Call::Update(id.clone(), patch.clone()));

        let active = self.active_updates.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_updates.fetch_max(active, Ordering::SeqCst);
        let delay = *self.update_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active_updates.fetch_sub(1, Ordering::SeqCst);

        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(SyncError::Http {
                status: 503,
                message: "unavailable".to_string(),
            });
        }

        let mut records = self.records.lock().unwrap();
        let current = records
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        let updated = current.apply_patch(patch)?;
        records.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: &ProspectId) -> Result<()> {
        self.log(Call::Delete(id.clone()));
        self.records
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }
}

pub fn synchronizer(backend: Arc<RecordingBackend>, config: SyncConfig) -> EditSynchronizer {
    let reconciler = Arc::new(CacheReconciler::new(Arc::new(QueryCache::new())));
    EditSynchronizer::new(config, backend, reconciler)
}

/// Lets spawned flush tasks run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
