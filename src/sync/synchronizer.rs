//! Edit surface controller: debounced field edits, selection switching and
//! flush outcomes.

use super::dispatcher::PersistenceDispatcher;
use super::events::{EventBus, SyncEvent};
use super::session::{EditSession, PendingFlush};
use super::shape::ShapeEditor;
use crate::backend::{PersistenceBackend, backend_from_config};
use crate::cache::{CacheKey, CacheReconciler, QueryCache};
use crate::config::{SwitchPolicy, SyncConfig};
use crate::core::{
    FieldPatch, ParentId, Prospect, ProspectId, Result, SyncError, derive_follow_up_date,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// How `queue_update` schedules the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    /// Coalesce into the pending patch and (re)start the idle timer.
    #[default]
    Debounced,
    /// Flush now, e.g. when the field loses focus.
    Immediate,
}

struct Inner {
    config: SyncConfig,
    dispatcher: Arc<PersistenceDispatcher>,
    session: Arc<Mutex<EditSession>>,
    events: EventBus,
    shapes: ShapeEditor,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// Owns one edit surface.
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct EditSynchronizer {
    inner: Arc<Inner>,
}

impl EditSynchronizer {
    pub fn new(
        config: SyncConfig,
        backend: Arc<dyn PersistenceBackend>,
        reconciler: Arc<CacheReconciler>,
    ) -> Self {
        let dispatcher = Arc::new(PersistenceDispatcher::new(backend, reconciler));
        let events = EventBus::new(config.event_capacity);
        let session = Arc::new(Mutex::new(EditSession::new()));

        let view = Arc::clone(&session);
        let shapes = ShapeEditor::with_hook(
            Arc::clone(&dispatcher),
            config.geometry_debounce,
            events.clone(),
            Arc::new(move |saved: &Prospect| {
                if let Ok(mut session) = view.lock() {
                    if let Err(err) = session.complete_success(saved) {
                        warn!(prospect_id = %saved.id, error = %err, "could not refresh view after shape save");
                    }
                }
            }),
        );

        Self {
            inner: Arc::new(Inner {
                config,
                dispatcher,
                session,
                events,
                shapes,
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Composes the backend, caches and membership index described by
    /// `config`.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        let (backend, local) = backend_from_config(&config)?;
        let cache = Arc::new(QueryCache::new());
        let reconciler = match local {
            Some(local) => CacheReconciler::with_local(cache, local)?,
            None => CacheReconciler::new(cache),
        };
        info!(mode = ?config.mode, collection = %config.collection, "synchronizer ready");
        Ok(Self::new(config, backend, Arc::new(reconciler)))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn shapes(&self) -> &ShapeEditor {
        &self.inner.shapes
    }

    pub fn dispatcher(&self) -> &Arc<PersistenceDispatcher> {
        &self.inner.dispatcher
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        self.inner.dispatcher.cache()
    }

    /// Optimistic view of the selected prospect.
    pub fn selected(&self) -> Result<Option<Prospect>> {
        self.with_session(|session| Ok(session.selected().cloned()))
    }

    /// Fields queued but not yet flushed.
    pub fn pending(&self) -> Result<FieldPatch> {
        self.with_session(|session| Ok(session.pending().clone()))
    }

    /// Makes `prospect` the edit target.
    ///
    /// A patch still pending for another prospect is flushed in the
    /// background or dropped, depending on the switch policy. It is never
    /// merged into the new selection.
    pub fn select(&self, prospect: Prospect) -> Result<()> {
        let previous = self.with_session(|session| session.select(prospect))?;
        if let Some(previous) = previous {
            match self.inner.config.switch_policy {
                SwitchPolicy::Flush => self.spawn_background(previous),
                SwitchPolicy::Discard => {
                    debug!(prospect_id = %previous.id, fields = ?previous.patch.field_names(), "dropped pending patch on switch");
                }
            }
        }
        Ok(())
    }

    /// Selects by id, reading through the cache.
    pub async fn select_by_id(&self, id: &ProspectId) -> Result<Prospect> {
        let prospect = self.inner.dispatcher.fetch(id).await?;
        self.select(prospect)?;
        self.selected()?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    /// Applies one field edit to the selected prospect.
    ///
    /// The view reflects the value at once. Debounced edits return
    /// `Ok(None)`; immediate edits return the flushed record.
    pub async fn queue_update(
        &self,
        field: &str,
        value: Value,
        mode: QueueMode,
    ) -> Result<Option<Prospect>> {
        self.queue_patch(FieldPatch::new().with(field, value), mode)
            .await
    }

    /// Like `queue_update` for several fields at once.
    ///
    /// A `followUpTimeframe` edit brings its derived `followUpDate` along.
    pub async fn queue_patch(
        &self,
        mut edits: FieldPatch,
        mode: QueueMode,
    ) -> Result<Option<Prospect>> {
        derive_follow_up_date(&mut edits, Utc::now());
        match mode {
            QueueMode::Debounced => {
                self.record_and_arm(&edits)?;
                Ok(None)
            }
            QueueMode::Immediate => {
                let pending = self.with_session(|session| {
                    session.record(&edits)?;
                    Ok(session.take_pending())
                })?;
                self.flush_pending(pending).await
            }
        }
    }

    /// Flushes whatever is pending now; `Ok(None)` when nothing is.
    pub async fn flush(&self) -> Result<Option<Prospect>> {
        let pending = self.with_session(|session| Ok(session.take_pending()))?;
        self.flush_pending(pending).await
    }

    /// Closes the edit surface, flushing the pending patch first.
    pub async fn close(&self) -> Result<Option<Prospect>> {
        let pending = self.with_session(|session| Ok(session.clear()))?;
        self.flush_pending(pending).await
    }

    /// Drops the pending patch and restores the edited fields in the view.
    pub fn discard(&self) -> Result<Vec<String>> {
        self.with_session(|session| session.discard_pending())
    }

    pub async fn create(&self, payload: FieldPatch, groups: Vec<ParentId>) -> Result<Prospect> {
        let mut payload = payload;
        derive_follow_up_date(&mut payload, Utc::now());
        let created = self.inner.dispatcher.create(&payload, groups).await?;
        self.inner.events.publish(SyncEvent::Created {
            id: created.id.clone(),
        });
        info!(prospect_id = %created.id, "prospect created");
        Ok(created)
    }

    /// Deletes the prospect; a pending patch for it is dropped first.
    pub async fn delete(&self, id: &ProspectId) -> Result<()> {
        self.with_session(|session| {
            if session.edited_id() == Some(id) {
                session.discard_pending()?;
            }
            if session.is_selected(id) {
                session.clear();
            }
            Ok(())
        })?;

        self.inner.dispatcher.delete(id).await?;
        self.inner.events.publish(SyncEvent::Deleted { id: id.clone() });
        info!(prospect_id = %id, "prospect deleted");
        Ok(())
    }

    pub async fn load(&self, key: CacheKey) -> Result<Arc<Vec<Prospect>>> {
        self.inner.dispatcher.load(key).await
    }

    pub fn link(&self, parent: ParentId, prospect: Prospect) -> Result<()> {
        self.inner.dispatcher.link(parent, prospect)
    }

    pub fn unlink(&self, parent: ParentId, id: ProspectId) -> Result<()> {
        self.inner.dispatcher.unlink(parent, id)
    }

    /// Waits for flushes started in the background by selection switches.
    pub async fn wait_idle(&self) {
        loop {
            let handles = match self.inner.background.lock() {
                Ok(mut background) => std::mem::take(&mut *background),
                Err(_) => return,
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    /// Flushes the pending patch and waits for background work.
    pub async fn shutdown(&self) -> Result<()> {
        let result = self.close().await;
        self.wait_idle().await;
        result.map(|_| ())
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut EditSession) -> Result<R>) -> Result<R> {
        let mut session = self.inner.session.lock()?;
        f(&mut session)
    }

    fn record_and_arm(&self, edits: &FieldPatch) -> Result<()> {
        let mut session = self.inner.session.lock()?;
        session.record(edits)?;

        let generation = session.arm();
        let delay = self.inner.config.field_debounce;
        let weak = Arc::downgrade(&self.inner);
        session.set_timer(tokio::spawn(async move {
            sleep(delay).await;
            Self::fire(weak, generation).await;
        }));
        Ok(())
    }

    async fn fire(inner: Weak<Inner>, generation: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let sync = Self { inner };

        let pending = {
            let Ok(mut session) = sync.inner.session.lock() else {
                return;
            };
            if session.generation() != generation {
                return;
            }
            // Detach first so taking the patch does not abort this task.
            session.release_timer();
            session.take_pending()
        };

        // Failures are logged and broadcast by `run_flush`.
        let _ = sync.flush_pending(pending).await;
    }

    async fn flush_pending(&self, pending: Option<PendingFlush>) -> Result<Option<Prospect>> {
        match pending {
            Some(pending) => self.run_flush(pending).await,
            None => Ok(None),
        }
    }

    async fn run_flush(&self, pending: PendingFlush) -> Result<Option<Prospect>> {
        let fields = pending.patch.field_names();
        let result = self
            .inner
            .dispatcher
            .flush(&pending.id, pending.patch.clone())
            .await;

        match result {
            Ok(Some(canonical)) => {
                self.with_session(|session| session.complete_success(&canonical))?;
                self.inner.events.publish(SyncEvent::FlushSucceeded {
                    id: pending.id.clone(),
                    fields,
                });
                Ok(Some(canonical))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                let rolled_back = self.with_session(|session| session.complete_failure(&pending))?;
                self.inner.events.publish(SyncEvent::FlushFailed {
                    id: pending.id.clone(),
                    message: err.to_string(),
                    rolled_back,
                });
                Err(err)
            }
        }
    }

    fn spawn_background(&self, pending: PendingFlush) {
        let sync = self.clone();
        let handle = tokio::spawn(async move {
            let _ = sync.run_flush(pending).await;
        });
        if let Ok(mut background) = self.inner.background.lock() {
            background.retain(|handle| !handle.is_finished());
            background.push(handle);
        }
    }
}
