//! Save path for polygon vertex edits.
//!
//! A prospect is either idle or being shape-edited. While editing, every
//! vertex insert, move or removal re-arms a debounce timer; when it fires the
//! ring and its derived acreage are flushed through the dispatcher. Only one
//! prospect can be in the editing phase: beginning another edit saves the
//! current one first.

use super::dispatcher::PersistenceDispatcher;
use super::events::{EventBus, SyncEvent};
use crate::core::{
    Coordinate, FieldPatch, Geometry, Prospect, ProspectId, Result, SyncError, close_ring, fields,
    ring_acres,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Callback run with each canonical record a shape save returns.
pub type SavedHook = Arc<dyn Fn(&Prospect) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum ShapePhase {
    Idle,
    Editing { id: ProspectId },
}

/// How an editing phase ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeOutcome {
    /// Final ring persisted; `None` when there was nothing left to write.
    Saved(Option<Prospect>),
    /// Ring restored from the snapshot taken when editing began.
    Discarded(Vec<Coordinate>),
}

#[derive(Debug)]
struct ActiveShapeEdit {
    id: ProspectId,
    snapshot: Vec<Coordinate>,
    current: Vec<Coordinate>,
    /// Current ring differs from what was last persisted.
    dirty: bool,
    /// A debounced save already wrote a ring other than the snapshot.
    persisted_change: bool,
    /// Debounced saves handed to the dispatcher and not yet answered.
    in_flight: usize,
}

#[derive(Debug, Default)]
struct ShapeState {
    active: Option<ActiveShapeEdit>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl ShapeState {
    fn cancel_timer(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct ShapeInner {
    dispatcher: Arc<PersistenceDispatcher>,
    delay: Duration,
    events: EventBus,
    state: Mutex<ShapeState>,
    on_saved: Option<SavedHook>,
}

#[derive(Clone)]
pub struct ShapeEditor {
    inner: Arc<ShapeInner>,
}

/// `{geometry, acres}` for a ring; `acres` is left out when the ring has no
/// meaningful area.
pub fn geometry_patch(ring: &[Coordinate]) -> Result<FieldPatch> {
    let geometry = Geometry::polygon(ring.to_vec());
    let mut patch = FieldPatch::new().with(fields::GEOMETRY, serde_json::to_value(&geometry)?);
    if let Some(acres) = ring_acres(ring) {
        patch.set(fields::ACRES, Value::from(acres));
    }
    Ok(patch)
}

impl ShapeEditor {
    pub fn new(dispatcher: Arc<PersistenceDispatcher>, delay: Duration, events: EventBus) -> Self {
        Self::build(dispatcher, delay, events, None)
    }

    /// `on_saved` sees every canonical record a shape save produced.
    pub fn with_hook(
        dispatcher: Arc<PersistenceDispatcher>,
        delay: Duration,
        events: EventBus,
        on_saved: SavedHook,
    ) -> Self {
        Self::build(dispatcher, delay, events, Some(on_saved))
    }

    fn build(
        dispatcher: Arc<PersistenceDispatcher>,
        delay: Duration,
        events: EventBus,
        on_saved: Option<SavedHook>,
    ) -> Self {
        Self {
            inner: Arc::new(ShapeInner {
                dispatcher,
                delay,
                events,
                state: Mutex::new(ShapeState::default()),
                on_saved,
            }),
        }
    }

    pub fn phase(&self) -> Result<ShapePhase> {
        let state = self.inner.state.lock()?;
        Ok(match &state.active {
            Some(active) => ShapePhase::Editing {
                id: active.id.clone(),
            },
            None => ShapePhase::Idle,
        })
    }

    /// Current (possibly unsaved) ring of the prospect being edited.
    pub fn current_ring(&self) -> Result<Option<Vec<Coordinate>>> {
        let state = self.inner.state.lock()?;
        Ok(state.active.as_ref().map(|active| active.current.clone()))
    }

    /// Enters the editing phase for `id`, snapshotting `ring`.
    ///
    /// If another prospect is mid-edit it is saved first and its outcome is
    /// returned.
    pub async fn begin(&self, id: ProspectId, ring: Vec<Coordinate>) -> Result<Option<ShapeOutcome>> {
        let editing_other = {
            let state = self.inner.state.lock()?;
            match &state.active {
                Some(active) if active.id == id => return Ok(None),
                Some(_) => true,
                None => false,
            }
        };

        let previous = if editing_other {
            Some(self.save().await?)
        } else {
            None
        };

        let ring = close_ring(ring);
        let mut state = self.inner.state.lock()?;
        state.cancel_timer();
        state.active = Some(ActiveShapeEdit {
            id: id.clone(),
            snapshot: ring.clone(),
            current: ring,
            dirty: false,
            persisted_change: false,
            in_flight: 0,
        });
        debug!(prospect_id = %id, "shape edit started");
        Ok(previous)
    }

    /// Records the ring after a vertex insert, move or removal and re-arms
    /// the debounced save.
    pub fn vertices_changed(&self, ring: Vec<Coordinate>) -> Result<()> {
        let mut state = self.inner.state.lock()?;
        let Some(active) = state.active.as_mut() else {
            return Err(SyncError::InvalidGeometry(
                "no prospect is being shape-edited".to_string(),
            ));
        };
        active.current = close_ring(ring);
        active.dirty = true;

        state.cancel_timer();
        let generation = state.generation;
        let editor = self.clone();
        let delay = self.inner.delay;
        state.timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            editor.fire(generation).await;
        }));
        Ok(())
    }

    /// Leaves the editing phase, persisting the current ring if it changed.
    ///
    /// A debounced save still running is not trusted to land: the current
    /// ring is written again behind it.
    pub async fn save(&self) -> Result<ShapeOutcome> {
        let finished = {
            let mut state = self.inner.state.lock()?;
            state.cancel_timer();
            state.active.take()
        };

        let Some(finished) = finished else {
            return Ok(ShapeOutcome::Saved(None));
        };
        if !finished.dirty && finished.in_flight == 0 {
            return Ok(ShapeOutcome::Saved(None));
        }

        let saved = self.persist(&finished.id, &finished.current).await?;
        Ok(ShapeOutcome::Saved(saved))
    }

    /// Leaves the editing phase and restores the snapshot ring.
    ///
    /// If a debounced save already wrote an edited ring, or is still writing
    /// one, the snapshot is written back so the stored shape matches what the
    /// map shows. Writes for one id are serialized, so the snapshot lands last.
    pub async fn discard(&self) -> Result<ShapeOutcome> {
        let finished = {
            let mut state = self.inner.state.lock()?;
            state.cancel_timer();
            state.active.take()
        };

        let Some(finished) = finished else {
            return Ok(ShapeOutcome::Discarded(Vec::new()));
        };
        if finished.persisted_change || finished.in_flight > 0 {
            self.persist(&finished.id, &finished.snapshot).await?;
        }
        debug!(prospect_id = %finished.id, "shape edit discarded");
        Ok(ShapeOutcome::Discarded(finished.snapshot))
    }

    async fn fire(&self, generation: u64) {
        let target = {
            let Ok(mut state) = self.inner.state.lock() else {
                return;
            };
            if state.generation != generation {
                return;
            }
            state.timer = None;
            match state.active.as_mut() {
                Some(active) if active.dirty => {
                    active.dirty = false;
                    active.in_flight += 1;
                    Some((active.id.clone(), active.current.clone()))
                }
                _ => None,
            }
        };

        let Some((id, ring)) = target else {
            return;
        };

        let result = self.persist(&id, &ring).await;

        // After save or discard took the edit, they own the final write.
        if let Ok(mut state) = self.inner.state.lock() {
            if let Some(active) = state.active.as_mut().filter(|active| active.id == id) {
                active.in_flight = active.in_flight.saturating_sub(1);
                match &result {
                    Ok(_) => active.persisted_change = ring != active.snapshot,
                    // Dirty again so the final save retries it.
                    Err(_) => active.dirty = true,
                }
            }
        }
        if let Err(err) = result {
            warn!(prospect_id = %id, error = %err, "debounced shape save failed");
        }
    }

    async fn persist(&self, id: &ProspectId, ring: &[Coordinate]) -> Result<Option<Prospect>> {
        let patch = geometry_patch(ring)?;
        let acres = patch.get(fields::ACRES).and_then(Value::as_f64);

        match self.inner.dispatcher.flush(id, patch).await {
            Ok(saved) => {
                if let Some(prospect) = &saved {
                    if let Some(hook) = &self.inner.on_saved {
                        hook(prospect);
                    }
                }
                self.inner.events.publish(SyncEvent::ShapeSaved {
                    id: id.clone(),
                    acres,
                });
                Ok(saved)
            }
            Err(err) => {
                self.inner.events.publish(SyncEvent::FlushFailed {
                    id: id.clone(),
                    message: err.to_string(),
                    rolled_back: Vec::new(),
                });
                Err(err)
            }
        }
    }
}
