//! Selection, pending patch and optimistic view for one edit surface.
//!
//! The session is plain state. The synchronizer owns it behind a mutex and
//! never holds that mutex across an await.

use crate::core::{FieldPatch, Prospect, ProspectId, Result, SyncError};
use tokio::task::JoinHandle;

/// A patch taken out of the session, ready to flush.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFlush {
    pub id: ProspectId,
    pub patch: FieldPatch,
    /// Values the view showed before the patched fields were first edited.
    pub baseline: FieldPatch,
}

#[derive(Debug, Default)]
pub struct EditSession {
    /// Optimistic view of the selected prospect.
    selected: Option<Prospect>,
    /// Prospect the pending patch belongs to.
    edited_id: Option<ProspectId>,
    pending: FieldPatch,
    baseline: FieldPatch,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&Prospect> {
        self.selected.as_ref()
    }

    pub fn selected_id(&self) -> Option<&ProspectId> {
        self.selected.as_ref().map(|prospect| &prospect.id)
    }

    pub fn edited_id(&self) -> Option<&ProspectId> {
        self.edited_id.as_ref()
    }

    pub fn pending(&self) -> &FieldPatch {
        &self.pending
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_selected(&self, id: &ProspectId) -> bool {
        self.selected_id() == Some(id)
    }

    /// Makes `prospect` the edit target.
    ///
    /// Reselecting the prospect that owns the pending patch keeps the patch
    /// and lays it over the new view. Otherwise the previous patch is taken
    /// out and returned for the caller to flush or drop.
    pub fn select(&mut self, prospect: Prospect) -> Result<Option<PendingFlush>> {
        if self.edited_id.as_ref() == Some(&prospect.id) {
            self.selected = Some(prospect.apply_patch(&self.pending)?);
            return Ok(None);
        }

        let previous = self.take_pending();
        self.selected = Some(prospect);
        Ok(previous)
    }

    /// Merges edits into the pending patch and the view.
    ///
    /// A patch left over from another prospect is dropped first, so edits
    /// never bleed across prospects.
    pub fn record(&mut self, edits: &FieldPatch) -> Result<()> {
        let view = self.selected.as_ref().ok_or(SyncError::NoSelection)?;
        let next_view = view.apply_patch(edits)?;
        let id = view.id.clone();
        let mut previous = Vec::with_capacity(edits.len());
        for (field, _) in edits.iter() {
            previous.push((field.clone(), view.field(field)?));
        }

        if self.edited_id.as_ref() != Some(&id) {
            self.reset_pending();
            self.edited_id = Some(id);
        }

        for (field, value) in previous {
            if !self.baseline.contains(&field) {
                self.baseline.set(field, value);
            }
        }
        for (field, value) in edits.iter() {
            self.pending.set(field.clone(), value.clone());
        }

        self.selected = Some(next_view);
        Ok(())
    }

    /// Cancels any armed timer and starts a new generation.
    pub fn arm(&mut self) -> u64 {
        self.cancel_timer();
        self.generation += 1;
        self.generation
    }

    pub fn set_timer(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.timer.replace(handle) {
            previous.abort();
        }
    }

    /// Detaches the timer without aborting it; used by the timer itself.
    pub fn release_timer(&mut self) {
        self.timer = None;
    }

    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Removes the pending patch; `None` when there is nothing to flush.
    pub fn take_pending(&mut self) -> Option<PendingFlush> {
        self.cancel_timer();
        self.generation += 1;

        let id = self.edited_id.take()?;
        if self.pending.is_empty() {
            self.baseline = FieldPatch::new();
            return None;
        }

        Some(PendingFlush {
            id,
            patch: std::mem::take(&mut self.pending),
            baseline: std::mem::take(&mut self.baseline),
        })
    }

    /// Drops the pending patch and restores the view to its baseline.
    pub fn discard_pending(&mut self) -> Result<Vec<String>> {
        let Some(dropped) = self.take_pending() else {
            return Ok(Vec::new());
        };
        self.restore(&dropped.id, &dropped.baseline)
    }

    /// Installs the canonical record if it is still the selection, keeping
    /// edits made after the flush was taken on top of it.
    pub fn complete_success(&mut self, canonical: &Prospect) -> Result<bool> {
        if !self.is_selected(&canonical.id) {
            return Ok(false);
        }

        let view = if self.edited_id.as_ref() == Some(&canonical.id) {
            canonical.apply_patch(&self.pending)?
        } else {
            canonical.clone()
        };
        self.selected = Some(view);
        Ok(true)
    }

    /// Rolls back optimistic values after a failed flush.
    ///
    /// Fields edited again since the flush was taken keep their newer value.
    pub fn complete_failure(&mut self, failed: &PendingFlush) -> Result<Vec<String>> {
        let mut restore = FieldPatch::new();
        let still_editing = self.edited_id.as_ref() == Some(&failed.id);
        for (field, value) in failed.baseline.iter() {
            if still_editing && self.pending.contains(field) {
                continue;
            }
            restore.set(field.clone(), value.clone());
        }
        self.restore(&failed.id, &restore)
    }

    /// Ends the session.
    pub fn clear(&mut self) -> Option<PendingFlush> {
        let pending = self.take_pending();
        self.selected = None;
        pending
    }

    fn restore(&mut self, id: &ProspectId, values: &FieldPatch) -> Result<Vec<String>> {
        if values.is_empty() || !self.is_selected(id) {
            return Ok(Vec::new());
        }
        if let Some(view) = &self.selected {
            self.selected = Some(view.apply_patch(values)?);
        }
        Ok(values.field_names())
    }

    fn reset_pending(&mut self) {
        self.cancel_timer();
        self.pending = FieldPatch::new();
        self.baseline = FieldPatch::new();
        self.edited_id = None;
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
