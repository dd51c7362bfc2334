// In-flight registry — the pending-record table behind de-duplication.
//
// Keyed by (action class, target id). A second gesture for an occupied key
// is rejected rather than queued, which is what serializes mutations
// against the same target.
//
// A pending delete also holds the post it removed. Outcomes for other
// classes on that post are written into the held copy through
// `PendingSlots`, so a failed delete restores what the server last said.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::cache::Placement;
use crate::error::DispatchError;
use crate::model::Post;

use super::record::{ActionClass, MutationRecord, Snapshot};

type Slots = HashMap<(ActionClass, String), MutationRecord>;

#[derive(Default)]
pub struct InFlight {
    slots: Mutex<Slots>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, class: ActionClass, target: &str) -> bool {
        self.lock().contains_key(&(class, target.to_string()))
    }

    /// Claim the slot for `(class, target)` and fill it with the record
    /// `build` produces.
    ///
    /// Returns `Ok(None)` if the slot is already taken. `build` runs with
    /// the registry locked, so two racing claims cannot both apply their
    /// optimistic patch. If `build` fails the slot stays free.
    pub fn claim<F>(
        &self,
        class: ActionClass,
        target: &str,
        build: F,
    ) -> Result<Option<MutationRecord>, DispatchError>
    where
        F: FnOnce() -> Result<MutationRecord, DispatchError>,
    {
        let mut slots = self.lock();
        let key = (class, target.to_string());
        if slots.contains_key(&key) {
            return Ok(None);
        }
        let record = build()?;
        slots.insert(key, record.clone());
        Ok(Some(record))
    }

    /// Lock the table for a settle-and-apply sequence. Cache transactions
    /// may run while this is held; never lock the registry from inside one.
    pub(crate) fn slots(&self) -> PendingSlots<'_> {
        PendingSlots(self.lock())
    }

    /// Snapshot of pending records, oldest first.
    pub fn pending(&self) -> Vec<MutationRecord> {
        let mut records: Vec<MutationRecord> = self.lock().values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The locked in-flight table.
pub(crate) struct PendingSlots<'a>(MutexGuard<'a, Slots>);

impl PendingSlots<'_> {
    /// Remove `record`'s slot and return the stored copy, which may carry
    /// updates made while it was pending. `None` if the slot was already
    /// released or now belongs to a newer record.
    pub(crate) fn settle(&mut self, record: &MutationRecord) -> Option<MutationRecord> {
        let key = (record.action.class(), record.action.target().to_string());
        match self.0.get(&key) {
            Some(current) if current.id == record.id => self.0.remove(&key),
            _ => None,
        }
    }

    /// Records pending for at least `timeout`, still in the table. Deletes
    /// come last so other outcomes on their post can land on the held copy
    /// before it is restored.
    pub(crate) fn overdue(&self, now: Instant, timeout: Duration) -> Vec<MutationRecord> {
        let mut overdue: Vec<MutationRecord> = self
            .0
            .values()
            .filter(|record| now.saturating_duration_since(record.started) >= timeout)
            .cloned()
            .collect();
        overdue.sort_by_key(|r| (r.action.class() == ActionClass::Delete, r.id));
        overdue
    }

    /// The post a pending delete removed and will restore if it fails,
    /// with the list positions it will go back to.
    pub(crate) fn held_by_delete(&mut self, post_id: &str) -> Option<(&mut Post, &mut Vec<Placement>)> {
        let record = self.0.get_mut(&(ActionClass::Delete, post_id.to_string()))?;
        match &mut record.snapshot {
            Snapshot::Delete { post, placements } => Some((post, placements)),
            _ => None,
        }
    }
}
