//! Soft-lock table: node-local reservations on unconsumed records.
//!
//! The table is the only place reservations live. A record is offered as
//! a transaction input only after [`SoftLockTable::try_reserve`] succeeded
//! for it, and that check-and-mark is a single atomic step on the record's
//! shard, so two runs can never both hold the same record.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use swapline_types::{LockId, Reservation, ReservationState, StateRef};

/// Reservations keyed by the record they lock.
#[derive(Debug, Default)]
pub struct SoftLockTable {
    entries: DashMap<StateRef, Reservation>,
}

impl SoftLockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `state_ref` for `lock_id`.
    ///
    /// Returns `true` if the record is now held by `lock_id` (including the
    /// case where it already was), `false` if another run holds it.
    pub fn try_reserve(&self, state_ref: StateRef, lock_id: LockId) -> bool {
        match self.entries.entry(state_ref) {
            Entry::Vacant(slot) => {
                slot.insert(Reservation::new(lock_id, state_ref));
                true
            }
            Entry::Occupied(held) => held.get().lock_id == lock_id && held.get().is_reserved(),
        }
    }

    /// Drop every live reservation held by `lock_id`.
    pub fn release(&self, lock_id: LockId) -> usize {
        let refs = self.held_by(lock_id);
        let released = self.release_refs(lock_id, &refs);
        if released > 0 {
            tracing::debug!(lock_id = %lock_id, released, "Reservations released");
        }
        released
    }

    /// Drop the given reservations, but only those `lock_id` holds.
    pub fn release_refs(&self, lock_id: LockId, refs: &[StateRef]) -> usize {
        refs.iter()
            .filter(|r| {
                self.entries
                    .remove_if(*r, |_, res| res.lock_id == lock_id && res.is_reserved())
                    .is_some()
            })
            .count()
    }

    /// Retire every reservation held by `lock_id` once its transaction has
    /// committed.
    ///
    /// The ledger has consumed those records, so no query returns them
    /// again and the entries are dropped.
    pub fn mark_spent(&self, lock_id: LockId) -> usize {
        let mut spent = 0;
        self.entries.retain(|_, res| {
            if res.lock_id == lock_id && res.mark_spent().is_ok() {
                spent += 1;
                false
            } else {
                true
            }
        });
        tracing::debug!(lock_id = %lock_id, spent, "Reservations marked spent");
        spent
    }

    /// Whether any run holds `state_ref`.
    #[must_use]
    pub fn is_reserved(&self, state_ref: &StateRef) -> bool {
        self.entries.contains_key(state_ref)
    }

    /// The run holding a live reservation on `state_ref`.
    #[must_use]
    pub fn reserved_by(&self, state_ref: &StateRef) -> Option<LockId> {
        self.entries
            .get(state_ref)
            .filter(|r| r.state == ReservationState::Reserved)
            .map(|r| r.lock_id)
    }

    /// Live reservations held by `lock_id`.
    #[must_use]
    pub fn held_by(&self, lock_id: LockId) -> Vec<StateRef> {
        self.entries
            .iter()
            .filter(|r| r.lock_id == lock_id && r.is_reserved())
            .map(|r| *r.key())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
