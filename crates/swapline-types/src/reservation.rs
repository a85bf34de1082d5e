//! # Reservation: the soft lock on an unconsumed record
//!
//! A reservation is a node-local, provisional claim on one ledger state,
//! taken before the state is offered as a transaction input.
//!
//! ## State Machine
//!
//! ```text
//!   ┌──────────┐   committed   ┌───────┐
//!   │ RESERVED ├──────────────▶│ SPENT ├──▶ (entry removed)
//!   └────┬─────┘               └───────┘
//!        │ abandoned / failed
//!        ▼
//!     (entry removed)
//! ```
//!
//! Both ends delete the reservation. A released record is
//! indistinguishable from one that was never reserved, and a spent one is
//! consumed on the ledger and never offered again.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LockId, StateRef, SwaplineError};

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationState {
    /// Held by an in-flight exchange. Other selections must skip it.
    Reserved,
    /// The consuming transaction committed. **Irreversible.**
    Spent,
}

impl ReservationState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Reserved, Self::Spent))
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved => write!(f, "RESERVED"),
            Self::Spent => write!(f, "SPENT"),
        }
    }
}

/// One soft lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// The protocol run holding the lock.
    pub lock_id: LockId,
    /// The locked record.
    pub state_ref: StateRef,
    pub state: ReservationState,
    pub reserved_at: DateTime<Utc>,
}

impl Reservation {
    #[must_use]
    pub fn new(lock_id: LockId, state_ref: StateRef) -> Self {
        Self {
            lock_id,
            state_ref,
            state: ReservationState::Reserved,
            reserved_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.state == ReservationState::Reserved
    }

    /// Reserved → Spent.
    ///
    /// # Errors
    /// `InvalidReservation` if already spent.
    pub fn mark_spent(&mut self) -> crate::Result<()> {
        if !self.state.can_transition_to(ReservationState::Spent) {
            return Err(SwaplineError::InvalidReservation {
                reason: format!(
                    "cannot move {} held by {} from {} to SPENT",
                    self.state_ref, self.lock_id, self.state
                ),
            });
        }
        self.state = ReservationState::Spent;
        Ok(())
    }
}
