//! Ledger states: the three kinds of record a transaction can consume or
//! produce, and the tokens that live on the ledger.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AssetDescriptor, IssuedCurrency, LinearId, Party, StateRef};

/// Indivisible claim of custody over a descriptor.
///
/// Holds the descriptor's `linear_id` as a weak pointer: the descriptor is
/// resolved by lookup at use time, never embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipToken {
    /// Identity of this token, stable across transfers.
    pub token_id: LinearId,
    /// The descriptor this token is a claim on.
    pub descriptor_id: LinearId,
    /// The party that issued the token.
    pub issuer: Party,
    /// Current holder.
    pub holder: Party,
}

impl OwnershipToken {
    /// Ownership tokens are never split or merged.
    pub const QUANTITY: u64 = 1;

    #[must_use]
    pub fn new(descriptor_id: LinearId, issuer: Party, holder: Party) -> Self {
        Self {
            token_id: LinearId::new(),
            descriptor_id,
            issuer,
            holder,
        }
    }

    /// The same token, held by someone else.
    #[must_use]
    pub fn with_holder(&self, holder: Party) -> Self {
        Self {
            holder,
            ..self.clone()
        }
    }
}

/// A divisible, fungible record of an issued currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub token: IssuedCurrency,
    /// Amount in minor units.
    pub quantity: u64,
    pub holder: Party,
}

impl PaymentRecord {
    #[must_use]
    pub fn new(token: IssuedCurrency, quantity: u64, holder: Party) -> Self {
        Self {
            token,
            quantity,
            holder,
        }
    }
}

/// Discriminant of [`LedgerState`], used for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    Descriptor,
    Ownership,
    Payment,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Descriptor => write!(f, "DESCRIPTOR"),
            Self::Ownership => write!(f, "OWNERSHIP"),
            Self::Payment => write!(f, "PAYMENT"),
        }
    }
}

/// Any record that can live on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerState {
    Descriptor(AssetDescriptor),
    Ownership(OwnershipToken),
    Payment(PaymentRecord),
}

impl LedgerState {
    #[must_use]
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Descriptor(_) => StateKind::Descriptor,
            Self::Ownership(_) => StateKind::Ownership,
            Self::Payment(_) => StateKind::Payment,
        }
    }

    /// The party entitled to spend this state. Descriptors have no holder.
    #[must_use]
    pub fn holder(&self) -> Option<&Party> {
        match self {
            Self::Descriptor(_) => None,
            Self::Ownership(t) => Some(&t.holder),
            Self::Payment(p) => Some(&p.holder),
        }
    }

    #[must_use]
    pub fn as_descriptor(&self) -> Option<&AssetDescriptor> {
        match self {
            Self::Descriptor(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_ownership(&self) -> Option<&OwnershipToken> {
        match self {
            Self::Ownership(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_payment(&self) -> Option<&PaymentRecord> {
        match self {
            Self::Payment(p) => Some(p),
            _ => None,
        }
    }
}

/// A state together with the ledger position that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub state: LedgerState,
    pub state_ref: StateRef,
}

impl StateAndRef {
    #[must_use]
    pub fn new(state: LedgerState, state_ref: StateRef) -> Self {
        Self { state, state_ref }
    }
}
