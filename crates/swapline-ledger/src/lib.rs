//! # swapline-ledger
//!
//! **Consensus plane**: the single authority that orders transactions and
//! guarantees each state is consumed at most once.
//!
//! ## Architecture
//!
//! [`InMemoryLedger`] plays two parts at once:
//! 1. The shared index every node's vault queries ([`VaultQuery`](swapline_vault::VaultQuery))
//! 2. The notary every exchange submits to ([`ConsensusService`])
//!
//! Each submission is verified (signatures, validation engine, input
//! currency, supply conservation) and committed atomically, or refused
//! with `ConsensusRejected` and no change.

pub mod consensus;
pub mod memory;
pub mod supply;

pub use consensus::{ConsensusService, Notarised};
pub use memory::InMemoryLedger;
pub use supply::SupplyConservation;
