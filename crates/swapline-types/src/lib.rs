//! # swapline-types
//!
//! Shared types, errors, and configuration for **Swapline**, an atomic
//! instrument-for-payment exchange over a notarised shared ledger.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`LinearId`], [`TxId`], [`StateRef`], [`PartyKey`], [`SessionId`], [`LockId`]
//! - **Parties & signing**: [`Party`], [`KeyPair`], [`SigningService`], [`TransactionSignature`]
//! - **Money**: [`Currency`], [`IssuedCurrency`], [`Amount`], [`BalanceEntry`]
//! - **Ledger states**: [`AssetDescriptor`], [`OwnershipToken`], [`PaymentRecord`], [`LedgerState`], [`StateAndRef`]
//! - **Transactions**: [`TransactionBuilder`], [`WireTransaction`], [`SignedTransaction`], [`Command`], [`CommandKind`]
//! - **Reservations**: [`Reservation`], [`ReservationState`]
//! - **Configuration**: [`NodeConfig`], [`SelectionConfig`], [`SessionConfig`], [`ExchangeConfig`]
//! - **Errors**: [`SwaplineError`] with `SL_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod amount;
pub mod balance;
pub mod config;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod ids;
pub mod party;
pub mod reservation;
pub mod state;
pub mod transaction;

// Re-export all primary types at crate root for ergonomic imports:
//   use swapline_types::{AssetDescriptor, Party, SignedTransaction, ...};

pub use amount::*;
pub use balance::*;
pub use config::*;
pub use descriptor::*;
pub use error::*;
pub use ids::*;
pub use party::*;
pub use reservation::*;
pub use state::*;
pub use transaction::*;

// Constants are accessed via `swapline_types::constants::FOO`
// (not re-exported to avoid name collisions).
