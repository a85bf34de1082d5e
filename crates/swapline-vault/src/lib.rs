//! # swapline-vault
//!
//! A node's view of the ledger: what it can spend, and what it has already
//! promised to an in-flight exchange.
//!
//! - [`VaultQuery`]: paged lookup of unconsumed states by [`QueryCriteria`]
//! - [`SoftLockTable`]: node-local reservations (RESERVED → SPENT, or removed)
//! - [`TokenSelector`]: picks and reserves payment records to cover a
//!   target, retrying with bounded exponential backoff under contention

pub mod query;
pub mod selector;
pub mod soft_lock;

pub use query::{Page, PageSpec, QueryCriteria, VaultQuery, find_all, find_exactly_one};
pub use selector::{Selection, TokenSelector};
pub use soft_lock::SoftLockTable;
