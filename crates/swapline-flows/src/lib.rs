//! # swapline-flows
//!
//! Node services and the multi-party flows that run on them.
//!
//! ## Exposed surface
//!
//! | Operation | Method |
//! |-----------|--------|
//! | Create a descriptor | [`Node::create_descriptor`] |
//! | Issue an ownership token | [`Node::issue_ownership_token`], [`Node::issue_ownership_token_by_name`] |
//! | Both at once | [`Node::create_and_issue`] |
//! | Issue payment records | [`Node::issue_payment`] |
//! | Update a descriptor | [`Node::update_descriptor`] |
//! | Sell a token | [`Node::sell`] |
//!
//! The buyer role is never called directly: [`Node::serve`] runs it for
//! every incoming purchase session and publishes how it ended on
//! [`Node::next_purchase_outcome`].
//!
//! ## Atomicity
//!
//! A sale touches the ledger exactly once, when the seller submits the
//! transaction both parties signed. Every failure before that point
//! aborts the peer, releases the soft locks each side took, and leaves
//! the ledger as it was.

pub mod buyer;
pub mod issuance;
pub mod messages;
pub mod network;
pub mod node;
pub mod seller;
pub mod update;

pub use buyer::BuyerStep;
pub use issuance::{CreateDescriptor, CreatedAndIssued};
pub use messages::{FlowMessage, MessageKind, SessionKind};
pub use network::{InMemoryNetwork, IncomingSession, Session};
pub use node::{Node, PurchaseOutcome};
pub use seller::{SaleReceipt, SellerStep};
