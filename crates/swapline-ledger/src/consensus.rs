//! The consensus service interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swapline_types::{Result, SignedTransaction, TxId};

/// Proof that a transaction was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notarised {
    pub tx_id: TxId,
    pub transaction: SignedTransaction,
    /// Position in the ledger's global order, starting at 0.
    pub sequence: u64,
    pub committed_at: DateTime<Utc>,
}

/// Orders and commits transactions.
///
/// Implementations guarantee that a state is consumed by at most one
/// committed transaction, and that a commit is all-or-nothing.
#[async_trait]
pub trait ConsensusService: Send + Sync {
    /// Verify and commit `stx`.
    ///
    /// # Errors
    /// `ConsensusRejected` naming why the transaction cannot be committed.
    async fn submit(&self, stx: SignedTransaction) -> Result<Notarised>;
}
