//! Supply conservation per issued currency.
//!
//! Invariant enforced on every commit:
//! ```text
//! ∀ issued currency c: Σ(unconsumed payment records of c) == Σ(issued c)
//! ```
//!
//! Moves shuffle value between holders; only an `Issue` creates it. A
//! commit that would break the equality is refused before it lands.

use std::collections::BTreeMap;

use swapline_types::{IssuedCurrency, Result, SwaplineError};

/// Issued totals per currency.
#[derive(Debug, Default, Clone)]
pub struct SupplyConservation {
    issued: BTreeMap<IssuedCurrency, u128>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_issuance(&mut self, token: &IssuedCurrency, quantity: u64) {
        *self.issued.entry(token.clone()).or_default() += u128::from(quantity);
    }

    #[must_use]
    pub fn expected_supply(&self, token: &IssuedCurrency) -> u128 {
        self.issued.get(token).copied().unwrap_or_default()
    }

    /// Check `actual` against the issued total, optionally counting
    /// `pending_issue` not yet recorded.
    ///
    /// # Errors
    /// `ConsensusRejected` if they differ.
    pub fn verify(&self, token: &IssuedCurrency, actual: u128, pending_issue: u128) -> Result<()> {
        let expected = self.expected_supply(token) + pending_issue;
        if actual != expected {
            return Err(SwaplineError::ConsensusRejected {
                reason: format!(
                    "supply of {token} not conserved: {actual} in circulation, {expected} issued"
                ),
            });
        }
        Ok(())
    }
}
