//! Payment selection with soft locks and bounded backoff.
//!
//! ```text
//!   attempt ──▶ query holder's records ──▶ total < target? ──▶ InsufficientFunds
//!      ▲                 │
//!      │          try_reserve each until Σ ≥ target
//!      │                 │
//!      │       enough ───┴─── short (others hold the rest)
//!      │         │                │
//!      │      Selection     release this attempt's picks
//!      │                          │
//!      └──── sleep min(base·2^n, cap) ◀── retries left? ──no──▶ SelectionContention
//! ```
//!
//! The total checked against the target counts reserved records too, so
//! `InsufficientFunds` means the holder can never pay, while
//! `SelectionContention` means it could once other runs let go.

use std::sync::Arc;

use swapline_types::{
    BalanceEntry, IssuedCurrency, LockId, Party, PaymentRecord, Result, SelectionConfig,
    StateAndRef, SwaplineError,
};

use crate::query::{QueryCriteria, VaultQuery, find_all};
use crate::soft_lock::SoftLockTable;

/// Inputs consumed and outputs produced by one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The run holding the reservations on `inputs`.
    pub lock_id: LockId,
    /// Reserved payment records, all held by the payer.
    pub inputs: Vec<StateAndRef>,
    /// Payment to the target, then change to the payer if any.
    pub outputs: Vec<PaymentRecord>,
}

/// Selects and soft-locks a holder's records to cover a payment.
pub struct TokenSelector {
    vault: Arc<dyn VaultQuery>,
    locks: Arc<SoftLockTable>,
    config: SelectionConfig,
}

impl TokenSelector {
    #[must_use]
    pub fn new(
        vault: Arc<dyn VaultQuery>,
        locks: Arc<SoftLockTable>,
        config: SelectionConfig,
    ) -> Self {
        Self {
            vault,
            locks,
            config,
        }
    }

    #[must_use]
    pub fn locks(&self) -> &Arc<SoftLockTable> {
        &self.locks
    }

    async fn payment_records(
        &self,
        token: &IssuedCurrency,
        holder: &Party,
    ) -> Result<Vec<(StateAndRef, u64)>> {
        let criteria = QueryCriteria::payments()
            .held_by(holder)
            .issued_by(&token.issuer)
            .currency(&token.currency.code);
        let states = find_all(self.vault.as_ref(), &criteria, self.config.page_size).await?;
        Ok(states
            .into_iter()
            .filter_map(|s| {
                let quantity = s.state.as_payment().filter(|p| p.token == *token)?.quantity;
                Some((s, quantity))
            })
            .collect())
    }

    /// Reserve records of `token` held by `holder` worth at least
    /// `target_quantity`, and build the payment to `target_party`.
    ///
    /// # Errors
    /// - `ValidationRejected` for a zero target
    /// - `InsufficientFunds` if everything `holder` owns is not enough
    /// - `SelectionContention` if the funds stayed reserved by other runs
    ///   through every retry
    pub async fn select(
        &self,
        lock_id: LockId,
        target_party: &Party,
        target_quantity: u64,
        token: &IssuedCurrency,
        holder: &Party,
    ) -> Result<Selection> {
        if target_quantity == 0 {
            return Err(SwaplineError::ValidationRejected {
                reason: "payment target must be greater than zero".into(),
            });
        }

        for attempt in 0..=self.config.max_retries {
            let records = self.payment_records(token, holder).await?;
            // Holdings may exceed u64 across records; sums stay in u128.
            let target = u128::from(target_quantity);
            let total: u128 = records.iter().map(|(_, q)| u128::from(*q)).sum();
            if total < target {
                return Err(SwaplineError::InsufficientFunds {
                    needed: target_quantity,
                    available: u64::try_from(total).unwrap_or(u64::MAX),
                    currency: token.currency.code.clone(),
                });
            }

            let mut picked = Vec::new();
            let mut gathered = 0u128;
            for (state, quantity) in records {
                if gathered >= target {
                    break;
                }
                if self.locks.try_reserve(state.state_ref, lock_id) {
                    gathered += u128::from(quantity);
                    picked.push(state);
                }
            }

            if gathered >= target {
                let mut outputs = vec![PaymentRecord::new(
                    token.clone(),
                    target_quantity,
                    target_party.clone(),
                )];
                // Bounded by the last record picked, so it fits in u64.
                let change = u64::try_from(gathered - target).map_err(|_| {
                    SwaplineError::Internal(format!("change of {gathered} overflows"))
                })?;
                if change > 0 {
                    outputs.push(PaymentRecord::new(token.clone(), change, holder.clone()));
                }
                tracing::debug!(
                    lock_id = %lock_id,
                    target = target_quantity,
                    inputs = picked.len(),
                    change,
                    attempt,
                    "Payment selected"
                );
                return Ok(Selection {
                    lock_id,
                    inputs: picked,
                    outputs,
                });
            }

            let refs: Vec<_> = picked.iter().map(|s| s.state_ref).collect();
            self.locks.release_refs(lock_id, &refs);
            tracing::warn!(
                lock_id = %lock_id,
                target = target_quantity,
                gathered,
                total,
                attempt,
                "Payment records contended"
            );
            if attempt < self.config.max_retries {
                tokio::time::sleep(self.config.backoff(attempt)).await;
            }
        }

        Err(SwaplineError::SelectionContention {
            attempts: self.config.max_retries + 1,
        })
    }

    /// Reserve a single record, retrying while another run holds it.
    ///
    /// # Errors
    /// `SelectionContention` if it is still held after every retry.
    pub async fn reserve_one(&self, lock_id: LockId, state: &StateAndRef) -> Result<()> {
        for attempt in 0..=self.config.max_retries {
            if self.locks.try_reserve(state.state_ref, lock_id) {
                return Ok(());
            }
            tracing::warn!(
                lock_id = %lock_id,
                state_ref = %state.state_ref,
                attempt,
                "Record held by another run"
            );
            if attempt < self.config.max_retries {
                tokio::time::sleep(self.config.backoff(attempt)).await;
            }
        }
        Err(SwaplineError::SelectionContention {
            attempts: self.config.max_retries + 1,
        })
    }

    /// Split of `holder`'s unconsumed `token` records by reservation.
    pub async fn balance(&self, holder: &Party, token: &IssuedCurrency) -> Result<BalanceEntry> {
        let mut entry = BalanceEntry::new();
        for (state, quantity) in self.payment_records(token, holder).await? {
            if self.locks.is_reserved(&state.state_ref) {
                entry.reserved = entry.reserved.saturating_add(quantity);
            } else {
                entry.available = entry.available.saturating_add(quantity);
            }
        }
        Ok(entry)
    }
}
