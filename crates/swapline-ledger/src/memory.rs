//! In-memory ledger: the shared index of states plus the notary that
//! commits to it.
//!
//! A commit runs entirely inside one critical section:
//! 1. Signatures verify and every required signer has signed
//! 2. The validation engine accepts the transaction
//! 3. Every input and reference is known, unconsumed, and equal to the
//!    recorded state
//! 4. Supply of every issued currency stays conserved
//! 5. Inputs are marked consumed, outputs recorded, the transaction logged
//!
//! Any failure in 1-4 leaves the ledger untouched.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use swapline_contract::{VerificationContext, verify_transaction};
use swapline_types::{
    CommandKind, IssuedCurrency, LedgerState, Result, SignedTransaction, StateAndRef, StateRef,
    SwaplineError, TokenCommand, TxId,
};
use swapline_vault::{Page, PageSpec, QueryCriteria, VaultQuery};

use crate::consensus::{ConsensusService, Notarised};
use crate::supply::SupplyConservation;

fn rejected(reason: impl Into<String>) -> SwaplineError {
    SwaplineError::ConsensusRejected {
        reason: reason.into(),
    }
}

#[derive(Debug, Default)]
struct Store {
    /// Unconsumed states keyed by insertion order.
    unconsumed: BTreeMap<u64, StateAndRef>,
    /// Position of each unconsumed state in `unconsumed`.
    positions: HashMap<StateRef, u64>,
    /// Consumed states and the transaction that consumed them.
    consumed: HashMap<StateRef, TxId>,
    /// Committed transactions in order.
    log: Vec<Notarised>,
    by_id: HashMap<TxId, usize>,
    /// Payment quantity currently unconsumed, per issued currency.
    circulating: BTreeMap<IssuedCurrency, u128>,
    supply: SupplyConservation,
    next_position: u64,
}

impl Store {
    fn check_current(&self, state: &StateAndRef, role: &str) -> Result<()> {
        if let Some(by) = self.consumed.get(&state.state_ref) {
            return Err(rejected(format!(
                "{role} {} already consumed by {}",
                state.state_ref,
                by.short()
            )));
        }
        let recorded = self
            .positions
            .get(&state.state_ref)
            .and_then(|p| self.unconsumed.get(p))
            .ok_or_else(|| rejected(format!("{role} {} is not on the ledger", state.state_ref)))?;
        if recorded.state != state.state {
            return Err(rejected(format!(
                "{role} {} does not match the recorded state",
                state.state_ref
            )));
        }
        Ok(())
    }

    fn check_supply(&self, stx: &SignedTransaction) -> Result<BTreeMap<IssuedCurrency, u64>> {
        let mut after = self.circulating.clone();
        let mut issued: BTreeMap<IssuedCurrency, u128> = BTreeMap::new();
        let issuing = stx
            .tx
            .command(CommandKind::Token(TokenCommand::Issue))
            .is_some();
        for input in &stx.tx.inputs {
            if let LedgerState::Payment(p) = &input.state {
                let slot = after.entry(p.token.clone()).or_default();
                *slot = slot.saturating_sub(u128::from(p.quantity));
            }
        }
        for output in &stx.tx.outputs {
            if let LedgerState::Payment(p) = output {
                *after.entry(p.token.clone()).or_default() += u128::from(p.quantity);
                if issuing {
                    *issued.entry(p.token.clone()).or_default() += u128::from(p.quantity);
                }
            }
        }
        for (token, actual) in &after {
            let pending = issued.get(token).copied().unwrap_or_default();
            self.supply.verify(token, *actual, pending)?;
        }
        issued
            .into_iter()
            .map(|(token, quantity)| {
                u64::try_from(quantity)
                    .map(|q| (token.clone(), q))
                    .map_err(|_| rejected(format!("issuance of {token} overflows")))
            })
            .collect()
    }

    fn commit(&mut self, tx_id: TxId, stx: SignedTransaction) -> Result<Notarised> {
        let outputs = stx.tx.out_refs()?;
        let issued = self.check_supply(&stx)?;

        for input in &stx.tx.inputs {
            if let Some(pos) = self.positions.remove(&input.state_ref) {
                self.unconsumed.remove(&pos);
            }
            self.consumed.insert(input.state_ref, tx_id);
            if let LedgerState::Payment(p) = &input.state {
                let slot = self.circulating.entry(p.token.clone()).or_default();
                *slot = slot.saturating_sub(u128::from(p.quantity));
            }
        }
        for output in outputs {
            if let LedgerState::Payment(p) = &output.state {
                *self.circulating.entry(p.token.clone()).or_default() += u128::from(p.quantity);
            }
            let pos = self.next_position;
            self.next_position += 1;
            self.positions.insert(output.state_ref, pos);
            self.unconsumed.insert(pos, output);
        }
        for (token, quantity) in issued {
            self.supply.record_issuance(&token, quantity);
        }

        let notarised = Notarised {
            tx_id,
            transaction: stx,
            sequence: self.log.len() as u64,
            committed_at: Utc::now(),
        };
        self.by_id.insert(tx_id, self.log.len());
        self.log.push(notarised.clone());
        Ok(notarised)
    }
}

/// Shared ledger: one instance serves every node's vault queries and
/// notarises every transaction.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    store: Mutex<Store>,
    /// Fixed year for validation; wall clock when `None`.
    current_year: Option<i32>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate against a fixed year instead of the wall clock.
    #[must_use]
    pub fn with_current_year(year: i32) -> Self {
        Self {
            store: Mutex::default(),
            current_year: Some(year),
        }
    }

    fn context(&self) -> VerificationContext {
        self.current_year
            .map_or_else(VerificationContext::now, VerificationContext::new)
    }

    /// Run the whole commit pipeline under the store lock.
    pub fn commit(&self, stx: SignedTransaction) -> Result<Notarised> {
        let tx_id = stx.id()?;
        let ctx = self.context();
        let mut store = self.store.lock();

        if let Some(&idx) = store.by_id.get(&tx_id) {
            tracing::debug!(tx_id = %tx_id.short(), "Transaction already committed");
            return Ok(store.log[idx].clone());
        }

        let verdict = stx
            .verify_complete()
            .and_then(|()| verify_transaction(&stx.tx, &ctx))
            .map_err(|e| rejected(e.to_string()))
            .and_then(|()| {
                let mut seen = HashSet::new();
                if let Some(dup) = stx.tx.inputs.iter().find(|s| !seen.insert(s.state_ref)) {
                    return Err(rejected(format!("input {} listed twice", dup.state_ref)));
                }
                for input in &stx.tx.inputs {
                    store.check_current(input, "input")?;
                }
                for reference in &stx.tx.references {
                    store.check_current(reference, "reference")?;
                }
                Ok(())
            });
        if let Err(e) = verdict {
            tracing::warn!(tx_id = %tx_id.short(), error = %e, "Transaction rejected");
            return Err(e);
        }

        let notarised = store.commit(tx_id, stx).inspect_err(|e| {
            tracing::warn!(tx_id = %tx_id.short(), error = %e, "Transaction rejected");
        })?;
        tracing::info!(
            tx_id = %tx_id.short(),
            sequence = notarised.sequence,
            inputs = notarised.transaction.tx.inputs.len(),
            outputs = notarised.transaction.tx.outputs.len(),
            "Transaction committed"
        );
        Ok(notarised)
    }

    #[must_use]
    pub fn transaction(&self, tx_id: &TxId) -> Option<Notarised> {
        let store = self.store.lock();
        store.by_id.get(tx_id).map(|&idx| store.log[idx].clone())
    }

    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.store.lock().log.len()
    }

    /// Every unconsumed state, in ledger order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StateAndRef> {
        self.store.lock().unconsumed.values().cloned().collect()
    }

    /// The transaction that consumed `state_ref`, if any.
    #[must_use]
    pub fn consumed_by(&self, state_ref: &StateRef) -> Option<TxId> {
        self.store.lock().consumed.get(state_ref).copied()
    }

    /// Issued total of `token`.
    #[must_use]
    pub fn issued_supply(&self, token: &IssuedCurrency) -> u128 {
        self.store.lock().supply.expected_supply(token)
    }

    /// Unconsumed total of `token`.
    #[must_use]
    pub fn circulating_supply(&self, token: &IssuedCurrency) -> u128 {
        self.store
            .lock()
            .circulating
            .get(token)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConsensusService for InMemoryLedger {
    async fn submit(&self, stx: SignedTransaction) -> Result<Notarised> {
        self.commit(stx)
    }
}

#[async_trait]
impl VaultQuery for InMemoryLedger {
    async fn find_unconsumed(&self, criteria: &QueryCriteria, page: PageSpec) -> Result<Page> {
        let store = self.store.lock();
        let matching = store
            .unconsumed
            .values()
            .filter(|s| criteria.matches(&s.state));
        let total = matching.clone().count();
        let states = matching
            .skip(page.offset())
            .take(page.size)
            .cloned()
            .collect();
        Ok(Page { states, total })
    }
}
