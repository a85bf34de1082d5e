//! A participant on the network and the services its flows run against.
//!
//! ```text
//!              ┌──────────────────────── Node ─────────────────────────┐
//!  caller ───▶ │ create / issue / update / sell        (initiator)     │
//!              │   │                                                   │
//!              │   ├─ VaultQuery ──────┐                               │
//!              │   ├─ ConsensusService ┴─▶ shared ledger               │
//!              │   ├─ TokenSelector ─▶ SoftLockTable (node-local)      │
//!              │   └─ InMemoryNetwork ─▶ sessions to peers             │
//!              │                                                       │
//!  inbox ────▶ │ serve(): one task per incoming session (responder)    │
//!              │   Purchase            → buyer role → outcome channel  │
//!              │   Distribution        → distribution list             │
//!              │   DescriptorBroadcast → observed descriptor versions  │
//!              └───────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use swapline_contract::{VerificationContext, verify_transaction};
use swapline_ledger::{ConsensusService, Notarised};
use swapline_types::{
    BalanceEntry, Currency, IssuedCurrency, LinearId, NodeConfig, Party, Result, SessionId,
    SignedTransaction, SigningService, StateAndRef, SwaplineError, TransactionBuilder,
    TransactionSignature, TxId, WireTransaction,
};
use swapline_vault::{SoftLockTable, TokenSelector, VaultQuery};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::messages::{FlowMessage, MessageKind, SessionKind};
use crate::network::{InMemoryNetwork, IncomingSession, Session, unexpected};

/// How a buyer-side exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOutcome {
    pub session: SessionId,
    pub seller: Party,
    pub result: Result<TxId>,
}

/// One participant: identity, signing key, ledger handles, local locks.
pub struct Node {
    party: Party,
    keys: Arc<dyn SigningService>,
    vault: Arc<dyn VaultQuery>,
    consensus: Arc<dyn ConsensusService>,
    selector: TokenSelector,
    network: Arc<InMemoryNetwork>,
    config: NodeConfig,
    /// Holders per descriptor, kept by maintainers for update broadcasts.
    distribution: DashMap<LinearId, BTreeSet<Party>>,
    /// Latest descriptor version announced to this node.
    observed: DashMap<LinearId, StateAndRef>,
    inbox: Mutex<Option<mpsc::Receiver<IncomingSession>>>,
    outcomes_tx: mpsc::UnboundedSender<PurchaseOutcome>,
    outcomes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PurchaseOutcome>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("party", &self.party)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Build a node and register it on `network` under `config.name`.
    ///
    /// # Errors
    /// `Configuration` if the name is taken by another key.
    pub fn new(
        config: NodeConfig,
        keys: Arc<dyn SigningService>,
        vault: Arc<dyn VaultQuery>,
        consensus: Arc<dyn ConsensusService>,
        network: Arc<InMemoryNetwork>,
    ) -> Result<Arc<Self>> {
        let party = Party::new(config.name.clone(), keys.public_key());
        let inbox = network.register(&party, config.session.clone())?;
        let selector = TokenSelector::new(
            Arc::clone(&vault),
            Arc::new(SoftLockTable::new()),
            config.selection.clone(),
        );
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        tracing::info!(party = %party, key = %party.key, "Node started");
        Ok(Arc::new(Self {
            party,
            keys,
            vault,
            consensus,
            selector,
            network,
            config,
            distribution: DashMap::new(),
            observed: DashMap::new(),
            inbox: Mutex::new(Some(inbox)),
            outcomes_tx,
            outcomes_rx: tokio::sync::Mutex::new(outcomes_rx),
        }))
    }

    #[must_use]
    pub fn party(&self) -> &Party {
        &self.party
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    #[must_use]
    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }

    /// This node's reservation table.
    #[must_use]
    pub fn locks(&self) -> &Arc<SoftLockTable> {
        self.selector.locks()
    }

    pub(crate) fn vault(&self) -> &dyn VaultQuery {
        self.vault.as_ref()
    }

    pub(crate) fn selector(&self) -> &TokenSelector {
        &self.selector
    }

    /// Start answering sessions. Each incoming session runs on its own task.
    ///
    /// # Errors
    /// `Internal` if the node is already serving.
    pub fn serve(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let mut inbox = self
            .inbox
            .lock()
            .take()
            .ok_or_else(|| SwaplineError::Internal(format!("{} is already serving", self.party)))?;
        let node = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while let Some(incoming) = inbox.recv().await {
                let node = Arc::clone(&node);
                tokio::spawn(async move { node.respond(incoming).await });
            }
            tracing::debug!(party = %node.party, "Inbox closed");
        }))
    }

    async fn respond(&self, incoming: IncomingSession) {
        let IncomingSession { kind, mut session } = incoming;
        match kind {
            SessionKind::Purchase => {
                let id = session.id();
                let seller = session.peer().clone();
                let result = self.run_buyer(&mut session).await;
                let outcome = PurchaseOutcome {
                    session: id,
                    seller,
                    result,
                };
                if self.outcomes_tx.send(outcome).is_err() {
                    tracing::debug!(session = %id, "Purchase outcome dropped");
                }
            }
            SessionKind::Distribution => {
                if let Err(e) = self.receive_distribution(&mut session).await {
                    tracing::warn!(session = %session.id(), peer = %session.peer(), error = %e, "Distribution update failed");
                }
            }
            SessionKind::DescriptorBroadcast => {
                if let Err(e) = self.receive_descriptor_update(&mut session).await {
                    tracing::warn!(session = %session.id(), peer = %session.peer(), error = %e, "Descriptor broadcast failed");
                }
            }
        }
    }

    /// Wait for the next buyer-side exchange to end.
    pub async fn next_purchase_outcome(&self) -> Option<PurchaseOutcome> {
        self.outcomes_rx.lock().await.recv().await
    }

    // -----------------------------------------------------------------
    // Distribution list & observed versions
    // -----------------------------------------------------------------

    pub(crate) fn record_holder(&self, descriptor_id: LinearId, holder: Party) {
        tracing::debug!(linear_id = %descriptor_id, holder = %holder, "Holder recorded");
        self.distribution
            .entry(descriptor_id)
            .or_default()
            .insert(holder);
    }

    /// Parties this node will tell when `descriptor_id` changes.
    #[must_use]
    pub fn distribution_list(&self, descriptor_id: &LinearId) -> Vec<Party> {
        self.distribution
            .get(descriptor_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The latest version of `descriptor_id` a maintainer announced here.
    #[must_use]
    pub fn observed_descriptor(&self, descriptor_id: &LinearId) -> Option<StateAndRef> {
        self.observed.get(descriptor_id).map(|s| s.clone())
    }

    async fn receive_distribution(&self, session: &mut Session) -> Result<()> {
        match session.receive(MessageKind::DistributionUpdate).await? {
            FlowMessage::DistributionUpdate {
                descriptor_id,
                holder,
            } => {
                self.record_holder(descriptor_id, holder);
                Ok(())
            }
            other => Err(unexpected(MessageKind::DistributionUpdate, &other)),
        }
    }

    async fn receive_descriptor_update(&self, session: &mut Session) -> Result<()> {
        let state = match session.receive(MessageKind::DescriptorUpdated).await? {
            FlowMessage::DescriptorUpdated(state) => state,
            other => return Err(unexpected(MessageKind::DescriptorUpdated, &other)),
        };
        let descriptor = state
            .state
            .as_descriptor()
            .ok_or_else(|| SwaplineError::ValidationRejected {
                reason: format!("broadcast {} is not a descriptor", state.state_ref),
            })?;
        if !descriptor.is_maintainer(session.peer()) {
            return Err(SwaplineError::UnauthorizedUpdate {
                reason: format!(
                    "{} broadcast {} but does not maintain it",
                    session.peer(),
                    descriptor.linear_id
                ),
            });
        }
        tracing::info!(
            linear_id = %descriptor.linear_id,
            state_ref = %state.state_ref,
            from = %session.peer(),
            "Descriptor version observed"
        );
        self.observed.insert(descriptor.linear_id, state);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Shared flow helpers
    // -----------------------------------------------------------------

    /// The payment asset sellers on this node quote in `code`.
    pub fn currency(&self, code: &str) -> Result<IssuedCurrency> {
        let issuer = self
            .network
            .party_by_name(&self.config.exchange.currency_issuer)?;
        Ok(IssuedCurrency::new(Currency::fiat(code), issuer))
    }

    /// This node's holdings of `token`, split by reservation.
    pub async fn balance(&self, token: &IssuedCurrency) -> Result<BalanceEntry> {
        self.selector.balance(&self.party, token).await
    }

    pub(crate) fn sign(&self, tx: WireTransaction) -> Result<SignedTransaction> {
        let id = tx.id()?;
        Ok(SignedTransaction::new(tx).with_signature(self.keys.sign(&id)))
    }

    pub(crate) fn signature_for(&self, tx_id: &TxId) -> TransactionSignature {
        self.keys.sign(tx_id)
    }

    /// Verify, sign alone, and commit.
    pub(crate) async fn finalize_alone(&self, builder: &TransactionBuilder) -> Result<Notarised> {
        let tx = builder.to_wire();
        verify_transaction(&tx, &VerificationContext::now())?;
        let stx = self.sign(tx)?;
        self.consensus.submit(stx).await
    }

    pub(crate) async fn submit(&self, stx: SignedTransaction) -> Result<Notarised> {
        self.consensus.submit(stx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapline_ledger::InMemoryLedger;
    use swapline_types::{AssetDescriptor, KeyPair, LedgerState, SessionConfig, StateRef};

    fn node(name: &str, ledger: &Arc<InMemoryLedger>, net: &Arc<InMemoryNetwork>) -> Arc<Node> {
        let mut config = NodeConfig::named(name);
        config.session = SessionConfig {
            timeout_ms: 200,
            channel_capacity: 1,
        };
        let vault: Arc<dyn VaultQuery> = ledger.clone();
        let consensus: Arc<dyn ConsensusService> = ledger.clone();
        Node::new(
            config,
            Arc::new(KeyPair::generate()),
            vault,
            consensus,
            Arc::clone(net),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn serve_twice_rejected() {
        let ledger = Arc::new(InMemoryLedger::new());
        let net = Arc::new(InMemoryNetwork::new());
        let a = node("A", &ledger, &net);
        let _h = a.serve().unwrap();
        assert!(matches!(a.serve(), Err(SwaplineError::Internal(_))));
    }

    #[tokio::test]
    async fn distribution_update_recorded() {
        let ledger = Arc::new(InMemoryLedger::new());
        let net = Arc::new(InMemoryNetwork::new());
        let issuer = node("Issuer", &ledger, &net);
        let seller = node("Seller", &ledger, &net);
        let _h = issuer.serve().unwrap();

        let id = LinearId::new();
        let buyer = Party::dummy("Buyer");
        let session = net
            .open(seller.party(), issuer.party(), SessionKind::Distribution)
            .await
            .unwrap();
        session
            .send(FlowMessage::DistributionUpdate {
                descriptor_id: id,
                holder: buyer.clone(),
            })
            .await
            .unwrap();

        for _ in 0..50 {
            if !issuer.distribution_list(&id).is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(issuer.distribution_list(&id), vec![buyer]);
    }

    #[tokio::test]
    async fn broadcast_from_non_maintainer_ignored() {
        let ledger = Arc::new(InMemoryLedger::new());
        let net = Arc::new(InMemoryNetwork::new());
        let holder = node("Holder", &ledger, &net);
        let stranger = node("Stranger", &ledger, &net);
        let _h = holder.serve().unwrap();

        let d = AssetDescriptor::sample(Party::dummy("Issuer"));
        let state = StateAndRef::new(LedgerState::Descriptor(d.clone()), StateRef::new(TxId([3; 32]), 0));
        let session = net
            .open(stranger.party(), holder.party(), SessionKind::DescriptorBroadcast)
            .await
            .unwrap();
        session.send(FlowMessage::DescriptorUpdated(state)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(holder.observed_descriptor(&d.linear_id).is_none());
    }

    #[test]
    fn currency_resolves_configured_issuer() {
        let ledger = Arc::new(InMemoryLedger::new());
        let net = Arc::new(InMemoryNetwork::new());
        let seller = node("Seller", &ledger, &net);
        assert!(matches!(
            seller.currency("USD"),
            Err(SwaplineError::PeerNotFound(_))
        ));
        let bank = node(swapline_types::constants::DEFAULT_CURRENCY_ISSUER, &ledger, &net);
        let usd = seller.currency("usd").unwrap();
        assert_eq!(usd.issuer, *bank.party());
        assert_eq!(usd.currency.code, "USD");
    }
}
