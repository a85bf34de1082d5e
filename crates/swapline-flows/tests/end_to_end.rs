//! End-to-end exchange scenarios over one shared in-memory ledger.
//!
//! Every node runs its responder loop on the test runtime. Parties:
//! `Issuer` (maintains descriptors), `CurrencyIssuer` (issues USD),
//! `Seller` and `Buyer`.
//!
//! Set `RUST_LOG=swapline_flows=debug` to watch the role steps.

use std::sync::Arc;
use std::time::Duration;

use swapline_flows::{
    CreateDescriptor, FlowMessage, InMemoryNetwork, MessageKind, Node, PurchaseOutcome,
    SessionKind,
};
use swapline_ledger::{ConsensusService, InMemoryLedger};
use swapline_types::{
    Amount, Currency, IssuedCurrency, KeyPair, LinearId, NodeConfig, Party, SelectionConfig,
    SessionConfig, StateAndRef, SwaplineError, constants,
};
use swapline_vault::{QueryCriteria, VaultQuery, find_all};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(name: &str) -> NodeConfig {
    let mut config = NodeConfig::named(name);
    config.selection = SelectionConfig {
        max_retries: 8,
        retry_sleep_ms: 10,
        retry_cap_ms: 200,
        page_size: 50,
    };
    config.session.timeout_ms = 5_000;
    config
}

fn usd(quantity: u64) -> Amount {
    Amount::new(quantity, Currency::fiat("USD"))
}

fn excavator() -> CreateDescriptor {
    CreateDescriptor::new("Excavator CAT-320", 2020, "BATCH-0001", usd(1000), 2)
}

/// One ledger, one network, any number of nodes.
struct Market {
    ledger: Arc<InMemoryLedger>,
    network: Arc<InMemoryNetwork>,
}

impl Market {
    fn new() -> Self {
        init_tracing();
        Self {
            ledger: Arc::new(InMemoryLedger::new()),
            network: Arc::new(InMemoryNetwork::new()),
        }
    }

    fn idle_node(&self, config: NodeConfig) -> Arc<Node> {
        let vault: Arc<dyn VaultQuery> = self.ledger.clone();
        let consensus: Arc<dyn ConsensusService> = self.ledger.clone();
        Node::new(
            config,
            Arc::new(KeyPair::generate()),
            vault,
            consensus,
            Arc::clone(&self.network),
        )
        .expect("node registers")
    }

    fn node_with(&self, config: NodeConfig) -> Arc<Node> {
        let node = self.idle_node(config);
        node.serve().expect("node serves");
        node
    }

    fn node(&self, name: &str) -> Arc<Node> {
        self.node_with(config(name))
    }

    /// A bare identity with an inbox but no node behind it.
    fn impostor(&self, name: &str) -> (Party, tokio::sync::mpsc::Receiver<swapline_flows::IncomingSession>) {
        let party = KeyPair::generate().party(name);
        let inbox = self
            .network
            .register(
                &party,
                SessionConfig {
                    timeout_ms: 2_000,
                    channel_capacity: 1,
                },
            )
            .expect("impostor registers");
        (party, inbox)
    }

    async fn unconsumed(&self, criteria: &QueryCriteria) -> Vec<StateAndRef> {
        find_all(self.ledger.as_ref(), criteria, 50)
            .await
            .expect("query succeeds")
    }

    async fn payments_of(&self, holder: &Party) -> Vec<u64> {
        let mut quantities: Vec<u64> = self
            .unconsumed(&QueryCriteria::payments().held_by(holder))
            .await
            .iter()
            .filter_map(|s| s.state.as_payment().map(|p| p.quantity))
            .collect();
        quantities.sort_unstable();
        quantities
    }

    async fn token_holder(&self, descriptor_id: LinearId) -> Party {
        let tokens = self
            .unconsumed(&QueryCriteria::ownership().pointing_at(descriptor_id))
            .await;
        assert_eq!(tokens.len(), 1, "exactly one token per descriptor");
        tokens[0]
            .state
            .as_ownership()
            .expect("ownership state")
            .holder
            .clone()
    }

    async fn descriptor(&self, descriptor_id: LinearId) -> StateAndRef {
        let found = self
            .unconsumed(&QueryCriteria::descriptors().linear_id(descriptor_id))
            .await;
        assert_eq!(found.len(), 1, "exactly one current version");
        found[0].clone()
    }
}

/// Issuer, currency issuer, seller holding an excavator token, buyer
/// holding `buyer_funds` USD.
struct Scene {
    market: Market,
    issuer: Arc<Node>,
    bank: Arc<Node>,
    seller: Arc<Node>,
    buyer: Arc<Node>,
    descriptor_id: LinearId,
}

impl Scene {
    async fn new(buyer_funds: u64) -> Self {
        let market = Market::new();
        let issuer = market.node("Issuer");
        let bank = market.node(constants::DEFAULT_CURRENCY_ISSUER);
        let seller = market.node("Seller");
        let buyer = market.node("Buyer");
        let issued = issuer
            .create_and_issue(excavator(), seller.party())
            .await
            .expect("create and issue");
        if buyer_funds > 0 {
            bank.issue_payment(buyer_funds, "USD", buyer.party())
                .await
                .expect("fund buyer");
        }
        Self {
            market,
            issuer,
            bank,
            seller,
            buyer,
            descriptor_id: issued.descriptor_id,
        }
    }

    fn usd(&self) -> IssuedCurrency {
        IssuedCurrency::new(Currency::fiat("USD"), self.bank.party().clone())
    }
}

async fn outcome(node: &Node) -> PurchaseOutcome {
    tokio::time::timeout(Duration::from_secs(10), node.next_purchase_outcome())
        .await
        .expect("buyer finishes")
        .expect("outcome channel open")
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// =========================================================================
// Descriptor creation
// =========================================================================

#[tokio::test]
async fn descriptor_created_with_matching_valuations() {
    let market = Market::new();
    let issuer = market.node("Issuer");

    let (linear_id, tx_id) = issuer.create_descriptor(excavator()).await.unwrap();

    assert!(market.ledger.transaction(&tx_id).is_some());
    let state = market.descriptor(linear_id).await;
    let d = state.state.as_descriptor().unwrap();
    assert_eq!(d.valuation, usd(1000));
    assert_eq!(d.resale_valuation, usd(1000));
    assert_eq!(d.warranty_years, 2);
    assert_eq!(d.year_of_manufacture, 2020);
    assert_eq!(d.issuer, *issuer.party());
}

#[tokio::test]
async fn invalid_descriptor_never_reaches_ledger() {
    let market = Market::new();
    let issuer = market.node("Issuer");

    let mut no_warranty = excavator();
    no_warranty.warranty_years = 0;
    let err = issuer.create_descriptor(no_warranty).await.unwrap_err();
    assert!(matches!(err, SwaplineError::ValidationRejected { .. }), "got {err}");

    let mut from_the_future = excavator();
    from_the_future.year_of_manufacture = 9999;
    assert!(issuer.create_descriptor(from_the_future).await.is_err());

    assert_eq!(market.ledger.transaction_count(), 0);
}

// =========================================================================
// A sale completes
// =========================================================================

#[tokio::test]
async fn sale_completes_with_change() {
    let scene = Scene::new(1200).await;
    let m = &scene.market;

    let receipt = scene
        .seller
        .sell(scene.descriptor_id, scene.buyer.party(), "USD")
        .await
        .unwrap();
    assert_eq!(receipt.price, usd(1000));

    let bought = outcome(&scene.buyer).await;
    assert_eq!(bought.result, Ok(receipt.tx_id));
    assert_eq!(bought.seller, *scene.seller.party());

    assert_eq!(m.token_holder(scene.descriptor_id).await, *scene.buyer.party());
    assert_eq!(m.payments_of(scene.seller.party()).await, vec![1000]);
    assert_eq!(m.payments_of(scene.buyer.party()).await, vec![200]);

    assert!(scene.seller.locks().is_empty());
    assert!(scene.buyer.locks().is_empty());
    let balance = scene.buyer.balance(&scene.usd()).await.unwrap();
    assert_eq!(balance.available, 200);
    assert_eq!(balance.reserved, 0);
}

#[tokio::test]
async fn sold_token_cannot_be_sold_again() {
    let scene = Scene::new(1200).await;
    scene
        .seller
        .sell(scene.descriptor_id, scene.buyer.party(), "USD")
        .await
        .unwrap();
    let _ = outcome(&scene.buyer).await;

    let err = scene
        .seller
        .sell(scene.descriptor_id, scene.buyer.party(), "USD")
        .await
        .unwrap_err();
    assert!(matches!(err, SwaplineError::NotFound { .. }), "got {err}");
}

#[tokio::test]
async fn supply_conserved_across_exchange() {
    let scene = Scene::new(1200).await;
    let token = scene.usd();
    assert_eq!(scene.market.ledger.issued_supply(&token), 1200);

    scene
        .seller
        .sell(scene.descriptor_id, scene.buyer.party(), "USD")
        .await
        .unwrap();

    assert_eq!(scene.market.ledger.issued_supply(&token), 1200);
    assert_eq!(scene.market.ledger.circulating_supply(&token), 1200);
}

// =========================================================================
// Payment below valuation
// =========================================================================

#[tokio::test]
async fn price_not_met_before_any_signature() {
    let scene = Scene::new(1200).await;
    // The buyer pays the resale valuation; the seller insists on the
    // valuation.
    scene
        .issuer
        .update_descriptor(scene.descriptor_id, usd(800), 2)
        .await
        .unwrap();
    let before = scene.market.ledger.snapshot();
    let count = scene.market.ledger.transaction_count();

    let err = scene
        .seller
        .sell(scene.descriptor_id, scene.buyer.party(), "USD")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SwaplineError::PriceNotMet {
            paid: 800,
            price: 1000,
            currency: "USD".into(),
        }
    );

    let bought = outcome(&scene.buyer).await;
    assert!(
        matches!(bought.result, Err(SwaplineError::SessionAborted { ref reason }) if reason.contains("SL_ERR_302")),
        "got {:?}",
        bought.result
    );
    assert_eq!(scene.market.ledger.snapshot(), before);
    assert_eq!(scene.market.ledger.transaction_count(), count);
    assert!(scene.seller.locks().is_empty());
    assert!(scene.buyer.locks().is_empty());
}

// =========================================================================
// Update authorization
// =========================================================================

#[tokio::test]
async fn non_maintainer_cannot_update() {
    let scene = Scene::new(0).await;
    let before = scene.market.descriptor(scene.descriptor_id).await;

    let err = scene
        .seller
        .update_descriptor(scene.descriptor_id, usd(500), 5)
        .await
        .unwrap_err();
    assert!(matches!(err, SwaplineError::UnauthorizedUpdate { .. }), "got {err}");

    assert_eq!(scene.market.descriptor(scene.descriptor_id).await, before);
}

#[tokio::test]
async fn maintainer_who_is_not_issuer_fails_engine_check() {
    let market = Market::new();
    let issuer = market.node("Issuer");
    let auditor = market.node("Auditor");
    let (linear_id, _) = issuer
        .create_descriptor(excavator().with_maintainer(auditor.party().clone()))
        .await
        .unwrap();
    let before = market.descriptor(linear_id).await;

    let err = auditor
        .update_descriptor(linear_id, usd(900), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, SwaplineError::UnauthorizedUpdate { .. }), "got {err}");
    assert_eq!(market.descriptor(linear_id).await, before);

    issuer.update_descriptor(linear_id, usd(900), 3).await.unwrap();
    let after = market.descriptor(linear_id).await;
    let d = after.state.as_descriptor().unwrap();
    assert_eq!(d.resale_valuation, usd(900));
    assert_eq!(d.valuation, usd(1000));
    assert_eq!(d.warranty_years, 3);
}

// =========================================================================
// Two sales race for the same funds
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sales_share_one_record() {
    let market = Market::new();
    let issuer = market.node("Issuer");
    let bank = market.node(constants::DEFAULT_CURRENCY_ISSUER);
    let seller_a = market.node("SellerA");
    let seller_b = market.node("SellerB");
    let buyer = market.node("Buyer");

    let a = issuer
        .create_and_issue(excavator(), seller_a.party())
        .await
        .unwrap();
    let b = issuer
        .create_and_issue(
            CreateDescriptor::new("Crane LTM-1100", 2021, "BATCH-0002", usd(1000), 3),
            seller_b.party(),
        )
        .await
        .unwrap();
    bank.issue_payment(1000, "USD", buyer.party()).await.unwrap();

    let (ra, rb) = tokio::join!(
        seller_a.sell(a.descriptor_id, buyer.party(), "USD"),
        seller_b.sell(b.descriptor_id, buyer.party(), "USD"),
    );
    assert!(ra.is_ok() ^ rb.is_ok(), "exactly one sale wins: {ra:?} / {rb:?}");
    let loser = if ra.is_ok() { rb } else { ra };
    assert!(
        matches!(loser, Err(SwaplineError::SessionAborted { ref reason }) if reason.contains("SL_ERR_400")),
        "got {loser:?}"
    );

    let first = outcome(&buyer).await;
    let second = outcome(&buyer).await;
    let failures: Vec<_> = [first.result, second.result]
        .into_iter()
        .filter_map(Result::err)
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], SwaplineError::InsufficientFunds { .. }));

    assert_eq!(market.payments_of(buyer.party()).await, Vec::<u64>::new());
    assert!(buyer.locks().is_empty());
    assert!(seller_a.locks().is_empty());
    assert!(seller_b.locks().is_empty());
}

// =========================================================================
// Aborts leave nothing behind
// =========================================================================

#[tokio::test]
async fn aborted_exchange_leaves_ledger_and_locks_untouched() {
    let scene = Scene::new(500).await;
    let before = scene.market.ledger.snapshot();

    let err = scene
        .seller
        .sell(scene.descriptor_id, scene.buyer.party(), "USD")
        .await
        .unwrap_err();
    assert!(
        matches!(err, SwaplineError::SessionAborted { ref reason } if reason.contains("SL_ERR_400")),
        "got {err}"
    );
    let bought = outcome(&scene.buyer).await;
    assert!(matches!(
        bought.result,
        Err(SwaplineError::InsufficientFunds {
            needed: 1000,
            available: 500,
            ..
        })
    ));

    assert_eq!(scene.market.ledger.snapshot(), before);
    assert!(scene.seller.locks().is_empty());
    assert!(scene.buyer.locks().is_empty());

    // Nothing stayed reserved, so a funded retry goes through.
    scene
        .bank
        .issue_payment(600, "USD", scene.buyer.party())
        .await
        .unwrap();
    scene
        .seller
        .sell(scene.descriptor_id, scene.buyer.party(), "USD")
        .await
        .unwrap();
    assert_eq!(scene.market.payments_of(scene.buyer.party()).await, vec![100]);
}

#[tokio::test]
async fn silent_buyer_times_out_and_releases_token() {
    let market = Market::new();
    let issuer = market.node("Issuer");
    let _bank = market.node(constants::DEFAULT_CURRENCY_ISSUER);
    let mut seller_config = config("Seller");
    seller_config.session.timeout_ms = 100;
    let seller = market.node_with(seller_config);
    let buyer = market.idle_node(config("Buyer"));

    let issued = issuer
        .create_and_issue(excavator(), seller.party())
        .await
        .unwrap();
    let before = market.ledger.snapshot();

    let err = seller
        .sell(issued.descriptor_id, buyer.party(), "USD")
        .await
        .unwrap_err();
    assert!(matches!(err, SwaplineError::CounterpartyTimeout { .. }), "got {err}");
    assert!(seller.locks().is_empty());
    assert_eq!(market.ledger.snapshot(), before);
}

#[tokio::test]
async fn unknown_buyer_is_peer_not_found() {
    let scene = Scene::new(0).await;
    let ghost = Party::dummy("Ghost");
    let err = scene
        .seller
        .sell(scene.descriptor_id, &ghost, "USD")
        .await
        .unwrap_err();
    assert!(matches!(err, SwaplineError::PeerNotFound(_)));
    assert!(scene.seller.locks().is_empty());
}

// =========================================================================
// Protocol checks against a dishonest counterparty
// =========================================================================

#[tokio::test]
async fn buyer_rejects_token_for_another_descriptor() {
    let market = Market::new();
    let issuer = market.node("Issuer");
    let bank = market.node(constants::DEFAULT_CURRENCY_ISSUER);
    let buyer = market.node("Buyer");
    let (mallory, _inbox) = market.impostor("Mallory");

    let cheap = issuer.create_and_issue(excavator(), &mallory).await.unwrap();
    let (pricey, _) = issuer
        .create_descriptor(CreateDescriptor::new("Crane LTM-1100", 2021, "B-2", usd(1000), 3))
        .await
        .unwrap();
    bank.issue_payment(1000, "USD", buyer.party()).await.unwrap();

    let descriptor = market.descriptor(pricey).await;
    let token = market
        .unconsumed(&QueryCriteria::ownership().pointing_at(cheap.descriptor_id))
        .await;

    let mut session = market
        .network
        .open(&mallory, buyer.party(), SessionKind::Purchase)
        .await
        .unwrap();
    session
        .send(FlowMessage::DescriptorRefs(vec![descriptor]))
        .await
        .unwrap();
    session.send(FlowMessage::OwnedTokenRefs(token)).await.unwrap();

    let bought = outcome(&buyer).await;
    assert!(
        matches!(bought.result, Err(SwaplineError::MismatchedReference { .. })),
        "got {:?}",
        bought.result
    );
    let err = session.receive(MessageKind::IssuedCurrency).await.unwrap_err();
    assert!(matches!(err, SwaplineError::SessionAborted { ref reason } if reason.contains("SL_ERR_300")));
    assert!(buyer.locks().is_empty());
}

#[tokio::test]
async fn seller_rejects_payment_with_its_own_records() {
    let scene = Scene::new(0).await;
    scene
        .bank
        .issue_payment(1000, "USD", scene.seller.party())
        .await
        .unwrap();
    let (mallory, mut inbox) = scene.market.impostor("Mallory");
    let before = scene.market.ledger.snapshot();

    let seller = Arc::clone(&scene.seller);
    let descriptor_id = scene.descriptor_id;
    let buyer = mallory.clone();
    let sale = tokio::spawn(async move { seller.sell(descriptor_id, &buyer, "USD").await });

    let mut session = inbox.recv().await.expect("purchase session").session;
    session.receive(MessageKind::DescriptorRefs).await.unwrap();
    session.receive(MessageKind::OwnedTokenRefs).await.unwrap();
    session.receive(MessageKind::IssuedCurrency).await.unwrap();
    let sellers_cash = scene
        .market
        .unconsumed(&QueryCriteria::payments().held_by(scene.seller.party()))
        .await;
    session
        .send(FlowMessage::PaymentInputs(sellers_cash))
        .await
        .unwrap();

    let err = sale.await.expect("sale task").unwrap_err();
    assert_eq!(err, SwaplineError::SelfPaymentDetected { count: 1 });
    assert_eq!(scene.market.ledger.snapshot(), before);
    assert!(scene.seller.locks().is_empty());
}

// =========================================================================
// Issuance surface & distribution
// =========================================================================

#[tokio::test]
async fn issue_by_name_resolves_exactly_one_descriptor() {
    let market = Market::new();
    let issuer = market.node("Issuer");
    let holder = market.node("Holder");

    issuer.create_descriptor(excavator()).await.unwrap();
    let (token_id, _) = issuer
        .issue_ownership_token_by_name("Excavator CAT-320", holder.party())
        .await
        .unwrap();
    let tokens = market
        .unconsumed(&QueryCriteria::ownership().held_by(holder.party()))
        .await;
    assert_eq!(tokens[0].state.as_ownership().unwrap().token_id, token_id);

    let err = issuer
        .issue_ownership_token_by_name("Bulldozer", holder.party())
        .await
        .unwrap_err();
    assert!(matches!(err, SwaplineError::NotFound { .. }));

    issuer.create_descriptor(excavator()).await.unwrap();
    let err = issuer
        .issue_ownership_token_by_name("Excavator CAT-320", holder.party())
        .await
        .unwrap_err();
    assert!(matches!(err, SwaplineError::AmbiguousMatch { count: 2, .. }));
}

#[tokio::test]
async fn only_maintainers_issue_tokens() {
    let market = Market::new();
    let issuer = market.node("Issuer");
    let stranger = market.node("Stranger");
    let (linear_id, _) = issuer.create_descriptor(excavator()).await.unwrap();

    let err = stranger
        .issue_ownership_token(linear_id, stranger.party())
        .await
        .unwrap_err();
    assert!(matches!(err, SwaplineError::UnauthorizedIssuance { .. }));
    assert!(
        market
            .unconsumed(&QueryCriteria::ownership())
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn update_is_broadcast_to_every_holder() {
    let scene = Scene::new(1200).await;
    assert_eq!(
        scene.issuer.distribution_list(&scene.descriptor_id),
        vec![scene.seller.party().clone()]
    );

    scene
        .seller
        .sell(scene.descriptor_id, scene.buyer.party(), "USD")
        .await
        .unwrap();
    let issuer = Arc::clone(&scene.issuer);
    let id = scene.descriptor_id;
    let buyer = scene.buyer.party().clone();
    assert!(
        eventually(|| issuer.distribution_list(&id).contains(&buyer)).await,
        "issuer learns the new holder"
    );

    scene
        .issuer
        .update_descriptor(scene.descriptor_id, usd(900), 3)
        .await
        .unwrap();
    let current = scene.market.descriptor(scene.descriptor_id).await;

    for holder in [&scene.buyer, &scene.seller] {
        let holder = Arc::clone(holder);
        assert!(
            eventually(|| holder.observed_descriptor(&id).as_ref() == Some(&current)).await,
            "{} observes the new version",
            holder.party()
        );
    }
    let seen = scene.buyer.observed_descriptor(&id).unwrap();
    assert_eq!(
        seen.state.as_descriptor().unwrap().resale_valuation,
        usd(900)
    );
}
