//! Seller role of the exchange.
//!
//! ```text
//! LookupDescriptor → LookupOwnedToken → OpenSession
//!   → SendDescriptorRef → SendOwnedTokenRef → SendCurrencyType
//!   → BuildTransfer
//!   → ReceivePaymentInputs → ValidateNotSelfFunded
//!   → ReceivePaymentOutputs → ValidatePriceMet
//!   → MergePaymentMove → Sign → CollectCountersignature
//!   → Finalize → NotifyObservers → Done
//! ```
//!
//! The seller's ownership token is soft-locked for the whole run. Any
//! failure before finality aborts the buyer and releases the lock, leaving
//! the ledger untouched.

use std::fmt;

use swapline_contract::{VerificationContext, verify_transaction};
use swapline_types::{
    Amount, CommandKind, IssuedCurrency, LedgerState, LinearId, LockId, OwnershipToken, Party,
    Result, SignedTransaction, StateAndRef, SwaplineError, TokenCommand, TransactionBuilder, TxId,
};
use swapline_vault::{QueryCriteria, find_exactly_one};
use tracing::Instrument;

use crate::messages::{FlowMessage, MessageKind, SessionKind};
use crate::network::{Session, unexpected};
use crate::node::Node;

/// Steps of the seller role, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SellerStep {
    LookupDescriptor,
    LookupOwnedToken,
    OpenSession,
    SendDescriptorRef,
    SendOwnedTokenRef,
    SendCurrencyType,
    BuildTransfer,
    ReceivePaymentInputs,
    ValidateNotSelfFunded,
    ReceivePaymentOutputs,
    ValidatePriceMet,
    MergePaymentMove,
    Sign,
    CollectCountersignature,
    Finalize,
    NotifyObservers,
    Done,
}

impl fmt::Display for SellerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LookupDescriptor => "LOOKUP_DESCRIPTOR",
            Self::LookupOwnedToken => "LOOKUP_OWNED_TOKEN",
            Self::OpenSession => "OPEN_SESSION",
            Self::SendDescriptorRef => "SEND_DESCRIPTOR_REF",
            Self::SendOwnedTokenRef => "SEND_OWNED_TOKEN_REF",
            Self::SendCurrencyType => "SEND_CURRENCY_TYPE",
            Self::BuildTransfer => "BUILD_TRANSFER",
            Self::ReceivePaymentInputs => "RECEIVE_PAYMENT_INPUTS",
            Self::ValidateNotSelfFunded => "VALIDATE_NOT_SELF_FUNDED",
            Self::ReceivePaymentOutputs => "RECEIVE_PAYMENT_OUTPUTS",
            Self::ValidatePriceMet => "VALIDATE_PRICE_MET",
            Self::MergePaymentMove => "MERGE_PAYMENT_MOVE",
            Self::Sign => "SIGN",
            Self::CollectCountersignature => "COLLECT_COUNTERSIGNATURE",
            Self::Finalize => "FINALIZE",
            Self::NotifyObservers => "NOTIFY_OBSERVERS",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// A completed sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleReceipt {
    pub tx_id: TxId,
    /// Paid to the seller.
    pub price: Amount,
}

fn step(s: SellerStep) {
    tracing::debug!(step = %s, "Seller step");
}

/// Check no payment input offered by the buyer is already the seller's.
pub(crate) fn check_not_self_funded(inputs: &[StateAndRef], seller: &Party) -> Result<()> {
    let count = inputs
        .iter()
        .filter(|s| s.state.holder() == Some(seller))
        .count();
    if count > 0 {
        return Err(SwaplineError::SelfPaymentDetected { count });
    }
    Ok(())
}

/// Sum of `outputs` paying `seller` in `token`, checked against `price`.
pub(crate) fn check_price_met(
    outputs: &[LedgerState],
    seller: &Party,
    token: &IssuedCurrency,
    price: u64,
) -> Result<u64> {
    let paid: u64 = outputs
        .iter()
        .filter_map(LedgerState::as_payment)
        .filter(|p| p.holder == *seller && p.token == *token)
        .map(|p| p.quantity)
        .fold(0u64, u64::saturating_add);
    if paid < price {
        return Err(SwaplineError::PriceNotMet {
            paid,
            price,
            currency: token.currency.code.clone(),
        });
    }
    Ok(paid)
}

impl Node {
    /// Sell the token this node holds for `descriptor_id` to `buyer`, paid
    /// in `currency_code` issued by the configured currency issuer.
    pub async fn sell(
        &self,
        descriptor_id: LinearId,
        buyer: &Party,
        currency_code: &str,
    ) -> Result<SaleReceipt> {
        let lock_id = LockId::new();
        let span = tracing::info_span!(
            "seller",
            party = %self.party(),
            buyer = %buyer,
            linear_id = %descriptor_id,
            lock_id = %lock_id,
        );
        async {
            let result = self
                .run_seller(lock_id, descriptor_id, buyer, currency_code)
                .await;
            match &result {
                Ok(receipt) => {
                    tracing::info!(tx_id = %receipt.tx_id, price = %receipt.price, "Sale completed");
                }
                Err(e) => {
                    let released = self.locks().release(lock_id);
                    tracing::warn!(error = %e, released, "Sale aborted");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_seller(
        &self,
        lock_id: LockId,
        descriptor_id: LinearId,
        buyer: &Party,
        currency_code: &str,
    ) -> Result<SaleReceipt> {
        step(SellerStep::LookupDescriptor);
        let descriptor_ref = find_exactly_one(
            self.vault(),
            &QueryCriteria::descriptors().linear_id(descriptor_id),
            &format!("descriptor {descriptor_id}"),
        )
        .await?;
        let descriptor = descriptor_ref
            .state
            .as_descriptor()
            .cloned()
            .ok_or_else(|| SwaplineError::Internal("descriptor query returned another kind".into()))?;
        let token = self.currency(currency_code)?;
        if descriptor.valuation.currency.code != token.currency.code {
            return Err(SwaplineError::ValidationRejected {
                reason: format!(
                    "descriptor {descriptor_id} is priced in {}, not {}",
                    descriptor.valuation.currency, token.currency
                ),
            });
        }

        step(SellerStep::LookupOwnedToken);
        let owned = find_exactly_one(
            self.vault(),
            &QueryCriteria::ownership()
                .pointing_at(descriptor_id)
                .held_by(self.party()),
            &format!("ownership token for {descriptor_id} held by {}", self.party()),
        )
        .await?;
        self.selector().reserve_one(lock_id, &owned).await?;
        let ownership = owned
            .state
            .as_ownership()
            .cloned()
            .ok_or_else(|| SwaplineError::Internal("ownership query returned another kind".into()))?;

        step(SellerStep::OpenSession);
        let mut session = self
            .network()
            .open(self.party(), buyer, SessionKind::Purchase)
            .await?;
        let exchanged = self
            .exchange_with_buyer(
                &mut session,
                descriptor_ref,
                owned,
                ownership.with_holder(buyer.clone()),
                &token,
                descriptor.valuation.quantity,
            )
            .await;
        let (stx, paid) = match exchanged {
            Ok(done) => done,
            Err(e) => {
                session.abort(&e.to_string());
                return Err(e);
            }
        };

        step(SellerStep::Finalize);
        let notarised = match self.submit(stx).await {
            Ok(n) => n,
            Err(e) => {
                session.abort(&e.to_string());
                return Err(e);
            }
        };
        self.locks().mark_spent(lock_id);
        if let Err(e) = session.send(FlowMessage::Finalized(notarised.clone())).await {
            tracing::warn!(tx_id = %notarised.tx_id, error = %e, "Buyer not told of finality");
        }

        step(SellerStep::NotifyObservers);
        for maintainer in &descriptor.maintainers {
            if maintainer == self.party() {
                self.record_holder(descriptor_id, buyer.clone());
                continue;
            }
            let sent = async {
                let observer = self
                    .network()
                    .open(self.party(), maintainer, SessionKind::Distribution)
                    .await?;
                observer
                    .send(FlowMessage::DistributionUpdate {
                        descriptor_id,
                        holder: buyer.clone(),
                    })
                    .await
            };
            if let Err(e) = sent.await {
                tracing::warn!(maintainer = %maintainer, error = %e, "Distribution update not delivered");
            }
        }

        step(SellerStep::Done);
        Ok(SaleReceipt {
            tx_id: notarised.tx_id,
            price: Amount::new(paid, token.currency.clone()),
        })
    }

    /// Everything between opening the session and holding a transaction
    /// signed by both parties.
    async fn exchange_with_buyer(
        &self,
        session: &mut Session,
        descriptor_ref: StateAndRef,
        owned: StateAndRef,
        transferred: OwnershipToken,
        token: &IssuedCurrency,
        price: u64,
    ) -> Result<(SignedTransaction, u64)> {
        step(SellerStep::SendDescriptorRef);
        session
            .send(FlowMessage::DescriptorRefs(vec![descriptor_ref.clone()]))
            .await?;
        step(SellerStep::SendOwnedTokenRef);
        session
            .send(FlowMessage::OwnedTokenRefs(vec![owned.clone()]))
            .await?;
        step(SellerStep::SendCurrencyType);
        session
            .send(FlowMessage::IssuedCurrency(token.clone()))
            .await?;

        step(SellerStep::BuildTransfer);
        let mut builder = TransactionBuilder::new();
        builder
            .add_reference(descriptor_ref)
            .add_input(owned)
            .add_output(LedgerState::Ownership(transferred))
            .add_command(CommandKind::Token(TokenCommand::Move), [self.party().key]);

        step(SellerStep::ReceivePaymentInputs);
        let inputs = match session.receive(MessageKind::PaymentInputs).await? {
            FlowMessage::PaymentInputs(inputs) => inputs,
            other => return Err(unexpected(MessageKind::PaymentInputs, &other)),
        };
        step(SellerStep::ValidateNotSelfFunded);
        check_not_self_funded(&inputs, self.party())?;

        step(SellerStep::ReceivePaymentOutputs);
        let outputs: Vec<LedgerState> = match session.receive(MessageKind::PaymentOutputs).await? {
            FlowMessage::PaymentOutputs(outputs) => {
                outputs.into_iter().map(LedgerState::Payment).collect()
            }
            other => return Err(unexpected(MessageKind::PaymentOutputs, &other)),
        };
        step(SellerStep::ValidatePriceMet);
        let paid = check_price_met(&outputs, self.party(), token, price)?;

        step(SellerStep::MergePaymentMove);
        let payers: Vec<_> = inputs
            .iter()
            .filter_map(|s| s.state.holder().map(|p| p.key))
            .collect();
        for input in inputs {
            builder.add_input(input);
        }
        for output in outputs {
            builder.add_output(output);
        }
        builder.add_command(CommandKind::Token(TokenCommand::Move), payers);

        step(SellerStep::Sign);
        let tx = builder.to_wire();
        verify_transaction(&tx, &VerificationContext::now())?;
        let stx = self.sign(tx)?;
        let tx_id = stx.id()?;
        session
            .send(FlowMessage::ProposedTransaction(stx.clone()))
            .await?;

        step(SellerStep::CollectCountersignature);
        let signature = match session.receive(MessageKind::Signature).await? {
            FlowMessage::Signature(sig) => sig,
            other => return Err(unexpected(MessageKind::Signature, &other)),
        };
        if signature.by != session.peer().key || !signature.verify(&tx_id) {
            return Err(SwaplineError::InvalidSignature {
                signer: signature.by.to_string(),
            });
        }
        let stx = stx.with_signature(signature);
        stx.verify_complete()?;
        tracing::debug!(tx_id = %tx_id, "Countersignature collected");
        Ok((stx, paid))
    }
}
