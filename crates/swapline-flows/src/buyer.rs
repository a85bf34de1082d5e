//! Buyer role of the exchange, run by the responder loop for every
//! `Purchase` session.
//!
//! ```text
//! ReceiveDescriptorRef → ReceiveOwnedTokenRef → ValidateRefsMatch
//!   → ReceiveCurrencyType → SelectPayment
//!   → SendPaymentInputs → SendPaymentOutputs
//!   → Countersign → ReceiveFinalized → Done
//! ```
//!
//! Payment records are reserved from `SelectPayment` on. A failure at any
//! later step releases them; finality marks them spent.

use std::fmt;

use swapline_contract::{VerificationContext, verify_transaction};
use swapline_types::{
    AssetDescriptor, IssuedCurrency, LedgerState, LockId, OwnershipToken, Party, Result,
    SignedTransaction, StateAndRef, SwaplineError, TxId,
};
use swapline_vault::Selection;
use tracing::Instrument;

use crate::messages::{FlowMessage, MessageKind};
use crate::network::{Session, unexpected};
use crate::node::Node;

/// Steps of the buyer role, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuyerStep {
    ReceiveDescriptorRef,
    ReceiveOwnedTokenRef,
    ValidateRefsMatch,
    ReceiveCurrencyType,
    SelectPayment,
    SendPaymentInputs,
    SendPaymentOutputs,
    Countersign,
    ReceiveFinalized,
    Done,
}

impl fmt::Display for BuyerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReceiveDescriptorRef => "RECEIVE_DESCRIPTOR_REF",
            Self::ReceiveOwnedTokenRef => "RECEIVE_OWNED_TOKEN_REF",
            Self::ValidateRefsMatch => "VALIDATE_REFS_MATCH",
            Self::ReceiveCurrencyType => "RECEIVE_CURRENCY_TYPE",
            Self::SelectPayment => "SELECT_PAYMENT",
            Self::SendPaymentInputs => "SEND_PAYMENT_INPUTS",
            Self::SendPaymentOutputs => "SEND_PAYMENT_OUTPUTS",
            Self::Countersign => "COUNTERSIGN",
            Self::ReceiveFinalized => "RECEIVE_FINALIZED",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

fn step(s: BuyerStep) {
    tracing::debug!(step = %s, "Buyer step");
}

/// The single state in a received batch.
fn exactly_one(mut states: Vec<StateAndRef>, what: &str) -> Result<StateAndRef> {
    match states.len() {
        1 => states.pop().ok_or_else(|| SwaplineError::Internal("empty batch".into())),
        n => Err(SwaplineError::ValidationRejected {
            reason: format!("expected exactly one {what}, received {n}"),
        }),
    }
}

/// The token must point at the descriptor it is sold with.
pub(crate) fn check_refs_match(token: &OwnershipToken, descriptor: &AssetDescriptor) -> Result<()> {
    if token.descriptor_id != descriptor.linear_id {
        return Err(SwaplineError::MismatchedReference {
            token_points_at: token.descriptor_id.to_string(),
            descriptor: descriptor.linear_id.to_string(),
        });
    }
    Ok(())
}

/// The quoted currency must be the one the resale valuation is in.
pub(crate) fn check_currency(currency: &IssuedCurrency, descriptor: &AssetDescriptor) -> Result<()> {
    let expected = &descriptor.resale_valuation.currency;
    if currency.currency.code != expected.code {
        return Err(SwaplineError::ValidationRejected {
            reason: format!(
                "seller quotes {}, descriptor {} is priced in {expected}",
                currency.currency, descriptor.linear_id
            ),
        });
    }
    Ok(())
}

/// The proposal must hand us the token and spend no record of ours we did
/// not offer.
fn check_proposal(
    stx: &SignedTransaction,
    me: &Party,
    token: &OwnershipToken,
    selection: &Selection,
) -> Result<()> {
    let receives_token = stx.tx.outputs.iter().any(|s| {
        s.as_ownership()
            .is_some_and(|o| o.token_id == token.token_id && o.holder == *me)
    });
    if !receives_token {
        return Err(SwaplineError::ValidationRejected {
            reason: format!("proposal does not transfer token {} to {me}", token.token_id),
        });
    }
    let offered: Vec<_> = selection.inputs.iter().map(|s| s.state_ref).collect();
    let unoffered = stx
        .tx
        .inputs
        .iter()
        .filter(|s| s.state.holder() == Some(me) && !offered.contains(&s.state_ref))
        .count();
    if unoffered > 0 {
        return Err(SwaplineError::ValidationRejected {
            reason: format!("proposal spends {unoffered} record(s) of ours that were not offered"),
        });
    }
    let missing = selection
        .outputs
        .iter()
        .filter(|p| !stx.tx.outputs.contains(&LedgerState::Payment((*p).clone())))
        .count();
    if missing > 0 {
        return Err(SwaplineError::ValidationRejected {
            reason: format!("proposal drops {missing} of our payment output(s)"),
        });
    }
    Ok(())
}

impl Node {
    /// Answer one purchase. Reservations are released on any failure and
    /// the seller is told why.
    pub(crate) async fn run_buyer(&self, session: &mut Session) -> Result<TxId> {
        let lock_id = LockId::new();
        let span = tracing::info_span!(
            "buyer",
            party = %self.party(),
            seller = %session.peer(),
            session = %session.id(),
            lock_id = %lock_id,
        );
        async {
            let result = self.buy(session, lock_id).await;
            match &result {
                Ok(tx_id) => tracing::info!(tx_id = %tx_id, "Purchase completed"),
                Err(e) => {
                    let released = self.locks().release(lock_id);
                    session.abort(&e.to_string());
                    tracing::warn!(error = %e, released, "Purchase aborted");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn buy(&self, session: &mut Session, lock_id: LockId) -> Result<TxId> {
        step(BuyerStep::ReceiveDescriptorRef);
        let descriptor_ref = match session.receive(MessageKind::DescriptorRefs).await? {
            FlowMessage::DescriptorRefs(refs) => exactly_one(refs, "descriptor reference")?,
            other => return Err(unexpected(MessageKind::DescriptorRefs, &other)),
        };
        let descriptor = descriptor_ref
            .state
            .as_descriptor()
            .ok_or_else(|| SwaplineError::ValidationRejected {
                reason: format!("{} is not a descriptor", descriptor_ref.state_ref),
            })?;

        step(BuyerStep::ReceiveOwnedTokenRef);
        let token_ref = match session.receive(MessageKind::OwnedTokenRefs).await? {
            FlowMessage::OwnedTokenRefs(refs) => exactly_one(refs, "ownership token reference")?,
            other => return Err(unexpected(MessageKind::OwnedTokenRefs, &other)),
        };
        let token = token_ref
            .state
            .as_ownership()
            .ok_or_else(|| SwaplineError::ValidationRejected {
                reason: format!("{} is not an ownership token", token_ref.state_ref),
            })?;

        step(BuyerStep::ValidateRefsMatch);
        check_refs_match(token, descriptor)?;

        step(BuyerStep::ReceiveCurrencyType);
        let currency: IssuedCurrency = match session.receive(MessageKind::IssuedCurrency).await? {
            FlowMessage::IssuedCurrency(c) => c,
            other => return Err(unexpected(MessageKind::IssuedCurrency, &other)),
        };
        check_currency(&currency, descriptor)?;

        step(BuyerStep::SelectPayment);
        let selection = self
            .selector()
            .select(
                lock_id,
                session.peer(),
                descriptor.resale_valuation.quantity,
                &currency,
                self.party(),
            )
            .await?;

        step(BuyerStep::SendPaymentInputs);
        session
            .send(FlowMessage::PaymentInputs(selection.inputs.clone()))
            .await?;
        step(BuyerStep::SendPaymentOutputs);
        session
            .send(FlowMessage::PaymentOutputs(selection.outputs.clone()))
            .await?;

        step(BuyerStep::Countersign);
        let stx = match session.receive(MessageKind::ProposedTransaction).await? {
            FlowMessage::ProposedTransaction(stx) => stx,
            other => return Err(unexpected(MessageKind::ProposedTransaction, &other)),
        };
        let tx_id = stx.id()?;
        stx.verify_signatures()?;
        verify_transaction(&stx.tx, &VerificationContext::now())?;
        check_proposal(&stx, self.party(), token, &selection)?;
        session
            .send(FlowMessage::Signature(self.signature_for(&tx_id)))
            .await?;

        step(BuyerStep::ReceiveFinalized);
        let notarised = match session.receive(MessageKind::Finalized).await? {
            FlowMessage::Finalized(n) => n,
            other => return Err(unexpected(MessageKind::Finalized, &other)),
        };
        if notarised.tx_id != tx_id {
            return Err(SwaplineError::ValidationRejected {
                reason: format!(
                    "finalized {} but countersigned {}",
                    notarised.tx_id.short(),
                    tx_id.short()
                ),
            });
        }
        let spent = self.locks().mark_spent(lock_id);
        tracing::debug!(tx_id = %tx_id, spent, "Payment records spent");

        step(BuyerStep::Done);
        Ok(tx_id)
    }
}
