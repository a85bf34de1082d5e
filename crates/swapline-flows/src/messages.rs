//! Messages exchanged between nodes over a [`Session`](crate::Session).

use std::fmt;

use serde::{Deserialize, Serialize};
use swapline_ledger::Notarised;
use swapline_types::{
    IssuedCurrency, LinearId, Party, PaymentRecord, SignedTransaction, StateAndRef,
    TransactionSignature,
};

/// What the initiator of a session wants from the responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
    /// Seller → buyer: run the buyer role.
    Purchase,
    /// Seller → maintainer: a token changed hands.
    Distribution,
    /// Maintainer → holder: a descriptor has a new version.
    DescriptorBroadcast,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Purchase => write!(f, "PURCHASE"),
            Self::Distribution => write!(f, "DISTRIBUTION"),
            Self::DescriptorBroadcast => write!(f, "DESCRIPTOR_BROADCAST"),
        }
    }
}

/// One payload on a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowMessage {
    DescriptorRefs(Vec<StateAndRef>),
    OwnedTokenRefs(Vec<StateAndRef>),
    IssuedCurrency(IssuedCurrency),
    PaymentInputs(Vec<StateAndRef>),
    PaymentOutputs(Vec<PaymentRecord>),
    ProposedTransaction(SignedTransaction),
    Signature(TransactionSignature),
    Finalized(Notarised),
    DistributionUpdate {
        descriptor_id: LinearId,
        holder: Party,
    },
    DescriptorUpdated(StateAndRef),
    /// The sender gave up. Always the last message on a session.
    Abort { reason: String },
}

impl FlowMessage {
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::DescriptorRefs(_) => MessageKind::DescriptorRefs,
            Self::OwnedTokenRefs(_) => MessageKind::OwnedTokenRefs,
            Self::IssuedCurrency(_) => MessageKind::IssuedCurrency,
            Self::PaymentInputs(_) => MessageKind::PaymentInputs,
            Self::PaymentOutputs(_) => MessageKind::PaymentOutputs,
            Self::ProposedTransaction(_) => MessageKind::ProposedTransaction,
            Self::Signature(_) => MessageKind::Signature,
            Self::Finalized(_) => MessageKind::Finalized,
            Self::DistributionUpdate { .. } => MessageKind::DistributionUpdate,
            Self::DescriptorUpdated(_) => MessageKind::DescriptorUpdated,
            Self::Abort { .. } => MessageKind::Abort,
        }
    }
}

/// Discriminant of [`FlowMessage`], passed to `receive` to say what the
/// protocol expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    DescriptorRefs,
    OwnedTokenRefs,
    IssuedCurrency,
    PaymentInputs,
    PaymentOutputs,
    ProposedTransaction,
    Signature,
    Finalized,
    DistributionUpdate,
    DescriptorUpdated,
    Abort,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DescriptorRefs => "DESCRIPTOR_REFS",
            Self::OwnedTokenRefs => "OWNED_TOKEN_REFS",
            Self::IssuedCurrency => "ISSUED_CURRENCY",
            Self::PaymentInputs => "PAYMENT_INPUTS",
            Self::PaymentOutputs => "PAYMENT_OUTPUTS",
            Self::ProposedTransaction => "PROPOSED_TRANSACTION",
            Self::Signature => "SIGNATURE",
            Self::Finalized => "FINALIZED",
            Self::DistributionUpdate => "DISTRIBUTION_UPDATE",
            Self::DescriptorUpdated => "DESCRIPTOR_UPDATED",
            Self::Abort => "ABORT",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapline_types::{Currency, LinearId};

    #[test]
    fn kind_matches_variant() {
        let msg = FlowMessage::Abort {
            reason: "no".into(),
        };
        assert_eq!(msg.kind(), MessageKind::Abort);
        let msg = FlowMessage::IssuedCurrency(IssuedCurrency::new(
            Currency::fiat("USD"),
            Party::dummy("Bank"),
        ));
        assert_eq!(msg.kind(), MessageKind::IssuedCurrency);
        assert_eq!(msg.kind().to_string(), "ISSUED_CURRENCY");
    }

    #[test]
    fn messages_serialize_as_json() {
        let msg = FlowMessage::DistributionUpdate {
            descriptor_id: LinearId::new(),
            holder: Party::dummy("Buyer"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: FlowMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
