//! Error types for the Swapline exchange.
//!
//! All errors use the `SL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation engine rejections
//! - 2xx: Lookup cardinality errors
//! - 3xx: Exchange protocol checks
//! - 4xx: Resource selection / reservation errors
//! - 5xx: Peer session errors
//! - 6xx: Consensus / signature errors
//! - 9xx: General / internal errors
//!
//! Every variant is fatal to the exchange instance that raised it except
//! [`SwaplineError::SelectionContention`], which the selector retries
//! internally before surfacing.

use thiserror::Error;

/// Central error enum for all Swapline operations.
///
/// `Clone` so a failure can be both returned locally and forwarded to the
/// counterparty as an abort reason.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwaplineError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A validation rule rejected the proposed transaction.
    #[error("SL_ERR_100: Validation rejected: {reason}")]
    ValidationRejected { reason: String },

    /// The descriptor's issuer did not sign its creation.
    #[error("SL_ERR_101: Unauthorized issuance: {reason}")]
    UnauthorizedIssuance { reason: String },

    /// The descriptor update was not authorized.
    #[error("SL_ERR_102: Unauthorized update: {reason}")]
    UnauthorizedUpdate { reason: String },

    // =================================================================
    // Lookup Errors (2xx)
    // =================================================================
    /// Nothing matched a lookup that needs exactly one result.
    #[error("SL_ERR_200: Not found: {what}")]
    NotFound { what: String },

    /// More than one record matched a lookup that needs exactly one.
    #[error("SL_ERR_201: Ambiguous match: {count} records for {what}")]
    AmbiguousMatch { what: String, count: usize },

    // =================================================================
    // Exchange Errors (3xx)
    // =================================================================
    /// The owned token sent by the seller points at a different descriptor.
    #[error("SL_ERR_300: Mismatched reference: token points at {token_points_at}, descriptor is {descriptor}")]
    MismatchedReference {
        token_points_at: String,
        descriptor: String,
    },

    /// The buyer offered payment inputs the seller already holds.
    #[error("SL_ERR_301: Self-payment detected: buyer sent {count} of our own record(s)")]
    SelfPaymentDetected { count: usize },

    /// Payment to the seller is below the descriptor's valuation.
    #[error("SL_ERR_302: Price not met: paid {paid} instead of {price} {currency}")]
    PriceNotMet {
        paid: u64,
        price: u64,
        currency: String,
    },

    // =================================================================
    // Selection Errors (4xx)
    // =================================================================
    /// The holder's unconsumed balance cannot cover the target.
    #[error("SL_ERR_400: Insufficient funds: need {needed}, have {available} {currency}")]
    InsufficientFunds {
        needed: u64,
        available: u64,
        currency: String,
    },

    /// Funds exist but stayed reserved by concurrent runs through every retry.
    #[error("SL_ERR_401: Selection contention: gave up after {attempts} attempt(s)")]
    SelectionContention { attempts: u32 },

    /// A reservation operation was applied to a record in the wrong state.
    #[error("SL_ERR_402: Invalid reservation: {reason}")]
    InvalidReservation { reason: String },

    // =================================================================
    // Session Errors (5xx)
    // =================================================================
    /// The counterparty did not answer within the session timeout.
    #[error("SL_ERR_500: Counterparty {peer} timed out waiting for {waiting_for}")]
    CounterpartyTimeout { peer: String, waiting_for: String },

    /// The counterparty aborted or hung up.
    #[error("SL_ERR_501: Session aborted: {reason}")]
    SessionAborted { reason: String },

    /// A message of the wrong kind arrived.
    #[error("SL_ERR_502: Unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage { expected: String, actual: String },

    /// No such peer is registered on the network.
    #[error("SL_ERR_503: Peer not found: {0}")]
    PeerNotFound(String),

    // =================================================================
    // Consensus Errors (6xx)
    // =================================================================
    /// The consensus service refused to commit the transaction.
    #[error("SL_ERR_600: Consensus rejected: {reason}")]
    ConsensusRejected { reason: String },

    /// A signature did not verify against the transaction id.
    #[error("SL_ERR_601: Invalid signature by {signer}")]
    InvalidSignature { signer: String },

    /// Required signers have not signed.
    #[error("SL_ERR_602: Missing signatures from {missing}")]
    MissingSignatures { missing: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SL_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("SL_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, bad env override, etc.).
    #[error("SL_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("SL_ERR_903: I/O error: {0}")]
    Io(String),
}

impl SwaplineError {
    /// Only contention is worth retrying; everything else aborts the exchange.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SelectionContention { .. })
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SwaplineError>;

impl From<std::io::Error> for SwaplineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SwaplineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_not_met_display() {
        let err = SwaplineError::PriceNotMet {
            paid: 800,
            price: 1000,
            currency: "USD".into(),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("SL_ERR_302"), "Got: {msg}");
        assert!(msg.contains("800"));
        assert!(msg.contains("1000"));
    }

    #[test]
    fn insufficient_funds_display() {
        let err = SwaplineError::InsufficientFunds {
            needed: 1000,
            available: 0,
            currency: "USD".into(),
        };
        assert!(format!("{err}").contains("SL_ERR_400"));
    }

    #[test]
    fn only_contention_is_retryable() {
        assert!(SwaplineError::SelectionContention { attempts: 3 }.is_retryable());
        assert!(
            !SwaplineError::InsufficientFunds {
                needed: 1,
                available: 0,
                currency: "USD".into()
            }
            .is_retryable()
        );
        assert!(!SwaplineError::Internal("x".into()).is_retryable());
    }

    #[test]
    fn all_errors_have_sl_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(SwaplineError::SelfPaymentDetected { count: 1 }),
            Box::new(SwaplineError::SessionAborted { reason: "r".into() }),
            Box::new(SwaplineError::PeerNotFound("Bob".into())),
            Box::new(SwaplineError::ConsensusRejected { reason: "r".into() }),
            Box::new(SwaplineError::AmbiguousMatch {
                what: "descriptor".into(),
                count: 2,
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("SL_ERR_"),
                "Error missing SL_ERR_ prefix: {msg}"
            );
        }
    }
}
