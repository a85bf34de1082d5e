//! Transactions: proposed ledger updates and their signatures.
//!
//! ```text
//!   TransactionBuilder ──to_wire()──▶ WireTransaction ──sign──▶ SignedTransaction
//!                                          │                       │
//!                                       id() = SHA-256          signatures over id
//! ```
//!
//! A transaction carries its inputs already resolved (`StateAndRef`), so the
//! validation engine can run on it without touching the ledger. The
//! consensus service is responsible for checking that every input and
//! reference really is the current, unconsumed state it claims to be.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    LedgerState, PartyKey, Result, StateAndRef, StateRef, SwaplineError, TransactionSignature,
    TxId,
};

/// Lifecycle actions on a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorCommand {
    Create,
    Update,
}

/// Lifecycle actions on ownership tokens and payment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenCommand {
    Issue,
    Move,
}

/// Closed set of commands a transaction can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    Descriptor(DescriptorCommand),
    Token(TokenCommand),
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Descriptor(DescriptorCommand::Create) => write!(f, "DESCRIPTOR_CREATE"),
            Self::Descriptor(DescriptorCommand::Update) => write!(f, "DESCRIPTOR_UPDATE"),
            Self::Token(TokenCommand::Issue) => write!(f, "TOKEN_ISSUE"),
            Self::Token(TokenCommand::Move) => write!(f, "TOKEN_MOVE"),
        }
    }
}

/// A command plus the keys that must sign for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub signers: Vec<PartyKey>,
}

impl Command {
    #[must_use]
    pub fn new(kind: CommandKind, signers: impl IntoIterator<Item = PartyKey>) -> Self {
        let mut command = Self {
            kind,
            signers: Vec::new(),
        };
        command.add_signers(signers);
        command
    }

    fn add_signers(&mut self, signers: impl IntoIterator<Item = PartyKey>) {
        for key in signers {
            if !self.signers.contains(&key) {
                self.signers.push(key);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WireTransaction
// ---------------------------------------------------------------------------

/// The unsigned body of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    /// States consumed by this transaction.
    pub inputs: Vec<StateAndRef>,
    /// States read but not consumed. They must be current at commit time.
    pub references: Vec<StateAndRef>,
    /// States produced by this transaction.
    pub outputs: Vec<LedgerState>,
    pub commands: Vec<Command>,
    pub created_at: DateTime<Utc>,
}

impl WireTransaction {
    /// SHA-256 over the canonical JSON encoding of the body.
    pub fn id(&self) -> Result<TxId> {
        let body =
            serde_json::to_vec(self).map_err(|e| SwaplineError::Serialization(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(crate::constants::TX_ID_DOMAIN);
        hasher.update(&body);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Ok(TxId(digest))
    }

    /// Union of every command's signers.
    #[must_use]
    pub fn required_signers(&self) -> BTreeSet<PartyKey> {
        self.commands
            .iter()
            .flat_map(|c| c.signers.iter().copied())
            .collect()
    }

    #[must_use]
    pub fn command(&self, kind: CommandKind) -> Option<&Command> {
        self.commands.iter().find(|c| c.kind == kind)
    }

    /// The `index`-th output as it will appear on the ledger once committed.
    pub fn out_ref(&self, index: usize) -> Result<StateAndRef> {
        let state = self
            .outputs
            .get(index)
            .cloned()
            .ok_or_else(|| SwaplineError::Internal(format!("no output at index {index}")))?;
        let index = u32::try_from(index)
            .map_err(|_| SwaplineError::Internal(format!("output index {index} overflows")))?;
        Ok(StateAndRef::new(state, StateRef::new(self.id()?, index)))
    }

    /// Every output resolved to its future ledger position.
    pub fn out_refs(&self) -> Result<Vec<StateAndRef>> {
        (0..self.outputs.len()).map(|i| self.out_ref(i)).collect()
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Incrementally assembles a [`WireTransaction`].
///
/// Adding a command whose kind is already present merges the signer sets
/// rather than declaring the command twice.
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    inputs: Vec<StateAndRef>,
    references: Vec<StateAndRef>,
    outputs: Vec<LedgerState>,
    commands: Vec<Command>,
}

impl TransactionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, state: StateAndRef) -> &mut Self {
        if !self.inputs.iter().any(|s| s.state_ref == state.state_ref) {
            self.inputs.push(state);
        }
        self
    }

    pub fn add_reference(&mut self, state: StateAndRef) -> &mut Self {
        if !self.references.iter().any(|s| s.state_ref == state.state_ref) {
            self.references.push(state);
        }
        self
    }

    pub fn add_output(&mut self, state: LedgerState) -> &mut Self {
        self.outputs.push(state);
        self
    }

    pub fn add_command(
        &mut self,
        kind: CommandKind,
        signers: impl IntoIterator<Item = PartyKey>,
    ) -> &mut Self {
        if let Some(existing) = self.commands.iter_mut().find(|c| c.kind == kind) {
            existing.add_signers(signers);
        } else {
            self.commands.push(Command::new(kind, signers));
        }
        self
    }

    /// Freeze the builder into a transaction body stamped with the current time.
    #[must_use]
    pub fn to_wire(&self) -> WireTransaction {
        WireTransaction {
            inputs: self.inputs.clone(),
            references: self.references.clone(),
            outputs: self.outputs.clone(),
            commands: self.commands.clone(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SignedTransaction
// ---------------------------------------------------------------------------

/// A transaction body plus the signatures collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: WireTransaction,
    pub signatures: Vec<TransactionSignature>,
}

impl SignedTransaction {
    #[must_use]
    pub fn new(tx: WireTransaction) -> Self {
        Self {
            tx,
            signatures: Vec::new(),
        }
    }

    pub fn id(&self) -> Result<TxId> {
        self.tx.id()
    }

    /// Attach a signature, replacing any earlier one by the same key.
    #[must_use]
    pub fn with_signature(mut self, sig: TransactionSignature) -> Self {
        self.signatures.retain(|s| s.by != sig.by);
        self.signatures.push(sig);
        self
    }

    /// Every attached signature must verify against the transaction id.
    ///
    /// # Errors
    /// `InvalidSignature` naming the first offending key.
    pub fn verify_signatures(&self) -> Result<()> {
        let id = self.id()?;
        match self.signatures.iter().find(|s| !s.verify(&id)) {
            Some(bad) => Err(SwaplineError::InvalidSignature {
                signer: bad.by.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Required signers that have not yet signed.
    #[must_use]
    pub fn missing_signers(&self) -> BTreeSet<PartyKey> {
        let signed: BTreeSet<PartyKey> = self.signatures.iter().map(|s| s.by).collect();
        self.tx
            .required_signers()
            .into_iter()
            .filter(|k| !signed.contains(k))
            .collect()
    }

    /// Signatures valid and complete.
    ///
    /// # Errors
    /// `InvalidSignature` or `MissingSignatures`.
    pub fn verify_complete(&self) -> Result<()> {
        self.verify_signatures()?;
        let missing = self.missing_signers();
        if !missing.is_empty() {
            return Err(SwaplineError::MissingSignatures {
                missing: missing
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        Ok(())
    }
}
