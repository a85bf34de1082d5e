//! # swapline-contract
//!
//! **Validation engine**: the rules a transaction must satisfy to be
//! accepted onto the ledger. Everything here is pure: a function of the
//! proposed transaction and a [`VerificationContext`], never of ledger
//! state.
//!
//! ## Rule families
//!
//! - **Descriptor** ([`descriptor`]): creation and update of
//!   [`AssetDescriptor`](swapline_types::AssetDescriptor) versions.
//! - **Token** ([`tokens`]): issuance, conservation on move, and resolution
//!   of ownership tokens' descriptor pointers.
//!
//! [`verify_transaction`] runs every family that applies. The consensus
//! service calls it before committing, the seller before signing and the
//! buyer before countersigning.

pub mod descriptor;
pub mod tokens;

pub use descriptor::{
    DescriptorProposal, ProposalParts, VerificationContext, validate_create, validate_update,
};
pub use tokens::{validate_descriptor_pointers, validate_issue, validate_move};

use std::collections::BTreeSet;

use swapline_types::{
    CommandKind, DescriptorCommand, LedgerState, PartyKey, Result, SwaplineError, TokenCommand,
    WireTransaction,
};

fn signers_of(tx: &WireTransaction, kind: CommandKind) -> BTreeSet<PartyKey> {
    tx.command(kind)
        .map(|c| c.signers.iter().copied().collect())
        .unwrap_or_default()
}

fn has_command(tx: &WireTransaction, kind: CommandKind) -> bool {
    tx.command(kind).is_some()
}

/// Run every rule that applies to `tx`.
///
/// Each state kind the transaction touches must be claimed by a command
/// of its family, and each family may declare at most one command.
pub fn verify_transaction(tx: &WireTransaction, ctx: &VerificationContext) -> Result<()> {
    if tx.commands.is_empty() {
        return Err(SwaplineError::ValidationRejected {
            reason: "transaction declares no commands".into(),
        });
    }

    let create = CommandKind::Descriptor(DescriptorCommand::Create);
    let update = CommandKind::Descriptor(DescriptorCommand::Update);
    let issue = CommandKind::Token(TokenCommand::Issue);
    let mv = CommandKind::Token(TokenCommand::Move);

    if has_command(tx, create) && has_command(tx, update) {
        return Err(SwaplineError::ValidationRejected {
            reason: "a transaction cannot both create and update a descriptor".into(),
        });
    }
    if has_command(tx, issue) && has_command(tx, mv) {
        return Err(SwaplineError::ValidationRejected {
            reason: "a transaction cannot both issue and move tokens".into(),
        });
    }

    let touched = tx
        .inputs
        .iter()
        .map(|s| &s.state)
        .chain(tx.outputs.iter());
    let (mut touches_descriptor, mut touches_token) = (false, false);
    for state in touched {
        match state {
            LedgerState::Descriptor(_) => touches_descriptor = true,
            LedgerState::Ownership(_) | LedgerState::Payment(_) => touches_token = true,
        }
    }
    if touches_descriptor && !(has_command(tx, create) || has_command(tx, update)) {
        return Err(SwaplineError::ValidationRejected {
            reason: "descriptor states change without a descriptor command".into(),
        });
    }
    if touches_token && !(has_command(tx, issue) || has_command(tx, mv)) {
        return Err(SwaplineError::ValidationRejected {
            reason: "token states change without a token command".into(),
        });
    }

    let inputs: Vec<LedgerState> = tx.inputs.iter().map(|s| s.state.clone()).collect();
    for command in &tx.commands {
        let signers = signers_of(tx, command.kind);
        let parts = ProposalParts {
            inputs: &inputs,
            outputs: &tx.outputs,
            signers: &signers,
        };
        match command.kind {
            CommandKind::Descriptor(DescriptorCommand::Create) => {
                DescriptorProposal::Create(parts).validate(ctx)?;
            }
            CommandKind::Descriptor(DescriptorCommand::Update) => {
                DescriptorProposal::Update(parts).validate(ctx)?;
            }
            CommandKind::Token(TokenCommand::Issue) => validate_issue(tx, &signers)?,
            CommandKind::Token(TokenCommand::Move) => validate_move(tx, &signers)?,
        }
    }
    validate_descriptor_pointers(tx)?;

    tracing::debug!(
        commands = tx.commands.len(),
        inputs = tx.inputs.len(),
        outputs = tx.outputs.len(),
        "Transaction verified"
    );
    Ok(())
}
