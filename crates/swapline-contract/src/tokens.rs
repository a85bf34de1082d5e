//! Token rules: issuance and conservation on move.
//!
//! Ownership tokens and payment records share one command family. An
//! `Issue` brings new tokens into existence, a `Move` only changes who
//! holds them.

use std::collections::{BTreeMap, BTreeSet};

use swapline_types::{
    IssuedCurrency, LedgerState, LinearId, OwnershipToken, PartyKey, Result, SwaplineError,
    WireTransaction,
};

fn reject(reason: impl Into<String>) -> SwaplineError {
    SwaplineError::ValidationRejected {
        reason: reason.into(),
    }
}

fn is_token(state: &LedgerState) -> bool {
    matches!(state, LedgerState::Ownership(_) | LedgerState::Payment(_))
}

/// Issue: consumes no tokens, produces at least one, every output has a
/// positive quantity and its issuer signs.
pub fn validate_issue(tx: &WireTransaction, signers: &BTreeSet<PartyKey>) -> Result<()> {
    if tx.inputs.iter().any(|s| is_token(&s.state)) {
        return Err(reject("issuance must not consume tokens"));
    }
    let mut issued = 0usize;
    for state in &tx.outputs {
        let issuer = match state {
            LedgerState::Ownership(t) => &t.issuer,
            LedgerState::Payment(p) => {
                if p.quantity == 0 {
                    return Err(reject(format!("zero-amount issuance of {}", p.token)));
                }
                &p.token.issuer
            }
            LedgerState::Descriptor(_) => continue,
        };
        if !signers.contains(&issuer.key) {
            return Err(reject(format!("token issuer {issuer} did not sign")));
        }
        issued += 1;
    }
    if issued == 0 {
        return Err(reject("issuance produces no tokens"));
    }
    Ok(())
}

/// Move: per issued currency Σin == Σout, no zero-amount outputs, each
/// ownership token is consumed once and recreated once unchanged apart
/// from its holder, and every consumed token's holder signs.
pub fn validate_move(tx: &WireTransaction, signers: &BTreeSet<PartyKey>) -> Result<()> {
    if !tx.inputs.iter().any(|s| is_token(&s.state)) {
        return Err(reject("move consumes no tokens"));
    }

    let mut payments: BTreeMap<&IssuedCurrency, (u128, u128)> = BTreeMap::new();
    let mut owned_in: BTreeMap<LinearId, Vec<&OwnershipToken>> = BTreeMap::new();
    let mut owned_out: BTreeMap<LinearId, Vec<&OwnershipToken>> = BTreeMap::new();

    for input in &tx.inputs {
        match &input.state {
            LedgerState::Payment(p) => {
                payments.entry(&p.token).or_default().0 += u128::from(p.quantity);
            }
            LedgerState::Ownership(t) => owned_in.entry(t.token_id).or_default().push(t),
            LedgerState::Descriptor(_) => continue,
        }
        if let Some(holder) = input.state.holder() {
            if !signers.contains(&holder.key) {
                return Err(reject(format!(
                    "holder {holder} of consumed {} did not sign",
                    input.state_ref
                )));
            }
        }
    }
    for output in &tx.outputs {
        match output {
            LedgerState::Payment(p) => {
                if p.quantity == 0 {
                    return Err(reject(format!("zero-amount output of {}", p.token)));
                }
                payments.entry(&p.token).or_default().1 += u128::from(p.quantity);
            }
            LedgerState::Ownership(t) => owned_out.entry(t.token_id).or_default().push(t),
            LedgerState::Descriptor(_) => {}
        }
    }

    for (token, (sum_in, sum_out)) in &payments {
        if sum_in != sum_out {
            return Err(reject(format!(
                "{token} not conserved: {sum_in} in, {sum_out} out"
            )));
        }
    }

    let ids: BTreeSet<LinearId> = owned_in.keys().chain(owned_out.keys()).copied().collect();
    for id in ids {
        let ins = owned_in.get(&id).map_or(&[][..], Vec::as_slice);
        let outs = owned_out.get(&id).map_or(&[][..], Vec::as_slice);
        let ([before], [after]) = (ins, outs) else {
            return Err(reject(format!(
                "ownership token {id} must be moved one-in one-out, got {} in {} out",
                ins.len(),
                outs.len()
            )));
        };
        if before.descriptor_id != after.descriptor_id || before.issuer != after.issuer {
            return Err(reject(format!(
                "ownership token {id} changed more than its holder"
            )));
        }
    }
    Ok(())
}

/// Every ownership token produced must resolve its descriptor to exactly one
/// descriptor among the transaction's references or outputs.
pub fn validate_descriptor_pointers(tx: &WireTransaction) -> Result<()> {
    for output in &tx.outputs {
        let LedgerState::Ownership(token) = output else {
            continue;
        };
        let matches = tx
            .references
            .iter()
            .map(|r| &r.state)
            .chain(tx.outputs.iter())
            .filter_map(LedgerState::as_descriptor)
            .filter(|d| d.linear_id == token.descriptor_id)
            .count();
        match matches {
            1 => {}
            0 => {
                return Err(reject(format!(
                    "ownership token {} points at descriptor {} which the transaction does not carry",
                    token.token_id, token.descriptor_id
                )));
            }
            n => {
                return Err(SwaplineError::AmbiguousMatch {
                    what: format!("descriptor {}", token.descriptor_id),
                    count: n,
                });
            }
        }
    }
    Ok(())
}
