//! Descriptor lifecycle rules.
//!
//! Both rules see only what the proposal declares: the states it consumes,
//! the states it produces and the keys that sign for the descriptor
//! command. They never read the ledger.

use std::collections::BTreeSet;

use chrono::Datelike;
use swapline_types::{AssetDescriptor, LedgerState, PartyKey, Result, SwaplineError};

/// The clock the rules run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationContext {
    pub current_year: i32,
}

impl VerificationContext {
    #[must_use]
    pub fn new(current_year: i32) -> Self {
        Self { current_year }
    }

    /// Context for the wall-clock year.
    #[must_use]
    pub fn now() -> Self {
        Self::new(chrono::Utc::now().year())
    }
}

/// The declared parts of a proposal.
#[derive(Debug, Clone, Copy)]
pub struct ProposalParts<'a> {
    pub inputs: &'a [LedgerState],
    pub outputs: &'a [LedgerState],
    pub signers: &'a BTreeSet<PartyKey>,
}

/// A proposed descriptor lifecycle step.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorProposal<'a> {
    Create(ProposalParts<'a>),
    Update(ProposalParts<'a>),
}

impl DescriptorProposal<'_> {
    /// Accept, or name the first rule the proposal breaks.
    pub fn validate(&self, ctx: &VerificationContext) -> Result<()> {
        match self {
            Self::Create(p) => validate_create(p.inputs, p.outputs, p.signers, ctx),
            Self::Update(p) => validate_update(p.inputs, p.outputs, p.signers),
        }
    }
}

fn reject(reason: impl Into<String>) -> SwaplineError {
    SwaplineError::ValidationRejected {
        reason: reason.into(),
    }
}

fn single_descriptor<'a>(states: &'a [LedgerState], what: &str) -> Result<&'a AssetDescriptor> {
    states
        .first()
        .and_then(LedgerState::as_descriptor)
        .ok_or_else(|| reject(format!("{what} must be an asset descriptor")))
}

/// Creation: nothing consumed, exactly one descriptor produced, and the
/// descriptor satisfies every creation invariant.
pub fn validate_create(
    inputs: &[LedgerState],
    outputs: &[LedgerState],
    signers: &BTreeSet<PartyKey>,
    ctx: &VerificationContext,
) -> Result<()> {
    if !inputs.is_empty() {
        return Err(reject(format!(
            "creating a descriptor must consume nothing, got {} input(s)",
            inputs.len()
        )));
    }
    if outputs.len() != 1 {
        return Err(reject(format!(
            "creating a descriptor must produce exactly 1 output, got {}",
            outputs.len()
        )));
    }
    let d = single_descriptor(outputs, "the created output")?;

    if d.year_of_manufacture > ctx.current_year {
        return Err(reject(format!(
            "year of manufacture {} is after the current year {}",
            d.year_of_manufacture, ctx.current_year
        )));
    }
    if d.valuation.quantity == 0 {
        return Err(reject("valuation must be greater than zero"));
    }
    if d.warranty_years <= 0 {
        return Err(reject("warranty must be greater than zero"));
    }
    if d.resale_valuation != d.valuation {
        return Err(reject(format!(
            "resale valuation {} must equal valuation {} at creation",
            d.resale_valuation, d.valuation
        )));
    }
    if d.maintainers.is_empty() || !d.is_maintainer(&d.issuer) {
        return Err(reject("the issuer must be among the maintainers"));
    }
    if !signers.contains(&d.issuer.key) {
        return Err(SwaplineError::UnauthorizedIssuance {
            reason: format!("issuer {} did not sign", d.issuer),
        });
    }
    Ok(())
}

/// Update: one version consumed, one version produced, same identity and
/// issuer, positive valuations, and the issuer signs.
///
/// Membership of the acting party in the maintainer set is checked by the
/// update flow, not here.
pub fn validate_update(
    inputs: &[LedgerState],
    outputs: &[LedgerState],
    signers: &BTreeSet<PartyKey>,
) -> Result<()> {
    if inputs.len() != 1 {
        return Err(reject(format!(
            "updating a descriptor must consume exactly 1 input, got {}",
            inputs.len()
        )));
    }
    if outputs.len() != 1 {
        return Err(reject(format!(
            "updating a descriptor must produce exactly 1 output, got {}",
            outputs.len()
        )));
    }
    let before = single_descriptor(inputs, "the consumed input")?;
    let after = single_descriptor(outputs, "the produced output")?;

    if before.linear_id != after.linear_id {
        return Err(reject(format!(
            "update changes identity from {} to {}",
            before.linear_id, after.linear_id
        )));
    }
    if before.issuer != after.issuer {
        return Err(reject("update must not change the issuer"));
    }
    if after.valuation.quantity == 0 {
        return Err(reject("valuation must be greater than zero"));
    }
    if after.resale_valuation.quantity == 0 {
        return Err(reject("resale valuation must be greater than zero"));
    }
    if !signers.contains(&after.issuer.key) {
        return Err(SwaplineError::UnauthorizedUpdate {
            reason: format!("issuer {} did not sign", after.issuer),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapline_types::{Amount, Currency, LinearId, Party};

    fn ctx() -> VerificationContext {
        VerificationContext::new(2024)
    }

    fn signed_by(parties: &[&Party]) -> BTreeSet<PartyKey> {
        parties.iter().map(|p| p.key).collect()
    }

    fn usd(q: u64) -> Amount {
        Amount::new(q, Currency::fiat("USD"))
    }

    fn create(d: AssetDescriptor, signers: &BTreeSet<PartyKey>) -> Result<()> {
        validate_create(&[], &[LedgerState::Descriptor(d)], signers, &ctx())
    }

    #[test]
    fn create_accepts_valid_descriptor() {
        let issuer = Party::dummy("Manufacturer");
        let d = AssetDescriptor::sample(issuer.clone());
        assert!(create(d, &signed_by(&[&issuer])).is_ok());
    }

    #[test]
    fn create_accepts_current_year() {
        let issuer = Party::dummy("M");
        let mut d = AssetDescriptor::sample(issuer.clone());
        d.year_of_manufacture = 2024;
        assert!(create(d, &signed_by(&[&issuer])).is_ok());
    }

    #[test]
    fn create_rejects_future_year() {
        let issuer = Party::dummy("M");
        let mut d = AssetDescriptor::sample(issuer.clone());
        d.year_of_manufacture = 2025;
        assert!(matches!(
            create(d, &signed_by(&[&issuer])),
            Err(SwaplineError::ValidationRejected { .. })
        ));
    }

    #[test]
    fn create_rejects_zero_valuation() {
        let issuer = Party::dummy("M");
        let mut d = AssetDescriptor::sample(issuer.clone());
        d.valuation = usd(0);
        d.resale_valuation = usd(0);
        assert!(matches!(
            create(d, &signed_by(&[&issuer])),
            Err(SwaplineError::ValidationRejected { .. })
        ));
    }

    #[test]
    fn create_rejects_zero_warranty() {
        let issuer = Party::dummy("M");
        let mut d = AssetDescriptor::sample(issuer.clone());
        d.warranty_years = 0;
        assert!(create(d, &signed_by(&[&issuer])).is_err());
    }

    #[test]
    fn create_rejects_resale_differing_from_valuation() {
        let issuer = Party::dummy("M");
        let mut d = AssetDescriptor::sample(issuer.clone());
        d.resale_valuation = usd(999);
        assert!(matches!(
            create(d, &signed_by(&[&issuer])),
            Err(SwaplineError::ValidationRejected { .. })
        ));
    }

    #[test]
    fn create_rejects_unsigned_issuer() {
        let issuer = Party::dummy("M");
        let stranger = Party::dummy("Stranger");
        let d = AssetDescriptor::sample(issuer);
        assert!(matches!(
            create(d, &signed_by(&[&stranger])),
            Err(SwaplineError::UnauthorizedIssuance { .. })
        ));
    }

    #[test]
    fn create_rejects_issuer_outside_maintainers() {
        let issuer = Party::dummy("M");
        let mut d = AssetDescriptor::sample(issuer.clone());
        d.maintainers = vec![Party::dummy("Other")];
        assert!(create(d, &signed_by(&[&issuer])).is_err());
    }

    #[test]
    fn create_rejects_inputs_and_extra_outputs() {
        let issuer = Party::dummy("M");
        let d = LedgerState::Descriptor(AssetDescriptor::sample(issuer.clone()));
        let signers = signed_by(&[&issuer]);
        assert!(validate_create(&[d.clone()], &[d.clone()], &signers, &ctx()).is_err());
        assert!(validate_create(&[], &[d.clone(), d], &signers, &ctx()).is_err());
        assert!(validate_create(&[], &[], &signers, &ctx()).is_err());
    }

    #[test]
    fn update_accepts_new_version() {
        let issuer = Party::dummy("M");
        let v1 = AssetDescriptor::sample(issuer.clone());
        let v2 = v1.evolve(usd(800), 1);
        let result = validate_update(
            &[LedgerState::Descriptor(v1)],
            &[LedgerState::Descriptor(v2)],
            &signed_by(&[&issuer]),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn update_rejects_wrong_counts() {
        let issuer = Party::dummy("M");
        let v1 = LedgerState::Descriptor(AssetDescriptor::sample(issuer.clone()));
        let signers = signed_by(&[&issuer]);
        assert!(validate_update(&[], &[v1.clone()], &signers).is_err());
        assert!(validate_update(&[v1.clone()], &[], &signers).is_err());
        assert!(validate_update(&[v1.clone(), v1.clone()], &[v1.clone()], &signers).is_err());
        assert!(validate_update(&[v1.clone()], &[v1.clone(), v1], &signers).is_err());
    }

    #[test]
    fn update_rejects_changed_identity() {
        let issuer = Party::dummy("M");
        let v1 = AssetDescriptor::sample(issuer.clone());
        let mut v2 = v1.evolve(usd(800), 1);
        v2.linear_id = LinearId::new();
        assert!(matches!(
            validate_update(
                &[LedgerState::Descriptor(v1)],
                &[LedgerState::Descriptor(v2)],
                &signed_by(&[&issuer]),
            ),
            Err(SwaplineError::ValidationRejected { .. })
        ));
    }

    #[test]
    fn update_rejects_zero_resale() {
        let issuer = Party::dummy("M");
        let v1 = AssetDescriptor::sample(issuer.clone());
        let v2 = v1.evolve(usd(0), 1);
        assert!(
            validate_update(
                &[LedgerState::Descriptor(v1)],
                &[LedgerState::Descriptor(v2)],
                &signed_by(&[&issuer]),
            )
            .is_err()
        );
    }

    #[test]
    fn update_requires_issuer_even_when_maintainer_signs() {
        let issuer = Party::dummy("M");
        let service = Party::dummy("Service Co");
        let v1 = AssetDescriptor::sample(issuer).with_maintainers([service.clone()]);
        let v2 = v1.evolve(usd(900), 3);
        assert!(matches!(
            validate_update(
                &[LedgerState::Descriptor(v1)],
                &[LedgerState::Descriptor(v2)],
                &signed_by(&[&service]),
            ),
            Err(SwaplineError::UnauthorizedUpdate { .. })
        ));
    }

    #[test]
    fn proposal_dispatches_by_variant() {
        let issuer = Party::dummy("M");
        let d = LedgerState::Descriptor(AssetDescriptor::sample(issuer.clone()));
        let signers = signed_by(&[&issuer]);
        let outputs = [d];
        let create = DescriptorProposal::Create(ProposalParts {
            inputs: &[],
            outputs: &outputs,
            signers: &signers,
        });
        assert!(create.validate(&ctx()).is_ok());
        let update = DescriptorProposal::Update(ProposalParts {
            inputs: &[],
            outputs: &outputs,
            signers: &signers,
        });
        assert!(update.validate(&ctx()).is_err());
    }
}
