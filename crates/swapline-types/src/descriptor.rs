//! # AssetDescriptor: the evolvable record behind an instrument
//!
//! A descriptor describes one physical or registered instrument: what it is,
//! what it is worth, and who may change it. It is never deleted, only
//! superseded:
//!
//! ```text
//!   create            update              update
//!   ──────▶ [v1] ──────────────▶ [v2] ──────────────▶ [v3] ...
//!            │ same linear_id     │ same linear_id
//! ```
//!
//! Ownership tokens point at the `linear_id`, never at a version, so a
//! holder always resolves the *current* valuation.

use serde::{Deserialize, Serialize};

use crate::{Amount, LinearId, Party};

/// One version of an instrument's descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Stable identity across every version.
    pub linear_id: LinearId,
    /// The party that created the descriptor.
    pub issuer: Party,
    /// Parties allowed to evolve the descriptor. The issuer is always first.
    pub maintainers: Vec<Party>,
    /// Human name of the instrument, e.g. `"Excavator CAT-320"`.
    pub name: String,
    /// Year of manufacture.
    pub year_of_manufacture: i32,
    /// Manufacturer batch code.
    pub batch_no: String,
    /// Valuation at creation. Sellers never accept less than this.
    pub valuation: Amount,
    /// Warranty period in years.
    pub warranty_years: i32,
    /// Current asking price on resale.
    pub resale_valuation: Amount,
}

impl AssetDescriptor {
    /// A first version: resale valuation equals valuation, the issuer is the
    /// sole maintainer.
    #[must_use]
    pub fn new(
        issuer: Party,
        name: impl Into<String>,
        year_of_manufacture: i32,
        batch_no: impl Into<String>,
        valuation: Amount,
        warranty_years: i32,
    ) -> Self {
        Self {
            linear_id: LinearId::new(),
            maintainers: vec![issuer.clone()],
            issuer,
            name: name.into(),
            year_of_manufacture,
            batch_no: batch_no.into(),
            resale_valuation: valuation.clone(),
            valuation,
            warranty_years,
        }
    }

    /// Add maintainers beyond the issuer. Duplicates are ignored.
    #[must_use]
    pub fn with_maintainers(mut self, extra: impl IntoIterator<Item = Party>) -> Self {
        for party in extra {
            if !self.maintainers.contains(&party) {
                self.maintainers.push(party);
            }
        }
        self
    }

    /// Produce the next version with new mutable fields. Identity, issuer
    /// and maintainers carry over unchanged.
    #[must_use]
    pub fn evolve(&self, resale_valuation: Amount, warranty_years: i32) -> Self {
        Self {
            resale_valuation,
            warranty_years,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn is_maintainer(&self, party: &Party) -> bool {
        self.maintainers.contains(party)
    }
}

/// Sample descriptors for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl AssetDescriptor {
    /// A 2020 excavator valued at 1000 USD minor units with a two-year
    /// warranty.
    pub fn sample(issuer: Party) -> Self {
        Self::new(
            issuer,
            "Excavator CAT-320",
            2020,
            "BATCH-0001",
            Amount::new(1000, crate::Currency::fiat("USD")),
            2,
        )
    }
}
