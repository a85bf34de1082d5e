//! Unconsumed-state queries.
//!
//! The vault is read through [`VaultQuery`]. Criteria are AND-ed; a `None`
//! field places no constraint. Results come back in ledger order, one page
//! at a time.

use async_trait::async_trait;
use swapline_types::{
    LedgerState, LinearId, Party, Result, StateAndRef, StateKind, SwaplineError,
};

/// Filter over unconsumed states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCriteria {
    pub kind: StateKind,
    /// Holder of an ownership token or payment record.
    pub holder: Option<Party>,
    /// Issuer of a payment record's currency, or of an ownership token.
    pub issued_by: Option<Party>,
    /// Currency code of a payment record.
    pub currency_code: Option<String>,
    /// Linear id of a descriptor or ownership token.
    pub linear_id: Option<LinearId>,
    /// Descriptor an ownership token points at.
    pub descriptor_id: Option<LinearId>,
    /// Descriptor name.
    pub name: Option<String>,
}

impl QueryCriteria {
    #[must_use]
    pub fn of(kind: StateKind) -> Self {
        Self {
            kind,
            holder: None,
            issued_by: None,
            currency_code: None,
            linear_id: None,
            descriptor_id: None,
            name: None,
        }
    }

    #[must_use]
    pub fn descriptors() -> Self {
        Self::of(StateKind::Descriptor)
    }

    #[must_use]
    pub fn ownership() -> Self {
        Self::of(StateKind::Ownership)
    }

    #[must_use]
    pub fn payments() -> Self {
        Self::of(StateKind::Payment)
    }

    #[must_use]
    pub fn held_by(mut self, holder: &Party) -> Self {
        self.holder = Some(holder.clone());
        self
    }

    #[must_use]
    pub fn issued_by(mut self, issuer: &Party) -> Self {
        self.issued_by = Some(issuer.clone());
        self
    }

    #[must_use]
    pub fn currency(mut self, code: &str) -> Self {
        self.currency_code = Some(code.to_ascii_uppercase());
        self
    }

    #[must_use]
    pub fn linear_id(mut self, id: LinearId) -> Self {
        self.linear_id = Some(id);
        self
    }

    #[must_use]
    pub fn pointing_at(mut self, descriptor_id: LinearId) -> Self {
        self.descriptor_id = Some(descriptor_id);
        self
    }

    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Whether `state` satisfies every set constraint.
    #[must_use]
    pub fn matches(&self, state: &LedgerState) -> bool {
        if state.kind() != self.kind {
            return false;
        }
        if let Some(holder) = &self.holder {
            if state.holder() != Some(holder) {
                return false;
            }
        }
        match state {
            LedgerState::Descriptor(d) => {
                self.issued_by.as_ref().is_none_or(|p| *p == d.issuer)
                    && self.linear_id.is_none_or(|id| id == d.linear_id)
                    && self.name.as_ref().is_none_or(|n| *n == d.name)
                    && self.currency_code.is_none()
                    && self.descriptor_id.is_none()
            }
            LedgerState::Ownership(t) => {
                self.issued_by.as_ref().is_none_or(|p| *p == t.issuer)
                    && self.linear_id.is_none_or(|id| id == t.token_id)
                    && self.descriptor_id.is_none_or(|id| id == t.descriptor_id)
                    && self.currency_code.is_none()
                    && self.name.is_none()
            }
            LedgerState::Payment(p) => {
                self.issued_by.as_ref().is_none_or(|i| *i == p.token.issuer)
                    && self
                        .currency_code
                        .as_ref()
                        .is_none_or(|c| *c == p.token.currency.code)
                    && self.linear_id.is_none()
                    && self.descriptor_id.is_none()
                    && self.name.is_none()
            }
        }
    }
}

/// Which slice of the result set to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    /// Zero-based page number.
    pub number: usize,
    pub size: usize,
}

impl PageSpec {
    #[must_use]
    pub fn first(size: usize) -> Self {
        Self { number: 0, size }
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self {
            number: self.number + 1,
            size: self.size,
        }
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.number.saturating_mul(self.size)
    }
}

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub states: Vec<StateAndRef>,
    /// Matches across all pages.
    pub total: usize,
}

/// Read access to the set of unconsumed states.
#[async_trait]
pub trait VaultQuery: Send + Sync {
    async fn find_unconsumed(&self, criteria: &QueryCriteria, page: PageSpec) -> Result<Page>;
}

/// Walk every page of a query.
pub async fn find_all(
    vault: &dyn VaultQuery,
    criteria: &QueryCriteria,
    page_size: usize,
) -> Result<Vec<StateAndRef>> {
    let mut spec = PageSpec::first(page_size.max(1));
    let mut out = Vec::new();
    loop {
        let page = vault.find_unconsumed(criteria, spec).await?;
        let fetched = page.states.len();
        out.extend(page.states);
        if fetched == 0 || out.len() >= page.total {
            return Ok(out);
        }
        spec = spec.next();
    }
}

/// The single unconsumed state matching `criteria`.
///
/// # Errors
/// `NotFound` on zero matches, `AmbiguousMatch` on more than one.
pub async fn find_exactly_one(
    vault: &dyn VaultQuery,
    criteria: &QueryCriteria,
    what: &str,
) -> Result<StateAndRef> {
    let page = vault.find_unconsumed(criteria, PageSpec::first(2)).await?;
    match (page.total, page.states.into_iter().next()) {
        (1, Some(state)) => Ok(state),
        (0, _) | (_, None) => Err(SwaplineError::NotFound {
            what: what.to_string(),
        }),
        (count, _) => Err(SwaplineError::AmbiguousMatch {
            what: what.to_string(),
            count,
        }),
    }
}
