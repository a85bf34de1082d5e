//! Issuance flows: descriptors, ownership tokens and payment records.
//!
//! Each runs alone on the calling node: build, verify locally, sign,
//! submit. The caller gets the engine's own error when a rule fails, not
//! a consensus rejection wrapping it.

use swapline_types::{
    Amount, AssetDescriptor, CommandKind, Currency, DescriptorCommand, IssuedCurrency,
    LedgerState, LinearId, OwnershipToken, Party, PaymentRecord, Result, StateAndRef,
    SwaplineError, TokenCommand, TransactionBuilder, TxId,
};
use swapline_vault::{QueryCriteria, find_exactly_one};

use crate::node::Node;

/// Fields of a new descriptor. The calling node becomes its issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDescriptor {
    pub name: String,
    pub year_of_manufacture: i32,
    pub batch_no: String,
    pub valuation: Amount,
    pub warranty_years: i32,
    /// Maintainers besides the issuer.
    pub maintainers: Vec<Party>,
}

impl CreateDescriptor {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        year_of_manufacture: i32,
        batch_no: impl Into<String>,
        valuation: Amount,
        warranty_years: i32,
    ) -> Self {
        Self {
            name: name.into(),
            year_of_manufacture,
            batch_no: batch_no.into(),
            valuation,
            warranty_years,
            maintainers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_maintainer(mut self, party: Party) -> Self {
        self.maintainers.push(party);
        self
    }
}

/// Result of [`Node::create_and_issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedAndIssued {
    pub descriptor_id: LinearId,
    pub token_id: LinearId,
    pub create_tx: TxId,
    pub issue_tx: TxId,
}

impl Node {
    /// Create the first version of a descriptor.
    pub async fn create_descriptor(&self, request: CreateDescriptor) -> Result<(LinearId, TxId)> {
        let descriptor = AssetDescriptor::new(
            self.party().clone(),
            request.name,
            request.year_of_manufacture,
            request.batch_no,
            request.valuation,
            request.warranty_years,
        )
        .with_maintainers(request.maintainers);
        let linear_id = descriptor.linear_id;

        let mut builder = TransactionBuilder::new();
        builder
            .add_output(LedgerState::Descriptor(descriptor))
            .add_command(
                CommandKind::Descriptor(DescriptorCommand::Create),
                [self.party().key],
            );
        let notarised = self.finalize_alone(&builder).await?;

        tracing::info!(linear_id = %linear_id, tx_id = %notarised.tx_id, "Descriptor created");
        Ok((linear_id, notarised.tx_id))
    }

    /// Issue an ownership token for `descriptor_id` to `holder`.
    ///
    /// Only a maintainer of the descriptor may issue against it. The
    /// holder goes on this node's distribution list.
    pub async fn issue_ownership_token(
        &self,
        descriptor_id: LinearId,
        holder: &Party,
    ) -> Result<(LinearId, TxId)> {
        let criteria = QueryCriteria::descriptors().linear_id(descriptor_id);
        let descriptor = find_exactly_one(
            self.vault(),
            &criteria,
            &format!("descriptor {descriptor_id}"),
        )
        .await?;
        self.issue_against(descriptor, holder).await
    }

    /// Like [`Node::issue_ownership_token`], looking the descriptor up by
    /// name.
    pub async fn issue_ownership_token_by_name(
        &self,
        name: &str,
        holder: &Party,
    ) -> Result<(LinearId, TxId)> {
        let criteria = QueryCriteria::descriptors().named(name);
        let descriptor =
            find_exactly_one(self.vault(), &criteria, &format!("descriptor named {name}")).await?;
        self.issue_against(descriptor, holder).await
    }

    async fn issue_against(
        &self,
        descriptor: StateAndRef,
        holder: &Party,
    ) -> Result<(LinearId, TxId)> {
        let current = descriptor
            .state
            .as_descriptor()
            .ok_or_else(|| SwaplineError::Internal("descriptor query returned another kind".into()))?;
        if !current.is_maintainer(self.party()) {
            return Err(SwaplineError::UnauthorizedIssuance {
                reason: format!(
                    "{} does not maintain descriptor {}",
                    self.party(),
                    current.linear_id
                ),
            });
        }
        let descriptor_id = current.linear_id;
        let token = OwnershipToken::new(descriptor_id, self.party().clone(), holder.clone());
        let token_id = token.token_id;

        let mut builder = TransactionBuilder::new();
        builder
            .add_reference(descriptor)
            .add_output(LedgerState::Ownership(token))
            .add_command(CommandKind::Token(TokenCommand::Issue), [self.party().key]);
        let notarised = self.finalize_alone(&builder).await?;
        self.record_holder(descriptor_id, holder.clone());

        tracing::info!(
            linear_id = %descriptor_id,
            token_id = %token_id,
            holder = %holder,
            tx_id = %notarised.tx_id,
            "Ownership token issued"
        );
        Ok((token_id, notarised.tx_id))
    }

    /// Create a descriptor and issue its ownership token to `holder`, as
    /// two consecutive commits.
    pub async fn create_and_issue(
        &self,
        request: CreateDescriptor,
        holder: &Party,
    ) -> Result<CreatedAndIssued> {
        let (descriptor_id, create_tx) = self.create_descriptor(request).await?;
        let (token_id, issue_tx) = self.issue_ownership_token(descriptor_id, holder).await?;
        Ok(CreatedAndIssued {
            descriptor_id,
            token_id,
            create_tx,
            issue_tx,
        })
    }

    /// Issue `quantity` minor units of `currency_code` to `recipient`, with
    /// this node as issuer.
    pub async fn issue_payment(
        &self,
        quantity: u64,
        currency_code: &str,
        recipient: &Party,
    ) -> Result<TxId> {
        let token = IssuedCurrency::new(Currency::fiat(currency_code), self.party().clone());
        let mut builder = TransactionBuilder::new();
        builder
            .add_output(LedgerState::Payment(PaymentRecord::new(
                token.clone(),
                quantity,
                recipient.clone(),
            )))
            .add_command(CommandKind::Token(TokenCommand::Issue), [self.party().key]);
        let notarised = self.finalize_alone(&builder).await?;

        tracing::info!(
            token = %token,
            quantity,
            recipient = %recipient,
            tx_id = %notarised.tx_id,
            "Payment issued"
        );
        Ok(notarised.tx_id)
    }
}
