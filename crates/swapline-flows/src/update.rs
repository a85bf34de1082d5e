//! Descriptor updates and their broadcast to holders.
//!
//! Two checks guard an update and both stay in place:
//!
//! 1. here, the acting node must be one of the descriptor's maintainers
//! 2. in the validation engine, the descriptor's issuer must sign
//!
//! A maintainer that is not the issuer passes the first and fails the
//! second, since this flow only collects the acting node's signature.

use swapline_types::{
    Amount, CommandKind, DescriptorCommand, LedgerState, LinearId, Result, SwaplineError,
    TransactionBuilder, TxId,
};
use swapline_vault::{QueryCriteria, find_exactly_one};

use crate::messages::{FlowMessage, SessionKind};
use crate::node::Node;

impl Node {
    /// Replace the current version of `linear_id` with one carrying the new
    /// resale valuation and warranty, then announce it to every holder on
    /// this node's distribution list.
    pub async fn update_descriptor(
        &self,
        linear_id: LinearId,
        resale_valuation: Amount,
        warranty_years: i32,
    ) -> Result<TxId> {
        let criteria = QueryCriteria::descriptors().linear_id(linear_id);
        let current =
            find_exactly_one(self.vault(), &criteria, &format!("descriptor {linear_id}")).await?;
        let descriptor = current
            .state
            .as_descriptor()
            .ok_or_else(|| SwaplineError::Internal("descriptor query returned another kind".into()))?;
        if !descriptor.is_maintainer(self.party()) {
            tracing::warn!(linear_id = %linear_id, party = %self.party(), "Update by non-maintainer refused");
            return Err(SwaplineError::UnauthorizedUpdate {
                reason: format!("{} does not maintain descriptor {linear_id}", self.party()),
            });
        }
        let next = descriptor.evolve(resale_valuation, warranty_years);

        let mut builder = TransactionBuilder::new();
        builder
            .add_input(current)
            .add_output(LedgerState::Descriptor(next))
            .add_command(
                CommandKind::Descriptor(DescriptorCommand::Update),
                [self.party().key],
            );
        let notarised = self.finalize_alone(&builder).await?;
        tracing::info!(linear_id = %linear_id, tx_id = %notarised.tx_id, "Descriptor updated");

        let version = notarised.transaction.tx.out_ref(0)?;
        for holder in self.distribution_list(&linear_id) {
            if holder == *self.party() {
                continue;
            }
            let sent = async {
                let session = self
                    .network()
                    .open(self.party(), &holder, SessionKind::DescriptorBroadcast)
                    .await?;
                session
                    .send(FlowMessage::DescriptorUpdated(version.clone()))
                    .await
            };
            if let Err(e) = sent.await {
                tracing::warn!(linear_id = %linear_id, holder = %holder, error = %e, "Broadcast to holder failed");
            }
        }
        Ok(notarised.tx_id)
    }
}
