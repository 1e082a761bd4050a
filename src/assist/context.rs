//! Customer data gathered for prompts.

use crate::chat::ContextBlock;
use crate::config::ChatPrompts;
use crate::error::Result;
use crate::store::{ConversationDocument, ConversationStore, CustomerDirectory, CustomerProfile, Purchase};

/// Everything known about a customer before a conversation starts.
#[derive(Debug, Clone, Default)]
pub struct CustomerContext {
    pub customer_id: String,
    pub profile: Option<CustomerProfile>,
    pub purchases: Vec<Purchase>,
    /// The customer's most recent self-service conversation.
    pub prior: Option<ConversationDocument>,
}

impl CustomerContext {
    /// Fetch profile, purchases and prior conversation concurrently.
    pub async fn load(
        customers: &dyn CustomerDirectory,
        conversations: &dyn ConversationStore,
        customer_id: &str,
    ) -> Result<Self> {
        let (profile, purchases, prior) = futures::try_join!(
            customers.customer(customer_id),
            customers.purchases(customer_id),
            conversations.latest_for_subject(customer_id),
        )?;

        Ok(Self {
            customer_id: customer_id.to_string(),
            profile,
            purchases,
            prior,
        })
    }

    pub fn blocks(&self, prompts: &ChatPrompts) -> Result<Vec<ContextBlock>> {
        customer_blocks(prompts, self.profile.as_ref(), &self.purchases)
    }
}

/// Profile and purchase history rendered as labelled JSON blocks.
///
/// A missing profile renders as `null` so the model knows it is unknown.
pub fn customer_blocks(
    prompts: &ChatPrompts,
    profile: Option<&CustomerProfile>,
    purchases: &[Purchase],
) -> Result<Vec<ContextBlock>> {
    Ok(vec![
        ContextBlock::json(&prompts.customer_label, &profile)?,
        ContextBlock::json(&prompts.purchases_label, purchases)?,
    ])
}
