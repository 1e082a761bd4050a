//! Customer directory commands.

use crate::cli::{CustomersAction, Output};
use crate::config::Settings;
use crate::store::{open_stores, CustomerSeed};
use anyhow::Result;

pub async fn run_customers(action: &CustomersAction, settings: Settings) -> Result<()> {
    let (conversations, customers) = open_stores(&settings)?;

    match action {
        CustomersAction::Import { file } => {
            let seed = CustomerSeed::load(file)?;
            let (profiles, purchases) = seed.apply(customers.as_ref()).await?;
            Output::success(&format!(
                "Imported {} customer(s) and {} purchase(s)",
                profiles, purchases
            ));
            if settings.store.provider == "memory" {
                Output::warning("The memory store is not persisted; set store.provider = \"sqlite\" to keep data.");
            }
        }

        CustomersAction::Show { customer } => {
            let Some(profile) = customers.customer(customer).await? else {
                Output::warning(&format!("No customer with id {}", customer));
                return Ok(());
            };

            Output::header(&profile.full_name());
            Output::kv("Id", &profile.customer_id);
            Output::kv("Email", &profile.email);
            if !profile.phone_number.is_empty() {
                Output::kv("Phone", &profile.phone_number);
            }

            let purchases = customers.purchases(customer).await?;
            Output::header(&format!("Purchases ({})", purchases.len()));
            for purchase in &purchases {
                let name = purchase
                    .product_details
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown product");
                let delivered = purchase.delivered_date.as_deref().unwrap_or("not delivered");
                Output::list_item(&format!(
                    "{} {} x{} ({:.2}) ordered {}, {}",
                    purchase.order_number, name, purchase.quantity, purchase.total_price, purchase.purchasing_date, delivered
                ));
            }

            if let Some(latest) = conversations.latest_for_subject(customer).await? {
                Output::header("Latest conversation");
                Output::kv("Session", &latest.session_id);
                Output::kv("Messages", &latest.messages.len().to_string());
                Output::kv("Updated", &latest.updated_at.to_rfc3339());
            }
        }
    }

    Ok(())
}
