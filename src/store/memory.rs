//! In-memory store, for tests and throwaway sessions.

use super::{ConversationDocument, ConversationKind, ConversationStore, CustomerDirectory, CustomerProfile, Purchase};
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    /// Keyed by session id; session ids are unique across kinds.
    conversations: HashMap<String, ConversationDocument>,
    customers: HashMap<String, CustomerProfile>,
    purchases: Vec<Purchase>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_tables(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| ParleyError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn write_tables(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| ParleyError::Store(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn read(&self, session_id: &str) -> Result<Option<ConversationDocument>> {
        Ok(self
            .read_tables()?
            .conversations
            .get(session_id)
            .cloned())
    }

    async fn upsert(&self, doc: &ConversationDocument) -> Result<()> {
        self.write_tables()?
            .conversations
            .insert(doc.session_id.clone(), doc.clone());
        Ok(())
    }

    async fn latest_for_subject(&self, subject_id: &str) -> Result<Option<ConversationDocument>> {
        Ok(self
            .read_tables()?
            .conversations
            .values()
            .filter(|d| d.subject_id == subject_id && d.kind == ConversationKind::SelfService)
            .max_by_key(|d| d.updated_at)
            .cloned())
    }
}

#[async_trait]
impl CustomerDirectory for MemoryStore {
    async fn customer(&self, customer_id: &str) -> Result<Option<CustomerProfile>> {
        Ok(self.read_tables()?.customers.get(customer_id).cloned())
    }

    async fn purchases(&self, customer_id: &str) -> Result<Vec<Purchase>> {
        let mut purchases: Vec<Purchase> = self
            .read_tables()?
            .purchases
            .iter()
            .filter(|p| p.customer_id == customer_id)
            .cloned()
            .collect();
        purchases.sort_by(|a, b| a.purchasing_date.cmp(&b.purchasing_date));
        Ok(purchases)
    }

    async fn upsert_customer(&self, profile: &CustomerProfile) -> Result<()> {
        self.write_tables()?
            .customers
            .insert(profile.customer_id.clone(), profile.clone());
        Ok(())
    }

    async fn add_purchase(&self, purchase: &Purchase) -> Result<()> {
        let mut tables = self.write_tables()?;
        tables.purchases.retain(|p| p.order_number != purchase.order_number);
        tables.purchases.push(purchase.clone());
        Ok(())
    }
}
