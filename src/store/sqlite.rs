//! SQLite-backed conversation store and customer directory.

use super::{
    ConversationAnalysis, ConversationDocument, ConversationKind, ConversationStore, CustomerDirectory, CustomerProfile,
    Purchase,
};
use crate::chat::Message;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL UNIQUE,
    customer_id TEXT NOT NULL,
    messages_json TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'self_service',
    agent_id INTEGER,
    analysis_json TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_customer ON conversations(customer_id, updated_at);

CREATE TABLE IF NOT EXISTS customers (
    customer_id TEXT PRIMARY KEY,
    profile_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS purchases (
    order_number TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL,
    purchasing_date TEXT NOT NULL,
    purchase_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_purchases_customer ON purchases(customer_id);
"#;

const SELECT_CONVERSATION: &str =
    "SELECT id, session_id, customer_id, messages_json, kind, agent_id, analysis_json, updated_at FROM conversations";

/// Databases created before conversations had a kind get the column added.
fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let has_kind: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('conversations') WHERE name = 'kind'",
        [],
        |row| row.get(0),
    )?;
    if !has_kind {
        conn.execute_batch("ALTER TABLE conversations ADD COLUMN kind TEXT NOT NULL DEFAULT 'self_service';")?;
        info!("Added kind column to conversations");
    }
    Ok(())
}

/// Raw conversation row; JSON columns are decoded outside the rusqlite closure.
struct ConversationRow {
    id: String,
    session_id: String,
    customer_id: String,
    messages_json: String,
    kind: String,
    agent_id: Option<u32>,
    analysis_json: Option<String>,
    updated_at: String,
}

impl ConversationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            customer_id: row.get(2)?,
            messages_json: row.get(3)?,
            kind: row.get(4)?,
            agent_id: row.get(5)?,
            analysis_json: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_document(self) -> Result<ConversationDocument> {
        let messages: Vec<Message> = serde_json::from_str(&self.messages_json)?;
        let kind = ConversationKind::parse(&self.kind)?;
        let analysis: Option<ConversationAnalysis> = self
            .analysis_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| ParleyError::Store(format!("Bad timestamp on {}: {}", self.id, e)))?;

        Ok(ConversationDocument {
            id: self.id,
            session_id: self.session_id,
            subject_id: self.customer_id,
            messages,
            kind,
            agent_id: self.agent_id,
            analysis,
            updated_at,
        })
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        migrate(&conn)?;

        info!("Opened conversation store at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ParleyError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn query_document(&self, filter: &str, key: &str) -> Result<Option<ConversationDocument>> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("{} {}", SELECT_CONVERSATION, filter),
                params![key],
                ConversationRow::from_row,
            )
            .optional()?
        };
        row.map(ConversationRow::into_document).transpose()
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    #[instrument(skip(self))]
    async fn read(&self, session_id: &str) -> Result<Option<ConversationDocument>> {
        self.query_document("WHERE session_id = ?1", session_id)
    }

    #[instrument(skip(self, doc), fields(id = %doc.id))]
    async fn upsert(&self, doc: &ConversationDocument) -> Result<()> {
        let messages_json = serde_json::to_string(&doc.messages)?;
        let analysis_json = doc.analysis.as_ref().map(serde_json::to_string).transpose()?;

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO conversations
            (id, session_id, customer_id, messages_json, kind, agent_id, analysis_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                doc.id,
                doc.session_id,
                doc.subject_id,
                messages_json,
                doc.kind.as_str(),
                doc.agent_id,
                analysis_json,
                doc.updated_at.to_rfc3339(),
            ],
        )?;

        debug!("Saved conversation {} ({} messages)", doc.id, doc.messages.len());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn latest_for_subject(&self, subject_id: &str) -> Result<Option<ConversationDocument>> {
        self.query_document(
            "WHERE customer_id = ?1 AND kind = 'self_service' ORDER BY updated_at DESC LIMIT 1",
            subject_id,
        )
    }
}

#[async_trait]
impl CustomerDirectory for SqliteStore {
    async fn customer(&self, customer_id: &str) -> Result<Option<CustomerProfile>> {
        let json: Option<String> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT profile_json FROM customers WHERE customer_id = ?1",
                params![customer_id],
                |row| row.get(0),
            )
            .optional()?
        };
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    async fn purchases(&self, customer_id: &str) -> Result<Vec<Purchase>> {
        let rows: Vec<String> = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT purchase_json FROM purchases WHERE customer_id = ?1 ORDER BY purchasing_date",
            )?;
            let rows = stmt
                .query_map(params![customer_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            rows
        };

        rows.iter()
            .map(|j| serde_json::from_str(j).map_err(ParleyError::from))
            .collect()
    }

    async fn upsert_customer(&self, profile: &CustomerProfile) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO customers (customer_id, profile_json) VALUES (?1, ?2)",
            params![profile.customer_id, json],
        )?;
        Ok(())
    }

    async fn add_purchase(&self, purchase: &Purchase) -> Result<()> {
        let json = serde_json::to_string(purchase)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO purchases (order_number, customer_id, purchasing_date, purchase_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![purchase.order_number, purchase.customer_id, purchase.purchasing_date, json],
        )?;
        Ok(())
    }
}
