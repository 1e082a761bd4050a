//! SQLite-backed knowledge index.
//!
//! Embeddings are stored as little-endian f32 blobs and compared in Rust,
//! which is fine for article sets in the thousands.

use super::{cosine_similarity, rank, Article, ArticleMatch, KnowledgeIndex};
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    url TEXT,
    embedding BLOB NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source);
"#;

const UPSERT: &str = r#"
INSERT OR REPLACE INTO articles (id, source, title, content, url, embedding, indexed_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#;

const SELECT: &str = "SELECT id, source, title, content, url, embedding, indexed_at FROM articles";

pub struct SqliteKnowledgeIndex {
    conn: Mutex<Connection>,
}

impl SqliteKnowledgeIndex {
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened knowledge index at {:?}", path);
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
            .map_err(|e| ParleyError::KnowledgeBase(format!("Failed to acquire lock: {}", e)))
    }

    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn article_from_row(row: &Row<'_>) -> rusqlite::Result<Article> {
        let id: String = row.get(0)?;
        let embedding: Vec<u8> = row.get(5)?;
        let indexed_at: String = row.get(6)?;

        Ok(Article {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            source: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            url: row.get(4)?,
            embedding: Self::bytes_to_embedding(&embedding),
            indexed_at: DateTime::parse_from_rfc3339(&indexed_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn insert(conn: &Connection, article: &Article) -> Result<()> {
        conn.execute(
            UPSERT,
            params![
                article.id.to_string(),
                article.source,
                article.title,
                article.content,
                article.url,
                Self::embedding_to_bytes(&article.embedding),
                article.indexed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl KnowledgeIndex for SqliteKnowledgeIndex {
    #[instrument(skip(self, article), fields(id = %article.id))]
    async fn upsert(&self, article: &Article) -> Result<()> {
        let conn = self.lock()?;
        Self::insert(&conn, article)?;
        debug!("Upserted article {}", article.id);
        Ok(())
    }

    #[instrument(skip(self, articles), fields(count = articles.len()))]
    async fn upsert_batch(&self, articles: &[Article]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        for article in articles {
            Self::insert(&tx, article)?;
        }
        tx.commit()?;
        info!("Batch upserted {} articles", articles.len());
        Ok(articles.len())
    }

    #[instrument(skip(self, query_embedding))]
    async fn search_with_threshold(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ArticleMatch>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(SELECT)?;

        let matches: Vec<ArticleMatch> = stmt
            .query_map([], Self::article_from_row)?
            .filter_map(|row| row.ok())
            .map(|article| ArticleMatch {
                score: cosine_similarity(query_embedding, &article.embedding),
                article,
            })
            .filter(|m| m.score >= min_score)
            .collect();

        let matches = rank(matches, limit);
        debug!("Found {} matching articles", matches.len());
        Ok(matches)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Article>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            &format!("{} WHERE id = ?1", SELECT),
            params![id.to_string()],
            Self::article_from_row,
        );

        match result {
            Ok(article) => Ok(Some(article)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM articles WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
