//! Knowledge-base articles with embedding search.
//!
//! Articles (FAQ entries, product manuals, policies) are embedded once at
//! import time and matched against customer questions by cosine similarity.

mod memory;
mod sqlite;

pub use memory::MemoryKnowledgeIndex;
pub use sqlite::SqliteKnowledgeIndex;

use crate::config::Settings;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// An indexed knowledge-base article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    /// Where the article came from, e.g. `faq` or `manual`.
    pub source: String,
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    pub embedding: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
}

impl Article {
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        url: Option<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            title: title.into(),
            content: content.into(),
            url,
            embedding,
            indexed_at: Utc::now(),
        }
    }
}

/// An article matched by a search, with its similarity score.
#[derive(Debug, Clone)]
pub struct ArticleMatch {
    pub article: Article,
    pub score: f32,
}

/// Article as found in an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleSource {
    #[serde(default = "default_source")]
    pub source: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_source() -> String {
    "import".to_string()
}

/// Storage for embedded articles.
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    async fn upsert(&self, article: &Article) -> Result<()>;

    async fn upsert_batch(&self, articles: &[Article]) -> Result<usize>;

    /// Best matches scoring at least `min_score`, highest first.
    async fn search_with_threshold(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ArticleMatch>>;

    async fn get(&self, id: &Uuid) -> Result<Option<Article>>;

    /// Returns whether an article was removed.
    async fn delete(&self, id: &Uuid) -> Result<bool>;

    async fn count(&self) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Rank `matches` by score and keep the best `limit`.
fn rank(mut matches: Vec<ArticleMatch>, limit: usize) -> Vec<ArticleMatch> {
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches.truncate(limit);
    matches
}

/// Knowledge index paired with the embedder that feeds it.
#[derive(Clone)]
pub struct KnowledgeBase {
    index: Arc<dyn KnowledgeIndex>,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeBase {
    pub fn new(index: Arc<dyn KnowledgeIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    /// OpenAI embeddings over the SQLite index at `knowledge.sqlite_path`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = OpenAIEmbedder::from_settings(
            &settings.embedding,
            settings.llm.api_base.as_deref(),
            settings.llm.request_timeout(),
        )?;
        let index = SqliteKnowledgeIndex::new(&settings.knowledge_path())?;
        Ok(Self::new(Arc::new(index), Arc::new(embedder)))
    }

    pub fn index(&self) -> &Arc<dyn KnowledgeIndex> {
        &self.index
    }

    /// Embed and store one article.
    #[instrument(skip(self, content))]
    pub async fn add_article(
        &self,
        source: &str,
        title: &str,
        content: &str,
        url: Option<String>,
    ) -> Result<Article> {
        if content.trim().is_empty() {
            return Err(ParleyError::InvalidInput(format!("article '{}' has no content", title)));
        }

        let embedding = self.embedder.embed(&embed_text(title, content)).await?;
        let article = Article::new(source, title, content, url, embedding);
        self.index.upsert(&article).await?;
        debug!("Indexed article {} ({})", article.id, title);
        Ok(article)
    }

    /// Embed and store many articles with batched embedding calls.
    pub async fn import(&self, sources: Vec<ArticleSource>) -> Result<usize> {
        let sources: Vec<ArticleSource> = sources
            .into_iter()
            .filter(|s| !s.content.trim().is_empty())
            .collect();
        if sources.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = sources.iter().map(|s| embed_text(&s.title, &s.content)).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != sources.len() {
            return Err(ParleyError::Embedding(format!(
                "expected {} embeddings, got {}",
                sources.len(),
                embeddings.len()
            )));
        }

        let articles: Vec<Article> = sources
            .into_iter()
            .zip(embeddings)
            .map(|(s, embedding)| Article::new(s.source, s.title, s.content, s.url, embedding))
            .collect();

        let stored = self.index.upsert_batch(&articles).await?;
        info!("Imported {} articles", stored);
        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: usize, min_score: f32) -> Result<Vec<ArticleMatch>> {
        let embedding = self.embedder.embed(query).await?;
        self.index.search_with_threshold(&embedding, limit, min_score).await
    }
}

fn embed_text(title: &str, content: &str) -> String {
    format!("{}\n\n{}", title, content)
}

/// Read a JSON array of articles for bulk import.
pub fn load_articles(path: &Path) -> Result<Vec<ArticleSource>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| {
        ParleyError::KnowledgeBase(format!("Invalid article file {}: {}", path.display(), e))
    })
}
