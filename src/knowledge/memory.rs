//! In-memory knowledge index, for tests and small article sets.

use super::{cosine_similarity, rank, Article, ArticleMatch, KnowledgeIndex};
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryKnowledgeIndex {
    articles: RwLock<HashMap<Uuid, Article>>,
}

impl MemoryKnowledgeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, Article>>> {
        self.articles
            .read()
            .map_err(|e| ParleyError::KnowledgeBase(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, Article>>> {
        self.articles
            .write()
            .map_err(|e| ParleyError::KnowledgeBase(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl KnowledgeIndex for MemoryKnowledgeIndex {
    async fn upsert(&self, article: &Article) -> Result<()> {
        self.write()?.insert(article.id, article.clone());
        Ok(())
    }

    async fn upsert_batch(&self, articles: &[Article]) -> Result<usize> {
        let mut store = self.write()?;
        for article in articles {
            store.insert(article.id, article.clone());
        }
        Ok(articles.len())
    }

    async fn search_with_threshold(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ArticleMatch>> {
        let matches = self
            .read()?
            .values()
            .map(|article| ArticleMatch {
                score: cosine_similarity(query_embedding, &article.embedding),
                article: article.clone(),
            })
            .filter(|m| m.score >= min_score)
            .collect();

        Ok(rank(matches, limit))
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Article>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn delete(&self, id: &Uuid) -> Result<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}
