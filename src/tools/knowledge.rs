//! `search_knowledge_base` tool.

use super::{parse_args, Tool, ToolDescriptor};
use crate::error::Result;
use crate::knowledge::KnowledgeBase;
use crate::search::SearchRecord;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub const SEARCH_KNOWLEDGE_BASE: &str = "search_knowledge_base";

#[derive(Debug, Deserialize)]
struct KnowledgeArgs {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

/// Searches the company's own articles (FAQ, manuals, policies).
pub struct KnowledgeSearchTool {
    knowledge: KnowledgeBase,
    max_results: usize,
    min_score: f32,
}

impl KnowledgeSearchTool {
    pub fn new(knowledge: KnowledgeBase) -> Self {
        Self {
            knowledge,
            max_results: 5,
            min_score: 0.3,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            SEARCH_KNOWLEDGE_BASE,
            "Searches the company knowledge base (FAQ, product manuals, return and warranty \
             policies). Prefer it over web search for questions about our own products and policies.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look up in the knowledge base."
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of articles to return."
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let args: KnowledgeArgs = parse_args(args)?;
        let limit = args.limit.unwrap_or(self.max_results).clamp(1, self.max_results.max(1));

        let records: Vec<SearchRecord> = self
            .knowledge
            .search(&args.query, limit, self.min_score)
            .await?
            .into_iter()
            .map(|m| SearchRecord {
                source: m.article.title,
                content: m.article.content,
                url: m.article.url.unwrap_or_default(),
            })
            .collect();

        Ok(serde_json::to_value(records)?)
    }
}
