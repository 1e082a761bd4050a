//! `search_web` tool.

use super::{parse_args, Tool, ToolDescriptor};
use crate::error::Result;
use crate::search::WebSearchClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const SEARCH_WEB: &str = "search_web";

#[derive(Debug, Deserialize)]
struct SearchWebArgs {
    query: String,
    #[serde(default)]
    up_to_date: bool,
}

/// Searches the web for product news, reviews and other outside information.
pub struct SearchWebTool {
    client: Arc<WebSearchClient>,
}

impl SearchWebTool {
    pub fn new(client: Arc<WebSearchClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            SEARCH_WEB,
            "Retrieves relevant information from the web for a query. Use it for questions \
             about current events, product news or anything not covered by the customer data.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to send to the web search engine."
                    },
                    "up_to_date": {
                        "type": "boolean",
                        "default": false,
                        "description": "Set to true to prefer the most recent results."
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let args: SearchWebArgs = parse_args(args)?;
        let records = self.client.search(&args.query, args.up_to_date).await?;
        Ok(serde_json::to_value(records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParleyError;
    use std::time::Duration;

    fn tool() -> SearchWebTool {
        let client = WebSearchClient::new("http://127.0.0.1:9/search", None, Duration::from_secs(1)).unwrap();
        SearchWebTool::new(Arc::new(client))
    }

    #[test]
    fn test_descriptor_requires_query() {
        let descriptor = tool().descriptor();
        assert_eq!(descriptor.name, "search_web");
        assert_eq!(descriptor.parameters["required"], json!(["query"]));
        assert_eq!(descriptor.parameters["properties"]["up_to_date"]["type"], "boolean");
    }

    #[tokio::test]
    async fn test_call_serializes_records() {
        use crate::search::testing::{client, spawn, FakeBing};

        let endpoint = spawn(Arc::new(FakeBing::default())).await;
        let tool = SearchWebTool::new(Arc::new(client(&endpoint)));

        let value = tool.call(json!({"query": "Essenza Mini"})).await.unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0],
            json!({"source": "Essenza Mini review", "content": "Compact and quick.", "url": "https://example.com/a"})
        );
    }

    #[tokio::test]
    async fn test_missing_query_is_argument_error() {
        let err = tool().call(json!({"up_to_date": true})).await.unwrap_err();
        assert!(matches!(err, ParleyError::InvalidArguments(_)));
    }
}
