//! `search_products`: semantic search over the product index.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use storey_core::error::StoreyError;
use storey_core::types::Product;
use storey_storage::Catalog;
use storey_vector::SemanticIndex;

use super::{product_brief, summary_lines, ProductTool, ToolContext, ToolDefinition, ToolInput, ToolName, ToolOutput};

pub const NO_RESULTS_MESSAGE: &str = "No products found matching your search.";

pub struct SearchProductsTool {
    index: Arc<dyn SemanticIndex>,
    catalog: Arc<dyn Catalog>,
    top_k: usize,
}

impl SearchProductsTool {
    pub fn new(index: Arc<dyn SemanticIndex>, catalog: Arc<dyn Catalog>, top_k: usize) -> Self {
        Self { index, catalog, top_k }
    }

    /// Ranked active products for `query`. Hits that no longer resolve to
    /// an active catalog product are dropped.
    async fn search(&self, query: &str) -> Result<Vec<Product>, StoreyError> {
        let hits = self.index.query(query, self.top_k).await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = hits.into_iter().map(|h| h.id).collect();
        let products = self.catalog.find_many(&ids)?;
        Ok(products.into_iter().filter(|p| p.is_active).collect())
    }
}

#[async_trait]
impl ProductTool for SearchProductsTool {
    fn name(&self) -> ToolName {
        ToolName::SearchProducts
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "Search the catalog by meaning. Use for open-ended requests such as \
                          'something to keep my coffee warm'. Returns the best matching products."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What the shopper is looking for, in plain words"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, input: &Value, _ctx: &ToolContext) -> ToolOutput {
        let query = ToolInput::from_value(input).text_or_field(&["query", "q", "text"]);
        if query.is_empty() {
            return ToolOutput::json(
                json!({"message": "Please provide something to search for.", "product_ids": []}),
                Vec::new(),
            );
        }

        match self.search(&query).await {
            Ok(products) if products.is_empty() => {
                ToolOutput::json(json!({"message": NO_RESULTS_MESSAGE, "product_ids": []}), Vec::new())
            }
            Ok(products) => {
                let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
                let payload = json!({
                    "message": format!("Found {} products: {}", products.len(), summary_lines(&products)),
                    "product_ids": ids,
                    "products": products.iter().map(product_brief).collect::<Vec<_>>(),
                });
                ToolOutput::json(payload, ids)
            }
            Err(e) => {
                warn!(query = %query, error = %e, "Product search failed");
                ToolOutput::json(
                    json!({"message": format!("Search is unavailable right now: {}", e), "product_ids": []}),
                    Vec::new(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::fixture;
    use storey_vector::ProductIndex;
    use storey_vector::HashingEmbedding;

    #[tokio::test]
    async fn test_search_ranks_matching_product_first() {
        let fx = fixture().await;
        let tool = SearchProductsTool::new(fx.index.clone(), fx.catalog.clone(), 6);
        let out = tool
            .call(&json!({"query": "wireless mouse"}), &ToolContext::default())
            .await;
        assert_eq!(out.product_ids[0], fx.by_name("Wireless Mouse X200").id);
        assert!(out.product_ids.len() <= 6);

        let payload: Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(payload["product_ids"].as_array().unwrap().len(), out.product_ids.len());
        assert!(payload["message"].as_str().unwrap().starts_with("Found"));
    }

    #[tokio::test]
    async fn test_search_accepts_plain_string() {
        let fx = fixture().await;
        let tool = SearchProductsTool::new(fx.index.clone(), fx.catalog.clone(), 2);
        let out = tool.call(&json!("standing desk"), &ToolContext::default()).await;
        assert_eq!(out.product_ids.len(), 2);
        assert_eq!(out.product_ids[0], fx.by_name("Standing Desk").id);
    }

    #[tokio::test]
    async fn test_search_no_matches_is_not_an_error() {
        let fx = fixture().await;
        let empty = Arc::new(ProductIndex::new(Arc::new(HashingEmbedding::default())));
        let tool = SearchProductsTool::new(empty, fx.catalog.clone(), 6);
        let out = tool.call(&json!({"query": "anything"}), &ToolContext::default()).await;

        assert!(out.product_ids.is_empty());
        let payload: Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(payload["message"], NO_RESULTS_MESSAGE);
        assert_eq!(payload["product_ids"], json!([]));
    }

    #[tokio::test]
    async fn test_search_unrelated_query_finds_nothing() {
        let fx = fixture().await;
        let tool = SearchProductsTool::new(fx.index.clone(), fx.catalog.clone(), 6);
        let out = tool
            .call(&json!({"query": "zzqx plutonium"}), &ToolContext::default())
            .await;

        assert!(out.product_ids.is_empty());
        let payload: Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(payload["message"], NO_RESULTS_MESSAGE);
        assert_eq!(payload["product_ids"], json!([]));
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let fx = fixture().await;
        let tool = SearchProductsTool::new(fx.index.clone(), fx.catalog.clone(), 6);
        let out = tool.call(&json!({"query": "   "}), &ToolContext::default()).await;
        assert!(out.product_ids.is_empty());
    }
}
