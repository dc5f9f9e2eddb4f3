//! `get_recommendations`: similar products for an id, or matches for a
//! free-text preference.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use storey_core::error::StoreyError;
use storey_core::types::Product;
use storey_storage::Catalog;
use storey_vector::SemanticIndex;

use super::{product_brief, summary_lines, ProductTool, ToolContext, ToolDefinition, ToolInput, ToolName, ToolOutput};

pub struct GetRecommendationsTool {
    index: Arc<dyn SemanticIndex>,
    catalog: Arc<dyn Catalog>,
    k: usize,
}

impl GetRecommendationsTool {
    pub fn new(index: Arc<dyn SemanticIndex>, catalog: Arc<dyn Catalog>, k: usize) -> Self {
        Self { index, catalog, k }
    }

    /// Up to `k` recommendations. When `input` names a product, its own
    /// text drives the query and the product itself is excluded.
    pub async fn recommend(&self, input: &str) -> Result<Vec<Product>, StoreyError> {
        let (query, exclude, fetch) = match self.catalog.find_one(input)? {
            Some(anchor) => {
                debug!(product_id = %anchor.id, "Recommending products similar to anchor");
                (anchor.search_text(), Some(anchor.id), self.k + 1)
            }
            None => (input.to_string(), None, self.k),
        };

        let ids: Vec<String> = self
            .index
            .query(&query, fetch)
            .await?
            .into_iter()
            .map(|hit| hit.id)
            .filter(|id| exclude.as_deref() != Some(id.as_str()))
            .collect();

        let mut products: Vec<Product> = self
            .catalog
            .find_many(&ids)?
            .into_iter()
            .filter(|p| p.is_active)
            .collect();
        products.truncate(self.k);
        Ok(products)
    }
}

#[async_trait]
impl ProductTool for GetRecommendationsTool {
    fn name(&self) -> ToolName {
        ToolName::GetRecommendations
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "Recommend products. Pass a product id to get similar items, or describe \
                          the shopper's preferences in words."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "A product id or a free-text preference"
                    }
                },
                "required": ["input"]
            }),
        }
    }

    async fn call(&self, input: &Value, _ctx: &ToolContext) -> ToolOutput {
        let text = ToolInput::from_value(input).text_or_field(&["input", "product_id", "query", "preferences"]);
        if text.is_empty() {
            return ToolOutput::json(
                json!({"message": "Tell me a product or what you like and I can recommend something.", "product_ids": []}),
                Vec::new(),
            );
        }

        match self.recommend(&text).await {
            Ok(products) if products.is_empty() => ToolOutput::json(
                json!({"message": "No recommendations found.", "product_ids": []}),
                Vec::new(),
            ),
            Ok(products) => {
                let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
                let payload = json!({
                    "message": format!("Recommended: {}", summary_lines(&products)),
                    "product_ids": ids,
                    "products": products.iter().map(product_brief).collect::<Vec<_>>(),
                });
                ToolOutput::json(payload, ids)
            }
            Err(e) => {
                warn!(input = %text, error = %e, "Recommendation failed");
                ToolOutput::json(
                    json!({"message": format!("Recommendations are unavailable right now: {}", e), "product_ids": []}),
                    Vec::new(),
                )
            }
        }
    }
}
