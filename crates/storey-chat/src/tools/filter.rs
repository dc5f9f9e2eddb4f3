//! `filter_products`: structured attribute filtering over the catalog.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use storey_core::error::StoreyError;
use storey_core::types::{Product, ProductFilter};
use storey_storage::Catalog;

use super::{product_brief, summary_lines, ProductTool, ToolContext, ToolDefinition, ToolInput, ToolName, ToolOutput};

/// Arguments the model may supply. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterArgs {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub in_stock_only: bool,
    pub features: Vec<String>,
    pub search_query: Option<String>,
    pub limit: Option<usize>,
}

impl FilterArgs {
    fn into_filter(self, default_limit: usize) -> ProductFilter {
        let limit = self.limit.filter(|l| *l > 0).unwrap_or(default_limit);
        ProductFilter {
            ids: None,
            category: non_blank(self.category),
            subcategory: non_blank(self.subcategory),
            brand: non_blank(self.brand),
            min_price: self.min_price,
            max_price: self.max_price,
            min_rating: self.min_rating,
            in_stock_only: self.in_stock_only,
            features: self
                .features
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            search_query: non_blank(self.search_query),
            active_only: true,
            limit: Some(limit),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Matches for one filter call.
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// Every match up to the limit, best rated first.
    pub products: Vec<Product>,
    /// The leading ids handed to the model.
    pub preview_ids: Vec<String>,
}

pub struct FilterProductsTool {
    catalog: Arc<dyn Catalog>,
    default_limit: usize,
    preview_count: usize,
}

impl FilterProductsTool {
    pub fn new(catalog: Arc<dyn Catalog>, default_limit: usize, preview_count: usize) -> Self {
        Self {
            catalog,
            default_limit: default_limit.max(1),
            preview_count,
        }
    }

    pub fn run(&self, args: FilterArgs) -> Result<FilterResult, StoreyError> {
        let filter = args.into_filter(self.default_limit);
        let products = self.catalog.find(&filter)?;
        let preview_ids = products
            .iter()
            .take(self.preview_count)
            .map(|p| p.id.clone())
            .collect();
        Ok(FilterResult { products, preview_ids })
    }

    fn parse_args(input: &Value) -> Result<FilterArgs, String> {
        match ToolInput::from_value(input) {
            ToolInput::Object(map) => {
                serde_json::from_value(Value::Object(map)).map_err(|e| format!("Invalid filters: {}", e))
            }
            ToolInput::Text(text) if text.trim().is_empty() => Ok(FilterArgs::default()),
            ToolInput::Text(text) => Ok(FilterArgs {
                search_query: Some(text),
                ..FilterArgs::default()
            }),
        }
    }
}

#[async_trait]
impl ProductTool for FilterProductsTool {
    fn name(&self) -> ToolName {
        ToolName::FilterProducts
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "Filter the catalog by attributes such as category, brand, price range, \
                          minimum rating, stock or features. All filters are optional and combined. \
                          Results are sorted by rating."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "category": {"type": "string"},
                    "subcategory": {"type": "string"},
                    "brand": {"type": "string"},
                    "min_price": {"type": "number", "description": "Inclusive lower price bound"},
                    "max_price": {"type": "number", "description": "Inclusive upper price bound"},
                    "min_rating": {"type": "number"},
                    "in_stock_only": {"type": "boolean"},
                    "features": {"type": "array", "items": {"type": "string"}},
                    "search_query": {"type": "string", "description": "Text that must appear in the product"},
                    "limit": {"type": "integer", "minimum": 1}
                }
            }),
        }
    }

    async fn call(&self, input: &Value, _ctx: &ToolContext) -> ToolOutput {
        let args = match Self::parse_args(input) {
            Ok(args) => args,
            Err(message) => {
                return ToolOutput::json(
                    json!({"success": false, "message": message, "product_ids": []}),
                    Vec::new(),
                )
            }
        };

        match self.run(args) {
            Ok(result) if result.products.is_empty() => ToolOutput::json(
                json!({
                    "message": "No products match those filters.",
                    "total": 0,
                    "product_ids": [],
                }),
                Vec::new(),
            ),
            Ok(result) => {
                let preview: Vec<Product> = result
                    .products
                    .iter()
                    .take(self.preview_count)
                    .cloned()
                    .collect();
                let payload = json!({
                    "message": format!(
                        "Found {} products. Top picks: {}",
                        result.products.len(),
                        summary_lines(&preview)
                    ),
                    "total": result.products.len(),
                    "product_ids": result.preview_ids,
                    "products": preview.iter().map(product_brief).collect::<Vec<_>>(),
                });
                ToolOutput::json(payload, result.preview_ids)
            }
            Err(e) => {
                warn!(error = %e, "Product filter failed");
                ToolOutput::json(
                    json!({"success": false, "message": format!("Filtering failed: {}", e), "product_ids": []}),
                    Vec::new(),
                )
            }
        }
    }
}
