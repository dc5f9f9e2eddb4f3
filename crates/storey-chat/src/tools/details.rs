//! `get_product_details`: formatted attribute dump of one product.

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use storey_core::types::Product;
use storey_storage::Catalog;

use super::{ProductTool, ToolContext, ToolDefinition, ToolInput, ToolName, ToolOutput};

pub const NOT_FOUND_MESSAGE: &str = "Product not found.";

pub struct GetProductDetailsTool {
    catalog: Arc<dyn Catalog>,
}

impl GetProductDetailsTool {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

/// Human-readable description of every attribute a shopper cares about.
pub fn format_details(p: &Product) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name: {}", p.name);
    if !p.brand.is_empty() {
        let _ = writeln!(out, "Brand: {}", p.brand);
    }
    match (p.original_price, p.discount()) {
        (Some(orig), Some(_)) => {
            let _ = write!(out, "Price: ${:.2} (was ${:.2}", p.price, orig);
            if let Some(pct) = p.sale_percentage {
                let _ = write!(out, ", {}% off", pct);
            }
            let _ = writeln!(out, ")");
        }
        _ => {
            let _ = writeln!(out, "Price: ${:.2}", p.price);
        }
    }
    let _ = writeln!(out, "Rating: {:.1}/5 ({} reviews)", p.rating, p.review_count);
    match &p.subcategory {
        Some(sub) => {
            let _ = writeln!(out, "Category: {} > {}", p.category, sub);
        }
        None => {
            let _ = writeln!(out, "Category: {}", p.category);
        }
    }
    if !p.description.is_empty() {
        let _ = writeln!(out, "Description: {}", p.description);
    }
    if !p.features.is_empty() {
        let _ = writeln!(out, "Features: {}", p.features.join(", "));
    }
    if p.is_in_stock() {
        let _ = write!(out, "Stock: {} available", p.stock);
    } else {
        let _ = write!(out, "Stock: out of stock");
    }
    out
}

#[async_trait]
impl ProductTool for GetProductDetailsTool {
    fn name(&self) -> ToolName {
        ToolName::GetProductDetails
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "Get full details (price, rating, features, stock) of one product by its id."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "product_id": {"type": "string"}
                },
                "required": ["product_id"]
            }),
        }
    }

    async fn call(&self, input: &Value, _ctx: &ToolContext) -> ToolOutput {
        let id = ToolInput::from_value(input).text_or_field(&["product_id", "id"]);
        if id.is_empty() {
            return ToolOutput::text(NOT_FOUND_MESSAGE);
        }
        match self.catalog.find_one(&id) {
            Ok(Some(product)) => ToolOutput::text(format_details(&product)),
            Ok(None) => ToolOutput::text(NOT_FOUND_MESSAGE),
            Err(e) => {
                warn!(product_id = %id, error = %e, "Product lookup failed");
                ToolOutput::text(format!("Could not load product details: {}", e))
            }
        }
    }
}
