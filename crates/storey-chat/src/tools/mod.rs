//! Tool registry and trait definition.
//!
//! Defines the `ProductTool` async trait, the closed `ToolName` set the
//! language model may call, and the registry that dispatches a call to the
//! matching handler. Tools never fail: every error is folded into the text
//! the model receives, so a bad tool call cannot abort the turn.

pub mod cart;
pub mod details;
pub mod filter;
pub mod recommend;
pub mod search;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use storey_core::config::SearchConfig;
use storey_core::types::Product;
use storey_storage::{CartService, Catalog};
use storey_vector::SemanticIndex;

use crate::error::ChatError;

pub use cart::AddToCartTool;
pub use details::GetProductDetailsTool;
pub use filter::FilterProductsTool;
pub use recommend::GetRecommendationsTool;
pub use search::SearchProductsTool;

/// Cart owner used when neither the model nor the turn names one.
pub const DEFAULT_CART_USER: &str = "guest_user";

/// The tools exposed to the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SearchProducts,
    FilterProducts,
    GetProductDetails,
    GetRecommendations,
    AddToCart,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::SearchProducts,
        ToolName::FilterProducts,
        ToolName::GetProductDetails,
        ToolName::GetRecommendations,
        ToolName::AddToCart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchProducts => "search_products",
            ToolName::FilterProducts => "filter_products",
            ToolName::GetProductDetails => "get_product_details",
            ToolName::GetRecommendations => "get_recommendations",
            ToolName::AddToCart => "add_to_cart",
        }
    }

    /// Whether this tool's product ids count as the turn's references.
    pub fn surfaces_products(&self) -> bool {
        matches!(self, ToolName::SearchProducts | ToolName::FilterProducts)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ChatError::UnknownTool(s.to_string()))
    }
}

/// Description of a tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: ToolName,
    pub description: String,
    /// JSON schema of the tool's arguments.
    pub parameters: Value,
}

/// Result of one tool call.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ToolOutput {
    /// What the model sees.
    pub content: String,
    /// Products the call surfaced, best first.
    pub product_ids: Vec<String>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            product_ids: Vec::new(),
        }
    }

    /// A JSON payload the model sees verbatim.
    pub fn json(payload: Value, product_ids: Vec<String>) -> Self {
        Self {
            content: payload.to_string(),
            product_ids,
        }
    }
}

/// Per-turn facts a tool may need.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub user_id: Option<String>,
}

/// Trait implemented by every tool.
#[async_trait]
pub trait ProductTool: Send + Sync {
    fn name(&self) -> ToolName;

    fn definition(&self) -> ToolDefinition;

    /// Run the tool. Must not panic and never fails; problems are
    /// reported inside the output.
    async fn call(&self, input: &Value, ctx: &ToolContext) -> ToolOutput;
}

/// Registry mapping each `ToolName` to its handler.
pub struct ToolRegistry {
    handlers: HashMap<ToolName, Arc<dyn ProductTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The five shopping tools wired to the given collaborators.
    pub fn standard(
        catalog: Arc<dyn Catalog>,
        index: Arc<dyn SemanticIndex>,
        cart: Arc<dyn CartService>,
        search: &SearchConfig,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SearchProductsTool::new(
            index.clone(),
            catalog.clone(),
            search.search_top_k,
        )));
        registry.register(Arc::new(FilterProductsTool::new(
            catalog.clone(),
            search.filter_default_limit,
            search.filter_preview_count,
        )));
        registry.register(Arc::new(GetProductDetailsTool::new(catalog.clone())));
        registry.register(Arc::new(GetRecommendationsTool::new(
            index,
            catalog.clone(),
            search.recommendation_k,
        )));
        registry.register(Arc::new(AddToCartTool::new(catalog, cart)));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn ProductTool>) {
        self.handlers.insert(tool.name(), tool);
    }

    /// Definitions in a stable order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolName::ALL
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    pub fn contains(&self, name: ToolName) -> bool {
        self.handlers.contains_key(&name)
    }

    /// Invoke a registered tool. A name without a handler is reported to
    /// the caller as `UnknownTool`.
    pub async fn invoke(
        &self,
        name: ToolName,
        input: &Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ChatError> {
        let tool = self
            .handlers
            .get(&name)
            .ok_or_else(|| ChatError::UnknownTool(name.to_string()))?;
        debug!(tool = %name, input = %input, "Invoking tool");
        let output = tool.call(input, ctx).await;
        info!(
            tool = %name,
            products = output.product_ids.len(),
            "Tool completed"
        );
        Ok(output)
    }

    /// Parse a raw tool name from the model and invoke it.
    pub async fn dispatch(
        &self,
        raw_name: &str,
        input: &Value,
        ctx: &ToolContext,
    ) -> Result<(ToolName, ToolOutput), ChatError> {
        let name: ToolName = raw_name.parse()?;
        let output = self.invoke(name, input, ctx).await?;
        Ok((name, output))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Input helpers shared by the tools
// ---------------------------------------------------------------------------

/// Tool input normalised to either an object or free text.
///
/// Models send arguments as a JSON object, a bare string, or a string that
/// itself holds JSON.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ToolInput {
    Object(Map<String, Value>),
    Text(String),
}

impl ToolInput {
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => ToolInput::Object(map.clone()),
            Value::String(s) => match serde_json::from_str::<Value>(s.trim()) {
                Ok(Value::Object(map)) => ToolInput::Object(map),
                Ok(Value::String(inner)) => ToolInput::Text(inner),
                _ => ToolInput::Text(s.clone()),
            },
            Value::Null => ToolInput::Text(String::new()),
            other => ToolInput::Text(other.to_string()),
        }
    }

    /// Free text, or the first string field among `keys` of an object.
    pub(crate) fn text_or_field(&self, keys: &[&str]) -> String {
        match self {
            ToolInput::Text(s) => s.trim().to_string(),
            ToolInput::Object(map) => keys
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Compact product summary used in tool payloads.
pub(crate) fn product_brief(p: &Product) -> Value {
    json!({
        "id": p.id,
        "name": p.name,
        "brand": p.brand,
        "price": p.price,
        "rating": p.rating,
        "in_stock": p.is_in_stock(),
    })
}

/// One line per product for the human-readable part of a payload.
pub(crate) fn summary_lines(products: &[Product]) -> String {
    products
        .iter()
        .map(|p| {
            if p.brand.is_empty() {
                format!("{} - ${:.2}", p.name, p.price)
            } else {
                format!("{} ({}) - ${:.2}", p.name, p.brand, p.price)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}


#[cfg(test)]
mod tests {
    use super::test_support::fixture;
    use super::*;

    #[test]
    fn test_tool_name_roundtrip() {
        for name in ToolName::ALL {
            assert_eq!(name.as_str().parse::<ToolName>().unwrap(), name);
        }
    }

    #[test]
    fn test_unknown_tool_name_rejected() {
        let err = "delete_everything".parse::<ToolName>().unwrap_err();
        assert!(matches!(err, ChatError::UnknownTool(ref n) if n == "delete_everything"));
    }

    #[test]
    fn test_only_search_and_filter_surface_products() {
        let surfacing: Vec<ToolName> = ToolName::ALL
            .into_iter()
            .filter(|t| t.surfaces_products())
            .collect();
        assert_eq!(surfacing, vec![ToolName::SearchProducts, ToolName::FilterProducts]);
    }

    #[test]
    fn test_tool_input_forms() {
        let obj = ToolInput::from_value(&json!({"product_id": "abc"}));
        assert_eq!(obj.text_or_field(&["product_id"]), "abc");

        let encoded = ToolInput::from_value(&json!("{\"product_id\": \"abc\", \"quantity\": 2}"));
        assert!(matches!(encoded, ToolInput::Object(_)));

        let raw = ToolInput::from_value(&json!("  wireless mouse "));
        assert_eq!(raw, ToolInput::Text("  wireless mouse ".to_string()));
        assert_eq!(raw.text_or_field(&["query"]), "wireless mouse");

        let quoted = ToolInput::from_value(&json!("\"desk\""));
        assert_eq!(quoted, ToolInput::Text("desk".to_string()));

        assert_eq!(ToolInput::from_value(&Value::Null).text_or_field(&[]), "");
    }

    #[tokio::test]
    async fn test_standard_registry_has_all_tools() {
        let fx = fixture().await;
        let registry = ToolRegistry::standard(
            fx.catalog.clone(),
            fx.index.clone(),
            fx.cart.clone(),
            &SearchConfig::default(),
        );
        let names: Vec<ToolName> = registry.definitions().iter().map(|d| d.name).collect();
        assert_eq!(names, ToolName::ALL.to_vec());
        for def in registry.definitions() {
            assert_eq!(def.parameters["type"], "object");
            assert!(!def.description.is_empty());
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_raw_name() {
        let fx = fixture().await;
        let registry = ToolRegistry::standard(
            fx.catalog.clone(),
            fx.index.clone(),
            fx.cart.clone(),
            &SearchConfig::default(),
        );
        let id = fx.by_name("Office Chair").id.clone();
        let (name, output) = registry
            .dispatch("get_product_details", &json!(id), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(name, ToolName::GetProductDetails);
        assert!(output.content.contains("Office Chair"));

        let err = registry
            .dispatch("checkout", &json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_invoke_unregistered_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .invoke(ToolName::AddToCart, &json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UnknownTool(_)));
    }
}
