//! `add_to_cart`: resolve a product by id or partial name and add it to a
//! shopper's cart.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use storey_core::error::StoreyError;
use storey_core::types::{Product, PRODUCT_ID_LEN};
use storey_storage::{CartService, Catalog};

use super::{ProductTool, ToolContext, ToolDefinition, ToolInput, ToolName, ToolOutput, DEFAULT_CART_USER};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddToCartArgs {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_quantity() -> i64 {
    1
}

/// True when `reference` cannot be a canonical product id and should be
/// matched against product names instead.
pub fn is_name_fragment(reference: &str) -> bool {
    reference.len() < PRODUCT_ID_LEN || reference.chars().any(char::is_whitespace)
}

pub struct AddToCartTool {
    catalog: Arc<dyn Catalog>,
    cart: Arc<dyn CartService>,
}

impl AddToCartTool {
    pub fn new(catalog: Arc<dyn Catalog>, cart: Arc<dyn CartService>) -> Self {
        Self { catalog, cart }
    }

    /// Look up the product a reference points at: by id when it has the
    /// shape of one, else the first product whose name contains it.
    pub fn resolve(&self, reference: &str) -> Result<Option<Product>, StoreyError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Ok(None);
        }
        if is_name_fragment(reference) {
            Ok(self.catalog.find_by_name(reference, 1)?.into_iter().next())
        } else {
            self.catalog.find_one(reference)
        }
    }

    fn parse_args(input: &Value) -> Result<AddToCartArgs, String> {
        match ToolInput::from_value(input) {
            ToolInput::Object(map) => serde_json::from_value(Value::Object(map))
                .map_err(|e| format!("Invalid cart request: {}", e)),
            ToolInput::Text(text) => Ok(AddToCartArgs {
                product_id: text,
                quantity: 1,
                user_id: None,
            }),
        }
    }

    fn add(&self, args: AddToCartArgs, ctx: &ToolContext) -> Value {
        let product = match self.resolve(&args.product_id) {
            Ok(Some(product)) => product,
            Ok(None) => {
                return failure(format!("Product '{}' not found.", args.product_id.trim()));
            }
            Err(e) => {
                warn!(reference = %args.product_id, error = %e, "Cart product lookup failed");
                return failure(format!("Could not look up the product: {}", e));
            }
        };

        let user_id = args
            .user_id
            .filter(|u| !u.trim().is_empty())
            .or_else(|| ctx.user_id.clone())
            .unwrap_or_else(|| DEFAULT_CART_USER.to_string());

        match self.cart.add(&user_id, &product.id, args.quantity) {
            Ok(item) => {
                info!(user_id = %user_id, product_id = %product.id, quantity = args.quantity, "Added to cart");
                json!({
                    "success": true,
                    "message": format!("Added {} x {} to your cart.", args.quantity, product.name),
                    "product": {
                        "id": product.id,
                        "name": product.name,
                        "price": product.price,
                    },
                    "quantity": args.quantity,
                    "cart_quantity": item.quantity,
                })
            }
            Err(StoreyError::InvalidInput(msg)) => failure(msg),
            Err(StoreyError::NotFound(_)) => failure(format!("{} is no longer available.", product.name)),
            Err(e) => {
                warn!(user_id = %user_id, product_id = %product.id, error = %e, "Cart update failed");
                failure(format!("Could not add to cart: {}", e))
            }
        }
    }
}

fn failure(message: String) -> Value {
    json!({"success": false, "message": message})
}

#[async_trait]
impl ProductTool for AddToCartTool {
    fn name(&self) -> ToolName {
        ToolName::AddToCart
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: "Add a product to the shopper's cart. product_id may be an exact id or \
                          part of the product name."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "product_id": {"type": "string", "description": "Product id or partial name"},
                    "quantity": {"type": "integer", "minimum": 1, "default": 1},
                    "user_id": {"type": "string"}
                },
                "required": ["product_id"]
            }),
        }
    }

    async fn call(&self, input: &Value, ctx: &ToolContext) -> ToolOutput {
        let payload = match Self::parse_args(input) {
            Ok(args) => self.add(args, ctx),
            Err(message) => failure(message),
        };
        ToolOutput::json(payload, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::fixture;

    fn parse(out: &ToolOutput) -> Value {
        serde_json::from_str(&out.content).unwrap()
    }

    #[test]
    fn test_name_fragment_detection() {
        let id = storey_core::types::new_product_id();
        assert!(!is_name_fragment(&id));
        assert!(is_name_fragment("wireless mouse"));
        assert!(is_name_fragment("abc123"));
        assert!(is_name_fragment(&format!("{} x", &id[..30])));
    }

    #[tokio::test]
    async fn test_resolve_partial_name_case_insensitive() {
        let fx = fixture().await;
        let tool = AddToCartTool::new(fx.catalog.clone(), fx.cart.clone());
        let resolved = tool.resolve("wireless mouse").unwrap().unwrap();
        assert_eq!(resolved.id, fx.by_name("Wireless Mouse X200").id);
    }

    #[tokio::test]
    async fn test_resolve_folds_non_ascii_case() {
        let fx = fixture().await;
        let screen = Product::new("ÉCRAN Tactile Pro", "Electronics", "Glow", 320.0);
        fx.catalog.insert(&screen).unwrap();

        let tool = AddToCartTool::new(fx.catalog.clone(), fx.cart.clone());
        let resolved = tool.resolve("écran tactile").unwrap().unwrap();
        assert_eq!(resolved.id, screen.id);
    }

    #[tokio::test]
    async fn test_add_by_name_fragment() {
        let fx = fixture().await;
        let tool = AddToCartTool::new(fx.catalog.clone(), fx.cart.clone());
        let out = tool
            .call(
                &json!({"product_id": "wireless mouse", "quantity": 2}),
                &ToolContext::default(),
            )
            .await;
        let payload = parse(&out);
        assert_eq!(payload["success"], true);
        assert_eq!(payload["message"], "Added 2 x Wireless Mouse X200 to your cart.");
        assert_eq!(payload["product"]["price"], 29.99);

        let items = fx.cart.items(DEFAULT_CART_USER).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_add_by_id_uses_turn_user() {
        let fx = fixture().await;
        let tool = AddToCartTool::new(fx.catalog.clone(), fx.cart.clone());
        let chair = fx.by_name("Office Chair");
        let ctx = ToolContext {
            user_id: Some("alice".to_string()),
        };
        let out = tool.call(&json!(chair.id), &ctx).await;
        assert_eq!(parse(&out)["success"], true);
        assert_eq!(fx.cart.items("alice").unwrap()[0].product_id, chair.id);
    }

    #[tokio::test]
    async fn test_explicit_user_wins() {
        let fx = fixture().await;
        let tool = AddToCartTool::new(fx.catalog.clone(), fx.cart.clone());
        let ctx = ToolContext {
            user_id: Some("alice".to_string()),
        };
        tool.call(&json!({"product_id": "desk lamp", "user_id": "bob"}), &ctx)
            .await;
        assert_eq!(fx.cart.items("bob").unwrap().len(), 1);
        assert!(fx.cart.items("alice").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let fx = fixture().await;
        let tool = AddToCartTool::new(fx.catalog.clone(), fx.cart.clone());
        let out = tool
            .call(&json!({"product_id": "flux capacitor"}), &ToolContext::default())
            .await;
        let payload = parse(&out);
        assert_eq!(payload["success"], false);
        assert!(payload["message"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_bad_quantity_is_reported() {
        let fx = fixture().await;
        let tool = AddToCartTool::new(fx.catalog.clone(), fx.cart.clone());
        let out = tool
            .call(&json!({"product_id": "keyboard", "quantity": 0}), &ToolContext::default())
            .await;
        assert_eq!(parse(&out)["success"], false);
        assert!(fx.cart.items(DEFAULT_CART_USER).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_input() {
        let fx = fixture().await;
        let tool = AddToCartTool::new(fx.catalog.clone(), fx.cart.clone());
        let out = tool.call(&json!({"quantity": 3}), &ToolContext::default()).await;
        assert_eq!(parse(&out)["success"], false);
    }
}
