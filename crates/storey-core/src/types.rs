use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Length of a canonical product identifier (a hyphen-free UUID).
pub const PRODUCT_ID_LEN: usize = 32;

/// Generate a fresh canonical product identifier.
pub fn new_product_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// =============================================================================
// Enums
// =============================================================================

/// Kind of assistant/user message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text without product references.
    #[default]
    Text,
    /// A reply that references one or more products.
    Product,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Product => "product",
        }
    }

    /// Parse the stored tag. Unknown tags read back as `Text`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "product" => MessageType::Product,
            _ => MessageType::Text,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Core structs
// =============================================================================

/// A catalog product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default = "new_product_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub original_price: Option<f64>,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub is_on_sale: bool,
    #[serde(default)]
    pub sale_percentage: Option<u32>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Identifier of the product's vector in the semantic index, once embedded.
    #[serde(default)]
    pub embedding_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Product {
    /// Create an active product with a fresh identifier and the given
    /// essentials. Remaining attributes start empty.
    pub fn new(name: &str, category: &str, brand: &str, price: f64) -> Self {
        let now = Utc::now();
        Self {
            id: new_product_id(),
            name: name.to_string(),
            description: String::new(),
            price,
            original_price: None,
            category: category.to_string(),
            subcategory: None,
            brand: brand.to_string(),
            rating: 0.0,
            review_count: 0,
            image_url: None,
            stock: 0,
            features: Vec::new(),
            is_on_sale: false,
            sale_percentage: None,
            created_at: now,
            updated_at: now,
            is_active: true,
            embedding_id: None,
        }
    }

    /// Text fed to the embedder: name, description, brand, category,
    /// subcategory and features joined by spaces.
    pub fn search_text(&self) -> String {
        let mut parts: Vec<&str> = vec![&self.name, &self.description, &self.brand, &self.category];
        if let Some(sub) = &self.subcategory {
            parts.push(sub);
        }
        parts.extend(self.features.iter().map(String::as_str));
        parts
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Absolute discount against `original_price`, if the product has one.
    pub fn discount(&self) -> Option<f64> {
        self.original_price
            .filter(|orig| *orig > self.price)
            .map(|orig| orig - self.price)
    }

    /// True when any field that contributes to `search_text` differs.
    pub fn content_differs(&self, other: &Product) -> bool {
        self.name != other.name
            || self.description != other.description
            || self.features != other.features
            || self.category != other.category
            || self.subcategory != other.subcategory
            || self.brand != other.brand
    }
}

/// A chat session. Sessions are only ever deactivated, never deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: Option<String>,
    /// Free-form state opaque to the chat core.
    pub session_data: Map<String, Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Identifiers of the session's messages, oldest first.
    pub message_ids: Vec<String>,
}

impl ChatSession {
    pub fn new(id: &str, user_id: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            user_id: user_id.map(str::to_string),
            session_data: Map::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
            message_ids: Vec::new(),
        }
    }
}

/// A persisted chat message. Immutable once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub is_bot: bool,
    pub message_type: MessageType,
    /// Referenced products in the order they were attributed.
    pub product_ids: Vec<String>,
    /// Open extension map.
    pub extra_data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A user-origin text message.
    pub fn user(session_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            content: content.to_string(),
            is_bot: false,
            message_type: MessageType::Text,
            product_ids: Vec::new(),
            extra_data: Map::new(),
            created_at: Utc::now(),
        }
    }

    /// An assistant-origin message; typed `Product` iff `product_ids` is non-empty.
    pub fn assistant(session_id: &str, content: &str, product_ids: Vec<String>) -> Self {
        let message_type = if product_ids.is_empty() {
            MessageType::Text
        } else {
            MessageType::Product
        };
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            content: content.to_string(),
            is_bot: true,
            message_type,
            product_ids,
            extra_data: Map::new(),
            created_at: Utc::now(),
        }
    }
}

/// One line in a user's cart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub user_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog query. Every set field narrows the result; unset fields impose
/// no constraint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductFilter {
    pub ids: Option<Vec<String>>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub in_stock_only: bool,
    pub features: Vec<String>,
    pub search_query: Option<String>,
    pub active_only: bool,
    pub limit: Option<usize>,
}

impl ProductFilter {
    /// A filter matching active products only.
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }
}
