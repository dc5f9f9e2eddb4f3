//! Product-reference resolution.
//!
//! Decides which products a finished reply is about. The tiers run in
//! order and the first one that yields ids wins:
//!
//! 1. ids surfaced by `search_products` / `filter_products` calls this turn
//! 2. a `product_ids` field when the reply itself is a JSON payload
//! 3. literal occurrences of active product names in the reply
//!
//! This is best effort. A reply that merely mentions a product in passing
//! is attributed to it.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use storey_core::types::Product;
use storey_storage::Catalog;

use crate::agent::ToolInvocation;

/// Which tier produced the ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    ToolTrace,
    ReplyPayload,
    NameScan,
}

/// Final reply text plus the products it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub reply: String,
    pub product_ids: Vec<String>,
    pub tier: Option<ResolutionTier>,
}

/// Tier 1: ids from product-surfacing tool calls, de-duplicated in order
/// of first appearance.
pub fn ids_from_trace(trace: &[ToolInvocation]) -> Vec<String> {
    let ids = trace
        .iter()
        .filter(|inv| inv.tool.surfaces_products())
        .flat_map(|inv| inv.output.product_ids.iter().cloned());
    dedup(ids)
}

/// A reply that turned out to be a structured envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyPayload {
    pub message: Option<String>,
    pub product_ids: Vec<String>,
}

/// Tier 2: read the reply as a JSON object. Markdown code fences around
/// the object are tolerated.
pub fn parse_reply_payload(reply: &str) -> Option<ReplyPayload> {
    let body = strip_code_fence(reply.trim());
    let Value::Object(map) = serde_json::from_str::<Value>(body).ok()? else {
        return None;
    };
    let message = map.get("message").and_then(Value::as_str).map(str::to_string);
    let product_ids = map
        .get("product_ids")
        .and_then(Value::as_array)
        .map(|ids| {
            dedup(
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string),
            )
        })
        .unwrap_or_default();
    Some(ReplyPayload { message, product_ids })
}

/// Tier 3: products whose exact name appears in `reply`, ordered by where
/// the name first occurs.
pub fn scan_product_names(reply: &str, products: &[Product]) -> Vec<String> {
    let mut hits: Vec<(usize, &str)> = products
        .iter()
        .filter(|p| !p.name.trim().is_empty())
        .filter_map(|p| reply.find(p.name.as_str()).map(|pos| (pos, p.id.as_str())))
        .collect();
    hits.sort_by_key(|(pos, _)| *pos);
    dedup(hits.into_iter().map(|(_, id)| id.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn dedup(ids: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(id.clone())).collect()
}

/// Runs the tiers against the live catalog.
pub struct ProductResolver {
    catalog: Arc<dyn Catalog>,
}

impl ProductResolver {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, reply: &str, trace: &[ToolInvocation]) -> Resolution {
        let mut text = reply.to_string();

        let ids = ids_from_trace(trace);
        if !ids.is_empty() {
            return resolved(text, ids, ResolutionTier::ToolTrace);
        }

        if let Some(payload) = parse_reply_payload(reply) {
            if let Some(message) = payload.message {
                text = message;
            }
            if !payload.product_ids.is_empty() {
                return resolved(text, payload.product_ids, ResolutionTier::ReplyPayload);
            }
        }

        let ids = match self.catalog.active_products() {
            Ok(products) => scan_product_names(&text, &products),
            Err(e) => {
                warn!(error = %e, "Name scan skipped, catalog unavailable");
                Vec::new()
            }
        };
        if !ids.is_empty() {
            return resolved(text, ids, ResolutionTier::NameScan);
        }

        debug!("Reply not attributed to any product");
        Resolution {
            reply: text,
            product_ids: Vec::new(),
            tier: None,
        }
    }
}

fn resolved(reply: String, product_ids: Vec<String>, tier: ResolutionTier) -> Resolution {
    debug!(?tier, count = product_ids.len(), "Resolved product references");
    Resolution {
        reply,
        product_ids,
        tier: Some(tier),
    }
}
