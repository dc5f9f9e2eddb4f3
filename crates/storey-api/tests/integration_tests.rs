//! Integration tests for the Storey API.
//!
//! Every test builds its own in-memory database, an indexed sample catalog
//! and a scripted language model, then drives the router with `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use storey_api::create_router;
use storey_api::handlers::HealthResponse;
use storey_api::state::AppState;
use storey_chat::{LlmError, ScriptedModel, APOLOGY_TEXT};
use storey_core::config::StoreyConfig;
use storey_core::types::Product;
use storey_storage::{CartService, CartRepository, Database, ProductRepository};
use storey_vector::{CatalogIndexer, HashingEmbedding, ProductIndex};

// =============================================================================
// Helpers
// =============================================================================

struct TestApp {
    state: AppState,
    db: Arc<Database>,
    products: Vec<Product>,
}

impl TestApp {
    fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    fn id_of(&self, name: &str) -> String {
        self.products
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.id.clone())
            .unwrap()
    }
}

async fn make_app(model: ScriptedModel) -> TestApp {
    let db = Arc::new(Database::in_memory().unwrap());
    let catalog = Arc::new(ProductRepository::new(db.clone()));
    let index = Arc::new(ProductIndex::new(Arc::new(HashingEmbedding::default())));
    let indexer = CatalogIndexer::new(catalog, index.clone());

    let mut products = Vec::new();
    for (name, category, brand, price, rating) in [
        ("Wireless Mouse X200", "Electronics", "Logi", 29.99, 4.5),
        ("Mechanical Keyboard", "Electronics", "KeyCo", 149.0, 4.8),
        ("Office Chair", "Furniture", "SitWell", 200.0, 3.9),
        ("Standing Desk", "Furniture", "Oak", 100.0, 4.6),
    ] {
        let mut p = Product::new(name, category, brand, price);
        p.rating = rating;
        p.stock = 5;
        products.push(indexer.create_product(p).await.unwrap());
    }

    let state = AppState::new(StoreyConfig::default(), db.clone(), index, Arc::new(model));
    TestApp { state, db, products }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::put(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::delete(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = make_app(ScriptedModel::new()).await;
    let resp = app.router().oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.products, 4);
    assert_eq!(health.indexed_products, 4);
    assert_eq!(health.live_sessions, 0);
}

// =============================================================================
// Chat turns
// =============================================================================

#[tokio::test]
async fn test_send_message_text_reply() {
    let app = make_app(ScriptedModel::new().then_respond("Hi there! What can I find for you?")).await;
    let resp = app
        .router()
        .oneshot(post_json("/chat/sessions/s1/messages", json!({"message": "hello"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["content"], "Hi there! What can I find for you?");
    assert_eq!(body["is_bot"], true);
    assert_eq!(body["type"], "text");
    assert_eq!(body["products"], json!([]));
    assert!(body["id"].as_str().is_some());
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_send_message_with_products() {
    let app = make_app(
        ScriptedModel::new()
            .then_call("filter_products", json!({"min_price": 100, "max_price": 200}))
            .then_respond("Here are options between $100 and $200."),
    )
    .await;
    let resp = app
        .router()
        .oneshot(post_json(
            "/chat/sessions/s1/messages",
            json!({"message": "something between 100 and 200 dollars"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["type"], "product");
    let names: Vec<&str> = body["products"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Mechanical Keyboard", "Standing Desk", "Office Chair"]);
}

#[tokio::test]
async fn test_add_to_cart_through_chat() {
    let app = make_app(
        ScriptedModel::new()
            .then_call("add_to_cart", json!({"product_id": "wireless mouse", "quantity": 2}))
            .then_respond("Added 2 x Wireless Mouse X200 to your cart."),
    )
    .await;
    let resp = app
        .router()
        .oneshot(post_json(
            "/chat/sessions/s1/messages",
            json!({"message": "add two wireless mice", "user_id": "erin"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["products"][0]["name"], "Wireless Mouse X200");

    let cart = CartRepository::new(app.db.clone());
    let items = cart.items("erin").unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, app.id_of("Wireless Mouse X200"));
    assert_eq!(items[0].quantity, 2);
}

#[tokio::test]
async fn test_model_failure_returns_apology() {
    let app = make_app(ScriptedModel::new().then_fail(LlmError::RateLimited)).await;
    let resp = app
        .router()
        .oneshot(post_json("/chat/sessions/s1/messages", json!({"message": "hello"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["content"], APOLOGY_TEXT);
    assert_eq!(body["type"], "text");
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let app = make_app(ScriptedModel::new()).await;
    let resp = app
        .router()
        .oneshot(post_json("/chat/sessions/s1/messages", json!({"message": "  "})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_missing_message_field_rejected() {
    let app = make_app(ScriptedModel::new()).await;
    let resp = app
        .router()
        .oneshot(post_json("/chat/sessions/s1/messages", json!({"text": "hi"})))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_oldest_first_with_limit() {
    let app = make_app(
        ScriptedModel::new()
            .then_respond("a1")
            .then_respond("a2")
            .then_respond("a3"),
    )
    .await;
    let router = app.router();
    for q in ["q1", "q2", "q3"] {
        let resp = router
            .clone()
            .oneshot(post_json("/chat/sessions/s1/messages", json!({"message": q})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = router
        .clone()
        .oneshot(get("/chat/sessions/s1/history?limit=2"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let contents: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["q1", "a1"]);

    let resp = router.oneshot(get("/chat/sessions/s1/history")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_history_zero_limit_rejected() {
    let app = make_app(ScriptedModel::new()).await;
    let resp = app
        .router()
        .oneshot(get("/chat/sessions/s1/history?limit=0"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_unknown_session_empty() {
    let app = make_app(ScriptedModel::new()).await;
    let resp = app
        .router()
        .oneshot(get("/chat/sessions/nobody/history"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["messages"], json!([]));
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[tokio::test]
async fn test_clear_memory_and_deactivate() {
    let app = make_app(ScriptedModel::new().then_respond("hello")).await;
    let router = app.router();
    router
        .clone()
        .oneshot(post_json("/chat/sessions/s1/messages", json!({"message": "hi"})))
        .await
        .unwrap();

    let resp = router
        .clone()
        .oneshot(delete("/chat/sessions/s1/memory"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["cleared"], true);

    let resp = router.clone().oneshot(delete("/chat/sessions/s1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["deactivated"], true);

    let resp = router.oneshot(delete("/chat/sessions/other")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_summary_and_state() {
    let app = make_app(ScriptedModel::new().then_respond("hello")).await;
    let router = app.router();

    let resp = router.clone().oneshot(get("/chat/sessions/s1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    router
        .clone()
        .oneshot(post_json(
            "/chat/sessions/s1/messages",
            json!({"message": "hi", "user_id": "erin"}),
        ))
        .await
        .unwrap();

    let resp = router
        .clone()
        .oneshot(put_json(
            "/chat/sessions/s1/state",
            json!({"state": {"storefront": "outdoor"}}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["state"]["storefront"], "outdoor");

    let resp = router.clone().oneshot(get("/chat/sessions/s1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["id"], "s1");
    assert_eq!(body["user_id"], "erin");
    assert_eq!(body["is_active"], true);
    assert_eq!(body["message_count"], 2);
    assert_eq!(body["live_memory"], true);
    assert_eq!(body["state"], json!({"storefront": "outdoor"}));

    let resp = router
        .oneshot(put_json("/chat/sessions/other/state", json!({"state": {}})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_turn_on_deactivated_session_still_answers() {
    let app = make_app(ScriptedModel::new().then_respond("one").then_respond("two")).await;
    let router = app.router();
    router
        .clone()
        .oneshot(post_json("/chat/sessions/s1/messages", json!({"message": "hi"})))
        .await
        .unwrap();
    router.clone().oneshot(delete("/chat/sessions/s1")).await.unwrap();

    let resp = router
        .clone()
        .oneshot(post_json("/chat/sessions/s1/messages", json!({"message": "again"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["content"], "two");

    let body = body_json(router.oneshot(get("/chat/sessions/s1")).await.unwrap()).await;
    assert_eq!(body["is_active"], false);
    assert_eq!(body["message_count"], 4);
}

// =============================================================================
// Cart
// =============================================================================

#[tokio::test]
async fn test_cart_add_and_get() {
    let app = make_app(ScriptedModel::new()).await;
    let router = app.router();
    let mouse = app.id_of("Wireless Mouse X200");
    let desk = app.id_of("Standing Desk");

    let resp = router
        .clone()
        .oneshot(post_json("/cart/add", json!({"user_id": "erin", "product_id": mouse})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["quantity"], 1);
    assert_eq!(body["product"]["name"], "Wireless Mouse X200");

    for (product_id, quantity) in [(&mouse, 2), (&desk, 1)] {
        let resp = router
            .clone()
            .oneshot(post_json(
                "/cart/add",
                json!({"user_id": "erin", "product_id": product_id, "quantity": quantity}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = router.clone().oneshot(get("/cart/erin")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["user_id"], "erin");
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let mouse_line = items.iter().find(|l| l["product_id"] == mouse.as_str()).unwrap();
    assert_eq!(mouse_line["quantity"], 3);
    assert_eq!(mouse_line["product"]["brand"], "Logi");
    assert_eq!(body["total_quantity"], 4);
    let subtotal = body["subtotal"].as_f64().unwrap();
    assert!((subtotal - (29.99 * 3.0 + 100.0)).abs() < 1e-6);

    let resp = router.oneshot(get("/cart/nobody")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["total_quantity"], 0);
}

#[tokio::test]
async fn test_cart_add_rejects_bad_requests() {
    let app = make_app(ScriptedModel::new()).await;
    let router = app.router();
    let mouse = app.id_of("Wireless Mouse X200");

    let resp = router
        .clone()
        .oneshot(post_json("/cart/add", json!({"product_id": mouse})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = router
        .clone()
        .oneshot(post_json("/cart/add", json!({"user_id": "erin", "product_id": " "})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = router
        .clone()
        .oneshot(post_json(
            "/cart/add",
            json!({"user_id": "erin", "product_id": mouse, "quantity": 0}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = router
        .oneshot(post_json("/cart/add", json!({"user_id": "erin", "product_id": "missing"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cart_update_remove_and_clear() {
    let app = make_app(ScriptedModel::new()).await;
    let cart = CartRepository::new(app.db.clone());
    let mouse = app.id_of("Wireless Mouse X200");
    let chair = app.id_of("Office Chair");
    let desk = app.id_of("Standing Desk");
    for id in [&mouse, &chair, &desk] {
        cart.add("erin", id, 1).unwrap();
    }
    let router = app.router();

    let resp = router
        .clone()
        .oneshot(put_json(&format!("/cart/erin/items/{}", mouse), json!({"quantity": 5})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["removed"], false);
    assert_eq!(body["item"]["quantity"], 5);

    let resp = router
        .clone()
        .oneshot(put_json(&format!("/cart/erin/items/{}", chair), json!({"quantity": 0})))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["removed"], true);
    assert!(body["item"].is_null());

    let resp = router
        .clone()
        .oneshot(put_json("/cart/erin/items/missing", json!({"quantity": 2})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = router
        .clone()
        .oneshot(delete(&format!("/cart/erin/items/{}", desk)))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["removed"], 1);

    let resp = router.clone().oneshot(delete("/cart/erin")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["removed"], 1);
    assert!(cart.items("erin").unwrap().is_empty());
}
