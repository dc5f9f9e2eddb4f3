//! Shopping cart persistence.
//!
//! One row per (user, product); adding a product already in the cart
//! increases its quantity.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use storey_core::error::StoreyError;
use storey_core::types::CartItem;

use crate::db::{from_millis, sql_err, to_millis, Database};

/// Cart operations used by the `add_to_cart` tool.
pub trait CartService: Send + Sync {
    /// Add `quantity` of a product to the user's cart and return the
    /// resulting line. Rejects quantities below 1 and unknown products.
    fn add(&self, user_id: &str, product_id: &str, quantity: i64) -> Result<CartItem, StoreyError>;

    fn items(&self, user_id: &str) -> Result<Vec<CartItem>, StoreyError>;

    /// Set a line's quantity. Zero or less removes the line. Returns the
    /// updated line, or `None` once removed.
    fn update_quantity(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> Result<Option<CartItem>, StoreyError>;

    fn remove(&self, user_id: &str, product_id: &str) -> Result<bool, StoreyError>;

    /// Empty the cart, returning how many lines were removed.
    fn clear(&self, user_id: &str) -> Result<u64, StoreyError>;
}

/// SQLite-backed cart.
pub struct CartRepository {
    db: Arc<Database>,
}

impl CartRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl CartService for CartRepository {
    fn add(&self, user_id: &str, product_id: &str, quantity: i64) -> Result<CartItem, StoreyError> {
        if quantity < 1 {
            return Err(StoreyError::InvalidInput(format!(
                "quantity must be at least 1, got {}",
                quantity
            )));
        }
        let item = self.db.with_conn(|conn| {
            let active: Option<bool> = conn
                .query_row(
                    "SELECT is_active FROM products WHERE id = ?1",
                    [product_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(sql_err)?;
            if active != Some(true) {
                return Err(StoreyError::NotFound(format!("product {}", product_id)));
            }

            let now = to_millis(&Utc::now());
            conn.execute(
                "INSERT INTO cart_items (user_id, product_id, quantity, added_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (user_id, product_id)
                 DO UPDATE SET quantity = quantity + excluded.quantity, updated_at = excluded.updated_at",
                rusqlite::params![user_id, product_id, quantity, now],
            )
            .map_err(|e| StoreyError::Storage(format!("Failed to add to cart: {}", e)))?;

            find_item(conn, user_id, product_id)?
                .ok_or_else(|| StoreyError::Storage("cart line vanished after insert".to_string()))
        })?;
        info!(user_id, product_id, quantity = item.quantity, "Cart updated");
        Ok(item)
    }

    fn items(&self, user_id: &str) -> Result<Vec<CartItem>, StoreyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, product_id, quantity, added_at, updated_at
                     FROM cart_items WHERE user_id = ?1
                     ORDER BY added_at ASC, product_id ASC",
                )
                .map_err(sql_err)?;
            let rows = stmt.query_map([user_id], row_to_item).map_err(sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
        })
    }

    fn update_quantity(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> Result<Option<CartItem>, StoreyError> {
        if quantity <= 0 {
            self.remove(user_id, product_id)?;
            return Ok(None);
        }
        self.db.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE cart_items SET quantity = ?3, updated_at = ?4
                     WHERE user_id = ?1 AND product_id = ?2",
                    rusqlite::params![user_id, product_id, quantity, to_millis(&Utc::now())],
                )
                .map_err(sql_err)?;
            if updated == 0 {
                return Err(StoreyError::NotFound(format!(
                    "cart line {} for {}",
                    product_id, user_id
                )));
            }
            find_item(conn, user_id, product_id)
        })
    }

    fn remove(&self, user_id: &str, product_id: &str) -> Result<bool, StoreyError> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM cart_items WHERE user_id = ?1 AND product_id = ?2",
                    [user_id, product_id],
                )
                .map_err(sql_err)?;
            Ok(removed > 0)
        })
    }

    fn clear(&self, user_id: &str) -> Result<u64, StoreyError> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM cart_items WHERE user_id = ?1", [user_id])
                .map_err(sql_err)?;
            Ok(removed as u64)
        })
    }
}

fn find_item(
    conn: &Connection,
    user_id: &str,
    product_id: &str,
) -> Result<Option<CartItem>, StoreyError> {
    conn.query_row(
        "SELECT user_id, product_id, quantity, added_at, updated_at
         FROM cart_items WHERE user_id = ?1 AND product_id = ?2",
        [user_id, product_id],
        row_to_item,
    )
    .optional()
    .map_err(sql_err)
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<CartItem> {
    Ok(CartItem {
        user_id: row.get(0)?,
        product_id: row.get(1)?,
        quantity: row.get(2)?,
        added_at: from_millis(row.get(3)?),
        updated_at: from_millis(row.get(4)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ProductRepository};
    use storey_core::types::Product;

    fn setup() -> (CartRepository, Product) {
        let db = Arc::new(Database::in_memory().unwrap());
        let catalog = ProductRepository::new(db.clone());
        let mut product = Product::new("Wireless Mouse X200", "Electronics", "Logi", 29.99);
        product.stock = 10;
        catalog.insert(&product).unwrap();
        (CartRepository::new(db), product)
    }

    #[test]
    fn test_add_creates_line() {
        let (cart, product) = setup();
        let item = cart.add("guest_user", &product.id, 2).unwrap();
        assert_eq!(item.quantity, 2);
        assert_eq!(item.product_id, product.id);
        assert_eq!(cart.items("guest_user").unwrap().len(), 1);
    }

    #[test]
    fn test_add_merges_quantity() {
        let (cart, product) = setup();
        cart.add("u1", &product.id, 1).unwrap();
        let item = cart.add("u1", &product.id, 3).unwrap();
        assert_eq!(item.quantity, 4);
        assert_eq!(cart.items("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_add_rejects_bad_quantity() {
        let (cart, product) = setup();
        let err = cart.add("u1", &product.id, 0).unwrap_err();
        assert!(matches!(err, StoreyError::InvalidInput(_)));
        assert!(cart.items("u1").unwrap().is_empty());
    }

    #[test]
    fn test_add_rejects_unknown_product() {
        let (cart, _) = setup();
        let err = cart.add("u1", "missing", 1).unwrap_err();
        assert!(matches!(err, StoreyError::NotFound(_)));
    }

    #[test]
    fn test_update_quantity_and_remove_on_zero() {
        let (cart, product) = setup();
        cart.add("u1", &product.id, 1).unwrap();

        let updated = cart.update_quantity("u1", &product.id, 5).unwrap().unwrap();
        assert_eq!(updated.quantity, 5);

        assert!(cart.update_quantity("u1", &product.id, 0).unwrap().is_none());
        assert!(cart.items("u1").unwrap().is_empty());
    }

    #[test]
    fn test_update_missing_line() {
        let (cart, product) = setup();
        assert!(cart.update_quantity("u1", &product.id, 2).is_err());
    }

    #[test]
    fn test_remove_and_clear() {
        let (cart, product) = setup();
        cart.add("u1", &product.id, 1).unwrap();
        assert!(cart.remove("u1", &product.id).unwrap());
        assert!(!cart.remove("u1", &product.id).unwrap());

        cart.add("u1", &product.id, 1).unwrap();
        assert_eq!(cart.clear("u1").unwrap(), 1);
        assert_eq!(cart.clear("u1").unwrap(), 0);
    }

    #[test]
    fn test_carts_are_per_user() {
        let (cart, product) = setup();
        cart.add("alice", &product.id, 1).unwrap();
        assert!(cart.items("bob").unwrap().is_empty());
    }
}
