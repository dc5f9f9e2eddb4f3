//! Product catalog persistence.
//!
//! `Catalog` is the read/write interface the chat tools and the indexer
//! depend on; `ProductRepository` is its SQLite implementation. Features
//! live in `product_features` as ordered child rows.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use storey_core::error::StoreyError;
use storey_core::types::{Product, ProductFilter};

use crate::db::{from_millis, sql_err, to_millis, Database};

/// CRUD and filtered queries over catalog products.
pub trait Catalog: Send + Sync {
    /// Products matching every set predicate, best rated first.
    fn find(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreyError>;

    fn find_one(&self, id: &str) -> Result<Option<Product>, StoreyError>;

    /// Products for the given ids in the same order. Missing ids are skipped.
    fn find_many(&self, ids: &[String]) -> Result<Vec<Product>, StoreyError>;

    /// Products whose name contains `fragment` (case-insensitive), in
    /// catalog insertion order.
    fn find_by_name(&self, fragment: &str, limit: usize) -> Result<Vec<Product>, StoreyError>;

    fn insert(&self, product: &Product) -> Result<(), StoreyError>;

    /// Overwrite an existing product. Fails with `NotFound` if absent.
    fn replace(&self, product: &Product) -> Result<(), StoreyError>;

    /// Returns whether a product was removed.
    fn delete(&self, id: &str) -> Result<bool, StoreyError>;

    fn active_products(&self) -> Result<Vec<Product>, StoreyError> {
        self.find(&ProductFilter::active())
    }
}

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.description, p.price, p.original_price, p.category,
     p.subcategory, p.brand, p.rating, p.review_count, p.image_url, p.stock,
     p.is_on_sale, p.sale_percentage, p.is_active, p.embedding_id, p.created_at, p.updated_at";

/// SQLite-backed catalog.
pub struct ProductRepository {
    db: Arc<Database>,
}

impl ProductRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Total number of products, active or not.
    pub fn count(&self) -> Result<u64, StoreyError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
                .map_err(sql_err)?;
            Ok(n as u64)
        })
    }
}

impl Catalog for ProductRepository {
    fn find(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreyError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(ids) = &filter.ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            clauses.push(format!("p.id IN ({})", placeholders));
            for id in ids {
                params.push(Box::new(id.clone()));
            }
        }
        for (column, value) in [
            ("p.category", &filter.category),
            ("p.subcategory", &filter.subcategory),
            ("p.brand", &filter.brand),
        ] {
            if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                clauses.push(format!("instr(fold_case({}), fold_case(?)) > 0", column));
                params.push(Box::new(v.trim().to_string()));
            }
        }
        if let Some(min) = filter.min_price {
            clauses.push("p.price >= ?".to_string());
            params.push(Box::new(min));
        }
        if let Some(max) = filter.max_price {
            clauses.push("p.price <= ?".to_string());
            params.push(Box::new(max));
        }
        if let Some(min) = filter.min_rating {
            clauses.push("p.rating >= ?".to_string());
            params.push(Box::new(min));
        }
        if filter.in_stock_only {
            clauses.push("p.stock > 0".to_string());
        }
        if filter.active_only {
            clauses.push("p.is_active = 1".to_string());
        }
        for feature in filter.features.iter().filter(|f| !f.trim().is_empty()) {
            clauses.push(
                "EXISTS (SELECT 1 FROM product_features f
                         WHERE f.product_id = p.id AND instr(fold_case(f.feature), fold_case(?)) > 0)"
                    .to_string(),
            );
            params.push(Box::new(feature.trim().to_string()));
        }
        if let Some(q) = filter.search_query.as_deref().filter(|q| !q.trim().is_empty()) {
            clauses.push(
                "(instr(fold_case(p.name), fold_case(?)) > 0
                  OR instr(fold_case(p.description), fold_case(?)) > 0
                  OR instr(fold_case(p.brand), fold_case(?)) > 0
                  OR EXISTS (SELECT 1 FROM product_features f
                             WHERE f.product_id = p.id AND instr(fold_case(f.feature), fold_case(?)) > 0))"
                    .to_string(),
            );
            for _ in 0..4 {
                params.push(Box::new(q.trim().to_string()));
            }
        }

        let mut sql = format!("SELECT {} FROM products p", PRODUCT_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY p.rating DESC, p.name ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(limit as i64));
        }

        let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let products = self
            .db
            .with_conn(|conn| query_products(conn, &sql, &params_refs))?;
        debug!(count = products.len(), "Catalog filter query");
        Ok(products)
    }

    fn find_one(&self, id: &str) -> Result<Option<Product>, StoreyError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {} FROM products p WHERE p.id = ?1", PRODUCT_COLUMNS);
            let product = conn
                .query_row(&sql, [id], row_to_product)
                .optional()
                .map_err(sql_err)?;
            match product {
                Some(mut p) => {
                    p.features = load_features(conn, &p.id)?;
                    Ok(Some(p))
                }
                None => Ok(None),
            }
        })
    }

    fn find_many(&self, ids: &[String]) -> Result<Vec<Product>, StoreyError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = self.find(&ProductFilter {
            ids: Some(ids.to_vec()),
            ..ProductFilter::default()
        })?;
        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = found.iter().find(|p| &p.id == id) {
                ordered.push(p.clone());
            }
        }
        Ok(ordered)
    }

    fn find_by_name(&self, fragment: &str, limit: usize) -> Result<Vec<Product>, StoreyError> {
        let sql = format!(
            "SELECT {} FROM products p
             WHERE instr(fold_case(p.name), fold_case(?1)) > 0
             ORDER BY p.created_at ASC, p.rowid ASC
             LIMIT ?2",
            PRODUCT_COLUMNS
        );
        let fragment = fragment.trim().to_string();
        let limit = limit as i64;
        self.db
            .with_conn(|conn| query_products(conn, &sql, &[&fragment as &dyn ToSql, &limit]))
    }

    fn insert(&self, product: &Product) -> Result<(), StoreyError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(sql_err)?;
            tx.execute(
                "INSERT INTO products (id, name, description, price, original_price, category,
                    subcategory, brand, rating, review_count, image_url, stock, is_on_sale,
                    sale_percentage, is_active, embedding_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                rusqlite::params![
                    product.id,
                    product.name,
                    product.description,
                    product.price,
                    product.original_price,
                    product.category,
                    product.subcategory,
                    product.brand,
                    product.rating,
                    product.review_count,
                    product.image_url,
                    product.stock,
                    product.is_on_sale,
                    product.sale_percentage,
                    product.is_active,
                    product.embedding_id,
                    to_millis(&product.created_at),
                    to_millis(&product.updated_at),
                ],
            )
            .map_err(|e| StoreyError::Storage(format!("Failed to insert product: {}", e)))?;
            write_features(&tx, &product.id, &product.features)?;
            tx.commit().map_err(sql_err)?;
            Ok(())
        })?;
        debug!(product_id = %product.id, "Product inserted");
        Ok(())
    }

    fn replace(&self, product: &Product) -> Result<(), StoreyError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(sql_err)?;
            let updated = tx
                .execute(
                    "UPDATE products SET name = ?2, description = ?3, price = ?4,
                        original_price = ?5, category = ?6, subcategory = ?7, brand = ?8,
                        rating = ?9, review_count = ?10, image_url = ?11, stock = ?12,
                        is_on_sale = ?13, sale_percentage = ?14, is_active = ?15,
                        embedding_id = ?16, updated_at = ?17
                     WHERE id = ?1",
                    rusqlite::params![
                        product.id,
                        product.name,
                        product.description,
                        product.price,
                        product.original_price,
                        product.category,
                        product.subcategory,
                        product.brand,
                        product.rating,
                        product.review_count,
                        product.image_url,
                        product.stock,
                        product.is_on_sale,
                        product.sale_percentage,
                        product.is_active,
                        product.embedding_id,
                        to_millis(&Utc::now()),
                    ],
                )
                .map_err(|e| StoreyError::Storage(format!("Failed to update product: {}", e)))?;
            if updated == 0 {
                return Err(StoreyError::NotFound(format!("product {}", product.id)));
            }
            tx.execute("DELETE FROM product_features WHERE product_id = ?1", [&product.id])
                .map_err(sql_err)?;
            write_features(&tx, &product.id, &product.features)?;
            tx.commit().map_err(sql_err)?;
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> Result<bool, StoreyError> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM products WHERE id = ?1", [id])
                .map_err(sql_err)?;
            Ok(removed > 0)
        })
    }
}

// ============================================================================
// Helper functions for row-to-entity conversion.
// ============================================================================

fn query_products(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Product>, StoreyError> {
    let mut stmt = conn.prepare(sql).map_err(sql_err)?;
    let rows = stmt.query_map(params, row_to_product).map_err(sql_err)?;

    let mut products = Vec::new();
    for row in rows {
        let mut product = row.map_err(sql_err)?;
        product.features = load_features(conn, &product.id)?;
        products.push(product);
    }
    Ok(products)
}

fn load_features(conn: &Connection, product_id: &str) -> Result<Vec<String>, StoreyError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT feature FROM product_features WHERE product_id = ?1 ORDER BY position ASC",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map([product_id], |row| row.get::<_, String>(0))
        .map_err(sql_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
}

fn write_features(conn: &Connection, product_id: &str, features: &[String]) -> Result<(), StoreyError> {
    for (position, feature) in features.iter().enumerate() {
        conn.execute(
            "INSERT INTO product_features (product_id, position, feature) VALUES (?1, ?2, ?3)",
            rusqlite::params![product_id, position as i64, feature],
        )
        .map_err(sql_err)?;
    }
    Ok(())
}

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        original_price: row.get(4)?,
        category: row.get(5)?,
        subcategory: row.get(6)?,
        brand: row.get(7)?,
        rating: row.get(8)?,
        review_count: row.get(9)?,
        image_url: row.get(10)?,
        stock: row.get(11)?,
        features: Vec::new(),
        is_on_sale: row.get(12)?,
        sale_percentage: row.get(13)?,
        is_active: row.get(14)?,
        embedding_id: row.get(15)?,
        created_at: from_millis(row.get(16)?),
        updated_at: from_millis(row.get(17)?),
    })
}
