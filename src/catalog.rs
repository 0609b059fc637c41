// Product catalog seam
//
// Resolves product references and owns stock counts. Stock only ever moves
// through `reserve` and `release`, both atomic per product.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::orders::OrderError;

/// Catalog product as seen by the order engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub slug: String,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

impl Product {
    /// A product reference may be its id, SKU or slug
    pub fn matches_reference(&self, reference: &str) -> bool {
        let reference = reference.trim();
        self.id.to_string() == reference
            || self.sku.eq_ignore_ascii_case(reference)
            || self.slug == reference
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a product by id, SKU or slug
    async fn resolve(&self, reference: &str) -> Result<Option<Product>, OrderError>;

    /// Decrement stock by `quantity` only if at least that much is available
    ///
    /// Returns `false` when stock was insufficient (nothing changed).
    async fn reserve(&self, product_id: Uuid, quantity: i32) -> Result<bool, OrderError>;

    /// Return `quantity` units to stock; unknown products are ignored
    async fn release(&self, product_id: Uuid, quantity: i32) -> Result<(), OrderError>;
}

/// Catalog backed by the `products` table
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn resolve(&self, reference: &str) -> Result<Option<Product>, OrderError> {
        let reference = reference.trim();

        let product = match Uuid::parse_str(reference) {
            Ok(id) => {
                sqlx::query_as::<_, Product>(
                    "SELECT id, sku, slug, name, price, stock FROM products WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
            Err(_) => {
                sqlx::query_as::<_, Product>(
                    r#"
                    SELECT id, sku, slug, name, price, stock
                    FROM products
                    WHERE LOWER(sku) = LOWER($1) OR slug = $1
                    LIMIT 1
                    "#,
                )
                .bind(reference)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(product)
    }

    async fn reserve(&self, product_id: Uuid, quantity: i32) -> Result<bool, OrderError> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock - $1 WHERE id = $2 AND stock >= $1",
        )
        .bind(quantity)
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, product_id: Uuid, quantity: i32) -> Result<(), OrderError> {
        sqlx::query("UPDATE products SET stock = stock + $1 WHERE id = $2")
            .bind(quantity)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Catalog held in process memory
///
/// Check-and-decrement happens under a single lock.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<Uuid, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: Mutex::new(products.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub async fn add_product(&self, product: Product) {
        self.products.lock().await.insert(product.id, product);
    }

    /// Current stock of a product, if known
    pub async fn stock_of(&self, product_id: Uuid) -> Option<i32> {
        self.products.lock().await.get(&product_id).map(|p| p.stock)
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn resolve(&self, reference: &str) -> Result<Option<Product>, OrderError> {
        let products = self.products.lock().await;
        Ok(products.values().find(|p| p.matches_reference(reference)).cloned())
    }

    async fn reserve(&self, product_id: Uuid, quantity: i32) -> Result<bool, OrderError> {
        let mut products = self.products.lock().await;
        match products.get_mut(&product_id) {
            Some(product) if product.stock >= quantity => {
                product.stock -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, product_id: Uuid, quantity: i32) -> Result<(), OrderError> {
        if let Some(product) = self.products.lock().await.get_mut(&product_id) {
            product.stock += quantity;
        }
        Ok(())
    }
}
