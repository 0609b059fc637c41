use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, PgPool};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::orders::{Address, OrderError};

/// Customer record as needed for orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub default_address: Option<Address>,
}

/// Read-only view over customer profiles
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find(&self, customer_id: Uuid) -> Result<Option<Customer>, OrderError>;
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    name: String,
    default_address: Option<Json<Address>>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            name: row.name,
            default_address: row.default_address.map(|Json(address)| address),
        }
    }
}

/// Directory backed by the `customers` table
#[derive(Clone)]
pub struct PgCustomerDirectory {
    pool: PgPool,
}

impl PgCustomerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerDirectory for PgCustomerDirectory {
    async fn find(&self, customer_id: Uuid) -> Result<Option<Customer>, OrderError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, name, default_address FROM customers WHERE id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Customer::from))
    }
}

#[derive(Default)]
pub struct InMemoryCustomerDirectory {
    customers: RwLock<HashMap<Uuid, Customer>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customers(customers: impl IntoIterator<Item = Customer>) -> Self {
        Self {
            customers: RwLock::new(customers.into_iter().map(|c| (c.id, c)).collect()),
        }
    }

    pub async fn add_customer(&self, customer: Customer) {
        self.customers.write().await.insert(customer.id, customer);
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn find(&self, customer_id: Uuid) -> Result<Option<Customer>, OrderError> {
        Ok(self.customers.read().await.get(&customer_id).cloned())
    }
}
