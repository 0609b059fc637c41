use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{
    postgres::PgArguments,
    query::QueryAs,
    types::Json,
    PgPool, Postgres,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::orders::error::OrderError;
use crate::orders::{
    Address, LineItem, Order, OrderStatus, Pagination, PaymentMethod, PaymentStatus,
    RecurrenceRule, RecurringOrderAnalytics, RecurringOrderPage, ScheduleStatus, SqlParam,
    ValidatedRecurringQuery,
};

/// Persistence for order aggregates
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), OrderError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, OrderError>;

    /// Orders for the given ids; missing ids are simply absent from the result
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Order>, OrderError>;

    /// Replace a stored order; fails with `NotFound` when it no longer exists
    async fn update(&self, order: &Order) -> Result<(), OrderError>;

    /// Returns whether a row was removed
    async fn delete(&self, id: Uuid) -> Result<bool, OrderError>;

    async fn order_number_exists(&self, order_number: &str) -> Result<bool, OrderError>;

    /// One sorted page of recurring orders plus analytics over every match
    async fn page_recurring(
        &self,
        query: &ValidatedRecurringQuery,
    ) -> Result<RecurringOrderPage, OrderError>;
}

const ORDER_COLUMNS: &str = "id, order_number, customer_id, customer_name, items, subtotal, tax, \
     shipping, discount, total, status, payment_status, payment_method, is_recurring, recurrence, \
     schedule_status, next_delivery_at, shipping_address, billing_address, notes, created_at, updated_at";

/// Row shape of the `orders` table
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: Uuid,
    customer_name: String,
    items: Json<Vec<LineItem>>,
    subtotal: Decimal,
    tax: Decimal,
    shipping: Decimal,
    discount: Decimal,
    total: Decimal,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: PaymentMethod,
    is_recurring: bool,
    recurrence: Option<Json<RecurrenceRule>>,
    schedule_status: Option<ScheduleStatus>,
    next_delivery_at: Option<NaiveDate>,
    shipping_address: Json<Address>,
    billing_address: Json<Address>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Aggregate row of the listing summary query
#[derive(sqlx::FromRow)]
struct SummaryRow {
    total: i64,
    active: i64,
    paused: i64,
    ended: i64,
    total_value: Decimal,
}

fn bind_filter<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    params: &'q [SqlParam],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(value) => query.bind(value.as_str()),
            SqlParam::Uuid(value) => query.bind(*value),
            SqlParam::Date(value) => query.bind(*value),
        };
    }
    query
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: row.id,
            order_number: row.order_number,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            items: row.items.0,
            subtotal: row.subtotal,
            tax: row.tax,
            shipping: row.shipping,
            discount: row.discount,
            total: row.total,
            status: row.status,
            payment_status: row.payment_status,
            payment_method: row.payment_method,
            is_recurring: row.is_recurring,
            recurrence: row.recurrence.map(|Json(rule)| rule),
            schedule_status: row.schedule_status,
            next_delivery_at: row.next_delivery_at,
            shipping_address: row.shipping_address.0,
            billing_address: row.billing_address.0,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Order store backed by Postgres
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), OrderError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, customer_id, customer_name, items,
                subtotal, tax, shipping, discount, total,
                status, payment_status, payment_method, is_recurring, recurrence,
                schedule_status, next_delivery_at, shipping_address, billing_address, notes,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.customer_id)
        .bind(&order.customer_name)
        .bind(Json(&order.items))
        .bind(order.subtotal)
        .bind(order.tax)
        .bind(order.shipping)
        .bind(order.discount)
        .bind(order.total)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.payment_method)
        .bind(order.is_recurring)
        .bind(order.recurrence.as_ref().map(Json))
        .bind(order.schedule_status)
        .bind(order.next_delivery_at)
        .bind(Json(&order.shipping_address))
        .bind(Json(&order.billing_address))
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, OrderError> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Order::from))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Order>, OrderError> {
        let sql = format!("SELECT {} FROM orders WHERE id = ANY($1)", ORDER_COLUMNS);
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn update(&self, order: &Order) -> Result<(), OrderError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET customer_name = $2, items = $3, subtotal = $4, tax = $5, shipping = $6,
                discount = $7, total = $8, status = $9, payment_status = $10,
                payment_method = $11, is_recurring = $12, recurrence = $13,
                schedule_status = $14, next_delivery_at = $15, shipping_address = $16,
                billing_address = $17, notes = $18, updated_at = $19
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(&order.customer_name)
        .bind(Json(&order.items))
        .bind(order.subtotal)
        .bind(order.tax)
        .bind(order.shipping)
        .bind(order.discount)
        .bind(order.total)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.payment_method)
        .bind(order.is_recurring)
        .bind(order.recurrence.as_ref().map(Json))
        .bind(order.schedule_status)
        .bind(order.next_delivery_at)
        .bind(Json(&order.shipping_address))
        .bind(Json(&order.billing_address))
        .bind(&order.notes)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrderError::order_not_found(order.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, OrderError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn order_number_exists(&self, order_number: &str) -> Result<bool, OrderError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_number = $1)")
                .bind(order_number)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn page_recurring(
        &self,
        query: &ValidatedRecurringQuery,
    ) -> Result<RecurringOrderPage, OrderError> {
        let (summary_sql, summary_params) = query.to_summary_sql();
        let summary = bind_filter(sqlx::query_as::<_, SummaryRow>(&summary_sql), &summary_params)
            .fetch_one(&self.pool)
            .await?;

        let (page_sql, page_params) = query.to_page_sql(ORDER_COLUMNS);
        let rows = bind_filter(sqlx::query_as::<_, OrderRow>(&page_sql), &page_params)
            .fetch_all(&self.pool)
            .await?;

        let total = summary.total.max(0) as u64;
        Ok(RecurringOrderPage {
            orders: rows.into_iter().map(Order::from).collect(),
            pagination: Pagination::new(query.page, query.limit, total),
            analytics: RecurringOrderAnalytics::from_counts(
                total,
                summary.active.max(0) as u64,
                summary.paused.max(0) as u64,
                summary.ended.max(0) as u64,
                summary.total_value,
            ),
        })
    }
}

/// Order store held in process memory
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), OrderError> {
        let mut orders = self.orders.write().await;
        if orders.values().any(|o| o.order_number == order.order_number) {
            return Err(OrderError::ValidationError(format!(
                "Order number {} already exists",
                order.order_number
            )));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, OrderError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Order>, OrderError> {
        let orders = self.orders.read().await;
        Ok(ids.iter().filter_map(|id| orders.get(id).cloned()).collect())
    }

    async fn update(&self, order: &Order) -> Result<(), OrderError> {
        match self.orders.write().await.get_mut(&order.id) {
            Some(stored) => {
                *stored = order.clone();
                Ok(())
            }
            None => Err(OrderError::order_not_found(order.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, OrderError> {
        Ok(self.orders.write().await.remove(&id).is_some())
    }

    async fn order_number_exists(&self, order_number: &str) -> Result<bool, OrderError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .any(|o| o.order_number == order_number))
    }

    async fn page_recurring(
        &self,
        query: &ValidatedRecurringQuery,
    ) -> Result<RecurringOrderPage, OrderError> {
        let matching: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| query.filter.matches(o))
            .cloned()
            .collect();

        Ok(RecurringOrderPage::assemble(matching, query))
    }
}
