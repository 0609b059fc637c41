use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::orders::{Address, AddressInput, OrderError, RecurrenceInput, RecurrenceRule};

/// Fulfillment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Convert status to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// True once the goods have left the warehouse
    pub fn has_shipped(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Delivered)
    }

    /// Edits are refused in these states
    pub fn is_locked_for_edit(&self) -> bool {
        self.has_shipped() || *self == OrderStatus::Cancelled
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

/// How the customer intends to pay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    CashOnDelivery,
    BankTransfer,
    Wallet,
}

/// Lifecycle of a recurring order's delivery schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Ended,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "active",
            ScheduleStatus::Paused => "paused",
            ScheduleStatus::Ended => "ended",
        }
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A catalog product captured on an order at the time it was priced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Order aggregate: items, totals, addresses and the optional delivery schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub is_recurring: bool,
    pub recurrence: Option<RecurrenceRule>,
    pub schedule_status: Option<ScheduleStatus>,
    pub next_delivery_at: Option<NaiveDate>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity of the caller, as established by the authentication layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub id: Uuid,
    pub is_admin: bool,
}

impl Requester {
    pub fn customer(id: Uuid) -> Self {
        Self { id, is_admin: false }
    }

    pub fn admin(id: Uuid) -> Self {
        Self { id, is_admin: true }
    }

    /// Owners and admins may see and modify an order
    pub fn can_access(&self, order: &Order) -> bool {
        self.is_admin || order.customer_id == self.id
    }

    /// Customer an order is placed for; only admins may name someone else
    pub fn acting_for(&self, customer_id: Option<Uuid>) -> Result<Uuid, OrderError> {
        match customer_id {
            Some(id) if id != self.id && !self.is_admin => Err(OrderError::AccessDenied(
                "Only admins can place orders for other customers".to_string(),
            )),
            Some(id) => Ok(id),
            None => Ok(self.id),
        }
    }

    pub fn ensure_admin(&self) -> Result<(), OrderError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(OrderError::AccessDenied("Admin role required".to_string()))
        }
    }
}

/// Request DTO for a single line of an order
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderItemRequest {
    /// Product id, SKU or slug
    #[validate(length(min = 1, message = "Product reference must not be empty"))]
    pub product: String,
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: i32,
}

/// Request DTO for creating an order
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    /// Admins may create orders on behalf of a customer
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: Option<AddressInput>,
    pub billing_address: Option<AddressInput>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence: Option<RecurrenceInput>,
    pub discount: Option<Decimal>,
    #[validate(length(max = 1000, message = "Notes must not exceed 1000 characters"))]
    pub notes: Option<String>,
}

/// Request DTO for a partial order edit
///
/// Only supplied fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct EditOrderRequest {
    pub items: Option<Vec<OrderItemRequest>>,
    pub shipping_address: Option<AddressInput>,
    pub billing_address: Option<AddressInput>,
    pub payment_method: Option<PaymentMethod>,
    pub tax: Option<Decimal>,
    pub shipping: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub is_recurring: Option<bool>,
    pub recurrence: Option<RecurrenceInput>,
    #[validate(length(max = 1000, message = "Notes must not exceed 1000 characters"))]
    pub notes: Option<String>,
}

impl EditOrderRequest {
    /// Tax, shipping and discount overrides are reserved for admins
    pub fn overrides_charges(&self) -> bool {
        self.tax.is_some() || self.shipping.is_some() || self.discount.is_some()
    }
}

/// Request DTO for an admin status override
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}
