use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::orders::{
    DeliveryDateResolver, LineItem, Order, OrderError, OrderStatus, PriceCalculator, ScheduleStatus,
};

const ORDER_NUMBER_PREFIX: &str = "RO";
const ORDER_NUMBER_SUFFIX_LEN: usize = 6;

/// Generate a human-legible order number, e.g. `RO-20240101-7KQ2ZD`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ORDER_NUMBER_SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();

    format!("{}-{}-{}", ORDER_NUMBER_PREFIX, now.format("%Y%m%d"), suffix)
}

/// Total quantity per product across a set of lines
///
/// The same product may appear on several lines (by id, SKU or slug); a sum
/// that does not fit in an `i32` is rejected.
pub fn stock_demand(items: &[LineItem]) -> Result<BTreeMap<Uuid, i32>, OrderError> {
    let mut demand: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in items {
        let total = demand.entry(item.product_id).or_insert(0);
        *total = total
            .checked_add(item.quantity)
            .ok_or_else(|| quantity_overflow(item.product_id))?;
    }
    Ok(demand)
}

/// Per-product stock change needed to go from `before` to `after`
///
/// Positive values must be reserved, negative values released. Products whose
/// quantity is unchanged are omitted.
pub fn stock_delta(
    before: &[LineItem],
    after: &[LineItem],
) -> Result<BTreeMap<Uuid, i32>, OrderError> {
    let mut delta = stock_demand(after)?;
    for (product_id, quantity) in stock_demand(before)? {
        let change = delta.entry(product_id).or_insert(0);
        *change = change
            .checked_sub(quantity)
            .ok_or_else(|| quantity_overflow(product_id))?;
    }
    delta.retain(|_, change| *change != 0);
    Ok(delta)
}

fn quantity_overflow(product_id: Uuid) -> OrderError {
    OrderError::ValidationError(format!(
        "Total quantity for product {} is too large",
        product_id
    ))
}

impl Order {
    /// Edits are refused once an order has shipped or was cancelled
    pub fn ensure_editable(&self) -> Result<(), OrderError> {
        if self.status.is_locked_for_edit() {
            return Err(OrderError::InvalidState(format!(
                "Order {} cannot be edited while {}",
                self.order_number, self.status
            )));
        }
        Ok(())
    }

    /// Cancellation is refused after shipping and for already-cancelled orders
    pub fn ensure_cancellable(&self) -> Result<(), OrderError> {
        if self.status.has_shipped() || self.status == OrderStatus::Cancelled {
            return Err(OrderError::InvalidState(format!(
                "Order {} cannot be cancelled while {}",
                self.order_number, self.status
            )));
        }
        Ok(())
    }

    /// Whether this order's items are still counted against catalog stock
    pub fn holds_reserved_stock(&self) -> bool {
        !self.status.has_shipped() && self.status != OrderStatus::Cancelled
    }

    /// Recompute subtotal and total from the current items
    ///
    /// Tax, shipping and discount are kept as they are.
    pub fn recompute_totals(&mut self) {
        for item in &mut self.items {
            item.line_total = PriceCalculator::calculate_line_total(item.quantity, item.unit_price);
        }
        self.subtotal = PriceCalculator::calculate_subtotal(&self.items);
        self.total = PriceCalculator::calculate_total(self.subtotal, self.tax, self.shipping, self.discount);
    }

    /// Refresh `next_delivery_at` from the recurrence rule
    ///
    /// Ended schedules and one-time orders never carry a date. A resolved day
    /// past the rule's end date leaves the schedule without a next delivery.
    pub fn reschedule(&mut self, now: DateTime<Utc>) {
        if !self.is_recurring || self.schedule_status == Some(ScheduleStatus::Ended) {
            self.next_delivery_at = None;
            return;
        }

        self.next_delivery_at = self.recurrence.as_ref().and_then(|rule| {
            DeliveryDateResolver::next_delivery_date(rule, now).filter(|day| rule.within_end_date(*day))
        });
    }

    /// Mark the order cancelled and end any running schedule
    pub fn mark_cancelled(&mut self) {
        self.status = OrderStatus::Cancelled;
        if matches!(
            self.schedule_status,
            Some(ScheduleStatus::Active) | Some(ScheduleStatus::Paused)
        ) {
            self.schedule_status = Some(ScheduleStatus::Ended);
            self.next_delivery_at = None;
        }
    }
}
