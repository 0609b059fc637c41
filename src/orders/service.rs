use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::audit::{record_best_effort, AuditAction, AuditEntry, AuditSink};
use crate::catalog::Catalog;
use crate::customers::CustomerDirectory;
use crate::orders::{
    generate_order_number, has_recurrence_signal, resolve_address, stock_delta, stock_demand,
    CreateOrderRequest, EditOrderRequest, EngineMetrics, LineItem, Order, OrderError,
    OrderItemRequest, OrderStatus, OrderStore, PaymentStatus, PriceCalculator, PricingPolicy,
    QueryValidator, RecurrenceInput, RecurrenceRule, RecurringOrderPage, RecurringOrderQuery,
    Requester, ScheduleAction, ScheduleStateMachine, ScheduleStatus,
};

/// Attempts at drawing an unused order number before giving up
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Catalog lines for a request, plus the stock seen while resolving them
struct ResolvedItems {
    items: Vec<LineItem>,
    available: HashMap<Uuid, i32>,
}

/// Service for order lifecycle business logic
///
/// The only component that talks to the catalog and the customer directory.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    customers: Arc<dyn CustomerDirectory>,
    audit: Arc<dyn AuditSink>,
    pricing: PricingPolicy,
    metrics: EngineMetrics,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        customers: Arc<dyn CustomerDirectory>,
        audit: Arc<dyn AuditSink>,
        pricing: PricingPolicy,
    ) -> Self {
        Self {
            orders,
            catalog,
            customers,
            audit,
            pricing,
            metrics: EngineMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Create a new order for a customer
    ///
    /// # Validation
    /// - Every item must resolve in the catalog and have enough stock
    /// - A shipping address must be supplied or come from the customer profile
    /// - Recurrence fields must form a valid rule
    ///
    /// Stock is reserved per product; a failure part way releases whatever
    /// was already reserved, so the order either gets all of its stock or none.
    pub async fn create_order(
        &self,
        customer_id: Uuid,
        request: CreateOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        request.validate()?;
        validate_items(&request.items)?;

        let discount = request.discount.unwrap_or(Decimal::ZERO);
        if discount < Decimal::ZERO {
            return Err(OrderError::ValidationError(
                "Discount cannot be negative".to_string(),
            ));
        }

        let customer = self
            .customers
            .find(customer_id)
            .await?
            .ok_or_else(|| OrderError::NotFound {
                resource: "Customer",
                id: customer_id.to_string(),
            })?;

        let shipping_address = resolve_address(
            customer.default_address.as_ref(),
            request.shipping_address.as_ref(),
        )
        .ok_or(OrderError::MissingShippingAddress)?;

        let billing_address = match request.billing_address.as_ref() {
            Some(input) if !input.is_empty() => shipping_address.merged_with(input),
            _ => shipping_address.clone(),
        };

        let is_recurring = has_recurrence_signal(request.is_recurring, request.recurrence.as_ref());
        let recurrence = if is_recurring {
            let input = request.recurrence.clone().unwrap_or_default();
            Some(RecurrenceRule::from_input(&input, now)?)
        } else {
            None
        };

        let resolved = self.resolve_items(&request.items).await?;
        let demand = stock_demand(&resolved.items)?;
        check_availability(&demand, &resolved.available)?;

        let totals = PriceCalculator::price_items(&resolved.items, &self.pricing, discount);
        if totals.total < Decimal::ZERO {
            return Err(OrderError::ValidationError(
                "Discount cannot exceed the order value".to_string(),
            ));
        }

        let order_number = self.unused_order_number(now).await?;

        self.reserve_stock(&demand, &resolved.available).await?;

        let mut order = Order {
            id: Uuid::new_v4(),
            order_number,
            customer_id,
            customer_name: customer.name,
            items: resolved.items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            shipping: totals.shipping,
            discount: totals.discount,
            total: totals.total,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: request.payment_method,
            is_recurring,
            recurrence,
            schedule_status: is_recurring.then_some(ScheduleStatus::Active),
            next_delivery_at: None,
            shipping_address,
            billing_address,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };
        order.reschedule(now);

        if let Err(e) = self.orders.insert(&order).await {
            self.release_stock(&demand).await;
            return Err(e);
        }

        self.audit(customer_id, AuditAction::Create, order.id, None, Some(&order))
            .await;
        self.metrics.record_order_created();

        tracing::info!(
            "Created order {} for customer {} (recurring: {}, next delivery: {:?})",
            order.order_number,
            customer_id,
            order.is_recurring,
            order.next_delivery_at
        );

        Ok(order)
    }

    /// Fetch an order visible to the requester
    pub async fn get_order(&self, order_id: Uuid, requester: &Requester) -> Result<Order, OrderError> {
        tracing::debug!("Fetching order {} for {}", order_id, requester.id);
        self.load_accessible(order_id, requester).await
    }

    /// Apply a partial edit to an order
    ///
    /// # Validation
    /// - Shipped, delivered and cancelled orders cannot be edited
    /// - Tax, shipping and discount overrides require an admin
    /// - New items are re-resolved from the catalog and stock is rebalanced
    ///   per product: increases are reserved, decreases released
    pub async fn edit_order(
        &self,
        order_id: Uuid,
        request: EditOrderRequest,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        request.validate()?;
        if let Some(items) = &request.items {
            if items.is_empty() {
                return Err(OrderError::ValidationError(
                    "Order must contain at least one item".to_string(),
                ));
            }
            validate_items(items)?;
        }

        if request.overrides_charges() && !requester.is_admin {
            return Err(OrderError::AccessDenied(
                "Only admins can override tax, shipping or discount".to_string(),
            ));
        }
        for (field, value) in [
            ("tax", request.tax),
            ("shipping", request.shipping),
            ("discount", request.discount),
        ] {
            if value.map_or(false, |v| v < Decimal::ZERO) {
                return Err(OrderError::ValidationError(format!(
                    "{} cannot be negative",
                    field
                )));
            }
        }

        let before = self.load_accessible(order_id, requester).await?;
        before.ensure_editable()?;
        let mut order = before.clone();

        if let Some(update) = &request.shipping_address {
            order.shipping_address = order.shipping_address.merged_with(update);
        }
        if let Some(update) = &request.billing_address {
            order.billing_address = order.billing_address.merged_with(update);
        }
        if let Some(method) = request.payment_method {
            order.payment_method = method;
        }
        if let Some(notes) = request.notes {
            order.notes = Some(notes);
        }

        self.apply_recurrence_edit(
            &mut order,
            request.is_recurring,
            request.recurrence.as_ref(),
            now,
        )?;

        if let Some(tax) = request.tax {
            order.tax = tax;
        }
        if let Some(shipping) = request.shipping {
            order.shipping = shipping;
        }
        if let Some(discount) = request.discount {
            order.discount = discount;
        }

        let mut stock_change = BTreeMap::new();
        if let Some(items) = &request.items {
            let resolved = self.resolve_items(items).await?;
            stock_change = stock_delta(&before.items, &resolved.items)?;

            let increases: BTreeMap<Uuid, i32> = stock_change
                .iter()
                .filter(|(_, change)| **change > 0)
                .map(|(id, change)| (*id, *change))
                .collect();
            check_availability(&increases, &resolved.available)?;

            order.items = resolved.items;
            order.recompute_totals();
            if order.total < Decimal::ZERO {
                return Err(OrderError::ValidationError(
                    "Discount cannot exceed the order value".to_string(),
                ));
            }

            self.reserve_stock(&increases, &resolved.available).await?;
        } else {
            order.recompute_totals();
            if order.total < Decimal::ZERO {
                return Err(OrderError::ValidationError(
                    "Discount cannot exceed the order value".to_string(),
                ));
            }
        }

        order.reschedule(now);
        order.updated_at = now;

        if let Err(e) = self.orders.update(&order).await {
            let reserved: BTreeMap<Uuid, i32> =
                stock_change.into_iter().filter(|(_, change)| *change > 0).collect();
            self.release_stock(&reserved).await;
            return Err(e);
        }

        let decreases: BTreeMap<Uuid, i32> = stock_change
            .into_iter()
            .filter(|(_, change)| *change < 0)
            .map(|(id, change)| (id, -change))
            .collect();
        self.release_stock(&decreases).await;

        self.audit(requester.id, AuditAction::Update, order.id, Some(&before), Some(&order))
            .await;

        tracing::info!("Edited order {}", order.order_number);
        Ok(order)
    }

    /// Cancel an order, returning its stock and ending any schedule
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let before = self.load_accessible(order_id, requester).await?;
        before.ensure_cancellable()?;

        let demand = stock_demand(&before.items)?;
        let mut order = before.clone();
        order.mark_cancelled();
        order.updated_at = now;
        self.orders.update(&order).await?;

        self.release_stock(&demand).await;
        self.audit(requester.id, AuditAction::Update, order.id, Some(&before), Some(&order))
            .await;
        self.metrics.record_order_cancelled();

        tracing::info!("Cancelled order {}", order.order_number);
        Ok(order)
    }

    /// Admin override of the order status
    ///
    /// Any status may follow any other. Moving into `cancelled` releases stock
    /// and ends the schedule exactly like a regular cancellation. Moving a
    /// cancelled (or shipped) order back to an open status reserves its stock
    /// again and fails with `OutOfStock` when the catalog cannot cover it.
    pub async fn set_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        requester.ensure_admin()?;

        let before = self.load(order_id).await?;
        let mut order = before.clone();

        if status == OrderStatus::Cancelled {
            order.mark_cancelled();
        } else {
            order.status = status;
        }
        order.updated_at = now;

        let demand = stock_demand(&order.items)?;
        let releases_stock = before.holds_reserved_stock() && status == OrderStatus::Cancelled;
        let reserves_stock = !before.holds_reserved_stock() && order.holds_reserved_stock();

        if reserves_stock {
            let available = self.current_stock(&demand).await?;
            self.reserve_stock(&demand, &available).await?;
        }

        if let Err(e) = self.orders.update(&order).await {
            if reserves_stock {
                self.release_stock(&demand).await;
            }
            return Err(e);
        }

        if releases_stock {
            self.release_stock(&demand).await;
            self.metrics.record_order_cancelled();
        }
        self.audit(requester.id, AuditAction::Update, order.id, Some(&before), Some(&order))
            .await;

        tracing::info!(
            "Order {} status changed from {} to {}",
            order.order_number,
            before.status,
            order.status
        );
        Ok(order)
    }

    /// Admin removal of an order
    pub async fn delete_order(&self, order_id: Uuid, requester: &Requester) -> Result<(), OrderError> {
        requester.ensure_admin()?;
        let order = self.load(order_id).await?;
        self.remove_order(&order, requester.id).await
    }

    /// Pause, resume or end a single order's schedule
    pub async fn update_schedule(
        &self,
        order_id: Uuid,
        action: ScheduleAction,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let order = self.load_accessible(order_id, requester).await?;
        let (order, _changed) = self
            .apply_schedule_action(order, action, requester.id, now)
            .await?;
        Ok(order)
    }

    /// Page through recurring orders with analytics over the filtered set
    ///
    /// Non-admins only ever see their own orders.
    pub async fn list_recurring_orders(
        &self,
        query: RecurringOrderQuery,
        requester: &Requester,
    ) -> Result<RecurringOrderPage, OrderError> {
        let mut validated = QueryValidator::validate(query)?;
        if !requester.is_admin {
            validated.filter.customer_id = Some(requester.id);
        }

        let page = self.orders.page_recurring(&validated).await?;
        tracing::debug!(
            "Listing {} of {} recurring orders",
            page.orders.len(),
            page.pagination.total
        );

        Ok(page)
    }

    pub(crate) fn store(&self) -> &Arc<dyn OrderStore> {
        &self.orders
    }

    /// Run one schedule action and persist it when something changed
    ///
    /// Resuming recomputes the next delivery date from `now`.
    pub(crate) async fn apply_schedule_action(
        &self,
        mut order: Order,
        action: ScheduleAction,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(Order, bool), OrderError> {
        let before = order.clone();
        if !ScheduleStateMachine::apply(&mut order, action)? {
            return Ok((order, false));
        }

        if action == ScheduleAction::Resume {
            order.reschedule(now);
        }
        order.updated_at = now;
        self.orders.update(&order).await?;

        self.audit(actor_id, AuditAction::Update, order.id, Some(&before), Some(&order))
            .await;
        self.metrics.record_schedule_change();

        tracing::info!(
            "Schedule of order {} is now {:?}",
            order.order_number,
            order.schedule_status
        );
        Ok((order, true))
    }

    /// Delete an already-loaded order, releasing stock it still holds
    pub(crate) async fn remove_order(&self, order: &Order, actor_id: Uuid) -> Result<(), OrderError> {
        let demand = stock_demand(&order.items)?;
        if !self.orders.delete(order.id).await? {
            return Err(OrderError::order_not_found(order.id));
        }

        if order.holds_reserved_stock() {
            self.release_stock(&demand).await;
        }
        self.audit(actor_id, AuditAction::Delete, order.id, Some(order), None)
            .await;
        self.metrics.record_order_deleted();

        tracing::info!("Deleted order {}", order.order_number);
        Ok(())
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| OrderError::order_not_found(order_id))
    }

    async fn load_accessible(&self, order_id: Uuid, requester: &Requester) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        if !requester.can_access(&order) {
            tracing::warn!("User {} denied access to order {}", requester.id, order_id);
            return Err(OrderError::AccessDenied(
                "You do not have permission to access this order".to_string(),
            ));
        }
        Ok(order)
    }

    fn apply_recurrence_edit(
        &self,
        order: &mut Order,
        is_recurring: Option<bool>,
        update: Option<&RecurrenceInput>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let wants_recurring =
            has_recurrence_signal(is_recurring.unwrap_or(order.is_recurring), update);

        if !wants_recurring {
            order.is_recurring = false;
            order.recurrence = None;
            order.schedule_status = None;
            order.next_delivery_at = None;
            return Ok(());
        }

        let rule = match (order.recurrence.as_ref(), update) {
            (Some(rule), Some(update)) => rule.merge(update)?,
            (Some(rule), None) => rule.clone(),
            (None, Some(update)) => RecurrenceRule::from_input(update, now)?,
            (None, None) => RecurrenceRule::from_input(&RecurrenceInput::default(), now)?,
        };

        order.is_recurring = true;
        order.recurrence = Some(rule);
        order.schedule_status = order.schedule_status.or(Some(ScheduleStatus::Active));
        Ok(())
    }

    async fn resolve_items(&self, requests: &[OrderItemRequest]) -> Result<ResolvedItems, OrderError> {
        let mut items = Vec::with_capacity(requests.len());
        let mut available = HashMap::new();

        for request in requests {
            let product = self
                .catalog
                .resolve(&request.product)
                .await?
                .ok_or_else(|| OrderError::ProductNotFound(request.product.clone()))?;

            available.insert(product.id, product.stock);
            items.push(LineItem {
                product_id: product.id,
                sku: product.sku,
                name: product.name,
                quantity: request.quantity,
                unit_price: product.price,
                line_total: PriceCalculator::calculate_line_total(request.quantity, product.price),
            });
        }

        Ok(ResolvedItems { items, available })
    }

    async fn unused_order_number(&self, now: DateTime<Utc>) -> Result<String, OrderError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = generate_order_number(now);
            if !self.orders.order_number_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(OrderError::DatabaseError(
            "Could not allocate a unique order number".to_string(),
        ))
    }

    /// Catalog stock for each product, used to report shortfalls
    async fn current_stock(
        &self,
        quantities: &BTreeMap<Uuid, i32>,
    ) -> Result<HashMap<Uuid, i32>, OrderError> {
        let mut available = HashMap::with_capacity(quantities.len());
        for product_id in quantities.keys() {
            let stock = self
                .catalog
                .resolve(&product_id.to_string())
                .await?
                .map_or(0, |product| product.stock);
            available.insert(*product_id, stock);
        }
        Ok(available)
    }

    /// Reserve every positive quantity, rolling back on the first failure
    async fn reserve_stock(
        &self,
        quantities: &BTreeMap<Uuid, i32>,
        available: &HashMap<Uuid, i32>,
    ) -> Result<(), OrderError> {
        let mut reserved = BTreeMap::new();

        for (&product_id, &quantity) in quantities {
            if quantity <= 0 {
                continue;
            }
            match self.catalog.reserve(product_id, quantity).await {
                Ok(true) => {
                    reserved.insert(product_id, quantity);
                }
                Ok(false) => {
                    self.metrics.record_stock_reservation_failure();
                    self.release_stock(&reserved).await;
                    return Err(OrderError::OutOfStock {
                        product_id,
                        requested: quantity,
                        available: available.get(&product_id).copied().unwrap_or(0),
                    });
                }
                Err(e) => {
                    self.release_stock(&reserved).await;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Best-effort release; failures are logged and counted, never returned
    async fn release_stock(&self, quantities: &BTreeMap<Uuid, i32>) {
        for (&product_id, &quantity) in quantities {
            if quantity <= 0 {
                continue;
            }
            if let Err(e) = self.catalog.release(product_id, quantity).await {
                self.metrics.record_stock_release_failure();
                tracing::warn!(
                    "Failed to release {} units of product {}: {}",
                    quantity,
                    product_id,
                    e
                );
            }
        }
    }

    async fn audit(
        &self,
        actor_id: Uuid,
        action: AuditAction,
        order_id: Uuid,
        before: Option<&Order>,
        after: Option<&Order>,
    ) {
        let snapshot = |order: Option<&Order>| order.and_then(|o| serde_json::to_value(o).ok());
        let entry = AuditEntry::order(actor_id, action, order_id, snapshot(before), snapshot(after));
        record_best_effort(self.audit.as_ref(), entry).await;
    }
}

fn validate_items(items: &[OrderItemRequest]) -> Result<(), OrderError> {
    for item in items {
        item.validate()?;
    }
    Ok(())
}

fn check_availability(
    demand: &BTreeMap<Uuid, i32>,
    available: &HashMap<Uuid, i32>,
) -> Result<(), OrderError> {
    for (&product_id, &requested) in demand {
        let in_stock = available.get(&product_id).copied().unwrap_or(0);
        if requested > in_stock {
            return Err(OrderError::OutOfStock {
                product_id,
                requested,
                available: in_stock,
            });
        }
    }
    Ok(())
}


#[cfg(test)]
mod property_tests {
    use super::tests::{at, Fixture};
    use super::*;
    use proptest::prelude::*;

    /// Stock conservation: creating then cancelling an order restores stock
    #[test]
    fn prop_create_cancel_conserves_stock() {
        let runtime = tokio::runtime::Runtime::new().unwrap();

        proptest!(ProptestConfig::with_cases(32), |(bean_qty in 1i32..=10, mug_qty in 0i32..=2)| {
            runtime.block_on(async {
                let fx = Fixture::new();
                let mut request = fx.one_time_request(bean_qty);
                if mug_qty > 0 {
                    request.items.push(OrderItemRequest {
                        product: fx.mug.sku.clone(),
                        quantity: mug_qty,
                    });
                }

                let order = fx
                    .service
                    .create_order(fx.customer.id, request, at(2024, 1, 1))
                    .await
                    .unwrap();
                assert_eq!(fx.stock(&fx.beans).await, 10 - bean_qty);
                assert_eq!(fx.stock(&fx.mug).await, 2 - mug_qty);
                assert_eq!(
                    order.total,
                    order.subtotal + order.tax + order.shipping - order.discount
                );

                fx.service
                    .cancel_order(order.id, &fx.customer, at(2024, 1, 2))
                    .await
                    .unwrap();
                assert_eq!(fx.stock(&fx.beans).await, 10);
                assert_eq!(fx.stock(&fx.mug).await, 2);
            });
        });
    }
}
