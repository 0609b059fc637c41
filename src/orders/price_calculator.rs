use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orders::LineItem;

/// Server-side pricing parameters applied when an order is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Tax as a fraction of the subtotal (0.08 = 8%)
    pub tax_rate: Decimal,
    /// Flat shipping fee per order
    pub shipping_fee: Decimal,
    /// Subtotal at or above which shipping is free
    pub free_shipping_threshold: Option<Decimal>,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::ZERO,
            shipping_fee: Decimal::ZERO,
            free_shipping_threshold: None,
        }
    }
}

/// Monetary totals of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Service for calculating line totals and order totals
pub struct PriceCalculator;

impl PriceCalculator {
    /// Calculate the total for a single line
    ///
    /// # Arguments
    /// * `quantity` - Number of units ordered
    /// * `unit_price` - Catalog price per unit at time of order
    pub fn calculate_line_total(quantity: i32, unit_price: Decimal) -> Decimal {
        Decimal::from(quantity) * unit_price
    }

    /// Sum of all line totals
    pub fn calculate_subtotal(items: &[LineItem]) -> Decimal {
        items.iter().map(|item| item.line_total).sum()
    }

    /// Tax on a subtotal, rounded to cents
    pub fn calculate_tax(subtotal: Decimal, policy: &PricingPolicy) -> Decimal {
        (subtotal * policy.tax_rate).round_dp(2)
    }

    /// Shipping fee for a subtotal
    pub fn calculate_shipping(subtotal: Decimal, policy: &PricingPolicy) -> Decimal {
        match policy.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Decimal::ZERO,
            _ => policy.shipping_fee,
        }
    }

    /// total = subtotal + tax + shipping - discount
    pub fn calculate_total(subtotal: Decimal, tax: Decimal, shipping: Decimal, discount: Decimal) -> Decimal {
        subtotal + tax + shipping - discount
    }

    /// Compute every total for a fresh set of items
    pub fn price_items(items: &[LineItem], policy: &PricingPolicy, discount: Decimal) -> OrderTotals {
        let subtotal = Self::calculate_subtotal(items);
        let tax = Self::calculate_tax(subtotal, policy);
        let shipping = Self::calculate_shipping(subtotal, policy);

        OrderTotals {
            subtotal,
            tax,
            shipping,
            discount,
            total: Self::calculate_total(subtotal, tax, shipping, discount),
        }
    }
}
