use serde::{Deserialize, Serialize};

use crate::orders::{Order, OrderError, ScheduleStatus};

/// Requested change to a delivery schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleAction {
    Pause,
    Resume,
    End,
}

impl ScheduleAction {
    /// Schedule status this action moves towards
    pub fn target(&self) -> ScheduleStatus {
        match self {
            ScheduleAction::Pause => ScheduleStatus::Paused,
            ScheduleAction::Resume => ScheduleStatus::Active,
            ScheduleAction::End => ScheduleStatus::Ended,
        }
    }
}

/// Service for managing delivery schedule transitions
pub struct ScheduleStateMachine;

impl ScheduleStateMachine {
    /// Check if a schedule transition is valid
    ///
    /// # Valid Transitions
    /// - Active → Paused, Ended
    /// - Paused → Active, Ended
    /// - Ended → (nothing but itself)
    /// - Any status → Same status (idempotent)
    pub fn is_valid_transition(from: ScheduleStatus, to: ScheduleStatus) -> bool {
        if from == to {
            return true;
        }

        match (from, to) {
            (ScheduleStatus::Active, ScheduleStatus::Paused) => true,
            (ScheduleStatus::Active, ScheduleStatus::Ended) => true,
            (ScheduleStatus::Paused, ScheduleStatus::Active) => true,
            (ScheduleStatus::Paused, ScheduleStatus::Ended) => true,
            (ScheduleStatus::Ended, _) => false,
            _ => false,
        }
    }

    /// Attempt to transition from one schedule status to another
    pub fn transition(from: ScheduleStatus, to: ScheduleStatus) -> Result<ScheduleStatus, OrderError> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(OrderError::InvalidTransition(format!(
                "Invalid schedule transition from {} to {}",
                from, to
            )))
        }
    }

    /// Apply an action to an order's schedule in place
    ///
    /// Returns `true` when the schedule actually changed and `false` for an
    /// idempotent no-op. Ending a schedule clears `next_delivery_at`. Resuming
    /// leaves the date untouched; the caller recomputes it.
    pub fn apply(order: &mut Order, action: ScheduleAction) -> Result<bool, OrderError> {
        if !order.is_recurring {
            return Err(OrderError::InvalidState(format!(
                "Order {} is not a recurring order",
                order.order_number
            )));
        }

        let from = order.schedule_status.unwrap_or(ScheduleStatus::Active);
        let to = Self::transition(from, action.target())?;
        if from == to && order.schedule_status.is_some() {
            return Ok(false);
        }

        order.schedule_status = Some(to);
        if to == ScheduleStatus::Ended {
            order.next_delivery_at = None;
        }
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::orders::{Address, OrderStatus, PaymentMethod, PaymentStatus};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    pub(crate) fn recurring_order(status: ScheduleStatus) -> Order {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let address = Address {
            recipient: None,
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            state: None,
            postal_code: "12345".to_string(),
            country: "US".to_string(),
            phone: None,
        };
        Order {
            id: Uuid::new_v4(),
            order_number: "RO-20240101-ABC123".to_string(),
            customer_id: Uuid::new_v4(),
            customer_name: "Test Customer".to_string(),
            items: vec![],
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            shipping: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Card,
            is_recurring: true,
            recurrence: None,
            schedule_status: Some(status),
            next_delivery_at: NaiveDate::from_ymd_opt(2024, 1, 3),
            shipping_address: address.clone(),
            billing_address: address,
            notes: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_active_to_paused() {
        assert!(ScheduleStateMachine::is_valid_transition(
            ScheduleStatus::Active,
            ScheduleStatus::Paused
        ));
    }

    #[test]
    fn test_paused_to_active() {
        assert!(ScheduleStateMachine::is_valid_transition(
            ScheduleStatus::Paused,
            ScheduleStatus::Active
        ));
    }

    #[test]
    fn test_ended_is_terminal() {
        assert!(!ScheduleStateMachine::is_valid_transition(
            ScheduleStatus::Ended,
            ScheduleStatus::Active
        ));
        assert!(!ScheduleStateMachine::is_valid_transition(
            ScheduleStatus::Ended,
            ScheduleStatus::Paused
        ));

        let result = ScheduleStateMachine::transition(ScheduleStatus::Ended, ScheduleStatus::Active);
        assert!(matches!(result, Err(OrderError::InvalidTransition(_))));
    }

    #[test]
    fn test_pause_keeps_next_delivery() {
        let mut order = recurring_order(ScheduleStatus::Active);
        let changed = ScheduleStateMachine::apply(&mut order, ScheduleAction::Pause).unwrap();

        assert!(changed);
        assert_eq!(order.schedule_status, Some(ScheduleStatus::Paused));
        assert_eq!(order.next_delivery_at, NaiveDate::from_ymd_opt(2024, 1, 3));
    }

    #[test]
    fn test_end_clears_next_delivery() {
        let mut order = recurring_order(ScheduleStatus::Paused);
        assert!(ScheduleStateMachine::apply(&mut order, ScheduleAction::End).unwrap());

        assert_eq!(order.schedule_status, Some(ScheduleStatus::Ended));
        assert_eq!(order.next_delivery_at, None);
    }

    #[test]
    fn test_repeated_action_is_noop() {
        let mut order = recurring_order(ScheduleStatus::Paused);
        let before = order.clone();

        assert!(!ScheduleStateMachine::apply(&mut order, ScheduleAction::Pause).unwrap());
        assert_eq!(order, before);

        let mut ended = recurring_order(ScheduleStatus::Ended);
        ended.next_delivery_at = None;
        assert!(!ScheduleStateMachine::apply(&mut ended, ScheduleAction::End).unwrap());
    }

    #[test]
    fn test_resume_after_end_fails() {
        let mut order = recurring_order(ScheduleStatus::Ended);
        let result = ScheduleStateMachine::apply(&mut order, ScheduleAction::Resume);
        assert!(matches!(result, Err(OrderError::InvalidTransition(_))));
        assert_eq!(order.schedule_status, Some(ScheduleStatus::Ended));
    }

    #[test]
    fn test_one_time_order_has_no_schedule() {
        let mut order = recurring_order(ScheduleStatus::Active);
        order.is_recurring = false;
        order.schedule_status = None;

        let result = ScheduleStateMachine::apply(&mut order, ScheduleAction::Pause);
        assert!(matches!(result, Err(OrderError::InvalidState(_))));
    }
}
