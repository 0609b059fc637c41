use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::orders::{OrderError, OrderService, Requester, ScheduleAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Pause,
    Resume,
    End,
    Delete,
}

impl BulkAction {
    fn schedule_action(&self) -> Option<ScheduleAction> {
        match self {
            BulkAction::Pause => Some(ScheduleAction::Pause),
            BulkAction::Resume => Some(ScheduleAction::Resume),
            BulkAction::End => Some(ScheduleAction::End),
            BulkAction::Delete => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkActionRequest {
    pub action: BulkAction,
    pub order_ids: Vec<Uuid>,
}

/// Failure of a single order inside a bulk run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOrderError {
    pub order_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkActionResult {
    pub action: BulkAction,
    pub requested_count: usize,
    /// Orders actually mutated; idempotent no-ops are not counted
    pub affected_count: usize,
    pub errors: Vec<BulkOrderError>,
}

/// Applies one schedule action to many recurring orders
#[derive(Clone)]
pub struct BulkScheduleOperator {
    service: OrderService,
}

impl BulkScheduleOperator {
    pub fn new(service: OrderService) -> Self {
        Self { service }
    }

    /// Apply `action` to every listed order
    ///
    /// Validation is all-or-nothing: the list must be non-empty and every id
    /// must name an existing recurring order, otherwise nothing is touched.
    /// After that each order is mutated on its own and failures are collected
    /// in the result instead of aborting the run.
    pub async fn apply_bulk_action(
        &self,
        action: BulkAction,
        order_ids: &[Uuid],
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> Result<BulkActionResult, OrderError> {
        requester.ensure_admin()?;

        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = order_ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if ids.is_empty() {
            return Err(OrderError::ValidationError(
                "At least one order id is required".to_string(),
            ));
        }

        let mut orders: HashMap<Uuid, _> = self
            .service
            .store()
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|order| (order.id, order))
            .collect();

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !orders.contains_key(id))
            .map(Uuid::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(OrderError::NotFound {
                resource: "Order",
                id: missing.join(", "),
            });
        }

        let one_time: Vec<&str> = orders
            .values()
            .filter(|order| !order.is_recurring)
            .map(|order| order.order_number.as_str())
            .collect();
        if !one_time.is_empty() {
            return Err(OrderError::ValidationError(format!(
                "Not recurring orders: {}",
                one_time.join(", ")
            )));
        }

        let _timer = self.service.metrics().start_bulk_action();
        let mut affected_count = 0;
        let mut errors = Vec::new();

        for id in &ids {
            let Some(order) = orders.remove(id) else {
                continue;
            };

            let outcome = match action.schedule_action() {
                Some(schedule_action) => self
                    .service
                    .apply_schedule_action(order, schedule_action, requester.id, now)
                    .await
                    .map(|(_, changed)| changed),
                None => self
                    .service
                    .remove_order(&order, requester.id)
                    .await
                    .map(|_| true),
            };

            match outcome {
                Ok(true) => affected_count += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Bulk {:?} failed for order {}: {}", action, id, e);
                    errors.push(BulkOrderError {
                        order_id: *id,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.service
            .metrics()
            .record_bulk_outcome(affected_count, errors.len());

        tracing::info!(
            "Bulk {:?} on {} orders: {} affected, {} failed",
            action,
            ids.len(),
            affected_count,
            errors.len()
        );

        Ok(BulkActionResult {
            action,
            requested_count: ids.len(),
            affected_count,
            errors,
        })
    }
}
