// HTTP handlers for order and schedule endpoints

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::orders::{
    BulkActionRequest, BulkActionResult, CreateOrderRequest, EditOrderRequest, MetricsSnapshot,
    Order, OrderError, RecurringOrderPage, RecurringOrderQuery, Requester, ScheduleAction,
    UpdateStatusRequest,
};

/// Caller id, set by the authentication gateway in front of this service
pub const USER_ID_HEADER: &str = "x-user-id";
/// Caller role; "admin" grants administrative operations
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[async_trait]
impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = OrderError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or(OrderError::Unauthorized)?;

        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map_or(false, |role| role.trim().eq_ignore_ascii_case("admin"));

        Ok(Requester { id, is_admin })
    }
}

#[derive(Debug, Deserialize)]
pub struct ScheduleActionRequest {
    pub action: ScheduleAction,
}

/// Handler for POST /api/orders
pub async fn create_order_handler(
    State(state): State<crate::AppState>,
    requester: Requester,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), OrderError> {
    let customer_id = requester.acting_for(request.customer_id)?;

    let order = state
        .order_service
        .create_order(customer_id, request, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// Handler for GET /api/orders/:id
pub async fn get_order_handler(
    State(state): State<crate::AppState>,
    requester: Requester,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, OrderError> {
    let order = state.order_service.get_order(order_id, &requester).await?;
    Ok(Json(order))
}

/// Handler for PATCH /api/orders/:id
pub async fn edit_order_handler(
    State(state): State<crate::AppState>,
    requester: Requester,
    Path(order_id): Path<Uuid>,
    Json(request): Json<EditOrderRequest>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .edit_order(order_id, request, &requester, Utc::now())
        .await?;

    Ok(Json(order))
}

/// Handler for DELETE /api/orders/:id (admin)
pub async fn delete_order_handler(
    State(state): State<crate::AppState>,
    requester: Requester,
    Path(order_id): Path<Uuid>,
) -> Result<StatusCode, OrderError> {
    state.order_service.delete_order(order_id, &requester).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/orders/:id/cancel
pub async fn cancel_order_handler(
    State(state): State<crate::AppState>,
    requester: Requester,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .cancel_order(order_id, &requester, Utc::now())
        .await?;

    Ok(Json(order))
}

/// Handler for PATCH /api/orders/:id/status (admin)
pub async fn update_order_status_handler(
    State(state): State<crate::AppState>,
    requester: Requester,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .set_order_status(order_id, request.status, &requester, Utc::now())
        .await?;

    Ok(Json(order))
}

/// Handler for POST /api/orders/:id/schedule
pub async fn update_schedule_handler(
    State(state): State<crate::AppState>,
    requester: Requester,
    Path(order_id): Path<Uuid>,
    Json(request): Json<ScheduleActionRequest>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .update_schedule(order_id, request.action, &requester, Utc::now())
        .await?;

    Ok(Json(order))
}

/// Handler for GET /api/recurring-orders
pub async fn list_recurring_orders_handler(
    State(state): State<crate::AppState>,
    requester: Requester,
    Query(query): Query<RecurringOrderQuery>,
) -> Result<Json<RecurringOrderPage>, OrderError> {
    tracing::debug!("Listing recurring orders with {:?}", query);

    let page = state
        .order_service
        .list_recurring_orders(query, &requester)
        .await?;

    Ok(Json(page))
}

/// Handler for POST /api/recurring-orders/bulk (admin)
pub async fn bulk_action_handler(
    State(state): State<crate::AppState>,
    requester: Requester,
    Json(request): Json<BulkActionRequest>,
) -> Result<Json<BulkActionResult>, OrderError> {
    let result = state
        .bulk_operator
        .apply_bulk_action(request.action, &request.order_ids, &requester, Utc::now())
        .await?;

    Ok(Json(result))
}

/// Handler for GET /api/metrics (admin)
pub async fn metrics_handler(
    State(state): State<crate::AppState>,
    requester: Requester,
) -> Result<Json<MetricsSnapshot>, OrderError> {
    requester.ensure_admin()?;
    Ok(Json(state.order_service.metrics().snapshot()))
}
