use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// Error types for order and schedule operations
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Product {product_id} is out of stock: requested {requested}, available {available}")]
    OutOfStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("No shipping address could be resolved for this order")]
    MissingShippingAddress,

    #[error("Invalid order state: {0}")]
    InvalidState(String),

    #[error("Invalid schedule transition: {0}")]
    InvalidTransition(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl OrderError {
    /// Shorthand for a missing order
    pub fn order_not_found(id: Uuid) -> Self {
        OrderError::NotFound {
            resource: "Order",
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OrderError::ValidationError(_) => StatusCode::BAD_REQUEST,
            OrderError::OutOfStock { .. } => StatusCode::CONFLICT,
            OrderError::ProductNotFound(_) => StatusCode::BAD_REQUEST,
            OrderError::MissingShippingAddress => StatusCode::BAD_REQUEST,
            OrderError::InvalidState(_) => StatusCode::CONFLICT,
            OrderError::InvalidTransition(_) => StatusCode::CONFLICT,
            OrderError::AccessDenied(_) => StatusCode::FORBIDDEN,
            OrderError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrderError::Unauthorized => StatusCode::UNAUTHORIZED,
            OrderError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        OrderError::DatabaseError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for OrderError {
    fn from(err: validator::ValidationErrors) -> Self {
        OrderError::ValidationError(err.to_string())
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_message = match &self {
            OrderError::DatabaseError(msg) => {
                // Database details stay in the logs
                tracing::error!("Database error: {}", msg);
                "A database error occurred".to_string()
            }
            OrderError::AccessDenied(msg) => {
                tracing::warn!("Access denied: {}", msg);
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = OrderError::ValidationError("bad day".to_string());
        assert_eq!(error.to_string(), "Validation error: bad day");

        let id = Uuid::nil();
        let error = OrderError::OutOfStock {
            product_id: id,
            requested: 3,
            available: 1,
        };
        assert_eq!(
            error.to_string(),
            format!("Product {} is out of stock: requested 3, available 1", id)
        );

        let error = OrderError::order_not_found(id);
        assert_eq!(error.to_string(), format!("Order not found: {}", id));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            OrderError::MissingShippingAddress.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OrderError::InvalidTransition("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            OrderError::AccessDenied("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(OrderError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_error_from_sqlx() {
        let err: OrderError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, OrderError::DatabaseError(_)));
    }
}
