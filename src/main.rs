pub mod audit;
pub mod catalog;
pub mod config;
pub mod customers;
pub mod db;
pub mod orders;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use audit::{AuditSink, InMemoryAuditLog, PgAuditLog};
use catalog::{Catalog, PgCatalog};
use config::{AppConfig, MemorySeed, StorageBackend};
use customers::{CustomerDirectory, PgCustomerDirectory};
use orders::{
    bulk_action_handler, cancel_order_handler, create_order_handler, delete_order_handler,
    edit_order_handler, get_order_handler, list_recurring_orders_handler, metrics_handler,
    update_order_status_handler, update_schedule_handler, BulkScheduleOperator, InMemoryOrderStore,
    OrderService, OrderStore, PgOrderStore, PricingPolicy,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub order_service: OrderService,
    pub bulk_operator: BulkScheduleOperator,
}

impl AppState {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        customers: Arc<dyn CustomerDirectory>,
        audit: Arc<dyn AuditSink>,
        pricing: PricingPolicy,
    ) -> Self {
        let order_service = OrderService::new(orders, catalog, customers, audit, pricing);
        Self {
            bulk_operator: BulkScheduleOperator::new(order_service.clone()),
            order_service,
        }
    }

    /// State backed by Postgres tables
    pub fn postgres(pool: PgPool, pricing: PricingPolicy) -> Self {
        Self::new(
            Arc::new(PgOrderStore::new(pool.clone())),
            Arc::new(PgCatalog::new(pool.clone())),
            Arc::new(PgCustomerDirectory::new(pool.clone())),
            Arc::new(PgAuditLog::new(pool)),
            pricing,
        )
    }

    /// Orders and audit entries in memory; catalog and customers supplied by the caller
    pub fn in_memory(
        catalog: Arc<dyn Catalog>,
        customers: Arc<dyn CustomerDirectory>,
        pricing: PricingPolicy,
    ) -> Self {
        Self::new(
            Arc::new(InMemoryOrderStore::new()),
            catalog,
            customers,
            Arc::new(InMemoryAuditLog::new()),
            pricing,
        )
    }
}

/// Creates and configures the application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/orders", post(create_order_handler))
        .route(
            "/api/orders/:id",
            get(get_order_handler)
                .patch(edit_order_handler)
                .delete(delete_order_handler),
        )
        .route("/api/orders/:id/cancel", post(cancel_order_handler))
        .route(
            "/api/orders/:id/status",
            axum::routing::patch(update_order_status_handler),
        )
        .route("/api/orders/:id/schedule", post(update_schedule_handler))
        .route("/api/recurring-orders", get(list_recurring_orders_handler))
        .route("/api/recurring-orders/bulk", post(bulk_action_handler))
        .route("/api/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Recurring order engine - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");

    let state = match (config.storage, config.database_url.as_deref()) {
        (StorageBackend::Postgres, Some(database_url)) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url)
                .await
                .expect("Failed to create database pool");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            AppState::postgres(pool, config.pricing.clone())
        }
        (StorageBackend::Postgres, None) => {
            panic!("DATABASE_URL must be set in environment")
        }
        (StorageBackend::Memory, _) => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            let seed = match config.memory_seed_file.as_deref() {
                Some(path) => MemorySeed::load(path).expect("Failed to load memory seed"),
                None => {
                    tracing::warn!("MEMORY_SEED_FILE not set; catalog and customers start empty");
                    MemorySeed::default()
                }
            };
            tracing::info!(
                "Seeded {} products and {} customers",
                seed.products.len(),
                seed.customers.len()
            );
            AppState::in_memory(
                Arc::new(catalog::InMemoryCatalog::with_products(seed.products)),
                Arc::new(customers::InMemoryCustomerDirectory::with_customers(seed.customers)),
                config.pricing.clone(),
            )
        }
    };

    let app = create_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Recurring order engine is running on http://{}", addr);

    axum::serve(listener, app).await.expect("Server error");
}
