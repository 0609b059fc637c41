pub mod address;
pub mod aggregate;
pub mod bulk;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod price_calculator;
pub mod query;
pub mod recurrence;
pub mod repository;
pub mod resolver;
pub mod schedule_machine;
pub mod service;

pub use address::*;
pub use aggregate::*;
pub use bulk::*;
pub use error::*;
pub use handlers::*;
pub use metrics::*;
pub use models::*;
pub use price_calculator::*;
pub use query::*;
pub use recurrence::*;
pub use repository::*;
pub use resolver::*;
pub use schedule_machine::*;
pub use service::*;
