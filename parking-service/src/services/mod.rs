//! Services module for parking-service.

pub mod database;
pub mod metrics;
pub mod pricing;
pub mod settlement;

pub use database::Database;
pub use metrics::{
    get_metrics, init_metrics, record_debt_operation, record_error, record_payment_amount,
    record_session_operation, record_shift_operation,
};
