//! REST handlers for parking-service.

pub mod debts;
pub mod sessions;
pub mod shifts;
pub mod webhooks;
