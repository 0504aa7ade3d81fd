//! Parking session pricing and settlement service.
//!
//! The core of the system is the pricing engine (`services::pricing`) and
//! the settlement orchestrator (`services::settlement`); the REST surface in
//! `handlers` is a thin layer over them.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::AppState;
