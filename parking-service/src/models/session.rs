//! Parking session model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Session lifecycle state. Transitions are one-way: ACTIVE is the only
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Canceled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Canceled => "canceled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "completed" => SessionStatus::Completed,
            "canceled" => SessionStatus::Canceled,
            _ => SessionStatus::Active,
        }
    }
}

/// A vehicle's stay in a managed sector. `started_at` is immutable;
/// `ended_at` is set exactly once, at the terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ParkingSession {
    pub session_id: Uuid,
    pub tenant_id: Uuid,
    pub plate: String,
    pub sector_id: Uuid,
    pub street_id: Option<Uuid>,
    pub entry_operator_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub settled_amount: Option<Decimal>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl ParkingSession {
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_string(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }
}

/// Input for creating a session.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub tenant_id: Uuid,
    pub plate: String,
    pub sector_id: Uuid,
    pub street_id: Option<Uuid>,
    pub entry_operator_id: Uuid,
}
