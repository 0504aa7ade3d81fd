//! Debt ledger model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtOrigin {
    Session,
    Fine,
    Manual,
}

impl DebtOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtOrigin::Session => "session",
            DebtOrigin::Fine => "fine",
            DebtOrigin::Manual => "manual",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "session" => DebtOrigin::Session,
            "fine" => DebtOrigin::Fine,
            _ => DebtOrigin::Manual,
        }
    }
}

/// Debt status. SETTLED and CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    Pending,
    Settled,
    Cancelled,
}

impl DebtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtStatus::Pending => "pending",
            DebtStatus::Settled => "settled",
            DebtStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "settled" => DebtStatus::Settled,
            "cancelled" => DebtStatus::Cancelled,
            _ => DebtStatus::Pending,
        }
    }
}

/// An unpaid obligation recorded when a session or fine is not settled
/// immediately.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Debt {
    pub debt_id: Uuid,
    pub tenant_id: Uuid,
    pub plate: String,
    pub principal_amount: Decimal,
    pub origin: String,
    pub status: String,
    pub session_id: Option<Uuid>,
    pub notes: Option<String>,
    pub settled_amount: Option<Decimal>,
    pub settled_at: Option<DateTime<Utc>>,
    pub settled_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Debt {
    pub fn status(&self) -> DebtStatus {
        DebtStatus::from_string(&self.status)
    }
}

/// Input for creating a debt.
#[derive(Debug, Clone)]
pub struct CreateDebt {
    pub tenant_id: Uuid,
    pub plate: String,
    pub principal_amount: Decimal,
    pub origin: DebtOrigin,
    pub session_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Filter parameters for listing debts.
#[derive(Debug, Clone, Default)]
pub struct ListDebtsFilter {
    pub plate: Option<String>,
    pub status: Option<DebtStatus>,
}
