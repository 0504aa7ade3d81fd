//! Payment model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Webpay,
    Transfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Webpay => "webpay",
            PaymentMethod::Transfer => "transfer",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "card" => PaymentMethod::Card,
            "webpay" => PaymentMethod::Webpay,
            "transfer" => PaymentMethod::Transfer,
            _ => PaymentMethod::Cash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Confirmed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "failed" => PaymentStatus::Failed,
            _ => PaymentStatus::Confirmed,
        }
    }
}

/// Immutable record of money received, linked to a session or a debt
/// settlement, and to the shift whose drawer collected it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub session_id: Option<Uuid>,
    pub debt_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: String,
    pub status: String,
    pub provider_txn_id: Option<String>,
    pub provider_ref: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Payment {
    pub fn method(&self) -> PaymentMethod {
        PaymentMethod::from_string(&self.method)
    }

    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.status)
    }
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub tenant_id: Uuid,
    pub session_id: Option<Uuid>,
    pub debt_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub provider_txn_id: Option<String>,
    pub provider_ref: Option<String>,
}
