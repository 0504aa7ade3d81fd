//! Session discount catalog model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a discount reduces a computed quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Amount,
    Percentage,
    PricingProfile,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Amount => "amount",
            DiscountType::Percentage => "percentage",
            DiscountType::PricingProfile => "pricing_profile",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "percentage" => DiscountType::Percentage,
            "pricing_profile" => DiscountType::PricingProfile,
            _ => DiscountType::Amount,
        }
    }
}

/// An independently configured reduction applied on top of a computed quote.
///
/// Discounts carrying a `code` are applied only when the caller supplies the
/// code; codeless discounts auto-apply by priority.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionDiscount {
    pub discount_id: Uuid,
    pub tenant_id: Uuid,
    pub code: Option<String>,
    pub discount_type: String,
    pub value: Option<Decimal>,
    pub minute_value: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub min_amount: Option<Decimal>,
    pub priority: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl SessionDiscount {
    pub fn discount_type(&self) -> DiscountType {
        DiscountType::from_string(&self.discount_type)
    }
}
