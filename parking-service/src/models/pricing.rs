//! Tariff configuration models.
//!
//! Profiles and rules are administered by a separate CRUD surface; this
//! service only reads them.

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a pricing rule turns elapsed minutes into an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    TimeBased,
    Fixed,
    Graduated,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::TimeBased => "time_based",
            RuleType::Fixed => "fixed",
            RuleType::Graduated => "graduated",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "fixed" => RuleType::Fixed,
            "graduated" => RuleType::Graduated,
            _ => RuleType::TimeBased,
        }
    }
}

/// A named, time-bounded tariff configuration for a sector.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricingProfile {
    pub profile_id: Uuid,
    pub tenant_id: Uuid,
    pub sector_id: Uuid,
    pub name: String,
    pub active_from: Option<DateTime<Utc>>,
    pub active_to: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// One tariff line within a profile, governing a duration/day/time window.
///
/// `days_of_week` uses 0 = Sunday .. 6 = Saturday; an empty set is a
/// wildcard. A `start_time..end_time` window may wrap past midnight.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricingRule {
    pub rule_id: Uuid,
    pub profile_id: Uuid,
    pub rule_type: String,
    pub min_duration_minutes: i32,
    pub max_duration_minutes: Option<i32>,
    pub daily_max_amount: Option<Decimal>,
    pub min_amount: Option<Decimal>,
    pub min_amount_is_base: bool,
    pub price_per_min: Option<Decimal>,
    pub fixed_price: Option<Decimal>,
    pub days_of_week: Vec<i16>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub priority: i32,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl PricingRule {
    pub fn rule_type(&self) -> RuleType {
        RuleType::from_string(&self.rule_type)
    }
}
