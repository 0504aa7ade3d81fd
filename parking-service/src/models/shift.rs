//! Shift and cash drawer models.

use crate::models::payment::{Payment, PaymentMethod, PaymentStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,
    Closed,
    Canceled,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Open => "open",
            ShiftStatus::Closed => "closed",
            ShiftStatus::Canceled => "canceled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "closed" => ShiftStatus::Closed,
            "canceled" => ShiftStatus::Canceled,
            _ => ShiftStatus::Open,
        }
    }
}

/// Kind of an append-only drawer movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Payment,
    Withdrawal,
    Deposit,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Payment => "payment",
            OperationKind::Withdrawal => "withdrawal",
            OperationKind::Deposit => "deposit",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "withdrawal" => OperationKind::Withdrawal,
            "deposit" => OperationKind::Deposit,
            _ => OperationKind::Payment,
        }
    }
}

/// A bounded work period during which an operator's cash drawer is tracked.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Shift {
    pub shift_id: Uuid,
    pub tenant_id: Uuid,
    pub operator_id: Uuid,
    pub sector_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub status: String,
    pub opening_float: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closing_declared_cash: Option<Decimal>,
    pub expected_cash: Option<Decimal>,
    pub cash_over_short: Option<Decimal>,
    pub closed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Shift {
    pub fn status(&self) -> ShiftStatus {
        ShiftStatus::from_string(&self.status)
    }

    pub fn is_open(&self) -> bool {
        self.status() == ShiftStatus::Open
    }
}

/// Append-only audit row for every monetary movement touching a shift.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShiftOperation {
    pub operation_id: Uuid,
    pub tenant_id: Uuid,
    pub shift_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub reference_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

/// A manual, reasoned cash movement (withdrawal/deposit) during a shift.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CashAdjustment {
    pub adjustment_id: Uuid,
    pub tenant_id: Uuid,
    pub shift_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl CashAdjustment {
    pub fn kind(&self) -> OperationKind {
        OperationKind::from_string(&self.kind)
    }
}

/// Input for opening a shift.
#[derive(Debug, Clone)]
pub struct OpenShift {
    pub tenant_id: Uuid,
    pub operator_id: Uuid,
    pub sector_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub opening_float: Decimal,
}

/// Derived drawer totals for a shift. Computed, never stored while the shift
/// is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftTotals {
    pub cash_collected: Decimal,
    pub cash_withdrawals: Decimal,
    pub cash_deposits: Decimal,
    pub expected_cash: Decimal,
}

impl ShiftTotals {
    /// Derive totals from the shift's collected payments and manual
    /// adjustments.
    ///
    /// `expected_cash = opening_float + cash collected + deposits - withdrawals`.
    /// Only confirmed CASH payments move the drawer.
    pub fn calculate(
        opening_float: Decimal,
        payments: &[Payment],
        adjustments: &[CashAdjustment],
    ) -> Self {
        let cash_collected: Decimal = payments
            .iter()
            .filter(|p| p.method() == PaymentMethod::Cash && p.status() == PaymentStatus::Confirmed)
            .map(|p| p.amount)
            .sum();

        let cash_withdrawals: Decimal = adjustments
            .iter()
            .filter(|a| a.kind() == OperationKind::Withdrawal)
            .map(|a| a.amount)
            .sum();

        let cash_deposits: Decimal = adjustments
            .iter()
            .filter(|a| a.kind() == OperationKind::Deposit)
            .map(|a| a.amount)
            .sum();

        let expected_cash = opening_float + cash_collected + cash_deposits - cash_withdrawals;

        Self {
            cash_collected,
            cash_withdrawals,
            cash_deposits,
            expected_cash,
        }
    }

    /// Signed difference between declared and expected cash at close.
    pub fn over_short(&self, declared_cash: Decimal) -> Decimal {
        declared_cash - self.expected_cash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn payment(amount: &str, method: PaymentMethod, status: PaymentStatus) -> Payment {
        Payment {
            payment_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            session_id: None,
            debt_id: None,
            shift_id: Some(Uuid::new_v4()),
            amount: dec(amount),
            method: method.as_str().to_string(),
            status: status.as_str().to_string(),
            provider_txn_id: None,
            provider_ref: None,
            created_utc: Utc::now(),
        }
    }

    fn adjustment(amount: &str, kind: OperationKind) -> CashAdjustment {
        CashAdjustment {
            adjustment_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            shift_id: Uuid::new_v4(),
            kind: kind.as_str().to_string(),
            amount: dec(amount),
            reason: None,
            created_by: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn totals_for_empty_shift_equal_opening_float() {
        let totals = ShiftTotals::calculate(dec("10000"), &[], &[]);
        assert_eq!(totals.cash_collected, Decimal::ZERO);
        assert_eq!(totals.expected_cash, dec("10000"));
    }

    #[test]
    fn expected_cash_combines_float_payments_and_adjustments() {
        let payments = vec![payment("500", PaymentMethod::Cash, PaymentStatus::Confirmed)];
        let adjustments = vec![adjustment("2000", OperationKind::Withdrawal)];

        let totals = ShiftTotals::calculate(dec("10000"), &payments, &adjustments);
        assert_eq!(totals.cash_collected, dec("500"));
        assert_eq!(totals.cash_withdrawals, dec("2000"));
        assert_eq!(totals.cash_deposits, Decimal::ZERO);
        assert_eq!(totals.expected_cash, dec("8500"));
        assert_eq!(totals.over_short(dec("8300")), dec("-200"));
    }

    #[test]
    fn non_cash_and_failed_payments_do_not_move_the_drawer() {
        let payments = vec![
            payment("500", PaymentMethod::Cash, PaymentStatus::Confirmed),
            payment("900", PaymentMethod::Card, PaymentStatus::Confirmed),
            payment("700", PaymentMethod::Cash, PaymentStatus::Failed),
        ];

        let totals = ShiftTotals::calculate(dec("1000"), &payments, &[]);
        assert_eq!(totals.cash_collected, dec("500"));
        assert_eq!(totals.expected_cash, dec("1500"));
    }

    #[test]
    fn deposits_increase_expected_cash() {
        let adjustments = vec![
            adjustment("3000", OperationKind::Deposit),
            adjustment("1000", OperationKind::Withdrawal),
        ];

        let totals = ShiftTotals::calculate(dec("5000"), &[], &adjustments);
        assert_eq!(totals.expected_cash, dec("7000"));
        assert_eq!(totals.over_short(dec("7000")), Decimal::ZERO);
    }
}
