//! Request and response types for the REST surface.

use crate::models::{
    CashAdjustment, Debt, OperationKind, ParkingSession, Payment, PaymentMethod, ShiftTotals,
};
use crate::models::Shift;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 16))]
    pub plate: String,
    pub sector_id: Uuid,
    pub street_id: Option<Uuid>,
    /// Entering operator; defaults to the authenticated operator.
    pub operator_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub plate: String,
    pub sector_id: Uuid,
    pub street_id: Option<Uuid>,
    pub entry_operator_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub settled_amount: Option<Decimal>,
}

impl From<ParkingSession> for SessionResponse {
    fn from(s: ParkingSession) -> Self {
        Self {
            session_id: s.session_id,
            plate: s.plate,
            sector_id: s.sector_id,
            street_id: s.street_id,
            entry_operator_id: s.entry_operator_id,
            status: s.status,
            started_at: s.started_at,
            ended_at: s.ended_at,
            settled_amount: s.settled_amount,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    #[serde(flatten)]
    pub session: SessionResponse,
    pub payments: Vec<PaymentResponse>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub ended_at: Option<DateTime<Utc>>,
    pub discount_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub ended_at: Option<DateTime<Utc>>,
    pub discount_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session: SessionResponse,
    pub payment: PaymentResponse,
    pub quote: crate::services::pricing::Quote,
}

#[derive(Debug, Deserialize, Default)]
pub struct ForceCheckoutRequest {
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ForceCheckoutResponse {
    pub session: SessionResponse,
    pub debt: DebtResponse,
    pub quote: crate::services::pricing::Quote,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub session_id: Option<Uuid>,
    pub debt_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: String,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            payment_id: p.payment_id,
            session_id: p.session_id,
            debt_id: p.debt_id,
            shift_id: p.shift_id,
            amount: p.amount,
            method: p.method,
            status: p.status,
            created_utc: p.created_utc,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDebtRequest {
    #[validate(length(min = 1, max = 16))]
    pub plate: String,
    pub amount: Decimal,
    /// MANUAL or FINE; session debts are created by force checkout only.
    pub origin: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SettleDebtRequest {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub cashier_operator_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListDebtsQuery {
    pub plate: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DebtResponse {
    pub debt_id: Uuid,
    pub plate: String,
    pub principal_amount: Decimal,
    pub origin: String,
    pub status: String,
    pub session_id: Option<Uuid>,
    pub notes: Option<String>,
    pub settled_amount: Option<Decimal>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl From<Debt> for DebtResponse {
    fn from(d: Debt) -> Self {
        Self {
            debt_id: d.debt_id,
            plate: d.plate,
            principal_amount: d.principal_amount,
            origin: d.origin,
            status: d.status,
            session_id: d.session_id,
            notes: d.notes,
            settled_amount: d.settled_amount,
            settled_at: d.settled_at,
            created_utc: d.created_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SettleDebtResponse {
    pub debt: DebtResponse,
    pub payment: PaymentResponse,
}

#[derive(Debug, Deserialize)]
pub struct OpenShiftRequest {
    /// Defaults to the authenticated operator.
    pub operator_id: Option<Uuid>,
    pub opening_float: Decimal,
    pub sector_id: Option<Uuid>,
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentShiftQuery {
    pub operator_id: Option<Uuid>,
    pub device_id: Option<String>,
}

/// Manual drawer movement kinds accepted over the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Withdrawal,
    Deposit,
}

impl AdjustmentKind {
    pub fn as_operation(self) -> OperationKind {
        match self {
            AdjustmentKind::Withdrawal => OperationKind::Withdrawal,
            AdjustmentKind::Deposit => OperationKind::Deposit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentRequest {
    #[serde(rename = "type")]
    pub kind: AdjustmentKind,
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdjustmentResponse {
    pub adjustment_id: Uuid,
    pub shift_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<CashAdjustment> for AdjustmentResponse {
    fn from(a: CashAdjustment) -> Self {
        Self {
            adjustment_id: a.adjustment_id,
            shift_id: a.shift_id,
            kind: a.kind,
            amount: a.amount,
            reason: a.reason,
            created_utc: a.created_utc,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CloseShiftRequest {
    pub closing_declared_cash: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShiftResponse {
    pub shift_id: Uuid,
    pub operator_id: Uuid,
    pub sector_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub status: String,
    pub opening_float: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closing_declared_cash: Option<Decimal>,
    pub cash_over_short: Option<Decimal>,
    pub notes: Option<String>,
    pub totals: ShiftTotals,
}

impl ShiftResponse {
    pub fn from_shift(shift: Shift, totals: ShiftTotals) -> Self {
        Self {
            shift_id: shift.shift_id,
            operator_id: shift.operator_id,
            sector_id: shift.sector_id,
            device_id: shift.device_id,
            status: shift.status,
            opening_float: shift.opening_float,
            opened_at: shift.opened_at,
            closed_at: shift.closed_at,
            closing_declared_cash: shift.closing_declared_cash,
            cash_over_short: shift.cash_over_short,
            notes: shift.notes,
            totals,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub transaction_id: String,
    pub session_id: Uuid,
    pub amount: Decimal,
    pub status: String,
    pub provider_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub payment_id: Uuid,
    pub status: String,
    pub replay: bool,
}
