//! Settlement orchestration: the transaction boundary for checkouts, debt
//! settlement, shift reconciliation and provider callbacks.
//!
//! Every write path here runs inside one transaction. Row locks on the
//! session/shift/debt being settled serialize concurrent attempts so that
//! exactly one wins and the loser observes a typed conflict; any failure
//! rolls the whole transaction back.

use crate::models::{
    CashAdjustment, CreateDebt, CreatePayment, Debt, DebtOrigin, DebtStatus, OperationKind,
    ParkingSession, Payment, PaymentMethod, PaymentStatus, SessionStatus, Shift, ShiftStatus,
    ShiftTotals,
};
use crate::services::pricing::{self, Quote};
use crate::services::Database;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::{codes, AppError};
use tracing::{info, instrument};
use uuid::Uuid;

/// Checkout input, resolved by the handler from the request body and the
/// tenant context.
#[derive(Debug, Clone)]
pub struct CheckoutCommand {
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub ended_at: Option<DateTime<Utc>>,
    pub discount_code: Option<String>,
    pub operator_id: Option<Uuid>,
}

#[derive(Debug)]
pub struct CheckoutOutcome {
    pub session: ParkingSession,
    pub payment: Payment,
    pub quote: Quote,
}

#[derive(Debug)]
pub struct ForceCheckoutOutcome {
    pub session: ParkingSession,
    pub debt: Debt,
    pub quote: Quote,
}

/// Debt settlement input.
#[derive(Debug, Clone)]
pub struct SettleDebtCommand {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub cashier_operator_id: Option<Uuid>,
}

/// Provider callback input.
#[derive(Debug, Clone)]
pub struct WebhookCommand {
    pub transaction_id: String,
    pub session_id: Uuid,
    pub amount: Decimal,
    pub approved: bool,
    pub provider_ref: Option<String>,
}

#[derive(Debug)]
pub enum WebhookOutcome {
    /// First delivery: a payment was recorded.
    Recorded(Payment),
    /// Replay of an already-processed provider transaction.
    Replay(Payment),
}

/// Read-only quote for an ACTIVE session. No side effects; callable any
/// number of times.
#[instrument(skip(db), fields(tenant_id = %tenant_id, session_id = %session_id))]
pub async fn quote_session(
    db: &Database,
    tenant_id: Uuid,
    session_id: Uuid,
    ended_at: Option<DateTime<Utc>>,
    discount_code: Option<&str>,
) -> Result<Quote, AppError> {
    let session = db
        .get_session(tenant_id, session_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Session {} not found", session_id)))?;

    if !session.is_active() {
        return Err(AppError::conflict(
            codes::SESSION_NOT_ACTIVE,
            format!("Session {} is not active", session_id),
        ));
    }

    let ended_at = ended_at.unwrap_or_else(Utc::now);
    let rules = db
        .active_rules_for_sector(tenant_id, session.sector_id, ended_at)
        .await?;
    let discounts = db.applicable_discounts(tenant_id, ended_at).await?;

    pricing::build_quote(
        session_id,
        session.started_at,
        ended_at,
        &rules,
        &discounts,
        discount_code,
    )
}

/// Paid checkout: quote, payment, COMPLETED session and drawer movement in
/// one transaction.
#[instrument(skip(db, cmd), fields(tenant_id = %tenant_id, session_id = %session_id))]
pub async fn checkout(
    db: &Database,
    tenant_id: Uuid,
    session_id: Uuid,
    cmd: CheckoutCommand,
) -> Result<CheckoutOutcome, AppError> {
    let mut tx = db
        .pool()
        .begin()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e)))?;

    let session = Database::session_for_update(&mut *tx, tenant_id, session_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Session {} not found", session_id)))?;

    if !session.is_active() {
        return Err(AppError::conflict(
            codes::SESSION_NOT_ACTIVE,
            format!("Session {} is not active", session_id),
        ));
    }

    let ended_at = cmd.ended_at.unwrap_or_else(Utc::now);
    let rules = db
        .active_rules_for_sector(tenant_id, session.sector_id, ended_at)
        .await?;
    let discounts = db.applicable_discounts(tenant_id, ended_at).await?;
    let quote = pricing::build_quote(
        session_id,
        session.started_at,
        ended_at,
        &rules,
        &discounts,
        cmd.discount_code.as_deref(),
    )?;

    if cmd.amount != quote.amount {
        return Err(AppError::bad_request(format!(
            "Paid amount {} does not match quoted amount {}",
            cmd.amount, quote.amount
        )));
    }

    // Cash goes into a drawer: the acting operator must have an open shift.
    let operator_id = cmd.operator_id.unwrap_or(session.entry_operator_id);
    let shift = Database::open_shift_for_operator(&mut *tx, tenant_id, operator_id).await?;
    if cmd.method == PaymentMethod::Cash && shift.is_none() {
        return Err(AppError::conflict(
            codes::NO_SHIFT_OPEN,
            format!("Operator {} has no open shift to collect cash", operator_id),
        ));
    }

    let payment = Database::insert_payment(
        &mut *tx,
        &CreatePayment {
            tenant_id,
            session_id: Some(session_id),
            debt_id: None,
            shift_id: shift.as_ref().map(|s| s.shift_id),
            amount: cmd.amount,
            method: cmd.method,
            status: PaymentStatus::Confirmed,
            provider_txn_id: None,
            provider_ref: None,
        },
    )
    .await?;

    if let Some(shift) = &shift {
        Database::insert_shift_operation(
            &mut *tx,
            tenant_id,
            shift.shift_id,
            OperationKind::Payment,
            payment.amount,
            Some(payment.payment_id),
        )
        .await?;
    }

    let session = Database::finish_session(
        &mut *tx,
        session_id,
        SessionStatus::Completed,
        ended_at,
        Some(quote.amount),
    )
    .await?;

    tx.commit()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to commit checkout: {}", e)))?;

    info!(
        session_id = %session_id,
        payment_id = %payment.payment_id,
        amount = %payment.amount,
        method = %payment.method,
        "Session checked out"
    );

    Ok(CheckoutOutcome {
        session,
        payment,
        quote,
    })
}

/// The vehicle left without paying: quote, PENDING debt and COMPLETED
/// session in one transaction. No payment is recorded.
#[instrument(skip(db), fields(tenant_id = %tenant_id, session_id = %session_id))]
pub async fn force_checkout(
    db: &Database,
    tenant_id: Uuid,
    session_id: Uuid,
    ended_at: Option<DateTime<Utc>>,
) -> Result<ForceCheckoutOutcome, AppError> {
    let mut tx = db
        .pool()
        .begin()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e)))?;

    let session = Database::session_for_update(&mut *tx, tenant_id, session_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Session {} not found", session_id)))?;

    if !session.is_active() {
        return Err(AppError::conflict(
            codes::SESSION_NOT_ACTIVE,
            format!("Session {} is not active", session_id),
        ));
    }

    let ended_at = ended_at.unwrap_or_else(Utc::now);
    let rules = db
        .active_rules_for_sector(tenant_id, session.sector_id, ended_at)
        .await?;
    let discounts = db.applicable_discounts(tenant_id, ended_at).await?;
    let quote = pricing::build_quote(
        session_id,
        session.started_at,
        ended_at,
        &rules,
        &discounts,
        None,
    )?;

    let debt = Database::insert_debt(
        &mut *tx,
        &CreateDebt {
            tenant_id,
            plate: session.plate.clone(),
            principal_amount: quote.amount,
            origin: DebtOrigin::Session,
            session_id: Some(session_id),
            notes: None,
        },
    )
    .await?;

    let session = Database::finish_session(
        &mut *tx,
        session_id,
        SessionStatus::Completed,
        ended_at,
        Some(quote.amount),
    )
    .await?;

    tx.commit().await.map_err(|e| {
        AppError::Persistence(anyhow::anyhow!("Failed to commit force checkout: {}", e))
    })?;

    info!(
        session_id = %session_id,
        debt_id = %debt.debt_id,
        amount = %debt.principal_amount,
        "Session completed without payment, debt recorded"
    );

    Ok(ForceCheckoutOutcome {
        session,
        debt,
        quote,
    })
}

/// Cancel an ACTIVE session: no charge, no debt.
#[instrument(skip(db), fields(tenant_id = %tenant_id, session_id = %session_id))]
pub async fn cancel_session(
    db: &Database,
    tenant_id: Uuid,
    session_id: Uuid,
) -> Result<ParkingSession, AppError> {
    let mut tx = db
        .pool()
        .begin()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e)))?;

    let session = Database::session_for_update(&mut *tx, tenant_id, session_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Session {} not found", session_id)))?;

    if !session.is_active() {
        return Err(AppError::conflict(
            codes::SESSION_NOT_ACTIVE,
            format!("Session {} is not active", session_id),
        ));
    }

    let session =
        Database::finish_session(&mut *tx, session_id, SessionStatus::Canceled, Utc::now(), None)
            .await?;

    tx.commit()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to commit cancel: {}", e)))?;

    info!(session_id = %session_id, "Session canceled");

    Ok(session)
}

/// Settle a PENDING debt: payment plus SETTLED transition, at most once.
#[instrument(skip(db, cmd), fields(tenant_id = %tenant_id, debt_id = %debt_id))]
pub async fn settle_debt(
    db: &Database,
    tenant_id: Uuid,
    debt_id: Uuid,
    cmd: SettleDebtCommand,
) -> Result<(Debt, Payment), AppError> {
    if cmd.amount <= Decimal::ZERO {
        return Err(AppError::bad_request("Settlement amount must be positive"));
    }

    let mut tx = db
        .pool()
        .begin()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e)))?;

    let debt = Database::debt_for_update(&mut *tx, tenant_id, debt_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Debt {} not found", debt_id)))?;

    if debt.status() != DebtStatus::Pending {
        return Err(AppError::conflict(
            codes::DEBT_NOT_PENDING,
            format!("Debt {} is not pending", debt_id),
        ));
    }

    let shift = match cmd.cashier_operator_id {
        Some(operator_id) => {
            Database::open_shift_for_operator(&mut *tx, tenant_id, operator_id).await?
        }
        None => None,
    };
    if cmd.method == PaymentMethod::Cash && shift.is_none() {
        return Err(AppError::conflict(
            codes::NO_SHIFT_OPEN,
            "No open shift to collect the cash settlement",
        ));
    }

    let payment = Database::insert_payment(
        &mut *tx,
        &CreatePayment {
            tenant_id,
            session_id: None,
            debt_id: Some(debt_id),
            shift_id: shift.as_ref().map(|s| s.shift_id),
            amount: cmd.amount,
            method: cmd.method,
            status: PaymentStatus::Confirmed,
            provider_txn_id: None,
            provider_ref: None,
        },
    )
    .await?;

    if let Some(shift) = &shift {
        Database::insert_shift_operation(
            &mut *tx,
            tenant_id,
            shift.shift_id,
            OperationKind::Payment,
            payment.amount,
            Some(payment.payment_id),
        )
        .await?;
    }

    let debt = Database::finish_debt(
        &mut *tx,
        debt_id,
        DebtStatus::Settled,
        Some(cmd.amount),
        cmd.cashier_operator_id,
    )
    .await?;

    tx.commit().await.map_err(|e| {
        AppError::Persistence(anyhow::anyhow!("Failed to commit debt settlement: {}", e))
    })?;

    info!(
        debt_id = %debt_id,
        payment_id = %payment.payment_id,
        amount = %payment.amount,
        "Debt settled"
    );

    Ok((debt, payment))
}

/// Cancel a PENDING debt without payment.
#[instrument(skip(db), fields(tenant_id = %tenant_id, debt_id = %debt_id))]
pub async fn cancel_debt(db: &Database, tenant_id: Uuid, debt_id: Uuid) -> Result<Debt, AppError> {
    let mut tx = db
        .pool()
        .begin()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e)))?;

    let debt = Database::debt_for_update(&mut *tx, tenant_id, debt_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Debt {} not found", debt_id)))?;

    if debt.status() != DebtStatus::Pending {
        return Err(AppError::conflict(
            codes::DEBT_NOT_PENDING,
            format!("Debt {} is not pending", debt_id),
        ));
    }

    let debt = Database::finish_debt(&mut *tx, debt_id, DebtStatus::Cancelled, None, None).await?;

    tx.commit().await.map_err(|e| {
        AppError::Persistence(anyhow::anyhow!("Failed to commit debt cancellation: {}", e))
    })?;

    Ok(debt)
}

/// Append a manual withdrawal or deposit to an OPEN shift.
#[instrument(skip(db), fields(tenant_id = %tenant_id, shift_id = %shift_id))]
pub async fn record_adjustment(
    db: &Database,
    tenant_id: Uuid,
    shift_id: Uuid,
    kind: OperationKind,
    amount: Decimal,
    reason: Option<&str>,
    created_by: Option<Uuid>,
) -> Result<CashAdjustment, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::bad_request("Adjustment amount must be positive"));
    }

    let mut tx = db
        .pool()
        .begin()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e)))?;

    let shift = Database::shift_for_update(&mut *tx, tenant_id, shift_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Shift {} not found", shift_id)))?;

    if !shift.is_open() {
        return Err(AppError::conflict(
            codes::SHIFT_NOT_OPEN,
            format!("Shift {} is not open", shift_id),
        ));
    }

    let adjustment =
        Database::insert_cash_adjustment(&mut *tx, tenant_id, shift_id, kind, amount, reason, created_by)
            .await?;
    Database::insert_shift_operation(
        &mut *tx,
        tenant_id,
        shift_id,
        kind,
        amount,
        Some(adjustment.adjustment_id),
    )
    .await?;

    tx.commit().await.map_err(|e| {
        AppError::Persistence(anyhow::anyhow!("Failed to commit adjustment: {}", e))
    })?;

    info!(shift_id = %shift_id, kind = %adjustment.kind, amount = %amount, "Cash adjustment recorded");

    Ok(adjustment)
}

/// Close an OPEN shift: derive totals, record over/short, transition to
/// CLOSED. Terminal; no further adjustments are accepted.
#[instrument(skip(db), fields(tenant_id = %tenant_id, shift_id = %shift_id))]
pub async fn close_shift(
    db: &Database,
    tenant_id: Uuid,
    shift_id: Uuid,
    declared_cash: Decimal,
    closed_by: Option<Uuid>,
    notes: Option<&str>,
) -> Result<(Shift, ShiftTotals), AppError> {
    let mut tx = db
        .pool()
        .begin()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e)))?;

    let shift = Database::shift_for_update(&mut *tx, tenant_id, shift_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Shift {} not found", shift_id)))?;

    if !shift.is_open() {
        return Err(AppError::conflict(
            codes::SHIFT_NOT_OPEN,
            format!("Shift {} is not open", shift_id),
        ));
    }

    let payments = Database::payments_for_shift_tx(&mut *tx, tenant_id, shift_id).await?;
    let adjustments = Database::adjustments_for_shift_tx(&mut *tx, tenant_id, shift_id).await?;
    let totals = ShiftTotals::calculate(shift.opening_float, &payments, &adjustments);
    let over_short = totals.over_short(declared_cash);

    let shift = Database::finish_shift(
        &mut *tx,
        shift_id,
        ShiftStatus::Closed,
        Some(declared_cash),
        Some(totals.expected_cash),
        Some(over_short),
        closed_by,
        notes,
    )
    .await?;

    tx.commit()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to commit shift close: {}", e)))?;

    info!(
        shift_id = %shift_id,
        expected_cash = %totals.expected_cash,
        over_short = %over_short,
        "Shift closed"
    );

    Ok((shift, totals))
}

/// Cancel an OPEN shift that has no monetary operations.
#[instrument(skip(db), fields(tenant_id = %tenant_id, shift_id = %shift_id))]
pub async fn cancel_shift(
    db: &Database,
    tenant_id: Uuid,
    shift_id: Uuid,
    closed_by: Option<Uuid>,
) -> Result<Shift, AppError> {
    let mut tx = db
        .pool()
        .begin()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e)))?;

    let shift = Database::shift_for_update(&mut *tx, tenant_id, shift_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Shift {} not found", shift_id)))?;

    if !shift.is_open() {
        return Err(AppError::conflict(
            codes::SHIFT_NOT_OPEN,
            format!("Shift {} is not open", shift_id),
        ));
    }

    let operations = Database::count_shift_operations(&mut *tx, tenant_id, shift_id).await?;
    if operations > 0 {
        return Err(AppError::conflict(
            codes::SHIFT_HAS_OPERATIONS,
            format!(
                "Shift {} has {} monetary operations and cannot be canceled",
                shift_id, operations
            ),
        ));
    }

    let shift = Database::finish_shift(
        &mut *tx,
        shift_id,
        ShiftStatus::Canceled,
        None,
        None,
        None,
        closed_by,
        None,
    )
    .await?;

    tx.commit().await.map_err(|e| {
        AppError::Persistence(anyhow::anyhow!("Failed to commit shift cancel: {}", e))
    })?;

    Ok(shift)
}

/// Derive a shift's drawer totals without mutating state.
#[instrument(skip(db, shift), fields(tenant_id = %tenant_id, shift_id = %shift.shift_id))]
pub async fn shift_totals(
    db: &Database,
    tenant_id: Uuid,
    shift: &Shift,
) -> Result<ShiftTotals, AppError> {
    let payments = db.payments_for_shift(tenant_id, shift.shift_id).await?;
    let adjustments = db.adjustments_for_shift(tenant_id, shift.shift_id).await?;
    Ok(ShiftTotals::calculate(
        shift.opening_float,
        &payments,
        &adjustments,
    ))
}

/// Apply a provider payment callback. Idempotent by provider transaction id:
/// a replay neither creates a second payment nor re-transitions a COMPLETED
/// session. A declined callback records a FAILED payment and leaves the
/// session untouched.
#[instrument(skip(db, cmd), fields(session_id = %cmd.session_id, transaction_id = %cmd.transaction_id))]
pub async fn apply_webhook(db: &Database, cmd: WebhookCommand) -> Result<WebhookOutcome, AppError> {
    let session = db
        .get_session_untenanted(cmd.session_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("Session {} not found", cmd.session_id))
        })?;
    let tenant_id = session.tenant_id;

    let mut tx = db
        .pool()
        .begin()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e)))?;

    // Locking the session first serializes concurrent deliveries of the
    // same confirmation.
    let session = Database::session_for_update(&mut *tx, tenant_id, cmd.session_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Session {} not found", cmd.session_id)))?;

    if let Some(existing) =
        Database::payment_by_provider_txn(&mut *tx, tenant_id, &cmd.transaction_id).await?
    {
        tx.commit().await.ok();
        info!(payment_id = %existing.payment_id, "Webhook replay ignored");
        return Ok(WebhookOutcome::Replay(existing));
    }

    let status = if cmd.approved {
        PaymentStatus::Confirmed
    } else {
        PaymentStatus::Failed
    };

    let payment = Database::insert_payment(
        &mut *tx,
        &CreatePayment {
            tenant_id,
            session_id: Some(cmd.session_id),
            debt_id: None,
            shift_id: None,
            amount: cmd.amount,
            method: PaymentMethod::Webpay,
            status,
            provider_txn_id: Some(cmd.transaction_id.clone()),
            provider_ref: cmd.provider_ref.clone(),
        },
    )
    .await?;

    if cmd.approved && session.is_active() {
        Database::finish_session(
            &mut *tx,
            cmd.session_id,
            SessionStatus::Completed,
            Utc::now(),
            Some(cmd.amount),
        )
        .await?;
    }

    tx.commit()
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to commit webhook: {}", e)))?;

    info!(
        payment_id = %payment.payment_id,
        approved = cmd.approved,
        "Provider callback applied"
    );

    Ok(WebhookOutcome::Recorded(payment))
}
