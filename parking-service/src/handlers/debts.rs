//! Debt ledger handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        CreateDebtRequest, DebtResponse, ListDebtsQuery, SettleDebtRequest, SettleDebtResponse,
    },
    middleware::TenantContext,
    models::{CreateDebt, DebtOrigin, DebtStatus, ListDebtsFilter},
    services::settlement::{self, SettleDebtCommand},
    services::record_debt_operation,
    startup::AppState,
};

/// Administrative debt entry (MANUAL or FINE origin), outside the session
/// flow.
pub async fn create_debt(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateDebtRequest>,
) -> Result<(StatusCode, Json<DebtResponse>), AppError> {
    payload.validate()?;

    let origin = match payload.origin.as_str() {
        "manual" => DebtOrigin::Manual,
        "fine" => DebtOrigin::Fine,
        other => {
            return Err(AppError::bad_request(format!(
                "origin must be manual or fine, got {}",
                other
            )))
        }
    };
    if payload.amount <= rust_decimal::Decimal::ZERO {
        return Err(AppError::bad_request("amount must be positive"));
    }

    let debt = state
        .db
        .create_debt(&CreateDebt {
            tenant_id: tenant.tenant_id,
            plate: payload.plate,
            principal_amount: payload.amount,
            origin,
            session_id: None,
            notes: payload.notes,
        })
        .await?;

    record_debt_operation(&tenant.tenant_id.to_string(), "create");

    Ok((StatusCode::CREATED, Json(debt.into())))
}

/// Get a debt by id.
pub async fn get_debt(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(debt_id): Path<Uuid>,
) -> Result<Json<DebtResponse>, AppError> {
    let debt = state
        .db
        .get_debt(tenant.tenant_id, debt_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Debt {} not found", debt_id)))?;

    Ok(Json(debt.into()))
}

/// List debts, optionally filtered by plate and status. Cashiers use this to
/// find what a returning plate owes.
pub async fn list_debts(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListDebtsQuery>,
) -> Result<Json<Vec<DebtResponse>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|s| match s {
            "pending" => Ok(DebtStatus::Pending),
            "settled" => Ok(DebtStatus::Settled),
            "cancelled" => Ok(DebtStatus::Cancelled),
            other => Err(AppError::bad_request(format!("Unknown status: {}", other))),
        })
        .transpose()?;

    let debts = state
        .db
        .list_debts(
            tenant.tenant_id,
            &ListDebtsFilter {
                plate: query.plate,
                status,
            },
        )
        .await?;

    Ok(Json(debts.into_iter().map(Into::into).collect()))
}

/// Settle a PENDING debt. At most one settlement ever succeeds.
pub async fn settle_debt(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(debt_id): Path<Uuid>,
    Json(payload): Json<SettleDebtRequest>,
) -> Result<Json<SettleDebtResponse>, AppError> {
    tracing::info!(
        tenant_id = %tenant.tenant_id,
        debt_id = %debt_id,
        amount = %payload.amount,
        "Debt settlement requested"
    );

    let (debt, payment) = settlement::settle_debt(
        &state.db,
        tenant.tenant_id,
        debt_id,
        SettleDebtCommand {
            amount: payload.amount,
            method: payload.method,
            cashier_operator_id: payload.cashier_operator_id.or(tenant.operator_id),
        },
    )
    .await?;

    record_debt_operation(&tenant.tenant_id.to_string(), "settle");

    Ok(Json(SettleDebtResponse {
        debt: debt.into(),
        payment: payment.into(),
    }))
}

/// Cancel a PENDING debt without payment.
pub async fn cancel_debt(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(debt_id): Path<Uuid>,
) -> Result<Json<DebtResponse>, AppError> {
    let debt = settlement::cancel_debt(&state.db, tenant.tenant_id, debt_id).await?;

    record_debt_operation(&tenant.tenant_id.to_string(), "cancel");

    Ok(Json(debt.into()))
}
