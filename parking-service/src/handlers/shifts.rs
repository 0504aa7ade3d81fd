//! Shift and cash drawer handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{
        AdjustmentRequest, AdjustmentResponse, CloseShiftRequest, CurrentShiftQuery,
        OpenShiftRequest, ShiftResponse,
    },
    middleware::TenantContext,
    models::OpenShift,
    services::settlement,
    services::record_shift_operation,
    startup::AppState,
};

/// Open a shift with an opening float. Fails with a conflict when the
/// operator already has an open shift on the device.
pub async fn open_shift(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<OpenShiftRequest>,
) -> Result<(StatusCode, Json<ShiftResponse>), AppError> {
    let operator_id = payload
        .operator_id
        .or(tenant.operator_id)
        .ok_or_else(|| AppError::bad_request("operator_id is required"))?;
    if payload.opening_float < Decimal::ZERO {
        return Err(AppError::bad_request("opening_float cannot be negative"));
    }

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        operator_id = %operator_id,
        opening_float = %payload.opening_float,
        "Opening shift"
    );

    let shift = state
        .db
        .open_shift(&OpenShift {
            tenant_id: tenant.tenant_id,
            operator_id,
            sector_id: payload.sector_id,
            device_id: payload.device_id,
            opening_float: payload.opening_float,
        })
        .await?;

    record_shift_operation(&tenant.tenant_id.to_string(), "open");

    let totals = settlement::shift_totals(&state.db, tenant.tenant_id, &shift).await?;
    Ok((
        StatusCode::CREATED,
        Json(ShiftResponse::from_shift(shift, totals)),
    ))
}

/// The operator's current OPEN shift with derived totals.
pub async fn current_shift(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<CurrentShiftQuery>,
) -> Result<Json<ShiftResponse>, AppError> {
    let operator_id = query
        .operator_id
        .or(tenant.operator_id)
        .ok_or_else(|| AppError::bad_request("operator_id is required"))?;

    let shift = state
        .db
        .current_shift(tenant.tenant_id, operator_id, query.device_id.as_deref())
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("Operator {} has no open shift", operator_id))
        })?;

    let totals = settlement::shift_totals(&state.db, tenant.tenant_id, &shift).await?;
    Ok(Json(ShiftResponse::from_shift(shift, totals)))
}

/// Get a shift by id with derived totals.
pub async fn get_shift(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(shift_id): Path<Uuid>,
) -> Result<Json<ShiftResponse>, AppError> {
    let shift = state
        .db
        .get_shift(tenant.tenant_id, shift_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Shift {} not found", shift_id)))?;

    let totals = settlement::shift_totals(&state.db, tenant.tenant_id, &shift).await?;
    Ok(Json(ShiftResponse::from_shift(shift, totals)))
}

/// Append a manual withdrawal or deposit to an OPEN shift.
pub async fn record_adjustment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(shift_id): Path<Uuid>,
    Json(payload): Json<AdjustmentRequest>,
) -> Result<(StatusCode, Json<AdjustmentResponse>), AppError> {
    let adjustment = settlement::record_adjustment(
        &state.db,
        tenant.tenant_id,
        shift_id,
        payload.kind.as_operation(),
        payload.amount,
        payload.reason.as_deref(),
        tenant.operator_id,
    )
    .await?;

    record_shift_operation(&tenant.tenant_id.to_string(), "adjustment");

    Ok((StatusCode::CREATED, Json(adjustment.into())))
}

/// Close an OPEN shift against the declared cash count.
pub async fn close_shift(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(shift_id): Path<Uuid>,
    Json(payload): Json<CloseShiftRequest>,
) -> Result<Json<ShiftResponse>, AppError> {
    tracing::info!(
        tenant_id = %tenant.tenant_id,
        shift_id = %shift_id,
        declared_cash = %payload.closing_declared_cash,
        "Closing shift"
    );

    let (shift, totals) = settlement::close_shift(
        &state.db,
        tenant.tenant_id,
        shift_id,
        payload.closing_declared_cash,
        tenant.operator_id,
        payload.notes.as_deref(),
    )
    .await?;

    record_shift_operation(&tenant.tenant_id.to_string(), "close");

    Ok(Json(ShiftResponse::from_shift(shift, totals)))
}

/// Cancel an OPEN shift with no monetary operations.
pub async fn cancel_shift(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(shift_id): Path<Uuid>,
) -> Result<Json<ShiftResponse>, AppError> {
    let shift =
        settlement::cancel_shift(&state.db, tenant.tenant_id, shift_id, tenant.operator_id).await?;

    record_shift_operation(&tenant.tenant_id.to_string(), "cancel");

    let totals = settlement::shift_totals(&state.db, tenant.tenant_id, &shift).await?;
    Ok(Json(ShiftResponse::from_shift(shift, totals)))
}
