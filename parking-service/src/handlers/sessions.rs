//! Session handlers: entry, quote, checkout and cancellation.
//!
//! All operations are scoped to the tenant from the request context.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::prelude::ToPrimitive;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        CheckoutRequest, CheckoutResponse, CreateSessionRequest, ForceCheckoutRequest,
        ForceCheckoutResponse, QuoteQuery, SessionDetailResponse, SessionResponse,
    },
    middleware::TenantContext,
    models::CreateSession,
    services::settlement::{self, CheckoutCommand},
    services::{record_payment_amount, record_session_operation},
    startup::AppState,
};

/// Create a new ACTIVE session for a plate entering a sector.
pub async fn create_session(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    payload.validate()?;

    let entry_operator_id = payload
        .operator_id
        .or(tenant.operator_id)
        .ok_or_else(|| AppError::bad_request("operator_id is required"))?;

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        plate = %payload.plate,
        sector_id = %payload.sector_id,
        "Creating parking session"
    );

    let session = state
        .db
        .create_session(&CreateSession {
            tenant_id: tenant.tenant_id,
            plate: payload.plate,
            sector_id: payload.sector_id,
            street_id: payload.street_id,
            entry_operator_id,
        })
        .await?;

    record_session_operation(&tenant.tenant_id.to_string(), "create");

    Ok((StatusCode::CREATED, Json(session.into())))
}

/// Get a session with its payments.
pub async fn get_session(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionDetailResponse>, AppError> {
    let session = state
        .db
        .get_session(tenant.tenant_id, session_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Session {} not found", session_id)))?;

    let payments = state
        .db
        .payments_for_session(tenant.tenant_id, session_id)
        .await?;

    Ok(Json(SessionDetailResponse {
        session: session.into(),
        payments: payments.into_iter().map(Into::into).collect(),
    }))
}

/// Read-only quote for an active session. Never mutates state.
pub async fn quote_session(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(session_id): Path<Uuid>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<crate::services::pricing::Quote>, AppError> {
    let quote = settlement::quote_session(
        &state.db,
        tenant.tenant_id,
        session_id,
        query.ended_at,
        query.discount_code.as_deref(),
    )
    .await?;

    Ok(Json(quote))
}

/// Paid checkout: records a payment and completes the session atomically.
pub async fn checkout(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    tracing::info!(
        tenant_id = %tenant.tenant_id,
        session_id = %session_id,
        method = ?payload.payment_method,
        amount = %payload.amount,
        "Checkout requested"
    );

    let outcome = settlement::checkout(
        &state.db,
        tenant.tenant_id,
        session_id,
        CheckoutCommand {
            method: payload.payment_method,
            amount: payload.amount,
            ended_at: payload.ended_at,
            discount_code: payload.discount_code,
            operator_id: tenant.operator_id,
        },
    )
    .await?;

    record_session_operation(&tenant.tenant_id.to_string(), "checkout");
    record_payment_amount(
        &tenant.tenant_id.to_string(),
        &outcome.payment.method,
        outcome.payment.amount.to_f64().unwrap_or(0.0),
    );

    Ok(Json(CheckoutResponse {
        session: outcome.session.into(),
        payment: outcome.payment.into(),
        quote: outcome.quote,
    }))
}

/// The vehicle left without paying: completes the session and records a
/// PENDING debt instead of a payment.
pub async fn force_checkout(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(session_id): Path<Uuid>,
    payload: Option<Json<ForceCheckoutRequest>>,
) -> Result<Json<ForceCheckoutResponse>, AppError> {
    let ended_at = payload.and_then(|Json(p)| p.ended_at);

    let outcome =
        settlement::force_checkout(&state.db, tenant.tenant_id, session_id, ended_at).await?;

    record_session_operation(&tenant.tenant_id.to_string(), "force_checkout");

    Ok(Json(ForceCheckoutResponse {
        session: outcome.session.into(),
        debt: outcome.debt.into(),
        quote: outcome.quote,
    }))
}

/// Cancel an active session: no charge, no debt.
pub async fn cancel_session(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = settlement::cancel_session(&state.db, tenant.tenant_id, session_id).await?;

    record_session_operation(&tenant.tenant_id.to_string(), "cancel");

    Ok(Json(session.into()))
}
