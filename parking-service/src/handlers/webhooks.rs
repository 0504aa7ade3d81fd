//! Asynchronous payment-provider callback.
//!
//! Confirmations arrive out of band and may be delivered more than once;
//! idempotency is keyed on the provider transaction id. The signature is
//! `HMAC-SHA256(request_body, webhook_secret)`, hex encoded, in the
//! `X-Webhook-Signature` header.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use sha2::Sha256;

use crate::{
    dtos::{WebhookPayload, WebhookResponse},
    services::settlement::{self, WebhookCommand, WebhookOutcome},
    startup::AppState,
};

type HmacSha256 = Hmac<Sha256>;

fn compute_signature(payload: &[u8], secret: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid webhook key length")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Statuses the provider reports for a successful capture.
fn is_approved(status: &str) -> bool {
    matches!(status, "approved" | "success" | "paid")
}

/// Apply a provider payment confirmation.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    if let Some(secret) = &state.config.webhook.secret {
        let signature = headers
            .get("X-Webhook-Signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::ExternalService(anyhow::anyhow!("Missing X-Webhook-Signature header"))
            })?;

        let expected = compute_signature(&body, secret.expose_secret())?;
        if expected != signature {
            tracing::warn!("Webhook signature verification failed");
            return Err(AppError::ExternalService(anyhow::anyhow!(
                "Invalid webhook signature"
            )));
        }
    }

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        AppError::ExternalService(anyhow::anyhow!("Malformed webhook payload: {}", e))
    })?;

    tracing::info!(
        transaction_id = %payload.transaction_id,
        session_id = %payload.session_id,
        status = %payload.status,
        "Provider callback received"
    );

    let outcome = settlement::apply_webhook(
        &state.db,
        WebhookCommand {
            transaction_id: payload.transaction_id,
            session_id: payload.session_id,
            amount: payload.amount,
            approved: is_approved(&payload.status),
            provider_ref: payload.provider_ref,
        },
    )
    .await?;

    let response = match outcome {
        WebhookOutcome::Recorded(payment) => WebhookResponse {
            payment_id: payment.payment_id,
            status: payment.status,
            replay: false,
        },
        WebhookOutcome::Replay(payment) => WebhookResponse {
            payment_id: payment.payment_id,
            status: payment.status,
            replay: true,
        },
    };

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_hex_hmac() {
        let sig = compute_signature(b"{\"amount\":500}", "secret").unwrap();
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, compute_signature(b"{\"amount\":500}", "secret").unwrap());
        assert_ne!(sig, compute_signature(b"{\"amount\":501}", "secret").unwrap());
    }

    #[test]
    fn only_capture_statuses_approve() {
        assert!(is_approved("approved"));
        assert!(is_approved("paid"));
        assert!(!is_approved("rejected"));
        assert!(!is_approved(""));
    }
}
