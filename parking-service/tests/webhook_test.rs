//! Payment webhook integration tests: idempotency and failure handling.

mod common;

use common::{dec, dec_field, TestApp};
use serde_json::json;

#[tokio::test]
async fn approved_callback_completes_session_and_replays_are_ignored() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let sector_id = app.seed_standard_tariff().await;
    let (session_id, _) = app.create_session("HOOK01", sector_id).await;

    let payload = json!({
        "transaction_id": "txn-0001",
        "session_id": session_id,
        "amount": "500",
        "status": "approved",
        "provider_ref": "wp-77"
    });

    let response = app.post("/webhooks/payments", &payload).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["replay"], false);
    assert_eq!(body["status"], "confirmed");

    let session: serde_json::Value = app
        .get(&format!("/sessions/{}", session_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(session["status"], "completed");
    assert_eq!(session["payments"].as_array().unwrap().len(), 1);

    // Replaying the same provider transaction creates no second payment and
    // does not re-transition the session.
    let response = app.post("/webhooks/payments", &payload).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["replay"], true);

    let session: serde_json::Value = app
        .get(&format!("/sessions/{}", session_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(session["payments"].as_array().unwrap().len(), 1);
    assert_eq!(dec_field(&session["payments"][0], "amount"), dec("500"));

    app.cleanup().await;
}

#[tokio::test]
async fn declined_callback_leaves_session_active() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let sector_id = app.seed_standard_tariff().await;
    let (session_id, _) = app.create_session("HOOK02", sector_id).await;

    let response = app
        .post(
            "/webhooks/payments",
            &json!({
                "transaction_id": "txn-0002",
                "session_id": session_id,
                "amount": "500",
                "status": "rejected"
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "failed");

    // The session stays active; the failed payment is recorded for audit.
    let session: serde_json::Value = app
        .get(&format!("/sessions/{}", session_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(session["status"], "active");
    assert_eq!(session["payments"][0]["status"], "failed");

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_session_in_callback_is_not_found() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .post(
            "/webhooks/payments",
            &json!({
                "transaction_id": "txn-0003",
                "session_id": uuid::Uuid::new_v4(),
                "amount": "500",
                "status": "approved"
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);

    app.cleanup().await;
}
