//! Session lifecycle integration tests: entry, quote, checkout, forced
//! checkout and cancellation.

mod common;

use chrono::Duration;
use common::{dec, dec_field, iso, TestApp};
use serde_json::json;

#[tokio::test]
async fn quote_applies_minimum_and_daily_cap() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let sector_id = app.seed_standard_tariff().await;
    let (session_id, started_at) = app.create_session("ABCD12", sector_id).await;

    // 3 minutes at 100/min floors to the 500 minimum.
    let response = app
        .get(&format!(
            "/sessions/{}/quote?ended_at={}",
            session_id,
            iso(started_at + Duration::minutes(3))
        ))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let quote: serde_json::Value = response.json().await.unwrap();
    assert_eq!(dec_field(&quote, "amount"), dec("500"));
    assert_eq!(quote["elapsed_minutes"], 3);

    // 60 minutes would be 6000; the daily cap clamps to 5000.
    let response = app
        .get(&format!(
            "/sessions/{}/quote?ended_at={}",
            session_id,
            iso(started_at + Duration::minutes(60))
        ))
        .await;
    let quote: serde_json::Value = response.json().await.unwrap();
    assert_eq!(dec_field(&quote, "amount"), dec("5000"));

    app.cleanup().await;
}

#[tokio::test]
async fn quote_is_repeatable_and_has_no_side_effects() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let sector_id = app.seed_standard_tariff().await;
    let (session_id, started_at) = app.create_session("REPEAT1", sector_id).await;
    let ended_at = iso(started_at + Duration::minutes(10));

    let path = format!("/sessions/{}/quote?ended_at={}", session_id, ended_at);
    let first: serde_json::Value = app.get(&path).await.json().await.unwrap();
    let second: serde_json::Value = app.get(&path).await.json().await.unwrap();
    assert_eq!(first, second);

    // The session is still active after any number of quotes.
    let session: serde_json::Value = app
        .get(&format!("/sessions/{}", session_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(session["status"], "active");

    app.cleanup().await;
}

#[tokio::test]
async fn checkout_records_payment_and_completes_session() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let sector_id = app.seed_standard_tariff().await;

    // Cash requires an open drawer.
    let response = app
        .post("/shifts/open", &json!({ "opening_float": "10000" }))
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let (session_id, started_at) = app.create_session("PAID01", sector_id).await;
    let response = app
        .post(
            &format!("/sessions/{}/checkout", session_id),
            &json!({
                "payment_method": "cash",
                "amount": "500",
                "ended_at": iso(started_at + Duration::minutes(3)),
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["session"]["status"], "completed");
    assert_eq!(dec_field(&body["payment"], "amount"), dec("500"));
    assert_eq!(body["payment"]["method"], "cash");

    // No debt was created for the plate.
    let debts: serde_json::Value = app
        .get("/debts?plate=PAID01")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(debts.as_array().unwrap().len(), 0);

    // A second checkout attempt conflicts.
    let response = app
        .post(
            &format!("/sessions/{}/checkout", session_id),
            &json!({ "payment_method": "cash", "amount": "500" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "SESSION_NOT_ACTIVE");

    app.cleanup().await;
}

#[tokio::test]
async fn checkout_rejects_amount_mismatch() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let sector_id = app.seed_standard_tariff().await;
    let (session_id, started_at) = app.create_session("WRONG1", sector_id).await;

    let response = app
        .post(
            &format!("/sessions/{}/checkout", session_id),
            &json!({
                "payment_method": "card",
                "amount": "400",
                "ended_at": iso(started_at + Duration::minutes(3)),
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    // The failed checkout left the session active.
    let session: serde_json::Value = app
        .get(&format!("/sessions/{}", session_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(session["status"], "active");

    app.cleanup().await;
}

#[tokio::test]
async fn cash_checkout_without_open_shift_conflicts() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let sector_id = app.seed_standard_tariff().await;
    let (session_id, started_at) = app.create_session("NOSHFT", sector_id).await;

    let response = app
        .post(
            &format!("/sessions/{}/checkout", session_id),
            &json!({
                "payment_method": "cash",
                "amount": "500",
                "ended_at": iso(started_at + Duration::minutes(3)),
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NO_SHIFT_OPEN");

    app.cleanup().await;
}

#[tokio::test]
async fn force_checkout_creates_pending_debt_instead_of_payment() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let sector_id = app.seed_standard_tariff().await;
    let (session_id, started_at) = app.create_session("DEBT01", sector_id).await;

    let response = app
        .post(
            &format!("/sessions/{}/force-checkout-without-payment", session_id),
            &json!({ "ended_at": iso(started_at + Duration::minutes(3)) }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["session"]["status"], "completed");
    assert_eq!(body["debt"]["status"], "pending");
    assert_eq!(body["debt"]["origin"], "session");
    assert_eq!(dec_field(&body["debt"], "principal_amount"), dec("500"));

    // No payment was recorded against the session.
    let session: serde_json::Value = app
        .get(&format!("/sessions/{}", session_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(session["payments"].as_array().unwrap().len(), 0);

    app.cleanup().await;
}

#[tokio::test]
async fn canceled_session_charges_nothing_and_stays_terminal() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let sector_id = app.seed_standard_tariff().await;
    let (session_id, _) = app.create_session("CANCL1", sector_id).await;

    let response = app
        .post(&format!("/sessions/{}/cancel", session_id), &json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "canceled");

    // No debt, no payment, and the terminal state is final.
    let debts: serde_json::Value = app.get("/debts?plate=CANCL1").await.json().await.unwrap();
    assert_eq!(debts.as_array().unwrap().len(), 0);

    let response = app
        .post(&format!("/sessions/{}/cancel", session_id), &json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn fixed_rule_quotes_flat_price() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let sector_id = uuid::Uuid::new_v4();
    let profile_id = app.seed_profile(sector_id).await;
    sqlx::query(
        r#"
        INSERT INTO pricing_rules (rule_id, profile_id, rule_type, fixed_price, max_duration_minutes, priority)
        VALUES ($1, $2, 'fixed', $3, 120, 10)
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind(profile_id)
    .bind(dec("1500"))
    .execute(app.db.pool())
    .await
    .unwrap();

    let (session_id, started_at) = app.create_session("FIXED1", sector_id).await;
    for minutes in [5, 120] {
        let quote: serde_json::Value = app
            .get(&format!(
                "/sessions/{}/quote?ended_at={}",
                session_id,
                iso(started_at + Duration::minutes(minutes))
            ))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(dec_field(&quote, "amount"), dec("1500"));
    }

    // Beyond the rule's duration window nothing applies.
    let response = app
        .get(&format!(
            "/sessions/{}/quote?ended_at={}",
            session_id,
            iso(started_at + Duration::minutes(180))
        ))
        .await;
    assert_eq!(response.status().as_u16(), 409);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NO_APPLICABLE_RULE");

    app.cleanup().await;
}
