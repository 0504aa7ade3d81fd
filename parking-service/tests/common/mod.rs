//! Test helper module for parking-service integration tests.
//!
//! Provides common setup utilities for PostgreSQL-based tests. Tests are
//! skipped when `TEST_DATABASE_URL` is not set.

#![allow(dead_code)]

use parking_service::config::{DatabaseConfig, ParkingConfig, WebhookConfig};
use parking_service::services::{init_metrics, Database};
use parking_service::startup::Application;
use rust_decimal::Decimal;
use secrecy::Secret;
use service_core::config::Config as CoreConfig;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

// Test constants for tenant context
pub const TEST_TENANT_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const TEST_OPERATOR_ID: &str = "22222222-2222-2222-2222-222222222222";

// Counter for unique schema names
static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a unique schema name for test isolation.
fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_parking_{}_{}", std::process::id(), counter)
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Parse a money field from a JSON response body.
pub fn dec_field(value: &serde_json::Value, key: &str) -> Decimal {
    let raw = value
        .get(key)
        .unwrap_or_else(|| panic!("missing field {}: {}", key, value));
    match raw {
        serde_json::Value::String(s) => dec(s),
        other => dec(&other.to_string()),
    }
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub db: Database,
    pub client: reqwest::Client,
    schema_name: String,
}

impl TestApp {
    /// Spawn a new test application on a random port, or `None` when no test
    /// database is configured.
    pub async fn try_spawn() -> Option<Self> {
        let Ok(base_url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping integration test");
            return None;
        };

        init_metrics();

        let schema_name = unique_schema_name();

        // Create schema for test isolation
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&base_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
            .execute(&pool)
            .await
            .ok();
        sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
            .execute(&pool)
            .await
            .expect("Failed to create test schema");

        pool.close().await;

        // Use ? or & depending on whether URL already has query parameters
        let separator = if base_url.contains('?') { "&" } else { "?" };
        let db_url_with_schema = format!(
            "{}{}options=-c search_path%3D{}",
            base_url, separator, schema_name
        );

        let config = ParkingConfig {
            common: CoreConfig { port: 0 }, // Random port
            service_name: "parking-service-test".to_string(),
            log_level: "warn".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: Secret::new(db_url_with_schema.clone()),
                max_connections: 5,
                min_connections: 1,
            },
            webhook: WebhookConfig { secret: None },
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let db = Database::new(&db_url_with_schema, 5, 1)
            .await
            .expect("Failed to create test database");

        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        Some(TestApp {
            address,
            port,
            db,
            client,
            schema_name,
        })
    }

    /// Get test tenant ID.
    pub fn tenant_id(&self) -> Uuid {
        Uuid::parse_str(TEST_TENANT_ID).unwrap()
    }

    /// Get test operator ID.
    pub fn operator_id(&self) -> Uuid {
        Uuid::parse_str(TEST_OPERATOR_ID).unwrap()
    }

    /// POST a JSON body with the tenant context headers.
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("X-Tenant-ID", TEST_TENANT_ID)
            .header("X-Operator-ID", TEST_OPERATOR_ID)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// GET with the tenant context headers.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .header("X-Tenant-ID", TEST_TENANT_ID)
            .header("X-Operator-ID", TEST_OPERATOR_ID)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Seed an active profile for a sector and return its id.
    pub async fn seed_profile(&self, sector_id: Uuid) -> Uuid {
        let profile_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO pricing_profiles (profile_id, tenant_id, sector_id, name) VALUES ($1, $2, $3, $4)",
        )
        .bind(profile_id)
        .bind(self.tenant_id())
        .bind(sector_id)
        .bind("Test tariff")
        .execute(self.db.pool())
        .await
        .expect("Failed to seed profile");
        profile_id
    }

    /// Seed the standard test tariff: TIME_BASED, 100/min, minimum 500,
    /// daily cap 5000. Returns the sector id.
    pub async fn seed_standard_tariff(&self) -> Uuid {
        let sector_id = Uuid::new_v4();
        let profile_id = self.seed_profile(sector_id).await;
        sqlx::query(
            r#"
            INSERT INTO pricing_rules (rule_id, profile_id, rule_type, price_per_min, min_amount, daily_max_amount, priority)
            VALUES ($1, $2, 'time_based', $3, $4, $5, 10)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(profile_id)
        .bind(dec("100"))
        .bind(dec("500"))
        .bind(dec("5000"))
        .execute(self.db.pool())
        .await
        .expect("Failed to seed rule");
        sector_id
    }

    /// Create a session for a plate in the given sector, returning the
    /// session id and its `started_at`.
    pub async fn create_session(
        &self,
        plate: &str,
        sector_id: Uuid,
    ) -> (Uuid, chrono::DateTime<chrono::Utc>) {
        let response = self
            .post(
                "/sessions",
                &serde_json::json!({ "plate": plate, "sector_id": sector_id }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "session create failed");
        let body: serde_json::Value = response.json().await.unwrap();
        let session_id = Uuid::parse_str(body["session_id"].as_str().unwrap()).unwrap();
        let started_at = chrono::DateTime::parse_from_rfc3339(body["started_at"].as_str().unwrap())
            .unwrap()
            .with_timezone(&chrono::Utc);
        (session_id, started_at)
    }

    /// Cleanup test resources (schema).
    pub async fn cleanup(&self) {
        let Ok(base_url) = std::env::var("TEST_DATABASE_URL") else {
            return;
        };
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&base_url)
            .await
            .ok();

        if let Some(pool) = pool {
            let _ = sqlx::query(&format!(
                "DROP SCHEMA IF EXISTS {} CASCADE",
                self.schema_name
            ))
            .execute(&pool)
            .await;
            pool.close().await;
        }
    }
}

/// Format an instant the way query strings and JSON bodies expect it.
pub fn iso(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
