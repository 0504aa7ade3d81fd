use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use service_core::config::Config as CoreConfig;
use std::env;

#[derive(Debug, Clone)]
pub struct ParkingConfig {
    pub common: CoreConfig,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared secret for provider callback signatures. Verification is
    /// skipped when unset (local development).
    pub secret: Option<Secret<String>>,
}

impl ParkingConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let port = env::var("PARKING_SERVICE_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let db_url = env::var("PARKING_DATABASE_URL").expect("PARKING_DATABASE_URL must be set");
        let max_connections = env::var("PARKING_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("PARKING_DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let log_level = env::var("PARKING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let otlp_endpoint = env::var("PARKING_OTLP_ENDPOINT").ok();
        let webhook_secret = env::var("PARKING_WEBHOOK_SECRET").ok().map(Secret::new);

        Ok(Self {
            common: CoreConfig { port },
            service_name: "parking-service".to_string(),
            log_level,
            otlp_endpoint,
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            webhook: WebhookConfig {
                secret: webhook_secret,
            },
        })
    }
}
