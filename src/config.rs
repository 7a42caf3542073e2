//! Runtime configuration from environment variables

use std::env;

/// Server configuration, loaded once at startup. Every value has a
/// development default; secrets should be overridden in production.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP API.
    pub bind_addr: String,
    /// Sled database directory.
    pub data_dir: String,
    /// HS256 signing secret for access and refresh tokens.
    pub jwt_secret: String,
    /// Payment provider API key.
    pub stripe_secret_key: String,
    /// Payment provider API base; tests and local stubs point this elsewhere.
    pub stripe_api_base: String,
    /// Public origin used to build the checkout success/cancel redirects.
    pub public_base_url: String,
    /// Directory for the rolling log files.
    pub log_dir: String,
    /// When both are set, a superuser account is seeded at startup.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            bind_addr: env::var("COURSEHUB_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            data_dir: env::var("COURSEHUB_DATA_DIR")
                .unwrap_or_else(|_| "coursehub_data".to_string()),
            jwt_secret: env::var("COURSEHUB_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".to_string()),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .unwrap_or_else(|_| "sk_test_placeholder".to_string()),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            public_base_url: env::var("COURSEHUB_PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            log_dir: env::var("COURSEHUB_LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            admin_email: env::var("COURSEHUB_ADMIN_EMAIL").ok(),
            admin_password: env::var("COURSEHUB_ADMIN_PASSWORD").ok(),
        }
    }
}
