//! CourseHub API server
//!
//! Starts the REST server exposing the learning-platform API.
//! - Storage: Sled KV, one tree per entity plus an email index
//! - Auth: bcrypt password hashes, JWT access/refresh pairs (HS256)
//! - Payments: Stripe-style provider over reqwest
//!
//! Usage:
//!   cargo run --bin coursehub        # start server
//!   cargo run --bin coursehub-cli    # talk to it from the terminal

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use coursehub::auth::hash_password;
use coursehub::config::Config;
use coursehub::models::User;
use coursehub::rest::create_router;
use coursehub::storage::Storage;
use coursehub::stripe::{PaymentGateway, StripeClient};

/// Seeds the superuser account from COURSEHUB_ADMIN_EMAIL / _PASSWORD when
/// both are set and no account holds that email yet.
fn seed_admin(storage: &Storage, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };
    if storage.get_user_by_email(email)?.is_some() {
        return Ok(());
    }
    let admin = storage.create_user(User {
        id: 0,
        email: email.clone(),
        username: "admin".to_string(),
        password_hash: hash_password(password)?,
        phone: None,
        city: None,
        avatar: None,
        is_confirmed: true,
        is_blocked: false,
        is_superuser: true,
        groups: vec![],
        stripe_customer_id: None,
        date_joined: chrono::Utc::now(),
    })?;
    info!(user_id = admin.id, %email, "superuser seeded");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    // Log to stdout and a daily-rolled file; RUST_LOG overrides the default.
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "coursehub.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .init();

    println!("🚀 CourseHub API starting...");
    println!("📦 Storage: Sled at {}", config.data_dir);
    println!("💳 Payment provider: {}", config.stripe_api_base);
    println!("🌐 REST (Axum) on {}", config.bind_addr);

    let storage = Storage::open(&config.data_dir)?;
    seed_admin(&storage, &config)?;

    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeClient::new(
        config.stripe_api_base.clone(),
        config.stripe_secret_key.clone(),
    ));

    let app = create_router(storage, gateway, config.clone());
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
