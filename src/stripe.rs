//! Payment provider client (Stripe-flavored HTTP API)
//!
//! Covers the four provider resources the checkout flow touches:
//! - products and prices (created lazily per course, ids cached locally)
//! - checkout sessions (one per payment attempt, carries our metadata)
//! - customers (one per user, id cached on the user record)
//!
//! The provider speaks form-encoded requests and JSON responses. `reqwest`
//! calls are sequential and unretried; a failed step aborts the whole
//! checkout sequence and the caller surfaces the provider message.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

const CURRENCY: &str = "usd";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("payment provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("payment provider response missing {0}")]
    MissingField(&'static str),
}

impl GatewayError {
    /// Provider rejected our request (4xx) as opposed to failing on its own.
    pub fn is_client_error(&self) -> bool {
        matches!(self, GatewayError::Api { status, .. } if (400..500).contains(status))
    }
}

/// One in-progress payment attempt at the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page; the client is redirected here.
    pub url: Option<String>,
    pub payment_status: Option<String>,
    /// Free-form keys we attached at creation; carries user and course ids
    /// back to the confirmation endpoint.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Provider operations used by the checkout flow. Object-safe so handlers can
/// hold an `Arc<dyn PaymentGateway>` and tests can swap in a mock.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_product(&self, name: &str, description: &str)
        -> Result<String, GatewayError>;

    /// Amount is in the currency's minor units.
    async fn create_price(&self, product_id: &str, amount: i64) -> Result<String, GatewayError>;

    async fn create_checkout_session(
        &self,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
        metadata: &[(String, String)],
    ) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError>;

    async fn create_customer(&self, email: &str, name: &str) -> Result<String, GatewayError>;
}

#[derive(Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

#[derive(Deserialize)]
struct ProviderError {
    message: Option<String>,
}

/// Live client over the provider's v1 REST API.
pub struct StripeClient {
    http: Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret_key,
        }
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, GatewayError> {
        debug!(path, "provider POST");
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await?;
        Self::read_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        debug!(path, "provider GET");
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::read_response(response).await
    }

    async fn read_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        // Error bodies come as {"error": {"message": ...}}
        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope
                .error
                .message
                .unwrap_or_else(|| format!("provider returned status {status}")),
            Err(_) => format!("provider returned status {status}"),
        };
        error!(status = status.as_u16(), %message, "provider call failed");
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_product(
        &self,
        name: &str,
        description: &str,
    ) -> Result<String, GatewayError> {
        let mut params = vec![("name".to_string(), name.to_string())];
        if !description.is_empty() {
            params.push(("description".to_string(), description.to_string()));
        }
        let created: CreatedObject = self.post_form("/v1/products", &params).await?;
        Ok(created.id)
    }

    async fn create_price(&self, product_id: &str, amount: i64) -> Result<String, GatewayError> {
        let params = vec![
            ("product".to_string(), product_id.to_string()),
            ("unit_amount".to_string(), amount.to_string()),
            ("currency".to_string(), CURRENCY.to_string()),
        ];
        let created: CreatedObject = self.post_form("/v1/prices", &params).await?;
        Ok(created.id)
    }

    async fn create_checkout_session(
        &self,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
        metadata: &[(String, String)],
    ) -> Result<CheckoutSession, GatewayError> {
        let mut params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][price]".to_string(), price_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), success_url.to_string()),
            ("cancel_url".to_string(), cancel_url.to_string()),
        ];
        for (key, value) in metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }
        self.post_form("/v1/checkout/sessions", &params).await
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        self.get(&format!("/v1/checkout/sessions/{session_id}")).await
    }

    async fn create_customer(&self, email: &str, name: &str) -> Result<String, GatewayError> {
        let params = vec![
            ("email".to_string(), email.to_string()),
            ("name".to_string(), name.to_string()),
        ];
        let created: CreatedObject = self.post_form("/v1/customers", &params).await?;
        Ok(created.id)
    }
}
