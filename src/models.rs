use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Group whose members get moderator rights (read/update, no create/delete).
pub const MODERATORS_GROUP: &str = "moderators";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: u64,
    /// Login identifier; unique across the store.
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub avatar: Option<String>,
    pub is_confirmed: bool,
    pub is_blocked: bool,
    pub is_superuser: bool,
    /// Group memberships; moderation is a group, not ownership.
    pub groups: Vec<String>,
    /// Payment-provider customer id, set once via /stripe/customer/.
    pub stripe_customer_id: Option<String>,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn is_moderator(&self) -> bool {
        self.groups.iter().any(|g| g == MODERATORS_GROUP)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: u64,
    pub title: String,
    /// Price in minor currency units (kopecks/cents).
    pub price: i64,
    pub preview: Option<String>,
    pub description: String,
    /// Creator of the course; deleting the owner cascades here.
    pub owner: u64,
    // Cached payment-provider linkage, filled lazily by the checkout flow.
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: Option<String>,
    /// Amount the cached price was created for; a drifted course price
    /// forces a fresh provider price on the next checkout.
    pub stripe_price_amount: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Lesson {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub preview: Option<String>,
    /// Optional, but must point at youtube.com when present.
    pub video_url: Option<String>,
    pub course: u64,
    pub owner: u64,
}

/// (user, course) link; the store enforces uniqueness of the pair.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Subscription {
    pub user: u64,
    pub course: u64,
    pub subscription_date: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "transfer" => Ok(PaymentMethod::Transfer),
            other => Err(format!(
                "Недопустимый метод оплаты '{other}'. Допустимые значения: cash, transfer"
            )),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Transfer => write!(f, "transfer"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Payment {
    pub id: u64,
    pub user: u64,
    /// Amount in minor currency units.
    pub amount: i64,
    pub payment_method: PaymentMethod,
    /// Course this payment was for; manual payments may omit it.
    pub course: Option<u64>,
    pub payment_date: NaiveDate,
    // Provider identifiers; only the checkout sequence fills these.
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_session_id: Option<String>,
    pub payment_url: Option<String>,
}

/// JWT claims for both access and refresh tokens.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    /// User id as a string (JWT subject convention).
    pub sub: String,
    pub email: String,
    /// "access" or "refresh"; endpoints only accept their own kind.
    pub token_type: String,
    pub exp: usize,
}
