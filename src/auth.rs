use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::models::{Claims, User};

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

const ACCESS_TTL_SECS: i64 = 3600; // 1 hour
const REFRESH_TTL_SECS: i64 = 7 * 24 * 3600; // 7 days

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password, DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

fn create_token(
    user: &User,
    token_type: &str,
    ttl_secs: i64,
    secret: &[u8],
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        token_type: token_type.to_owned(),
        exp: (Utc::now().timestamp() + ttl_secs) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

pub fn create_access_token(user: &User, secret: &[u8]) -> Result<String, jsonwebtoken::errors::Error> {
    create_token(user, ACCESS_TOKEN_TYPE, ACCESS_TTL_SECS, secret)
}

pub fn create_refresh_token(user: &User, secret: &[u8]) -> Result<String, jsonwebtoken::errors::Error> {
    create_token(user, REFRESH_TOKEN_TYPE, REFRESH_TTL_SECS, secret)
}

/// Decodes a token and checks it is of the expected kind, so a refresh
/// token can never authenticate a request and vice versa.
pub fn validate_token(
    token: &str,
    expected_type: &str,
    secret: &[u8],
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    )?;
    if token_data.claims.token_type != expected_type {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
    }
    Ok(token_data.claims)
}
