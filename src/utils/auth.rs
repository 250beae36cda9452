use chrono::{Duration, Utc};
use jsonwebtoken::errors::Result;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // principal ID
    pub exp: usize,
    pub jti: String,
}

pub fn create_jwt(user_id: &str, secret: &str) -> Result<String> {
    create_jwt_with_ttl(user_id, secret, Duration::hours(TOKEN_TTL_HOURS))
}

pub fn create_jwt_with_ttl(user_id: &str, secret: &str, ttl: Duration) -> Result<String> {
    let claims = Claims {
        sub: user_id.to_owned(),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
        jti: uuid::Uuid::new_v4().to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

/// Decode and verify an HS256 token. Other algorithms are rejected.
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;

    Ok(token_data.claims)
}
