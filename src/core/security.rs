use argon2::{
    password_hash::{self, SaltString},
    Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier,
};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::core::config::SecuritySettings;
use crate::db::models::User;
use crate::db::types::UserRole;

// OWASP baseline for argon2id: 19 MiB, two passes, one lane.
const ARGON2_MEMORY_KIB: u32 = 19_456;
const ARGON2_PASSES: u32 = 2;
const ARGON2_LANES: u32 = 1;

#[derive(Debug, Error)]
pub(crate) enum SecurityError {
    #[error("password hashing failed")]
    Hashing,
    #[error("stored password hash is unreadable")]
    MalformedHash,
    #[error("access token could not be signed")]
    Signing,
    #[error("access token has expired")]
    Expired,
    #[error("access token is invalid")]
    InvalidToken,
    #[error("unsupported jwt algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Token claims. `role` is informational; guards always reload the user.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) role: UserRole,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

#[derive(Debug)]
pub(crate) struct AccessToken {
    pub(crate) token: String,
    pub(crate) expires_in_seconds: i64,
}

fn argon2() -> Result<Argon2<'static>, SecurityError> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_PASSES, ARGON2_LANES, None)
        .map_err(|_| SecurityError::Hashing)?;
    Ok(Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params))
}

pub(crate) fn hash_password(password: &str) -> Result<String, SecurityError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| SecurityError::Hashing)
}

/// `Ok(false)` means a wrong password; `Err` means the stored hash itself is broken.
pub(crate) fn verify_password(password: &str, stored_hash: &str) -> Result<bool, SecurityError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| SecurityError::MalformedHash)?;
    match argon2()?.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(_) => Err(SecurityError::MalformedHash),
    }
}

pub(crate) fn issue_access_token(
    user: &User,
    security: &SecuritySettings,
) -> Result<AccessToken, SecurityError> {
    let ttl = Duration::minutes(security.access_token_expire_minutes as i64);
    sign(&user.id, user.role, security, ttl)
}

fn sign(
    subject: &str,
    role: UserRole,
    security: &SecuritySettings,
    ttl: Duration,
) -> Result<AccessToken, SecurityError> {
    let algorithm = algorithm(security)?;
    let issued_at = OffsetDateTime::now_utc();
    let claims = Claims {
        sub: subject.to_owned(),
        role,
        iat: issued_at.unix_timestamp(),
        exp: (issued_at + ttl).unix_timestamp(),
    };

    let token = jsonwebtoken::encode(
        &Header::new(algorithm),
        &claims,
        &EncodingKey::from_secret(security.secret_key.as_bytes()),
    )
    .map_err(|_| SecurityError::Signing)?;

    Ok(AccessToken { token, expires_in_seconds: ttl.whole_seconds() })
}

pub(crate) fn decode_access_token(
    token: &str,
    security: &SecuritySettings,
) -> Result<Claims, SecurityError> {
    let mut validation = Validation::new(algorithm(security)?);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(security.secret_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|error| match error.kind() {
        ErrorKind::ExpiredSignature => SecurityError::Expired,
        _ => SecurityError::InvalidToken,
    })
}

fn algorithm(security: &SecuritySettings) -> Result<Algorithm, SecurityError> {
    match security.algorithm.as_str() {
        "HS256" => Ok(Algorithm::HS256),
        other => Err(SecurityError::UnsupportedAlgorithm(other.to_owned())),
    }
}
