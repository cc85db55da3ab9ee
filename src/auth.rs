use argon2::password_hash::{PasswordHash, SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{Db, DbError};
use crate::models::User;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("that email is already registered")]
    DuplicateEmail,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    Token,
    #[error("password hashing failed")]
    Hash,
    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::DuplicateEmail => AuthError::DuplicateEmail,
            other => AuthError::Db(other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub exp: usize,
}

/// Signs and checks bearer tokens with the configured secret key.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id,
            exp: (Utc::now() + self.ttl).timestamp() as usize,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| AuthError::Token)
    }

    pub fn verify(&self, token: &str) -> Result<i64, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims.sub)
            .map_err(|_| AuthError::Token)
    }
}

pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|_| AuthError::Hash)?
        .to_string())
}

pub fn verify_password(hash: &str, plain: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok()
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub async fn register(db: &Db, email: &str, full_name: &str, password: &str) -> Result<i64, AuthError> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::Validation("email and password required".to_string()));
    }
    let password_hash = hash_password(password)?;
    let id = db.insert_user(&email, full_name.trim(), &password_hash).await?;
    tracing::info!(user_id = id, "registered user");
    Ok(id)
}

pub async fn login(db: &Db, email: &str, password: &str) -> Result<User, AuthError> {
    let email = normalize_email(email);
    let user = db
        .find_user_by_email(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !verify_password(&user.password_hash, password) {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(user)
}
