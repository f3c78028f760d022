use std::time::Duration;

use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
}

/// Issues and verifies the HS256 access tokens handed out at sign-in.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.jwt_secret.as_bytes(), config.jwt_ttl)
    }

    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: &str) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now.saturating_add(ttl),
            iat: now,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|error| AppError::internal(format!("Token signing failed: {error}")))
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let decoded = decode::<Claims>(token, &self.decoding, &validation).map_err(|error| {
            AppError::unauthorized(format!("Token validation failed: {}", sanitize(&error)))
        })?;
        if decoded.claims.sub.trim().is_empty() {
            return Err(AppError::unauthorized("Token subject is missing"));
        }
        Ok(AuthenticatedUser {
            user_id: decoded.claims.sub,
        })
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

/// Trim and validate credentials supplied at sign-up or sign-in.
pub fn validate_credentials(username: &str, password: &str) -> Result<String, AppError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::bad_request("username is required"));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(AppError::bad_request(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(username.to_string())
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = uuid::Uuid::new_v4();
    argon2::hash_encoded(password.as_bytes(), salt.as_bytes(), &argon2::Config::default())
        .map_err(|error| AppError::internal(format!("Password hashing failed: {error}")))
}

pub fn verify_password(encoded: &str, password: &str) -> bool {
    argon2::verify_encoded(encoded, password.as_bytes()).unwrap_or_else(|error| {
        tracing::warn!(%error, "Stored password hash could not be verified");
        false
    })
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}
