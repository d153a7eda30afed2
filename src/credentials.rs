use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::models::Role;

/// Claims
///
/// Payload signed into every bearer token. `sub` carries the numeric user id as
/// a string (RFC 7519 subjects are strings); `role` is kept as the raw claim so
/// an unrecognized value can be refused explicitly by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: usize,
    pub exp: usize,
}

/// The identity recovered from a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub user_id: i32,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("invalid or expired token")]
    InvalidToken,
}

/// CredentialService
///
/// Contract for password hashing and token issuance. Handlers only ever see the
/// trait object, so tests can swap in a cheap implementation.
pub trait CredentialService: Send + Sync {
    fn hash_password(&self, plaintext: &str) -> Result<String, CredentialError>;

    /// Exact verification. A malformed stored hash counts as a mismatch.
    fn verify_password(&self, plaintext: &str, password_hash: &str) -> bool;

    fn issue_token(&self, user_id: i32, email: &str, role: Role)
    -> Result<String, CredentialError>;

    fn verify_token(&self, token: &str) -> Result<TokenIdentity, CredentialError>;
}

pub type CredentialState = Arc<dyn CredentialService>;

/// BcryptJwtCredentials
///
/// bcrypt password hashes and HS256 JWTs with a fixed lifetime.
#[derive(Clone)]
pub struct BcryptJwtCredentials {
    jwt_secret: String,
    token_ttl: Duration,
    bcrypt_cost: u32,
}

impl BcryptJwtCredentials {
    pub fn new(jwt_secret: impl Into<String>, token_ttl: Duration, bcrypt_cost: u32) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_ttl,
            bcrypt_cost,
        }
    }
}

impl CredentialService for BcryptJwtCredentials {
    fn hash_password(&self, plaintext: &str) -> Result<String, CredentialError> {
        Ok(bcrypt::hash(plaintext, self.bcrypt_cost)?)
    }

    fn verify_password(&self, plaintext: &str, password_hash: &str) -> bool {
        match bcrypt::verify(plaintext, password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash could not be parsed");
                false
            }
        }
    }

    fn issue_token(
        &self,
        user_id: i32,
        email: &str,
        role: Role,
    ) -> Result<String, CredentialError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            iat: now.timestamp() as usize,
            exp: (now + self.token_ttl).timestamp() as usize,
        };

        let key = EncodingKey::from_secret(self.jwt_secret.as_bytes());
        Ok(encode(&Header::default(), &claims, &key)?)
    }

    fn verify_token(&self, token: &str) -> Result<TokenIdentity, CredentialError> {
        let key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            CredentialError::InvalidToken
        })?;

        let user_id = data
            .claims
            .sub
            .parse::<i32>()
            .map_err(|_| CredentialError::InvalidToken)?;

        Ok(TokenIdentity {
            user_id,
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}
