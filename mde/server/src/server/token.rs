use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TOKEN_LIFETIME_MINUTES: i64 = 60;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("token rejected: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("token names no principal")]
    EmptyPrincipal,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    iat: i64,
    exp: i64,
}

/**
    Issues the token handed to the client by the federated
    authentication page, and checks it again on enrollment.
*/
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    pub fn new(secret: &[u8], issuer: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
        }
    }

    pub fn issue(&self, principal: &str) -> Result<String, TokenError> {
        self.issue_at(principal, Utc::now().timestamp())
    }

    fn issue_at(&self, principal: &str, issued_at: i64) -> Result<String, TokenError> {
        if principal.is_empty() {
            return Err(TokenError::EmptyPrincipal);
        }
        let claims = Claims {
            sub: principal.to_string(),
            iss: self.issuer.clone(),
            iat: issued_at,
            exp: issued_at + Duration::minutes(TOKEN_LIFETIME_MINUTES).num_seconds(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    /**
        Check signature, issuer and expiry, returning the principal.
    */
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        let data = decode::<Claims>(token.trim(), &self.decoding, &validation)
            .map_err(TokenError::Invalid)?;
        if data.claims.sub.is_empty() {
            return Err(TokenError::EmptyPrincipal);
        }
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "https://enroll.example.com";

    #[test]
    fn issued_tokens_verify() {
        let tokens = TokenAuthority::new(b"secret", ISSUER);
        let token = tokens.issue("alice@example.com").unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), "alice@example.com");
    }

    #[test]
    fn rejects_foreign_tokens() {
        let token = TokenAuthority::new(b"secret", ISSUER)
            .issue("alice@example.com")
            .unwrap();

        let other_key = TokenAuthority::new(b"another secret", ISSUER);
        assert!(matches!(other_key.verify(&token), Err(TokenError::Invalid(_))));

        let other_issuer = TokenAuthority::new(b"secret", "https://elsewhere.example.com");
        assert!(matches!(other_issuer.verify(&token), Err(TokenError::Invalid(_))));

        let tokens = TokenAuthority::new(b"secret", ISSUER);
        assert!(tokens.verify("not-a-token").is_err());
    }

    #[test]
    fn rejects_expired_tokens() {
        let tokens = TokenAuthority::new(b"secret", ISSUER);
        let two_hours_ago = Utc::now().timestamp() - 2 * 60 * 60;
        let token = tokens.issue_at("alice@example.com", two_hours_ago).unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn refuses_empty_principal() {
        let tokens = TokenAuthority::new(b"secret", ISSUER);
        assert!(matches!(tokens.issue(""), Err(TokenError::EmptyPrincipal)));
    }
}
