//! HS256 bearer-token encoding and validation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::{validate_claims, JwtClaims, Role, TokenValidationError, UserId};

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("malformed or badly signed token: {0}")]
    Decode(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Turns a raw bearer token into trusted claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// Shared-secret (HS256) validator; also issues tokens for seeding and tests.
pub struct Hs256JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, sub: UserId, roles: Vec<Role>, ttl: Duration) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub,
            roles,
            issued_at: now,
            expires_at: now + ttl,
        };
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Hs256JwtValidator { .. }")
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        // The time window lives in `issued_at`/`expires_at`, not the registered
        // `exp` claim, so it is checked by `validate_claims` instead.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_validate() {
        let jwt = Hs256JwtValidator::new("test-secret");
        let user = UserId::generate();
        let token = jwt.issue(user, vec![Role::admin()], Duration::minutes(5)).unwrap();

        let claims = jwt.validate(&token, Utc::now()).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.roles, vec![Role::admin()]);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = Hs256JwtValidator::new("a")
            .issue(UserId::generate(), vec![], Duration::minutes(5))
            .unwrap();
        let err = Hs256JwtValidator::new("b").validate(&token, Utc::now()).unwrap_err();
        assert!(matches!(err, JwtError::Decode(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = Hs256JwtValidator::new("s");
        let token = jwt.issue(UserId::generate(), vec![], Duration::minutes(1)).unwrap();
        let later = Utc::now() + Duration::minutes(2);
        let err = jwt.validate(&token, later).unwrap_err();
        assert!(matches!(err, JwtError::Claims(TokenValidationError::Expired)));
    }
}
