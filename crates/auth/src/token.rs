//! Bearer token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use chatdesk_core::UserId;

use crate::claims::{JwtClaims, TokenError, validate_claims};
use crate::{Identity, Role};

/// Validates a bearer credential and extracts identity claims.
///
/// Implementations must not touch any store: an invalid token fails fast.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenError>;
}

/// HS256 (shared secret) JWT verifier.
pub struct Hs256TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256TokenVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time checks run in `validate_claims` against an explicit clock.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl TokenVerifier for Hs256TokenVerifier {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                _ => TokenError::Malformed,
            })?;

        let claims = data.claims;
        validate_claims(&claims, now)?;

        let user_id: UserId = claims.sub.parse().map_err(|_| TokenError::Malformed)?;
        let role: Role = claims.role.parse().map_err(|_| TokenError::UnknownRole)?;

        Ok(Identity::new(user_id, claims.email, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn mint(secret: &str, role: &str, iat: i64, exp: i64) -> String {
        let claims = JwtClaims {
            sub: "u1".to_string(),
            email: "agent@example.com".to_string(),
            role: role.to_string(),
            iat,
            exp,
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("failed to encode jwt")
    }

    #[test]
    fn verifies_valid_token() {
        let now = Utc::now();
        let token = mint(SECRET, "AGENT", now.timestamp() - 10, now.timestamp() + 600);

        let identity = Hs256TokenVerifier::new(SECRET).verify(&token, now).unwrap();
        assert_eq!(identity.user_id, UserId::new("u1"));
        assert_eq!(identity.role, Role::Agent);
        assert_eq!(identity.email, "agent@example.com");
    }

    #[test]
    fn rejects_tampered_signature() {
        let now = Utc::now();
        let token = mint("other-secret", "ADMIN", now.timestamp(), now.timestamp() + 600);

        let err = Hs256TokenVerifier::new(SECRET).verify(&token, now).unwrap_err();
        assert_eq!(err, TokenError::InvalidSignature);
    }

    #[test]
    fn rejects_expired_token() {
        let now = Utc::now();
        let token = mint(SECRET, "ADMIN", now.timestamp() - 7_200, now.timestamp() - 3_600);

        let err = Hs256TokenVerifier::new(SECRET).verify(&token, now).unwrap_err();
        assert_eq!(err, TokenError::Expired);
    }

    #[test]
    fn rejects_garbage_and_empty_tokens() {
        let verifier = Hs256TokenVerifier::new(SECRET);
        assert_eq!(verifier.verify("not-a-jwt", Utc::now()), Err(TokenError::Malformed));
        assert_eq!(verifier.verify("  ", Utc::now()), Err(TokenError::Missing));
    }

    #[test]
    fn rejects_unknown_role() {
        let now = Utc::now();
        let token = mint(SECRET, "OWNER", now.timestamp(), now.timestamp() + 600);

        let err = Hs256TokenVerifier::new(SECRET).verify(&token, now).unwrap_err();
        assert_eq!(err, TokenError::UnknownRole);
    }
}
