use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Clock-skew tolerance (seconds) applied to `iat` and `exp`.
pub const CLOCK_SKEW_SECS: i64 = 30;

/// JWT claims model.
///
/// This is the minimal set of claims expected once a token has been decoded
/// and its signature verified. Timestamps are seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / user identifier.
    pub sub: String,

    pub email: String,

    /// Role name as minted ("ADMIN", "SUPERVISOR", "AGENT").
    pub role: String,

    /// Issued-at timestamp.
    pub iat: i64,

    /// Expiration timestamp.
    pub exp: i64,
}

impl JwtClaims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("missing bearer token")]
    Missing,

    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("token carries an unknown role")]
    UnknownRole,
}

/// Deterministically validate the time window of verified claims.
///
/// Signature verification happens before this in the token verifier; this
/// only checks `iat`/`exp` against `now`, tolerating [`CLOCK_SKEW_SECS`].
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.exp <= claims.iat {
        return Err(TokenError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now + CLOCK_SKEW_SECS < claims.iat {
        return Err(TokenError::NotYetValid);
    }
    if now - CLOCK_SKEW_SECS >= claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(())
}
