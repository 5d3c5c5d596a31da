//! Signed session tokens.
//!
//! A token is `base64url(json(claims)) "." base64url(signature)`, where the
//! Ed25519 signature covers the encoded claims. Only the holder of the server
//! signing key can mint tokens; validation needs nothing but the token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_SESSION_TTL_DAYS, SESSION_TOKEN_SEPARATOR};
use crate::error::SessionError;
use crate::types::{UserId, UserStatus};

/// What a session token asserts about its bearer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: UserId,
    /// Account status at issue time. Can be stale; re-check against the
    /// store before acting on it.
    pub status: UserStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates session tokens with one Ed25519 key.
#[derive(Clone)]
pub struct SessionIssuer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    ttl: Duration,
}

impl SessionIssuer {
    /// `ttl` is capped at [`MAX_SESSION_TTL_DAYS`].
    pub fn from_secret_bytes(secret: &[u8; 32], ttl: Duration) -> Self {
        let ttl = ttl.min(Duration::days(MAX_SESSION_TTL_DAYS));
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            ttl,
        }
    }

    /// Random key; tokens do not survive a restart.
    pub fn generate(ttl: Duration) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_secret_bytes(signing_key.as_bytes(), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: UserId, status: UserStatus) -> Result<String, SessionError> {
        self.issue_at(user_id, status, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: UserId,
        status: UserStatus,
        now: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(SessionError::ExpiryOutOfRange)?;
        let claims = SessionClaims {
            user_id,
            status,
            issued_at: now,
            expires_at,
        };
        // Serializing plain data into a Vec cannot fail.
        let payload = serde_json::to_vec(&claims).unwrap_or_default();
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        let signature = self.signing_key.sign(encoded.as_bytes());

        Ok(format!(
            "{encoded}{SESSION_TOKEN_SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    pub fn validate(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        let (encoded, sig_part) = token
            .trim()
            .split_once(SESSION_TOKEN_SEPARATOR)
            .ok_or(SessionError::Malformed)?;

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig_part)
            .map_err(|_| SessionError::Malformed)?;
        let signature = Signature::from_slice(&sig_bytes).map_err(|_| SessionError::Malformed)?;

        self.verifying_key
            .verify(encoded.as_bytes(), &signature)
            .map_err(|_| SessionError::BadSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| SessionError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| SessionError::Malformed)?;

        if now > claims.expires_at {
            return Err(SessionError::Expired);
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("verifying_key", &hex_prefix(self.verifying_key.as_bytes()))
            .field("ttl_days", &self.ttl.num_days())
            .finish()
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{b:02x}")).collect()
}
