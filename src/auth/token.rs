//! Bearer token value type.
//!
//! A `Token` decodes the payload segment of a JWT-shaped credential once at
//! construction and never mutates afterward; re-validation always re-decodes
//! from the raw string. Signature verification is the identity provider's
//! job, not ours - the client only needs the claims and the expiry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::AuthError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Decoded identity claims. Fields absent from the payload stay `None`;
/// only the expiry is mandatory.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    /// Expiry as seconds since the epoch.
    pub exp: i64,
    #[serde(default)]
    pub realm_access: RealmAccess,
}

/// Immutable bearer credential with decoded claims.
#[derive(Debug, Clone)]
pub struct Token {
    raw: String,
    claims: Claims,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Decode the payload segment of a raw bearer string.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let payload = raw
            .split('.')
            .nth(1)
            .ok_or_else(|| AuthError::MalformedToken("missing payload segment".to_string()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {}", e)))?;

        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::MalformedToken(format!("payload is not valid claims: {}", e)))?;

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::MalformedToken("expiry out of range".to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            claims,
            expires_at,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is expired, or will be within `skew_secs`.
    pub fn is_expired(&self, skew_secs: i64) -> bool {
        Utc::now() >= self.expires_at - Duration::seconds(skew_secs)
    }

    pub fn roles(&self) -> &[String] {
        &self.claims.realm_access.roles
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.claims.realm_access.roles.iter().any(|r| r == name)
    }
}
