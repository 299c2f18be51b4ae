//! Identity endpoint collaborator.
//!
//! The session state machine talks to the identity provider only through the
//! `IdentityEndpoint` trait, so hosts can substitute their own transport and
//! tests can substitute a programmable mock. The default implementation is
//! `HttpIdentityEndpoint`, which speaks the OAuth2 form-encoded token
//! protocol over `reqwest`.

pub mod http;
pub(crate) mod pkce;

pub use http::HttpIdentityEndpoint;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// A token pair issued by the identity endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Error, Debug)]
pub enum EndpointError {
    /// The provider rejected the grant itself (wrong password, revoked or
    /// expired refresh token). Maps to a user-facing invalid-credentials
    /// message on direct login.
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Identity endpoint rejected request ({status}): {error}")]
    Rejected {
        status: u16,
        error: String,
        description: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Network seam to the identity provider. All calls carry the same timeout
/// discipline as ordinary API calls; none are retried here.
#[async_trait]
pub trait IdentityEndpoint: Send + Sync {
    /// Resource-owner password grant ("direct login").
    async fn login(&self, username: &str, password: &str) -> Result<TokenGrant, EndpointError>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, EndpointError>;

    /// Exchange an authorization code from the redirect SSO return leg.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, EndpointError>;

    /// Remote session revocation. Best-effort: the session logs failures and
    /// proceeds with local teardown regardless.
    async fn logout(&self, refresh_token: &str) -> Result<(), EndpointError>;

    /// Consult an existing provider session without prompting the user.
    /// `Ok(None)` means the provider has no usable session.
    async fn silent_check(&self) -> Result<Option<TokenGrant>, EndpointError>;

    /// Interactive login URL for the redirect SSO flow.
    fn authorize_url(&self, state: &str, code_challenge: &str, redirect_uri: &str) -> String;
}
