use thiserror::Error;

/// Failures surfaced by the session core.
///
/// Nothing in this crate panics across its boundary: token parsing failures
/// degrade to "unauthenticated", refresh failures clear the session, and
/// revocation failures never block local logout.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Bad username/password on direct login. Kept distinct from
    /// `LoginFailed` so callers can show an invalid-credentials message
    /// instead of a generic failure.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// Remote logout call failed. Logged by the session, never fatal.
    #[error("Session revocation failed: {0}")]
    RevocationFailed(String),
}
