//! Client-side authentication session manager.
//!
//! Owns the full lifecycle of a user session against an OIDC identity
//! provider: credential discovery at startup (cross-domain token handoff,
//! SSO callback exchange, persisted record, silent provider check), expiry
//! tracking with single-flight refresh, direct and redirect login, and
//! logout with best-effort remote revocation.
//!
//! The host application wires three seams:
//! - [`TokenProvider`] hands valid bearer tokens to the HTTP client,
//!   refreshing on demand behind a single-flight coordinator
//! - [`NavigationGuard`] gates routing on session state and drives
//!   initialization on the first navigation
//! - [`RefreshScheduler`] renews tokens in the background before any
//!   request has to pay refresh latency
//!
//! ```no_run
//! use tokenkeeper::{AuthConfig, NavigationGuard, RefreshScheduler, SessionManager, TokenProvider};
//!
//! # async fn wire() -> anyhow::Result<()> {
//! let config = AuthConfig::from_env()?;
//! let session = SessionManager::new(config)?;
//! let tokens = TokenProvider::new(session.clone()).into_callback();
//! let guard = NavigationGuard::new(session.clone(), "/login");
//! let _scheduler = RefreshScheduler::spawn(session);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod guard;
pub mod provider;
pub mod session;

mod utils;

#[cfg(test)]
pub(crate) mod testutil;

pub use auth::token::Token;
pub use config::AuthConfig;
pub use endpoint::{HttpIdentityEndpoint, IdentityEndpoint, TokenGrant};
pub use error::AuthError;
pub use guard::{GuardDecision, NavigationGuard};
pub use provider::{TokenCallback, TokenProvider};
pub use session::scheduler::RefreshScheduler;
pub use session::{AuthUser, Initialized, Role, SessionManager, SessionStatus};
