//! Credential acquisition sources.
//!
//! Each login strategy is a `CredentialSource` with a single `try_acquire`
//! contract; the session state machine walks them in precedence order during
//! initialization:
//!
//! 1. cross-domain fragment handoff (`#token=...&refreshToken=...`)
//! 2. SSO callback code exchange (return leg of the redirect login)
//! 3. persisted credential record
//! 4. silent SSO check against the provider session
//!
//! Acquisition failures are absorbed here and degrade to "no credential";
//! new strategies slot in without touching refresh or logout logic.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::auth::store::CredentialStore;
use crate::endpoint::IdentityEndpoint;
use crate::utils::{param, parse_params, query_of, split_fragment, strip_query_params};

/// Fragment parameter names for the cross-domain handoff. Fragments are used
/// instead of the query string so tokens never reach server logs or Referer
/// headers.
const HANDOFF_TOKEN_PARAM: &str = "token";
const HANDOFF_REFRESH_PARAM: &str = "refreshToken";

/// Query parameters the SSO provider appends on the callback leg.
pub(crate) const CALLBACK_MARKERS: &[&str] = &["code", "state", "session_state", "iss", "error"];

pub struct AcquireContext<'a> {
    pub current_url: &'a str,
    pub store: &'a CredentialStore,
    pub endpoint: &'a dyn IdentityEndpoint,
    pub redirect_uri: &'a str,
}

/// Credentials produced by a source, not yet validated or installed.
#[derive(Debug, Clone)]
pub struct AcquiredCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Freshly issued credentials must be written back to the store.
    pub persist: bool,
    /// URL the host should rewrite to after the source consumed handoff or
    /// callback parameters.
    pub rewrite_url: Option<String>,
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attempt to produce credentials. `None` means this source has nothing;
    /// the next source in precedence is consulted.
    async fn try_acquire(&self, ctx: &AcquireContext<'_>) -> Option<AcquiredCredentials>;
}

/// Inbound token pair carried in the URL fragment by an external login page.
pub struct FragmentHandoff;

#[async_trait]
impl CredentialSource for FragmentHandoff {
    fn name(&self) -> &'static str {
        "fragment-handoff"
    }

    async fn try_acquire(&self, ctx: &AcquireContext<'_>) -> Option<AcquiredCredentials> {
        let (base, fragment) = split_fragment(ctx.current_url);
        let params = parse_params(fragment?);
        let access = param(&params, HANDOFF_TOKEN_PARAM)?;

        debug!("Consuming cross-domain token handoff from URL fragment");
        Some(AcquiredCredentials {
            access_token: Some(access.to_string()),
            refresh_token: param(&params, HANDOFF_REFRESH_PARAM).map(str::to_string),
            persist: true,
            rewrite_url: Some(base.to_string()),
        })
    }
}

/// Return leg of the redirect SSO login: exchanges the authorization code
/// using the PKCE state persisted before the redirect.
pub struct CallbackCode;

#[async_trait]
impl CredentialSource for CallbackCode {
    fn name(&self) -> &'static str {
        "sso-callback"
    }

    async fn try_acquire(&self, ctx: &AcquireContext<'_>) -> Option<AcquiredCredentials> {
        let params = parse_params(query_of(ctx.current_url)?);
        let code = param(&params, "code")?;
        let state = param(&params, "state")?;

        let pending = ctx.store.take_login_state()?;
        if pending.state != state {
            warn!("SSO callback state does not match the pending login; discarding code");
            return None;
        }

        match ctx
            .endpoint
            .exchange_code(code, &pending.verifier, ctx.redirect_uri)
            .await
        {
            Ok(grant) => Some(AcquiredCredentials {
                access_token: Some(grant.access_token),
                refresh_token: grant.refresh_token,
                persist: true,
                rewrite_url: Some(pending.return_path),
            }),
            Err(e) => {
                warn!(error = %e, "SSO code exchange failed");
                None
            }
        }
    }
}

/// Credential record persisted by a previous page load.
pub struct StoredRecord;

#[async_trait]
impl CredentialSource for StoredRecord {
    fn name(&self) -> &'static str {
        "stored-record"
    }

    async fn try_acquire(&self, ctx: &AcquireContext<'_>) -> Option<AcquiredCredentials> {
        let record = ctx.store.load()?;
        Some(AcquiredCredentials {
            access_token: record.access_token,
            refresh_token: record.refresh_token,
            persist: false,
            rewrite_url: None,
        })
    }
}

/// Silent SSO check: asks the provider for a code without prompting.
pub struct SilentSso;

#[async_trait]
impl CredentialSource for SilentSso {
    fn name(&self) -> &'static str {
        "silent-sso"
    }

    async fn try_acquire(&self, ctx: &AcquireContext<'_>) -> Option<AcquiredCredentials> {
        match ctx.endpoint.silent_check().await {
            Ok(Some(grant)) => Some(AcquiredCredentials {
                access_token: Some(grant.access_token),
                refresh_token: grant.refresh_token,
                persist: true,
                rewrite_url: None,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Silent SSO check failed");
                None
            }
        }
    }
}

/// Whether a URL looks like the return leg of an SSO redirect.
pub(crate) fn has_callback_markers(url: &str) -> bool {
    let params = query_of(url).map(parse_params).unwrap_or_default();
    param(&params, "state").is_some()
        && CALLBACK_MARKERS
            .iter()
            .filter(|marker| **marker != "state")
            .any(|marker| param(&params, marker).is_some())
}

/// Safe landing URL with all callback markers stripped. Breaks the redirect
/// loop a misconfigured provider would otherwise produce.
pub(crate) fn strip_callback_markers(url: &str) -> String {
    strip_query_params(url, CALLBACK_MARKERS)
}
