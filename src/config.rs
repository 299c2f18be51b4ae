//! Session manager configuration.
//!
//! Carries the identity-provider coordinates (issuer, client id, redirect
//! URI), the expiry skews, and the credential storage location. Values come
//! from the host application or from `AUTH_*` environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application name used for the default credential storage path
const APP_NAME: &str = "tokenkeeper";

/// Skew for on-demand checks when handing a token to an outbound request.
/// 30s beats expiry for a request already in flight without refreshing eagerly.
const DEFAULT_ON_DEMAND_SKEW_SECS: i64 = 30;

/// Skew for the proactive background check. Larger than the on-demand skew so
/// idle sessions renew before any request would have to pay refresh latency.
const DEFAULT_PROACTIVE_SKEW_SECS: i64 = 60;

/// Background scheduler tick. 30s gives at least one check inside the
/// proactive skew window.
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;

/// Timeout for identity endpoint calls. Same discipline as ordinary API
/// calls; a timed-out refresh is a refresh failure, not retried.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Issuer base URL, e.g. `https://sso.example.com/realms/main`.
    pub issuer_url: String,
    /// OAuth2 public client id registered with the provider.
    pub client_id: String,
    /// Redirect URI for the SSO authorization-code round trip.
    pub redirect_uri: String,
    pub on_demand_skew_secs: i64,
    pub proactive_skew_secs: i64,
    pub check_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Credential storage directory; defaults to the platform data dir.
    pub storage_dir: Option<PathBuf>,
}

impl AuthConfig {
    pub fn new(
        issuer_url: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            on_demand_skew_secs: DEFAULT_ON_DEMAND_SKEW_SECS,
            proactive_skew_secs: DEFAULT_PROACTIVE_SKEW_SECS,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage_dir: None,
        }
    }

    /// Load configuration from `AUTH_ISSUER_URL`, `AUTH_CLIENT_ID` and
    /// `AUTH_REDIRECT_URI`, with optional skew/timeout overrides.
    pub fn from_env() -> Result<Self> {
        let issuer_url =
            std::env::var("AUTH_ISSUER_URL").context("AUTH_ISSUER_URL is not set")?;
        let client_id = std::env::var("AUTH_CLIENT_ID").context("AUTH_CLIENT_ID is not set")?;
        let redirect_uri =
            std::env::var("AUTH_REDIRECT_URI").context("AUTH_REDIRECT_URI is not set")?;

        let mut config = Self::new(issuer_url, client_id, redirect_uri);
        if let Some(value) = env_parse("AUTH_ON_DEMAND_SKEW_SECS")? {
            config.on_demand_skew_secs = value;
        }
        if let Some(value) = env_parse("AUTH_PROACTIVE_SKEW_SECS")? {
            config.proactive_skew_secs = value;
        }
        if let Some(value) = env_parse("AUTH_CHECK_INTERVAL_SECS")? {
            config.check_interval_secs = value;
        }
        if let Some(value) = env_parse("AUTH_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = value;
        }
        if let Ok(dir) = std::env::var("AUTH_STORAGE_DIR") {
            config.storage_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }

    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => {
            let parsed = value
                .parse()
                .with_context(|| format!("{} is not a valid number: {}", name, value))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}
