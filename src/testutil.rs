//! Shared test fixtures: unsigned JWT minting and a programmable identity
//! endpoint mock.

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::json;

use crate::auth::store::CredentialStore;
use crate::config::AuthConfig;
use crate::endpoint::{EndpointError, IdentityEndpoint, TokenGrant};
use crate::session::SessionManager;

/// Mint a JWT-shaped token with the USER role, expiring `expires_in_secs`
/// from now (negative for already expired). The signature segment is junk;
/// nothing in this crate verifies signatures.
pub(crate) fn make_token(expires_in_secs: i64, username: &str) -> String {
    make_token_with_roles(expires_in_secs, username, &["USER"])
}

pub(crate) fn make_token_with_roles(
    expires_in_secs: i64,
    username: &str,
    roles: &[&str],
) -> String {
    let header = json!({"alg": "RS256", "typ": "JWT"});
    let claims = json!({
        "sub": format!("uid-{}", username),
        "preferred_username": username,
        "email": format!("{}@example.com", username),
        "given_name": "Test",
        "family_name": "User",
        "exp": Utc::now().timestamp() + expires_in_secs,
        "realm_access": {"roles": roles},
    });
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// Session wired to a mock endpoint and a temp-dir store.
pub(crate) fn session_with(endpoint: Arc<MockEndpoint>, dir: &Path) -> SessionManager {
    let mut config = AuthConfig::new("https://sso.test/realms/main", "web", "https://app.test/");
    config.storage_dir = Some(dir.to_path_buf());
    SessionManager::with_endpoint(config, endpoint, CredentialStore::new(dir))
}

#[derive(Clone, Copy)]
enum MockBehavior {
    Normal,
    /// Every grant operation answers `invalid_grant`.
    InvalidGrant,
    /// Every operation fails as if the provider were unreachable.
    Unavailable,
}

/// Programmable `IdentityEndpoint`: counts calls, issues fresh grants, and
/// can be switched into failure modes mid-test.
pub(crate) struct MockEndpoint {
    behavior: Mutex<MockBehavior>,
    refresh_delay_ms: AtomicU64,
    issued: AtomicUsize,
    login_count: AtomicUsize,
    refresh_count: AtomicUsize,
    exchange_count: AtomicUsize,
    logout_count: AtomicUsize,
    silent_count: AtomicUsize,
    silent_grant: Mutex<Option<TokenGrant>>,
}

impl MockEndpoint {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(MockBehavior::Normal),
            refresh_delay_ms: AtomicU64::new(0),
            issued: AtomicUsize::new(0),
            login_count: AtomicUsize::new(0),
            refresh_count: AtomicUsize::new(0),
            exchange_count: AtomicUsize::new(0),
            logout_count: AtomicUsize::new(0),
            silent_count: AtomicUsize::new(0),
            silent_grant: Mutex::new(None),
        }
    }

    pub fn fail_invalid_grant(&self) {
        *self.behavior.lock().unwrap() = MockBehavior::InvalidGrant;
    }

    pub fn fail_network(&self) {
        *self.behavior.lock().unwrap() = MockBehavior::Unavailable;
    }

    /// Delay refresh responses so concurrent callers can pile up.
    pub fn set_refresh_delay_ms(&self, ms: u64) {
        self.refresh_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Arm the silent SSO check to succeed once with this grant.
    pub fn set_silent_grant(&self, grant: TokenGrant) {
        *self.silent_grant.lock().unwrap() = Some(grant);
    }

    pub fn login_calls(&self) -> usize {
        self.login_count.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_count.load(Ordering::SeqCst)
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_count.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_count.load(Ordering::SeqCst)
    }

    pub fn silent_calls(&self) -> usize {
        self.silent_count.load(Ordering::SeqCst)
    }

    /// A fresh grant with a distinct rotated refresh token.
    pub fn grant(&self) -> TokenGrant {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        TokenGrant {
            access_token: make_token(300, "alice"),
            refresh_token: Some(format!("rt-issued-{}", n)),
            expires_in: Some(300),
            token_type: Some("Bearer".to_string()),
        }
    }

    fn check(&self) -> Result<(), EndpointError> {
        match *self.behavior.lock().unwrap() {
            MockBehavior::Normal => Ok(()),
            MockBehavior::InvalidGrant => {
                Err(EndpointError::InvalidGrant("grant rejected".to_string()))
            }
            MockBehavior::Unavailable => Err(EndpointError::Rejected {
                status: 503,
                error: "unavailable".to_string(),
                description: "provider unreachable".to_string(),
            }),
        }
    }
}

#[async_trait]
impl IdentityEndpoint for MockEndpoint {
    async fn login(&self, _username: &str, _password: &str) -> Result<TokenGrant, EndpointError> {
        self.login_count.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.grant())
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, EndpointError> {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        let delay = self.refresh_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check()?;
        Ok(self.grant())
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _verifier: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant, EndpointError> {
        self.exchange_count.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.grant())
    }

    async fn logout(&self, _refresh_token: &str) -> Result<(), EndpointError> {
        self.logout_count.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(())
    }

    async fn silent_check(&self) -> Result<Option<TokenGrant>, EndpointError> {
        self.silent_count.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.silent_grant.lock().unwrap().take())
    }

    fn authorize_url(&self, state: &str, code_challenge: &str, redirect_uri: &str) -> String {
        format!(
            "https://sso.test/realms/main/protocol/openid-connect/auth\
             ?client_id=web&response_type=code&state={}&code_challenge={}&redirect_uri={}",
            state,
            code_challenge,
            urlencoding::encode(redirect_uri)
        )
    }
}
