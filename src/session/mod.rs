//! Session state machine.
//!
//! `SessionManager` owns the process-wide session: current status, the
//! access token, the refresh token (never exposed outside this module), and
//! the user projection derived from token claims. It is created once at
//! startup and injected into the HTTP client bridge and the navigation
//! guard; all mutation goes through its own operations.
//!
//! Clone is cheap - the manager shares its state behind an `Arc`, the same
//! way the API client shares its connection pool.

pub mod refresh;
pub mod scheduler;

use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::auth::sources::{
    has_callback_markers, strip_callback_markers, AcquireContext, AcquiredCredentials,
    CallbackCode, CredentialSource, FragmentHandoff, SilentSso, StoredRecord,
};
use crate::auth::store::{CredentialStore, PendingLogin, StoredCredentials};
use crate::auth::token::Token;
use crate::config::AuthConfig;
use crate::endpoint::{pkce, EndpointError, HttpIdentityEndpoint, IdentityEndpoint, TokenGrant};
use crate::error::AuthError;
use refresh::{RefreshCoordinator, RefreshOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Authenticating,
    Authenticated,
    Refreshing,
    Unauthenticated,
    /// The provider answered but with something unusable (for example a
    /// token that does not decode). Cleared by the next login or initialize.
    Error,
}

/// Application role derived from realm roles, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Developer,
    User,
}

impl Role {
    fn from_realm_roles(roles: &[String]) -> Self {
        if roles.iter().any(|r| r == "ADMIN") {
            Role::Admin
        } else if roles.iter().any(|r| r == "DEVELOPER") {
            Role::Developer
        } else {
            Role::User
        }
    }
}

/// Read-only user projection. Recomputed from token claims on every access
/// and never persisted, so names and roles cannot go stale relative to the
/// credential.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub username: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub role: Role,
    pub roles: Vec<String>,
}

impl AuthUser {
    fn from_token(token: &Token) -> Self {
        let claims = token.claims();
        Self {
            username: claims.preferred_username.clone().unwrap_or_default(),
            email: claims.email.clone().unwrap_or_default(),
            given_name: claims.given_name.clone().unwrap_or_default(),
            family_name: claims.family_name.clone().unwrap_or_default(),
            role: Role::from_realm_roles(token.roles()),
            roles: token.roles().to_vec(),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Developer)
    }
}

/// Result of `initialize`.
#[derive(Debug, Clone)]
pub struct Initialized {
    pub authenticated: bool,
    /// URL the host should rewrite the address bar to: a consumed handoff
    /// fragment, the pre-login return path, or an SSO callback URL with its
    /// markers stripped. `None` when the URL needs no cleanup.
    pub rewrite_url: Option<String>,
}

struct SessionState {
    status: SessionStatus,
    access_token: Option<Token>,
    refresh_token: Option<String>,
    /// Cached initialization outcome; `Some` short-circuits repeat
    /// `initialize` calls until logout re-arms discovery.
    initialized: Option<bool>,
}

struct SessionShared {
    state: Mutex<SessionState>,
    store: CredentialStore,
    endpoint: Arc<dyn IdentityEndpoint>,
    config: AuthConfig,
    coordinator: RefreshCoordinator,
    /// Serializes concurrent `initialize` calls so fast route transitions
    /// cannot run discovery twice.
    init_lock: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<SessionShared>,
}

impl SessionManager {
    /// Build a manager with the default HTTP identity endpoint and the
    /// configured storage directory.
    pub fn new(config: AuthConfig) -> anyhow::Result<Self> {
        let endpoint = Arc::new(HttpIdentityEndpoint::new(&config)?);
        let store = CredentialStore::new(config.storage_dir()?);
        Ok(Self::with_endpoint(config, endpoint, store))
    }

    /// Build a manager around an injected endpoint and store.
    pub fn with_endpoint(
        config: AuthConfig,
        endpoint: Arc<dyn IdentityEndpoint>,
        store: CredentialStore,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState {
                    status: SessionStatus::Uninitialized,
                    access_token: None,
                    refresh_token: None,
                    initialized: None,
                }),
                store,
                endpoint,
                config,
                coordinator: RefreshCoordinator::new(),
                init_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.with_state(|s| s.status)
    }

    /// Live authentication check: token present and unexpired.
    pub fn is_authenticated(&self) -> bool {
        self.with_state(|s| {
            s.access_token
                .as_ref()
                .map(|t| !t.is_expired(0))
                .unwrap_or(false)
        })
    }

    /// Current user projection, `None` unless authenticated.
    pub fn current_user(&self) -> Option<AuthUser> {
        self.with_state(|s| s.access_token.clone())
            .filter(|t| !t.is_expired(0))
            .map(|t| AuthUser::from_token(&t))
    }

    pub(crate) fn config(&self) -> &AuthConfig {
        &self.shared.config
    }

    /// Recover or acquire a session. Walks the credential sources in
    /// precedence order: fragment handoff, SSO callback, persisted record,
    /// silent SSO check. Idempotent: once initialized the cached outcome is
    /// returned without re-running discovery.
    pub async fn initialize(&self, current_url: &str) -> Initialized {
        if let Some(authenticated) = self.with_state(|s| s.initialized) {
            debug!("Session already initialized; returning cached result");
            return Initialized {
                authenticated,
                rewrite_url: None,
            };
        }

        let _guard = self.shared.init_lock.lock().await;
        if let Some(authenticated) = self.with_state(|s| s.initialized) {
            return Initialized {
                authenticated,
                rewrite_url: None,
            };
        }

        self.with_state(|s| s.status = SessionStatus::Authenticating);

        let sources: [&dyn CredentialSource; 4] =
            [&FragmentHandoff, &CallbackCode, &StoredRecord, &SilentSso];
        let ctx = AcquireContext {
            current_url,
            store: &self.shared.store,
            endpoint: self.shared.endpoint.as_ref(),
            redirect_uri: &self.shared.config.redirect_uri,
        };

        let mut rewrite_url = None;
        let mut authenticated = false;
        for source in sources {
            let Some(acquired) = source.try_acquire(&ctx).await else {
                continue;
            };
            if acquired.rewrite_url.is_some() {
                rewrite_url = acquired.rewrite_url.clone();
            }
            if self.install(source.name(), acquired).await {
                authenticated = true;
                break;
            }
        }

        if authenticated {
            info!("Session initialized: authenticated");
        } else {
            self.with_state(|s| {
                s.access_token = None;
                s.refresh_token = None;
                s.status = SessionStatus::Unauthenticated;
            });
            if rewrite_url.is_none() && has_callback_markers(current_url) {
                warn!(
                    "SSO callback completed without a credential; \
                     stripping callback markers to avoid a redirect loop"
                );
                rewrite_url = Some(strip_callback_markers(current_url));
            }
            info!("Session initialized: unauthenticated");
        }

        self.with_state(|s| s.initialized = Some(authenticated));
        Initialized {
            authenticated,
            rewrite_url,
        }
    }

    /// Direct login with the resource-owner password grant.
    pub async fn login_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        self.with_state(|s| s.status = SessionStatus::Authenticating);
        match self.shared.endpoint.login(username, password).await {
            Ok(grant) => {
                let token = self.adopt_grant(grant)?;
                self.with_state(|s| s.initialized = Some(true));
                info!("Direct login succeeded");
                Ok(AuthUser::from_token(&token))
            }
            Err(EndpointError::InvalidGrant(description)) => {
                debug!(description = %description, "Direct login rejected");
                self.with_state(|s| s.status = SessionStatus::Unauthenticated);
                Err(AuthError::InvalidCredentials)
            }
            Err(e) => {
                warn!(error = %e, "Direct login failed");
                self.with_state(|s| s.status = SessionStatus::Unauthenticated);
                Err(AuthError::LoginFailed(e.to_string()))
            }
        }
    }

    /// Interactive login URL for the redirect SSO flow. Persists the PKCE
    /// state so the callback leg can complete the exchange after the page
    /// reloads, then hands the URL back for the host to navigate to.
    pub fn login_redirect(&self, return_path: &str) -> String {
        let verifier = pkce::verifier();
        let state = pkce::state();
        self.shared.store.save_login_state(&PendingLogin {
            state: state.clone(),
            verifier: verifier.clone(),
            return_path: return_path.to_string(),
            created_at: Utc::now(),
        });
        self.shared.endpoint.authorize_url(
            &state,
            &pkce::challenge(&verifier),
            &self.shared.config.redirect_uri,
        )
    }

    /// End the session. Remote revocation is best-effort; local state and
    /// storage are cleared unconditionally, even across a network partition.
    pub async fn logout(&self) {
        let refresh_token = self.with_state(|s| s.refresh_token.clone());
        if let Some(refresh_token) = refresh_token {
            if let Err(e) = self.shared.endpoint.logout(&refresh_token).await {
                let err = AuthError::RevocationFailed(e.to_string());
                warn!(error = %err, "Proceeding with local teardown");
            }
        }
        self.clear_local();
        // Re-arm discovery for a later initialize().
        self.with_state(|s| s.initialized = None);
        info!("Logged out");
    }

    /// A token valid under `skew_secs`, refreshing on demand. `None` when no
    /// credential is held or the refresh was rejected (state is cleared in
    /// that case; the caller must re-authenticate).
    pub(crate) async fn fresh_token(&self, skew_secs: i64) -> Option<Token> {
        let current = self.with_state(|s| s.access_token.clone());
        match current {
            None => None,
            Some(token) if !token.is_expired(skew_secs) => Some(token),
            Some(_) => self.refresh_now().await.ok(),
        }
    }

    /// Refresh through the coordinator: at most one network refresh runs
    /// regardless of how many callers arrive here concurrently.
    pub(crate) async fn refresh_now(&self) -> RefreshOutcome {
        let this = self.clone();
        self.shared
            .coordinator
            .run(move || async move { this.do_refresh().await }.boxed())
            .await
    }

    /// Proactive check used by the background scheduler.
    pub(crate) async fn refresh_if_due(&self) {
        let skew = self.shared.config.proactive_skew_secs;
        let due = self.with_state(|s| {
            s.refresh_token.is_some()
                && s.access_token
                    .as_ref()
                    .map(|t| t.is_expired(skew))
                    .unwrap_or(false)
        });
        if !due {
            return;
        }
        match self.refresh_now().await {
            Ok(_) => debug!("Proactive refresh completed"),
            Err(e) => debug!(error = %e, "Proactive refresh failed"),
        }
    }

    /// Validate and install credentials from a source. An expired or absent
    /// access token with a refresh token triggers an inline refresh.
    async fn install(&self, source: &'static str, acquired: AcquiredCredentials) -> bool {
        let token = match acquired.access_token.as_deref().map(Token::parse) {
            Some(Ok(token)) => Some(token),
            Some(Err(e)) => {
                warn!(source = source, error = %e, "Discarding malformed access token");
                None
            }
            None => None,
        };

        match token {
            Some(token) if !token.is_expired(0) => {
                self.with_state(|s| {
                    s.access_token = Some(token);
                    s.refresh_token = acquired.refresh_token.clone();
                    s.status = SessionStatus::Authenticated;
                });
                if acquired.persist {
                    self.persist();
                }
                debug!(source = source, "Credential installed");
                true
            }
            _ => match acquired.refresh_token {
                Some(refresh_token) => {
                    debug!(source = source, "Access token unusable; refreshing inline");
                    self.with_state(|s| {
                        s.access_token = None;
                        s.refresh_token = Some(refresh_token);
                    });
                    self.refresh_now().await.is_ok()
                }
                None => {
                    debug!(source = source, "Source yielded no usable credential");
                    false
                }
            },
        }
    }

    async fn do_refresh(&self) -> RefreshOutcome {
        let refresh_token = self.with_state(|s| s.refresh_token.clone());
        let Some(refresh_token) = refresh_token else {
            self.clear_local();
            return Err(Arc::new(AuthError::RefreshFailed(
                "no refresh token".to_string(),
            )));
        };

        self.with_state(|s| s.status = SessionStatus::Refreshing);
        match self.shared.endpoint.refresh(&refresh_token).await {
            Ok(grant) => match self.adopt_grant(grant) {
                Ok(token) => {
                    debug!("Token refreshed");
                    Ok(token)
                }
                Err(e) => {
                    warn!(error = %e, "Refresh produced an unusable token");
                    self.clear_local();
                    self.with_state(|s| s.status = SessionStatus::Error);
                    Err(Arc::new(e))
                }
            },
            Err(e) => {
                warn!(error = %e, "Token refresh failed; clearing session");
                self.clear_local();
                Err(Arc::new(AuthError::RefreshFailed(e.to_string())))
            }
        }
    }

    /// Install a freshly issued grant and persist it. Keeps the previous
    /// refresh token when the provider does not rotate it.
    fn adopt_grant(&self, grant: TokenGrant) -> Result<Token, AuthError> {
        let token = Token::parse(&grant.access_token)?;
        self.with_state(|s| {
            s.access_token = Some(token.clone());
            if grant.refresh_token.is_some() {
                s.refresh_token = grant.refresh_token.clone();
            }
            s.status = SessionStatus::Authenticated;
        });
        self.persist();
        Ok(token)
    }

    fn persist(&self) {
        let record = self.with_state(|s| {
            StoredCredentials::new(
                s.access_token.as_ref().map(|t| t.raw().to_string()),
                s.refresh_token.clone(),
            )
        });
        self.shared.store.save(&record);
    }

    fn clear_local(&self) {
        self.with_state(|s| {
            s.access_token = None;
            s.refresh_token = None;
            s.status = SessionStatus::Unauthenticated;
        });
        self.shared.store.clear();
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.shared.state.lock().unwrap())
    }
}
