//! Token provider bridge for HTTP clients.
//!
//! HTTP clients must not depend on session internals; they accept an async
//! callback that yields a raw bearer token or nothing. `TokenProvider` is
//! that seam: it answers with a token valid under the on-demand skew,
//! refreshing through the session's single-flight coordinator when needed,
//! and `None` when the caller should send the request unauthenticated.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::session::SessionManager;

/// Callback shape HTTP clients accept for bearer-token injection.
pub type TokenCallback = Arc<dyn Fn() -> BoxFuture<'static, Option<String>> + Send + Sync>;

#[derive(Clone)]
pub struct TokenProvider {
    session: SessionManager,
}

impl TokenProvider {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    /// A raw token guaranteed valid for at least the on-demand skew.
    /// Unexpired tokens are handed out without any awaiting beyond lock
    /// acquisition; a token inside the skew triggers a refresh first.
    pub async fn valid_token(&self) -> Option<String> {
        let skew = self.session.config().on_demand_skew_secs;
        self.session
            .fresh_token(skew)
            .await
            .map(|token| token.raw().to_string())
    }

    /// Erase the provider into the plain callback shape.
    pub fn into_callback(self) -> TokenCallback {
        Arc::new(move || {
            let provider = self.clone();
            async move { provider.valid_token().await }.boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{CredentialStore, StoredCredentials};
    use crate::testutil::{make_token, session_with, MockEndpoint};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_no_token_when_unauthenticated() {
        let dir = TempDir::new().unwrap();
        let endpoint = Arc::new(MockEndpoint::new());
        let session = session_with(endpoint.clone(), dir.path());
        session.initialize("https://app.test/").await;

        let provider = TokenProvider::new(session);
        assert!(provider.valid_token().await.is_none());
        assert_eq!(endpoint.refresh_calls(), 0, "nothing to refresh with");
    }

    #[tokio::test]
    async fn test_unexpired_token_returned_without_refresh() {
        let dir = TempDir::new().unwrap();
        let endpoint = Arc::new(MockEndpoint::new());
        let session = session_with(endpoint.clone(), dir.path());

        let raw = make_token(600, "alice");
        CredentialStore::new(dir.path()).save(&StoredCredentials::new(
            Some(raw.clone()),
            Some("rt-1".to_string()),
        ));
        session.initialize("https://app.test/").await;

        let provider = TokenProvider::new(session);
        assert_eq!(provider.valid_token().await.as_deref(), Some(raw.as_str()));
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_callback_refreshes_token_inside_skew() {
        let dir = TempDir::new().unwrap();
        let endpoint = Arc::new(MockEndpoint::new());
        let session = session_with(endpoint.clone(), dir.path());

        // Valid now, but inside the 30s on-demand skew.
        let raw = make_token(10, "alice");
        CredentialStore::new(dir.path()).save(&StoredCredentials::new(
            Some(raw.clone()),
            Some("rt-1".to_string()),
        ));
        session.initialize("https://app.test/").await;
        assert_eq!(endpoint.refresh_calls(), 0);

        let callback = TokenProvider::new(session).into_callback();
        let token = callback().await.unwrap();
        assert_ne!(token, raw, "skewed token must be renewed before handout");
        assert_eq!(endpoint.refresh_calls(), 1);
    }
}
