//! Navigation guard hook.
//!
//! The router-facing seam: before every navigation the host asks the guard
//! whether to proceed. The guard drives session initialization (so the first
//! navigation performs credential discovery) and enforces authentication on
//! routes that require it. It decides, it does not navigate; carrying out a
//! redirect stays with the host.

use tracing::debug;

use crate::session::SessionManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Proceed to the requested URL.
    Allow,
    /// Navigate to this URL instead.
    Redirect(String),
}

pub struct NavigationGuard {
    session: SessionManager,
    fallback_path: String,
}

impl NavigationGuard {
    /// `fallback_path` is where unauthenticated visitors to protected routes
    /// are sent, typically the login page.
    pub fn new(session: SessionManager, fallback_path: impl Into<String>) -> Self {
        Self {
            session,
            fallback_path: fallback_path.into(),
        }
    }

    /// Gate one navigation. Always initializes the session first, so the
    /// earliest navigation of a page load runs credential discovery before
    /// any auth requirement is evaluated.
    pub async fn before_each(&self, url: &str, requires_auth: bool) -> GuardDecision {
        let init = self.session.initialize(url).await;

        // URL cleanup takes priority: a consumed handoff or callback URL must
        // never stay in the address bar, authenticated or not.
        if let Some(rewrite) = init.rewrite_url {
            debug!(to = %rewrite, "Guard redirecting to cleaned URL");
            return GuardDecision::Redirect(rewrite);
        }

        if requires_auth && !self.session.is_authenticated() {
            debug!(to = %self.fallback_path, "Unauthenticated; redirecting to fallback");
            return GuardDecision::Redirect(self.fallback_path.clone());
        }
        GuardDecision::Allow
    }
}
