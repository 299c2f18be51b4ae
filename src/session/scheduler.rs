//! Background refresh scheduler.
//!
//! Ticks on a fixed interval and asks the session to renew tokens that will
//! expire within the proactive skew, so an idle session stays warm and no
//! request has to pay refresh latency. Refreshes go through the same
//! single-flight coordinator as on-demand refreshes, so a tick overlapping a
//! request-triggered refresh attaches to it instead of racing it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::SessionManager;

/// Handle to the background refresh task. Dropping it stops the task.
pub struct RefreshScheduler {
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Start the periodic check loop for a session.
    pub fn spawn(session: SessionManager) -> Self {
        let period = Duration::from_secs(session.config().check_interval_secs);
        let handle = tokio::spawn(async move {
            debug!(period_secs = period.as_secs(), "Background refresh scheduler started");
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; skip it so startup does not
            // race session initialization.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                session.refresh_if_due().await;
            }
        });
        Self { handle }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{CredentialStore, StoredCredentials};
    use crate::testutil::{make_token, session_with, MockEndpoint};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_renews_token_inside_proactive_skew() {
        let dir = TempDir::new().unwrap();
        let endpoint = Arc::new(MockEndpoint::new());
        let session = session_with(endpoint.clone(), dir.path());

        // Valid now but expiring inside the 60s proactive skew.
        let store = CredentialStore::new(dir.path());
        store.save(&StoredCredentials::new(
            Some(make_token(30, "alice")),
            Some("rt-1".to_string()),
        ));
        session.initialize("https://app.test/").await;
        assert_eq!(endpoint.refresh_calls(), 0);

        let scheduler = RefreshScheduler::spawn(session.clone());
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(endpoint.refresh_calls(), 1);
        assert!(session.is_authenticated());

        // The renewed token is outside the skew; further ticks do nothing.
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(endpoint.refresh_calls(), 1);
        drop(scheduler);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_idles_without_credentials() {
        let dir = TempDir::new().unwrap();
        let endpoint = Arc::new(MockEndpoint::new());
        let session = session_with(endpoint.clone(), dir.path());
        session.initialize("https://app.test/").await;

        let _scheduler = RefreshScheduler::spawn(session);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(endpoint.refresh_calls(), 0);
    }
}
