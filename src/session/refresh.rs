//! Single-flight refresh coordination.
//!
//! At most one refresh operation is in flight at a time. The first caller
//! installs the operation in a shared-future slot; callers arriving before
//! completion attach to the same future and observe the identical outcome,
//! success or failure. After completion the slot is cleared so a later call
//! may retry.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use crate::auth::token::Token;
use crate::error::AuthError;

/// Outcome shared by every caller attached to one refresh operation.
pub type RefreshOutcome = Result<Token, Arc<AuthError>>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
struct Slot {
    /// Monotonic id of the currently installed operation. Clearing compares
    /// ids so a completed caller never evicts a newer operation.
    next_id: u64,
    pending: Option<(u64, SharedRefresh)>,
}

#[derive(Default)]
pub struct RefreshCoordinator {
    slot: Mutex<Slot>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a refresh, or attach to the one already in flight. `start` is
    /// invoked only when this call installs a new operation.
    pub async fn run<F>(&self, start: F) -> RefreshOutcome
    where
        F: FnOnce() -> BoxFuture<'static, RefreshOutcome>,
    {
        let (id, operation) = {
            let mut slot = self.slot.lock().unwrap();
            match slot.pending {
                Some((id, ref operation)) => (id, operation.clone()),
                None => {
                    slot.next_id += 1;
                    let id = slot.next_id;
                    let operation = start().shared();
                    slot.pending = Some((id, operation.clone()));
                    (id, operation)
                }
            }
        };

        let outcome = operation.await;

        let mut slot = self.slot.lock().unwrap();
        if slot.pending.as_ref().map(|(pending_id, _)| *pending_id) == Some(id) {
            slot.pending = None;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_token;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_refresh(
        counter: Arc<AtomicUsize>,
        succeed: bool,
    ) -> impl FnOnce() -> BoxFuture<'static, RefreshOutcome> {
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if succeed {
                    Ok(Token::parse(&make_token(300, "alice")).unwrap())
                } else {
                    Err(Arc::new(AuthError::RefreshFailed("rejected".to_string())))
                }
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_operation() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                let counter = counter.clone();
                tokio::spawn(
                    async move { coordinator.run(counting_refresh(counter, true)).await },
                )
            })
            .collect();

        let mut raws = Vec::new();
        for task in tasks {
            raws.push(task.await.unwrap().unwrap().raw().to_string());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1, "exactly one refresh ran");
        assert!(raws.windows(2).all(|w| w[0] == w[1]), "same token for all");
    }

    #[tokio::test]
    async fn test_failure_propagates_to_all_then_slot_clears() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = coordinator.clone();
                let counter = counter.clone();
                tokio::spawn(
                    async move { coordinator.run(counting_refresh(counter, false)).await },
                )
            })
            .collect();

        for task in tasks {
            let outcome = task.await.unwrap();
            assert!(matches!(*outcome.unwrap_err(), AuthError::RefreshFailed(_)));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Slot cleared: a subsequent call runs a fresh operation.
        let outcome = coordinator.run(counting_refresh(counter.clone(), true)).await;
        assert!(outcome.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sequential_calls_each_run() {
        let coordinator = RefreshCoordinator::new();
        let counter = Arc::new(AtomicUsize::new(0));

        coordinator
            .run(counting_refresh(counter.clone(), true))
            .await
            .unwrap();
        coordinator
            .run(counting_refresh(counter.clone(), true))
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
