//! Single-flight credential refresh.
//!
//! However many calls observe auth expiry at once, the refresh action runs
//! once. The first caller flips the state to `Refreshing` and spawns the
//! action on its own task; every caller, the first one included, parks as a
//! waiter on a one-shot slot. When the action finishes, the state returns to
//! `Idle` and every parked waiter is resolved with the same result in one
//! critical section.
//!
//! Because the action runs on its own task, cancelling any caller only
//! removes that caller's waiter; the refresh and the other waiters are
//! unaffected. If the action panics, a drop guard on the task resolves the
//! waiters with [`RefreshFailure::Abandoned`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use super::CredentialRefresher;
use crate::error::{NetworkError, RefreshFailure};
use crate::utils::CancelHandle;

type WaiterSlot = oneshot::Sender<Result<(), NetworkError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Refreshing,
}

#[derive(Debug)]
struct RefreshState {
    phase: Phase,
    waiters: Vec<(u64, WaiterSlot)>,
    next_waiter: u64,
    /// Number of successful refreshes so far.
    epoch: u64,
}

struct Shared {
    refresher: Option<Arc<dyn CredentialRefresher>>,
    state: Mutex<RefreshState>,
    invocations: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Back to `Idle`, resolving every waiter with `result`.
    fn complete(&self, result: Result<(), NetworkError>) {
        let mut state = self.lock();
        state.phase = Phase::Idle;
        if result.is_ok() {
            state.epoch += 1;
        }
        let waiters = std::mem::take(&mut state.waiters);
        tracing::debug!(target: "callwire::auth", ok = result.is_ok(), waiters = waiters.len(), epoch = state.epoch, "credential refresh finished");
        for (_, slot) in waiters {
            // A closed slot belongs to a waiter that already gave up.
            let _ = slot.send(result.clone());
        }
    }
}

/// Coordinates credential refreshes for one client.
#[derive(Clone)]
pub struct TokenRefreshCoordinator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TokenRefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TokenRefreshCoordinator")
            .field("configured", &self.shared.refresher.is_some())
            .field("phase", &state.phase)
            .field("waiters", &state.waiters.len())
            .field("epoch", &state.epoch)
            .finish()
    }
}

impl TokenRefreshCoordinator {
    pub fn new(refresher: Option<Arc<dyn CredentialRefresher>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                refresher,
                state: Mutex::new(RefreshState {
                    phase: Phase::Idle,
                    waiters: Vec::new(),
                    next_waiter: 0,
                    epoch: 0,
                }),
                invocations: AtomicU64::new(0),
            }),
        }
    }

    /// A coordinator without a refresh action; every refresh fails with
    /// [`RefreshFailure::NotConfigured`].
    pub fn unconfigured() -> Self {
        Self::new(None)
    }

    pub fn is_configured(&self) -> bool {
        self.shared.refresher.is_some()
    }

    /// Number of successful refreshes. Capture it before sending a request
    /// and pass it to [`ensure_fresh_credential_since`](Self::ensure_fresh_credential_since).
    pub fn epoch(&self) -> u64 {
        self.shared.lock().epoch
    }

    pub fn is_refreshing(&self) -> bool {
        self.shared.lock().phase == Phase::Refreshing
    }

    /// Callers currently parked on the in-flight refresh.
    pub fn waiter_count(&self) -> usize {
        self.shared.lock().waiters.len()
    }

    /// How many times the refresh action has been started.
    pub fn refresh_count(&self) -> u64 {
        self.shared.invocations.load(Ordering::SeqCst)
    }

    /// Make sure a refresh runs (or join the one in flight) and wait for it.
    pub async fn ensure_fresh_credential(&self, cancel: &CancelHandle) -> Result<(), NetworkError> {
        self.refresh(None, cancel).await
    }

    /// Like [`ensure_fresh_credential`](Self::ensure_fresh_credential), but
    /// returns at once if a refresh succeeded after `epoch` was observed.
    ///
    /// A request sent with a credential that has since been replaced does not
    /// need another refresh; it only needs to be resent.
    pub async fn ensure_fresh_credential_since(
        &self,
        epoch: u64,
        cancel: &CancelHandle,
    ) -> Result<(), NetworkError> {
        self.refresh(Some(epoch), cancel).await
    }

    async fn refresh(&self, seen: Option<u64>, cancel: &CancelHandle) -> Result<(), NetworkError> {
        let Some(refresher) = self.shared.refresher.clone() else {
            return Err(NetworkError::CredentialRefreshFailed(
                RefreshFailure::NotConfigured,
            ));
        };
        if cancel.is_cancelled() {
            return Err(NetworkError::Cancelled);
        }

        let (tx, rx) = oneshot::channel();
        let (id, start) = {
            let mut state = self.shared.lock();
            if seen.is_some_and(|seen| state.epoch > seen) {
                return Ok(());
            }
            let id = state.next_waiter;
            state.next_waiter += 1;
            state.waiters.push((id, tx));
            let start = state.phase == Phase::Idle;
            if start {
                state.phase = Phase::Refreshing;
            }
            (id, start)
        };

        if start {
            self.spawn_refresh(refresher);
        } else {
            tracing::debug!(target: "callwire::auth", waiter = id, "joining in-flight credential refresh");
        }

        let _guard = WaiterGuard {
            shared: &self.shared,
            id,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NetworkError::Cancelled),
            result = rx => result.unwrap_or(Err(NetworkError::CredentialRefreshFailed(RefreshFailure::Abandoned))),
        }
    }

    fn spawn_refresh(&self, refresher: Arc<dyn CredentialRefresher>) {
        let shared = Arc::clone(&self.shared);
        let run = shared.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(target: "callwire::auth", run, "starting credential refresh");
        tokio::spawn(async move {
            let mut driver = DriverGuard {
                shared,
                finished: false,
            };
            let result = refresher.refresh().await.map_err(|e| match e {
                NetworkError::CredentialRefreshFailed(_) => e,
                other => NetworkError::CredentialRefreshFailed(RefreshFailure::Failed(other.to_string())),
            });
            if let Err(e) = &result {
                tracing::warn!(target: "callwire::auth", err = %e, "credential refresh failed");
            }
            driver.finish(result);
        });
    }
}

/// Resolves waiters even if the refresh task unwinds.
struct DriverGuard {
    shared: Arc<Shared>,
    finished: bool,
}

impl DriverGuard {
    fn finish(&mut self, result: Result<(), NetworkError>) {
        self.finished = true;
        self.shared.complete(result);
    }
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.complete(Err(NetworkError::CredentialRefreshFailed(
                RefreshFailure::Abandoned,
            )));
        }
    }
}

/// Removes a waiter that stops waiting before it is resolved.
struct WaiterGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.waiters.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::refresh_fn;
    use std::time::Duration;

    #[tokio::test]
    async fn not_configured_fails_without_state_change() {
        let coordinator = TokenRefreshCoordinator::unconfigured();
        let err = coordinator
            .ensure_fresh_credential(&CancelHandle::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NetworkError::CredentialRefreshFailed(RefreshFailure::NotConfigured)
        );
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.epoch(), 0);
    }

    #[tokio::test]
    async fn success_advances_the_epoch() {
        let coordinator = TokenRefreshCoordinator::new(Some(refresh_fn(|| async { Ok(()) })));
        coordinator
            .ensure_fresh_credential(&CancelHandle::new())
            .await
            .unwrap();
        assert_eq!(coordinator.epoch(), 1);
        assert_eq!(coordinator.refresh_count(), 1);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn stale_epoch_skips_the_refresh() {
        let coordinator = TokenRefreshCoordinator::new(Some(refresh_fn(|| async { Ok(()) })));
        let seen = coordinator.epoch();
        coordinator
            .ensure_fresh_credential(&CancelHandle::new())
            .await
            .unwrap();

        coordinator
            .ensure_fresh_credential_since(seen, &CancelHandle::new())
            .await
            .unwrap();
        assert_eq!(coordinator.refresh_count(), 1);

        coordinator
            .ensure_fresh_credential_since(coordinator.epoch(), &CancelHandle::new())
            .await
            .unwrap();
        assert_eq!(coordinator.refresh_count(), 2);
    }

    #[tokio::test]
    async fn failure_is_wrapped_and_leaves_the_epoch() {
        let coordinator = TokenRefreshCoordinator::new(Some(refresh_fn(|| async {
            Err(NetworkError::status(400, "invalid_grant"))
        })));
        let err = coordinator
            .ensure_fresh_credential(&CancelHandle::new())
            .await
            .unwrap_err();
        assert!(err.is_refresh_failure());
        assert_eq!(coordinator.epoch(), 0);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn panicking_refresh_resolves_waiters() {
        let coordinator = TokenRefreshCoordinator::new(Some(refresh_fn(|| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let explode = true;
            if explode {
                panic!("refresh blew up");
            }
            Ok(())
        })));
        let err = coordinator
            .ensure_fresh_credential(&CancelHandle::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NetworkError::CredentialRefreshFailed(RefreshFailure::Abandoned)
        );
        assert!(!coordinator.is_refreshing());
    }
}
