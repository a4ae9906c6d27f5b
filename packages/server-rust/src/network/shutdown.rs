//! Lifecycle state for the HTTP server: health, in-flight requests, and
//! the shutdown signal shared with `axum::serve`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

/// Server health, reported by `/health` and gating `/health/ready`.
///
/// Transitions only move forward: Starting -> Ready -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Ready,
    Draining,
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinates graceful shutdown of the server.
///
/// `trigger_shutdown` moves to `Draining` and cancels the token that the
/// serve loop waits on; `wait_for_drain` then blocks until every
/// [`InFlightGuard`] is dropped or the timeout passes.
#[derive(Debug)]
pub struct ShutdownController {
    token: CancellationToken,
    in_flight: Arc<AtomicU64>,
    health: ArcSwap<HealthState>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            in_flight: Arc::new(AtomicU64::new(0)),
            health: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    pub fn set_ready(&self) {
        if self.health_state() == HealthState::Starting {
            self.health.store(Arc::new(HealthState::Ready));
        }
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health.load()
    }

    /// Moves to `Draining` and wakes everything awaiting [`Self::shutdown_signal`].
    pub fn trigger_shutdown(&self) {
        if matches!(self.health_state(), HealthState::Starting | HealthState::Ready) {
            self.health.store(Arc::new(HealthState::Draining));
        }
        self.token.cancel();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been triggered.
    pub fn shutdown_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        self.token.clone().cancelled_owned()
    }

    /// Counts one request as in flight until the guard drops, unwinding included.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Polls the in-flight count until it hits zero or `timeout` passes.
    ///
    /// Returns `true` and moves to `Stopped` on a clean drain. On timeout the
    /// state stays `Draining`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.in_flight_count() == 0 {
                self.health.store(Arc::new(HealthState::Stopped));
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_state_machine_forward_only() {
        let ctrl = ShutdownController::new();
        assert_eq!(ctrl.health_state(), HealthState::Starting);

        ctrl.set_ready();
        assert_eq!(ctrl.health_state(), HealthState::Ready);

        ctrl.trigger_shutdown();
        assert_eq!(ctrl.health_state(), HealthState::Draining);
        assert!(ctrl.is_shutting_down());

        // No way back to ready once draining.
        ctrl.set_ready();
        assert_eq!(ctrl.health_state(), HealthState::Draining);
    }

    #[test]
    fn state_names() {
        assert_eq!(HealthState::Starting.as_str(), "starting");
        assert_eq!(HealthState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn guards_count_in_flight_requests() {
        let ctrl = ShutdownController::new();
        let a = ctrl.in_flight_guard();
        let b = ctrl.in_flight_guard();
        assert_eq!(ctrl.in_flight_count(), 2);

        drop(a);
        assert_eq!(ctrl.in_flight_count(), 1);
        drop(b);
        assert_eq!(ctrl.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_signal_resolves_after_trigger() {
        let ctrl = Arc::new(ShutdownController::new());
        let signal = ctrl.shutdown_signal();

        let trigger = Arc::clone(&ctrl);
        tokio::spawn(async move { trigger.trigger_shutdown() });

        tokio::time::timeout(Duration::from_secs(1), signal)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn drain_waits_for_guards() {
        let ctrl = ShutdownController::new();
        ctrl.set_ready();
        let guard = ctrl.in_flight_guard();
        ctrl.trigger_shutdown();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(guard);
        });

        assert!(ctrl.wait_for_drain(Duration::from_secs(2)).await);
        assert_eq!(ctrl.health_state(), HealthState::Stopped);
        release.await.unwrap();
    }

    #[tokio::test]
    async fn drain_times_out_and_stays_draining() {
        let ctrl = ShutdownController::new();
        let _guard = ctrl.in_flight_guard();
        ctrl.trigger_shutdown();

        assert!(!ctrl.wait_for_drain(Duration::from_millis(30)).await);
        assert_eq!(ctrl.health_state(), HealthState::Draining);
    }
}
