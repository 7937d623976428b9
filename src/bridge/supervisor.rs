//! Per-platform connection supervision.
//!
//! Each supervisor drives one adapter through
//! `Disconnected -> Connecting -> Connected`, falls back to `Backoff` on
//! errors and ends in `Fatal` once the retry policy gives up. Timers are
//! cancellable through the stop signal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::bridge::adapter::{EventSink, PlatformAdapter};
use crate::common::error::ConnectionError;
use crate::common::messages::Platform;
use crate::common::reconnect::{ReconnectConfig, ReconnectState, RetryDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
    Fatal,
}

/// Snapshot published on every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful connect.
    pub attempts: u32,
}

/// Why a supervisor returned.
#[derive(Debug, Clone)]
pub enum SupervisorExit {
    /// `stop()` was requested.
    Stopped,
    /// The retry policy gave up.
    Fatal(ConnectionError),
}

/// Control and observation side of a supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    platform: Platform,
    stop_tx: Arc<watch::Sender<bool>>,
    status_rx: watch::Receiver<SupervisorStatus>,
}

impl SupervisorHandle {
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Ask the supervisor to disconnect and exit. Idempotent.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    pub fn attempts(&self) -> u32 {
        self.status_rx.borrow().attempts
    }
}

/// Keeps one platform adapter connected.
pub struct ConnectionSupervisor<A: PlatformAdapter + ?Sized> {
    adapter: Arc<A>,
    reconnect: ReconnectState,
    sink: EventSink,
    status_tx: watch::Sender<SupervisorStatus>,
    stop_rx: watch::Receiver<bool>,
}

impl<A: PlatformAdapter + ?Sized + 'static> ConnectionSupervisor<A> {
    pub fn new(adapter: Arc<A>, config: ReconnectConfig, sink: EventSink) -> (Self, SupervisorHandle) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(SupervisorStatus {
            state: ConnectionState::Disconnected,
            attempts: 0,
        });

        let handle = SupervisorHandle {
            platform: adapter.platform(),
            stop_tx: Arc::new(stop_tx),
            status_rx,
        };

        let supervisor = Self {
            adapter,
            reconnect: ReconnectState::new(config),
            sink,
            status_tx,
            stop_rx,
        };

        (supervisor, handle)
    }

    /// Run on a background task.
    pub fn spawn(self, handle: SupervisorHandle) -> SupervisedTask {
        SupervisedTask {
            handle,
            task: tokio::spawn(self.run()),
        }
    }

    /// Drive the state machine until stopped or fatal.
    pub async fn run(mut self) -> SupervisorExit {
        let platform = self.adapter.platform();

        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            self.publish(ConnectionState::Connecting);
            info!(%platform, attempt = self.reconnect.attempts() + 1, "Connecting");

            let adapter = Arc::clone(&self.adapter);
            let connected = tokio::select! {
                result = adapter.connect() => result,
                _ = wait_for_stop(&mut self.stop_rx) => break,
            };

            let failure = match connected {
                Ok(()) => {
                    // Counters survive until the session proves stable in `hold`.
                    self.publish(ConnectionState::Connected);
                    info!(%platform, "Connected");
                    match self.hold().await {
                        Some(error) => error,
                        None => break,
                    }
                }
                Err(error) => error,
            };

            self.adapter.disconnect().await;

            match self.reconnect.on_failure(&failure) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        %platform,
                        attempt = self.reconnect.attempts(),
                        max = self.reconnect.max_attempts(),
                        "Connection failed ({}), retrying in {:?}",
                        failure,
                        delay
                    );
                    self.publish(ConnectionState::Backoff);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = wait_for_stop(&mut self.stop_rx) => break,
                    }
                }
                RetryDecision::GiveUp => {
                    error!(
                        %platform,
                        attempts = self.reconnect.attempts(),
                        "Giving up: {}",
                        failure
                    );
                    self.publish(ConnectionState::Fatal);
                    return SupervisorExit::Fatal(failure);
                }
            }
        }

        self.adapter.disconnect().await;
        self.publish(ConnectionState::Disconnected);
        info!(%platform, "Supervisor stopped");
        SupervisorExit::Stopped
    }

    /// Stay connected until the session ends, a probe fails, or stop is
    /// requested (`None`).
    ///
    /// Failure counters are cleared only after the session has stayed up for
    /// `stable_after`; a session that dies right after the handshake counts
    /// as a failed attempt.
    async fn hold(&mut self) -> Option<ConnectionError> {
        let adapter = Arc::clone(&self.adapter);
        let listen = adapter.listen(self.sink.clone());
        tokio::pin!(listen);

        let stable = tokio::time::sleep(self.reconnect.stable_after());
        tokio::pin!(stable);
        let mut established = false;

        let mut probe = adapter.liveness_interval().map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                error = &mut listen => return Some(error),
                _ = &mut stable, if !established => {
                    established = true;
                    self.reconnect.reset();
                    self.publish(ConnectionState::Connected);
                    debug!(platform = %adapter.platform(), "Session stable");
                }
                _ = next_probe(&mut probe) => {
                    if let Err(error) = adapter.probe().await {
                        warn!(platform = %adapter.platform(), "Liveness probe failed: {}", error);
                        return Some(match error {
                            ConnectionError::AuthRejected { .. }
                            | ConnectionError::RateLimited { .. } => error,
                            other => ConnectionError::ProbeFailed {
                                message: other.to_string(),
                            },
                        });
                    }
                }
                _ = wait_for_stop(&mut self.stop_rx) => return None,
            }
        }
    }

    fn publish(&self, state: ConnectionState) {
        self.status_tx.send_replace(SupervisorStatus {
            state,
            attempts: self.reconnect.attempts(),
        });
    }
}

/// Resolves once stop is requested. Pends forever if every handle is gone.
async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn next_probe(probe: &mut Option<Interval>) {
    match probe {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// A supervisor running on its own task.
pub struct SupervisedTask {
    pub handle: SupervisorHandle,
    task: JoinHandle<SupervisorExit>,
}

/// How a supervised pair ended.
#[derive(Debug, Clone)]
pub enum PairOutcome {
    /// A shutdown signal (or a clean stop) ended both sides.
    Shutdown,
    /// One side became fatal; the other was stopped.
    Fatal {
        platform: Platform,
        error: ConnectionError,
    },
}

/// Wait for `shutdown` or for either supervisor to exit, then stop both.
///
/// Supervisors still running after `grace` are aborted.
pub async fn supervise_pair<F>(
    mut first: SupervisedTask,
    mut second: SupervisedTask,
    shutdown: F,
    grace: Duration,
) -> PairOutcome
where
    F: Future<Output = ()>,
{
    let mut first_done = false;
    let mut second_done = false;

    let outcome = tokio::select! {
        _ = shutdown => {
            info!("Shutdown requested");
            PairOutcome::Shutdown
        }
        exit = &mut first.task => {
            first_done = true;
            exit_outcome(first.handle.platform(), exit)
        }
        exit = &mut second.task => {
            second_done = true;
            exit_outcome(second.handle.platform(), exit)
        }
    };

    if let PairOutcome::Fatal { platform, .. } = &outcome {
        let attempts = if first.handle.platform() == *platform {
            first.handle.attempts()
        } else {
            second.handle.attempts()
        };
        error!(
            %platform,
            attempts,
            "Supervisor is fatal, shutting down {}",
            platform.opposite()
        );
    }

    first.handle.stop();
    second.handle.stop();

    let finish = async {
        if !first_done {
            let _ = (&mut first.task).await;
        }
        if !second_done {
            let _ = (&mut second.task).await;
        }
    };

    if tokio::time::timeout(grace, finish).await.is_err() {
        warn!(
            "Supervisors did not stop within {:?} ({}: {:?}, {}: {:?}), aborting",
            grace,
            first.handle.platform(),
            first.handle.state(),
            second.handle.platform(),
            second.handle.state()
        );
        first.task.abort();
        second.task.abort();
    }

    outcome
}

fn exit_outcome(
    platform: Platform,
    exit: Result<SupervisorExit, tokio::task::JoinError>,
) -> PairOutcome {
    match exit {
        Ok(SupervisorExit::Stopped) => PairOutcome::Shutdown,
        Ok(SupervisorExit::Fatal(error)) => PairOutcome::Fatal { platform, error },
        Err(join_error) => PairOutcome::Fatal {
            platform,
            error: ConnectionError::SessionDropped {
                message: format!("supervisor task failed: {}", join_error),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use serenity::async_trait;
    use tokio::sync::mpsc;

    use super::*;

    struct MockAdapter {
        platform: Platform,
        /// Connect calls that fail before connects start succeeding.
        failing_connects: u32,
        /// Error returned by listen after `listen_for`; `None` listens forever.
        listen_error: Option<ConnectionError>,
        listen_for: Duration,
        liveness: Option<Duration>,
        probe_fails: AtomicBool,
        connects: AtomicU32,
        disconnects: AtomicU32,
    }

    impl MockAdapter {
        fn new(platform: Platform) -> Self {
            Self {
                platform,
                failing_connects: 0,
                listen_error: None,
                listen_for: Duration::ZERO,
                liveness: None,
                probe_fails: AtomicBool::new(false),
                connects: AtomicU32::new(0),
                disconnects: AtomicU32::new(0),
            }
        }

        fn connects(&self) -> u32 {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlatformAdapter for MockAdapter {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn connect(&self) -> Result<(), ConnectionError> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failing_connects {
                return Err(ConnectionError::Network {
                    message: format!("refused #{}", n),
                });
            }
            Ok(())
        }

        async fn listen(&self, _sink: EventSink) -> ConnectionError {
            match &self.listen_error {
                Some(error) => {
                    if !self.listen_for.is_zero() {
                        tokio::time::sleep(self.listen_for).await;
                    }
                    error.clone()
                }
                None => std::future::pending().await,
            }
        }

        fn liveness_interval(&self) -> Option<Duration> {
            self.liveness
        }

        async fn probe(&self) -> Result<(), ConnectionError> {
            if self.probe_fails.load(Ordering::SeqCst) {
                return Err(ConnectionError::Network {
                    message: "getMe timed out".to_string(),
                });
            }
            Ok(())
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            max_attempts,
            max_auth_failures: 2,
            jitter: false,
            stable_after: Duration::from_millis(20),
        }
    }

    fn supervisor(
        adapter: Arc<MockAdapter>,
        max_attempts: u32,
    ) -> (ConnectionSupervisor<MockAdapter>, SupervisorHandle) {
        let (sink, _events) = mpsc::unbounded_channel();
        ConnectionSupervisor::new(adapter, config(max_attempts), sink)
    }

    async fn wait_for_status<F>(handle: &SupervisorHandle, accept: F)
    where
        F: FnMut(&SupervisorStatus) -> bool,
    {
        let mut status = handle.status_rx.clone();
        tokio::time::timeout(Duration::from_secs(5), status.wait_for(accept))
            .await
            .expect("timed out waiting for state")
            .expect("supervisor dropped");
    }

    async fn wait_until(handle: &SupervisorHandle, state: ConnectionState) {
        wait_for_status(handle, |s| s.state == state).await;
    }

    async fn wait_for_connects(adapter: &MockAdapter, n: u32) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while adapter.connects() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("timed out waiting for reconnects");
    }

    #[test]
    fn test_wait_for_stop_pends_until_stopped() {
        let (tx, mut rx) = watch::channel(false);
        let mut wait = tokio_test::task::spawn(async move { wait_for_stop(&mut rx).await });

        tokio_test::assert_pending!(wait.poll());
        tx.send_replace(true);
        assert!(wait.is_woken());
        tokio_test::assert_ready!(wait.poll());
    }

    #[test]
    fn test_wait_for_stop_without_handles_never_fires() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let mut wait = tokio_test::task::spawn(async move { wait_for_stop(&mut rx).await });

        tokio_test::assert_pending!(wait.poll());
    }

    #[tokio::test]
    async fn test_fatal_after_max_attempts() {
        let adapter = Arc::new(MockAdapter {
            failing_connects: u32::MAX,
            ..MockAdapter::new(Platform::Telegram)
        });
        let (supervisor, handle) = supervisor(adapter.clone(), 3);

        let exit = supervisor.run().await;

        assert!(matches!(exit, SupervisorExit::Fatal(ConnectionError::Network { .. })));
        assert_eq!(adapter.connects(), 3);
        assert_eq!(handle.state(), ConnectionState::Fatal);
        assert_eq!(handle.attempts(), 3);
    }

    #[tokio::test]
    async fn test_stop_twice_is_harmless() {
        let adapter = Arc::new(MockAdapter::new(Platform::Discord));
        let (supervisor, handle) = supervisor(adapter.clone(), 3);
        let task = tokio::spawn(supervisor.run());

        wait_until(&handle, ConnectionState::Connected).await;
        handle.stop();
        handle.stop();

        let exit = task.await.unwrap();
        assert!(matches!(exit, SupervisorExit::Stopped));
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert!(adapter.disconnects.load(Ordering::SeqCst) >= 1);
        handle.stop();
    }

    #[tokio::test]
    async fn test_success_resets_attempts() {
        let adapter = Arc::new(MockAdapter {
            failing_connects: 2,
            ..MockAdapter::new(Platform::Discord)
        });
        let (supervisor, handle) = supervisor(adapter.clone(), 3);
        let task = tokio::spawn(supervisor.run());

        wait_until(&handle, ConnectionState::Connected).await;
        assert_eq!(adapter.connects(), 3);

        // Cleared only once the session has held for `stable_after`.
        wait_for_status(&handle, |s| s.state == ConnectionState::Connected && s.attempts == 0)
            .await;

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_session_rejected_after_handshake_is_fatal() {
        let adapter = Arc::new(MockAdapter {
            listen_error: Some(ConnectionError::AuthRejected {
                message: "Disallowed intent(s)".to_string(),
            }),
            ..MockAdapter::new(Platform::Discord)
        });
        let (supervisor, handle) = supervisor(adapter.clone(), 3);

        let exit = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .expect("supervisor never gave up");

        assert!(matches!(exit, SupervisorExit::Fatal(ConnectionError::AuthRejected { .. })));
        assert_eq!(adapter.connects(), 2);
        assert_eq!(handle.state(), ConnectionState::Fatal);
    }

    #[tokio::test]
    async fn test_sessions_dropping_after_handshake_exhaust_attempts() {
        let adapter = Arc::new(MockAdapter {
            listen_error: Some(ConnectionError::SessionDropped {
                message: "Conflict: terminated by other getUpdates request".to_string(),
            }),
            ..MockAdapter::new(Platform::Telegram)
        });
        let (supervisor, handle) = supervisor(adapter.clone(), 3);

        let exit = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
            .await
            .expect("supervisor never gave up");

        assert!(matches!(exit, SupervisorExit::Fatal(ConnectionError::SessionDropped { .. })));
        assert_eq!(adapter.connects(), 3);
        assert_eq!(handle.attempts(), 3);
    }

    #[tokio::test]
    async fn test_stable_sessions_do_not_accumulate() {
        let adapter = Arc::new(MockAdapter {
            listen_error: Some(ConnectionError::SessionDropped {
                message: "resume failed".to_string(),
            }),
            listen_for: Duration::from_millis(40),
            ..MockAdapter::new(Platform::Discord)
        });
        let (supervisor, handle) = supervisor(adapter.clone(), 2);
        let task = tokio::spawn(supervisor.run());

        wait_for_connects(&adapter, 4).await;
        assert_ne!(handle.state(), ConnectionState::Fatal);

        handle.stop();
        assert!(matches!(task.await.unwrap(), SupervisorExit::Stopped));
    }

    #[tokio::test]
    async fn test_probe_failure_reconnects() {
        let adapter = Arc::new(MockAdapter {
            liveness: Some(Duration::from_millis(5)),
            ..MockAdapter::new(Platform::Telegram)
        });
        adapter.probe_fails.store(true, Ordering::SeqCst);
        let (supervisor, handle) = supervisor(adapter.clone(), 10);
        let task = tokio::spawn(supervisor.run());

        wait_for_connects(&adapter, 2).await;
        assert!(adapter.disconnects.load(Ordering::SeqCst) >= 1);

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_fatal_side_stops_peer() {
        let broken = Arc::new(MockAdapter {
            failing_connects: u32::MAX,
            ..MockAdapter::new(Platform::Telegram)
        });
        let healthy = Arc::new(MockAdapter::new(Platform::Discord));

        let (a, a_handle) = supervisor(healthy.clone(), 3);
        let (b, b_handle) = supervisor(broken.clone(), 2);
        let peer = a_handle.clone();

        let outcome = supervise_pair(
            a.spawn(a_handle),
            b.spawn(b_handle),
            std::future::pending::<()>(),
            Duration::from_secs(5),
        )
        .await;

        match outcome {
            PairOutcome::Fatal { platform, .. } => assert_eq!(platform, Platform::Telegram),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(peer.state(), ConnectionState::Disconnected);
        assert_eq!(broken.connects(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_both() {
        let (a, a_handle) = supervisor(Arc::new(MockAdapter::new(Platform::Discord)), 3);
        let (b, b_handle) = supervisor(Arc::new(MockAdapter::new(Platform::Telegram)), 3);
        let (a_peer, b_peer) = (a_handle.clone(), b_handle.clone());

        let outcome = supervise_pair(
            a.spawn(a_handle),
            b.spawn(b_handle),
            tokio::time::sleep(Duration::from_millis(20)),
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(outcome, PairOutcome::Shutdown));
        assert_eq!(a_peer.state(), ConnectionState::Disconnected);
        assert_eq!(b_peer.state(), ConnectionState::Disconnected);
    }
}
