//! Automatic reconnection and retry mechanisms
//!
//! This module owns recovery from recoverable connection failures: the
//! [`ReconnectionManager`] runs one bounded exponential-backoff retry
//! sequence at a time, and [`with_timeout`] wraps client operations with a
//! deadline.
//!
//! # Backoff
//!
//! The delay before attempt `n` (1-based) is deterministic:
//!
//! ```text
//! delay(n) = min(initial_delay * backoff_factor^(n-1), max_delay)
//! ```
//!
//! There is no jitter; [`ReconnectionManager::next_retry_delay`] previews the
//! exact value the next attempt will use.
//!
//! # Run semantics
//!
//! Once started, a run drives the whole sequence itself: a failed attempt
//! schedules the next one without the caller re-invoking anything. The run
//! ends on the first success, on cancellation, or when the attempt budget is
//! exhausted; exhaustion is the only error the run returns. A second
//! `start_reconnection` while a run is in flight is ignored with a warning,
//! so interleaved timers cannot exist.
//!
//! # Examples
//!
//! ```rust
//! use voxlink_client_core::client::recovery::ReconnectionManager;
//! use voxlink_client_core::client::config::ReconnectionPolicy;
//! use voxlink_client_core::error::ErrorKind;
//! use std::time::Duration;
//!
//! let policy = ReconnectionPolicy {
//!     enabled: true,
//!     max_attempts: 3,
//!     initial_delay: Duration::from_millis(1000),
//!     max_delay: Duration::from_millis(10_000),
//!     backoff_factor: 2.0,
//! };
//! let manager = ReconnectionManager::new(policy);
//!
//! assert!(manager.should_attempt_reconnection(ErrorKind::ConnectionFailed));
//! assert!(!manager.should_attempt_reconnection(ErrorKind::AuthenticationFailed));
//! assert_eq!(manager.next_retry_delay(), Duration::from_millis(1000));
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::client::config::{ReconnectionPolicy, ReconnectionPolicyUpdate};
use crate::error::{ClientError, ClientResult, ConnectionError, ErrorKind};

/// Failure kinds eligible for automatic reconnection.
///
/// Narrower than plain recoverability: only network-shaped failures are
/// retried automatically. A recoverable kind outside this list still requires
/// a manual retry.
const ELIGIBLE_KINDS: [ErrorKind; 4] = [
    ErrorKind::ConnectionFailed,
    ErrorKind::NetworkError,
    ErrorKind::TimeoutError,
    ErrorKind::UnknownError,
];

/// The future a retry callback produces
pub type RetryFuture = BoxFuture<'static, Result<(), ConnectionError>>;

/// Observer of a reconnection run's progress
///
/// All callbacks are awaited inline by the run: `on_reconnect_attempt` fires
/// before the attempt's delay is scheduled, `on_reconnect_failure(true)`
/// fires exactly once per run, on exhaustion.
#[async_trait]
pub trait ReconnectionObserver: Send + Sync {
    /// Attempt `attempt` was scheduled and will fire after `delay`.
    async fn on_reconnect_attempt(&self, attempt: u32, delay: Duration);

    /// The run ended with a successful connect.
    async fn on_reconnect_success(&self);

    /// An attempt failed. `terminal` is true when the budget is exhausted and
    /// the run is over.
    async fn on_reconnect_failure(&self, terminal: bool);
}

/// Owns the bounded retry loop for one connection at a time
pub struct ReconnectionManager {
    policy: RwLock<ReconnectionPolicy>,
    current_attempt: AtomicU32,
    in_flight: AtomicBool,
    cancel_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl ReconnectionManager {
    /// Create a manager with the given policy
    pub fn new(policy: ReconnectionPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
            current_attempt: AtomicU32::new(0),
            in_flight: AtomicBool::new(false),
            cancel_tx: Mutex::new(None),
        }
    }

    /// Whether a reconnection should be attempted for a failure of `kind`.
    ///
    /// True iff the policy is enabled, the kind is in the network-shaped
    /// allow-list, and the attempt budget is not exhausted.
    pub fn should_attempt_reconnection(&self, kind: ErrorKind) -> bool {
        let policy = self.policy.read();
        policy.enabled
            && ELIGIBLE_KINDS.contains(&kind)
            && self.current_attempt.load(Ordering::SeqCst) < policy.max_attempts
    }

    /// The backoff delay for a given 1-based attempt number
    pub fn delay_for_attempt(policy: &ReconnectionPolicy, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = policy.initial_delay.as_millis() as f64 * policy.backoff_factor.powi(exponent);
        Duration::from_millis(scaled as u64).min(policy.max_delay)
    }

    /// Run the bounded retry sequence.
    ///
    /// No-ops (resolving `Ok`) when the policy is disabled or the budget is
    /// already spent. Otherwise drives attempts until one succeeds, the run
    /// is cancelled, or the budget is exhausted; exhaustion is the only
    /// rejection. The attempt counter is reset when the run ends, whatever
    /// the outcome.
    pub async fn start_reconnection<F>(
        &self,
        mut retry: F,
        observer: Arc<dyn ReconnectionObserver>,
    ) -> ClientResult<()>
    where
        F: FnMut() -> RetryFuture + Send,
    {
        {
            let policy = self.policy.read();
            if !policy.enabled {
                debug!("reconnection disabled by policy, not scheduling");
                return Ok(());
            }
            if self.current_attempt.load(Ordering::SeqCst) >= policy.max_attempts {
                debug!(
                    max_attempts = policy.max_attempts,
                    "reconnection budget already spent, not scheduling"
                );
                return Ok(());
            }
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("reconnection already in flight, ignoring duplicate start");
            return Ok(());
        }
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        *self.cancel_tx.lock() = Some(cancel_tx);

        let result = loop {
            let (attempt, max_attempts, delay) = {
                let policy = self.policy.read();
                let attempt = self.current_attempt.fetch_add(1, Ordering::SeqCst) + 1;
                (attempt, policy.max_attempts, Self::delay_for_attempt(&policy, attempt))
            };
            observer.on_reconnect_attempt(attempt, delay).await;
            debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect attempt"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel_rx.changed() => {
                    debug!(attempt, "reconnection cancelled while waiting to retry");
                    break Ok(());
                }
            }
            match retry().await {
                Ok(()) => {
                    if *cancel_rx.borrow() {
                        debug!(attempt, "reconnection cancelled during retry");
                        break Ok(());
                    }
                    debug!(attempt, "reconnect attempt succeeded");
                    observer.on_reconnect_success().await;
                    break Ok(());
                }
                Err(e) => {
                    if *cancel_rx.borrow() {
                        debug!(attempt, "reconnection cancelled during retry");
                        break Ok(());
                    }
                    let terminal = attempt >= max_attempts;
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        kind = %e.kind,
                        terminal,
                        "reconnect attempt failed"
                    );
                    observer.on_reconnect_failure(terminal).await;
                    if terminal {
                        error!(attempts = attempt, "reconnection attempts exhausted");
                        break Err(ClientError::ReconnectionExhausted { attempts: attempt });
                    }
                }
            }
        };
        self.finish_run();
        result
    }

    /// Cancel any pending retry and reset the attempt counter. Safe to call
    /// when idle.
    pub fn cancel_reconnection(&self) {
        if let Some(tx) = self.cancel_tx.lock().take() {
            let _ = tx.send(true);
        }
        self.current_attempt.store(0, Ordering::SeqCst);
    }

    /// Reset the manager; same effect as [`Self::cancel_reconnection`].
    pub fn reset(&self) {
        self.cancel_reconnection();
    }

    /// Whether a retry run is currently in flight
    pub fn is_reconnecting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The attempt number of the current run, 0 when idle
    pub fn current_attempt_number(&self) -> u32 {
        self.current_attempt.load(Ordering::SeqCst)
    }

    /// The configured attempt budget
    pub fn max_attempts(&self) -> u32 {
        self.policy.read().max_attempts
    }

    /// Preview the delay the next attempt would use, without consuming it
    pub fn next_retry_delay(&self) -> Duration {
        let policy = self.policy.read();
        Self::delay_for_attempt(&policy, self.current_attempt.load(Ordering::SeqCst) + 1)
    }

    /// Merge a partial policy update. Takes effect when the next delay is
    /// computed; an already-sleeping timer keeps its scheduled delay.
    pub fn update_config(&self, update: ReconnectionPolicyUpdate) {
        self.policy.write().apply(update);
    }

    /// Snapshot of the current policy
    pub fn policy(&self) -> ReconnectionPolicy {
        self.policy.read().clone()
    }

    fn finish_run(&self) {
        self.current_attempt.store(0, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
        *self.cancel_tx.lock() = None;
    }
}

impl std::fmt::Debug for ReconnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectionManager")
            .field("policy", &*self.policy.read())
            .field("current_attempt", &self.current_attempt.load(Ordering::SeqCst))
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish()
    }
}

/// Wrap an operation with a deadline, mapping elapse to
/// [`ClientError::OperationTimeout`].
pub async fn with_timeout<T, F>(
    operation_name: &str,
    timeout: Duration,
    future: F,
) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "operation timed out"
            );
            Err(ClientError::OperationTimeout {
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}
