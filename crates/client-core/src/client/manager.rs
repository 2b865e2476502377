//! Connection manager - the state machine of record
//!
//! [`ConnectionManager`] owns the lifecycle of a single logical call session:
//! it gates every status transition, mediates the microphone-permission
//! prerequisite, drives the external SDK, and integrates the
//! [`ReconnectionManager`] when a recoverable failure needs automatic
//! recovery.
//!
//! # Command surface
//!
//! - [`ConnectionManager::start`] - permission gate, then SDK connect
//! - [`ConnectionManager::stop`] - tear down, cancelling any retry sequence
//! - [`ConnectionManager::toggle_call`] - start/stop from UI affordances
//! - [`ConnectionManager::retry`] - manual immediate retry, bypassing backoff
//! - [`ConnectionManager::cancel_reconnection`] - abandon an automatic retry
//! - [`ConnectionManager::clear_error`] - drop the recorded failure
//!
//! Status is mutated only here, in response to commands, SDK events, and
//! reconnection callbacks; everything runs on the async runtime with no
//! parallel writers per instance.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::config::ClientConfig;
use crate::client::recovery::{
    with_timeout, ReconnectionManager, ReconnectionObserver, RetryFuture,
};
use crate::client::types::{CallId, ClientStats, ConnectionStatus};
use crate::error::{ClientError, ClientResult, ConnectionError, ErrorKind};
use crate::events::{
    ClientEvent, ClientEventHandler, EventPriority, Notification, NoticeLevel, StatusChangeInfo,
};
use crate::permission::{MicrophonePermission, PermissionState};
use crate::session::VoiceSession;

/// Capacity of the broadcast event channel
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// The single source of truth for the connection lifecycle
pub struct ConnectionManager {
    pub(crate) config: RwLock<ClientConfig>,
    pub(crate) session: Arc<dyn VoiceSession>,
    pub(crate) permission: Arc<dyn MicrophonePermission>,
    pub(crate) reconnection: Arc<ReconnectionManager>,
    pub(crate) status: RwLock<ConnectionStatus>,
    pub(crate) last_error: RwLock<Option<ConnectionError>>,
    pub(crate) call_id: RwLock<Option<CallId>>,
    pub(crate) event_handler: RwLock<Option<Arc<dyn ClientEventHandler>>>,
    pub(crate) event_tx: broadcast::Sender<ClientEvent>,
    pub(crate) events_wired: AtomicBool,
    pub(crate) countdown: Mutex<Option<JoinHandle<()>>>,
    pub(crate) total_calls: AtomicU64,
    pub(crate) reconnect_attempts: AtomicU64,
    pub(crate) reconnect_successes: AtomicU64,
    weak_self: Weak<ConnectionManager>,
}

impl ConnectionManager {
    /// Create a manager and wire it to the session's event stream.
    ///
    /// The event subscription is registered exactly once here; a manager
    /// never re-subscribes, so SDK events cannot be double-handled.
    pub async fn new(
        config: ClientConfig,
        session: Arc<dyn VoiceSession>,
        permission: Arc<dyn MicrophonePermission>,
    ) -> ClientResult<Arc<Self>> {
        config.validate()?;
        let reconnection = Arc::new(ReconnectionManager::new(config.reconnection.clone()));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let manager = Arc::new_cyclic(|weak| Self {
            config: RwLock::new(config),
            session,
            permission,
            reconnection,
            status: RwLock::new(ConnectionStatus::Inactive),
            last_error: RwLock::new(None),
            call_id: RwLock::new(None),
            event_handler: RwLock::new(None),
            event_tx,
            events_wired: AtomicBool::new(false),
            countdown: Mutex::new(None),
            total_calls: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            reconnect_successes: AtomicU64::new(0),
            weak_self: weak.clone(),
        });
        manager.wire_session_events();
        info!("connection manager created");
        Ok(manager)
    }

    /// Start a call session.
    ///
    /// Checks the microphone permission first: a pending decision prompts the
    /// user, and a denial settles in `PermissionDenied` without ever touching
    /// the SDK. With permission granted, resolves the assistant id (config or
    /// environment; absence is a fatal configuration error that is never
    /// auto-retried) and invokes the SDK connect under the configured
    /// deadline. `Active` status arrives via the SDK's call-start event.
    pub async fn start(&self) -> ClientResult<()> {
        {
            let status = self.status.read().await;
            match &*status {
                ConnectionStatus::Active { .. } => {
                    return Err(ClientError::invalid_state("call already active"));
                }
                ConnectionStatus::Loading | ConnectionStatus::Reconnecting { .. } => {
                    return Err(ClientError::invalid_state("connect already in progress"));
                }
                _ => {}
            }
        }

        match self.permission.query().await {
            PermissionState::Granted => {}
            PermissionState::Denied => {
                return self.deny_permission().await;
            }
            PermissionState::Prompt => {
                self.set_status(ConnectionStatus::PermissionRequired, None).await;
                match self.permission.request().await {
                    PermissionState::Granted => {}
                    _ => return self.deny_permission().await,
                }
            }
        }

        let (assistant_id, connect_timeout) = {
            let config = self.config.read().await;
            (config.resolved_assistant_id(), config.connect_timeout)
        };
        let Some(assistant_id) = assistant_id else {
            let err = ConnectionError::new(
                ErrorKind::UnknownError,
                "missing assistant configuration",
            );
            *self.last_error.write().await = Some(err.clone());
            self.set_status(
                ConnectionStatus::Error(err),
                Some("missing configuration".to_string()),
            )
            .await;
            self.notify(NoticeLevel::Error, "The voice assistant is not configured").await;
            return Err(ClientError::missing_config("assistant_id"));
        };

        *self.call_id.write().await = Some(Uuid::new_v4());
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Loading, None).await;
        info!(assistant_id = %assistant_id, "starting call session");

        let result = Self::connect_once(
            Arc::clone(&self.session),
            assistant_id,
            connect_timeout,
        )
        .await;
        if let Err(err) = result {
            self.fail_with(err.clone()).await;
            return Err(ClientError::Connection(err));
        }
        Ok(())
    }

    /// Stop the session.
    ///
    /// Cancels any in-flight reconnection and countdown, then tears the SDK
    /// session down. An SDK failure during teardown is classified and
    /// surfaced as an error state. When invoked while already in `Error` the
    /// error status is preserved; otherwise the manager settles in `Inactive`.
    pub async fn stop(&self) -> ClientResult<()> {
        info!("stopping call session");
        self.reconnection.cancel_reconnection();
        self.stop_countdown();

        let was_error = { matches!(&*self.status.read().await, ConnectionStatus::Error(_)) };
        let result = self.session.disconnect().await;
        *self.call_id.write().await = None;
        match result {
            Ok(()) => {
                if !was_error {
                    self.set_status(ConnectionStatus::Inactive, Some("stopped".to_string())).await;
                }
                Ok(())
            }
            Err(failure) => {
                let err = ConnectionError::classify(&failure);
                error!(error = %err, "SDK stop failed");
                *self.last_error.write().await = Some(err.clone());
                self.set_status(
                    ConnectionStatus::Error(err.clone()),
                    Some("stop failed".to_string()),
                )
                .await;
                self.notify(NoticeLevel::Error, err.kind.user_message()).await;
                Err(ClientError::Connection(err))
            }
        }
    }

    /// Toggle the call: stop when active, start when inactive or errored.
    /// A no-op while loading, reconnecting, or mid permission flow.
    pub async fn toggle_call(&self) -> ClientResult<()> {
        let status = { self.status.read().await.clone() };
        match status {
            ConnectionStatus::Active { .. } => self.stop().await,
            ConnectionStatus::Inactive | ConnectionStatus::Error(_) => self.start().await,
            other => {
                debug!(status = other.name(), "toggle ignored in current state");
                Ok(())
            }
        }
    }

    /// Manual recovery: immediately start again, bypassing backoff. A
    /// recorded non-recoverable error is cleared first.
    pub async fn retry(&self) -> ClientResult<()> {
        let stale_terminal = {
            self.last_error
                .read()
                .await
                .as_ref()
                .map(|err| !err.is_recoverable())
                .unwrap_or(false)
        };
        if stale_terminal {
            self.clear_error().await;
        }
        self.start().await
    }

    /// Clear the recorded error without changing the connection status.
    pub async fn clear_error(&self) {
        *self.last_error.write().await = None;
    }

    /// Abandon an in-flight automatic retry sequence.
    ///
    /// Clears the pending timer and the countdown, then settles in `Error`
    /// when a prior failure is recorded, else `Inactive`. A no-op when no
    /// reconnection is underway.
    pub async fn cancel_reconnection(&self) {
        let status_reconnecting = self.status.read().await.is_reconnecting();
        if !self.reconnection.is_reconnecting() && !status_reconnecting {
            debug!("cancel requested with no reconnection in flight");
            return;
        }
        self.reconnection.cancel_reconnection();
        self.stop_countdown();
        let prior_error = self.last_error.read().await.clone();
        let next = match prior_error {
            Some(err) => ConnectionStatus::Error(err),
            None => ConnectionStatus::Inactive,
        };
        self.set_status(next, Some("reconnection cancelled".to_string())).await;
        self.notify(NoticeLevel::Warning, "Reconnection cancelled").await;
    }

    // ===== OBSERVERS =====

    /// Snapshot of the current connection status
    pub async fn status(&self) -> ConnectionStatus {
        self.status.read().await.clone()
    }

    /// Whether a session is currently established
    pub async fn is_active(&self) -> bool {
        self.status.read().await.is_active()
    }

    /// The id of the current call session, if one exists
    pub async fn current_call_id(&self) -> Option<CallId> {
        *self.call_id.read().await
    }

    /// The most recently recorded failure, if any
    pub async fn last_error(&self) -> Option<ConnectionError> {
        self.last_error.read().await.clone()
    }

    /// Statistics about the client's activity
    pub async fn get_client_stats(&self) -> ClientStats {
        ClientStats {
            is_active: self.is_active().await,
            total_calls: self.total_calls.load(Ordering::SeqCst),
            total_reconnect_attempts: self.reconnect_attempts.load(Ordering::SeqCst),
            total_reconnect_successes: self.reconnect_successes.load(Ordering::SeqCst),
            last_error_kind: self.last_error.read().await.as_ref().map(|err| err.kind),
        }
    }

    /// The reconnection manager, for policy tuning and retry introspection
    pub fn reconnection(&self) -> &ReconnectionManager {
        &self.reconnection
    }

    /// Register the event handler. At most one handler is active; a second
    /// registration replaces the first.
    pub async fn set_event_handler(&self, handler: Arc<dyn ClientEventHandler>) {
        *self.event_handler.write().await = Some(handler);
    }

    /// Subscribe to the broadcast event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    // ===== INTERNAL TRANSITIONS =====

    /// Strong handle to self for spawned tasks. `None` only during teardown.
    pub(crate) fn upgrade_self(&self) -> Option<Arc<Self>> {
        self.weak_self.upgrade()
    }

    /// One SDK connect, classified, under the configured deadline.
    pub(crate) async fn connect_once(
        session: Arc<dyn VoiceSession>,
        assistant_id: String,
        connect_timeout: Option<Duration>,
    ) -> Result<(), ConnectionError> {
        let connect = async {
            session
                .connect(&assistant_id)
                .await
                .map_err(|failure| ConnectionError::classify(&failure))
        };
        match connect_timeout {
            Some(deadline) => {
                let guarded =
                    with_timeout("sdk_connect", deadline, async {
                        connect.await.map_err(ClientError::from)
                    })
                    .await;
                match guarded {
                    Ok(()) => Ok(()),
                    Err(ClientError::Connection(err)) => Err(err),
                    // the deadline elapsed; classify it like any other timeout
                    Err(elapsed) => {
                        Err(ConnectionError::new(ErrorKind::TimeoutError, elapsed.to_string()))
                    }
                }
            }
            None => connect.await,
        }
    }

    /// Record a classified failure and route it: recoverable network-shaped
    /// failures enter the reconnection path, everything else settles as a
    /// terminal error with its one notification. Failures arriving while a
    /// reconnection run is active are recorded and logged only; the run
    /// drives recovery.
    pub(crate) async fn fail_with(&self, err: ConnectionError) {
        *self.last_error.write().await = Some(err.clone());
        if self.reconnection.is_reconnecting() {
            debug!(error = %err, "failure during reconnection run, deferring to the run");
            return;
        }
        let eligible =
            err.is_recoverable() && self.reconnection.should_attempt_reconnection(err.kind);
        self.set_status(
            ConnectionStatus::Error(err.clone()),
            Some(err.kind.as_str().to_string()),
        )
        .await;
        if eligible {
            self.spawn_reconnection().await;
        } else {
            self.notify(NoticeLevel::Error, err.kind.user_message()).await;
        }
    }

    /// Settle in `PermissionDenied` without touching the SDK.
    async fn deny_permission(&self) -> ClientResult<()> {
        warn!("microphone permission denied");
        self.set_status(
            ConnectionStatus::PermissionDenied,
            Some("microphone permission denied".to_string()),
        )
        .await;
        self.notify(
            NoticeLevel::Error,
            ErrorKind::MicrophoneAccessDenied.user_message(),
        )
        .await;
        Err(ClientError::MicrophonePermission)
    }

    /// Kick off the self-driving reconnection run on its own task.
    pub(crate) async fn spawn_reconnection(&self) {
        let Some(manager) = self.weak_self.upgrade() else {
            return;
        };
        let (assistant_id, connect_timeout) = {
            let config = self.config.read().await;
            (config.resolved_assistant_id(), config.connect_timeout)
        };
        let Some(assistant_id) = assistant_id else {
            warn!("cannot reconnect without an assistant id");
            return;
        };
        let session = Arc::clone(&self.session);
        let reconnection = Arc::clone(&self.reconnection);
        tokio::spawn(async move {
            let observer: Arc<dyn ReconnectionObserver> = manager.clone();
            let retry = move || -> RetryFuture {
                let session = Arc::clone(&session);
                let assistant_id = assistant_id.clone();
                Box::pin(async move {
                    ConnectionManager::connect_once(session, assistant_id, connect_timeout).await
                })
            };
            if let Err(e) = reconnection.start_reconnection(retry, observer).await {
                debug!(error = %e, "reconnection run ended without recovering");
            }
        });
    }

    /// Write the new status and emit the transition.
    pub(crate) async fn set_status(&self, new_status: ConnectionStatus, reason: Option<String>) {
        let previous = {
            let mut status = self.status.write().await;
            std::mem::replace(&mut *status, new_status.clone())
        };
        info!(
            from = previous.name(),
            to = new_status.name(),
            "connection status changed"
        );
        let info = StatusChangeInfo {
            call_id: *self.call_id.read().await,
            new_status,
            previous_status: Some(previous),
            reason,
            timestamp: Utc::now(),
        };
        self.emit_status_event(info, EventPriority::Normal).await;
    }

    /// Forward a status change to the handler and the broadcast stream.
    pub(crate) async fn emit_status_event(&self, info: StatusChangeInfo, priority: EventPriority) {
        let handler = self.event_handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_status_changed(info.clone()).await;
        }
        let _ = self.event_tx.send(ClientEvent::StatusChanged { info, priority });
    }

    /// Emit a user-facing notification (and its log line).
    pub(crate) async fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let notification = Notification {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        };
        match level {
            NoticeLevel::Error => error!(notice = %notification.message, "notification"),
            NoticeLevel::Warning => warn!(notice = %notification.message, "notification"),
            _ => info!(notice = %notification.message, "notification"),
        }
        let handler = self.event_handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_notification(notification.clone()).await;
        }
        let priority = match level {
            NoticeLevel::Error => EventPriority::High,
            NoticeLevel::Warning | NoticeLevel::Success => EventPriority::Normal,
            NoticeLevel::Info => EventPriority::Low,
        };
        let _ = self.event_tx.send(ClientEvent::Notice { info: notification, priority });
    }

    /// Start the one-second countdown ticker toward the next retry. The tick
    /// only updates the displayed remaining time; the real timer lives in the
    /// reconnection run.
    pub(crate) fn start_countdown(&self, total: Duration) {
        self.stop_countdown();
        let Some(manager) = self.weak_self.upgrade() else {
            return;
        };
        let handle = tokio::spawn(async move {
            let mut remaining = total;
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            tick.tick().await; // the first tick resolves immediately
            loop {
                tick.tick().await;
                remaining = remaining.saturating_sub(Duration::from_secs(1));
                {
                    let mut status = manager.status.write().await;
                    match &mut *status {
                        ConnectionStatus::Reconnecting { next_retry_in, .. } => {
                            *next_retry_in = remaining;
                        }
                        _ => break,
                    }
                }
                let _ = manager.event_tx.send(ClientEvent::ReconnectCountdown {
                    call_id: *manager.call_id.read().await,
                    remaining,
                    timestamp: Utc::now(),
                });
                if remaining.is_zero() {
                    break;
                }
            }
        });
        *self.countdown.lock() = Some(handle);
    }

    /// Abort the countdown ticker so no stale tick ever fires.
    pub(crate) fn stop_countdown(&self) {
        if let Some(handle) = self.countdown.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl ReconnectionObserver for ConnectionManager {
    async fn on_reconnect_attempt(&self, attempt: u32, delay: Duration) {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        let max_attempts = self.reconnection.max_attempts();
        self.set_status(
            ConnectionStatus::Reconnecting {
                attempt,
                max_attempts,
                next_retry_in: delay,
            },
            None,
        )
        .await;
        self.notify(
            NoticeLevel::Warning,
            format!("Reconnecting (attempt {attempt}/{max_attempts})..."),
        )
        .await;
        self.start_countdown(delay);
    }

    async fn on_reconnect_success(&self) {
        self.reconnect_successes.fetch_add(1, Ordering::SeqCst);
        self.stop_countdown();
        // Active status arrives with the SDK's call-start event
        debug!("reconnection succeeded, awaiting call-start");
    }

    async fn on_reconnect_failure(&self, terminal: bool) {
        if !terminal {
            // intermediate failures stay internal to the run
            return;
        }
        self.stop_countdown();
        let recorded = self.last_error.read().await.clone();
        let err = recorded.unwrap_or_else(|| {
            ConnectionError::new(ErrorKind::ConnectionFailed, "reconnection attempts exhausted")
        });
        self.set_status(
            ConnectionStatus::Error(err.clone()),
            Some("reconnection exhausted".to_string()),
        )
        .await;
        self.notify(NoticeLevel::Error, err.kind.user_message()).await;
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("reconnection", &self.reconnection)
            .field("events_wired", &self.events_wired.load(Ordering::SeqCst))
            .field("total_calls", &self.total_calls.load(Ordering::SeqCst))
            .finish()
    }
}
