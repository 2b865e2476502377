//! Event handling for client-core operations
//!
//! This module provides the event surface applications consume to drive UI:
//! connection status changes, user-facing notifications, and the reconnect
//! countdown tick. Events reach applications two ways, mirroring each other:
//!
//! - a registered [`ClientEventHandler`] (one per manager instance), and
//! - an optional broadcast stream for additional independent consumers.
//!
//! # Notification contract
//!
//! The manager emits exactly one notification per meaningful transition: a
//! success notice when a call connects, an info notice when it ends, one
//! warning per reconnect attempt ("attempt N/M"), one warning on manual
//! cancellation, and exactly one error notice per terminal failure, carrying
//! the fixed message for its [`crate::error::ErrorKind`]. Nothing is ever
//! dropped silently; every notice is also logged.
//!
//! # Usage Example
//!
//! ```rust
//! use voxlink_client_core::events::{ClientEventHandler, Notification, StatusChangeInfo};
//! use async_trait::async_trait;
//!
//! struct MyEventHandler;
//!
//! #[async_trait]
//! impl ClientEventHandler for MyEventHandler {
//!     async fn on_status_changed(&self, info: StatusChangeInfo) {
//!         println!("status is now {:?}", info.new_status);
//!     }
//!
//!     async fn on_notification(&self, notification: Notification) {
//!         println!("[{:?}] {}", notification.level, notification.message);
//!     }
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::types::{CallId, ConnectionStatus};

/// Priority of an event, for consumers that filter or batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventPriority {
    /// Background information (countdown ticks, speech activity)
    Low,
    /// Regular lifecycle traffic
    Normal,
    /// Failures and terminal outcomes
    High,
}

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Neutral information
    Info,
    /// A positive outcome
    Success,
    /// Degraded but recovering
    Warning,
    /// A failure requiring attention
    Error,
}

/// Information about a connection status change
#[derive(Debug, Clone)]
pub struct StatusChangeInfo {
    /// The call session the change belongs to, if one exists
    pub call_id: Option<CallId>,
    /// Status after the transition
    pub new_status: ConnectionStatus,
    /// Status before the transition
    pub previous_status: Option<ConnectionStatus>,
    /// Why the transition happened (e.g. "call-start", "reconnection cancelled")
    pub reason: Option<String>,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

/// A user-facing notification
#[derive(Debug, Clone)]
pub struct Notification {
    /// Severity
    pub level: NoticeLevel,
    /// The message to present
    pub message: String,
    /// When the notification was emitted
    pub timestamp: DateTime<Utc>,
}

/// Events delivered on the broadcast stream
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The connection status changed
    StatusChanged {
        /// Transition details
        info: StatusChangeInfo,
        /// Event priority
        priority: EventPriority,
    },
    /// A user-facing notification was emitted
    Notice {
        /// The notification
        info: Notification,
        /// Event priority
        priority: EventPriority,
    },
    /// Display-only countdown toward the next reconnect attempt. Ticks once
    /// per second and may drift up to one tick from the real timer.
    ReconnectCountdown {
        /// The call session being recovered
        call_id: Option<CallId>,
        /// Approximate time remaining before the next attempt
        remaining: Duration,
        /// When the tick was emitted
        timestamp: DateTime<Utc>,
    },
}

/// Handler for client events
///
/// Register one per manager with
/// [`crate::client::ConnectionManager::set_event_handler`]. All methods are
/// invoked from the manager's event task; implementations should hand work
/// off rather than block.
#[async_trait]
pub trait ClientEventHandler: Send + Sync {
    /// Called on every connection status transition.
    async fn on_status_changed(&self, info: StatusChangeInfo);

    /// Called for every user-facing notification.
    async fn on_notification(&self, notification: Notification);
}
