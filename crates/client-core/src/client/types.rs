//! Type definitions for the client-core library
//!
//! Data structures shared across the connection manager: the connection
//! status variants, call identifiers, and client statistics.

use std::time::Duration;

use uuid::Uuid;

use crate::error::{ConnectionError, ErrorKind};

// ===== CORE CLIENT TYPES =====

/// Unique identifier for a logical call session
pub type CallId = Uuid;

/// The connection lifecycle state
///
/// Exactly one variant is active at a time; the manager is the only writer.
/// Transitions happen in response to user commands, SDK lifecycle events, and
/// reconnection callbacks.
#[derive(Debug, Clone)]
pub enum ConnectionStatus {
    /// No session and no pending work
    Inactive,
    /// Microphone permission has not been granted yet; a prompt is underway
    PermissionRequired,
    /// Microphone permission was refused; no session can start
    PermissionDenied,
    /// A connect request is in flight
    Loading,
    /// A session is established
    Active {
        /// Whether the user is currently speaking
        is_user_speaking: bool,
    },
    /// An automatic retry sequence is in progress
    Reconnecting {
        /// The attempt currently scheduled or running (1-based)
        attempt: u32,
        /// The configured attempt budget
        max_attempts: u32,
        /// Approximate time until the attempt fires (display-only, updated on
        /// a one-second tick)
        next_retry_in: Duration,
    },
    /// A failure occurred; terminal unless a retry sequence picks it up
    Error(ConnectionError),
}

impl ConnectionStatus {
    /// Short name for logging and event payloads
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionStatus::Inactive => "inactive",
            ConnectionStatus::PermissionRequired => "permission-required",
            ConnectionStatus::PermissionDenied => "permission-denied",
            ConnectionStatus::Loading => "loading",
            ConnectionStatus::Active { .. } => "active",
            ConnectionStatus::Reconnecting { .. } => "reconnecting",
            ConnectionStatus::Error(_) => "error",
        }
    }

    /// Whether a session is established
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionStatus::Active { .. })
    }

    /// Whether an automatic retry sequence is in progress
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, ConnectionStatus::Reconnecting { .. })
    }

    /// The error carried by this status, if any
    pub fn as_error(&self) -> Option<&ConnectionError> {
        match self {
            ConnectionStatus::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::Inactive
    }
}

// ===== STATISTICS =====

/// Statistics about the client's activity since creation
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Whether a session is currently established
    pub is_active: bool,
    /// Total call sessions started
    pub total_calls: u64,
    /// Total automatic reconnect attempts scheduled
    pub total_reconnect_attempts: u64,
    /// Total reconnect runs that ended in a successful connect
    pub total_reconnect_successes: u64,
    /// Kind of the most recent failure, if one is recorded
    pub last_error_kind: Option<ErrorKind>,
}
