//! Error types for the client-core library
//!
//! Two layers of errors live here. [`ConnectionError`] is the classified record
//! of a failure surfaced by the external voice SDK: it carries a closed
//! [`ErrorKind`] taxonomy, a fixed recoverability verdict per kind, and the
//! opaque upstream cause. [`ClientError`] is the operation-level error returned
//! by manager APIs (`start`, `stop`, reconnection runs).
//!
//! Classification happens exactly once, at the point the SDK surfaces a
//! failure, and the resulting record is what the state machine stores and the
//! reconnection manager consults. The kind-to-recoverability and
//! kind-to-user-message mappings are authoritative; no call site overrides
//! them.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionError;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Closed set of connection failure categories
///
/// Every failure the SDK can surface maps to exactly one of these kinds.
/// Recoverability and the user-facing message are derived from the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The SDK could not establish or keep the transport to the session
    ConnectionFailed,
    /// The public key or credentials were rejected
    AuthenticationFailed,
    /// The configured assistant does not exist on the platform
    AssistantNotFound,
    /// Microphone capture was refused by the user or the platform
    MicrophoneAccessDenied,
    /// A network-level failure outside the connection handshake
    NetworkError,
    /// An operation exceeded its deadline or was aborted
    TimeoutError,
    /// Anything that matched no other category
    UnknownError,
}

impl ErrorKind {
    /// Whether errors of this kind are candidates for automatic recovery.
    ///
    /// Authentication, assistant-lookup, and microphone failures can never be
    /// fixed by retrying; everything else defaults to recoverable, including
    /// [`ErrorKind::UnknownError`].
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ErrorKind::AuthenticationFailed
                | ErrorKind::AssistantNotFound
                | ErrorKind::MicrophoneAccessDenied
        )
    }

    /// The one fixed user-facing message for this kind
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionFailed => {
                "Could not connect to the voice assistant. Please try again."
            }
            ErrorKind::AuthenticationFailed => {
                "Voice service authentication failed. Please contact support."
            }
            ErrorKind::AssistantNotFound => {
                "The voice assistant is unavailable right now."
            }
            ErrorKind::MicrophoneAccessDenied => {
                "Microphone access is required for voice calls. Please allow it in your browser."
            }
            ErrorKind::NetworkError => {
                "Network problem detected. Check your connection and try again."
            }
            ErrorKind::TimeoutError => "The voice assistant took too long to respond.",
            ErrorKind::UnknownError => "Something went wrong with the voice assistant.",
        }
    }

    /// Stable identifier used in logs and event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::AssistantNotFound => "assistant_not_found",
            ErrorKind::MicrophoneAccessDenied => "microphone_access_denied",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::TimeoutError => "timeout_error",
            ErrorKind::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substring rules checked against the lowercased failure message, in
/// precedence order. The first rule with any matching needle wins.
const MESSAGE_RULES: &[(&[&str], ErrorKind)] = &[
    (&["auth", "unauthorized", "forbidden"], ErrorKind::AuthenticationFailed),
    (&["connection", "network", "fetch"], ErrorKind::ConnectionFailed),
    (&["microphone", "audio", "permission"], ErrorKind::MicrophoneAccessDenied),
    (&["timeout", "abort"], ErrorKind::TimeoutError),
    (&["assistant", "not found"], ErrorKind::AssistantNotFound),
];

/// A classified connection failure
///
/// Created once per SDK failure by [`ConnectionError::classify`] and stored in
/// the connection status. Cloneable so it can travel through events; the
/// upstream cause is shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ConnectionError {
    /// Failure category
    pub kind: ErrorKind,
    /// Message carried over from the external failure, or the fixed message
    /// for the kind when the failure had none
    pub message: String,
    /// When the failure was classified
    pub occurred_at: DateTime<Utc>,
    /// The opaque external failure, if one was captured
    pub cause: Option<Arc<anyhow::Error>>,
}

impl ConnectionError {
    /// Create a classified error directly, without an external cause
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            occurred_at: Utc::now(),
            cause: None,
        }
    }

    /// Whether this error is a candidate for automatic recovery
    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }

    /// Classify an opaque SDK failure into a [`ConnectionError`].
    ///
    /// Total over malformed input: a failure with no status and no message
    /// classifies as [`ErrorKind::UnknownError`]. A numeric status of 403
    /// short-circuits to [`ErrorKind::AuthenticationFailed`] before any
    /// message inspection; otherwise the lowercased message is matched against
    /// the substring rules in precedence order.
    pub fn classify(failure: &SessionError) -> Self {
        if failure.status == Some(403) {
            return Self::from_failure(ErrorKind::AuthenticationFailed, failure);
        }
        let kind = match failure.message.as_deref() {
            Some(message) if !message.trim().is_empty() => Self::kind_for_message(message),
            _ => ErrorKind::UnknownError,
        };
        Self::from_failure(kind, failure)
    }

    fn from_failure(kind: ErrorKind, failure: &SessionError) -> Self {
        let message = failure
            .message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| kind.user_message().to_string());
        Self {
            kind,
            message,
            occurred_at: Utc::now(),
            cause: failure.source.clone(),
        }
    }

    fn kind_for_message(message: &str) -> ErrorKind {
        let normalized = message.to_lowercase();
        for (needles, kind) in MESSAGE_RULES {
            if needles.iter().any(|needle| normalized.contains(needle)) {
                return *kind;
            }
        }
        ErrorKind::UnknownError
    }
}

/// Errors returned by client operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// A classified connection failure
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A required configuration value is absent
    #[error("Missing configuration: {field}")]
    MissingConfiguration {
        /// Which configuration field was absent
        field: String,
    },

    /// Microphone permission was denied, so no session was started
    #[error("Microphone permission denied")]
    MicrophonePermission,

    /// The operation is not valid in the current connection state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// What was attempted and why it was rejected
        message: String,
    },

    /// The automatic reconnection budget ran out without a successful connect
    #[error("Reconnection attempts exhausted after {attempts} attempts")]
    ReconnectionExhausted {
        /// How many attempts were made before giving up
        attempts: u32,
    },

    /// An operation exceeded its deadline
    #[error("Operation timed out after {duration_ms} ms")]
    OperationTimeout {
        /// The deadline that elapsed, in milliseconds
        duration_ms: u64,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Details of the internal failure
        message: String,
    },
}

impl ClientError {
    /// Create a missing-configuration error
    pub fn missing_config(field: impl Into<String>) -> Self {
        Self::MissingConfiguration { field: field.into() }
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}
