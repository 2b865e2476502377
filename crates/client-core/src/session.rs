//! External voice SDK abstraction
//!
//! The connection manager never talks to a concrete vendor SDK. It drives a
//! [`VoiceSession`] implementation: one logical call session at a time, with
//! lifecycle events delivered as a tagged stream over a channel. This is the
//! seam where a real SDK binding (or a test double) plugs in.
//!
//! Events are assumed to arrive in emission order; the manager consumes them
//! on a single task and never reorders them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Lifecycle events emitted by a voice session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session is established and audio is flowing
    CallStart,
    /// The session ended normally
    CallEnd,
    /// The user started speaking
    SpeechStart,
    /// The user stopped speaking
    SpeechEnd,
    /// The session surfaced a failure
    Error(SessionError),
}

impl SessionEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::CallStart => "call-start",
            SessionEvent::CallEnd => "call-end",
            SessionEvent::SpeechStart => "speech-start",
            SessionEvent::SpeechEnd => "speech-end",
            SessionEvent::Error(_) => "error",
        }
    }
}

/// An opaque failure surfaced by the SDK
///
/// SDK failures are loosely shaped: some carry an HTTP-like numeric status,
/// some only a message, some neither. Classification into a
/// [`crate::error::ConnectionError`] handles every combination.
#[derive(Debug, Clone, Default)]
pub struct SessionError {
    /// HTTP-like status code, when the SDK exposed one
    pub status: Option<u16>,
    /// Human-readable failure message, when the SDK exposed one
    pub message: Option<String>,
    /// The underlying error value, when one was captured
    pub source: Option<Arc<anyhow::Error>>,
}

impl SessionError {
    /// Failure with just a message
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: Some(message.into()),
            source: None,
        }
    }

    /// Failure with a numeric status and a message
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: Some(message.into()),
            source: None,
        }
    }

    /// Wrap an arbitrary error as the failure source, keeping its rendering
    /// as the message
    pub fn from_source(source: anyhow::Error) -> Self {
        Self {
            status: None,
            message: Some(source.to_string()),
            source: Some(Arc::new(source)),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, self.status) {
            (Some(message), Some(status)) => write!(f, "{message} (status {status})"),
            (Some(message), None) => f.write_str(message),
            (None, Some(status)) => write!(f, "session failure (status {status})"),
            (None, None) => f.write_str("session failure"),
        }
    }
}

impl std::error::Error for SessionError {}

/// A pluggable voice session client
///
/// Implementations wrap the vendor SDK: `connect` starts a session against a
/// named assistant, `disconnect` tears it down, and `events` hands out the
/// lifecycle stream. The manager subscribes to events exactly once per
/// instance.
#[async_trait]
pub trait VoiceSession: Send + Sync {
    /// Start a session with the given assistant. Resolves once the SDK has
    /// accepted the connect request; `call-start` arrives as an event.
    async fn connect(&self, assistant_id: &str) -> Result<(), SessionError>;

    /// Tear down the active session, if any.
    async fn disconnect(&self) -> Result<(), SessionError>;

    /// Subscribe to lifecycle events. Each call returns a fresh receiver fed
    /// by the same underlying emitter.
    fn events(&self) -> mpsc::UnboundedReceiver<SessionEvent>;
}
