//! # Voxlink Client Core - Voice Assistant Call Coordination
//!
//! This crate is the coordination layer for a voice-assistant call session:
//! it owns the connection lifecycle, gates every transition, and recovers
//! from transient failures with bounded exponential backoff. It has no wire
//! protocol of its own; the vendor SDK and the platform permission surface
//! plug in behind traits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voxlink_client_core::{ClientBuilder, ConnectionStatus};
//! # use std::sync::Arc;
//! # async fn example(
//! #     sdk: Arc<dyn voxlink_client_core::VoiceSession>,
//! #     mic: Arc<dyn voxlink_client_core::MicrophonePermission>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::new()
//!     .public_key("pk_live_1234")
//!     .assistant_id("support-line")
//!     .session(sdk)
//!     .permission(mic)
//!     .build()
//!     .await?;
//!
//! // Start a call; Active status arrives with the SDK's call-start event
//! client.start().await?;
//!
//! // ... later
//! client.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │    UI / Application      │
//! └────────────┬─────────────┘
//!              │ start/stop/retry/cancel        events, notifications
//! ┌────────────▼─────────────┐        ┌─────────────────────────────┐
//! │    ConnectionManager     │───────►│ ClientEventHandler/broadcast│
//! │  (state machine of record)        └─────────────────────────────┘
//! │ ┌──────────────────────┐ │
//! │ │ ReconnectionManager  │ │  bounded exponential backoff
//! │ └──────────────────────┘ │
//! └──────┬────────────┬──────┘
//!        │            │
//! ┌──────▼─────┐ ┌────▼──────────────┐
//! │VoiceSession│ │MicrophonePermission│
//! │ (SDK seam) │ │  (platform seam)   │
//! └────────────┘ └───────────────────┘
//! ```
//!
//! ## Failure handling
//!
//! Every SDK failure is classified exactly once into a closed
//! [`ErrorKind`](error::ErrorKind) taxonomy with fixed recoverability and a
//! fixed user-facing message. Recoverable, network-shaped failures enter the
//! automatic reconnection path; everything else surfaces immediately and
//! waits for a manual retry.

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod events;
pub mod permission;
pub mod session;

// Re-export main types at the crate root
pub use client::{
    with_timeout, CallId, ClientBuilder, ClientConfig, ClientStats, ConnectionManager,
    ConnectionStatus, ReconnectionManager, ReconnectionObserver, ReconnectionPolicy,
    ReconnectionPolicyUpdate,
};
pub use error::{ClientError, ClientResult, ConnectionError, ErrorKind};
pub use events::{
    ClientEvent, ClientEventHandler, EventPriority, Notification, NoticeLevel, StatusChangeInfo,
};
pub use permission::{MicrophonePermission, PermissionState};
pub use session::{SessionError, SessionEvent, VoiceSession};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
