//! High-level client API for voice call coordination
//!
//! This module contains the connection manager and its supporting pieces:
//!
//! - [`manager`] - the connection state machine of record
//! - [`config`] - client configuration and the reconnection policy
//! - [`recovery`] - bounded exponential-backoff reconnection
//! - [`types`] - status variants, call ids, statistics
//! - [`builder`] - assembly of a manager with its collaborators
//!
//! The internal SDK event bridge lives in `events` and is not public API.

pub mod builder;
pub mod config;
mod events;
pub mod manager;
pub mod recovery;
pub mod types;

#[cfg(test)]
mod tests;

pub use builder::ClientBuilder;
pub use config::{ClientConfig, ReconnectionPolicy, ReconnectionPolicyUpdate, ASSISTANT_ID_ENV};
pub use manager::ConnectionManager;
pub use recovery::{with_timeout, ReconnectionManager, ReconnectionObserver, RetryFuture};
pub use types::{CallId, ClientStats, ConnectionStatus};
