//! Client configuration structures
//!
//! This module provides the configuration for the voice client: SDK
//! credentials, the target assistant, the connect deadline, and the automatic
//! reconnection policy.
//!
//! # Key Components
//!
//! - **ClientConfig** - Main client configuration (credentials, assistant, timeouts)
//! - **ReconnectionPolicy** - Bounded exponential backoff parameters
//! - **ReconnectionPolicyUpdate** - Partial policy merge for runtime tuning
//!
//! # Usage Examples
//!
//! ## Basic Client Configuration
//!
//! ```rust
//! use voxlink_client_core::client::config::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::new()
//!     .with_public_key("pk_live_1234")
//!     .with_assistant_id("support-line")
//!     .with_connect_timeout(Some(Duration::from_secs(15)));
//!
//! assert_eq!(config.public_key, "pk_live_1234");
//! assert_eq!(config.connect_timeout, Some(Duration::from_secs(15)));
//! ```
//!
//! ## Tuning Reconnection
//!
//! ```rust
//! use voxlink_client_core::client::config::{ClientConfig, ReconnectionPolicy};
//! use std::time::Duration;
//!
//! let policy = ReconnectionPolicy {
//!     enabled: true,
//!     max_attempts: 5,
//!     initial_delay: Duration::from_millis(500),
//!     max_delay: Duration::from_secs(10),
//!     backoff_factor: 2.0,
//! };
//!
//! let config = ClientConfig::new()
//!     .with_public_key("pk_live_1234")
//!     .with_reconnection(policy);
//!
//! assert_eq!(config.reconnection.max_attempts, 5);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Environment variable consulted when [`ClientConfig::assistant_id`] is unset
pub const ASSISTANT_ID_ENV: &str = "VOXLINK_ASSISTANT_ID";

/// Default deadline for the SDK connect call
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Automatic reconnection policy
///
/// Controls the bounded exponential-backoff retry sequence the client runs
/// after a recoverable failure. The delay before attempt `n` (1-based) is
/// `min(initial_delay * backoff_factor^(n-1), max_delay)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectionPolicy {
    /// Whether automatic reconnection runs at all
    pub enabled: bool,
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub initial_delay: Duration,
    /// Ceiling applied to every computed delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt; must be at least 1.0
    pub backoff_factor: f64,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectionPolicy {
    /// Merge a partial update into this policy. Fields left `None` keep
    /// their current value.
    pub fn apply(&mut self, update: ReconnectionPolicyUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(max_attempts) = update.max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(initial_delay) = update.initial_delay {
            self.initial_delay = initial_delay;
        }
        if let Some(max_delay) = update.max_delay {
            self.max_delay = max_delay;
        }
        if let Some(backoff_factor) = update.backoff_factor {
            self.backoff_factor = backoff_factor;
        }
    }
}

/// Partial [`ReconnectionPolicy`] for runtime updates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconnectionPolicyUpdate {
    /// New enabled flag, if changing
    pub enabled: Option<bool>,
    /// New attempt budget, if changing
    pub max_attempts: Option<u32>,
    /// New initial delay, if changing
    pub initial_delay: Option<Duration>,
    /// New delay ceiling, if changing
    pub max_delay: Option<Duration>,
    /// New backoff multiplier, if changing
    pub backoff_factor: Option<f64>,
}

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Public key identifying the account with the voice platform
    pub public_key: String,
    /// Assistant to connect to. When unset, the `VOXLINK_ASSISTANT_ID`
    /// environment variable is consulted at connect time; if both are absent
    /// the connect is a fatal configuration error.
    pub assistant_id: Option<String>,
    /// User agent string reported to the platform
    pub user_agent: String,
    /// Deadline for the SDK connect call. `None` waits indefinitely for the
    /// SDK to report call-start or an error.
    pub connect_timeout: Option<Duration>,
    /// Automatic reconnection policy
    pub reconnection: ReconnectionPolicy,
}

impl ClientConfig {
    /// Create a configuration with defaults; fill in credentials with the
    /// `with_*` methods.
    pub fn new() -> Self {
        Self {
            public_key: String::new(),
            assistant_id: None,
            user_agent: format!("voxlink-client/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            reconnection: ReconnectionPolicy::default(),
        }
    }

    /// Set the platform public key
    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = public_key.into();
        self
    }

    /// Set the assistant to connect to
    pub fn with_assistant_id(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set or disable the connect deadline
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Replace the reconnection policy
    pub fn with_reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }

    /// The assistant id to use: the configured value, falling back to the
    /// `VOXLINK_ASSISTANT_ID` environment variable.
    pub fn resolved_assistant_id(&self) -> Option<String> {
        self.assistant_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| {
                std::env::var(ASSISTANT_ID_ENV)
                    .ok()
                    .filter(|id| !id.trim().is_empty())
            })
    }

    /// Validate the configuration before building a client.
    ///
    /// The assistant id is deliberately not checked here; it may arrive from
    /// the environment and is resolved at connect time.
    pub fn validate(&self) -> ClientResult<()> {
        if self.public_key.trim().is_empty() {
            return Err(ClientError::missing_config("public_key"));
        }
        if self.reconnection.backoff_factor < 1.0 {
            return Err(ClientError::invalid_state(
                "reconnection.backoff_factor must be at least 1.0",
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
