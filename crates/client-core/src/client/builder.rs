//! Builder for assembling a connection manager
//!
//! Wires configuration together with the pluggable collaborators: a
//! [`VoiceSession`] implementation (the SDK binding) and a
//! [`MicrophonePermission`] implementation (the platform permission surface).
//!
//! # Example
//!
//! ```rust,no_run
//! use voxlink_client_core::ClientBuilder;
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
//! client.start().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::client::config::{ClientConfig, ReconnectionPolicy};
use crate::client::manager::ConnectionManager;
use crate::error::{ClientError, ClientResult};
use crate::permission::MicrophonePermission;
use crate::session::VoiceSession;

/// Progressive configuration for a [`ConnectionManager`]
pub struct ClientBuilder {
    config: ClientConfig,
    session: Option<Arc<dyn VoiceSession>>,
    permission: Option<Arc<dyn MicrophonePermission>>,
}

impl ClientBuilder {
    /// Start a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ClientConfig::new(),
            session: None,
            permission: None,
        }
    }

    /// Start from an existing configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            session: None,
            permission: None,
        }
    }

    /// Set the platform public key
    pub fn public_key(mut self, public_key: impl Into<String>) -> Self {
        self.config.public_key = public_key.into();
        self
    }

    /// Set the assistant to connect to
    pub fn assistant_id(mut self, assistant_id: impl Into<String>) -> Self {
        self.config.assistant_id = Some(assistant_id.into());
        self
    }

    /// Set the user agent string
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set or disable the connect deadline
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Replace the reconnection policy
    pub fn reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.config.reconnection = policy;
        self
    }

    /// Plug in the SDK binding
    pub fn session(mut self, session: Arc<dyn VoiceSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Plug in the permission surface
    pub fn permission(mut self, permission: Arc<dyn MicrophonePermission>) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Validate and build the manager
    pub async fn build(self) -> ClientResult<Arc<ConnectionManager>> {
        let session = self
            .session
            .ok_or_else(|| ClientError::missing_config("session"))?;
        let permission = self
            .permission
            .ok_or_else(|| ClientError::missing_config("permission"))?;
        ConnectionManager::new(self.config, session, permission).await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
