//! Microphone permission gate
//!
//! Starting a call requires microphone capture, and the permission surface is
//! platform-owned (a browser permission store, an OS privacy panel). The
//! manager only ever reads it and asks it to prompt; it never stores or
//! mutates permission state itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a permission query or request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Capture is allowed
    Granted,
    /// Capture was refused; only the user can change this
    Denied,
    /// Not decided yet; a request will prompt the user
    Prompt,
}

/// Platform microphone permission surface
///
/// `query` is a passive read of the current decision. `request` actively
/// prompts (or probes capture where no prompt API exists) and reports the
/// final decision; it never returns [`PermissionState::Prompt`].
#[async_trait]
pub trait MicrophonePermission: Send + Sync {
    /// Read the current permission decision without prompting.
    async fn query(&self) -> PermissionState;

    /// Prompt the user (or probe capture) and return the resulting decision.
    async fn request(&self) -> PermissionState;
}
