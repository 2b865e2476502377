//! SDK event bridge
//!
//! Translates [`SessionEvent`]s from the external SDK into state-machine
//! transitions. The subscription is wired exactly once per manager instance;
//! events are consumed on a single task in emission order.

use std::sync::atomic::Ordering;

use tracing::{debug, info};

use crate::client::manager::ConnectionManager;
use crate::client::types::ConnectionStatus;
use crate::error::ConnectionError;
use crate::events::{EventPriority, NoticeLevel, StatusChangeInfo};
use crate::session::{SessionError, SessionEvent};

impl ConnectionManager {
    /// Subscribe to the session's event stream and pump it into the state
    /// machine. Guarded so repeated calls never create a second consumer.
    pub(crate) fn wire_session_events(&self) {
        if self.events_wired.swap(true, Ordering::SeqCst) {
            debug!("session events already wired, skipping re-registration");
            return;
        }
        let Some(manager) = self.upgrade_self() else {
            return;
        };
        let mut events = self.session.events();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                manager.handle_session_event(event).await;
            }
            debug!("session event channel closed");
        });
    }

    /// Dispatch one SDK event.
    pub(crate) async fn handle_session_event(&self, event: SessionEvent) {
        debug!(event = event.name(), "session event");
        match event {
            SessionEvent::CallStart => self.on_call_start().await,
            SessionEvent::CallEnd => self.on_call_end().await,
            SessionEvent::SpeechStart => self.on_speech(true).await,
            SessionEvent::SpeechEnd => self.on_speech(false).await,
            SessionEvent::Error(failure) => self.on_session_error(failure).await,
        }
    }

    async fn on_call_start(&self) {
        info!("call established");
        self.stop_countdown();
        *self.last_error.write().await = None;
        self.set_status(
            ConnectionStatus::Active { is_user_speaking: false },
            Some("call-start".to_string()),
        )
        .await;
        self.notify(NoticeLevel::Success, "Connected to the voice assistant").await;
    }

    async fn on_call_end(&self) {
        let was_active = { self.status.read().await.is_active() };
        if !was_active {
            debug!("call-end ignored outside an active session");
            return;
        }
        info!("call ended");
        self.set_status(ConnectionStatus::Inactive, Some("call-end".to_string())).await;
        *self.call_id.write().await = None;
        self.notify(NoticeLevel::Info, "Voice call ended").await;
    }

    async fn on_speech(&self, speaking: bool) {
        {
            let mut status = self.status.write().await;
            match &mut *status {
                ConnectionStatus::Active { is_user_speaking } if *is_user_speaking != speaking => {
                    *is_user_speaking = speaking;
                }
                _ => return,
            }
        }
        let info = StatusChangeInfo {
            call_id: *self.call_id.read().await,
            new_status: ConnectionStatus::Active { is_user_speaking: speaking },
            previous_status: Some(ConnectionStatus::Active { is_user_speaking: !speaking }),
            reason: Some(if speaking { "speech-start" } else { "speech-end" }.to_string()),
            timestamp: chrono::Utc::now(),
        };
        self.emit_status_event(info, EventPriority::Low).await;
    }

    async fn on_session_error(&self, failure: SessionError) {
        let err = ConnectionError::classify(&failure);
        self.fail_with(err).await;
    }
}
