//! Test suite for the connection state machine
//!
//! Exercises the command surface and the SDK event bridge against scripted
//! mock collaborators: every permission outcome, the classification paths,
//! and the transitions the manager gates.

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serial_test::serial;
    use tokio::sync::mpsc;

    use crate::client::config::{ClientConfig, ReconnectionPolicy, ASSISTANT_ID_ENV};
    use crate::client::manager::ConnectionManager;
    use crate::client::types::ConnectionStatus;
    use crate::error::{ClientError, ErrorKind};
    use crate::events::{ClientEventHandler, Notification, NoticeLevel, StatusChangeInfo};
    use crate::permission::{MicrophonePermission, PermissionState};
    use crate::session::{SessionError, SessionEvent, VoiceSession};

    // ===== MOCK COLLABORATORS =====

    struct MockVoiceSession {
        senders: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
        connect_results: Mutex<VecDeque<Result<(), SessionError>>>,
        connect_calls: AtomicU32,
        disconnect_calls: AtomicU32,
        connect_delay: Mutex<Option<Duration>>,
        emit_call_start: AtomicBool,
    }

    impl MockVoiceSession {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                senders: Mutex::new(Vec::new()),
                connect_results: Mutex::new(VecDeque::new()),
                connect_calls: AtomicU32::new(0),
                disconnect_calls: AtomicU32::new(0),
                connect_delay: Mutex::new(None),
                emit_call_start: AtomicBool::new(true),
            })
        }

        fn script_connect(&self, results: Vec<Result<(), SessionError>>) {
            *self.connect_results.lock().unwrap() = results.into();
        }

        fn set_connect_delay(&self, delay: Duration) {
            *self.connect_delay.lock().unwrap() = Some(delay);
        }

        fn emit(&self, event: SessionEvent) {
            for tx in self.senders.lock().unwrap().iter() {
                let _ = tx.send(event.clone());
            }
        }

        fn subscriber_count(&self) -> usize {
            self.senders.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VoiceSession for MockVoiceSession {
        async fn connect(&self, _assistant_id: &str) -> Result<(), SessionError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.connect_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.connect_results.lock().unwrap().pop_front().unwrap_or(Ok(()));
            if next.is_ok() && self.emit_call_start.load(Ordering::SeqCst) {
                self.emit(SessionEvent::CallStart);
            }
            next
        }

        async fn disconnect(&self) -> Result<(), SessionError> {
            self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn events(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            rx
        }
    }

    struct MockPermission {
        query_result: Mutex<PermissionState>,
        request_result: Mutex<PermissionState>,
        request_calls: AtomicU32,
    }

    impl MockPermission {
        fn granted() -> Arc<Self> {
            Self::with(PermissionState::Granted, PermissionState::Granted)
        }

        fn with(query: PermissionState, request: PermissionState) -> Arc<Self> {
            Arc::new(Self {
                query_result: Mutex::new(query),
                request_result: Mutex::new(request),
                request_calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl MicrophonePermission for MockPermission {
        async fn query(&self) -> PermissionState {
            *self.query_result.lock().unwrap()
        }

        async fn request(&self) -> PermissionState {
            self.request_calls.fetch_add(1, Ordering::SeqCst);
            *self.request_result.lock().unwrap()
        }
    }

    struct TestEventHandler {
        statuses: Mutex<Vec<StatusChangeInfo>>,
        notices: Mutex<Vec<Notification>>,
    }

    impl TestEventHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(Vec::new()),
                notices: Mutex::new(Vec::new()),
            })
        }

        fn notices_at(&self, level: NoticeLevel) -> Vec<String> {
            self.notices
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.level == level)
                .map(|n| n.message.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ClientEventHandler for TestEventHandler {
        async fn on_status_changed(&self, info: StatusChangeInfo) {
            self.statuses.lock().unwrap().push(info);
        }

        async fn on_notification(&self, notification: Notification) {
            self.notices.lock().unwrap().push(notification);
        }
    }

    fn test_config() -> ClientConfig {
        ClientConfig::new()
            .with_public_key("pk_test")
            .with_assistant_id("test-assistant")
            .with_reconnection(ReconnectionPolicy {
                enabled: true,
                max_attempts: 3,
                initial_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(200),
                backoff_factor: 2.0,
            })
    }

    async fn build_manager(
        config: ClientConfig,
        session: Arc<MockVoiceSession>,
        permission: Arc<MockPermission>,
    ) -> (Arc<ConnectionManager>, Arc<TestEventHandler>) {
        let manager = ConnectionManager::new(config, session, permission)
            .await
            .expect("manager should build");
        let handler = TestEventHandler::new();
        manager.set_event_handler(handler.clone()).await;
        (manager, handler)
    }

    async fn wait_for_status(manager: &Arc<ConnectionManager>, name: &str) {
        for _ in 0..300 {
            if manager.status().await.name() == name {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "timed out waiting for status {name}, still {}",
            manager.status().await.name()
        );
    }

    // ===== LIFECYCLE =====

    #[tokio::test]
    async fn test_start_reaches_active_on_call_start() {
        let session = MockVoiceSession::new();
        let (manager, handler) =
            build_manager(test_config(), session.clone(), MockPermission::granted()).await;

        manager.start().await.expect("start should succeed");
        wait_for_status(&manager, "active").await;
        // let the event task finish delivering the connect notification
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(session.connect_calls.load(Ordering::SeqCst), 1);
        let stats = manager.get_client_stats().await;
        assert!(stats.is_active);
        assert_eq!(stats.total_calls, 1);
        assert!(manager.current_call_id().await.is_some());
        assert_eq!(
            handler.notices_at(NoticeLevel::Success),
            vec!["Connected to the voice assistant".to_string()]
        );
    }

    #[tokio::test]
    async fn test_speech_events_toggle_sub_state() {
        let session = MockVoiceSession::new();
        let (manager, _handler) =
            build_manager(test_config(), session.clone(), MockPermission::granted()).await;
        manager.start().await.unwrap();
        wait_for_status(&manager, "active").await;

        session.emit(SessionEvent::SpeechStart);
        for _ in 0..100 {
            if matches!(
                manager.status().await,
                ConnectionStatus::Active { is_user_speaking: true }
            ) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(matches!(
            manager.status().await,
            ConnectionStatus::Active { is_user_speaking: true }
        ));

        session.emit(SessionEvent::SpeechEnd);
        for _ in 0..100 {
            if matches!(
                manager.status().await,
                ConnectionStatus::Active { is_user_speaking: false }
            ) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(matches!(
            manager.status().await,
            ConnectionStatus::Active { is_user_speaking: false }
        ));
    }

    #[tokio::test]
    async fn test_call_end_returns_to_inactive() {
        let session = MockVoiceSession::new();
        let (manager, handler) =
            build_manager(test_config(), session.clone(), MockPermission::granted()).await;
        manager.start().await.unwrap();
        wait_for_status(&manager, "active").await;

        session.emit(SessionEvent::CallEnd);
        wait_for_status(&manager, "inactive").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(manager.current_call_id().await.is_none());
        assert_eq!(
            handler.notices_at(NoticeLevel::Info),
            vec!["Voice call ended".to_string()]
        );
    }

    #[tokio::test]
    async fn test_stop_tears_down_session() {
        let session = MockVoiceSession::new();
        let (manager, _handler) =
            build_manager(test_config(), session.clone(), MockPermission::granted()).await;
        manager.start().await.unwrap();
        wait_for_status(&manager, "active").await;

        manager.stop().await.expect("stop should succeed");
        assert_eq!(session.disconnect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status().await.name(), "inactive");
    }

    #[tokio::test]
    async fn test_toggle_call_is_a_no_op_while_loading() {
        let session = MockVoiceSession::new();
        session.set_connect_delay(Duration::from_millis(300));
        let (manager, _handler) =
            build_manager(test_config(), session.clone(), MockPermission::granted()).await;

        let starter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.start().await })
        };
        wait_for_status(&manager, "loading").await;

        manager.toggle_call().await.expect("toggle while loading is a no-op");
        assert_eq!(manager.status().await.name(), "loading");
        assert_eq!(session.disconnect_calls.load(Ordering::SeqCst), 0);

        starter.await.unwrap().unwrap();
        wait_for_status(&manager, "active").await;
    }

    // ===== PERMISSION GATE =====

    #[tokio::test]
    async fn test_permission_denial_blocks_connect() {
        let session = MockVoiceSession::new();
        let permission = MockPermission::with(PermissionState::Prompt, PermissionState::Denied);
        let (manager, handler) =
            build_manager(test_config(), session.clone(), permission.clone()).await;

        let result = manager.start().await;
        assert!(matches!(result, Err(ClientError::MicrophonePermission)));
        assert_eq!(manager.status().await.name(), "permission-denied");
        // the SDK was never touched
        assert_eq!(session.connect_calls.load(Ordering::SeqCst), 0);
        assert_eq!(permission.request_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            handler.notices_at(NoticeLevel::Error),
            vec![ErrorKind::MicrophoneAccessDenied.user_message().to_string()]
        );
    }

    #[tokio::test]
    async fn test_already_denied_permission_skips_the_prompt() {
        let session = MockVoiceSession::new();
        let permission = MockPermission::with(PermissionState::Denied, PermissionState::Denied);
        let (manager, _handler) =
            build_manager(test_config(), session.clone(), permission.clone()).await;

        let result = manager.start().await;
        assert!(matches!(result, Err(ClientError::MicrophonePermission)));
        assert_eq!(permission.request_calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.connect_calls.load(Ordering::SeqCst), 0);
    }

    // ===== CONFIGURATION GATE =====

    #[tokio::test]
    #[serial]
    async fn test_missing_assistant_id_is_fatal_and_never_retried() {
        std::env::remove_var(ASSISTANT_ID_ENV);
        let session = MockVoiceSession::new();
        let config = ClientConfig::new().with_public_key("pk_test");
        let (manager, handler) =
            build_manager(config, session.clone(), MockPermission::granted()).await;

        let result = manager.start().await;
        assert!(matches!(result, Err(ClientError::MissingConfiguration { .. })));

        let status = manager.status().await;
        assert_eq!(status.name(), "error");
        assert_eq!(status.as_error().unwrap().kind, ErrorKind::UnknownError);
        // fatal configuration errors never reach the reconnection path
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!manager.reconnection().is_reconnecting());
        assert_eq!(manager.get_client_stats().await.total_reconnect_attempts, 0);
        assert_eq!(session.connect_calls.load(Ordering::SeqCst), 0);
        assert_eq!(handler.notices_at(NoticeLevel::Error).len(), 1);
    }

    // ===== ERROR ROUTING =====

    #[tokio::test]
    async fn test_auth_failure_is_terminal_with_one_notification() {
        let session = MockVoiceSession::new();
        session.script_connect(vec![Err(SessionError::with_status(403, "forbidden"))]);
        let (manager, handler) =
            build_manager(test_config(), session.clone(), MockPermission::granted()).await;

        let result = manager.start().await;
        assert!(matches!(result, Err(ClientError::Connection(_))));

        let status = manager.status().await;
        assert_eq!(status.name(), "error");
        assert_eq!(status.as_error().unwrap().kind, ErrorKind::AuthenticationFailed);
        // non-recoverable errors never start a reconnection run
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!manager.reconnection().is_reconnecting());
        assert_eq!(manager.get_client_stats().await.total_reconnect_attempts, 0);
        assert_eq!(
            handler.notices_at(NoticeLevel::Error),
            vec![ErrorKind::AuthenticationFailed.user_message().to_string()]
        );
    }

    #[tokio::test]
    async fn test_connect_timeout_classifies_as_timeout() {
        let session = MockVoiceSession::new();
        session.set_connect_delay(Duration::from_millis(500));
        let mut config = test_config().with_connect_timeout(Some(Duration::from_millis(50)));
        config.reconnection.enabled = false;
        let (manager, _handler) =
            build_manager(config, session.clone(), MockPermission::granted()).await;

        let result = manager.start().await;
        assert!(result.is_err());
        let status = manager.status().await;
        assert_eq!(status.as_error().unwrap().kind, ErrorKind::TimeoutError);
    }

    #[tokio::test]
    async fn test_stop_preserves_an_existing_error_status() {
        let session = MockVoiceSession::new();
        session.script_connect(vec![Err(SessionError::with_status(403, "forbidden"))]);
        let (manager, _handler) =
            build_manager(test_config(), session.clone(), MockPermission::granted()).await;

        let _ = manager.start().await;
        assert_eq!(manager.status().await.name(), "error");

        manager.stop().await.expect("stop should still succeed");
        assert_eq!(manager.status().await.name(), "error");
        assert!(manager.last_error().await.is_some());
    }

    #[tokio::test]
    async fn test_clear_error_keeps_the_status() {
        let session = MockVoiceSession::new();
        session.script_connect(vec![Err(SessionError::with_status(403, "forbidden"))]);
        let (manager, _handler) =
            build_manager(test_config(), session.clone(), MockPermission::granted()).await;

        let _ = manager.start().await;
        manager.clear_error().await;
        assert!(manager.last_error().await.is_none());
        assert_eq!(manager.status().await.name(), "error");
    }

    #[tokio::test]
    async fn test_retry_recovers_from_a_terminal_error() {
        let session = MockVoiceSession::new();
        session.script_connect(vec![
            Err(SessionError::with_status(403, "forbidden")),
            Ok(()),
        ]);
        let (manager, _handler) =
            build_manager(test_config(), session.clone(), MockPermission::granted()).await;

        let _ = manager.start().await;
        assert_eq!(manager.status().await.name(), "error");

        manager.retry().await.expect("manual retry should succeed");
        wait_for_status(&manager, "active").await;
        assert!(manager.last_error().await.is_none());
        assert_eq!(session.connect_calls.load(Ordering::SeqCst), 2);
    }

    // ===== EVENT WIRING =====

    #[tokio::test]
    async fn test_session_events_are_wired_exactly_once() {
        let session = MockVoiceSession::new();
        let (manager, _handler) =
            build_manager(test_config(), session.clone(), MockPermission::granted()).await;

        assert_eq!(session.subscriber_count(), 1);
        // re-registration is guarded
        manager.wire_session_events();
        manager.wire_session_events();
        assert_eq!(session.subscriber_count(), 1);
    }
}
