use crate::api::{ApiError, RobotClient};
use parking_lot::RwLock;
use serde::Serialize;

// Only a probe cycle moves these statuses; command traffic never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Unknown,
    Testing,
    Success,
    Failed,
}

impl ConnectionStatus {
    #[must_use]
    pub fn from_probe(reachable: bool) -> Self {
        if reachable { Self::Success } else { Self::Failed }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "not tested",
            Self::Testing => "testing",
            Self::Success => "reachable",
            Self::Failed => "unreachable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionSnapshot {
    pub robot: ConnectionStatus,
    pub camera: ConnectionStatus,
    // Set by any failed command send, cleared by the next successful one,
    // independent of the probe statuses above.
    pub command_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_command_error: Option<String>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            robot: ConnectionStatus::Unknown,
            camera: ConnectionStatus::Unknown,
            command_error: false,
            last_command_error: None,
        }
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SessionState {
    inner: RwLock<SessionSnapshot>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SessionSnapshot::new()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().clone()
    }

    pub fn set_robot_status(&self, status: ConnectionStatus) {
        self.inner.write().robot = status;
    }

    pub fn set_camera_status(&self, status: ConnectionStatus) {
        self.inner.write().camera = status;
    }

    pub fn record_command_success(&self) {
        let mut state = self.inner.write();
        state.command_error = false;
        state.last_command_error = None;
    }

    pub fn record_command_failure(&self, error: &ApiError) {
        let mut state = self.inner.write();
        state.command_error = true;
        state.last_command_error = Some(error.to_string());
    }

    // Old probe results say nothing about a newly configured device.
    pub fn reset(&self) {
        *self.inner.write() = SessionSnapshot::new();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

// The controller result lands before the camera is touched so the UI can show
// per-device progress.
pub async fn run_connection_test(client: &RobotClient, state: &SessionState) {
    state.set_robot_status(ConnectionStatus::Testing);
    let robot_ok = client.test_controller().await;
    state.set_robot_status(ConnectionStatus::from_probe(robot_ok));

    state.set_camera_status(ConnectionStatus::Testing);
    let camera_ok = client.test_camera().await;
    state.set_camera_status(ConnectionStatus::from_probe(camera_ok));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Transport;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use url::Url;

    struct ObservingTransport {
        state: Arc<SessionState>,
        seen: Mutex<Vec<(ConnectionStatus, ConnectionStatus)>>,
        reachable: bool,
    }

    #[async_trait]
    impl Transport for ObservingTransport {
        async fn send(&self, _url: &Url) -> anyhow::Result<u16> {
            let snap = self.state.snapshot();
            self.seen.lock().push((snap.robot, snap.camera));
            if self.reachable {
                Ok(200)
            } else {
                Err(anyhow!("host unreachable"))
            }
        }
    }

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn send(&self, _url: &Url) -> anyhow::Result<u16> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(200)
        }
    }

    fn observed_client(
        reachable: bool,
    ) -> (RobotClient, Arc<SessionState>, Arc<ObservingTransport>) {
        let state = Arc::new(SessionState::new());
        let transport = Arc::new(ObservingTransport {
            state: state.clone(),
            seen: Mutex::new(Vec::new()),
            reachable,
        });
        let client = RobotClient::with_transport(
            Some("192.168.4.1".to_owned()),
            Some("192.168.4.2".to_owned()),
            transport.clone(),
        );
        (client, state, transport)
    }

    #[test]
    fn command_failure_sets_flag_and_success_clears_it() {
        let state = SessionState::new();
        state.record_command_failure(&ApiError::NotConfigured);

        let snap = state.snapshot();
        assert!(snap.command_error);
        assert!(snap.last_command_error.is_some());

        state.record_command_success();
        let snap = state.snapshot();
        assert!(!snap.command_error);
        assert!(snap.last_command_error.is_none());
    }

    #[test]
    fn probe_results_never_touch_the_command_flag() {
        let state = SessionState::new();
        state.record_command_failure(&ApiError::NotConfigured);

        state.set_robot_status(ConnectionStatus::Success);
        state.set_camera_status(ConnectionStatus::Success);
        assert!(state.snapshot().command_error);
    }

    #[test]
    fn reset_returns_everything_to_unknown() {
        let state = SessionState::new();
        state.set_robot_status(ConnectionStatus::Failed);
        state.set_camera_status(ConnectionStatus::Testing);
        state.record_command_failure(&ApiError::NotConfigured);

        state.reset();
        assert_eq!(state.snapshot(), SessionSnapshot::new());
    }

    #[tokio::test]
    async fn connection_test_marks_controller_before_camera() {
        let (client, state, transport) = observed_client(true);
        run_connection_test(&client, &state).await;

        let seen = transport.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                (ConnectionStatus::Testing, ConnectionStatus::Unknown),
                (ConnectionStatus::Success, ConnectionStatus::Testing),
            ]
        );
    }

    #[tokio::test]
    async fn controller_failure_still_runs_the_camera_probe() {
        let (client, state, transport) = observed_client(false);
        run_connection_test(&client, &state).await;

        let seen = transport.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                (ConnectionStatus::Testing, ConnectionStatus::Unknown),
                (ConnectionStatus::Failed, ConnectionStatus::Testing),
            ]
        );
        let snap = state.snapshot();
        assert_eq!(snap.robot, ConnectionStatus::Failed);
        assert_eq!(snap.camera, ConnectionStatus::Failed);
    }

    #[tokio::test]
    async fn connection_test_without_addresses_fails_both_without_calls() {
        let state = Arc::new(SessionState::new());
        let transport = Arc::new(ObservingTransport {
            state: state.clone(),
            seen: Mutex::new(Vec::new()),
            reachable: true,
        });
        let client = RobotClient::with_transport(None, None, transport.clone());

        run_connection_test(&client, &state).await;
        assert!(transport.seen.lock().is_empty());
        let snap = state.snapshot();
        assert_eq!(snap.robot, ConnectionStatus::Failed);
        assert_eq!(snap.camera, ConnectionStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_timeout_lands_as_failed_status() {
        let state = SessionState::new();
        let client = RobotClient::with_transport(
            Some("192.168.4.1".to_owned()),
            Some("192.168.4.2".to_owned()),
            Arc::new(StalledTransport),
        );

        run_connection_test(&client, &state).await;
        let snap = state.snapshot();
        assert_eq!(snap.robot, ConnectionStatus::Failed);
        assert_eq!(snap.camera, ConnectionStatus::Failed);
        assert!(!snap.command_error);
    }
}
