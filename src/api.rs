use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::ValueEnum;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use url::Url;

pub const PROBE_TIMEOUT: Duration = Duration::from_millis(3000);
const CAMERA_STREAM_PORT: u16 = 81;
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum RobotCommand {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    Horn,
}

impl RobotCommand {
    #[must_use]
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::Stop => "stop",
            Self::Horn => "horn",
        }
    }

    #[must_use]
    pub fn is_directional(self) -> bool {
        matches!(self, Self::Forward | Self::Backward | Self::Left | Self::Right)
    }
}

impl fmt::Display for RobotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum RobotMode {
    Free,
    #[value(name = "line", alias = "line-follower")]
    LineFollower,
    #[value(name = "obstacle", alias = "obstacle-avoidance")]
    ObstacleAvoidance,
}

impl RobotMode {
    #[must_use]
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::LineFollower => "line",
            Self::ObstacleAvoidance => "obstacle",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Free => "Free Drive",
            Self::LineFollower => "Line Follower",
            Self::ObstacleAvoidance => "Obstacle Avoidance",
        }
    }
}

impl fmt::Display for RobotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_value())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    // The first two are refused before any network activity.
    #[error("robot address is not configured")]
    NotConfigured,
    #[error("device address '{0}' is not usable in a URL")]
    BadAddress(String),
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
}

// One fire-and-forget GET. Any response resolves with its status code and the
// body is never read; only transport-level failure is an error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, url: &Url) -> Result<u16>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    // No request timeout on the client; probes bound their own wait with a
    // timer and command sends stay in flight until the device answers.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &Url) -> Result<u16> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        Ok(response.status().as_u16())
    }
}

pub struct RobotClient {
    robot_addr: Option<String>,
    camera_addr: Option<String>,
    transport: Arc<dyn Transport>,
}

impl RobotClient {
    pub fn new(robot_addr: Option<String>, camera_addr: Option<String>) -> Result<Self> {
        Ok(Self::with_transport(
            robot_addr,
            camera_addr,
            Arc::new(HttpTransport::new()?),
        ))
    }

    #[must_use]
    pub fn with_transport(
        robot_addr: Option<String>,
        camera_addr: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            robot_addr,
            camera_addr,
            transport,
        }
    }

    pub async fn send_command(&self, command: RobotCommand) -> Result<(), ApiError> {
        self.send_robot_request("cmd", &[("cmd", command.wire_value())])
            .await
    }

    pub async fn set_mode(&self, mode: RobotMode) -> Result<(), ApiError> {
        self.send_robot_request("mode", &[("mode", mode.wire_value())])
            .await
    }

    // Any response inside the window counts as reachable, whatever the status.
    pub async fn test_controller(&self) -> bool {
        let Some(host) = configured(self.robot_addr.as_deref()) else {
            return false;
        };
        let Ok(url) = build_url(host, None, "", &[]) else {
            return false;
        };
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, self.transport.send(&url)).await,
            Ok(Ok(_))
        )
    }

    // The MJPEG stream never completes, so a success-status response header
    // inside the window is the signal. The `_` parameter defeats any cache
    // between us and the camera.
    pub async fn test_camera(&self) -> bool {
        let Some(host) = configured(self.camera_addr.as_deref()) else {
            return false;
        };
        let cache_buster = now_unix_millis().to_string();
        let Ok(url) = build_url(
            host,
            Some(CAMERA_STREAM_PORT),
            "stream",
            &[("_", cache_buster.as_str())],
        ) else {
            return false;
        };
        match tokio::time::timeout(PROBE_TIMEOUT, self.transport.send(&url)).await {
            Ok(Ok(status)) => (200..300).contains(&status),
            _ => false,
        }
    }

    #[must_use]
    pub fn camera_stream_url(&self) -> Option<String> {
        let host = configured(self.camera_addr.as_deref())?;
        Some(format!("http://{host}:{CAMERA_STREAM_PORT}/stream"))
    }

    async fn send_robot_request(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<(), ApiError> {
        let host = configured(self.robot_addr.as_deref()).ok_or(ApiError::NotConfigured)?;
        let url = build_url(host, None, endpoint, params)?;
        match self.transport.send(&url).await {
            // The response itself is ignored: any answer means the command
            // reached the device.
            Ok(_status) => Ok(()),
            Err(err) => Err(ApiError::Transport {
                url: url.to_string(),
                reason: format!("{err:#}"),
            }),
        }
    }
}

fn configured(addr: Option<&str>) -> Option<&str> {
    addr.map(str::trim).filter(|a| !a.is_empty())
}

fn build_url(
    host: &str,
    port: Option<u16>,
    path: &str,
    params: &[(&str, &str)],
) -> Result<Url, ApiError> {
    let authority = match port {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    let mut url = Url::parse(&format!("http://{authority}/{path}"))
        .map_err(|_| ApiError::BadAddress(host.to_owned()))?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url)
}

fn now_unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use parking_lot::Mutex;

    enum FakeOutcome {
        Status(u16),
        Fail,
        Delay(Duration, u16),
    }

    struct FakeTransport {
        outcome: FakeOutcome,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(outcome: FakeOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, url: &Url) -> Result<u16> {
            self.calls.lock().push(url.to_string());
            match self.outcome {
                FakeOutcome::Status(code) => Ok(code),
                FakeOutcome::Fail => Err(anyhow!("connection refused")),
                FakeOutcome::Delay(wait, code) => {
                    tokio::time::sleep(wait).await;
                    Ok(code)
                }
            }
        }
    }

    fn client_with(outcome: FakeOutcome) -> (RobotClient, Arc<FakeTransport>) {
        let transport = FakeTransport::new(outcome);
        let client = RobotClient::with_transport(
            Some("192.168.4.1".to_owned()),
            Some("192.168.4.2".to_owned()),
            transport.clone(),
        );
        (client, transport)
    }

    #[tokio::test]
    async fn command_url_carries_wire_value() {
        let (client, transport) = client_with(FakeOutcome::Status(200));
        client.send_command(RobotCommand::Forward).await.unwrap();
        assert_eq!(
            transport.calls(),
            vec!["http://192.168.4.1/cmd?cmd=forward".to_owned()]
        );
    }

    #[tokio::test]
    async fn mode_url_uses_short_wire_names() {
        let (client, transport) = client_with(FakeOutcome::Status(200));
        client
            .set_mode(RobotMode::ObstacleAvoidance)
            .await
            .unwrap();
        assert_eq!(
            transport.calls(),
            vec!["http://192.168.4.1/mode?mode=obstacle".to_owned()]
        );
    }

    #[tokio::test]
    async fn missing_robot_address_is_a_precondition_failure() {
        let transport = FakeTransport::new(FakeOutcome::Status(200));
        let client = RobotClient::with_transport(None, None, transport.clone());

        let err = client.send_command(RobotCommand::Stop).await.unwrap_err();
        assert!(matches!(err, ApiError::NotConfigured));
        let err = client.set_mode(RobotMode::Free).await.unwrap_err();
        assert!(matches!(err, ApiError::NotConfigured));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_robot_address_counts_as_missing() {
        let transport = FakeTransport::new(FakeOutcome::Status(200));
        let client =
            RobotClient::with_transport(Some("   ".to_owned()), None, transport.clone());

        let err = client.send_command(RobotCommand::Horn).await.unwrap_err();
        assert!(matches!(err, ApiError::NotConfigured));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn unusable_address_is_rejected_before_sending() {
        let transport = FakeTransport::new(FakeOutcome::Status(200));
        let client = RobotClient::with_transport(
            Some("not a host".to_owned()),
            None,
            transport.clone(),
        );

        let err = client.send_command(RobotCommand::Forward).await.unwrap_err();
        assert!(matches!(err, ApiError::BadAddress(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn command_send_ignores_http_status() {
        let (client, _) = client_with(FakeOutcome::Status(500));
        assert!(client.send_command(RobotCommand::Left).await.is_ok());
    }

    #[tokio::test]
    async fn command_transport_failure_names_the_url() {
        let (client, _) = client_with(FakeOutcome::Fail);
        let err = client.send_command(RobotCommand::Right).await.unwrap_err();
        match err {
            ApiError::Transport { url, .. } => assert!(url.contains("/cmd?cmd=right")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn controller_probe_true_on_any_response() {
        let (client, transport) = client_with(FakeOutcome::Status(404));
        assert!(client.test_controller().await);
        assert_eq!(transport.calls(), vec!["http://192.168.4.1/".to_owned()]);
    }

    #[tokio::test]
    async fn controller_probe_false_on_transport_failure() {
        let (client, _) = client_with(FakeOutcome::Fail);
        assert!(!client.test_controller().await);
    }

    #[tokio::test]
    async fn controller_probe_false_without_address() {
        let transport = FakeTransport::new(FakeOutcome::Status(200));
        let client = RobotClient::with_transport(None, None, transport.clone());
        assert!(!client.test_controller().await);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn controller_probe_times_out_after_three_seconds() {
        let (client, transport) =
            client_with(FakeOutcome::Delay(Duration::from_millis(3001), 200));
        assert!(!client.test_controller().await);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn controller_probe_succeeds_just_inside_window() {
        let (client, _) = client_with(FakeOutcome::Delay(Duration::from_millis(2999), 200));
        assert!(client.test_controller().await);
    }

    #[tokio::test]
    async fn repeated_probes_give_stable_answers() {
        let (client, transport) = client_with(FakeOutcome::Status(200));
        assert!(client.test_controller().await);
        assert!(client.test_controller().await);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn camera_probe_appends_cache_buster() {
        let (client, transport) = client_with(FakeOutcome::Status(200));
        assert!(client.test_camera().await);
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("http://192.168.4.2:81/stream?_="));
    }

    #[tokio::test]
    async fn camera_probe_requires_success_status() {
        let (client, _) = client_with(FakeOutcome::Status(404));
        assert!(!client.test_camera().await);
    }

    #[tokio::test]
    async fn camera_probe_false_without_address() {
        let transport = FakeTransport::new(FakeOutcome::Status(200));
        let client = RobotClient::with_transport(
            Some("192.168.4.1".to_owned()),
            None,
            transport.clone(),
        );
        assert!(!client.test_camera().await);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn camera_probe_timeout_just_past_window_settles_false() {
        let (client, transport) =
            client_with(FakeOutcome::Delay(Duration::from_millis(3001), 200));
        assert!(!client.test_camera().await);
        // One attempt only; the timed-out request is dropped, not retried.
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn camera_probe_success_just_inside_window() {
        let (client, _) = client_with(FakeOutcome::Delay(Duration::from_millis(2999), 200));
        assert!(client.test_camera().await);
    }

    #[test]
    fn wire_values_match_firmware() {
        assert_eq!(RobotCommand::Forward.wire_value(), "forward");
        assert_eq!(RobotCommand::Horn.wire_value(), "horn");
        assert_eq!(RobotMode::LineFollower.wire_value(), "line");
        assert_eq!(RobotMode::ObstacleAvoidance.wire_value(), "obstacle");
        assert!(RobotCommand::Left.is_directional());
        assert!(!RobotCommand::Stop.is_directional());
    }

    #[test]
    fn stream_url_hides_probe_parameter() {
        let transport = FakeTransport::new(FakeOutcome::Status(200));
        let client = RobotClient::with_transport(
            None,
            Some("10.0.0.7".to_owned()),
            transport,
        );
        assert_eq!(
            client.camera_stream_url().as_deref(),
            Some("http://10.0.0.7:81/stream")
        );
    }
}
