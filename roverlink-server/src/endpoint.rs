//! Calls to a rover's own HTTP service.
//!
//! Every rover listens at `http://host:port`. The session manager only talks
//! to it through [`RoverEndpoint`], so tests can substitute a scripted rover.
//!
//! | Call | Request |
//! |------|---------|
//! | handshake | TCP connect to `host:port` |
//! | movement test | `POST /test/movement` |
//! | force stop | `POST /stop` |
//! | release | `POST /disconnect` |
//! | apply radio settings | `POST /sdr/apply` |
//! | verify radio | `POST /sdr/verify` |
//! | transmit GPS | `POST /sdr/txgps` |

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

use roverlink_core::{Direction, GainMode, SdrConfig};

/// Bound on the fire-and-forget calls, which nothing else times out
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointCallError {
    #[error("Rover unreachable: {0}")]
    Transport(String),

    #[error("Rover answered HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<std::io::Error> for EndpointCallError {
    fn from(e: std::io::Error) -> Self {
        EndpointCallError::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for EndpointCallError {
    fn from(e: reqwest::Error) -> Self {
        EndpointCallError::Transport(e.to_string())
    }
}

/// Body of `POST /sdr/apply`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdrApplyPayload {
    /// Device URI of the radio, e.g. `ip:192.168.2.1`
    pub uri: String,
    pub frequency: f64,
    pub bandwidth: f64,
    pub sample_rate: f64,
    pub gain_mode: GainMode,
    pub gain_value: f64,
    pub direction: Direction,
}

impl SdrApplyPayload {
    pub fn new(uri: &str, sdr: &SdrConfig) -> Self {
        SdrApplyPayload {
            uri: uri.to_string(),
            frequency: sdr.frequency,
            bandwidth: sdr.bandwidth,
            sample_rate: sdr.sample_rate,
            gain_mode: sdr.gain_mode,
            gain_value: sdr.gain_value,
            direction: sdr.direction,
        }
    }
}

#[async_trait]
pub trait RoverEndpoint: Send + Sync {
    /// Succeeds once the rover accepts a connection
    async fn handshake(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError>;

    async fn movement_test(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError>;

    async fn force_stop(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError>;

    /// Tell the rover the operator let go of it
    async fn release(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError>;

    async fn apply_sdr(
        &self,
        addr: SocketAddrV4,
        payload: &SdrApplyPayload,
    ) -> Result<Value, EndpointCallError>;

    async fn verify_sdr(&self, addr: SocketAddrV4, uri: &str) -> Result<Value, EndpointCallError>;

    async fn transmit_gps(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError>;
}

pub type SharedEndpoint = Arc<dyn RoverEndpoint>;

/// [`RoverEndpoint`] over plain HTTP
#[derive(Clone, Default)]
pub struct HttpRoverClient {
    client: Client,
}

impl HttpRoverClient {
    pub fn new() -> Self {
        HttpRoverClient {
            client: Client::new(),
        }
    }

    async fn post(
        &self,
        addr: SocketAddrV4,
        path: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<String, EndpointCallError> {
        let mut request = self.client.post(url(addr, path));
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EndpointCallError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

fn url(addr: SocketAddrV4, path: &str) -> String {
    format!("http://{}{}", addr, path)
}

/// Replies are JSON when the rover has something to say, anything else is kept as text
fn reply_value(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl RoverEndpoint for HttpRoverClient {
    async fn handshake(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError> {
        let stream = TcpStream::connect(addr).await?;
        log::debug!("Handshake with {} from {:?}", addr, stream.local_addr().ok());
        Ok(())
    }

    async fn movement_test(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError> {
        self.post(addr, "/test/movement", None, None).await?;
        Ok(())
    }

    async fn force_stop(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError> {
        self.post(addr, "/stop", None, Some(COMMAND_TIMEOUT)).await?;
        Ok(())
    }

    async fn release(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError> {
        self.post(addr, "/disconnect", None, Some(COMMAND_TIMEOUT))
            .await?;
        Ok(())
    }

    async fn apply_sdr(
        &self,
        addr: SocketAddrV4,
        payload: &SdrApplyPayload,
    ) -> Result<Value, EndpointCallError> {
        let body = serde_json::to_value(payload)
            .map_err(|e| EndpointCallError::Transport(e.to_string()))?;
        let text = self
            .post(addr, "/sdr/apply", Some(&body), Some(COMMAND_TIMEOUT))
            .await?;
        Ok(reply_value(text))
    }

    async fn verify_sdr(&self, addr: SocketAddrV4, uri: &str) -> Result<Value, EndpointCallError> {
        let body = serde_json::json!({ "uri": uri });
        let text = self
            .post(addr, "/sdr/verify", Some(&body), Some(COMMAND_TIMEOUT))
            .await?;
        Ok(reply_value(text))
    }

    async fn transmit_gps(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError> {
        self.post(addr, "/sdr/txgps", None, Some(COMMAND_TIMEOUT))
            .await?;
        Ok(())
    }
}
