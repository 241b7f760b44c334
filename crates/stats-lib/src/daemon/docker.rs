//! Docker Engine API client
//!
//! Speaks HTTP/1.1 to the daemon over its Unix socket or a TCP endpoint:
//! - `GET /containers/json` to list running containers
//! - `GET /containers/{id}/stats?stream=1|0` for the stats feed
//!
//! The stats feed is newline-delimited JSON delivered in arbitrary chunks,
//! so the body is re-framed into one record per line, each at most
//! [`MAX_RECORD_BYTES`] long.

use super::{async_trait, RecordFeed, TelemetryFeed, TelemetrySource};
use crate::error::DaemonError;
use crate::models::{ContainerRef, PlatformTag};
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::{header, Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::io::StreamReader;
use tracing::debug;

/// Default endpoint when neither configuration nor `DOCKER_HOST` name one
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Longest stats record accepted before the feed is treated as broken
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

const USER_AGENT: &str = concat!("stats-dump/", env!("CARGO_PKG_VERSION"));

/// Where the daemon listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl DockerEndpoint {
    /// Parse a `DOCKER_HOST` style address
    pub fn parse(host: &str) -> Result<Self, DaemonError> {
        let host = host.trim();

        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(DaemonError::InvalidEndpoint(host.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        let address = host
            .strip_prefix("tcp://")
            .or_else(|| host.strip_prefix("http://"))
            .map(|address| address.trim_end_matches('/'))
            .ok_or_else(|| DaemonError::InvalidEndpoint(host.to_string()))?;

        if address.is_empty() {
            return Err(DaemonError::InvalidEndpoint(host.to_string()));
        }
        Ok(Self::Tcp(address.to_string()))
    }

    fn host_header(&self) -> &str {
        match self {
            // The daemon ignores the host on its socket but HTTP/1.1 requires one
            Self::Unix(_) => "docker",
            Self::Tcp(address) => address,
        }
    }
}

impl fmt::Display for DockerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(address) => write!(f, "tcp://{}", address),
        }
    }
}

/// Client for the subset of the Docker Engine API the collector uses
#[derive(Debug, Clone)]
pub struct DockerClient {
    endpoint: DockerEndpoint,
    api_version: Option<String>,
}

impl DockerClient {
    pub fn new(endpoint: DockerEndpoint) -> Self {
        Self {
            endpoint,
            api_version: None,
        }
    }

    /// Create a client from a `DOCKER_HOST` style address
    pub fn from_host(host: &str) -> Result<Self, DaemonError> {
        DockerEndpoint::parse(host).map(Self::new)
    }

    /// Pin requests to an API version such as `1.41`; unpinned requests use
    /// the daemon's current version
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        let version = version.trim().trim_start_matches('v');
        self.api_version = (!version.is_empty()).then(|| format!("v{}", version));
        self
    }

    pub fn endpoint(&self) -> &DockerEndpoint {
        &self.endpoint
    }

    fn request_path(&self, path: &str) -> String {
        match &self.api_version {
            Some(version) => format!("/{}{}", version, path),
            None => path.to_string(),
        }
    }

    /// Issue a GET and fail on non-success statuses
    async fn get(&self, path: &str) -> Result<Response<Incoming>, DaemonError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(self.request_path(path))
            .header(header::HOST, self.endpoint.host_header())
            .header(header::USER_AGENT, USER_AGENT)
            .body(Empty::<Bytes>::new())?;

        let response = match &self.endpoint {
            #[cfg(unix)]
            DockerEndpoint::Unix(socket_path) => {
                let stream = tokio::net::UnixStream::connect(socket_path)
                    .await
                    .map_err(|source| self.connect_error(source))?;
                Self::exchange(stream, request).await?
            }
            #[cfg(not(unix))]
            DockerEndpoint::Unix(_) => {
                return Err(DaemonError::InvalidEndpoint(self.endpoint.to_string()));
            }
            DockerEndpoint::Tcp(address) => {
                let stream = TcpStream::connect(address)
                    .await
                    .map_err(|source| self.connect_error(source))?;
                Self::exchange(stream, request).await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.into_body().collect().await?.to_bytes();
            return Err(DaemonError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response)
    }

    fn connect_error(&self, source: std::io::Error) -> DaemonError {
        DaemonError::Connect {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }

    /// Send one request on a fresh HTTP/1.1 connection
    async fn exchange<S>(
        stream: S,
        request: Request<Empty<Bytes>>,
    ) -> Result<Response<Incoming>, DaemonError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, connection) = http1::handshake(TokioIo::new(stream)).await?;

        // Drives the connection until the response body is consumed or dropped
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "Daemon connection closed with error");
            }
        });

        Ok(sender.send_request(request).await?)
    }
}

#[async_trait]
impl TelemetrySource for DockerClient {
    async fn list_workloads(&self) -> Result<Vec<ContainerRef>, DaemonError> {
        let response = self.get("/containers/json").await?;
        let body = response.into_body().collect().await?.to_bytes();
        let containers: Vec<ContainerRef> = serde_json::from_slice(&body)?;

        debug!(count = containers.len(), "Listed running containers");
        Ok(containers)
    }

    async fn open_feed(
        &self,
        container: &ContainerRef,
        streaming: bool,
    ) -> Result<TelemetryFeed, DaemonError> {
        let path = format!(
            "/containers/{}/stats?stream={}",
            container.id,
            if streaming { 1 } else { 0 }
        );
        let response = self.get(&path).await?;

        let platform = response
            .headers()
            .get("ostype")
            .and_then(|value| value.to_str().ok())
            .map(PlatformTag::from_os_type)
            .unwrap_or_default();

        debug!(container_id = %container.id, platform = %platform, "Opened stats feed");

        // Trailers carry no records and are dropped by the data stream
        let body = response
            .into_body()
            .into_data_stream()
            .map(|chunk| chunk.map_err(io::Error::other));

        Ok(TelemetryFeed::new(
            platform,
            DockerStatsFeed::new(body, MAX_RECORD_BYTES),
        ))
    }
}

type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Streaming body of a stats request, framed on line breaks
struct DockerStatsFeed {
    records: FramedRead<StreamReader<BodyStream, Bytes>, AnyDelimiterCodec>,
    max_record_bytes: usize,
}

impl DockerStatsFeed {
    fn new<S>(body: S, max_record_bytes: usize) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let body: BodyStream = Box::pin(body);
        let codec =
            AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_record_bytes);

        Self {
            records: FramedRead::new(StreamReader::new(body), codec),
            max_record_bytes,
        }
    }
}

#[async_trait]
impl RecordFeed for DockerStatsFeed {
    /// Next non-blank line; a trailing record without a line break is
    /// returned once the body ends
    async fn next_record(&mut self) -> Result<Option<Bytes>, DaemonError> {
        while let Some(frame) = self.records.next().await {
            match frame {
                Ok(record) if is_blank(&record) => continue,
                Ok(record) => return Ok(Some(record)),
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    return Err(DaemonError::RecordTooLarge {
                        limit: self.max_record_bytes,
                    });
                }
                Err(AnyDelimiterCodecError::Io(e)) => return Err(DaemonError::Feed(e)),
            }
        }
        Ok(None)
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// Docker wraps errors as `{"message": "..."}`; fall back to the raw body
fn error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}
