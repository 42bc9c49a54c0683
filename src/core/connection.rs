/// Node connection interface and its TCP implementation
///
/// A `Connector` opens one physical connection to one store node; a
/// `NodeConnection` authenticates, switches logical database and executes
/// commands on it. Every call completes (or fails) before returning.
use crate::config::ConnectionConfig;
use crate::error::{RouterError, RouterResult};
use crate::redis::resp::{RespEncoder, RespParser, RespValue};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// One live connection to a single store node
#[async_trait]
pub trait NodeConnection: Send {
    /// Authenticate with the shared password
    async fn authenticate(&mut self, password: &str) -> RouterResult<()>;

    /// Switch the logical database used by subsequent commands
    async fn select_database(&mut self, index: u32) -> RouterResult<()>;

    /// Execute an arbitrary command and return the raw reply
    async fn execute(&mut self, command: &str, args: &[Bytes]) -> RouterResult<RespValue>;
}

/// Factory for node connections
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: NodeConnection + 'static;

    async fn connect(&self, host: &str, port: u16) -> RouterResult<Self::Connection>;
}

/// Connector opening plain TCP connections speaking RESP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    response_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            response_timeout: None,
        }
    }

    /// Bound the wait for each reply
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = Some(response_timeout);
        self
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Connection = RespConnection;

    async fn connect(&self, host: &str, port: u16) -> RouterResult<RespConnection> {
        let address = format!("{}:{}", host, port);
        debug!("Connecting to node {}", address);

        let stream = match timeout(self.connect_timeout, TcpStream::connect(address.as_str())).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!("Connection to node {} failed: {}", address, e);
                return Err(RouterError::connection_failed(address, e.to_string()));
            }
            Err(_) => {
                debug!("Timeout connecting to node {}", address);
                return Err(RouterError::connection_failed(
                    address,
                    format!("timed out after {}ms", self.connect_timeout.as_millis()),
                ));
            }
        };

        // Low latency matters more than throughput for request/reply traffic
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to configure node stream {}: {}", address, e);
        }

        let mut connection = RespConnection::new(stream, address);
        connection.response_timeout = self.response_timeout;
        Ok(connection)
    }
}

/// A RESP2 request/reply connection over TCP
#[derive(Debug)]
pub struct RespConnection {
    stream: TcpStream,
    buffer: BytesMut,
    address: String,
    response_timeout: Option<Duration>,
    // Set while a request is awaiting its reply. Still set on entry means the
    // last exchange never completed and the stream is out of step.
    in_flight: bool,
}

impl RespConnection {
    pub fn new(stream: TcpStream, address: String) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(8192),
            address,
            response_timeout: None,
            in_flight: false,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether an earlier exchange was cut short, leaving an unread reply
    pub fn is_poisoned(&self) -> bool {
        self.in_flight
    }

    /// Send one command and wait for its complete reply
    async fn round_trip(&mut self, command: &str, args: &[Bytes]) -> RouterResult<RespValue> {
        if self.in_flight {
            return Err(RouterError::Network(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} is out of sync after an unfinished exchange", self.address),
            )));
        }

        self.in_flight = true;
        let result = match self.response_timeout {
            Some(limit) => {
                let outcome = timeout(limit, self.exchange(command, args)).await;
                outcome.unwrap_or_else(|_| {
                    warn!("Timeout waiting for {} reply from {}", command, self.address);
                    Err(RouterError::timeout(command))
                })
            }
            None => self.exchange(command, args).await,
        };

        // Only a fully read reply leaves the stream aligned
        if result.is_ok() {
            self.in_flight = false;
        }
        result
    }

    async fn exchange(&mut self, command: &str, args: &[Bytes]) -> RouterResult<RespValue> {
        let request = RespEncoder::encode(&RespEncoder::create_command(command, args));
        self.stream.write_all(&request).await?;

        loop {
            if let Some(reply) = RespParser::parse(&mut self.buffer)? {
                return Ok(reply);
            }

            let read = self.stream.read_buf(&mut self.buffer).await?;
            if read == 0 {
                return Err(RouterError::Network(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} closed the connection", self.address),
                )));
            }
        }
    }
}

#[async_trait]
impl NodeConnection for RespConnection {
    async fn authenticate(&mut self, password: &str) -> RouterResult<()> {
        let args = [Bytes::copy_from_slice(password.as_bytes())];
        match self.round_trip("AUTH", &args).await? {
            RespValue::Error(message) => Err(RouterError::connection_failed(
                self.address.clone(),
                format!("authentication rejected: {}", message),
            )),
            _ => Ok(()),
        }
    }

    async fn select_database(&mut self, index: u32) -> RouterResult<()> {
        let args = [Bytes::from(index.to_string())];
        match self.round_trip("SELECT", &args).await? {
            RespValue::Error(message) => Err(RouterError::node("SELECT", message)),
            _ => Ok(()),
        }
    }

    async fn execute(&mut self, command: &str, args: &[Bytes]) -> RouterResult<RespValue> {
        match self.round_trip(command, args).await? {
            RespValue::Error(message) => Err(RouterError::node(command, message)),
            reply => Ok(reply),
        }
    }
}
