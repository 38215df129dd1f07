//! TCP connect latency probing
//!
//! A probe opens a TCP connection to a server, measures how long the
//! handshake took and drops the connection without sending anything.

use crate::error::ProbeError;
use async_trait::async_trait;
use std::io;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Measures connect latency to one endpoint
#[async_trait]
pub trait LatencyProber: Send + Sync {
    /// Connect to `address` (`host:port`) within `max_latency` and return
    /// the elapsed connect time
    async fn probe(&self, address: &str, max_latency: Duration) -> Result<Duration, ProbeError>;
}

/// Prober that measures raw TCP handshake time
#[derive(Debug, Clone, Default)]
pub struct TcpProber;

impl TcpProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LatencyProber for TcpProber {
    async fn probe(&self, address: &str, max_latency: Duration) -> Result<Duration, ProbeError> {
        let start = Instant::now();

        let stream = match timeout(max_latency, TcpStream::connect(address)).await {
            Err(_) => return Err(ProbeError::Timeout(max_latency)),
            Ok(Err(e)) => return Err(classify_connect_error(e, max_latency)),
            Ok(Ok(stream)) => stream,
        };

        let elapsed = start.elapsed();
        drop(stream);

        check_budget(elapsed, max_latency)
    }
}

/// Join an IP (v4 or v6) and a port into a connectable address
pub fn endpoint_address(ip: &str, port: u16) -> String {
    if ip.contains(':') && !ip.starts_with('[') {
        format!("[{}]:{}", ip, port)
    } else {
        format!("{}:{}", ip, port)
    }
}

/// A connection that completed but took longer than the budget still counts as too slow
pub fn check_budget(elapsed: Duration, max_latency: Duration) -> Result<Duration, ProbeError> {
    if elapsed > max_latency {
        Err(ProbeError::Timeout(max_latency))
    } else {
        Ok(elapsed)
    }
}

/// Map a connect failure to the probe taxonomy
pub fn classify_connect_error(error: io::Error, max_latency: Duration) -> ProbeError {
    match error.kind() {
        io::ErrorKind::TimedOut => ProbeError::Timeout(max_latency),
        _ => ProbeError::Other(error.to_string()),
    }
}
