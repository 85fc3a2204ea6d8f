//! Connection establishment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::io;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Opens the duplex stream a run transmits over.
pub trait Connector {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    fn connect(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Connects to a server over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// `addr` is anything `TcpStream::connect` resolves, e.g. `server:12345`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> impl Future<Output = io::Result<TcpStream>> + Send {
        let addr = self.addr.clone();
        async move {
            tracing::debug!("Connecting to {}...", addr);
            let stream = TcpStream::connect(addr.as_str()).await?;
            // Batches are small and latency bound
            stream.set_nodelay(true).ok();
            Ok(stream)
        }
    }
}

/// How many batches share one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// One connection for the whole run.
    #[default]
    PerRun,
    /// A fresh connection for every batch.
    PerBatch,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::PerRun => write!(f, "per_run"),
            ConnectionMode::PerBatch => write!(f, "per_batch"),
        }
    }
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "per_run" | "per-run" => Ok(ConnectionMode::PerRun),
            "per_batch" | "per-batch" => Ok(ConnectionMode::PerBatch),
            other => Err(format!("unknown connection mode: {}", other)),
        }
    }
}
