//! # batchwire-client
//!
//! Client library for batchwire.
//!
//! This crate provides:
//! - A reliable framed channel that hides short reads and short writes
//! - Batch formation with final-batch detection
//! - A batch transmitter with strict one-outstanding-batch ordering
//! - A cancellable runner with bounded acknowledgment waits

pub mod batch;
pub mod channel;
pub mod connection;
pub mod error;
pub mod runner;
pub mod shutdown;
pub mod transmitter;

pub use batch::{from_records, Batch, Batcher, IterSource, Pulled, RecordSource};
pub use channel::ReliableChannel;
pub use connection::{ConnectionMode, Connector, TcpConnector};
pub use error::{ClientError, Phase, RunError, SourceError};
pub use runner::{CancellableRunner, RunState, RunSummary, RunnerConfig, DEFAULT_BATCH_SIZE};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use transmitter::{BatchSerializer, BatchTransmitter, RecordSerializer, TransferSummary};
