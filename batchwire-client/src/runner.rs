//! Cancellable transfer runner.
//!
//! Drives a transfer through `Idle -> Connecting -> Transmitting -> Done`,
//! with a forced move to `Cancelled` or `Failed` from any non-terminal state.
//!
//! The cancellation signal is checked before connecting and before every
//! batch send. While an acknowledgment is outstanding, the read races the
//! cancellation signal and `ack_timeout`; whichever finishes first decides the
//! outcome. The connection is shut down and dropped on every exit path.

use crate::batch::{Batch, Batcher, RecordSource};
use crate::channel::ReliableChannel;
use crate::connection::{ConnectionMode, Connector};
use crate::error::{ClientError, Phase, RunError};
use crate::shutdown::Shutdown;
use crate::transmitter::{BatchSerializer, BatchTransmitter, TransferSummary};
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Identifier used in log lines.
    pub client_id: String,
    /// Maximum number of records per batch.
    pub batch_size: usize,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Bound on each acknowledgment wait.
    pub ack_timeout: Duration,
    /// Pause between an acknowledgment and the next batch.
    pub batch_period: Duration,
    pub mode: ConnectionMode,
}

impl RunnerConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
            batch_period: Duration::ZERO,
            mode: ConnectionMode::PerRun,
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_batch_period(mut self, period: Duration) -> Self {
        self.batch_period = period;
        self
    }

    pub fn with_mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Connecting,
    Transmitting,
    Done,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Cancelled | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Connecting => write!(f, "connecting"),
            RunState::Transmitting => write!(f, "transmitting"),
            RunState::Done => write!(f, "done"),
            RunState::Cancelled => write!(f, "cancelled"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub transfer: TransferSummary,
    /// Number of connections opened.
    pub connections: usize,
}

/// Runs one transfer with cancellation, bounded waits, and scoped connections.
pub struct CancellableRunner<C, Z> {
    config: RunnerConfig,
    connector: C,
    transmitter: BatchTransmitter<Z>,
    shutdown: Shutdown,
    state: RunState,
}

impl<C: Connector, Z> CancellableRunner<C, Z> {
    pub fn new(config: RunnerConfig, connector: C, serializer: Z, shutdown: Shutdown) -> Self {
        Self {
            config,
            connector,
            transmitter: BatchTransmitter::new(serializer),
            shutdown,
            state: RunState::Idle,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Current state; terminal once `run` returns.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Transmits every record of `source`.
    ///
    /// Returns once the final batch is acknowledged, the source turns out to
    /// be empty, the cancellation signal is observed, or any step fails.
    pub async fn run<Src>(&mut self, source: Src) -> Result<RunSummary, RunError>
    where
        Src: RecordSource,
        Z: BatchSerializer<Src::Record>,
    {
        self.state = RunState::Idle;
        let mut summary = RunSummary::default();
        let result = self.execute(source, &mut summary).await;

        let id = self.config.client_id.clone();
        match &result {
            Ok(()) => {
                self.transition(RunState::Done);
                tracing::info!(
                    "action: transfer_finished | result: success | client_id: {} | batches: {} | records: {}",
                    id,
                    summary.transfer.batches,
                    summary.transfer.records
                );
            }
            Err(e) if e.is_cancelled() => {
                self.transition(RunState::Cancelled);
                tracing::info!(
                    "action: shutdown_requested | result: success | client_id: {} | msg: stopping_gracefully | phase: {} | batches: {}",
                    id,
                    e.phase,
                    summary.transfer.batches
                );
            }
            Err(e) => {
                self.transition(RunState::Failed);
                tracing::error!(
                    "action: transfer | result: fail | client_id: {} | error: {}",
                    id,
                    e
                );
            }
        }

        result.map(|()| summary)
    }

    async fn execute<Src>(&mut self, source: Src, summary: &mut RunSummary) -> Result<(), RunError>
    where
        Src: RecordSource,
        Z: BatchSerializer<Src::Record>,
    {
        if self.shutdown.is_cancelled() {
            return Err(RunError::cancelled(Phase::Connect, None));
        }

        let mut batcher = Batcher::new(source, self.config.batch_size)
            .map_err(|e| RunError::new(Phase::Source, None, e))?;
        let mut next = Self::pull(&mut batcher, summary.transfer.batches)?;

        while let Some(batch) = next {
            if self.shutdown.is_cancelled() {
                return Err(RunError::cancelled(Phase::Connect, Some(batch.index)));
            }

            let mut channel = self.connect(batch.index).await?;
            summary.connections += 1;

            let outcome = self
                .session(&mut channel, batch, &mut batcher, &mut summary.transfer)
                .await;
            self.release(channel).await;
            next = outcome?;
        }

        Ok(())
    }

    /// Sends batches over one connection, starting with `first`.
    ///
    /// Returns the next batch when it needs a fresh connection, or `None` once
    /// the transfer is complete.
    async fn session<S, Src>(
        &mut self,
        channel: &mut ReliableChannel<S>,
        first: Batch<Src::Record>,
        batcher: &mut Batcher<Src>,
        transfer: &mut TransferSummary,
    ) -> Result<Option<Batch<Src::Record>>, RunError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        Src: RecordSource,
        Z: BatchSerializer<Src::Record>,
    {
        let mut batch = first;
        loop {
            if self.shutdown.is_cancelled() {
                return Err(RunError::cancelled(Phase::Send, Some(batch.index)));
            }

            self.transmitter
                .send_batch(channel, &batch)
                .await
                .map_err(|e| RunError::new(Phase::Send, Some(batch.index), e))?;

            let ack = self.await_ack(channel, batch.index).await?;
            tracing::info!(
                "action: batch_acknowledged | result: success | client_id: {} | batch: {} | records: {} | final: {} | ack: {}",
                self.config.client_id,
                batch.index,
                batch.len(),
                batch.is_final,
                String::from_utf8_lossy(&ack)
            );
            transfer.acknowledge(&batch, ack);

            if batch.is_final {
                return Ok(None);
            }

            self.pause(batch.index + 1).await?;

            batch = match Self::pull(batcher, transfer.batches)? {
                Some(next) => next,
                None => return Ok(None),
            };
            if self.config.mode == ConnectionMode::PerBatch {
                return Ok(Some(batch));
            }
        }
    }

    fn pull<Src: RecordSource>(
        batcher: &mut Batcher<Src>,
        index: usize,
    ) -> Result<Option<Batch<Src::Record>>, RunError> {
        batcher
            .next_batch()
            .map_err(|e| RunError::new(Phase::Source, Some(index), e.into()))
    }

    async fn connect(&mut self, index: usize) -> Result<ReliableChannel<C::Stream>, RunError> {
        self.transition(RunState::Connecting);

        let timeout = self.config.connect_timeout;
        let connector = &self.connector;
        let shutdown = &mut self.shutdown;

        let stream = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                return Err(RunError::cancelled(Phase::Connect, Some(index)));
            }
            result = tokio::time::timeout(timeout, connector.connect()) => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::error!(
                        "action: connect | result: fail | client_id: {} | error: {}",
                        self.config.client_id,
                        e
                    );
                    return Err(RunError::new(Phase::Connect, Some(index), ClientError::Connect(e)));
                }
                Err(_) => {
                    tracing::error!(
                        "action: connect | result: fail | client_id: {} | error: timeout",
                        self.config.client_id
                    );
                    return Err(RunError::new(
                        Phase::Connect,
                        Some(index),
                        ClientError::Timeout(timeout),
                    ));
                }
            }
        };

        tracing::info!(
            "action: connect | result: success | client_id: {}",
            self.config.client_id
        );
        self.transition(RunState::Transmitting);
        Ok(ReliableChannel::new(stream))
    }

    /// Waits for one acknowledgment, racing cancellation and the timeout.
    async fn await_ack<S>(
        &mut self,
        channel: &mut ReliableChannel<S>,
        index: usize,
    ) -> Result<Bytes, RunError>
    where
        S: AsyncRead + Unpin,
    {
        let timeout = self.config.ack_timeout;
        let transmitter = &self.transmitter;
        let shutdown = &mut self.shutdown;

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(RunError::cancelled(Phase::Receive, Some(index))),
            result = tokio::time::timeout(timeout, transmitter.receive_ack(channel)) => match result {
                Ok(Ok(ack)) => Ok(ack),
                Ok(Err(e)) => {
                    tracing::error!(
                        "action: receive_message | result: fail | client_id: {} | batch: {} | error: {}",
                        self.config.client_id,
                        index,
                        e
                    );
                    Err(RunError::new(Phase::Receive, Some(index), e))
                }
                Err(_) => {
                    tracing::error!(
                        "action: receive_timeout | result: fail | client_id: {} | batch: {}",
                        self.config.client_id,
                        index
                    );
                    Err(RunError::new(Phase::Receive, Some(index), ClientError::Timeout(timeout)))
                }
            }
        }
    }

    /// Sleeps for the configured batch period unless cancelled first.
    async fn pause(&mut self, next_index: usize) -> Result<(), RunError> {
        let period = self.config.batch_period;
        if period.is_zero() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(RunError::cancelled(Phase::Send, Some(next_index))),
            _ = tokio::time::sleep(period) => Ok(()),
        }
    }

    async fn release<S: AsyncWrite + Unpin>(&self, mut channel: ReliableChannel<S>) {
        if let Err(e) = channel.shutdown().await {
            tracing::debug!("Connection shutdown error: {}", e);
        }
        drop(channel);
        tracing::info!(
            "action: closing_connection | result: success | client_id: {}",
            self.config.client_id
        );
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!("Run state {} -> {}", self.state, next);
        self.state = next;
    }
}
