//! Batch transmitter.
//!
//! Sends batches strictly in source order with at most one batch in flight:
//! each batch is serialized, framed, written, and then acknowledged by the
//! peer before the next batch is pulled.

use crate::batch::{Batch, Batcher, RecordSource};
use crate::channel::ReliableChannel;
use crate::error::{ClientError, Phase, RunError};
use batchwire_protocol::{encode_batch, MessageError, Record};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

/// Turns a batch into its wire body.
pub trait BatchSerializer<R> {
    fn serialize(&self, records: &[R], is_final: bool) -> Result<String, MessageError>;
}

impl<R, F> BatchSerializer<R> for F
where
    F: Fn(&[R], bool) -> Result<String, MessageError>,
{
    fn serialize(&self, records: &[R], is_final: bool) -> Result<String, MessageError> {
        self(records, is_final)
    }
}

/// Serializes [`Record`]s as `/`-joined lines under a cardinality line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordSerializer;

impl BatchSerializer<Record> for RecordSerializer {
    fn serialize(&self, records: &[Record], is_final: bool) -> Result<String, MessageError> {
        encode_batch(records, is_final)
    }
}

/// Counters for acknowledged batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Number of acknowledged batches.
    pub batches: usize,
    /// Number of records in acknowledged batches.
    pub records: usize,
    /// Whether the final batch was acknowledged.
    pub completed: bool,
    /// The most recent acknowledgment payload.
    pub last_ack: Option<Bytes>,
}

impl TransferSummary {
    pub(crate) fn acknowledge<R>(&mut self, batch: &Batch<R>, ack: Bytes) {
        self.batches += 1;
        self.records += batch.len();
        self.completed = batch.is_final;
        self.last_ack = Some(ack);
    }
}

/// Sends batches through a [`ReliableChannel`].
#[derive(Debug, Clone)]
pub struct BatchTransmitter<Z> {
    serializer: Z,
}

impl<Z> BatchTransmitter<Z> {
    pub fn new(serializer: Z) -> Self {
        Self { serializer }
    }

    pub fn serializer(&self) -> &Z {
        &self.serializer
    }

    /// Serializes and sends one batch. Returns the body length.
    pub async fn send_batch<S, R>(
        &self,
        channel: &mut ReliableChannel<S>,
        batch: &Batch<R>,
    ) -> Result<usize, ClientError>
    where
        S: AsyncWrite + Unpin,
        Z: BatchSerializer<R>,
    {
        let body = self.serializer.serialize(&batch.records, batch.is_final)?;
        channel.send_framed(body.as_bytes()).await?;
        tracing::debug!(
            "Sent batch {} ({} records, {} bytes, final={})",
            batch.index,
            batch.len(),
            body.len(),
            batch.is_final
        );
        Ok(body.len())
    }

    /// Waits for the acknowledgment of the batch in flight.
    pub async fn receive_ack<S>(&self, channel: &mut ReliableChannel<S>) -> Result<Bytes, ClientError>
    where
        S: AsyncRead + Unpin,
    {
        channel.receive_framed().await
    }

    /// Transmits every batch of `source` over `channel` without any bound on
    /// the acknowledgment wait.
    ///
    /// Stops after the final batch is acknowledged. An empty source sends
    /// nothing. The first failure aborts the transfer; acknowledged batches
    /// are not retried.
    pub async fn run<S, Src>(
        &self,
        channel: &mut ReliableChannel<S>,
        source: Src,
        batch_size: usize,
    ) -> Result<TransferSummary, RunError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        Src: RecordSource,
        Z: BatchSerializer<Src::Record>,
    {
        let mut batcher =
            Batcher::new(source, batch_size).map_err(|e| RunError::new(Phase::Source, None, e))?;
        let mut summary = TransferSummary::default();

        loop {
            let batch = match batcher
                .next_batch()
                .map_err(|e| RunError::new(Phase::Source, Some(summary.batches), e.into()))?
            {
                Some(batch) => batch,
                None => break,
            };

            self.send_batch(channel, &batch)
                .await
                .map_err(|e| RunError::new(Phase::Send, Some(batch.index), e))?;

            let ack = self
                .receive_ack(channel)
                .await
                .map_err(|e| RunError::new(Phase::Receive, Some(batch.index), e))?;
            tracing::debug!("Batch {} acknowledged ({} bytes)", batch.index, ack.len());

            summary.acknowledge(&batch, ack);
            if batch.is_final {
                break;
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::from_records;
    use batchwire_protocol::{decode_batch, BatchHeader};
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;
    use tokio_test::io::Builder;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new(["1".to_string(), format!("name{}", i), "7574".to_string()]))
            .collect()
    }

    /// Acknowledges every batch until the final one, returning the headers seen.
    fn spawn_server(stream: DuplexStream) -> JoinHandle<Vec<BatchHeader>> {
        tokio::spawn(async move {
            let mut channel = ReliableChannel::new(stream);
            let mut headers = Vec::new();
            while let Ok(body) = channel.receive_framed().await {
                let (header, _) = decode_batch(&body).unwrap();
                headers.push(header);
                channel
                    .send_framed(format!("ack {}", header.count).as_bytes())
                    .await
                    .unwrap();
                if header.is_final {
                    break;
                }
            }
            headers
        })
    }

    #[tokio::test]
    async fn test_run_partial_last_batch() {
        let (client, server) = tokio::io::duplex(1024);
        let server = spawn_server(server);
        let mut channel = ReliableChannel::new(client);

        let transmitter = BatchTransmitter::new(RecordSerializer);
        let summary = transmitter
            .run(&mut channel, from_records(records(5)), 2)
            .await
            .unwrap();

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.records, 5);
        assert!(summary.completed);
        assert_eq!(summary.last_ack.as_deref(), Some(&b"ack 1"[..]));

        let headers = server.await.unwrap();
        assert_eq!(
            headers,
            vec![
                BatchHeader::new(2, false),
                BatchHeader::new(2, false),
                BatchHeader::new(1, true),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_exact_multiple() {
        let (client, server) = tokio::io::duplex(1024);
        let server = spawn_server(server);
        let mut channel = ReliableChannel::new(client);

        let summary = BatchTransmitter::new(RecordSerializer)
            .run(&mut channel, from_records(records(4)), 2)
            .await
            .unwrap();
        assert_eq!(summary.batches, 2);

        let headers = server.await.unwrap();
        assert_eq!(
            headers,
            vec![BatchHeader::new(2, false), BatchHeader::new(2, true)]
        );
    }

    #[tokio::test]
    async fn test_run_exact_bytes() {
        let mock = Builder::new()
            .write(b"00092|EOF\na\nb")
            .read(b"0002OK")
            .build();
        let mut channel = ReliableChannel::new(mock);

        let source = from_records(vec![Record::new(["a"]), Record::new(["b"])]);
        let summary = BatchTransmitter::new(RecordSerializer)
            .run(&mut channel, source, 2)
            .await
            .unwrap();
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.last_ack.as_deref(), Some(&b"OK"[..]));
    }

    #[tokio::test]
    async fn test_empty_source_sends_nothing() {
        let mock = Builder::new().build();
        let mut channel = ReliableChannel::new(mock);

        let summary = BatchTransmitter::new(RecordSerializer)
            .run(&mut channel, from_records(Vec::<Record>::new()), 3)
            .await
            .unwrap();
        assert_eq!(summary, TransferSummary::default());
    }

    #[tokio::test]
    async fn test_no_pipelining() {
        let (client, server) = tokio::io::duplex(1024);
        let server = tokio::spawn(async move {
            let mut channel = ReliableChannel::new(server);
            for _ in 0..3 {
                let body = channel.receive_framed().await.unwrap();
                // Nothing else may arrive while this batch is unacknowledged.
                let early =
                    tokio::time::timeout(Duration::from_millis(20), channel.receive_framed()).await;
                assert!(early.is_err(), "second batch sent before acknowledgment");
                channel.send_framed(b"OK").await.unwrap();
                let (header, _) = decode_batch(&body).unwrap();
                if header.is_final {
                    break;
                }
            }
        });

        let mut channel = ReliableChannel::new(client);
        BatchTransmitter::new(RecordSerializer)
            .run(&mut channel, from_records(records(3)), 1)
            .await
            .unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_ack_aborts_with_context() {
        let (client, server) = tokio::io::duplex(1024);
        let server = tokio::spawn(async move {
            let mut channel = ReliableChannel::new(server);
            channel.receive_framed().await.unwrap();
            channel.send_framed(b"OK").await.unwrap();
            channel.receive_framed().await.unwrap();
            // Close without acknowledging the second batch.
        });

        let mut channel = ReliableChannel::new(client);
        let err = BatchTransmitter::new(RecordSerializer)
            .run(&mut channel, from_records(records(6)), 2)
            .await
            .unwrap_err();
        server.await.unwrap();

        assert_eq!(err.phase, Phase::Receive);
        assert_eq!(err.batch, Some(1));
        assert!(matches!(
            err.error,
            ClientError::ConnectionClosed { received: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_serialize_error_aborts_before_write() {
        let mock = Builder::new().write(b"00031\na").read(b"0002OK").build();
        let mut channel = ReliableChannel::new(mock);

        let source = from_records(vec![Record::new(["a"]), Record::new(["b/c"])]);
        let err = BatchTransmitter::new(RecordSerializer)
            .run(&mut channel, source, 1)
            .await
            .unwrap_err();

        assert_eq!(err.phase, Phase::Send);
        assert_eq!(err.batch, Some(1));
        assert!(matches!(err.error, ClientError::Message(_)));
    }

    #[tokio::test]
    async fn test_oversized_batch_fails_fast() {
        let mock = Builder::new().build();
        let mut channel = ReliableChannel::new(mock);

        let big = Record::new(["x".repeat(10_000)]);
        let err = BatchTransmitter::new(RecordSerializer)
            .run(&mut channel, from_records(vec![big]), 1)
            .await
            .unwrap_err();
        assert_eq!(err.phase, Phase::Send);
        assert!(matches!(err.error, ClientError::Frame(_)));
    }

    #[tokio::test]
    async fn test_closure_serializer() {
        let mock = Builder::new()
            .write(b"00071|EOF\n7")
            .read(b"0000")
            .build();
        let mut channel = ReliableChannel::new(mock);

        let serializer = |records: &[u32], is_final: bool| -> Result<String, MessageError> {
            let mut body = BatchHeader::new(records.len(), is_final).to_string();
            for r in records {
                body.push('\n');
                body.push_str(&r.to_string());
            }
            Ok(body)
        };
        let summary = BatchTransmitter::new(serializer)
            .run(&mut channel, from_records(vec![7u32]), 4)
            .await
            .unwrap();
        assert!(summary.completed);
        assert_eq!(summary.last_ack.as_deref(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn test_zero_batch_size() {
        let mock = Builder::new().build();
        let mut channel = ReliableChannel::new(mock);
        let err = BatchTransmitter::new(RecordSerializer)
            .run(&mut channel, from_records(records(2)), 0)
            .await
            .unwrap_err();
        assert_eq!(err.phase, Phase::Source);
        assert!(matches!(err.error, ClientError::InvalidBatchSize));
    }
}
