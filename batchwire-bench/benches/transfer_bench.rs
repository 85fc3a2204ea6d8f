//! End-to-end transfer benchmarks over in-memory connections.

use batchwire_client::{
    batch::from_records, shutdown, CancellableRunner, Connector, ReliableChannel,
    RecordSerializer, RunnerConfig,
};
use batchwire_protocol::{decode_batch, Record};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::future::Future;
use std::io;
use tokio::io::DuplexStream;
use tokio::runtime::Runtime;

/// Spawns an acknowledging server behind every connection.
struct LoopbackConnector;

impl Connector for LoopbackConnector {
    type Stream = DuplexStream;

    fn connect(&self) -> impl Future<Output = io::Result<DuplexStream>> + Send {
        async {
            let (client, server) = tokio::io::duplex(64 * 1024);
            tokio::spawn(async move {
                let mut channel = ReliableChannel::new(server);
                while let Ok(body) = channel.receive_framed().await {
                    let Ok((header, _)) = decode_batch(&body) else {
                        break;
                    };
                    if channel.send_framed(b"OK").await.is_err() || header.is_final {
                        break;
                    }
                }
            });
            Ok(client)
        }
    }
}

fn create_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::new(["1".to_string(), format!("bet{}", i), "7574".to_string()]))
        .collect()
}

fn bench_transfer(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let records = create_records(1000);

    let mut group = c.benchmark_group("transfer_1000_records");
    group.throughput(Throughput::Elements(records.len() as u64));

    for batch_size in [1, 10, 50] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                b.to_async(&rt).iter(|| {
                    let records = records.clone();
                    async move {
                        let (_trigger, handle) = shutdown::channel();
                        let config = RunnerConfig::new("bench").with_batch_size(batch_size);
                        let mut runner = CancellableRunner::new(
                            config,
                            LoopbackConnector,
                            RecordSerializer,
                            handle,
                        );
                        black_box(runner.run(from_records(records)).await.unwrap())
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_transfer);
criterion_main!(benches);
