//! batchwire - Batch record transfer client
//!
//! Reads records from a file and transmits them to a server in acknowledged
//! batches over a length-prefixed TCP protocol.

mod config;
mod source;

use batchwire_client::{shutdown, CancellableRunner, RecordSerializer, ShutdownTrigger, TcpConnector};
use clap::Parser;
use config::{Config, ConfigError};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "batchwire")]
#[command(about = "Transmit records to a server in acknowledged batches")]
#[command(version)]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, env = "CLI_CONFIG")]
    config: Option<PathBuf>,

    /// Client identifier
    #[arg(long)]
    id: Option<String>,

    /// Server address (host:port)
    #[arg(short, long)]
    server: Option<String>,

    /// Maximum records per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Record file to transmit
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Connection mode (per_run or per_batch)
    #[arg(long)]
    mode: Option<batchwire_client::ConnectionMode>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(id) = self.id {
            config.client.id = id;
        }
        if let Some(server) = self.server {
            config.client.server_address = server;
        }
        if let Some(size) = self.batch_size {
            config.batch.max_amount = size;
        }
        if let Some(file) = self.file {
            config.source.path = Some(file);
        }
        if let Some(mode) = self.mode {
            config.connection.mode = mode;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .init();

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    let path = config
        .source
        .path
        .clone()
        .ok_or_else(|| ConfigError::ValidationError("source.path is required".to_string()))?;

    tracing::info!(
        "action: config | result: success | client_id: {} | server_address: {} | batch_max_amount: {} | connection_mode: {} | log_level: {}",
        config.client.id,
        config.client.server_address,
        config.batch.max_amount,
        config.connection.mode,
        config.log.level
    );

    let prefix = config
        .source
        .prefix_client_id
        .then(|| config.client.id.clone());
    let records = source::open(&path, prefix)?;

    let (trigger, handle) = shutdown::channel();
    tokio::spawn(watch_signals(trigger, config.client.id.clone()));

    let connector = TcpConnector::new(config.client.server_address.clone());
    let mut runner = CancellableRunner::new(config.runner(), connector, RecordSerializer, handle);

    match runner.run(records).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Raises the cancellation signal on SIGTERM or Ctrl-C.
async fn watch_signals(trigger: ShutdownTrigger, client_id: String) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.ok();

    tracing::info!(
        "action: SIGTERM_received | result: success | client_id: {} | msg: stopping_gracefully",
        client_id
    );
    trigger.cancel();
}
