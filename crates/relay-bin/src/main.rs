//! Relay binary entry point.
//!
//! Usage: relay [--instance <id>] [--outbox memory|redis] [--listen <addr>]
//!
//! Accepts messages over HTTP, stores them in SQLite, forwards them to a
//! Redis stream and records confirmations read from a second stream.

mod http;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use relay_broker::{RedisConfirmationSource, RedisStreamProducer, StreamConfig};
use relay_core::logging::{init_logging, LogFormat};
use relay_core::{ConfirmationListener, Forwarder, MemoryOutbox, Outbox, RelayConfig, RelayService};
use relay_metrics::RelayMetrics;
use relay_outbox::RedisOutbox;
use relay_store::SqliteRepository;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const BROKER_OUTBOX: &str = "brokerOutbox";
const REPO_OUTBOX: &str = "repoOutbox";

/// How long to wait for background loops after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutboxBackend {
    /// In-process, lost on restart
    Memory,
    /// Redis lists, one per outbox and instance
    Redis,
}

/// Relay: persist, forward and confirm messages without losing them.
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(about = "Reliable message relay with outbox-backed retries")]
struct Args {
    /// Relay instance id. Defaults to a fresh random id.
    #[arg(long, env = "RELAY_INSTANCE")]
    instance: Option<String>,

    /// Outbox backend.
    #[arg(long, env = "RELAY_OUTBOX", value_enum, default_value = "memory")]
    outbox: OutboxBackend,

    /// Redis connection URL (broker streams and the redis outbox).
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// SQLite database path.
    #[arg(long, env = "RELAY_DB_PATH", default_value = "relay.db")]
    db_path: PathBuf,

    /// HTTP listen address.
    #[arg(long, env = "RELAY_LISTEN", default_value = "127.0.0.1:8080")]
    listen: String,

    /// Stream relayed messages are published to.
    #[arg(long, env = "RELAY_MESSAGE_STREAM")]
    message_stream: Option<String>,

    /// Stream confirmations are read from.
    #[arg(long, env = "RELAY_CONFIRM_STREAM")]
    confirm_stream: Option<String>,

    /// Per-request HTTP timeout in milliseconds.
    #[arg(long, env = "RELAY_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    request_timeout_ms: u64,

    /// Replay interval in milliseconds.
    #[arg(long, env = "RELAY_RETRY_INTERVAL_MS")]
    retry_interval_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (compact, json)
    #[arg(long, env = "RELAY_LOG_FORMAT", default_value = "compact")]
    log_format: LogFormat,
}

fn relay_config(args: &Args) -> RelayConfig {
    let mut config = RelayConfig::from_env();
    if let Some(ref instance) = args.instance {
        config.instance = instance.clone();
    }
    if let Some(ms) = args.retry_interval_ms {
        config.retry_interval = Duration::from_millis(ms);
    }
    config
}

async fn outboxes(args: &Args, instance: &str) -> anyhow::Result<(Arc<dyn Outbox>, Arc<dyn Outbox>)> {
    match args.outbox {
        OutboxBackend::Memory => Ok((
            Arc::new(MemoryOutbox::new(BROKER_OUTBOX)) as Arc<dyn Outbox>,
            Arc::new(MemoryOutbox::new(REPO_OUTBOX)) as Arc<dyn Outbox>,
        )),
        OutboxBackend::Redis => {
            let broker = RedisOutbox::connect(&args.redis_url, BROKER_OUTBOX, instance)
                .await
                .context("failed to connect broker outbox")?;
            let repo = RedisOutbox::connect(&args.redis_url, REPO_OUTBOX, instance)
                .await
                .context("failed to connect repository outbox")?;
            Ok((Arc::new(broker) as Arc<dyn Outbox>, Arc::new(repo) as Arc<dyn Outbox>))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_format);

    info!("Relay starting...");

    let config = relay_config(&args);
    info!(
        instance = %config.instance,
        outbox = ?args.outbox,
        db_path = %args.db_path.display(),
        retry_interval_ms = config.retry_interval.as_millis() as u64,
        "Configuration loaded"
    );

    let repository = Arc::new(
        SqliteRepository::open(&args.db_path)
            .await
            .context("failed to open message store")?,
    );
    let metrics = Arc::new(RelayMetrics::new().context("failed to register metrics")?);
    let (broker_outbox, repo_outbox) = outboxes(&args, &config.instance).await?;

    let service = RelayService::new(
        repository.clone(),
        broker_outbox,
        repo_outbox,
        metrics.clone(),
        &config,
    );

    let mut streams = StreamConfig::new(args.redis_url.as_str(), config.instance.as_str());
    if let Some(ref stream) = args.message_stream {
        streams.message_stream = stream.clone();
    }
    if let Some(ref stream) = args.confirm_stream {
        streams.confirm_stream = stream.clone();
    }

    let producer = RedisStreamProducer::connect(&streams)
        .await
        .context("failed to connect broker producer")?;
    let source = RedisConfirmationSource::connect(streams)
        .await
        .context("failed to connect confirmation stream")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let receiver = service
        .take_message_receiver()
        .context("hand-off receiver already taken")?;
    let forwarder = tokio::spawn(
        Forwarder::new(service.clone(), Arc::new(producer), &config).run(receiver, shutdown_rx.clone()),
    );
    let confirmations = tokio::spawn(
        ConfirmationListener::new(service.clone(), Arc::new(source), &config).run(shutdown_rx.clone()),
    );
    let retry_loop = service.spawn_retry_loop(shutdown_rx.clone());

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(addr = %args.listen, "HTTP intake listening");

    let mut http_shutdown = shutdown_rx.clone();
    let app = http::router(
        service.clone(),
        metrics,
        Duration::from_millis(args.request_timeout_ms),
    );
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*http_shutdown.borrow() {
                    if http_shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            match result {
                Ok(Ok(())) => warn!("HTTP server stopped"),
                Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
                Err(e) => error!(error = %e, "HTTP server task failed"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, exiting...");
        }
    }

    let _ = shutdown_tx.send(true);

    let stopped = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = forwarder.await;
        let _ = confirmations.await;
        let _ = retry_loop.await;
        if !server.is_finished() {
            let _ = server.await;
        }
    })
    .await;

    if stopped.is_err() {
        warn!("Background tasks did not stop in time");
    }

    if let Err(e) = repository.database().clone().close().await {
        warn!(error = %e, "Failed to close message store");
    }

    let stats = service.statistic();
    info!(
        total = stats.total,
        sent_to_outbox = stats.messages_sent_to_outbox,
        returned_from_outbox = stats.messages_returned_from_outbox,
        "Relay stopped"
    );
    Ok(())
}
