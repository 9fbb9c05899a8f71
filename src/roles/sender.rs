use crate::batch::{DispatchReport, Dispatcher, Partition, partition, partition_from_pool};
use crate::config::{EventSource, SenderConfig};
use crate::metrics::observer::StatsObserver;
use crate::metrics::stats::{Stats, StatsSnapshot};
use crate::output::OutputWriter;
use crate::shutdown::create_shutdown_channel;
use crate::transport::{HubClient, TransportBuilder};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::interval;
use tracing::{info, warn};

/// Build the partition for `config` off the async runtime.
pub async fn build_partition(config: &SenderConfig) -> Result<Partition> {
    let (workers, limit, total) = (config.workers, config.batch_limit, config.messages);
    let source = config.source.clone();
    let partition = tokio::task::spawn_blocking(move || match source {
        EventSource::Template(t) => partition(workers, limit, total, &t),
        EventSource::Pool(pool) => partition_from_pool(&pool, workers, limit, total),
    })
    .await
    .context("partition task failed")??;
    Ok(partition)
}

pub async fn run_sender(config: SenderConfig) -> Result<DispatchReport> {
    info!(
        engine = ?config.engine,
        messages = config.messages,
        batch_limit = config.batch_limit,
        workers = config.workers,
        replay = matches!(config.source, EventSource::Pool(_)),
        "starting sender"
    );

    let transport: Box<dyn HubClient> = TransportBuilder::connect(config.engine.clone(), config.connect.clone())
        .await
        .map_err(|e| anyhow::Error::msg(format!("transport connect error: {e}")))?;
    let client: Arc<dyn HubClient> = Arc::from(transport);
    client
        .health_check()
        .await
        .map_err(|e| anyhow::Error::msg(format!("transport health check failed: {e}")))?;
    run_sender_with(config, client).await
}

/// Run against an already connected client. The client is shut down on return.
pub async fn run_sender_with(config: SenderConfig, client: Arc<dyn HubClient>) -> Result<DispatchReport> {
    let partition = build_partition(&config).await?;
    info!(
        queues = partition.len(),
        chunks = partition.total_chunks(),
        events = partition.total_events(),
        "partition ready"
    );

    let stats = Arc::new(Stats::new());
    let observer = StatsObserver::spawn(stats.clone());
    let mut output = match config.output_file {
        Some(ref path) => OutputWriter::new_csv(path.clone()).await?,
        None => OutputWriter::new_stdout(),
    };

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let timer = config.run_timeout.map(|t| shutdown_tx.shutdown_after(t));

    let snapshot_handle = {
        let stats = stats.clone();
        let interval_secs = config.snapshot_interval_secs.max(1);
        tokio::spawn(async move {
            let mut t = interval(Duration::from_secs(interval_secs));
            // first tick fires immediately
            t.tick().await;
            loop {
                t.tick().await;
                let snap = stats.snapshot().await;
                info!(
                    events = snap.events_sent,
                    errors = snap.error_count,
                    rate = %format!("{:.2}", snap.interval_throughput()),
                    "progress"
                );
            }
        })
    };

    let mut dispatcher = Dispatcher::new(client.clone()).with_observer(observer.clone());
    if let Some(t) = config.send_timeout {
        dispatcher = dispatcher.with_send_timeout(t);
    }

    let dispatch = dispatcher.dispatch(partition, config.workers, shutdown_rx);
    tokio::pin!(dispatch);
    let outcome = tokio::select! {
        outcome = &mut dispatch => outcome?,
        _ = signal::ctrl_c() => {
            warn!("Ctrl+C received, cancelling in-flight sends");
            shutdown_tx.shutdown();
            dispatch.await?
        }
    };

    // Dispatch is done; release workers parked on shutdown.
    shutdown_tx.shutdown();
    let report = outcome.wait_for_teardown().await;
    if let Some(t) = timer {
        t.abort();
    }
    snapshot_handle.abort();

    observer.flush().await;
    let final_stats = stats.snapshot().await;
    print_summary(&final_stats, &report);
    output.write_snapshot(&final_stats).await?;

    client
        .shutdown()
        .await
        .map_err(|e| anyhow::Error::msg(format!("transport shutdown error: {e}")))?;
    Ok(report)
}

fn print_summary(stats: &StatsSnapshot, report: &DispatchReport) {
    println!("\nFinal Sender Statistics:");
    println!("  Events sent: {}", stats.events_sent);
    println!("  Batches sent: {}", stats.batches_sent);
    println!("  Failed batches: {} ({} events)", stats.error_count, stats.events_failed);
    println!("  Workers: {}", report.workers.len());
    println!("  Average rate: {:.2} events/s", stats.total_throughput());
    println!(
        "  Batch latency p50/p99: {:.3}ms / {:.3}ms",
        stats.latency_ns_p50 as f64 / 1e6,
        stats.latency_ns_p99 as f64 / 1e6
    );
    println!("  Dispatch duration: {:.2}s", report.elapsed.as_secs_f64());
}
