use anyhow::Result;
use clap::{Parser, Subcommand};
use hub_bench::config::RunConfig;
use hub_bench::logging;
use hub_bench::roles::sender::run_sender;

#[derive(Parser)]
#[command(name = "hub-bench")]
#[command(about = "Batch load generator for event hubs")]
struct Cli {
    /// Run ID for tagging outputs
    #[arg(long, default_value = "")]
    run_id: String,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Snapshot interval in seconds for periodic progress output
    #[arg(long, default_value = "1")]
    snapshot_interval: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition a run into batches and send them through a worker pool
    Send {
        /// YAML run profile; flags below override it
        #[arg(long)]
        config: Option<String>,

        /// Hub engine (mqtt, mock)
        #[arg(long)]
        engine: Option<String>,

        /// Connection parameter as key=value (repeatable)
        #[arg(long = "connect")]
        connect: Vec<String>,

        /// Total number of events to send
        #[arg(long)]
        messages: Option<u64>,

        /// Maximum events per batch
        #[arg(long)]
        batch_limit: Option<u64>,

        /// Number of concurrent workers
        #[arg(long)]
        workers: Option<usize>,

        /// Event body template
        #[arg(long)]
        message: Option<String>,

        /// Event property as key=value (repeatable)
        #[arg(long = "property")]
        properties: Vec<String>,

        /// Base64-encode event bodies
        #[arg(long)]
        base64: bool,

        /// Append a unique sequence suffix to every body
        #[arg(long)]
        suffix: bool,

        /// Replay events from a JSONL file instead of synthesizing
        #[arg(long)]
        events_file: Option<String>,

        /// Timeout per batch send (ms)
        #[arg(long)]
        send_timeout_ms: Option<u64>,

        /// Cancel all in-flight sends after this many seconds
        #[arg(long)]
        run_timeout: Option<u64>,

        /// Optional CSV output file path (stdout if omitted)
        #[arg(long)]
        csv: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level)?;

    let run_id = if cli.run_id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        cli.run_id.clone()
    };
    tracing::info!(%run_id, "hub-bench starting");

    match cli.command {
        Commands::Send {
            config,
            engine,
            connect,
            messages,
            batch_limit,
            workers,
            message,
            properties,
            base64,
            suffix,
            events_file,
            send_timeout_ms,
            run_timeout,
            csv,
        } => {
            let profile = match config {
                Some(path) => RunConfig::load(path).await?,
                None => RunConfig::default(),
            };
            let flags = RunConfig {
                engine,
                connect,
                messages,
                batch_limit,
                workers,
                message,
                properties,
                base64: base64.then_some(true),
                suffix: suffix.then_some(true),
                events_file,
                send_timeout_ms,
                run_timeout_secs: run_timeout,
                csv,
            };
            let sender_config = profile.merge(flags).resolve(cli.snapshot_interval).await?;
            let report = run_sender(sender_config).await?;
            if !report.is_clean() {
                tracing::warn!(
                    failed_batches = report.failures().count(),
                    failed_events = report.events_failed(),
                    "some batches were not accepted by the hub"
                );
            }
            Ok(())
        }
    }
}
