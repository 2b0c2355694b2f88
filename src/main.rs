//! Command-line interface for queue-loadtest
//!
//! # Usage Examples
//!
//! ## Sender
//! ```bash
//! # Properties file plus overrides
//! queue-loadtest send -c config.properties --message-count 50 --pause-ms 0
//!
//! # Kafka, creating the topic first
//! queue-loadtest send --provider-url kafka://localhost:9092 --destination loadtest \
//!   --create-topic --max-size-mb 5 --metrics-output results/send.json
//! ```
//!
//! ## Consumer
//! ```bash
//! # Push mode until Enter or Ctrl+C
//! queue-loadtest consume -c config.properties --consumer-threads 4
//!
//! # Pull mode for ten minutes, no stdin
//! queue-loadtest consume -c config.properties --mode pull --run-duration 10m --no-stdin
//! ```
//!
//! ## Loopback
//! ```bash
//! queue-loadtest loopback --message-count 20 --max-size-mb 2 --consumer-threads 2
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use loadtest_consumer::{ConsumerArgs, ConsumerWorkerPool};
use loadtest_core::BrokerArgs;
use loadtest_sender::{ProducerWorkerPool, SenderArgs};
use queue_loadtest::{
    connect, ensure_destination, run_loopback, spawn_stop_triggers, write_metrics, StopTriggers,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "queue-loadtest")]
#[command(about = "Load generation and consumption harness for message queues")]
#[command(long_about = None)]
struct Cli {
    /// Log at debug level (ignored when RUST_LOG is set)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send messages from a pool of producer workers, then exit
    Send {
        #[command(flatten)]
        broker: BrokerArgs,

        #[command(flatten)]
        sender: SenderArgs,

        /// Create the destination topic if it does not exist (Kafka only)
        #[arg(long)]
        create_topic: bool,

        /// Partition count used with --create-topic
        #[arg(long, default_value = "3")]
        partitions: i32,

        /// Write the send summary as JSON to this path
        #[arg(long)]
        metrics_output: Option<PathBuf>,
    },

    /// Drain a destination with a pool of consumer workers until stopped
    Consume {
        #[command(flatten)]
        broker: BrokerArgs,

        #[command(flatten)]
        consumer: ConsumerArgs,

        /// Do not stop on Enter (for non-interactive runs)
        #[arg(long)]
        no_stdin: bool,

        /// Write the final statistics as JSON to this path
        #[arg(long)]
        metrics_output: Option<PathBuf>,
    },

    /// Run sender and consumer pools together in one process
    Loopback {
        #[command(flatten)]
        broker: BrokerArgs,

        #[command(flatten)]
        sender: SenderArgs,

        #[command(flatten)]
        consumer: ConsumerArgs,

        /// Write both summaries as JSON to this path
        #[arg(long)]
        metrics_output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Send {
            broker,
            sender,
            create_topic,
            partitions,
            metrics_output,
        } => run_send(broker, sender, create_topic, partitions, metrics_output).await,
        Commands::Consume {
            broker,
            consumer,
            no_stdin,
            metrics_output,
        } => run_consume(broker, consumer, no_stdin, metrics_output).await,
        Commands::Loopback {
            broker,
            sender,
            consumer,
            metrics_output,
        } => run_loopback_command(broker, sender, consumer, metrics_output).await,
    }
}

async fn run_send(
    broker: BrokerArgs,
    sender: SenderArgs,
    create_topic: bool,
    partitions: i32,
    metrics_output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = sender
        .resolve(&broker)
        .context("Invalid sender configuration")?;

    if create_topic {
        ensure_destination(&config.broker, partitions).await?;
    }

    let connection = connect(&config.broker, None).await?;
    let pool = ProducerWorkerPool::new(config, Arc::clone(&connection)).start()?;
    let triggers = spawn_stop_triggers(
        pool.stop_handle(),
        StopTriggers {
            ctrl_c: true,
            ..Default::default()
        },
    );

    let summary = pool.wait().await?;
    triggers.abort();

    if let Err(e) = connection.close().await {
        warn!("Failed to close connection: {e}");
    }
    if let Some(path) = metrics_output {
        write_metrics(&path, "send", &summary)?;
    }
    Ok(())
}

async fn run_consume(
    broker: BrokerArgs,
    consumer: ConsumerArgs,
    no_stdin: bool,
    metrics_output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = consumer
        .resolve(&broker)
        .context("Invalid consumer configuration")?;

    let connection = connect(&config.broker, Some(config.group_id.as_str())).await?;
    let triggers = StopTriggers {
        ctrl_c: true,
        enter_key: !no_stdin,
        deadline: config.run_duration,
    };

    let pool = ConsumerWorkerPool::new(config, Arc::clone(&connection)).start()?;
    if triggers.enter_key {
        info!("Press Enter to stop the consumer workers...");
    }
    let trigger_task = spawn_stop_triggers(pool.stop_handle(), triggers);

    let summary = pool.wait_for_stopped().await;
    trigger_task.abort();

    if let Err(e) = connection.close().await {
        warn!("Failed to close connection: {e}");
    }
    if let Some(path) = metrics_output {
        write_metrics(&path, "consume", &summary)?;
    }
    Ok(())
}

async fn run_loopback_command(
    mut broker: BrokerArgs,
    sender: SenderArgs,
    consumer: ConsumerArgs,
    metrics_output: Option<PathBuf>,
) -> anyhow::Result<()> {
    // Self-contained by default: in-process broker, fixed queue name
    if broker.config.is_none() {
        broker.provider_url.get_or_insert_with(|| "memory://loopback".to_string());
        broker.destination.get_or_insert_with(|| "loopback".to_string());
    }

    let sender_config = sender
        .resolve(&broker)
        .context("Invalid sender configuration")?;
    let consumer_config = consumer
        .resolve(&broker)
        .context("Invalid consumer configuration")?;

    let group_id = Some(consumer_config.group_id.as_str());
    let connection = connect(&consumer_config.broker, group_id).await?;
    let triggers = StopTriggers {
        ctrl_c: true,
        enter_key: false,
        deadline: consumer_config.run_duration,
    };

    let summary = run_loopback(
        sender_config,
        consumer_config,
        Arc::clone(&connection),
        triggers,
    )
    .await?;

    if let Err(e) = connection.close().await {
        warn!("Failed to close connection: {e}");
    }
    if let Some(path) = metrics_output {
        write_metrics(&path, "loopback", &summary)?;
    }
    Ok(())
}
