use anyhow::Context;
use clap::Parser;
use skyfilter::config::{DbConfig, StreamConfig};
use skyfilter::db::Database;
use skyfilter::firehose::RepoSubscription;
use skyfilter::ingest::{self, AdmissionHandler};
use skyfilter::monitor::SignalMonitor;
use std::path::PathBuf;

/// Firehose ingestion service: records admissible image posts for cataloging.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Log file path
    #[arg(long, default_value = "logs/stream.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _guard = skyfilter::logging::init(&args.log_file).context("logging setup")?;

    let db_config = DbConfig::from_env().context("database configuration")?;
    let stream_config = StreamConfig::from_env().context("stream configuration")?;

    let db = Database::connect(&db_config).await.context("database connection")?;
    db.migrate().await.context("database migration")?;

    let monitor = SignalMonitor::install("stream").context("signal handlers")?;

    let (queue, admitted) = ingest::admission_queue(stream_config.queue_capacity);
    let writer = tokio::spawn(ingest::run_post_writer(db, admitted));

    let subscription = RepoSubscription::connect(&stream_config.relay_host)
        .await
        .context("firehose connection")?;
    tracing::info!("stream service started against {}", stream_config.relay_host);

    subscription.run(AdmissionHandler::new(queue), &monitor).await?;

    // The handler (and with it the queue sender) is gone; the writer exits
    // once it has drained the remaining envelopes.
    writer.await.context("post writer")?;
    tracing::info!("stream service stopped");
    Ok(())
}
