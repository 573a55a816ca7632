use anyhow::Context;
use clap::Parser;
use skyfilter::classifier::{RandomPredictor, SharedRng};
use skyfilter::config::{DbConfig, ProcessConfig};
use skyfilter::db::Database;
use skyfilter::images;
use skyfilter::monitor::SignalMonitor;
use skyfilter::pipeline::ProcessContext;
use skyfilter::scheduler;
use skyfilter::thread::BskyThreadSource;
use std::path::PathBuf;

/// Post-processing service: fetches, scores and catalogs admitted posts.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Log file path
    #[arg(long, default_value = "logs/process.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _guard = skyfilter::logging::init(&args.log_file).context("logging setup")?;

    let db_config = DbConfig::from_env().context("database configuration")?;
    let process_config = ProcessConfig::from_env().context("process configuration")?;

    let db = Database::connect(&db_config).await.context("database connection")?;
    db.migrate().await.context("database migration")?;

    let thread = BskyThreadSource::login(&process_config.bsky_user, &process_config.bsky_pass)
        .await
        .context("bluesky login")?;

    let rng = SharedRng::from_entropy();
    let ctx = ProcessContext {
        thread,
        predictor: RandomPredictor::new(rng.clone()),
        client: images::fetch_client().context("http client")?,
        images_dir: process_config.images_dir.clone(),
        rng,
    };

    let monitor = SignalMonitor::install("process").context("signal handlers")?;
    tracing::info!(
        "process service started, archiving to {}",
        process_config.images_dir.display()
    );

    scheduler::run(&db, &ctx, &process_config.scheduler, &monitor).await;
    tracing::info!("process service stopped");
    Ok(())
}
