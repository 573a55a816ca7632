//! Drives the batch pipeline at a fixed cadence until shutdown.

use crate::classifier::Predictor;
use crate::config::SchedulerConfig;
use crate::db::Database;
use crate::monitor::SignalMonitor;
use crate::pipeline::ProcessContext;
use crate::thread::ThreadSource;
use futures::future::join_all;
use rand::Rng;
use tokio::time::{sleep, Instant};

/// Selects, processes and commits batches of uncatalogued posts until the
/// monitor reports shutdown. A batch in flight always runs to completion and
/// is committed before the loop exits.
pub async fn run<T, P, R>(
    db: &Database,
    ctx: &ProcessContext<T, P, R>,
    config: &SchedulerConfig,
    monitor: &SignalMonitor,
) where
    T: ThreadSource + Sync,
    P: Predictor,
    R: Rng + Send,
{
    let mut next_update = Instant::now();
    while !monitor.is_shutdown() {
        let now = Instant::now();
        if now < next_update {
            sleep(config.batch_postpone).await;
            continue;
        }
        next_update = now + config.batch_interval;

        let batch = match db.select_uncatalogued(config.batch_size).await {
            Ok(batch) => batch,
            Err(err) => {
                tracing::error!("batch selection failed: {err}");
                sleep(config.batch_wait).await;
                continue;
            }
        };
        if batch.is_empty() {
            // Nothing to do; spare the store and the app view the hot loop.
            sleep(config.batch_wait).await;
            continue;
        }

        tracing::info!("processing batch of {} posts", batch.len());
        let outcomes = join_all(batch.into_iter().map(|task| ctx.process_post(task))).await;
        for outcome in &outcomes {
            if let Err(err) = db.commit_outcome(outcome).await {
                tracing::error!("failed to commit {}: {err}", outcome.post_uri);
            }
        }
    }
    tracing::info!("{}: batch loop stopped", monitor.name());
}
