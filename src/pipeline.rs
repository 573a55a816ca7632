//! Per-post processing: thread fetch, image fetch, classification, the
//! probabilistic drop filter, and cleanup of on-disk artifacts.

use crate::classifier::{self, Predictor, ScoredImage, SharedRng};
use crate::db::{PostStatus, PostTask};
use crate::images;
use crate::thread::ThreadSource;
use rand::Rng;
use reqwest::Client;
use std::path::PathBuf;

/// Posts whose best score stays under this threshold are negatives.
const NEGATIVE_THRESHOLD: f64 = 0.3;
/// Fraction of negatives discarded to rebalance the archive toward
/// positives.
const NEGATIVE_DROP_RATE: f64 = 0.5;

/// Everything one pipeline run needs; shared across a batch.
pub struct ProcessContext<T, P, R> {
    pub thread: T,
    pub predictor: P,
    pub client: Client,
    pub images_dir: PathBuf,
    pub rng: SharedRng<R>,
}

/// Terminal result of one post's pipeline run. `images` is non-empty only
/// for `Complete`.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub post_id: i32,
    pub post_uri: String,
    pub status: PostStatus,
    pub images: Vec<ScoredImage>,
}

fn should_drop(max_score: f64, draw: f64) -> bool {
    max_score < NEGATIVE_THRESHOLD && draw < NEGATIVE_DROP_RATE
}

impl<T, P, R> ProcessContext<T, P, R>
where
    T: ThreadSource + Sync,
    P: Predictor,
    R: Rng + Send,
{
    /// Runs one post to a terminal status. Never fails: every error maps to
    /// the matching terminal state, and no image file survives a non-complete
    /// outcome.
    pub async fn process_post(&self, task: PostTask) -> PipelineOutcome {
        let post_images = match self.thread.post_images(&task.post_uri).await {
            Ok(post_images) => post_images,
            Err(err) => {
                tracing::error!("thread fetch failed for {}: {err}", task.post_uri);
                return self.finish(task, PostStatus::FetchPostError);
            }
        };
        if post_images.is_empty() {
            return self.finish(task, PostStatus::FetchPostError);
        }

        let fetched =
            match images::fetch_post_images(&self.client, &self.images_dir, &post_images).await {
                Ok(fetched) => fetched,
                Err(leftovers) => {
                    remove_files(&leftovers).await;
                    return self.finish(task, PostStatus::FetchImageError);
                }
            };

        let scored = match classifier::classify_images(&self.predictor, fetched) {
            Ok(scored) => scored,
            Err(leftovers) => {
                remove_files(&leftovers).await;
                return self.finish(task, PostStatus::ClassifyImageError);
            }
        };

        let max_score = scored.iter().map(|image| image.score).fold(0.0, f64::max);
        if should_drop(max_score, self.rng.draw()) {
            let leftovers: Vec<_> = scored.into_iter().map(|image| image.filepath).collect();
            remove_files(&leftovers).await;
            return self.finish(task, PostStatus::Dropped);
        }

        PipelineOutcome {
            post_id: task.post_id,
            post_uri: task.post_uri,
            status: PostStatus::Complete,
            images: scored,
        }
    }

    fn finish(&self, task: PostTask, status: PostStatus) -> PipelineOutcome {
        PipelineOutcome {
            post_id: task.post_id,
            post_uri: task.post_uri,
            status,
            images: Vec::new(),
        }
    }
}

async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = tokio::fs::remove_file(path).await {
            tracing::warn!("failed to remove {}: {err}", path.display());
        }
    }
}
