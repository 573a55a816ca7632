//! Handoff from the firehose handler to the durable store: a bounded
//! admission queue, the commit handler that feeds it, and the writer task
//! that drains it into the `posts` table.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::filter;
use crate::firehose::CommitHandler;
use crate::operations::{self, CreatedOp};
use atrium_api::app::bsky::feed::post;
use atrium_api::com::atproto::sync::subscribe_repos::Commit;
use chrono::Utc;
use tokio::sync::mpsc;

/// An admitted post waiting to be written to the store.
#[derive(Debug)]
pub struct AdmittedPost {
    pub uri: String,
    pub record: post::Record,
}

/// Bounded FIFO between the single firehose handler and the single post
/// writer. A full queue suspends the sender, which backpressures the
/// subscription instead of dropping posts.
pub fn admission_queue(
    capacity: usize,
) -> (mpsc::Sender<AdmittedPost>, mpsc::Receiver<AdmittedPost>) {
    mpsc::channel(capacity)
}

/// Firehose commit handler: decodes each commit, keeps admissible posts and
/// enqueues them for the writer.
pub struct AdmissionHandler {
    queue: mpsc::Sender<AdmittedPost>,
}

impl AdmissionHandler {
    pub fn new(queue: mpsc::Sender<AdmittedPost>) -> Self {
        Self { queue }
    }

    async fn admit(&self, created: Vec<CreatedOp<post::Record>>) -> Result<()> {
        for op in created {
            if !filter::is_admissible(&op.record) {
                continue;
            }
            self.queue
                .send(AdmittedPost {
                    uri: op.uri,
                    record: op.record,
                })
                .await
                .map_err(|_| Error::QueueClosed)?;
        }
        Ok(())
    }
}

impl CommitHandler for AdmissionHandler {
    async fn handle_commit(&self, commit: &Commit) -> Result<()> {
        let ops = operations::ops_by_collection(&commit.repo, &commit.ops, &commit.blocks).await?;
        self.admit(ops.posts.created).await
    }
}

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn squish(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drains the admission queue into the `posts` table, one committed row per
/// envelope. Runs until the queue is closed and fully drained; a failed
/// insert is logged and never stops the writer.
pub async fn run_post_writer(db: Database, mut queue: mpsc::Receiver<AdmittedPost>) {
    while let Some(post) = queue.recv().await {
        let text = squish(&post.record.text);
        let created_at = post.record.created_at.as_ref().with_timezone(&Utc);
        match db.insert_post(&post.uri, &text, &created_at).await {
            Ok(()) => tracing::debug!("recorded {}", post.uri),
            Err(Error::Database(err))
                if err
                    .as_database_error()
                    .is_some_and(|e| e.is_unique_violation()) =>
            {
                tracing::warn!("skipping duplicate post {}", post.uri);
            }
            Err(err) => tracing::error!("failed to record {}: {err}", post.uri),
        }
    }
    tracing::info!("post writer drained");
}
