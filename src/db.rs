//! Postgres access for both services. All writes are per-call transactions;
//! the two services never share rows they both mutate.

use crate::config::DbConfig;
use crate::error::Result;
use crate::pipeline::PipelineOutcome;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Lifecycle status of a `posts` row. `Uncatalogued` is the only
/// non-terminal state; a post transitions out of it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i32)]
pub enum PostStatus {
    Uncatalogued = 1,
    FetchPostError = 2,
    FetchImageError = 3,
    ClassifyImageError = 4,
    Dropped = 5,
    Complete = 6,
}

/// A post pulled for processing.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostTask {
    pub post_id: i32,
    pub post_uri: String,
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(config.connect_options())
            .await?;
        Ok(Self { pool })
    }

    /// Applies the embedded schema migrations. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Records an admitted post with the initial `Uncatalogued` status.
    /// Duplicate URIs surface as a unique-constraint error for the caller to
    /// classify.
    pub async fn insert_post(
        &self,
        uri: &str,
        text: &str,
        created_at: &DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO posts (post_uri, post_text, post_created_at, post_status_id) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(uri)
        .bind(text)
        .bind(created_at)
        .bind(PostStatus::Uncatalogued)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Pulls the oldest uncatalogued posts, up to `limit`. Read-only; the
    /// process service is assumed to be the only consumer of these rows.
    pub async fn select_uncatalogued(&self, limit: i64) -> Result<Vec<PostTask>> {
        let tasks = sqlx::query_as::<_, PostTask>(
            "SELECT post_id, post_uri FROM posts \
             WHERE post_status_id = $1 \
             ORDER BY post_created_at ASC \
             LIMIT $2",
        )
        .bind(PostStatus::Uncatalogued)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    /// Commits one pipeline outcome in a single transaction: the status
    /// transition, plus one `images` row per scored image when the post
    /// completed. A failure rolls the whole post back and leaves its peers
    /// untouched.
    pub async fn commit_outcome(&self, outcome: &PipelineOutcome) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE posts SET post_status_id = $1 WHERE post_id = $2")
            .bind(outcome.status)
            .bind(outcome.post_id)
            .execute(&mut *tx)
            .await?;
        if outcome.status == PostStatus::Complete {
            for image in &outcome.images {
                sqlx::query(
                    "INSERT INTO images (image_url, image_filepath, image_alt, \
                     image_height, image_width, image_score, post_id) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(&image.url)
                .bind(image.filepath.display().to_string())
                .bind(&image.alt)
                .bind(image.height)
                .bind(image.width)
                .bind(image.score)
                .bind(outcome.post_id)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
