//! Fetches a post's images into the dated on-disk archive.
//!
//! A post's image set is atomic: either every image lands on disk, or the
//! caller receives the paths that did land so it can remove them.

use crate::error::Result;
use chrono::NaiveDate;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Hard cap on a single image download.
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// One image attached to a post thread, as reported by the app view.
#[derive(Debug, Clone)]
pub struct PostImage {
    pub fullsize: String,
    pub alt: String,
    pub height: Option<i32>,
    pub width: Option<i32>,
}

/// An image written to the local archive.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub url: String,
    pub filepath: PathBuf,
    pub alt: String,
    pub height: Option<i32>,
    pub width: Option<i32>,
}

/// HTTP client tuned for CDN fetches: redirects followed, hard timeout.
pub fn fetch_client() -> Result<Client> {
    Ok(Client::builder().timeout(FETCH_TIMEOUT).build()?)
}

/// Derives the archive path for an image URL shaped like `…/{name}@{suffix}`:
/// `{images_dir}/{date}/{name}.{suffix}`. Deterministic for a given URL and
/// date.
pub fn image_path(images_dir: &Path, url: &str, date: NaiveDate) -> PathBuf {
    let basename = url.rsplit('/').next().unwrap_or(url);
    let name = basename.split('@').next().unwrap_or(basename);
    let suffix = url.rsplit('@').next().unwrap_or(url);
    images_dir
        .join(date.to_string())
        .join(format!("{name}.{suffix}"))
}

/// Fetches every image for one post concurrently and writes each 200
/// response under the dated directory. All-or-nothing: if any image fails,
/// the paths that were written come back as `Err` for the caller to clean
/// up, and the post is treated as unfetched.
pub async fn fetch_post_images(
    client: &Client,
    images_dir: &Path,
    images: &[PostImage],
) -> std::result::Result<Vec<FetchedImage>, Vec<PathBuf>> {
    let today = chrono::Local::now().date_naive();
    let results = join_all(
        images
            .iter()
            .map(|image| fetch_one(client, images_dir, image, today)),
    )
    .await;
    if results.iter().all(Option::is_some) {
        Ok(results.into_iter().flatten().collect())
    } else {
        Err(results
            .into_iter()
            .flatten()
            .map(|fetched| fetched.filepath)
            .collect())
    }
}

async fn fetch_one(
    client: &Client,
    images_dir: &Path,
    image: &PostImage,
    date: NaiveDate,
) -> Option<FetchedImage> {
    let filepath = image_path(images_dir, &image.fullsize, date);
    if let Some(parent) = filepath.parent() {
        if let Err(err) = fs::create_dir_all(parent).await {
            tracing::error!("failed to create {}: {err}", parent.display());
            return None;
        }
    }
    let response = match client.get(&image.fullsize).send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!("fetch failed for {}: {err}", image.fullsize);
            return None;
        }
    };
    if response.status() != StatusCode::OK {
        tracing::error!("fetch of {} returned {}", image.fullsize, response.status());
        return None;
    }
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => {
            tracing::error!("fetch of {} died mid-body: {err}", image.fullsize);
            return None;
        }
    };
    if let Err(err) = fs::write(&filepath, &body).await {
        tracing::error!("failed to write {}: {err}", filepath.display());
        return None;
    }
    Some(FetchedImage {
        url: image.fullsize.clone(),
        filepath,
        alt: image.alt.clone(),
        height: image.height,
        width: image.width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_image(url: &str) -> PostImage {
        PostImage {
            fullsize: url.into(),
            alt: String::new(),
            height: Some(10),
            width: Some(10),
        }
    }

    #[test]
    fn derives_dated_paths_from_cdn_urls() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).expect("valid date");
        let path = image_path(Path::new("archive"), "https://cdn/x/abc@jpeg", date);
        assert_eq!(path, Path::new("archive/2025-03-04/abc.jpeg"));
    }

    #[test]
    fn path_derivation_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).expect("valid date");
        let first = image_path(Path::new("archive"), "https://cdn/x/abc@png", date);
        let second = image_path(Path::new("archive"), "https://cdn/x/abc@png", date);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn fetches_every_image_for_a_post() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/img/one@jpeg")
            .with_status(200)
            .with_body(b"first")
            .create_async()
            .await;
        server
            .mock("GET", "/img/two@png")
            .with_status(200)
            .with_body(b"second")
            .create_async()
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let client = fetch_client().expect("client");
        let images = [
            post_image(&format!("{}/img/one@jpeg", server.url())),
            post_image(&format!("{}/img/two@png", server.url())),
        ];

        let fetched = fetch_post_images(&client, dir.path(), &images)
            .await
            .expect("all images fetch");
        assert_eq!(fetched.len(), 2);
        for image in &fetched {
            let body = std::fs::read(&image.filepath).expect("file written");
            assert!(!body.is_empty());
        }
        assert!(fetched[0].filepath.ends_with(
            format!("{}/one.jpeg", chrono::Local::now().date_naive()),
        ));
    }

    #[tokio::test]
    async fn one_failure_reports_the_written_files_for_cleanup() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/img/one@jpeg")
            .with_status(200)
            .with_body(b"first")
            .create_async()
            .await;
        server
            .mock("GET", "/img/two@jpeg")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/img/three@jpeg")
            .with_status(200)
            .with_body(b"third")
            .create_async()
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let client = fetch_client().expect("client");
        let images = [
            post_image(&format!("{}/img/one@jpeg", server.url())),
            post_image(&format!("{}/img/two@jpeg", server.url())),
            post_image(&format!("{}/img/three@jpeg", server.url())),
        ];

        let leftovers = fetch_post_images(&client, dir.path(), &images)
            .await
            .expect_err("post must not fetch");
        assert_eq!(leftovers.len(), 2, "only the two 200s were written");
        for path in &leftovers {
            assert!(path.exists(), "cleanup path {} must exist", path.display());
        }
    }
}
