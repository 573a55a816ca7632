//! Fetches the images the app view reports for a post's thread.

use crate::error::{Error, Result};
use crate::images::PostImage;
use bsky_sdk::api::app::bsky::embed::images::ViewImage;
use bsky_sdk::api::app::bsky::embed::record_with_media::ViewMediaRefs;
use bsky_sdk::api::app::bsky::feed::defs::PostViewEmbedRefs;
use bsky_sdk::api::app::bsky::feed::get_post_thread::{self, OutputThreadRefs};
use bsky_sdk::api::types::{LimitedU16, Union};
use bsky_sdk::BskyAgent;

/// Source of a post's thread-level image descriptors.
#[trait_variant::make(Send)]
pub trait ThreadSource {
    /// Fetches the post's thread at depth 0 and returns every image the app
    /// view reports for the post itself. An empty list means the post has
    /// nothing to catalog.
    async fn post_images(&self, uri: &str) -> Result<Vec<PostImage>>;
}

/// Thread source backed by an authenticated Bluesky session.
pub struct BskyThreadSource {
    agent: BskyAgent,
}

impl BskyThreadSource {
    pub async fn login(user: &str, pass: &str) -> Result<Self> {
        let agent = BskyAgent::builder()
            .build()
            .await
            .map_err(|err| Error::Session(err.to_string()))?;
        agent.login(user, pass).await?;
        Ok(Self { agent })
    }
}

impl ThreadSource for BskyThreadSource {
    async fn post_images(&self, uri: &str) -> Result<Vec<PostImage>> {
        let output = self
            .agent
            .api
            .app
            .bsky
            .feed
            .get_post_thread(
                get_post_thread::ParametersData {
                    depth: Some(LimitedU16::MIN),
                    parent_height: None,
                    uri: uri.into(),
                }
                .into(),
            )
            .await?;
        let Union::Refs(OutputThreadRefs::AppBskyFeedDefsThreadViewPost(thread)) = &output.thread
        else {
            // Not found or blocked; nothing to catalog.
            return Ok(Vec::new());
        };
        Ok(match &thread.post.embed {
            Some(Union::Refs(embed)) => embed_images(embed),
            _ => Vec::new(),
        })
    }
}

/// Collects image views from a post embed, whether the images are attached
/// directly or sit under the media side of a record-with-media embed.
fn embed_images(embed: &PostViewEmbedRefs) -> Vec<PostImage> {
    match embed {
        PostViewEmbedRefs::AppBskyEmbedImagesView(view) => {
            view.images.iter().map(post_image).collect()
        }
        PostViewEmbedRefs::AppBskyEmbedRecordWithMediaView(view) => match &view.media {
            Union::Refs(ViewMediaRefs::AppBskyEmbedImagesView(media)) => {
                media.images.iter().map(post_image).collect()
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn post_image(image: &ViewImage) -> PostImage {
    let (height, width) = match &image.aspect_ratio {
        Some(ratio) => (
            i32::try_from(u64::from(ratio.height)).ok(),
            i32::try_from(u64::from(ratio.width)).ok(),
        ),
        None => (None, None),
    };
    PostImage {
        fullsize: image.fullsize.clone(),
        alt: image.alt.clone(),
        height,
        width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsky_sdk::api::app::bsky::embed::defs::AspectRatioData;
    use bsky_sdk::api::app::bsky::embed::external;
    use bsky_sdk::api::app::bsky::embed::images;

    fn view_image(name: &str, with_ratio: bool) -> ViewImage {
        images::ViewImageData {
            alt: format!("alt for {name}"),
            aspect_ratio: with_ratio.then(|| {
                AspectRatioData {
                    height: 768u64.try_into().expect("valid height"),
                    width: 1024u64.try_into().expect("valid width"),
                }
                .into()
            }),
            fullsize: format!("https://cdn/img/{name}@jpeg"),
            thumb: format!("https://cdn/thumb/{name}@jpeg"),
        }
        .into()
    }

    #[test]
    fn collects_direct_image_views() {
        let embed = PostViewEmbedRefs::AppBskyEmbedImagesView(Box::new(
            images::ViewData {
                images: vec![view_image("one", true), view_image("two", false)],
            }
            .into(),
        ));
        let collected = embed_images(&embed);
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].fullsize, "https://cdn/img/one@jpeg");
        assert_eq!(collected[0].height, Some(768));
        assert_eq!(collected[0].width, Some(1024));
        assert_eq!(collected[1].height, None);
    }

    #[test]
    fn ignores_imageless_embeds() {
        let embed = PostViewEmbedRefs::AppBskyEmbedExternalView(Box::new(
            external::ViewData {
                external: external::ViewExternalData {
                    description: String::new(),
                    thumb: None,
                    title: String::new(),
                    uri: "https://example.com".into(),
                }
                .into(),
            }
            .into(),
        ));
        assert!(embed_images(&embed).is_empty());
    }
}
