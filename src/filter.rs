//! Admission rules for posts coming off the firehose.

use atrium_api::app::bsky::embed::record_with_media::MainMediaRefs;
use atrium_api::app::bsky::feed::post::{Record, RecordEmbedRefs};
use atrium_api::types::string::Language;
use atrium_api::types::Union;

/// Decides whether a freshly created post belongs in the catalog: it must be
/// tagged as English, carry text, and embed images (directly or under media).
pub fn is_admissible(record: &Record) -> bool {
    let Ok(english) = "en".parse::<Language>() else {
        return false;
    };
    let Some(langs) = &record.langs else {
        return false;
    };
    if !langs.contains(&english) {
        return false;
    }
    if record.text.is_empty() {
        return false;
    }
    match &record.embed {
        Some(Union::Refs(embed)) => has_images(embed),
        _ => false,
    }
}

fn has_images(embed: &RecordEmbedRefs) -> bool {
    match embed {
        RecordEmbedRefs::AppBskyEmbedImagesMain(_) => true,
        RecordEmbedRefs::AppBskyEmbedRecordWithMediaMain(main) => {
            matches!(&main.media, Union::Refs(MainMediaRefs::AppBskyEmbedImagesMain(_)))
        }
        _ => false,
    }
}
