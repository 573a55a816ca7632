//! Decodes a commit's block archive into typed, per-collection operations.

use crate::error::{Error, Result};
use atrium_api::app::bsky::feed::{like, post, repost, Like, Post, Repost};
use atrium_api::app::bsky::graph::{follow, Follow};
use atrium_api::com::atproto::sync::subscribe_repos::RepoOp;
use atrium_api::record::KnownRecord;
use atrium_api::types::string::Did;
use atrium_api::types::Collection;
use std::collections::HashMap;

/// A single record creation, typed by its collection.
#[derive(Debug, Clone)]
pub struct CreatedOp<R> {
    pub uri: String,
    pub cid: String,
    pub author: Did,
    pub record: R,
}

/// A record deletion; only the URI survives on the wire.
#[derive(Debug, Clone)]
pub struct DeletedOp {
    pub uri: String,
}

#[derive(Debug)]
pub struct CollectionOps<R> {
    pub created: Vec<CreatedOp<R>>,
    pub deleted: Vec<DeletedOp>,
}

impl<R> Default for CollectionOps<R> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

/// A commit's operations, bucketed by the collections this service follows.
/// Anything else in the commit is ignored.
#[derive(Debug, Default)]
pub struct CommitOps {
    pub posts: CollectionOps<post::Record>,
    pub reposts: CollectionOps<repost::Record>,
    pub likes: CollectionOps<like::Record>,
    pub follows: CollectionOps<follow::Record>,
}

/// Decodes the CAR archive carried in a commit and buckets its operations.
///
/// `update` actions are discarded. A `create` whose record is missing from
/// the archive, fails to decode, or decodes to a type inconsistent with its
/// URI collection is dropped; only a corrupt archive fails the whole frame.
pub async fn ops_by_collection(repo: &Did, ops: &[RepoOp], blocks: &[u8]) -> Result<CommitOps> {
    let (items, _) = rs_car::car_read_all(&mut &*blocks, true)
        .await
        .map_err(|err| Error::CommitDecode(err.to_string()))?;
    let records: HashMap<Vec<u8>, &[u8]> = items
        .iter()
        .map(|(cid, data)| (cid.to_bytes(), data.as_slice()))
        .collect();

    let mut out = CommitOps::default();
    for op in ops {
        let Some(collection) = op.path.split('/').next() else {
            continue;
        };
        let uri = format!("at://{}/{}", repo.as_str(), op.path);
        match op.action.as_str() {
            "create" => {
                let Some(cid) = &op.cid else {
                    continue;
                };
                let Some(data) = records.get(&cid.0.to_bytes()) else {
                    continue;
                };
                let Ok(record) = serde_ipld_dagcbor::from_slice::<KnownRecord>(data) else {
                    continue;
                };
                let cid = cid.0.to_string();
                let author = repo.clone();
                // The record's own type tag must agree with the collection
                // named by the operation path.
                match record {
                    KnownRecord::AppBskyFeedPost(record) if collection == Post::NSID => {
                        out.posts.created.push(CreatedOp { uri, cid, author, record: *record });
                    }
                    KnownRecord::AppBskyFeedRepost(record) if collection == Repost::NSID => {
                        out.reposts.created.push(CreatedOp { uri, cid, author, record: *record });
                    }
                    KnownRecord::AppBskyFeedLike(record) if collection == Like::NSID => {
                        out.likes.created.push(CreatedOp { uri, cid, author, record: *record });
                    }
                    KnownRecord::AppBskyGraphFollow(record) if collection == Follow::NSID => {
                        out.follows.created.push(CreatedOp { uri, cid, author, record: *record });
                    }
                    _ => {}
                }
            }
            "delete" => {
                let deleted = DeletedOp { uri };
                if collection == Post::NSID {
                    out.posts.deleted.push(deleted);
                } else if collection == Repost::NSID {
                    out.reposts.deleted.push(deleted);
                } else if collection == Like::NSID {
                    out.likes.deleted.push(deleted);
                } else if collection == Follow::NSID {
                    out.follows.deleted.push(deleted);
                }
            }
            _ => {}
        }
    }
    Ok(out)
}
