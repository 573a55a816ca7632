//! Subscription to the `com.atproto.sync.subscribeRepos` event stream.

pub mod frames;

use self::frames::{Frame, FrameError};
use crate::error::{Error, Result};
use crate::monitor::SignalMonitor;
use atrium_api::com::atproto::sync::subscribe_repos::{self, Commit, NSID};
use atrium_api::xrpc::http::{Request, Uri};
use futures::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// How long to wait for a frame before re-checking the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_secs(1);

/// Handles decoded `#commit` messages from the repo subscription.
#[trait_variant::make(Send)]
pub trait CommitHandler {
    async fn handle_commit(&self, commit: &Commit) -> Result<()>;
}

/// A live WebSocket subscription to a relay's repo event stream.
pub struct RepoSubscription {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RepoSubscription {
    /// Performs the websocket upgrade against the relay's `subscribeRepos`
    /// endpoint.
    pub async fn connect(relay_host: &str) -> Result<Self> {
        let uri: Uri = format!("wss://{relay_host}/xrpc/{NSID}")
            .parse()
            .map_err(|_| Error::InvalidUri)?;
        let host = uri.authority().ok_or(Error::InvalidUri)?.as_str().to_string();
        let request = Request::builder()
            .uri(uri)
            .method("GET")
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .body(())
            .map_err(|_| Error::InvalidUri)?;
        let (stream, _) = connect_async(request).await?;
        Ok(Self { stream })
    }

    /// Drives the subscription until shutdown is signalled or the stream
    /// ends. A frame that fails to decode is logged and dropped; the relay's
    /// error frame and a closed admission queue stop the run.
    pub async fn run(mut self, handler: impl CommitHandler, monitor: &SignalMonitor) -> Result<()> {
        while !monitor.is_shutdown() {
            let message = match tokio::time::timeout(SHUTDOWN_POLL, self.stream.next()).await {
                Err(_) => continue, // no frame yet; re-check the flag
                Ok(None) => {
                    tracing::warn!("{}: subscription closed by peer", monitor.name());
                    break;
                }
                Ok(Some(Err(err))) => {
                    tracing::error!("websocket failure: {err}");
                    break;
                }
                Ok(Some(Ok(message))) => message,
            };
            let Message::Binary(data) = message else {
                continue;
            };
            match Frame::parse(data) {
                Ok(Frame::Message { t, payload }) if t == "#commit" => {
                    if !dispatch_commit(&handler, &payload).await {
                        break;
                    }
                }
                // Other event kinds carry nothing this service consumes.
                Ok(Frame::Message { .. }) => {}
                Ok(Frame::Error { payload }) => {
                    match serde_ipld_dagcbor::from_slice::<subscribe_repos::Error>(&payload) {
                        Ok(err) => tracing::error!("subscription aborted by the relay: {err:?}"),
                        Err(_) => tracing::error!("subscription aborted by the relay"),
                    }
                    break;
                }
                // "Clients should ignore frames with headers that have unknown op or t values."
                // https://atproto.com/specs/event-stream
                Err(FrameError::UnknownType(_)) => {}
                Err(err) => tracing::error!("invalid frame: {err}"),
            }
        }
        self.stream.close(None).await.ok();
        Ok(())
    }
}

/// Returns false when the subscription should stop.
async fn dispatch_commit(handler: &impl CommitHandler, payload: &[u8]) -> bool {
    let commit = match serde_ipld_dagcbor::from_slice::<Commit>(payload) {
        Ok(commit) => commit,
        Err(err) => {
            tracing::error!("commit message decode failed: {err}");
            return true;
        }
    };
    // A commit flagged "too big" ships without its blocks; an empty archive
    // has nothing to decode either way.
    if commit.too_big || commit.blocks.is_empty() {
        return true;
    }
    match handler.handle_commit(&commit).await {
        Ok(()) => true,
        Err(Error::QueueClosed) => {
            tracing::error!("admission queue closed; stopping the subscription");
            false
        }
        Err(err) => {
            tracing::error!("commit handling failed: {err}");
            true
        }
    }
}
