use bsky_sdk::api::xrpc::error::XrpcErrorKind;
use bsky_sdk::api::xrpc::Error as XrpcError;
use std::fmt::Debug;
use thiserror::Error;

/// Error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for environment variable {0}")]
    InvalidEnv(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid uri")]
    InvalidUri,
    #[error("firehose connection error: {0}")]
    Subscription(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("commit block archive decode error: {0}")]
    CommitDecode(String),
    #[error("admission queue closed")]
    QueueClosed,
    #[error("session error: {0}")]
    Session(String),
    #[error("xrpc response error: {0}")]
    Xrpc(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl<E> From<XrpcError<E>> for Error
where
    E: Debug,
{
    fn from(err: XrpcError<E>) -> Self {
        if let XrpcError::XrpcResponse(e) = err {
            let mut message = e.status.as_str().to_string();
            match e.error {
                Some(XrpcErrorKind::Undefined(res)) => {
                    message = format!("{message} {res}");
                }
                Some(XrpcErrorKind::Custom(e)) => {
                    message = format!("{message} {e:?}");
                }
                None => {}
            }
            Self::Xrpc(message)
        } else {
            Self::Xrpc(format!("{err:?}"))
        }
    }
}

/// Type alias to use this crate's [`Error`](enum@crate::Error) type in a [`Result`](core::result::Result).
pub type Result<T> = core::result::Result<T, Error>;
