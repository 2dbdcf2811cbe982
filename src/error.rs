use thiserror::Error;

use crate::http::HttpError;

/// Failure of a call to an external collaborator.
#[derive(Debug, Error)]
pub(crate) enum RemoteError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Unavailable(String),
}

/// Degradations the playback engine recovers from. None of them is fatal;
/// each is logged where it is caught and turned into a typed outcome.
#[derive(Debug, Error)]
pub(crate) enum EngineError {
    #[error("watch state storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("feed fetch failed: {0}")]
    FeedFetchFailed(#[source] RemoteError),
    #[error("media failed to load: {0}")]
    MediaLoadFailed(String),
    #[error("entitlement check failed: {0}")]
    EntitlementCheckFailed(#[source] RemoteError),
    #[error("view checkpoint dropped: {0}")]
    CheckpointEmitFailed(#[source] RemoteError),
}
