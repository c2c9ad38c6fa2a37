//! Error types for feed requests.

use std::time::Duration;

use eventful_types::ParseViewModeError;

use crate::store::StoreError;

/// Errors that can occur while serving a feed or event lookup.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The request itself is malformed: unknown view mode, bad page or limit.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The user or event does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store failed. Never retried here.
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    /// An invitation points at an event the event collection no longer has.
    #[error("invitation references missing event '{event_id}'")]
    InconsistentJoin { event_id: String },

    /// A stored record did not decode as the expected type.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// The request did not finish within its deadline.
    #[error("feed request exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl From<ParseViewModeError> for FeedError {
    fn from(err: ParseViewModeError) -> Self {
        FeedError::InvalidArgument(err.to_string())
    }
}
