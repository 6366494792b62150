//! Error types for coordinator misuse and for settled requests

/// Errors from coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// confirm/cancel was called while nothing is suspended.
    #[error("no authentication episode is pending")]
    NoPendingEpisode,

    #[error("unknown transport: {0}")]
    UnknownTransport(String),

    #[error("transport registered twice: {0}")]
    DuplicateTransport(String),
}

/// Result alias for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a request issued through an interceptor settled as rejected.
///
/// `F` is the transport's failure payload, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError<F> {
    /// Auth-required outcome of a request that opted out of interception.
    #[error("authentication required: {0:?}")]
    AuthRequired(F),

    #[error("forbidden: {0:?}")]
    Forbidden(F),

    /// Any other failure, including the new failure of a replayed request.
    #[error("transport failure: {0:?}")]
    Transport(F),

    /// Re-authentication was cancelled with this reason.
    #[error("login cancelled: {0}")]
    Cancelled(String),

    /// The confirm-time request updater failed for this request.
    #[error("request update failed: {0}")]
    ConfigUpdate(String),
}
