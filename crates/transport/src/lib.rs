//! Transport contract for outbound requests
//!
//! A transport issues a request and reports a classified outcome. The
//! auth-recovery layer only needs that classification; how a transport
//! derives it (status codes, headers, protocol errors) is its own concern.
//! `HttpTransport` is the reqwest-backed implementation used by the service.

pub mod http;

pub use http::{HttpFailure, HttpRequest, HttpResponse, HttpTransport};

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Classified result of issuing one request.
///
/// `AuthRequired` is recoverable by re-authentication (401-equivalent).
/// `Forbidden` means authenticated but not permitted (403-equivalent) and is
/// terminal. Everything else that is not a success is a plain `Failure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<V, F> {
    Success(V),
    AuthRequired(F),
    Forbidden(F),
    Failure(F),
}

impl<V, F> Outcome<V, F> {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::AuthRequired(_) => "auth_required",
            Outcome::Forbidden(_) => "forbidden",
            Outcome::Failure(_) => "failure",
        }
    }
}

/// Status classes a transport maps its responses onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    AuthRequired,
    Forbidden,
    Failure,
}

/// Classify an HTTP status code.
///
/// 2xx is success, 401 is auth-required, 403 is forbidden. Redirects that
/// reach this point (the client did not follow them) and every other status
/// are plain failures.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 => StatusClass::AuthRequired,
        403 => StatusClass::Forbidden,
        _ => StatusClass::Failure,
    }
}

/// A request description sufficient to re-issue the request.
///
/// The recovery layer never inspects a request beyond the opt-out flag. It
/// keeps a clone of every intercepted request so it can be replayed.
pub trait RequestConfig: Clone + Send + 'static {
    /// When true, failures of this request bypass interception entirely.
    fn ignore_auth_module(&self) -> bool {
        false
    }
}

/// Boxed future returned by [`Transport::issue`].
pub type IssueFuture<'a, V, F> = Pin<Box<dyn Future<Output = Outcome<V, F>> + Send + 'a>>;

/// A channel capable of issuing a request and classifying its outcome.
///
/// Uses boxed futures for dyn-compatibility (`Arc<dyn Transport<...>>`), so a
/// single registry can hold differently-constructed transports that share
/// request and response types.
pub trait Transport: Send + Sync {
    type Request: RequestConfig;
    type Response: Send + 'static;
    type Failure: Clone + fmt::Debug + Send + Sync + 'static;

    /// Issue `request` and report its classified outcome.
    fn issue(&self, request: Self::Request) -> IssueFuture<'_, Self::Response, Self::Failure>;
}

/// Errors building transports or requests.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid base url: {0}")]
    InvalidUrl(String),

    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Result alias for transport construction.
pub type Result<T> = std::result::Result<T, TransportError>;
