//! reqwest-backed transport
//!
//! Issues `HttpRequest`s against a fixed base URL and maps the response
//! status onto an [`Outcome`]. Connection errors, timeouts and unreadable
//! bodies are reported as `Outcome::Failure` with no status.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use common::Secret;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::{
    IssueFuture, Outcome, RequestConfig, Result, StatusClass, Transport, TransportError,
    classify_status,
};

/// A re-issuable HTTP request relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// Bypass auth interception for this request (e.g. the login call itself).
    pub ignore_auth_module: bool,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            ignore_auth_module: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = Some(body.into());
        request
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let header_name =
            HeaderName::from_str(name).map_err(|e| TransportError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Set `Authorization: Bearer <token>`, replacing any previous value.
    ///
    /// The header is marked sensitive so it is redacted from reqwest's debug
    /// output.
    pub fn with_bearer(mut self, token: &Secret<String>) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose())).map_err(
            |e| TransportError::InvalidHeader {
                name: AUTHORIZATION.to_string(),
                reason: e.to_string(),
            },
        )?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// True if the request already carries `Authorization: Bearer <token>`.
    pub fn has_bearer(&self, token: &Secret<String>) -> bool {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|value| value == token.expose().as_str())
    }

    /// Exempt this request from auth interception.
    pub fn bypass_auth(mut self) -> Self {
        self.ignore_auth_module = true;
        self
    }
}

impl RequestConfig for HttpRequest {
    fn ignore_auth_module(&self) -> bool {
        self.ignore_auth_module
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// A non-2xx response or a request that never produced one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    /// `None` when no response was received (connect error, timeout).
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => write!(f, "request failed: {}", self.message),
        }
    }
}

/// Transport issuing requests against one upstream base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport with its own client and a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Self::with_client(client, base_url)
    }

    /// Build a transport around an existing client.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(TransportError::InvalidUrl(format!(
                "must start with http:// or https://, got: {base_url}"
            )));
        }
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, request: HttpRequest) -> Outcome<HttpResponse, HttpFailure> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %url, error = %e, "upstream request failed");
                return Outcome::Failure(HttpFailure {
                    status: None,
                    message: e.to_string(),
                });
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!(url = %url, status, error = %e, "failed to read upstream body");
                return Outcome::Failure(HttpFailure {
                    status: Some(status),
                    message: format!("unreadable body: {e}"),
                });
            }
        };

        debug!(method = %request.method, url = %url, status, "upstream responded");

        match classify_status(status) {
            StatusClass::Success => Outcome::Success(HttpResponse { status, body }),
            StatusClass::AuthRequired => Outcome::AuthRequired(HttpFailure {
                status: Some(status),
                message: body,
            }),
            StatusClass::Forbidden => Outcome::Forbidden(HttpFailure {
                status: Some(status),
                message: body,
            }),
            StatusClass::Failure => Outcome::Failure(HttpFailure {
                status: Some(status),
                message: body,
            }),
        }
    }
}

impl Transport for HttpTransport {
    type Request = HttpRequest;
    type Response = HttpResponse;
    type Failure = HttpFailure;

    fn issue(&self, request: HttpRequest) -> IssueFuture<'_, HttpResponse, HttpFailure> {
        Box::pin(self.send(request))
    }
}
