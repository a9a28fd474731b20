use crate::context::ContextError;
use hyper::StatusCode;
use hyper::body::Bytes;
use thiserror::Error;

/// Errors that can occur while serving a trivia request
#[derive(Error, Debug)]
pub enum TriviaError {
    /// The outbound call could not be completed (connect, TLS, reading the body)
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered with status >= 400
    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    /// The upstream answered successfully but the body is not the expected shape
    #[error("malformed upstream payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Context(#[from] ContextError),

    #[error("invalid upstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build response: {0}")]
    ResponseBuild(#[from] http::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response returned by the upstream, kept byte for byte so it can be
/// forwarded to the caller unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamError {
    pub status: StatusCode,
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.body.is_empty() {
            f.write_str("upstream API returned error")
        } else {
            f.write_str(&String::from_utf8_lossy(&self.body))
        }
    }
}

impl std::error::Error for UpstreamError {}
