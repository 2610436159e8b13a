//! Unified error type and error-to-response normalization.

use thiserror::Error;

use crate::config::ConfigError;
use crate::response::Response;
use crate::status::Status;

/// Why a raw request buffer could not be turned into a [`Request`](crate::Request).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum DecodeError {
    #[error("Malformed request")]
    MalformedRequest,
    #[error("Request URL length is greater than 1024 characters")]
    UrlTooLong,
    #[error("Request URL has no scheme")]
    NoScheme,
    #[error("Request URL has an incorrect scheme (server can only deal with Gemini requests)")]
    WrongScheme,
    #[error("Request URL could not be parsed")]
    UrlParse(#[from] url::ParseError),
}

/// Why a [`Response`] could not be put on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum EncodeError {
    #[error("meta too long (len {0} > 1024)")]
    MetaTooLong(usize),
    #[error("impossible response")]
    ImpossibleResponse,
}

/// The error type returned by handlers, middleware and the server.
///
/// Handlers raise [`Error::status`] to choose exactly what the client sees.
/// Anything else ([`Error::other`], I/O failures, ...) reaches the client as a
/// generic `40 Temporary failure`; the details only go to the log.
#[derive(Debug, Error)]
pub enum Error {
    /// Structured application error: `status` and `message` go on the wire.
    #[error("{message}")]
    Status { status: Status, message: String },

    /// No remaining route entry matched the request.
    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Generic application error.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn status(status: Status, message: impl Into<String>) -> Self {
        Self::Status { status, message: message.into() }
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn other(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(e.into())
    }

    /// The status and meta a client should see for this error.
    pub fn to_status_message(&self) -> (Status, String) {
        match self {
            Self::Status { status, message } => (*status, message.clone()),
            Self::NotFound => (Status::NotFound, "Not found".to_owned()),
            Self::Decode(e) => (Status::BadRequest, e.to_string()),
            _ => (Status::TemporaryFailure, "Temporary failure".to_owned()),
        }
    }
}

/// Rewrites `response` in place into the error response for `err`.
///
/// Any partially-built body is dropped: only success responses carry content.
pub fn normalize(response: &mut Response, err: &Error) {
    let (status, message) = err.to_status_message();
    response.clear_content();
    response.set_status(status);
    response.set_meta_unchecked(message.into_bytes());
}
