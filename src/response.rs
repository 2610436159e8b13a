//! Outgoing response type and its wire encoding.
//!
//! A response is a status line followed, for success codes only, by the body:
//!
//! ```text
//! <status><SP><meta><CRLF>[<content>]
//! ```
//!
//! There is no length prefix and no trailer; the connection is closed after
//! the last content byte.

use crate::error::EncodeError;
use crate::request::SENTINEL;
use crate::status::{Status, is_success};

/// Longest meta field the protocol allows, in bytes.
pub const MAX_META_LEN: usize = 1024;

/// Meta every response starts with; fits a `20` status.
pub const DEFAULT_META: &str = "text/plain";

/// An outgoing Gemini response.
///
/// Handlers normally build it through [`Context`](crate::Context); it is
/// public so responses can be encoded and inspected directly:
///
/// ```rust
/// use mercury::{Response, Status};
///
/// let ok = Response::new(Status::Success, "text/plain", "Hello world!");
/// assert_eq!(ok.encode().unwrap(), b"20 text/plain\r\nHello world!");
///
/// let missing = Response::new(Status::NotFound, "Not found", "");
/// assert_eq!(missing.encode().unwrap(), b"51 Not found\r\n");
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    pub(crate) status: u8,
    pub(crate) meta: Vec<u8>,
    pub(crate) content: Vec<u8>,
}

impl Default for Response {
    /// `20 text/plain` with an empty body.
    fn default() -> Self {
        Self {
            status: Status::Success.into(),
            meta: DEFAULT_META.as_bytes().to_vec(),
            content: Vec::new(),
        }
    }
}

impl Response {
    pub fn new(status: impl Into<u8>, meta: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            status: status.into(),
            meta: meta.into().into_bytes(),
            content: content.into(),
        }
    }

    pub fn status(&self) -> u8 { self.status }
    pub fn meta(&self) -> &[u8] { &self.meta }
    pub fn content(&self) -> &[u8] { &self.content }

    pub fn set_status(&mut self, status: impl Into<u8>) {
        self.status = status.into();
    }

    /// Replaces the meta field, rejecting values the encoder would refuse.
    pub fn set_meta(&mut self, meta: impl Into<String>) -> Result<(), EncodeError> {
        let meta = meta.into();
        if meta.len() > MAX_META_LEN {
            return Err(EncodeError::MetaTooLong(meta.len()));
        }
        self.meta = meta.into_bytes();
        Ok(())
    }

    /// Length is checked again by [`encode`](Response::encode).
    pub(crate) fn set_meta_unchecked(&mut self, meta: Vec<u8>) {
        self.meta = meta;
    }

    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = content.into();
    }

    pub fn content_mut(&mut self) -> &mut Vec<u8> {
        &mut self.content
    }

    pub fn clear_content(&mut self) {
        self.content.clear();
    }

    /// Serializes the response into its wire form.
    ///
    /// Fails when meta exceeds [`MAX_META_LEN`], when meta starts with the
    /// reserved U+FFFF sentinel, or when a non-success response has a body.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.meta.len() > MAX_META_LEN {
            return Err(EncodeError::MetaTooLong(self.meta.len()));
        }
        if self.meta.starts_with(SENTINEL) {
            return Err(EncodeError::ImpossibleResponse);
        }
        if !is_success(self.status) && !self.content.is_empty() {
            return Err(EncodeError::ImpossibleResponse);
        }

        let status = self.status.to_string();
        let mut out = Vec::with_capacity(status.len() + 1 + self.meta.len() + 2 + self.content.len());
        out.extend_from_slice(status.as_bytes());
        out.push(b' ');
        out.extend_from_slice(&self.meta);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.content);
        Ok(out)
    }
}
