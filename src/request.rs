//! Incoming request type and its wire decoding.
//!
//! A request is nothing but an absolute URL followed by CRLF:
//!
//! ```text
//! gemini://gem.example.com/hello/Abi?q=1<CRLF>
//! ```

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::DecodeError;
use crate::path::split_path;

/// The only scheme this server answers.
pub const SCHEME: &str = "gemini";

/// Longest request URL the protocol allows, in bytes.
pub const MAX_URL_LEN: usize = 1024;

/// Largest request buffer worth reading: the URL plus CRLF.
pub const MAX_REQUEST_LEN: usize = MAX_URL_LEN + 2;

/// U+FFFF encoded as UTF-8. Never valid at the start of a request or a meta.
pub(crate) const SENTINEL: &[u8] = "\u{FFFF}".as_bytes();

/// An incoming Gemini request, decoded from the raw connection bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    url: Url,
    // Percent-decoded and lower-cased, for matching against registered
    // patterns.
    components: Vec<String>,
    // Percent-decoded and case-preserving, for parameter values.
    raw_components: Vec<String>,
}

impl Request {
    /// Decodes a request from the bytes read off a connection.
    ///
    /// Everything after the first CRLF is ignored.
    ///
    /// ```rust
    /// use mercury::{DecodeError, Request};
    ///
    /// let req = Request::decode(b"gemini://gem.example.com\r\n").unwrap();
    /// assert_eq!(req.url().as_str(), "gemini://gem.example.com");
    ///
    /// assert_eq!(Request::decode(b"gem.example.com\r\n"), Err(DecodeError::NoScheme));
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.starts_with(SENTINEL) {
            return Err(DecodeError::MalformedRequest);
        }

        let end = buf
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or(DecodeError::MalformedRequest)?;
        let raw = &buf[..end];

        if raw.len() > MAX_URL_LEN {
            return Err(DecodeError::UrlTooLong);
        }

        let raw = std::str::from_utf8(raw).map_err(|_| DecodeError::MalformedRequest)?;
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => return Err(DecodeError::NoScheme),
            Err(e) => return Err(DecodeError::UrlParse(e)),
        };

        if !url.scheme().eq_ignore_ascii_case(SCHEME) {
            return Err(DecodeError::WrongScheme);
        }

        Self::from_url(url)
    }

    fn from_url(url: Url) -> Result<Self, DecodeError> {
        // Split before decoding so an escaped `%2F` stays inside its component.
        let raw_components = split_path(url.path())
            .iter()
            .map(|c| {
                percent_decode_str(c)
                    .decode_utf8()
                    .map(|c| c.into_owned())
                    .map_err(|_| DecodeError::MalformedRequest)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let components = raw_components.iter().map(|c| c.to_lowercase()).collect();
        Ok(Self { url, components, raw_components })
    }

    pub fn url(&self) -> &Url { &self.url }
    pub fn host(&self) -> Option<&str> { self.url.host_str() }

    /// The URL path as sent, still percent-encoded; `/` when the URL has none.
    pub fn path(&self) -> &str {
        match self.url.path() {
            "" => "/",
            p => p,
        }
    }

    /// The query string without its leading `?`, if one was sent.
    pub fn raw_query(&self) -> Option<&str> {
        self.url.query()
    }

    pub(crate) fn components(&self) -> &[String] { &self.components }
    pub(crate) fn raw_components(&self) -> &[String] { &self.raw_components }
}
