//! Gemini status codes as a typed enum.
//!
//! Use [`Status`] anywhere a status code is accepted: `Context::set_status`,
//! `Response::new`, or inside an [`Error::status`](crate::Error::status).
//! Raw `u8` codes are accepted too, since the protocol allows clients to fall
//! back on the first digit of codes they do not know.
//!
//! ```rust
//! use mercury::{Context, Error, Status};
//!
//! fn members_only(ctx: &mut Context<'_>) -> Result<(), Error> {
//!     if ctx.client_certificates().is_empty() {
//!         return Err(Error::status(Status::ClientCertificateRequired, "Log in first"));
//!     }
//!     ctx.set_body("welcome back\n");
//!     Ok(())
//! }
//! ```

use std::fmt;

/// All status codes defined by the Gemini protocol.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    // ── 1x Input ──────────────────────────────────────────────────────────────
    Input,                     // 10
    SensitiveInput,            // 11

    // ── 2x Success ────────────────────────────────────────────────────────────
    Success,                   // 20

    // ── 3x Redirect ───────────────────────────────────────────────────────────
    TemporaryRedirect,         // 30
    PermanentRedirect,         // 31

    // ── 4x Temporary failure ──────────────────────────────────────────────────
    TemporaryFailure,          // 40
    ServerUnavailable,         // 41
    CgiError,                  // 42
    ProxyError,                // 43
    SlowDown,                  // 44

    // ── 5x Permanent failure ──────────────────────────────────────────────────
    PermanentFailure,          // 50
    NotFound,                  // 51
    Gone,                      // 52
    ProxyRequestRefused,       // 53
    BadRequest,                // 59

    // ── 6x Client certificates ────────────────────────────────────────────────
    ClientCertificateRequired, // 60
    CertificateNotAuthorised,  // 61
    CertificateNotValid,       // 62
}

impl From<Status> for u8 {
    fn from(s: Status) -> u8 {
        match s {
            Status::Input                     => 10,
            Status::SensitiveInput            => 11,
            Status::Success                   => 20,
            Status::TemporaryRedirect         => 30,
            Status::PermanentRedirect         => 31,
            Status::TemporaryFailure          => 40,
            Status::ServerUnavailable         => 41,
            Status::CgiError                  => 42,
            Status::ProxyError                => 43,
            Status::SlowDown                  => 44,
            Status::PermanentFailure          => 50,
            Status::NotFound                  => 51,
            Status::Gone                      => 52,
            Status::ProxyRequestRefused       => 53,
            Status::BadRequest                => 59,
            Status::ClientCertificateRequired => 60,
            Status::CertificateNotAuthorised  => 61,
            Status::CertificateNotValid       => 62,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Whether `code` belongs to the success class (`2x`), the only class whose
/// responses may carry a body.
pub fn is_success(code: u8) -> bool {
    code / 10 == 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_class_is_tens_digit_two() {
        assert!(is_success(20));
        assert!(is_success(22));
        assert!(is_success(29));
        assert!(!is_success(2));
        assert!(!is_success(30));
        assert!(!is_success(51));
    }

    #[test]
    fn codes_match_table() {
        assert_eq!(u8::from(Status::Success), 20);
        assert_eq!(u8::from(Status::NotFound), 51);
        assert_eq!(u8::from(Status::BadRequest), 59);
        assert_eq!(Status::CertificateNotValid.to_string(), "62");
    }
}
