//! The HTTP/1.1 codec (spec §4.1): a strict request parser and a response
//! writer. Every failure mode the parser can hit maps to exactly one of the
//! `ParseError` variants below, which `crate::handlers` turns into a status
//! code.

mod headers;
mod request;
mod response;

pub use headers::OrderedParams;
pub use request::{parse, HttpRequest, Method, ParseError};
pub use response::{HttpResponse, PrintMode, StatusCode};

/// Request-line / header block read limit, mirroring the "reasonable
/// defensive limit" the original places on a single request.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Charsets the codec is willing to decode request/response bodies as.
/// Anything else is a 415 (spec §4.1).
pub fn is_supported_charset(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "utf-8" | "us-ascii" | "ascii" | "iso-8859-1" | "latin1"
    )
}
