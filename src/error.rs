//! The crate-wide error type.
//!
//! Mirrors the handler-facing error taxonomy in the specification: parse
//! failures, missing resources, conflicting inserts, validation failures,
//! backend I/O and peer RPC failures, each of which maps to exactly one
//! HTTP status code in `crate::handlers::error_status`.

use crate::http::ParseError;

/// When things go awry.
#[derive(Debug)]
pub enum HybridServerError {
    /// A request failed to parse; carries the specific reason.
    Parse(ParseError),
    /// The store had no resource for that UUID.
    NotFound,
    /// An insert referenced another resource that doesn't exist (e.g. an
    /// XSLT POST naming an unknown XSD), or a `put` collided with an
    /// existing UUID.
    Conflict,
    /// XML/XSD/XSLT processing failed; carries a human-readable reason.
    Validation(String),
    /// A storage backend (in-memory or relational) failed.
    Backend(String),
    /// A peer RPC call failed or timed out.
    Peer(String),
    /// The server failed to start.
    Startup(String),
    Io(std::io::Error),
}

impl std::fmt::Display for HybridServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HybridServerError::Parse(err) => write!(f, "malformed request: {err}"),
            HybridServerError::NotFound => write!(f, "resource not found"),
            HybridServerError::Conflict => write!(f, "conflicting resource reference"),
            HybridServerError::Validation(msg) => write!(f, "validation failed: {msg}"),
            HybridServerError::Backend(msg) => write!(f, "backend error: {msg}"),
            HybridServerError::Peer(msg) => write!(f, "peer error: {msg}"),
            HybridServerError::Startup(msg) => write!(f, "startup error: {msg}"),
            HybridServerError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for HybridServerError {}

impl From<std::io::Error> for HybridServerError {
    fn from(error: std::io::Error) -> Self {
        HybridServerError::Io(error)
    }
}

impl From<ParseError> for HybridServerError {
    fn from(error: ParseError) -> Self {
        HybridServerError::Parse(error)
    }
}

impl From<sqlx::Error> for HybridServerError {
    fn from(error: sqlx::Error) -> Self {
        HybridServerError::Backend(error.to_string())
    }
}

impl From<reqwest::Error> for HybridServerError {
    fn from(error: reqwest::Error) -> Self {
        HybridServerError::Peer(error.to_string())
    }
}

impl From<uuid::Error> for HybridServerError {
    fn from(error: uuid::Error) -> Self {
        HybridServerError::Validation(format!("invalid uuid: {error}"))
    }
}

impl From<askama::Error> for HybridServerError {
    fn from(error: askama::Error) -> Self {
        HybridServerError::Backend(format!("template error: {error}"))
    }
}
