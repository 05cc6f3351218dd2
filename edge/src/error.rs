//! Error types for the `edge` crate.
//!
//! Follows the same pattern as the server crates with a root Error struct
//! and error kind enums per concern.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the edge crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the edge client core.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Fetch(FetchErrorKind),
    Queue(QueueErrorKind),
    Http(HttpErrorKind),
}

/// Errors from cache-agent fetch handling and installation.
#[derive(Debug, PartialEq)]
pub enum FetchErrorKind {
    /// One or more precache manifest entries could not be fetched; the
    /// entries that did succeed are cached and the caller may retry.
    PrecacheIncomplete,
    InvalidUrl,
}

/// Errors from offline action queue storage.
#[derive(Debug, PartialEq)]
pub enum QueueErrorKind {
    Storage,
    Serialization,
}

/// Errors from HTTP client operations.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    RequestFailed,
    Network,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Fetch(kind) => write!(f, "Fetch error: {:?}", kind),
            ErrorKind::Queue(kind) => write!(f, "Queue error: {:?}", kind),
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_request() {
            ErrorKind::Http(HttpErrorKind::RequestFailed)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Queue(QueueErrorKind::Storage),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Queue(QueueErrorKind::Serialization),
        }
    }
}

/// Helper function to create fetch errors.
pub fn fetch_error(kind: FetchErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Fetch(kind),
    }
}

/// Helper function to create queue errors.
pub fn queue_error(kind: QueueErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Queue(kind),
    }
}

/// Helper function to create HTTP errors.
pub fn http_error(kind: HttpErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Http(kind),
    }
}
