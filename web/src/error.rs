use std::error::Error as StdError;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type Result<T> = core::result::Result<T, Error>;

/// Web-layer error. Each kind maps to exactly one HTTP status; response
/// bodies stay terse constants so internal detail never reaches a client.
#[derive(Debug)]
pub struct Error {
    source: Option<Box<dyn StdError + Send + Sync>>,
    error_kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request carried no usable identity token.
    MissingIdentity,
    /// The request body was not parseable JSON.
    MalformedBody,
    /// The body parsed as JSON but does not describe a known domain event.
    UnknownEvent,
}

impl Error {
    pub fn missing_identity() -> Self {
        Self {
            source: None,
            error_kind: ErrorKind::MissingIdentity,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error_kind
    }
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.error_kind {
            ErrorKind::MissingIdentity => (StatusCode::BAD_REQUEST, "BAD REQUEST").into_response(),
            ErrorKind::MalformedBody => (StatusCode::BAD_REQUEST, "BAD REQUEST").into_response(),
            ErrorKind::UnknownEvent => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE ENTITY").into_response()
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        let error_kind = match &rejection {
            JsonRejection::JsonDataError(_) => ErrorKind::UnknownEvent,
            _ => ErrorKind::MalformedBody,
        };
        Self {
            source: Some(Box::new(rejection)),
            error_kind,
        }
    }
}
