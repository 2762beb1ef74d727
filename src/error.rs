//! Error types surfaced by the call controller.
//!
//! Server-originated failures arrive as numeric codes and are resolved through
//! [`ErrorKind::from_code`]. Local misuse of the API is reported synchronously
//! through [`CallError`] and never travels through the event stream.

use serde::Serialize;
use thiserror::Error;

/// Typed classification of a voice error, keyed by its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    AccessTokenInvalid,
    AccessTokenExpired,
    AuthenticationFailed,
    UnknownError,
    GeneralConnectionError,
    TransportError,
    UserMediaPermissionDenied,
    UserMediaAcquisitionFailed,
    NotFound,
    TemporarilyUnavailable,
    BusyHere,
    Declined,
    SignalingConnectionError,
    SignalingConnectionDisconnected,
    MediaConnectionError,
}

const CODE_TABLE: &[(u32, ErrorKind)] = &[
    (20101, ErrorKind::AccessTokenInvalid),
    (20104, ErrorKind::AccessTokenExpired),
    (20151, ErrorKind::AuthenticationFailed),
    (31000, ErrorKind::UnknownError),
    (31005, ErrorKind::GeneralConnectionError),
    (31009, ErrorKind::TransportError),
    (31401, ErrorKind::UserMediaPermissionDenied),
    (31402, ErrorKind::UserMediaAcquisitionFailed),
    (31404, ErrorKind::NotFound),
    (31480, ErrorKind::TemporarilyUnavailable),
    (31486, ErrorKind::BusyHere),
    (31603, ErrorKind::Declined),
    (53000, ErrorKind::SignalingConnectionError),
    (53001, ErrorKind::SignalingConnectionDisconnected),
    (53405, ErrorKind::MediaConnectionError),
];

impl ErrorKind {
    /// Resolves a server-supplied code. Codes without a precise local
    /// mapping return `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        CODE_TABLE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, kind)| *kind)
    }

    pub fn code(self) -> u32 {
        CODE_TABLE
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(code, _)| *code)
            .unwrap_or(31000)
    }

    pub fn default_message(self) -> &'static str {
        match self {
            Self::AccessTokenInvalid => "Invalid access token",
            Self::AccessTokenExpired => "Access token expired or expiration date invalid",
            Self::AuthenticationFailed => "Authentication failed",
            Self::UnknownError => "An unknown error has occurred",
            Self::GeneralConnectionError => "Connection error",
            Self::TransportError => "No transport available to send or receive messages",
            Self::UserMediaPermissionDenied => "Permission to use the microphone was denied",
            Self::UserMediaAcquisitionFailed => "The microphone could not be acquired",
            Self::NotFound => "The callee could not be found",
            Self::TemporarilyUnavailable => "The callee is temporarily unavailable",
            Self::BusyHere => "The callee is busy",
            Self::Declined => "The callee declined the call",
            Self::SignalingConnectionError => "Signaling connection error",
            Self::SignalingConnectionDisconnected => "Signaling connection disconnected",
            Self::MediaConnectionError => "Media connection failed",
        }
    }
}

/// A typed error as surfaced in session events.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind:?} ({code}): {message}")]
pub struct VoiceError {
    pub kind: ErrorKind,
    pub code: u32,
    pub message: String,
}

impl VoiceError {
    pub fn new(kind: ErrorKind) -> Self {
        Self::with_message(kind, kind.default_message())
    }

    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code(),
            message: message.into(),
        }
    }

    /// Builds the typed error for a numeric code reported by the server.
    /// Unmapped codes become [`ErrorKind::UnknownError`] but keep the raw
    /// code and message.
    pub fn from_server(code: u32, message: impl Into<String>) -> Self {
        let kind = ErrorKind::from_code(code).unwrap_or(ErrorKind::UnknownError);
        Self {
            kind,
            code,
            message: message.into(),
        }
    }
}

/// Synchronous errors returned to the caller of a session operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("call session has ended")]
    SessionClosed,
}
