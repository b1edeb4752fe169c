//! Error types
//!
//! [`Error`] is the crate-wide error. Failures of the backend handshake itself are
//! always a [`DialError`], which keeps the failing stage, the backend address and
//! the original cause so callers can decide whether to retry, redirect or fail the
//! client without re-inspecting the transport.

use crate::connection::BackendAddress;
use std::fmt;
use std::io;
use thiserror::Error;

/// Boxed cause preserved inside a [`DialError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error outside of a classified dial
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration or input
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed wire-protocol data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid state transition
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Backend connection could not be established
    #[error(transparent)]
    Dial(#[from] DialError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The classified dial failure, if this error is one
    pub fn as_dial(&self) -> Option<&DialError> {
        match self {
            Error::Dial(err) => Some(err),
            _ => None,
        }
    }
}

/// Coarse error code exposed to the immediate caller.
///
/// Every [`DialErrorKind`] maps to [`ErrorCode::BackendDialFailed`]; the finer
/// distinction lives in the kind and the cause chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// The proxy could not establish a session with the backend
    BackendDialFailed,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendDialFailed => write!(f, "backend dial failed"),
        }
    }
}

/// Stage at which establishing a backend connection failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialErrorKind {
    /// The transport could not be opened (unreachable, refused or timed out)
    DialFailed,
    /// Writing the SSLRequest failed
    NegotiationWriteFailed,
    /// Reading the one-byte SSLRequest response failed
    NegotiationReadFailed,
    /// The backend declined the TLS upgrade
    NegotiationRejected,
    /// Writing the startup message failed, including a failed TLS handshake
    RelayFailed,
}

impl DialErrorKind {
    /// All kinds, in handshake order
    pub const ALL: [DialErrorKind; 5] = [
        DialErrorKind::DialFailed,
        DialErrorKind::NegotiationWriteFailed,
        DialErrorKind::NegotiationReadFailed,
        DialErrorKind::NegotiationRejected,
        DialErrorKind::RelayFailed,
    ];

    /// Umbrella code for this kind
    pub fn code(&self) -> ErrorCode {
        ErrorCode::BackendDialFailed
    }

    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DialFailed => "dial_failed",
            Self::NegotiationWriteFailed => "negotiation_write_failed",
            Self::NegotiationReadFailed => "negotiation_read_failed",
            Self::NegotiationRejected => "negotiation_rejected",
            Self::RelayFailed => "relay_failed",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::DialFailed => "unable to reach backend SQL server",
            Self::NegotiationWriteFailed => "sending SSLRequest to target server",
            Self::NegotiationReadFailed => "reading response to SSLRequest",
            Self::NegotiationRejected => "target server refused TLS connection",
            Self::RelayFailed => "relaying StartupMessage to target server",
        }
    }
}

impl fmt::Display for DialErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cause attached to [`DialErrorKind::NegotiationRejected`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("server answered SSLRequest with 0x{response:02X}")]
pub struct TlsRefused {
    /// The byte the backend sent instead of `S`
    pub response: u8,
}

/// Classified failure to establish a backend connection.
///
/// The cause is available through [`std::error::Error::source`]; match on
/// [`DialError::kind`] or downcast the cause rather than parsing the message.
#[derive(Debug)]
pub struct DialError {
    kind: DialErrorKind,
    address: BackendAddress,
    source: BoxError,
}

impl DialError {
    /// Create a dial error with a preserved cause
    pub fn new(kind: DialErrorKind, address: BackendAddress, cause: impl Into<BoxError>) -> Self {
        Self {
            kind,
            address,
            source: cause.into(),
        }
    }

    /// Failing stage
    pub fn kind(&self) -> DialErrorKind {
        self.kind
    }

    /// Umbrella code (always [`ErrorCode::BackendDialFailed`])
    pub fn code(&self) -> ErrorCode {
        self.kind.code()
    }

    /// Backend the attempt targeted
    pub fn address(&self) -> &BackendAddress {
        &self.address
    }

    /// The underlying I/O error, when the cause is one
    pub fn io_error(&self) -> Option<&io::Error> {
        self.source.downcast_ref::<io::Error>()
    }

    /// The refused response byte for [`DialErrorKind::NegotiationRejected`]
    pub fn refused_response(&self) -> Option<u8> {
        self.source
            .downcast_ref::<TlsRefused>()
            .map(|r| r.response)
    }

    /// Whether the attempt ran out of time rather than failing outright
    pub fn is_timeout(&self) -> bool {
        self.io_error()
            .is_some_and(|e| e.kind() == io::ErrorKind::TimedOut)
    }

    /// Message that is safe to show SQL clients.
    ///
    /// Operators get the precise stage and cause from logs; clients only learn
    /// that the backend could not be reached.
    pub fn client_message(&self) -> &'static str {
        "unable to reach backend"
    }

    /// Render the error with its full cause chain, `a: b: c`
    pub fn display_chain(&self) -> String {
        let mut out = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        out
    }
}

impl fmt::Display for DialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (backend {})", self.kind.message(), self.address)
    }
}

impl std::error::Error for DialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source as &(dyn std::error::Error + 'static))
    }
}
