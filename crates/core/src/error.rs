//! Error types for the mirroring server library.

use std::fmt;

/// Errors that can occur in the mirroring server library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse) — malformed RTSP messages.
/// - **Transport**: [`Io`](Self::Io) — socket/network failures, including
///   bind failure at startup.
/// - **Server**: [`AlreadyRunning`](Self::AlreadyRunning).
///
/// Per-client write failures during broadcast are handled in place (the
/// client is dropped from the registry) and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum CastError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI` format.
    InvalidRequestLine,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
        }
    }
}

/// Convenience alias for `Result<T, CastError>`.
pub type Result<T> = std::result::Result<T, CastError>;
