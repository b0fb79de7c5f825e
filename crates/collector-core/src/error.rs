//! Error kinds surfaced at the collector's core boundary.
//!
//! All non-fatal kinds are recovered locally by the caller (a discarded
//! frame, a resolved-with-error waiter); only [`CollectorError::PortInUse`]
//! and host-runtime failures are meant to propagate out of a server's
//! `start()`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollectorError {
    /// A frame failed decode entirely (not valid wire format).
    #[error("frame failed to decode")]
    InvalidFrame,

    /// A frame decoded but its tag is unknown or required header fields
    /// are missing.
    #[error("event has unknown tag or missing required fields")]
    InvalidEvent,

    /// A command targets a session with no registered, connected
    /// transport.
    #[error("no connected session for this id")]
    NoSession,

    /// No matching reply arrived before the deadline.
    #[error("command timed out waiting for reply")]
    Timeout,

    /// The session's socket closed before a reply arrived.
    #[error("session disconnected before reply")]
    Disconnected,

    /// The server is shutting down; all pending waiters are resolved
    /// with this kind.
    #[error("server is shutting down")]
    Shutdown,

    /// Every candidate port in the retry range was unavailable.
    #[error("no available port in range {start}..={end}")]
    PortInUse { start: u16, end: u16 },
}

pub type Result<T> = std::result::Result<T, CollectorError>;
