//! Transport-level failures, kept distinct from `collector_core::CollectorError`
//! until they cross the boundary into a core-facing result (§7: the core
//! boundary only sees the §7 error kinds; socket/IO specifics stay here).

use thiserror::Error;

use collector_core::CollectorError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no candidate port available in {start}..={end}")]
    PortInUse { start: u16, end: u16 },

    #[error(transparent)]
    Collector(#[from] CollectorError),
}

impl From<TransportError> for CollectorError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::PortInUse { start, end } => CollectorError::PortInUse { start, end },
            TransportError::Collector(e) => e,
            // Socket/serialization failures at this layer are always
            // non-fatal to the collector's running state: a single bad
            // frame becomes InvalidFrame, never a crash.
            TransportError::Io(_) | TransportError::WebSocket(_) | TransportError::Json(_) => {
                CollectorError::InvalidFrame
            }
        }
    }
}
