//! Event model, bounded ring store, session registry, issue detector and
//! API-discovery engine for the observability collector.
//!
//! This crate is deliberately network-free: [`session::SessionRegistry`]
//! is generic over the transport handle type, and
//! [`store::EventStore`]/[`detector`]/[`api_discovery`] operate purely
//! over owned [`event::Event`] values. `collector-transport` and
//! `collector-app` supply the socket layer around this substrate.

pub mod api_discovery;
pub mod config;
pub mod detector;
pub mod envelope;
pub mod error;
pub mod event;
pub mod normalize;
pub mod ring;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use detector::detect_issues;
pub use error::{CollectorError, Result};
pub use event::{DecodedEvent, Event, EventKind, RawEventFrame};
pub use session::{SessionInfo, SessionRegistry};
pub use store::EventStore;
