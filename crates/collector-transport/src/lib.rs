//! Networked substrate around `collector-core`'s pure event pipeline.
//!
//! This crate owns everything `collector-core` deliberately doesn't:
//! the wire frame shapes (`protocol`), the per-connection outbound
//! handle plumbed into `collector_core::SessionRegistry` (`registry`),
//! the pending-reply correlation table for outbound commands
//! (`command_router`), the reader/writer tasks for one accepted
//! connection (`connection`), the broadcast fan-out for `/events`
//! subscribers (`broadcast`), and the collector server itself
//! (`server`): socket acceptor, port-retry bind, and graceful shutdown.

pub mod broadcast;
pub mod command_router;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;

pub use command_router::CommandRouter;
pub use error::TransportError;
pub use registry::SessionTransport;
pub use server::{CollectorServer, ServerHandle};
