//! Test-only fixtures, compiled for this crate's own unit tests and, via
//! the `testing` feature, for other workspace crates' `dev-dependencies`.

pub mod fixtures;
