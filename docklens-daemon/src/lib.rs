//! Docklens daemon library.
//!
//! Exposes the daemon internals for integration testing.
//! In production `docklens-daemon` runs as a binary (main.rs).

pub mod api;
pub mod cli;
pub mod daemon;
pub mod health;
pub mod lifecycle;
pub mod logging;
pub mod metrics_server;
