//! corrald — daemon wiring for the Corral orchestrator.
//!
//! The REST router lives here so integration tests can drive it without
//! binding a socket; the binary adds CLI parsing and the timer loops.

pub mod api;
