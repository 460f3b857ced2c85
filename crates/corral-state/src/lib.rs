//! corral-state — persisted group metadata for the Corral orchestrator.
//!
//! A thin redb-backed store holding one `ContainerGroupMeta` record per
//! submitted group. The daemon writes through on every intent mutation and
//! replays the whole table into the scheduler at startup.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::MetaStore;
