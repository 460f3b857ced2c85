//! corral-core — shared domain types for the Corral orchestrator.
//!
//! Everything the scheduler, the state store, and the daemon agree on
//! lives here:
//!
//! - Job manifests (`ContainerManifest`) and the immutable, versioned
//!   `Requirement` sealed from them
//! - Container/group lifecycle enums and placement error codes
//! - Wire types exchanged with agents (`AgentSnapshot`, `AgentCommand`)
//! - Persisted group metadata (`ContainerGroupMeta`)
//! - Identifier and version-token generation
//! - `SchedulerConfig` defaults

pub mod config;
pub mod ident;
pub mod manifest;
pub mod requirement;
pub mod types;

pub use config::{SchedulerConfig, MAX_PORT, MIN_PORT};
pub use ident::{container_id, generate_group_id, group_id_of, new_version_token};
pub use manifest::{
    BlkioWeight, CgroupSpec, ContainerManifest, CpuRequired, MemoryRequired, PortRequired,
    TcpThrottle, VolumeKind, VolumeRequired, DYNAMIC_PORT,
};
pub use requirement::Requirement;
pub use types::*;
