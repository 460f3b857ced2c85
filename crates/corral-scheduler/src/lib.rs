//! corral-scheduler — the placement and reconciliation core.
//!
//! Owns agents and container groups behind a single mutex and drives the
//! container lifecycle state machine:
//!
//! - Multi-dimensional feasibility (`AgentState::try_put`) and committed
//!   placement bookkeeping
//! - Intent operations: submit, update/rollback/pause/continue/cancel,
//!   kill, scale, agent add/remove/tag/pool/freeze, manual preemption
//! - The per-agent placement tick and the heartbeat reconciliation that
//!   emits create/destroy commands
//! - Terminated-group garbage collection and reporting views
//!
//! # Architecture
//!
//! ```text
//! Scheduler (one mutex)
//!   ├── AgentState per endpoint   (bookkeeping + feasibility oracle)
//!   ├── ContainerGroup per job    (containers + status buckets + rollout pacing)
//!   └── placement queue           (groups in submit order)
//! ```

pub mod agent;
pub mod error;
pub mod group;
pub mod scheduler;

pub use agent::{AgentOverview, AgentState};
pub use error::{SchedError, SchedResult};
pub use group::{Container, ContainerGroup};
pub use scheduler::{Scheduler, TickOutcome, UpdateOutcome};
