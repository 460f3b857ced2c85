//! Scheduler error types.

use corral_core::ResourceError;
use thiserror::Error;

/// Errors returned synchronously from intent operations. Placement
/// failures of individual containers are not errors — they surface as
/// `last_res_err` on the container and are retried.
#[derive(Debug, Error)]
pub enum SchedError {
    #[error("unknown container group: {0}")]
    UnknownGroup(String),

    #[error("unknown container: {0}")]
    UnknownContainer(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("agent is not frozen: {0}")]
    NotFrozen(String),

    #[error("invalid replica count: {0}")]
    ReplicaInvalid(i32),

    #[error("container group already terminated: {0}")]
    AlreadyTerminated(String),

    #[error("container group id conflict: {0}")]
    IdConflict(String),

    #[error("no pending container in group: {0}")]
    NoPendingContainer(String),

    #[error("no update in progress to pause or continue: {0}")]
    NotPaused(String),

    #[error("no previous version to restore: {0}")]
    NoPreviousVersion(String),

    #[error("placement constraint mismatch: {0:?}")]
    Mismatch(ResourceError),

    #[error("preemption found no viable victim on agent: {0}")]
    PreemptFailed(String),
}

pub type SchedResult<T> = Result<T, SchedError>;
