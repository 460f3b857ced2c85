//! Core identifier, lifecycle, and wire types.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::manifest::ContainerManifest;

/// Stable agent address (`host:port`).
pub type AgentEndpoint = String;

/// Identifier of a replicated job.
pub type ContainerGroupId = String;

/// Identifier of one container: `<group>.pod_<offset>`.
pub type ContainerId = String;

/// Path of a typed storage device on an agent.
pub type DevicePath = String;

// ── Lifecycle ─────────────────────────────────────────────────────

/// Priority class of a job. Numerically ascending = descending importance;
/// best-effort is admitted only against reserved headroom.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Monitor,
    #[default]
    Service,
    Batch,
    BestEffort,
}

/// Whether a container runs a workload or only exports a shared volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    #[default]
    Normal,
    Volume,
}

/// Lifecycle status of a container.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    #[default]
    Pending,
    Allocating,
    Ready,
    Finish,
    Error,
    Destroying,
    Terminated,
}

impl ContainerStatus {
    /// Every status, in bucket iteration order.
    pub const ALL: [ContainerStatus; 7] = [
        ContainerStatus::Pending,
        ContainerStatus::Allocating,
        ContainerStatus::Ready,
        ContainerStatus::Finish,
        ContainerStatus::Error,
        ContainerStatus::Destroying,
        ContainerStatus::Terminated,
    ];
}

/// Why a container could not be placed (or `Ok`). Surfaced on the
/// container as `last_res_err` for diagnostics; never fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceError {
    #[default]
    Ok,
    NoCpu,
    NoMemory,
    NoMemoryForTmpfs,
    NoDevice,
    NoPort,
    PortConflict,
    TagMismatch,
    PoolMismatch,
    TooManyPods,
    NoVolumeContainer,
    TooManyBatchPods,
}

impl ResourceError {
    /// Hard-class codes may be overwritten by any newer failure; resource
    /// shortages stick until placement succeeds or a newer shortage is seen.
    pub fn is_overwritable(self) -> bool {
        matches!(
            self,
            ResourceError::Ok
                | ResourceError::TagMismatch
                | ResourceError::PoolMismatch
                | ResourceError::TooManyPods
        )
    }
}

/// Storage medium of a volume.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VolumeMedium {
    Ssd,
    #[default]
    Disk,
    Bfs,
    Tmpfs,
}

/// Size/medium/exclusivity of a device or of an aggregate of assignments
/// on one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub medium: VolumeMedium,
    pub size: i64,
    pub exclusive: bool,
}

// ── Agent wire types ──────────────────────────────────────────────

/// Per-volume usage reported by an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeUsage {
    pub path: String,
    pub used_size: i64,
    pub medium: VolumeMedium,
}

/// Last reported live usage of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub cpu_used: i64,
    pub memory_used: i64,
    pub volumes_used: Vec<VolumeUsage>,
    pub ports_used: Vec<String>,
}

/// Static description of an agent offered to the scheduler when it joins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub endpoint: AgentEndpoint,
    pub cpu_millicores: i64,
    pub memory_bytes: i64,
    /// Typed storage devices by path.
    pub volumes: BTreeMap<DevicePath, VolumeInfo>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub pool: String,
}

/// One container as reported in an agent heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReport {
    pub id: ContainerId,
    pub group_id: ContainerGroupId,
    pub status: ContainerStatus,
    pub manifest: ContainerManifest,
    #[serde(default)]
    pub cpu_used: i64,
    #[serde(default)]
    pub memory_used: i64,
    #[serde(default)]
    pub volumes_used: Vec<VolumeUsage>,
    #[serde(default)]
    pub ports_used: Vec<String>,
}

/// A full heartbeat from an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub endpoint: AgentEndpoint,
    #[serde(default)]
    pub containers: Vec<ContainerReport>,
}

/// What a command tells the agent to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    CreateContainer,
    DestroyContainer,
}

/// A corrective action for one container, produced by heartbeat
/// reconciliation. Create commands carry the manifest with concrete
/// device paths, real ports, and volume-container ids filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCommand {
    pub action: CommandAction,
    pub container_id: ContainerId,
    pub group_id: ContainerGroupId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ContainerManifest>,
}

// ── Persisted metadata ────────────────────────────────────────────

/// Lifecycle of a persisted group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    #[default]
    Normal,
    Terminated,
}

/// Group metadata as persisted to the state store and consumed at reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerGroupMeta {
    pub id: ContainerGroupId,
    pub name: String,
    pub user: String,
    /// Unix micros at submit.
    pub submit_time: i64,
    /// Unix micros at last update.
    pub update_time: i64,
    pub replica: i32,
    /// Seconds between per-agent rolling-update steps.
    pub update_interval: i64,
    pub status: GroupStatus,
    pub manifest: ContainerManifest,
}

// ── Reporting views ───────────────────────────────────────────────

/// Assigned vs actually-used amount of one resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTotals {
    pub assigned: i64,
    pub used: i64,
}

/// Per-medium volume totals in a statistics view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeTotals {
    pub medium: VolumeMedium,
    #[serde(default)]
    pub device_path: String,
    pub volume: ResourceTotals,
}

/// Aggregate view of one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerGroupStats {
    pub id: ContainerGroupId,
    pub name: String,
    pub user: String,
    pub replica: i32,
    pub ready: usize,
    pub pending: usize,
    pub allocating: usize,
    pub destroying: usize,
    pub submit_time: i64,
    pub update_time: i64,
    pub container_type: ContainerType,
    pub status: GroupStatus,
    pub cpu: ResourceTotals,
    pub memory: ResourceTotals,
    pub volumes: Vec<VolumeTotals>,
}

/// View of one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub id: ContainerId,
    pub status: ContainerStatus,
    pub endpoint: AgentEndpoint,
    pub last_res_err: ResourceError,
    pub cpu: ResourceTotals,
    pub memory: ResourceTotals,
    pub volumes: Vec<VolumeTotals>,
}

/// Aggregate resources a user holds (or a meta would hold).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub millicores: i64,
    pub memory: i64,
    pub disk: i64,
    pub ssd: i64,
    pub replica: i64,
}
