//! Job manifests — the verbatim description a user submits.
//!
//! A `ContainerManifest` is kept on the owning group exactly as submitted
//! (modulo the scheduler filling in concrete source paths, real ports, and
//! volume-container ids when issuing create commands) and is the input the
//! immutable [`Requirement`](crate::requirement::Requirement) is sealed from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{ContainerGroupId, ContainerId, ContainerType, Priority, VolumeMedium};

/// The literal a port request uses to ask for any free port.
pub const DYNAMIC_PORT: &str = "dynamic";

/// Cpu request for one cgroup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuRequired {
    /// Millicores (1000 = one core).
    pub millicores: i64,
    /// Whether the cgroup may burst above its quota.
    pub excess: bool,
}

/// Memory request for one cgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRequired {
    /// Bytes.
    pub size: i64,
    /// Whether the cgroup may burst above its limit.
    pub excess: bool,
    /// Use the orchestrator's own out-of-memory killer instead of the
    /// kernel's.
    pub use_oom_killer: bool,
}

impl Default for MemoryRequired {
    fn default() -> Self {
        Self {
            size: 1024,
            excess: false,
            use_oom_killer: false,
        }
    }
}

/// A single port request.
///
/// `port` is either [`DYNAMIC_PORT`] or a fixed decimal port string;
/// `real_port` is filled in by the scheduler once resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRequired {
    pub name: String,
    pub port: String,
    #[serde(default)]
    pub real_port: String,
}

/// Network bandwidth throttles for one cgroup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpThrottle {
    pub recv_bps_quota: i64,
    pub recv_bps_excess: bool,
    pub send_bps_quota: i64,
    pub send_bps_excess: bool,
}

/// Block-io weight for one cgroup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlkioWeight {
    pub weight: i32,
}

/// How a volume is realized on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeKind {
    #[default]
    EmptyDir,
    HostDir,
}

/// A volume request.
///
/// `source_path` is empty at submit time; the scheduler fills in the chosen
/// device path when issuing a create command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRequired {
    /// Bytes.
    pub size: i64,
    pub kind: VolumeKind,
    pub medium: VolumeMedium,
    #[serde(default)]
    pub source_path: String,
    pub dest_path: String,
    pub readonly: bool,
    /// Exclusive use of the backing device.
    pub exclusive: bool,
}

/// Resource and isolation settings for one cgroup of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CgroupSpec {
    pub cpu: CpuRequired,
    pub memory: MemoryRequired,
    #[serde(default)]
    pub ports: Vec<PortRequired>,
    #[serde(default)]
    pub tcp_throttle: TcpThrottle,
    #[serde(default)]
    pub blkio: BlkioWeight,
}

/// The full description of one container of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerManifest {
    /// Version token; minted by the scheduler on submit/update.
    #[serde(default)]
    pub version: String,
    pub priority: Priority,
    /// Optional coarse agent filter; empty means no constraint.
    #[serde(default)]
    pub tag: String,
    /// Agent must belong to one of these pools.
    pub pool_names: BTreeSet<String>,
    /// Max containers of this group per agent; 0 means unlimited.
    #[serde(default)]
    pub max_per_host: i32,
    #[serde(default)]
    pub v2_support: bool,
    pub cgroups: Vec<CgroupSpec>,
    pub workspace_volume: VolumeRequired,
    #[serde(default)]
    pub data_volumes: Vec<VolumeRequired>,
    /// Groups of volume-type containers this container must be co-located
    /// with (one volume container consumed per entry).
    #[serde(default)]
    pub volume_jobs: Vec<ContainerGroupId>,
    /// Concrete volume-container ids chosen at placement; cleared on
    /// submit, filled on create commands.
    #[serde(default)]
    pub volume_containers: Vec<ContainerId>,
    #[serde(default)]
    pub container_type: ContainerType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_roundtrips_through_json() {
        let manifest = ContainerManifest {
            version: "ver_x".into(),
            priority: Priority::Service,
            pool_names: ["default".to_string()].into_iter().collect(),
            cgroups: vec![CgroupSpec {
                cpu: CpuRequired {
                    millicores: 1000,
                    excess: false,
                },
                memory: MemoryRequired {
                    size: 1 << 30,
                    ..Default::default()
                },
                ports: vec![PortRequired {
                    name: "http".into(),
                    port: DYNAMIC_PORT.into(),
                    real_port: String::new(),
                }],
                ..Default::default()
            }],
            workspace_volume: VolumeRequired {
                size: 1 << 30,
                medium: VolumeMedium::Disk,
                dest_path: "/home/work".into(),
                ..Default::default()
            },
            ..Default::default()
        };

        let json = serde_json::to_string(&manifest).unwrap();
        let back: ContainerManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, back);
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let json = r#"{
            "priority": "service",
            "pool_names": ["default"],
            "cgroups": [],
            "workspace_volume": {
                "size": 1024, "kind": "empty_dir", "medium": "disk",
                "dest_path": "/home/work", "readonly": false, "exclusive": false
            }
        }"#;
        let manifest: ContainerManifest = serde_json::from_str(json).unwrap();
        assert!(manifest.version.is_empty());
        assert!(manifest.volume_jobs.is_empty());
        assert_eq!(manifest.container_type, ContainerType::Normal);
        assert_eq!(manifest.max_per_host, 0);
    }
}
