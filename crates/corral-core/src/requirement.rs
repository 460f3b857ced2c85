//! The sealed, immutable resource requirement of one container version.
//!
//! A `Requirement` is derived from a [`ContainerManifest`] at submit and
//! update time, flattening per-cgroup requests into ordered lists. It is
//! shared (`Arc`) among every container of one version and never mutated;
//! an update that changes anything structural seals a new one under a
//! fresh version token.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::manifest::{
    BlkioWeight, ContainerManifest, CpuRequired, MemoryRequired, PortRequired, TcpThrottle,
    VolumeRequired,
};
use crate::types::{ContainerGroupId, ContainerType, VolumeMedium};

/// Resource and constraint needs of one container version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub tag: String,
    pub pool_names: BTreeSet<String>,
    pub max_per_host: i32,
    pub v2_support: bool,
    /// One entry per cgroup.
    pub cpu: Vec<CpuRequired>,
    /// One entry per cgroup.
    pub memory: Vec<MemoryRequired>,
    /// All ports across cgroups, in cgroup order.
    pub ports: Vec<PortRequired>,
    /// Workspace volume first, then data volumes.
    pub volumes: Vec<VolumeRequired>,
    pub tcp_throttles: Vec<TcpThrottle>,
    pub blkios: Vec<BlkioWeight>,
    pub volume_jobs: Vec<ContainerGroupId>,
    pub container_type: ContainerType,
    pub version: String,
}

impl Requirement {
    /// Seal a requirement from a manifest. The version token is copied
    /// verbatim from the manifest.
    pub fn from_manifest(manifest: &ContainerManifest) -> Self {
        let mut req = Requirement {
            tag: manifest.tag.clone(),
            pool_names: manifest.pool_names.clone(),
            max_per_host: manifest.max_per_host,
            v2_support: manifest.v2_support,
            container_type: manifest.container_type,
            version: manifest.version.clone(),
            volume_jobs: manifest.volume_jobs.clone(),
            ..Default::default()
        };
        for cgroup in &manifest.cgroups {
            req.cpu.push(cgroup.cpu);
            req.memory.push(cgroup.memory);
            req.ports.extend(cgroup.ports.iter().cloned());
            req.tcp_throttles.push(cgroup.tcp_throttle);
            req.blkios.push(cgroup.blkio);
        }
        req.volumes.push(manifest.workspace_volume.clone());
        req.volumes.extend(manifest.data_volumes.iter().cloned());
        req
    }

    /// Total millicores across cgroups.
    pub fn cpu_need(&self) -> i64 {
        self.cpu.iter().map(|c| c.millicores).sum()
    }

    /// Total cgroup memory in bytes (tmpfs volumes not included).
    pub fn memory_need(&self) -> i64 {
        self.memory.iter().map(|m| m.size).sum()
    }

    /// Total size of tmpfs volumes (backed by agent memory).
    pub fn tmpfs_need(&self) -> i64 {
        self.volumes
            .iter()
            .filter(|v| v.medium == VolumeMedium::Tmpfs)
            .map(|v| v.size)
            .sum()
    }

    /// Total size of disk-medium volumes.
    pub fn disk_need(&self) -> i64 {
        self.medium_need(VolumeMedium::Disk)
    }

    /// Total size of ssd-medium volumes.
    pub fn ssd_need(&self) -> i64 {
        self.medium_need(VolumeMedium::Ssd)
    }

    fn medium_need(&self, medium: VolumeMedium) -> i64 {
        self.volumes
            .iter()
            .filter(|v| v.medium == medium)
            .map(|v| v.size)
            .sum()
    }

    /// Structural difference check used to gate version bumps.
    ///
    /// Compares everything a running container would have to be rebuilt
    /// for; the `version` token itself is not consulted.
    pub fn differs_from(&self, other: &Requirement) -> bool {
        if self.container_type != other.container_type
            || self.volume_jobs != other.volume_jobs
            || self.tag != other.tag
            || self.v2_support != other.v2_support
            || self.max_per_host != other.max_per_host
        {
            return true;
        }
        if self.cpu.len() != other.cpu.len()
            || self.memory.len() != other.memory.len()
            || self.volumes.len() != other.volumes.len()
            || self.ports.len() != other.ports.len()
            || self.tcp_throttles.len() != other.tcp_throttles.len()
            || self.blkios.len() != other.blkios.len()
        {
            return true;
        }
        if self
            .cpu
            .iter()
            .zip(&other.cpu)
            .any(|(a, b)| a.millicores != b.millicores || a.excess != b.excess)
        {
            return true;
        }
        if self.memory.iter().zip(&other.memory).any(|(a, b)| {
            a.size != b.size || a.excess != b.excess || a.use_oom_killer != b.use_oom_killer
        }) {
            return true;
        }
        if self.volumes.iter().zip(&other.volumes).any(|(a, b)| {
            a.size != b.size
                || a.kind != b.kind
                || a.medium != b.medium
                || a.dest_path != b.dest_path
                || a.readonly != b.readonly
                || a.exclusive != b.exclusive
        }) {
            return true;
        }
        if self
            .ports
            .iter()
            .zip(&other.ports)
            .any(|(a, b)| a.port != b.port || a.name != b.name)
        {
            return true;
        }
        if self
            .tcp_throttles
            .iter()
            .zip(&other.tcp_throttles)
            .any(|(a, b)| a != b)
        {
            return true;
        }
        self.blkios
            .iter()
            .zip(&other.blkios)
            .any(|(a, b)| a.weight != b.weight)
    }
}
