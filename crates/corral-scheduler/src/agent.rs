//! Per-agent resource bookkeeping and the placement feasibility oracle.
//!
//! `AgentState` accounts for cpu/memory (split into hard assignment and
//! best-effort "deep" assignment), typed storage devices, the port set, and
//! volume-container slots. `try_put` answers feasibility without side
//! effects; `put`/`evict` commit and reverse bookkeeping under the
//! scheduler mutex.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::Rng;
use tracing::{debug, warn};

use corral_core::{
    AgentEndpoint, AgentSpec, ContainerGroupId, ContainerId, ContainerType, DevicePath,
    PortRequired, Priority, ResourceError, SchedulerConfig, VolumeInfo, VolumeMedium,
    VolumeRequired, DYNAMIC_PORT, MAX_PORT, MIN_PORT,
};

use crate::group::Container;

/// Copy-out summary of an agent's bookkeeping for reporting.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentOverview {
    pub endpoint: AgentEndpoint,
    pub pool: String,
    pub tags: Vec<String>,
    pub cpu_total: i64,
    pub cpu_assigned: i64,
    pub cpu_deep_assigned: i64,
    pub memory_total: i64,
    pub memory_assigned: i64,
    pub memory_deep_assigned: i64,
    pub ports_assigned: usize,
    pub container_count: usize,
    pub frozen: bool,
}

/// What `set_assignment` needs to know about one adopted container.
pub struct PlacedSeed {
    pub id: ContainerId,
    pub group_id: ContainerGroupId,
    pub priority: Priority,
    pub container_type: ContainerType,
    pub volume_containers: Vec<ContainerId>,
}

/// Resource bookkeeping for one worker host.
#[derive(Debug)]
pub struct AgentState {
    endpoint: AgentEndpoint,
    pool: String,
    tags: BTreeSet<String>,

    cpu_total: i64,
    cpu_assigned: i64,
    cpu_reserved: i64,
    cpu_deep_assigned: i64,
    cpu_deep_reserved: i64,

    memory_total: i64,
    memory_assigned: i64,
    memory_reserved: i64,
    memory_deep_assigned: i64,
    memory_deep_reserved: i64,

    volume_total: BTreeMap<DevicePath, VolumeInfo>,
    volume_assigned: BTreeMap<DevicePath, VolumeInfo>,

    port_total: usize,
    port_assigned: BTreeSet<String>,

    /// Containers placed here, by id (stable iteration order).
    containers: BTreeMap<ContainerId, ContainerGroupId>,
    container_counts: BTreeMap<ContainerGroupId, i32>,
    /// Free slots of volume-type containers, per owning group.
    volume_jobs_free: BTreeMap<ContainerGroupId, BTreeSet<ContainerId>>,
    batch_count: i32,
}

impl AgentState {
    pub fn new(spec: AgentSpec) -> Self {
        Self {
            endpoint: spec.endpoint,
            pool: spec.pool,
            tags: spec.tags,
            cpu_total: spec.cpu_millicores,
            cpu_assigned: 0,
            cpu_reserved: 0,
            cpu_deep_assigned: 0,
            cpu_deep_reserved: 0,
            memory_total: spec.memory_bytes,
            memory_assigned: 0,
            memory_reserved: 0,
            memory_deep_assigned: 0,
            memory_deep_reserved: 0,
            volume_total: spec.volumes,
            volume_assigned: BTreeMap::new(),
            port_total: SchedulerConfig::port_total(),
            port_assigned: BTreeSet::new(),
            containers: BTreeMap::new(),
            container_counts: BTreeMap::new(),
            volume_jobs_free: BTreeMap::new(),
            batch_count: 0,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn set_pool(&mut self, pool: String) {
        self.pool = pool;
    }

    pub fn add_tag(&mut self, tag: String) {
        self.tags.insert(tag);
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.remove(tag);
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn containers(&self) -> &BTreeMap<ContainerId, ContainerGroupId> {
        &self.containers
    }

    pub fn cpu_assigned(&self) -> i64 {
        self.cpu_assigned
    }

    pub fn cpu_deep_assigned(&self) -> i64 {
        self.cpu_deep_assigned
    }

    pub fn memory_assigned(&self) -> i64 {
        self.memory_assigned
    }

    pub fn memory_deep_assigned(&self) -> i64 {
        self.memory_deep_assigned
    }

    pub fn ports_assigned(&self) -> &BTreeSet<String> {
        &self.port_assigned
    }

    pub fn volume_assigned(&self) -> &BTreeMap<DevicePath, VolumeInfo> {
        &self.volume_assigned
    }

    /// Copy out a reporting summary; `frozen` is filled by the scheduler.
    pub fn overview(&self) -> AgentOverview {
        AgentOverview {
            endpoint: self.endpoint.clone(),
            pool: self.pool.clone(),
            tags: self.tags.iter().cloned().collect(),
            cpu_total: self.cpu_total,
            cpu_assigned: self.cpu_assigned,
            cpu_deep_assigned: self.cpu_deep_assigned,
            memory_total: self.memory_total,
            memory_assigned: self.memory_assigned,
            memory_deep_assigned: self.memory_deep_assigned,
            ports_assigned: self.port_assigned.len(),
            container_count: self.containers.len(),
            frozen: false,
        }
    }

    /// Replace all bookkeeping with re-derived state (agent re-join).
    #[allow(clippy::too_many_arguments)]
    pub fn set_assignment(
        &mut self,
        cpu_assigned: i64,
        cpu_deep_assigned: i64,
        memory_assigned: i64,
        memory_deep_assigned: i64,
        volume_assigned: BTreeMap<DevicePath, VolumeInfo>,
        port_assigned: BTreeSet<String>,
        placed: Vec<PlacedSeed>,
    ) {
        self.cpu_assigned = cpu_assigned;
        self.cpu_deep_assigned = cpu_deep_assigned;
        self.memory_assigned = memory_assigned;
        self.memory_deep_assigned = memory_deep_assigned;
        self.volume_assigned = volume_assigned;
        self.port_assigned = port_assigned;
        self.containers.clear();
        self.container_counts.clear();
        self.volume_jobs_free.clear();
        self.batch_count = 0;

        for seed in &placed {
            self.containers.insert(seed.id.clone(), seed.group_id.clone());
            *self.container_counts.entry(seed.group_id.clone()).or_insert(0) += 1;
            if seed.container_type == ContainerType::Volume {
                self.volume_jobs_free
                    .entry(seed.group_id.clone())
                    .or_default()
                    .insert(seed.id.clone());
            }
            if seed.priority == Priority::Batch {
                self.batch_count += 1;
            }
        }
        // A volume container already referenced by a sibling is not free.
        for seed in &placed {
            for used in &seed.volume_containers {
                let owner = corral_core::group_id_of(used);
                if let Some(free) = self.volume_jobs_free.get_mut(&owner) {
                    free.remove(used);
                }
            }
        }
    }

    /// Reserved baseline, recomputed on every heartbeat.
    pub fn set_reserved(
        &mut self,
        cpu_reserved: i64,
        cpu_deep_reserved: i64,
        memory_reserved: i64,
        memory_deep_reserved: i64,
    ) {
        debug!(
            agent = %self.endpoint,
            cpu_reserved,
            cpu_deep_reserved,
            memory_reserved,
            memory_deep_reserved,
            "reserved baseline updated"
        );
        self.cpu_reserved = cpu_reserved;
        self.cpu_deep_reserved = cpu_deep_reserved;
        self.memory_reserved = memory_reserved;
        self.memory_deep_reserved = memory_deep_reserved;
    }

    /// Feasibility check; no side effects. Returns the first failing
    /// constraint in canonical order.
    pub fn try_put(&self, container: &Container, max_batch_pods: i32) -> Result<(), ResourceError> {
        let require = &container.requirement;

        if !require.tag.is_empty() && !self.tags.contains(&require.tag) {
            return Err(ResourceError::TagMismatch);
        }
        if !require.pool_names.contains(&self.pool) {
            return Err(ResourceError::PoolMismatch);
        }

        if require.max_per_host > 0 {
            if let Some(&count) = self.container_counts.get(&container.group_id) {
                if count >= require.max_per_host {
                    return Err(ResourceError::TooManyPods);
                }
            }
        }

        if container.priority != Priority::BestEffort {
            if require.cpu_need() + self.cpu_assigned > self.cpu_total {
                return Err(ResourceError::NoCpu);
            }
            if require.memory_need() + self.memory_assigned > self.memory_total {
                return Err(ResourceError::NoMemory);
            }
        } else {
            if self.cpu_reserved + self.cpu_deep_assigned + require.cpu_need() > self.cpu_total {
                return Err(ResourceError::NoCpu);
            }
            if self.memory_reserved + self.memory_deep_assigned + require.memory_need()
                > self.memory_total
            {
                return Err(ResourceError::NoMemory);
            }
        }

        let tmpfs_size = require.tmpfs_need();
        let device_volumes: Vec<&VolumeRequired> = require
            .volumes
            .iter()
            .filter(|v| v.medium != VolumeMedium::Tmpfs)
            .collect();

        if container.priority != Priority::BestEffort {
            if tmpfs_size + self.memory_assigned + require.memory_need() > self.memory_total {
                return Err(ResourceError::NoMemoryForTmpfs);
            }
        } else if tmpfs_size + self.memory_assigned > self.memory_total {
            return Err(ResourceError::NoMemoryForTmpfs);
        }

        if self.select_devices(&device_volumes).is_none() {
            return Err(ResourceError::NoDevice);
        }

        if require.ports.len() + self.port_assigned.len() > self.port_total {
            return Err(ResourceError::NoPort);
        }
        if self.select_free_ports(&require.ports).is_none() {
            return Err(ResourceError::PortConflict);
        }

        if !require.volume_jobs.is_empty()
            && self.select_free_volume_containers(&require.volume_jobs).is_none()
        {
            return Err(ResourceError::NoVolumeContainer);
        }

        if container.priority == Priority::Batch && self.batch_count > max_batch_pods {
            return Err(ResourceError::TooManyBatchPods);
        }

        Ok(())
    }

    /// Commit a placement. Caller must have verified feasibility with
    /// `try_put` in the same critical section.
    pub fn put(&mut self, container: &mut Container) {
        debug_assert_eq!(container.status, corral_core::ContainerStatus::Pending);
        debug_assert!(container.allocated_agent.is_empty());
        let require = container.requirement.clone();

        if container.priority != Priority::BestEffort {
            self.cpu_assigned += require.cpu_need();
            assert!(self.cpu_assigned <= self.cpu_total);
            self.memory_assigned += require.memory_need();
        } else {
            self.cpu_deep_assigned += require.cpu_need();
            self.memory_deep_assigned += require.memory_need();
        }

        let device_volumes: Vec<&VolumeRequired> = require
            .volumes
            .iter()
            .filter(|v| v.medium != VolumeMedium::Tmpfs)
            .collect();
        self.memory_assigned += require.tmpfs_need();
        assert!(self.memory_assigned <= self.memory_total);

        if let Some(devices) = self.select_devices(&device_volumes) {
            for (device_path, volume) in devices.iter().zip(&device_volumes) {
                let entry = self.volume_assigned.entry(device_path.clone()).or_default();
                entry.size += volume.size;
                entry.medium = volume.medium;
                if volume.exclusive {
                    entry.exclusive = true;
                }
                container.allocated_volumes.push((
                    device_path.clone(),
                    VolumeInfo {
                        medium: volume.medium,
                        size: volume.size,
                        exclusive: volume.exclusive,
                    },
                ));
            }
        }

        if let Some(ports) = self.select_free_ports(&require.ports) {
            for port in ports {
                self.port_assigned.insert(port.clone());
                container.allocated_ports.push(port);
            }
        }

        container.allocated_agent = self.endpoint.clone();
        container.last_res_err = ResourceError::Ok;
        self.containers
            .insert(container.id.clone(), container.group_id.clone());
        *self
            .container_counts
            .entry(container.group_id.clone())
            .or_insert(0) += 1;

        if require.container_type == ContainerType::Volume {
            self.volume_jobs_free
                .entry(container.group_id.clone())
                .or_default()
                .insert(container.id.clone());
        }

        if !require.volume_jobs.is_empty() {
            if let Some(chosen) = self.select_free_volume_containers(&require.volume_jobs) {
                for volume_container_id in chosen {
                    let owner = corral_core::group_id_of(&volume_container_id);
                    if let Some(free) = self.volume_jobs_free.get_mut(&owner) {
                        free.remove(&volume_container_id);
                    }
                    debug!(
                        container = %container.id,
                        volume_container = %volume_container_id,
                        "consumed volume container"
                    );
                    container.allocated_volume_containers.push(volume_container_id);
                }
            }
        }

        if container.priority == Priority::Batch {
            self.batch_count += 1;
        }
    }

    /// Reverse every bookkeeping effect of `put`.
    pub fn evict(&mut self, container: &mut Container) {
        if !self.containers.contains_key(&container.id) {
            warn!(container = %container.id, agent = %self.endpoint, "invalid evict, no such container");
            return;
        }
        let require = container.requirement.clone();

        if container.priority != Priority::BestEffort {
            self.cpu_assigned -= require.cpu_need();
            assert!(self.cpu_assigned >= 0);
            self.memory_assigned -= require.memory_need();
            assert!(self.memory_assigned >= 0);
        } else {
            self.cpu_deep_assigned -= require.cpu_need();
            self.memory_deep_assigned -= require.memory_need();
        }
        self.memory_assigned -= require.tmpfs_need();
        assert!(self.memory_assigned >= 0);

        for (device_path, volume) in &container.allocated_volumes {
            if let Some(entry) = self.volume_assigned.get_mut(device_path) {
                entry.size -= volume.size;
                if volume.exclusive {
                    entry.exclusive = false;
                }
            }
        }
        for port in &container.allocated_ports {
            self.port_assigned.remove(port);
        }

        self.containers.remove(&container.id);
        if let Some(count) = self.container_counts.get_mut(&container.group_id) {
            *count -= 1;
            if *count <= 0 {
                self.container_counts.remove(&container.group_id);
            }
        }

        if require.container_type == ContainerType::Volume {
            if let Some(free) = self.volume_jobs_free.get_mut(&container.group_id) {
                free.remove(&container.id);
                if free.is_empty() {
                    self.volume_jobs_free.remove(&container.group_id);
                }
            }
        }

        // Slots come back only for volume containers still on this agent.
        for volume_container_id in container.allocated_volume_containers.drain(..) {
            if self.containers.contains_key(&volume_container_id) {
                let owner = corral_core::group_id_of(&volume_container_id);
                self.volume_jobs_free
                    .entry(owner)
                    .or_default()
                    .insert(volume_container_id);
            }
        }

        if container.priority == Priority::Batch {
            self.batch_count -= 1;
        }
    }

    /// Drop a container id whose owning group no longer exists. No
    /// resource bookkeeping can be reversed without the requirement; by
    /// the time a group is erased all its containers have been evicted,
    /// so this only clears a stale index entry.
    pub fn forget(&mut self, container_id: &str) {
        if let Some(group_id) = self.containers.remove(container_id) {
            if let Some(count) = self.container_counts.get_mut(&group_id) {
                *count -= 1;
                if *count <= 0 {
                    self.container_counts.remove(&group_id);
                }
            }
            if let Some(free) = self.volume_jobs_free.get_mut(&group_id) {
                free.remove(container_id);
                if free.is_empty() {
                    self.volume_jobs_free.remove(&group_id);
                }
            }
        }
    }

    // ── Selection helpers ───────────────────────────────────────────

    /// Assign each non-tmpfs volume to a device path: medium must match,
    /// free size must suffice, exclusively-held devices are off the table,
    /// and an exclusive request cannot share a path already chosen in this
    /// assignment. Backtracking, bounded by the (small) volume count.
    fn select_devices(&self, volumes: &[&VolumeRequired]) -> Option<Vec<DevicePath>> {
        let mut free: BTreeMap<DevicePath, VolumeInfo> = BTreeMap::new();
        for (path, total) in &self.volume_total {
            match self.volume_assigned.get(path) {
                None => {
                    free.insert(path.clone(), *total);
                }
                Some(assigned) if !assigned.exclusive => {
                    let mut info = *total;
                    info.size -= assigned.size;
                    free.insert(path.clone(), info);
                }
                Some(_) => {}
            }
        }
        let mut devices = Vec::new();
        let mut used = BTreeSet::new();
        if recur_select_devices(0, volumes, &mut free, &mut devices, &mut used) {
            Some(devices)
        } else {
            None
        }
    }

    /// Resolve the port requests against the assigned set.
    ///
    /// Fixed ports must be free. With fixed and dynamic mixed, dynamics
    /// are taken contiguously from `max(fixed) + 1`. All-dynamic requests
    /// start at a random in-range position and walk forward, resuming
    /// after any collision and wrapping once.
    fn select_free_ports(&self, ports_need: &[PortRequired]) -> Option<Vec<String>> {
        let mut has_fixed = false;
        let mut dynamic_count: usize = 0;
        let mut max_fixed: u32 = 0;
        for port in ports_need {
            if port.port != DYNAMIC_PORT {
                has_fixed = true;
                let number: u32 = port.port.parse().ok()?;
                max_fixed = max_fixed.max(number);
                if self.port_assigned.contains(&port.port) {
                    return None;
                }
            } else {
                dynamic_count += 1;
            }
        }

        let mut free_dynamic: VecDeque<String> = VecDeque::new();
        if dynamic_count > 0 && has_fixed {
            for candidate in max_fixed + 1..max_fixed + 1 + dynamic_count as u32 {
                let port = candidate.to_string();
                if self.port_assigned.contains(&port) {
                    return None;
                }
                free_dynamic.push_back(port);
            }
        } else if dynamic_count > 0 {
            let span = u32::from(MAX_PORT) - u32::from(MIN_PORT) - dynamic_count as u32 + 1;
            let mut start = u32::from(MIN_PORT) + rand::rng().random_range(0..=span);
            let mut tries = 0;
            while tries < self.port_total {
                if start + dynamic_count as u32 - 1 > u32::from(MAX_PORT) {
                    start = u32::from(MIN_PORT);
                }
                free_dynamic.clear();
                for candidate in start..start + dynamic_count as u32 {
                    let port = candidate.to_string();
                    if self.port_assigned.contains(&port) {
                        start = candidate + 1;
                        break;
                    }
                    free_dynamic.push_back(port);
                }
                if free_dynamic.len() == dynamic_count {
                    break;
                }
                tries += 1;
            }
        }

        if dynamic_count > 0 && free_dynamic.len() != dynamic_count {
            return None;
        }

        let mut resolved = Vec::with_capacity(ports_need.len());
        for port in ports_need {
            if port.port != DYNAMIC_PORT {
                resolved.push(port.port.clone());
            } else if let Some(dynamic) = free_dynamic.pop_front() {
                resolved.push(dynamic);
            }
        }
        Some(resolved)
    }

    /// Pick one free volume container per requested volume job; each
    /// chosen container counts as a consumed slot within this selection.
    fn select_free_volume_containers(
        &self,
        volume_jobs: &[ContainerGroupId],
    ) -> Option<Vec<ContainerId>> {
        let mut free = self.volume_jobs_free.clone();
        let mut chosen = Vec::with_capacity(volume_jobs.len());
        for group_id in volume_jobs {
            let slot = free
                .get_mut(group_id)
                .and_then(|set| set.iter().next().cloned());
            match slot {
                Some(id) => {
                    if let Some(set) = free.get_mut(group_id) {
                        set.remove(&id);
                    }
                    chosen.push(id);
                }
                None => return None,
            }
        }
        Some(chosen)
    }
}

fn recur_select_devices(
    index: usize,
    volumes: &[&VolumeRequired],
    free: &mut BTreeMap<DevicePath, VolumeInfo>,
    devices: &mut Vec<DevicePath>,
    used: &mut BTreeSet<DevicePath>,
) -> bool {
    if index >= volumes.len() {
        return devices.len() == volumes.len();
    }
    let need = volumes[index];
    let candidates: Vec<DevicePath> = free.keys().cloned().collect();
    for path in candidates {
        {
            let Some(info) = free.get_mut(&path) else { continue };
            if info.exclusive || need.size > info.size || info.medium != need.medium {
                continue;
            }
            if need.exclusive && used.contains(&path) {
                continue;
            }
            info.size -= need.size;
            info.exclusive = need.exclusive;
        }
        devices.push(path.clone());
        used.insert(path.clone());
        if recur_select_devices(index + 1, volumes, free, devices, used) {
            return true;
        }
        if let Some(info) = free.get_mut(&path) {
            info.size += need.size;
            info.exclusive = false;
        }
        devices.pop();
        used.remove(&path);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::{CgroupSpec, ContainerManifest, CpuRequired, MemoryRequired, Requirement};
    use std::sync::Arc;

    fn test_spec(endpoint: &str) -> AgentSpec {
        let mut volumes = BTreeMap::new();
        volumes.insert(
            "/data".to_string(),
            VolumeInfo {
                medium: VolumeMedium::Disk,
                size: 10 << 30,
                exclusive: false,
            },
        );
        AgentSpec {
            endpoint: endpoint.to_string(),
            cpu_millicores: 4000,
            memory_bytes: 8 << 30,
            volumes,
            tags: BTreeSet::new(),
            pool: "default".to_string(),
        }
    }

    fn manifest(millicores: i64, memory: i64) -> ContainerManifest {
        ContainerManifest {
            version: "ver_1".into(),
            pool_names: ["default".to_string()].into_iter().collect(),
            cgroups: vec![CgroupSpec {
                cpu: CpuRequired {
                    millicores,
                    excess: false,
                },
                memory: MemoryRequired {
                    size: memory,
                    ..Default::default()
                },
                ..Default::default()
            }],
            workspace_volume: corral_core::VolumeRequired {
                size: 1 << 30,
                medium: VolumeMedium::Disk,
                dest_path: "/home/work".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn container(id: &str, manifest: &ContainerManifest, priority: Priority) -> Container {
        let require = Arc::new(Requirement::from_manifest(manifest));
        Container::new(
            id.to_string(),
            corral_core::group_id_of(id),
            priority,
            require,
        )
    }

    #[test]
    fn put_and_evict_are_inverse() {
        let mut agent = AgentState::new(test_spec("a:1"));
        let m = manifest(1000, 1 << 30);
        let mut c = container("job_x.pod_0", &m, Priority::Service);

        assert!(agent.try_put(&c, 50).is_ok());
        agent.put(&mut c);
        assert_eq!(agent.cpu_assigned(), 1000);
        assert_eq!(agent.memory_assigned(), 1 << 30);
        assert_eq!(c.allocated_agent, "a:1");
        assert_eq!(c.allocated_volumes.len(), 1);
        assert_eq!(c.allocated_volumes[0].0, "/data");
        assert_eq!(c.last_res_err, ResourceError::Ok);

        agent.evict(&mut c);
        assert_eq!(agent.cpu_assigned(), 0);
        assert_eq!(agent.memory_assigned(), 0);
        assert!(agent.containers().is_empty());
        assert_eq!(agent.volume_assigned().get("/data").map(|v| v.size), Some(0));
    }

    #[test]
    fn rejects_on_tag_mismatch() {
        let agent = AgentState::new(test_spec("a:1"));
        let mut m = manifest(100, 100);
        m.tag = "gpu".into();
        let c = container("job_x.pod_0", &m, Priority::Service);
        assert_eq!(agent.try_put(&c, 50), Err(ResourceError::TagMismatch));
    }

    #[test]
    fn rejects_on_pool_mismatch() {
        let agent = AgentState::new(test_spec("a:1"));
        let mut m = manifest(100, 100);
        m.pool_names = ["other".to_string()].into_iter().collect();
        let c = container("job_x.pod_0", &m, Priority::Service);
        assert_eq!(agent.try_put(&c, 50), Err(ResourceError::PoolMismatch));
    }

    #[test]
    fn rejects_when_cpu_exhausted() {
        let mut agent = AgentState::new(test_spec("a:1"));
        let m = manifest(3000, 1 << 20);
        let mut first = container("job_x.pod_0", &m, Priority::Service);
        agent.put(&mut first);

        let second = container("job_x.pod_1", &m, Priority::Service);
        assert_eq!(agent.try_put(&second, 50), Err(ResourceError::NoCpu));
    }

    #[test]
    fn max_per_host_limits_same_group() {
        let mut agent = AgentState::new(test_spec("a:1"));
        let mut m = manifest(100, 1 << 20);
        m.max_per_host = 1;
        let mut first = container("job_x.pod_0", &m, Priority::Service);
        agent.put(&mut first);

        let second = container("job_x.pod_1", &m, Priority::Service);
        assert_eq!(agent.try_put(&second, 50), Err(ResourceError::TooManyPods));
    }

    #[test]
    fn best_effort_admits_against_reserved_headroom() {
        let mut agent = AgentState::new(test_spec("a:1"));
        // Hard assignment fills the agent entirely...
        let m = manifest(4000, 1 << 30);
        let mut hard = container("job_x.pod_0", &m, Priority::Service);
        agent.put(&mut hard);

        // ...but live usage is low, so best-effort still fits.
        agent.set_reserved(500, 0, 1 << 20, 0);
        let be = container("job_y.pod_0", &manifest(1000, 1 << 20), Priority::BestEffort);
        assert!(agent.try_put(&be, 50).is_ok());

        // With high reserved usage it no longer fits.
        agent.set_reserved(3500, 0, 1 << 20, 0);
        assert_eq!(agent.try_put(&be, 50), Err(ResourceError::NoCpu));
    }

    #[test]
    fn fixed_port_conflict_detected() {
        let mut agent = AgentState::new(test_spec("a:1"));
        let mut m = manifest(100, 1 << 20);
        m.cgroups[0].ports.push(PortRequired {
            name: "main".into(),
            port: "8080".into(),
            real_port: String::new(),
        });
        let mut first = container("job_x.pod_0", &m, Priority::Service);
        agent.put(&mut first);
        assert_eq!(first.allocated_ports, vec!["8080".to_string()]);

        let second = container("job_y.pod_0", &m, Priority::Service);
        assert_eq!(agent.try_put(&second, 50), Err(ResourceError::PortConflict));
    }

    #[test]
    fn dynamic_port_allocated_in_range() {
        let mut agent = AgentState::new(test_spec("a:1"));
        let mut m = manifest(100, 1 << 20);
        m.cgroups[0].ports.push(PortRequired {
            name: "main".into(),
            port: DYNAMIC_PORT.into(),
            real_port: String::new(),
        });
        let mut c = container("job_x.pod_0", &m, Priority::Service);
        assert!(agent.try_put(&c, 50).is_ok());
        agent.put(&mut c);

        assert_eq!(c.allocated_ports.len(), 1);
        let port: u32 = c.allocated_ports[0].parse().unwrap();
        assert!((u32::from(MIN_PORT)..=u32::from(MAX_PORT)).contains(&port));
        assert!(agent.ports_assigned().contains(&c.allocated_ports[0]));
    }

    #[test]
    fn mixed_ports_allocate_dynamics_after_max_fixed() {
        let mut agent = AgentState::new(test_spec("a:1"));
        let mut m = manifest(100, 1 << 20);
        m.cgroups[0].ports = vec![
            PortRequired {
                name: "main".into(),
                port: "5000".into(),
                real_port: String::new(),
            },
            PortRequired {
                name: "aux".into(),
                port: DYNAMIC_PORT.into(),
                real_port: String::new(),
            },
        ];
        let mut c = container("job_x.pod_0", &m, Priority::Service);
        agent.put(&mut c);
        assert_eq!(c.allocated_ports, vec!["5000".to_string(), "5001".to_string()]);
    }

    #[test]
    fn exclusive_volume_blocks_device_reuse() {
        let mut agent = AgentState::new(test_spec("a:1"));
        let mut m = manifest(100, 1 << 20);
        m.workspace_volume.exclusive = true;
        let mut exclusive_holder = container("job_x.pod_0", &m, Priority::Service);
        assert!(agent.try_put(&exclusive_holder, 50).is_ok());
        agent.put(&mut exclusive_holder);

        let plain = container("job_y.pod_0", &manifest(100, 1 << 20), Priority::Service);
        assert_eq!(agent.try_put(&plain, 50), Err(ResourceError::NoDevice));
    }

    #[test]
    fn device_medium_must_match() {
        let agent = AgentState::new(test_spec("a:1"));
        let mut m = manifest(100, 1 << 20);
        m.workspace_volume.medium = VolumeMedium::Ssd;
        let c = container("job_x.pod_0", &m, Priority::Service);
        assert_eq!(agent.try_put(&c, 50), Err(ResourceError::NoDevice));
    }

    #[test]
    fn tmpfs_counts_against_memory() {
        let mut agent = AgentState::new(test_spec("a:1"));
        let mut m = manifest(100, 4 << 30);
        m.data_volumes.push(corral_core::VolumeRequired {
            size: 5 << 30,
            medium: VolumeMedium::Tmpfs,
            dest_path: "/ramdisk".into(),
            ..Default::default()
        });
        let c = container("job_x.pod_0", &m, Priority::Service);
        assert_eq!(agent.try_put(&c, 50), Err(ResourceError::NoMemoryForTmpfs));
    }

    #[test]
    fn volume_container_slots_consumed_and_restored() {
        let mut agent = AgentState::new(test_spec("a:1"));

        // Place a volume container of job_vol.
        let mut vol_manifest = manifest(100, 1 << 20);
        vol_manifest.container_type = ContainerType::Volume;
        let mut volume = container("job_vol.pod_0", &vol_manifest, Priority::Service);
        agent.put(&mut volume);

        // A normal container depending on job_vol fits once.
        let mut dep_manifest = manifest(100, 1 << 20);
        dep_manifest.volume_jobs = vec!["job_vol".to_string()];
        let mut dependent = container("job_app.pod_0", &dep_manifest, Priority::Service);
        assert!(agent.try_put(&dependent, 50).is_ok());
        agent.put(&mut dependent);
        assert_eq!(dependent.allocated_volume_containers, vec!["job_vol.pod_0".to_string()]);

        // The slot is gone for a second dependent.
        let second = container("job_app.pod_1", &dep_manifest, Priority::Service);
        assert_eq!(agent.try_put(&second, 50), Err(ResourceError::NoVolumeContainer));

        // Evicting the dependent frees the slot again.
        agent.evict(&mut dependent);
        assert!(agent.try_put(&second, 50).is_ok());
    }

    #[test]
    fn batch_cap_enforced() {
        let mut agent = AgentState::new(test_spec("a:1"));
        let m = manifest(10, 1 << 20);
        for i in 0..3 {
            let mut c = container(&format!("job_b.pod_{i}"), &m, Priority::Batch);
            agent.put(&mut c);
        }
        let next = container("job_b.pod_9", &m, Priority::Batch);
        // Cap of 2 is already exceeded by the 3 placed batch containers.
        assert_eq!(agent.try_put(&next, 2), Err(ResourceError::TooManyBatchPods));
        assert!(agent.try_put(&next, 50).is_ok());
    }

    #[test]
    fn two_exclusive_volumes_need_two_devices() {
        let mut spec = test_spec("a:1");
        spec.volumes.insert(
            "/data2".to_string(),
            VolumeInfo {
                medium: VolumeMedium::Disk,
                size: 10 << 30,
                exclusive: false,
            },
        );
        let agent = AgentState::new(spec);

        let mut m = manifest(100, 1 << 20);
        m.workspace_volume.exclusive = true;
        m.data_volumes.push(corral_core::VolumeRequired {
            size: 1 << 30,
            medium: VolumeMedium::Disk,
            dest_path: "/data-vol".into(),
            exclusive: true,
            ..Default::default()
        });
        let c = container("job_x.pod_0", &m, Priority::Service);
        assert!(agent.try_put(&c, 50).is_ok());

        // With one device only, the two exclusive volumes cannot coexist.
        let single = AgentState::new(test_spec("b:1"));
        assert_eq!(single.try_put(&c, 50), Err(ResourceError::NoDevice));
    }
}
