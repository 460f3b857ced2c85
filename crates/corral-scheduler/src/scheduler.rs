//! The placement and reconciliation engine.
//!
//! The `Scheduler` owns every [`AgentState`] and [`ContainerGroup`] behind a
//! single mutex. Intent operations (submit, update, kill, scale, agent
//! management, manual preemption) mutate state synchronously; a timer-driven
//! placement tick visits one agent at a time; heartbeats are answered with
//! the list of corrective commands for that agent.
//!
//! ```text
//! Scheduler
//!   ├── agents: endpoint → AgentState       (bookkeeping + feasibility)
//!   ├── groups: group id → ContainerGroup   (containers + status buckets)
//!   ├── queue:  (submit time, group id)     (placement fairness order)
//!   └── frozen: endpoints skipped by the placement tick
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use corral_core::{
    container_id, generate_group_id, new_version_token, AgentCommand, AgentEndpoint, AgentSnapshot,
    AgentSpec, CommandAction, ContainerGroupId, ContainerGroupMeta, ContainerGroupStats,
    ContainerId, ContainerManifest, ContainerStats, ContainerStatus, ContainerType, DevicePath,
    GroupStatus, Priority, Quota, RemoteInfo, Requirement, ResourceError, ResourceTotals,
    SchedulerConfig, VolumeInfo, VolumeMedium, VolumeTotals,
};

use crate::agent::{AgentState, PlacedSeed};
use crate::error::{SchedError, SchedResult};
use crate::group::{Container, ContainerGroup};

/// Result of an `update` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The group's (possibly unchanged) current version token.
    pub version: String,
    /// False when the new description was structurally identical and only
    /// metadata was refreshed.
    pub changed: bool,
}

/// What one placement tick did, so the driving loop can pick the delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// An agent was visited; wait `sched_interval` before the next tick.
    Visited(AgentEndpoint),
    /// The agent at this position is frozen; advance immediately.
    Skipped(AgentEndpoint),
    /// Past the last agent; restart from the beginning immediately.
    Wrapped,
    /// Stopped, or no agents; wait `sched_interval` and retry.
    Idle,
}

struct SchedulerState {
    agents: BTreeMap<AgentEndpoint, AgentState>,
    frozen: BTreeSet<AgentEndpoint>,
    groups: BTreeMap<ContainerGroupId, ContainerGroup>,
    /// Groups in submit-time order for fair placement.
    queue: BTreeSet<(i64, ContainerGroupId)>,
    stopped: bool,
}

/// The scheduler core. All state lives behind one mutex; every public
/// method acquires it for the duration of the call and performs no I/O
/// while holding it.
pub struct Scheduler {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    /// A stopped scheduler; call [`Scheduler::start`] to begin placing.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SchedulerState {
                agents: BTreeMap::new(),
                frozen: BTreeSet::new(),
                groups: BTreeMap::new(),
                queue: BTreeSet::new(),
                stopped: true,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().expect("scheduler mutex poisoned")
    }

    // ── Agent intent ────────────────────────────────────────────────

    /// Register an agent, adopting the Ready containers it reports.
    pub fn add_agent(&self, spec: AgentSpec, snapshot: &AgentSnapshot) {
        self.lock().add_agent(spec, snapshot, &self.config);
    }

    /// Drop an agent. Its explicitly-killed containers terminate, volume
    /// containers terminate (their on-host data cannot migrate), and
    /// everything else returns to pending for re-placement.
    pub fn remove_agent(&self, endpoint: &str) {
        self.lock().remove_agent(endpoint);
    }

    pub fn add_tag(&self, endpoint: &str, tag: &str) -> SchedResult<()> {
        let mut state = self.lock();
        let agent = state
            .agents
            .get_mut(endpoint)
            .ok_or_else(|| SchedError::UnknownAgent(endpoint.to_string()))?;
        agent.add_tag(tag.to_string());
        Ok(())
    }

    pub fn remove_tag(&self, endpoint: &str, tag: &str) -> SchedResult<()> {
        let mut state = self.lock();
        let agent = state
            .agents
            .get_mut(endpoint)
            .ok_or_else(|| SchedError::UnknownAgent(endpoint.to_string()))?;
        agent.remove_tag(tag);
        Ok(())
    }

    pub fn set_pool(&self, endpoint: &str, pool: &str) -> SchedResult<()> {
        let mut state = self.lock();
        let agent = state
            .agents
            .get_mut(endpoint)
            .ok_or_else(|| SchedError::UnknownAgent(endpoint.to_string()))?;
        agent.set_pool(pool.to_string());
        Ok(())
    }

    /// Frozen agents keep their containers but are skipped by placement.
    pub fn freeze_agent(&self, endpoint: &str) -> SchedResult<()> {
        let mut state = self.lock();
        if !state.agents.contains_key(endpoint) {
            return Err(SchedError::UnknownAgent(endpoint.to_string()));
        }
        state.frozen.insert(endpoint.to_string());
        Ok(())
    }

    pub fn thaw_agent(&self, endpoint: &str) -> SchedResult<()> {
        let mut state = self.lock();
        if !state.frozen.remove(endpoint) {
            return Err(SchedError::NotFrozen(endpoint.to_string()));
        }
        Ok(())
    }

    // ── Group intent ────────────────────────────────────────────────

    /// Create a group with `replica` pending containers.
    pub fn submit(
        &self,
        name: &str,
        manifest: &ContainerManifest,
        replica: i32,
        priority: Priority,
        user: &str,
    ) -> SchedResult<ContainerGroupId> {
        self.lock().submit(name, manifest, replica, priority, user)
    }

    /// Recreate a group from persisted metadata at startup. Containers
    /// are recreated by `start`'s replica reconciliation and by agents
    /// re-reporting them.
    pub fn reload(&self, meta: &ContainerGroupMeta) {
        self.lock().reload(meta);
    }

    /// Terminate a group. Idempotent.
    pub fn kill(&self, group_id: &str) -> SchedResult<()> {
        self.lock().kill(group_id)
    }

    pub fn change_replica(&self, group_id: &str, replica: i32) -> SchedResult<()> {
        self.lock().change_replica(group_id, replica)
    }

    /// Roll the group to a new description. Identical descriptions only
    /// refresh metadata; structural changes mint a new version token and
    /// begin a paced rolling update.
    pub fn update(
        &self,
        group_id: &str,
        manifest: &ContainerManifest,
        update_interval: i64,
    ) -> SchedResult<UpdateOutcome> {
        self.lock().update(group_id, manifest, update_interval)
    }

    /// Update back to the previously active description.
    pub fn rollback(&self, group_id: &str) -> SchedResult<UpdateOutcome> {
        let mut state = self.lock();
        let (prev, interval) = {
            let group = state
                .groups
                .get(group_id)
                .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;
            let prev = group
                .prev_manifest
                .clone()
                .ok_or_else(|| SchedError::NoPreviousVersion(group_id.to_string()))?;
            (prev, group.update_interval)
        };
        state.update(group_id, &prev, interval)
    }

    /// Halt version promotion for the group.
    pub fn pause_update(&self, group_id: &str) -> SchedResult<()> {
        let mut state = self.lock();
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;
        if group.terminated {
            return Err(SchedError::AlreadyTerminated(group_id.to_string()));
        }
        group.update_paused = true;
        info!(group = %group_id, "update paused");
        Ok(())
    }

    /// Resume a paused rollout. A non-zero `break_count` pauses again
    /// after that many further containers have been stepped.
    pub fn continue_update(&self, group_id: &str, break_count: u32) -> SchedResult<()> {
        let mut state = self.lock();
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;
        if !group.update_paused {
            return Err(SchedError::NotPaused(group_id.to_string()));
        }
        group.update_paused = false;
        group.update_break_count = break_count;
        info!(group = %group_id, break_count, "update continued");
        Ok(())
    }

    /// Abandon an in-flight rollout and restore the previous description
    /// under its original version token.
    pub fn cancel_update(&self, group_id: &str) -> SchedResult<()> {
        self.lock().cancel_update(group_id)
    }

    /// External status override (heartbeat outcome, GC).
    pub fn change_status(
        &self,
        group_id: &str,
        container_id: &str,
        new_status: ContainerStatus,
    ) -> SchedResult<()> {
        self.lock().change_status(group_id, container_id, new_status)
    }

    /// Single-shot manual preemption: force the group's next pending
    /// container onto the agent, evicting the cheapest victims.
    pub fn manual_schedule(&self, endpoint: &str, group_id: &str) -> SchedResult<()> {
        self.lock()
            .manual_schedule(endpoint, group_id, &self.config)
    }

    // ── Loops ───────────────────────────────────────────────────────

    /// Resume placing and reconcile replica/termination intent recorded
    /// before the stop (or reloaded from persistence).
    pub fn start(&self) {
        let plan: Vec<(ContainerGroupId, i32, bool)> = {
            let mut state = self.lock();
            state.stopped = false;
            state
                .groups
                .values()
                .map(|g| (g.id.clone(), g.replica, g.terminated))
                .collect()
        };
        for (group_id, replica, terminated) in plan {
            let _ = self.change_replica(&group_id, replica);
            if terminated {
                let _ = self.kill(&group_id);
            }
        }
        info!("scheduler started");
    }

    /// Placement ticks and heartbeat commands become no-ops until the
    /// next `start`.
    pub fn stop(&self) {
        self.lock().stopped = true;
        info!("scheduler stopped");
    }

    /// One placement tick: visit the agent after `prev_endpoint` in
    /// endpoint order, run version and tag/pool checks, then try one
    /// placement per group.
    pub fn schedule_next_agent(&self, prev_endpoint: &str) -> TickOutcome {
        self.lock().schedule_next_agent(prev_endpoint, &self.config)
    }

    /// Erase terminated groups whose containers have all terminated.
    pub fn gc_sweep(&self) -> Vec<ContainerGroupId> {
        self.lock().gc_sweep()
    }

    /// Answer a heartbeat with the ordered command list for the agent.
    pub fn make_command(&self, endpoint: &str, snapshot: &AgentSnapshot) -> Vec<AgentCommand> {
        self.lock().make_command(endpoint, snapshot, &self.config)
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn list_container_groups(&self) -> Vec<ContainerGroupStats> {
        self.lock().list_container_groups()
    }

    pub fn show_container_group(&self, group_id: &str) -> SchedResult<Vec<ContainerStats>> {
        let state = self.lock();
        let group = state
            .groups
            .get(group_id)
            .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;
        Ok(group.containers.values().map(container_stats).collect())
    }

    /// Copy out the persistable metadata of a group.
    pub fn group_meta(&self, group_id: &str) -> SchedResult<ContainerGroupMeta> {
        let state = self.lock();
        let group = state
            .groups
            .get(group_id)
            .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;
        Ok(ContainerGroupMeta {
            id: group.id.clone(),
            name: group.name.clone(),
            user: group.user.clone(),
            submit_time: group.submit_time,
            update_time: group.update_time,
            replica: group.replica,
            update_interval: group.update_interval,
            status: if group.terminated {
                GroupStatus::Terminated
            } else {
                GroupStatus::Normal
            },
            manifest: group.manifest.clone(),
        })
    }

    /// Bookkeeping summary of one agent.
    pub fn show_agent_overview(&self, endpoint: &str) -> SchedResult<crate::agent::AgentOverview> {
        let state = self.lock();
        let agent = state
            .agents
            .get(endpoint)
            .ok_or_else(|| SchedError::UnknownAgent(endpoint.to_string()))?;
        let mut overview = agent.overview();
        overview.frozen = state.frozen.contains(endpoint);
        Ok(overview)
    }

    pub fn show_agent(&self, endpoint: &str) -> SchedResult<Vec<ContainerStats>> {
        let state = self.lock();
        let agent = state
            .agents
            .get(endpoint)
            .ok_or_else(|| SchedError::UnknownAgent(endpoint.to_string()))?;
        let mut stats = Vec::new();
        for (cid, gid) in agent.containers() {
            if let Some(container) = state.groups.get(gid).and_then(|g| g.containers.get(cid)) {
                stats.push(container_stats(container));
            }
        }
        Ok(stats)
    }

    /// Aggregate resources a user's groups would hold at full replica.
    pub fn show_user_alloc(&self, user: &str) -> Quota {
        let state = self.lock();
        let mut quota = Quota::default();
        for group in state.groups.values() {
            if group.user != user {
                continue;
            }
            let replica = i64::from(group.replica_count());
            quota.replica += replica;
            if group.priority != Priority::BestEffort {
                quota.millicores += group.require.cpu_need() * replica;
                quota.memory += group.require.memory_need() * replica;
            }
            quota.memory += group.require.tmpfs_need() * replica;
            quota.disk += group.require.disk_need() * replica;
            quota.ssd += group.require.ssd_need() * replica;
        }
        quota
    }

    /// The group (if any) whose volume jobs reference `group_id`.
    pub fn is_being_shared(&self, group_id: &str) -> Option<ContainerGroupId> {
        let state = self.lock();
        for group in state.groups.values() {
            if group.require.volume_jobs.iter().any(|j| j == group_id) {
                info!(shared = %group_id, by = %group.id, "group is being shared");
                return Some(group.id.clone());
            }
        }
        None
    }

    /// The quota a persisted group would consume at full replica.
    pub fn meta_to_quota(meta: &ContainerGroupMeta) -> Quota {
        let require = Requirement::from_manifest(&meta.manifest);
        let replica = i64::from(meta.replica);
        let mut quota = Quota {
            replica,
            ..Default::default()
        };
        if meta.manifest.priority != Priority::BestEffort {
            quota.millicores = require.cpu_need() * replica;
            quota.memory = (require.memory_need() + require.tmpfs_need()) * replica;
        } else {
            quota.memory = require.tmpfs_need() * replica;
        }
        quota.disk = require.disk_need() * replica;
        quota.ssd = require.ssd_need() * replica;
        quota
    }
}

impl SchedulerState {
    // ── Lifecycle transitions ───────────────────────────────────────

    fn change_status(
        &mut self,
        group_id: &str,
        container_id: &str,
        new_status: ContainerStatus,
    ) -> SchedResult<()> {
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;
        let old_status;
        {
            let container = group
                .containers
                .get_mut(container_id)
                .ok_or_else(|| SchedError::UnknownContainer(container_id.to_string()))?;
            old_status = container.status;
            if matches!(
                new_status,
                ContainerStatus::Pending | ContainerStatus::Terminated
            ) {
                if !container.allocated_agent.is_empty() {
                    if let Some(agent) = self.agents.get_mut(&container.allocated_agent) {
                        agent.evict(container);
                    }
                }
                container.allocated_agent.clear();
                container.allocated_volumes.clear();
                container.allocated_ports.clear();
                container.allocated_volume_containers.clear();
                container.requirement = Arc::clone(&group.require);
                container.remote_info = RemoteInfo::default();
            }
            container.status = new_status;
            if new_status == ContainerStatus::Ready {
                container.last_res_err = ResourceError::Ok;
            }
        }
        group.move_bucket(container_id, old_status, new_status);
        debug!(
            container = %container_id,
            from = ?old_status,
            to = ?new_status,
            "status changed"
        );
        Ok(())
    }

    // ── Agents ──────────────────────────────────────────────────────

    fn add_agent(&mut self, spec: AgentSpec, snapshot: &AgentSnapshot, config: &SchedulerConfig) {
        let endpoint = spec.endpoint.clone();
        let mut agent = AgentState::new(spec);

        let mut cpu_assigned = 0i64;
        let mut cpu_reserved = 0i64;
        let mut cpu_deep_assigned = 0i64;
        let mut cpu_deep_reserved = 0i64;
        let mut memory_assigned = 0i64;
        let mut memory_reserved = 0i64;
        let mut memory_deep_assigned = 0i64;
        let mut memory_deep_reserved = 0i64;
        let mut volume_assigned: BTreeMap<DevicePath, VolumeInfo> = BTreeMap::new();
        let mut port_assigned: BTreeSet<String> = BTreeSet::new();
        let mut placed: Vec<PlacedSeed> = Vec::new();

        for report in &snapshot.containers {
            if report.status != ContainerStatus::Ready {
                continue;
            }
            match self.groups.get(&report.group_id) {
                None => {
                    warn!(group = %report.group_id, "agent reports unknown container group");
                    continue;
                }
                Some(group) if group.terminated => {
                    warn!(group = %report.group_id, "ignoring container of killed group");
                    continue;
                }
                Some(group) => {
                    if let Some(existing) = group.containers.get(&report.id) {
                        if existing.status == ContainerStatus::Ready {
                            warn!(container = %report.id, "container already adopted");
                            continue;
                        }
                    }
                }
            }
            // A stale entry (e.g. pending after a master restart) yields to
            // the live one the agent reports.
            if self
                .groups
                .get(&report.group_id)
                .is_some_and(|g| g.containers.contains_key(&report.id))
            {
                let _ = self.change_status(
                    &report.group_id,
                    &report.id,
                    ContainerStatus::Terminated,
                );
            }

            let sealed = Requirement::from_manifest(&report.manifest);
            let Some(group) = self.groups.get_mut(&report.group_id) else { continue };
            let require = if sealed.version == group.require.version {
                Arc::clone(&group.require)
            } else {
                Arc::new(sealed)
            };
            let priority = report.manifest.priority;
            let cpu_need = require.cpu_need();
            let memory_need = require.memory_need();
            let cpu_live = reserved_share(report.cpu_used, config.reserved_percent, cpu_need);
            let memory_live =
                reserved_share(report.memory_used, config.reserved_percent, memory_need);
            if priority != Priority::BestEffort {
                cpu_assigned += cpu_need;
                cpu_reserved += cpu_live;
                memory_assigned += memory_need;
                memory_reserved += memory_live;
            } else {
                cpu_deep_assigned += cpu_need;
                cpu_deep_reserved += cpu_live;
                memory_deep_assigned += memory_need;
                memory_deep_reserved += memory_live;
            }

            let mut container = Container::new(
                report.id.clone(),
                report.group_id.clone(),
                priority,
                require,
            );
            container.status = ContainerStatus::Ready;
            container.allocated_agent = endpoint.clone();

            for cgroup in &report.manifest.cgroups {
                for port in &cgroup.ports {
                    container.allocated_ports.push(port.real_port.clone());
                    port_assigned.insert(port.real_port.clone());
                }
            }

            let workspace = &report.manifest.workspace_volume;
            if workspace.medium != VolumeMedium::Tmpfs {
                adopt_volume(&mut container, &mut volume_assigned, workspace);
            } else {
                memory_assigned += workspace.size;
            }
            for data_volume in &report.manifest.data_volumes {
                if data_volume.medium == VolumeMedium::Tmpfs {
                    memory_assigned += data_volume.size;
                    memory_reserved += data_volume.size;
                    continue;
                }
                adopt_volume(&mut container, &mut volume_assigned, data_volume);
            }
            container.allocated_volume_containers = report.manifest.volume_containers.clone();

            placed.push(PlacedSeed {
                id: container.id.clone(),
                group_id: container.group_id.clone(),
                priority,
                container_type: container.requirement.container_type,
                volume_containers: container.allocated_volume_containers.clone(),
            });
            group.install(container);
        }

        agent.set_assignment(
            cpu_assigned,
            cpu_deep_assigned,
            memory_assigned,
            memory_deep_assigned,
            volume_assigned,
            port_assigned,
            placed,
        );
        agent.set_reserved(
            cpu_reserved,
            cpu_deep_reserved,
            memory_reserved,
            memory_deep_reserved,
        );
        info!(agent = %endpoint, adopted = agent.containers().len(), "agent added");
        self.agents.insert(endpoint, agent);
    }

    fn remove_agent(&mut self, endpoint: &str) {
        let Some(agent) = self.agents.get(endpoint) else { return };
        let placed: Vec<(ContainerId, ContainerGroupId)> = agent
            .containers()
            .iter()
            .map(|(c, g)| (c.clone(), g.clone()))
            .collect();

        for (cid, gid) in placed {
            let target = match self
                .groups
                .get(&gid)
                .and_then(|g| g.containers.get(&cid))
            {
                Some(c) if c.status == ContainerStatus::Destroying => ContainerStatus::Terminated,
                Some(c) if c.requirement.container_type == ContainerType::Volume => {
                    info!(
                        agent = %endpoint,
                        container = %cid,
                        "agent removed, volume container will not migrate"
                    );
                    ContainerStatus::Terminated
                }
                Some(_) => ContainerStatus::Pending,
                None => continue,
            };
            let _ = self.change_status(&gid, &cid, target);
        }
        self.agents.remove(endpoint);
        self.frozen.remove(endpoint);
        info!(agent = %endpoint, "agent removed");
    }

    // ── Groups ──────────────────────────────────────────────────────

    fn submit(
        &mut self,
        name: &str,
        manifest: &ContainerManifest,
        replica: i32,
        priority: Priority,
        user: &str,
    ) -> SchedResult<ContainerGroupId> {
        if replica < 0 {
            return Err(SchedError::ReplicaInvalid(replica));
        }
        let group_id = generate_group_id(name);
        if self.groups.contains_key(&group_id) {
            warn!(group = %group_id, "container group id conflict");
            return Err(SchedError::IdConflict(group_id));
        }

        let mut manifest = manifest.clone();
        if manifest.version.is_empty() {
            manifest.version = new_version_token();
        }
        let require = Arc::new(Requirement::from_manifest(&manifest));
        let submit_time = epoch_micros();
        let mut group = ContainerGroup::new(
            group_id.clone(),
            name.to_string(),
            user.to_string(),
            priority,
            manifest,
            Arc::clone(&require),
            submit_time,
        );
        group.replica = replica;
        for offset in 0..replica {
            let cid = container_id(&group_id, offset);
            group.install(Container::new(
                cid,
                group_id.clone(),
                priority,
                Arc::clone(&require),
            ));
        }
        self.queue.insert((submit_time, group_id.clone()));
        self.groups.insert(group_id.clone(), group);
        info!(group = %group_id, replica, "group submitted");
        Ok(group_id)
    }

    fn reload(&mut self, meta: &ContainerGroupMeta) {
        let require = Arc::new(Requirement::from_manifest(&meta.manifest));
        let mut group = ContainerGroup::new(
            meta.id.clone(),
            meta.name.clone(),
            meta.user.clone(),
            meta.manifest.priority,
            meta.manifest.clone(),
            require,
            meta.submit_time,
        );
        group.replica = meta.replica;
        group.update_time = meta.update_time;
        group.update_interval = meta.update_interval;
        group.terminated = meta.status == GroupStatus::Terminated;
        self.queue.insert((meta.submit_time, meta.id.clone()));
        info!(group = %meta.id, replica = meta.replica, "group reloaded");
        self.groups.insert(meta.id.clone(), group);
    }

    fn kill(&mut self, group_id: &str) -> SchedResult<()> {
        let containers: Vec<(ContainerId, ContainerStatus)> = {
            let group = self
                .groups
                .get(group_id)
                .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;
            group
                .containers
                .values()
                .map(|c| (c.id.clone(), c.status))
                .collect()
        };
        for (cid, status) in containers {
            match status {
                ContainerStatus::Pending => {
                    let _ = self.change_status(group_id, &cid, ContainerStatus::Terminated);
                }
                ContainerStatus::Terminated => {}
                _ => {
                    let _ = self.change_status(group_id, &cid, ContainerStatus::Destroying);
                }
            }
        }
        if let Some(group) = self.groups.get_mut(group_id) {
            group.terminated = true;
        }
        info!(group = %group_id, "group killed");
        Ok(())
    }

    fn change_replica(&mut self, group_id: &str, replica: i32) -> SchedResult<()> {
        if replica < 0 {
            return Err(SchedError::ReplicaInvalid(replica));
        }
        let current = {
            let group = self
                .groups
                .get(group_id)
                .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;
            if group.terminated {
                return Err(SchedError::AlreadyTerminated(group_id.to_string()));
            }
            group.replica_count()
        };
        if replica < current {
            self.scale_down(group_id, replica);
        } else if replica > current {
            self.scale_up(group_id, replica);
        }
        if let Some(group) = self.groups.get_mut(group_id) {
            group.replica = replica;
        }
        Ok(())
    }

    fn scale_down(&mut self, group_id: &str, replica: i32) {
        let Some(group) = self.groups.get(group_id) else { return };
        let mut delta = group.replica_count() - replica;

        let pending: Vec<ContainerId> = group
            .bucket(ContainerStatus::Pending)
            .iter()
            .cloned()
            .collect();
        for cid in pending {
            if delta <= 0 {
                return;
            }
            let _ = self.change_status(group_id, &cid, ContainerStatus::Terminated);
            delta -= 1;
        }
        for status in [ContainerStatus::Allocating, ContainerStatus::Ready] {
            let Some(group) = self.groups.get(group_id) else { return };
            let working: Vec<ContainerId> = group.bucket(status).iter().cloned().collect();
            for cid in working {
                if delta <= 0 {
                    return;
                }
                let _ = self.change_status(group_id, &cid, ContainerStatus::Destroying);
                delta -= 1;
            }
        }
    }

    fn scale_up(&mut self, group_id: &str, replica: i32) {
        for offset in 0..replica {
            let Some(group) = self.groups.get(group_id) else { return };
            if group.replica_count() >= replica {
                break;
            }
            let cid = container_id(group_id, offset);
            match group.containers.get(&cid).map(|c| c.status) {
                None => {
                    let priority = group.priority;
                    let require = Arc::clone(&group.require);
                    if let Some(group) = self.groups.get_mut(group_id) {
                        group.install(Container::new(
                            cid,
                            group_id.to_string(),
                            priority,
                            require,
                        ));
                    }
                }
                Some(ContainerStatus::Ready) | Some(ContainerStatus::Allocating) => {}
                Some(_) => {
                    let _ = self.change_status(group_id, &cid, ContainerStatus::Pending);
                }
            }
        }
    }

    fn update(
        &mut self,
        group_id: &str,
        manifest: &ContainerManifest,
        update_interval: i64,
    ) -> SchedResult<UpdateOutcome> {
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;

        let sealed = Requirement::from_manifest(manifest);
        if !sealed.differs_from(&group.require) {
            info!(group = %group_id, "update carries no structural change");
            group.update_interval = update_interval;
            group.manifest = manifest.clone();
            group.manifest.version = group.require.version.clone();
            group.update_time = epoch_micros();
            return Ok(UpdateOutcome {
                version: group.require.version.clone(),
                changed: false,
            });
        }

        let version = new_version_token();
        let mut sealed = sealed;
        sealed.version = version.clone();
        group.prev_manifest = Some(std::mem::take(&mut group.manifest));
        group.manifest = manifest.clone();
        group.manifest.version = version.clone();
        group.require = Arc::new(sealed);
        group.update_interval = update_interval;
        group.last_update_time = epoch_secs();
        group.update_time = epoch_micros();
        group.update_paused = false;
        group.update_break_count = 0;

        // Pending containers pick the new version up immediately; placed
        // ones are stepped by the paced version check.
        let require = Arc::clone(&group.require);
        let pending: Vec<ContainerId> = group
            .bucket(ContainerStatus::Pending)
            .iter()
            .cloned()
            .collect();
        for cid in pending {
            if let Some(container) = group.containers.get_mut(&cid) {
                container.requirement = Arc::clone(&require);
            }
        }
        info!(group = %group_id, version = %version, "update started");
        Ok(UpdateOutcome {
            version,
            changed: true,
        })
    }

    fn cancel_update(&mut self, group_id: &str) -> SchedResult<()> {
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;
        let prev = group
            .prev_manifest
            .take()
            .ok_or_else(|| SchedError::NoPreviousVersion(group_id.to_string()))?;

        group.prev_manifest = Some(std::mem::replace(&mut group.manifest, prev));
        group.require = Arc::new(Requirement::from_manifest(&group.manifest));
        group.update_time = epoch_micros();
        group.update_paused = false;
        group.update_break_count = 0;

        let require = Arc::clone(&group.require);
        let pending: Vec<ContainerId> = group
            .bucket(ContainerStatus::Pending)
            .iter()
            .cloned()
            .collect();
        for cid in pending {
            if let Some(container) = group.containers.get_mut(&cid) {
                container.requirement = Arc::clone(&require);
            }
        }
        info!(group = %group_id, version = %group.require.version, "update cancelled");
        Ok(())
    }

    // ── Placement ───────────────────────────────────────────────────

    fn schedule_next_agent(&mut self, prev_endpoint: &str, config: &SchedulerConfig) -> TickOutcome {
        if self.stopped || self.agents.is_empty() {
            return TickOutcome::Idle;
        }
        let endpoint = match self
            .agents
            .range::<str, _>((Bound::Excluded(prev_endpoint), Bound::Unbounded))
            .next()
        {
            Some((endpoint, _)) => endpoint.clone(),
            None => return TickOutcome::Wrapped,
        };
        if self.frozen.contains(&endpoint) {
            return TickOutcome::Skipped(endpoint);
        }

        if config.check_container_version {
            self.check_version(&endpoint);
        }
        self.check_tag_and_pool(&endpoint);
        self.place_on_agent(&endpoint, config);
        TickOutcome::Visited(endpoint)
    }

    /// Step stale-version containers on this agent back to pending, paced
    /// by the group's update interval and gated by pause/break state.
    fn check_version(&mut self, endpoint: &str) {
        let Some(agent) = self.agents.get(endpoint) else { return };
        let placed: Vec<(ContainerId, ContainerGroupId)> = agent
            .containers()
            .iter()
            .map(|(c, g)| (c.clone(), g.clone()))
            .collect();
        let now = epoch_secs();

        for (cid, gid) in placed {
            let mut step = false;
            match self.groups.get_mut(&gid) {
                None => {
                    warn!(group = %gid, "version check: unknown group, dropping container");
                    if let Some(agent) = self.agents.get_mut(endpoint) {
                        agent.forget(&cid);
                    }
                    continue;
                }
                Some(group) => {
                    let current = Arc::clone(&group.require);
                    if let Some(container) = group.containers.get_mut(&cid) {
                        if container.requirement.version == current.version {
                            container.requirement = current;
                        } else if !group.update_paused
                            && now - group.last_update_time >= group.update_interval
                        {
                            group.last_update_time = now;
                            if group.update_break_count > 0 {
                                group.update_break_count -= 1;
                                if group.update_break_count == 0 {
                                    group.update_paused = true;
                                    info!(group = %gid, "update break reached, pausing");
                                }
                            }
                            step = true;
                        }
                    }
                }
            }
            if step {
                let _ = self.change_status(&gid, &cid, ContainerStatus::Pending);
            }
        }
    }

    /// Re-verify tag and pool for every container on the agent; violators
    /// go back to pending carrying the mismatch code.
    fn check_tag_and_pool(&mut self, endpoint: &str) {
        let Some(agent) = self.agents.get(endpoint) else { return };
        let placed: Vec<(ContainerId, ContainerGroupId)> = agent
            .containers()
            .iter()
            .map(|(c, g)| (c.clone(), g.clone()))
            .collect();

        for (cid, gid) in placed {
            let mut evict = false;
            {
                let Some(agent) = self.agents.get(endpoint) else { return };
                if let Some(container) = self
                    .groups
                    .get_mut(&gid)
                    .and_then(|g| g.containers.get_mut(&cid))
                {
                    evict = !check_tag_and_pool_once(agent, container);
                }
            }
            if evict {
                let _ = self.change_status(&gid, &cid, ContainerStatus::Pending);
            }
        }
    }

    /// One placement attempt per group, in submit order, using each
    /// group's round-robin pending cursor.
    fn place_on_agent(&mut self, endpoint: &str, config: &SchedulerConfig) {
        let queue: Vec<ContainerGroupId> = self.queue.iter().map(|(_, id)| id.clone()).collect();
        for group_id in queue {
            let mut placed: Option<ContainerId> = None;
            {
                let Some(group) = self.groups.get_mut(&group_id) else { continue };
                let Some(cid) = group.next_pending_after(&group.last_sched_container_id.clone())
                else {
                    continue;
                };
                group.last_sched_container_id = cid.clone();
                let Some(container) = group.containers.get_mut(&cid) else { continue };
                let Some(agent) = self.agents.get_mut(endpoint) else { return };
                match agent.try_put(container, config.max_batch_pods) {
                    Ok(()) => {
                        agent.put(container);
                        placed = Some(cid);
                    }
                    Err(err) => {
                        debug!(
                            container = %cid,
                            agent = %endpoint,
                            error = ?err,
                            "placement attempt failed"
                        );
                        if container.last_res_err.is_overwritable() {
                            container.last_res_err = err;
                        }
                    }
                }
            }
            if let Some(cid) = placed {
                let _ = self.change_status(&group_id, &cid, ContainerStatus::Allocating);
            }
        }
    }

    fn manual_schedule(
        &mut self,
        endpoint: &str,
        group_id: &str,
        config: &SchedulerConfig,
    ) -> SchedResult<()> {
        info!(group = %group_id, agent = %endpoint, "manual scheduling");
        if !self.agents.contains_key(endpoint) {
            return Err(SchedError::UnknownAgent(endpoint.to_string()));
        }
        let target = {
            let group = self
                .groups
                .get(group_id)
                .ok_or_else(|| SchedError::UnknownGroup(group_id.to_string()))?;
            group
                .bucket(ContainerStatus::Pending)
                .iter()
                .next()
                .cloned()
                .ok_or_else(|| SchedError::NoPendingContainer(group_id.to_string()))?
        };

        {
            let Some(agent) = self.agents.get(endpoint) else {
                return Err(SchedError::UnknownAgent(endpoint.to_string()));
            };
            let container = self
                .groups
                .get_mut(group_id)
                .and_then(|g| g.containers.get_mut(&target))
                .ok_or_else(|| SchedError::UnknownContainer(target.clone()))?;
            if !check_tag_and_pool_once(agent, container) {
                return Err(SchedError::Mismatch(container.last_res_err));
            }
        }

        // Victims cheapest-first: ascending importance is descending
        // priority value, so walk the sort in reverse.
        let mut victims: Vec<(Priority, ContainerId, ContainerGroupId)> = Vec::new();
        if let Some(agent) = self.agents.get(endpoint) {
            for (cid, gid) in agent.containers() {
                if let Some(container) =
                    self.groups.get(gid).and_then(|g| g.containers.get(cid))
                {
                    if container.requirement.container_type == ContainerType::Volume {
                        continue;
                    }
                    victims.push((container.priority, cid.clone(), gid.clone()));
                }
            }
        }
        victims.sort();

        for (_, victim_id, victim_gid) in victims.iter().rev() {
            let first = self.try_put_target(endpoint, group_id, &target, config)?;
            if let Err(err) = first {
                if matches!(
                    err,
                    ResourceError::TagMismatch | ResourceError::PoolMismatch
                ) {
                    return Err(SchedError::Mismatch(err));
                }
                let _ = self.change_status(victim_gid, victim_id, ContainerStatus::Pending);
            }
            match self.try_put_target(endpoint, group_id, &target, config)? {
                Ok(()) => {
                    {
                        let Some(agent) = self.agents.get_mut(endpoint) else {
                            return Err(SchedError::UnknownAgent(endpoint.to_string()));
                        };
                        if let Some(container) = self
                            .groups
                            .get_mut(group_id)
                            .and_then(|g| g.containers.get_mut(&target))
                        {
                            agent.put(container);
                        }
                    }
                    let _ = self.change_status(group_id, &target, ContainerStatus::Allocating);
                    info!(container = %target, agent = %endpoint, "manual placement succeeded");
                    return Ok(());
                }
                Err(err) => {
                    if let Some(container) = self
                        .groups
                        .get_mut(group_id)
                        .and_then(|g| g.containers.get_mut(&target))
                    {
                        container.last_res_err = err;
                    }
                }
            }
        }
        Err(SchedError::PreemptFailed(endpoint.to_string()))
    }

    fn try_put_target(
        &self,
        endpoint: &str,
        group_id: &str,
        container_id: &str,
        config: &SchedulerConfig,
    ) -> SchedResult<Result<(), ResourceError>> {
        let agent = self
            .agents
            .get(endpoint)
            .ok_or_else(|| SchedError::UnknownAgent(endpoint.to_string()))?;
        let container = self
            .groups
            .get(group_id)
            .and_then(|g| g.containers.get(container_id))
            .ok_or_else(|| SchedError::UnknownContainer(container_id.to_string()))?;
        Ok(agent.try_put(container, config.max_batch_pods))
    }

    // ── Heartbeat reconciliation ────────────────────────────────────

    fn make_command(
        &mut self,
        endpoint: &str,
        snapshot: &AgentSnapshot,
        config: &SchedulerConfig,
    ) -> Vec<AgentCommand> {
        let mut commands = Vec::new();
        if self.stopped {
            info!("no commands while scheduler is stopped");
            return commands;
        }
        let Some(agent) = self.agents.get(endpoint) else {
            warn!(agent = %endpoint, "heartbeat from unknown agent, destroying everything");
            for report in &snapshot.containers {
                commands.push(destroy_command(&report.id, &report.group_id));
            }
            return commands;
        };
        let placed: Vec<(ContainerId, ContainerGroupId)> = agent
            .containers()
            .iter()
            .map(|(c, g)| (c.clone(), g.clone()))
            .collect();
        let local: BTreeSet<&str> = placed.iter().map(|(c, _)| c.as_str()).collect();

        let mut cpu_reserved = 0i64;
        let mut cpu_deep_reserved = 0i64;
        let mut memory_reserved = 0i64;
        let mut memory_deep_reserved = 0i64;
        let mut remote_status: BTreeMap<ContainerId, ContainerStatus> = BTreeMap::new();

        for report in &snapshot.containers {
            if !local.contains(report.id.as_str()) {
                info!(container = %report.id, "expired remote container");
                commands.push(destroy_command(&report.id, &report.group_id));
                continue;
            }
            let Some(container) = self
                .groups
                .get_mut(&report.group_id)
                .and_then(|g| g.containers.get_mut(&report.id))
            else {
                continue;
            };
            let require = Arc::clone(&container.requirement);
            let cpu_live =
                reserved_share(report.cpu_used, config.reserved_percent, require.cpu_need());
            let memory_live = reserved_share(
                report.memory_used,
                config.reserved_percent,
                require.memory_need(),
            );
            // Tmpfs is always counted in full against the hard memory
            // reserve, independent of the priority class.
            memory_reserved += require.tmpfs_need();
            if container.priority != Priority::BestEffort {
                cpu_reserved += cpu_live;
                memory_reserved += memory_live;
            } else {
                cpu_deep_reserved += cpu_live;
                memory_deep_reserved += memory_live;
            }

            if config.check_container_version && require.version != report.manifest.version {
                info!(
                    container = %report.id,
                    local = %require.version,
                    remote = %report.manifest.version,
                    "remote version expired"
                );
                commands.push(destroy_command(&report.id, &report.group_id));
                continue;
            }
            remote_status.insert(report.id.clone(), report.status);
            container.remote_info = RemoteInfo {
                cpu_used: report.cpu_used,
                memory_used: report.memory_used,
                volumes_used: report.volumes_used.clone(),
                ports_used: report.ports_used.clone(),
            };
        }

        if let Some(agent) = self.agents.get_mut(endpoint) {
            agent.set_reserved(
                cpu_reserved,
                cpu_deep_reserved,
                memory_reserved,
                memory_deep_reserved,
            );
        }

        for (cid, gid) in placed {
            if !self.groups.contains_key(&gid) {
                warn!(group = %gid, "make command: unknown group, dropping container");
                if let Some(agent) = self.agents.get_mut(endpoint) {
                    agent.forget(&cid);
                }
                continue;
            }
            let remote = remote_status.get(&cid).copied();
            let mut new_status = None;
            {
                let Some(group) = self.groups.get(&gid) else { continue };
                let Some(container) = group.containers.get(&cid) else { continue };
                match container.status {
                    ContainerStatus::Allocating => match remote {
                        Some(ContainerStatus::Ready) => {
                            new_status = Some(ContainerStatus::Ready);
                        }
                        Some(ContainerStatus::Finish) => {
                            new_status = Some(ContainerStatus::Terminated);
                        }
                        Some(ContainerStatus::Error) => {
                            commands.push(destroy_command(&cid, &gid));
                            new_status = Some(ContainerStatus::Pending);
                        }
                        _ => {
                            commands.push(AgentCommand {
                                action: CommandAction::CreateContainer,
                                container_id: cid.clone(),
                                group_id: gid.clone(),
                                manifest: Some(build_create_manifest(&group.manifest, container)),
                            });
                        }
                    },
                    ContainerStatus::Ready => match remote {
                        Some(ContainerStatus::Finish) => {
                            new_status = Some(ContainerStatus::Terminated);
                        }
                        Some(ContainerStatus::Error) => {
                            commands.push(destroy_command(&cid, &gid));
                            new_status = Some(ContainerStatus::Pending);
                        }
                        Some(ContainerStatus::Ready) => {}
                        _ => {
                            new_status = Some(ContainerStatus::Pending);
                        }
                    },
                    ContainerStatus::Destroying => match remote {
                        None => {
                            new_status = Some(ContainerStatus::Terminated);
                        }
                        Some(ContainerStatus::Terminated) => {}
                        Some(_) => {
                            commands.push(destroy_command(&cid, &gid));
                        }
                    },
                    other => {
                        warn!(container = %cid, status = ?other, "invalid local status on agent");
                    }
                }
            }
            if let Some(status) = new_status {
                let _ = self.change_status(&gid, &cid, status);
            }
        }
        commands
    }

    // ── Garbage collection ──────────────────────────────────────────

    fn gc_sweep(&mut self) -> Vec<ContainerGroupId> {
        let done: Vec<(i64, ContainerGroupId)> = self
            .groups
            .values()
            .filter(|g| g.terminated && g.all_terminated())
            .map(|g| (g.submit_time, g.id.clone()))
            .collect();
        for (submit_time, group_id) in &done {
            self.groups.remove(group_id);
            self.queue.remove(&(*submit_time, group_id.clone()));
            info!(group = %group_id, "terminated group collected");
        }
        done.into_iter().map(|(_, id)| id).collect()
    }

    // ── Views ───────────────────────────────────────────────────────

    fn list_container_groups(&self) -> Vec<ContainerGroupStats> {
        let mut all = Vec::with_capacity(self.groups.len());
        for group in self.groups.values() {
            let mut stats = ContainerGroupStats {
                id: group.id.clone(),
                name: group.name.clone(),
                user: group.user.clone(),
                replica: group.replica_count(),
                ready: group.bucket(ContainerStatus::Ready).len(),
                pending: group.bucket(ContainerStatus::Pending).len(),
                allocating: group.bucket(ContainerStatus::Allocating).len(),
                destroying: group.bucket(ContainerStatus::Destroying).len(),
                submit_time: group.submit_time,
                update_time: group.update_time,
                container_type: group.require.container_type,
                status: if group.terminated {
                    GroupStatus::Terminated
                } else {
                    GroupStatus::Normal
                },
                ..Default::default()
            };
            let mut volume_assigned: BTreeMap<VolumeMedium, i64> = BTreeMap::new();
            let mut volume_used: BTreeMap<VolumeMedium, i64> = BTreeMap::new();
            for container in group.containers.values() {
                if container.status != ContainerStatus::Ready {
                    continue;
                }
                for (index, volume) in container.requirement.volumes.iter().enumerate() {
                    *volume_assigned.entry(volume.medium).or_insert(0) += volume.size;
                    let used = container
                        .remote_info
                        .volumes_used
                        .get(index)
                        .map(|v| v.used_size)
                        .unwrap_or(0);
                    *volume_used.entry(volume.medium).or_insert(0) += used;
                }
                stats.cpu.assigned += container.requirement.cpu_need();
                stats.cpu.used += container.remote_info.cpu_used;
                stats.memory.assigned += container.requirement.memory_need();
                stats.memory.used += container.remote_info.memory_used;
            }
            for (medium, assigned) in volume_assigned {
                stats.volumes.push(VolumeTotals {
                    medium,
                    device_path: String::new(),
                    volume: ResourceTotals {
                        assigned,
                        used: volume_used.get(&medium).copied().unwrap_or(0),
                    },
                });
            }
            all.push(stats);
        }
        all
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn destroy_command(container_id: &str, group_id: &str) -> AgentCommand {
    AgentCommand {
        action: CommandAction::DestroyContainer,
        container_id: container_id.to_string(),
        group_id: group_id.to_string(),
        manifest: None,
    }
}

/// min(reported usage scaled by the reserved fraction, the request).
fn reserved_share(used: i64, reserved_percent: f64, need: i64) -> i64 {
    ((used as f64 * reserved_percent) as i64).min(need)
}

/// Tag and pool gate. Sets the mismatch code on the container; pool
/// mismatch wins when both fail.
fn check_tag_and_pool_once(agent: &AgentState, container: &mut Container) -> bool {
    let mut passed = true;
    if !container.requirement.tag.is_empty() && !agent.has_tag(&container.requirement.tag) {
        container.last_res_err = ResourceError::TagMismatch;
        passed = false;
    }
    if !container.requirement.pool_names.contains(agent.pool()) {
        container.last_res_err = ResourceError::PoolMismatch;
        passed = false;
    }
    passed
}

/// A create command's manifest: the group description with the concrete
/// device path per non-tmpfs volume (requirement order), the resolved port
/// per cgroup port, and the chosen volume-container ids.
fn build_create_manifest(
    group_manifest: &ContainerManifest,
    container: &Container,
) -> ContainerManifest {
    let mut manifest = group_manifest.clone();
    let mut volume_index = 0;
    if manifest.workspace_volume.medium != VolumeMedium::Tmpfs {
        match container.allocated_volumes.get(volume_index) {
            Some((path, _)) => {
                manifest.workspace_volume.source_path = path.clone();
                volume_index += 1;
            }
            None => {
                warn!(container = %container.id, "missing workspace volume allocation");
                return manifest;
            }
        }
    }
    for volume in &mut manifest.data_volumes {
        if volume.medium == VolumeMedium::Tmpfs {
            continue;
        }
        match container.allocated_volumes.get(volume_index) {
            Some((path, _)) => {
                volume.source_path = path.clone();
                volume_index += 1;
            }
            None => break,
        }
    }

    let mut port_index = 0;
    for cgroup in &mut manifest.cgroups {
        for port in &mut cgroup.ports {
            match container.allocated_ports.get(port_index) {
                Some(real) => {
                    port.real_port = real.clone();
                    port_index += 1;
                }
                None => {
                    warn!(container = %container.id, "missing port allocation");
                    return manifest;
                }
            }
        }
    }
    manifest.volume_containers = container.allocated_volume_containers.clone();
    manifest
}

/// Per-container statistics view: assigned by requirement dest path,
/// usage by the agent-reported path.
fn container_stats(container: &Container) -> ContainerStats {
    let mut volumes = Vec::new();
    let used: BTreeMap<&str, i64> = container
        .remote_info
        .volumes_used
        .iter()
        .map(|v| (v.path.as_str(), v.used_size))
        .collect();
    for volume in &container.requirement.volumes {
        volumes.push(VolumeTotals {
            medium: volume.medium,
            device_path: volume.dest_path.clone(),
            volume: ResourceTotals {
                assigned: volume.size,
                used: used.get(volume.dest_path.as_str()).copied().unwrap_or(0),
            },
        });
    }
    ContainerStats {
        id: container.id.clone(),
        status: container.status,
        endpoint: container.allocated_agent.clone(),
        last_res_err: container.last_res_err,
        cpu: ResourceTotals {
            assigned: container.requirement.cpu_need(),
            used: container.remote_info.cpu_used,
        },
        memory: ResourceTotals {
            assigned: container.requirement.memory_need(),
            used: container.remote_info.memory_used,
        },
        volumes,
    }
}

/// Record one adopted non-tmpfs volume on the container and in the
/// re-derived device assignment.
fn adopt_volume(
    container: &mut Container,
    volume_assigned: &mut BTreeMap<DevicePath, VolumeInfo>,
    volume: &corral_core::VolumeRequired,
) {
    container.allocated_volumes.push((
        volume.source_path.clone(),
        VolumeInfo {
            medium: volume.medium,
            size: volume.size,
            exclusive: volume.exclusive,
        },
    ));
    let entry = volume_assigned.entry(volume.source_path.clone()).or_default();
    entry.size += volume.size;
    entry.medium = volume.medium;
    if volume.exclusive {
        entry.exclusive = true;
    }
}

fn epoch_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
