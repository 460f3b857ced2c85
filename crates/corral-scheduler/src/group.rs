//! Container groups and the containers they own.
//!
//! A `ContainerGroup` is one replicated job: the desired replica count, the
//! current sealed [`Requirement`], per-status id buckets, and rolling-update
//! pacing state. Groups own their containers; agents refer to containers by
//! id only, so there are no bidirectional owning references.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

use corral_core::{
    AgentEndpoint, ContainerGroupId, ContainerId, ContainerManifest, ContainerStatus, DevicePath,
    Priority, RemoteInfo, Requirement, ResourceError, VolumeInfo,
};

/// One placeable unit of a group.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: ContainerId,
    pub group_id: ContainerGroupId,
    pub priority: Priority,
    pub status: ContainerStatus,
    /// Shared with every container of the same version.
    pub requirement: Arc<Requirement>,
    /// Empty while not placed.
    pub allocated_agent: AgentEndpoint,
    /// One entry per non-tmpfs volume, in requirement order.
    pub allocated_volumes: Vec<(DevicePath, VolumeInfo)>,
    /// One resolved port string per requested port, in cgroup order.
    pub allocated_ports: Vec<String>,
    /// Volume containers consumed on the placed agent, one per volume job.
    pub allocated_volume_containers: Vec<ContainerId>,
    pub last_res_err: ResourceError,
    pub remote_info: RemoteInfo,
}

impl Container {
    /// A fresh pending container.
    pub fn new(
        id: ContainerId,
        group_id: ContainerGroupId,
        priority: Priority,
        requirement: Arc<Requirement>,
    ) -> Self {
        Self {
            id,
            group_id,
            priority,
            status: ContainerStatus::Pending,
            requirement,
            allocated_agent: String::new(),
            allocated_volumes: Vec::new(),
            allocated_ports: Vec::new(),
            allocated_volume_containers: Vec::new(),
            last_res_err: ResourceError::Ok,
            remote_info: RemoteInfo::default(),
        }
    }
}

fn bucket_index(status: ContainerStatus) -> usize {
    match status {
        ContainerStatus::Pending => 0,
        ContainerStatus::Allocating => 1,
        ContainerStatus::Ready => 2,
        ContainerStatus::Finish => 3,
        ContainerStatus::Error => 4,
        ContainerStatus::Destroying => 5,
        ContainerStatus::Terminated => 6,
    }
}

/// A replicated job.
#[derive(Debug)]
pub struct ContainerGroup {
    pub id: ContainerGroupId,
    pub name: String,
    pub user: String,
    pub priority: Priority,
    /// Desired replica count.
    pub replica: i32,
    pub terminated: bool,
    /// Verbatim submitted description (create commands derive from it).
    pub manifest: ContainerManifest,
    /// Current sealed requirement.
    pub require: Arc<Requirement>,
    /// Retained for rollback / cancel-update.
    pub prev_manifest: Option<ContainerManifest>,
    pub containers: BTreeMap<ContainerId, Container>,
    /// Id buckets per status; every container is in exactly one.
    buckets: [BTreeSet<ContainerId>; 7],
    /// Round-robin cursor for fair pending selection.
    pub last_sched_container_id: ContainerId,
    /// Unix micros.
    pub submit_time: i64,
    /// Unix micros.
    pub update_time: i64,
    /// Unix seconds of the last per-agent rolling-update step.
    pub last_update_time: i64,
    /// Seconds between per-agent rolling-update steps.
    pub update_interval: i64,
    pub update_paused: bool,
    /// When non-zero, pause again after this many further update steps.
    pub update_break_count: u32,
}

impl ContainerGroup {
    pub fn new(
        id: ContainerGroupId,
        name: String,
        user: String,
        priority: Priority,
        manifest: ContainerManifest,
        require: Arc<Requirement>,
        submit_time: i64,
    ) -> Self {
        Self {
            id,
            name,
            user,
            priority,
            replica: 0,
            terminated: false,
            manifest,
            require,
            prev_manifest: None,
            containers: BTreeMap::new(),
            buckets: Default::default(),
            last_sched_container_id: String::new(),
            submit_time,
            update_time: submit_time,
            last_update_time: 0,
            update_interval: 0,
            update_paused: false,
            update_break_count: 0,
        }
    }

    /// Ids currently in the given status.
    pub fn bucket(&self, status: ContainerStatus) -> &BTreeSet<ContainerId> {
        &self.buckets[bucket_index(status)]
    }

    /// Move an id between status buckets. The container's own `status`
    /// field is maintained by the caller in the same critical section.
    pub fn move_bucket(&mut self, id: &str, from: ContainerStatus, to: ContainerStatus) {
        self.buckets[bucket_index(from)].remove(id);
        self.buckets[bucket_index(to)].insert(id.to_string());
    }

    /// Insert a container, replacing any same-id entry and fixing buckets.
    pub fn install(&mut self, container: Container) {
        if let Some(old) = self.containers.get(&container.id) {
            let old_status = old.status;
            self.buckets[bucket_index(old_status)].remove(&container.id);
        }
        self.buckets[bucket_index(container.status)].insert(container.id.clone());
        self.containers.insert(container.id.clone(), container);
    }

    /// Live replica count (everything not terminated).
    pub fn replica_count(&self) -> i32 {
        (self.containers.len() - self.bucket(ContainerStatus::Terminated).len()) as i32
    }

    /// The pending container after `cursor` in id order, wrapping to the
    /// first. `None` when nothing is pending.
    pub fn next_pending_after(&self, cursor: &str) -> Option<ContainerId> {
        let pending = self.bucket(ContainerStatus::Pending);
        pending
            .range::<str, _>((Bound::Excluded(cursor), Bound::Unbounded))
            .next()
            .or_else(|| pending.iter().next())
            .cloned()
    }

    /// True once every container has terminated (a group with no
    /// containers qualifies).
    pub fn all_terminated(&self) -> bool {
        self.containers.len() == self.bucket(ContainerStatus::Terminated).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_group() -> ContainerGroup {
        let require = Arc::new(Requirement::default());
        ContainerGroup::new(
            "job_t".into(),
            "t".into(),
            "user".into(),
            Priority::Service,
            ContainerManifest::default(),
            require,
            1000,
        )
    }

    fn add_pending(group: &mut ContainerGroup, offset: i32) -> ContainerId {
        let id = format!("{}.pod_{offset}", group.id);
        let container = Container::new(
            id.clone(),
            group.id.clone(),
            group.priority,
            Arc::clone(&group.require),
        );
        group.install(container);
        id
    }

    #[test]
    fn install_places_in_pending_bucket() {
        let mut group = test_group();
        let id = add_pending(&mut group, 0);
        assert!(group.bucket(ContainerStatus::Pending).contains(&id));
        assert_eq!(group.replica_count(), 1);
    }

    #[test]
    fn move_bucket_keeps_sigma_state() {
        let mut group = test_group();
        let id = add_pending(&mut group, 0);
        group.move_bucket(&id, ContainerStatus::Pending, ContainerStatus::Allocating);
        assert!(!group.bucket(ContainerStatus::Pending).contains(&id));
        assert!(group.bucket(ContainerStatus::Allocating).contains(&id));
        let total: usize = ContainerStatus::ALL.iter().map(|s| group.bucket(*s).len()).sum();
        assert_eq!(total, group.containers.len());
    }

    #[test]
    fn replica_excludes_terminated() {
        let mut group = test_group();
        let a = add_pending(&mut group, 0);
        add_pending(&mut group, 1);
        group.move_bucket(&a, ContainerStatus::Pending, ContainerStatus::Terminated);
        if let Some(c) = group.containers.get_mut(&a) {
            c.status = ContainerStatus::Terminated;
        }
        assert_eq!(group.replica_count(), 1);
        assert!(!group.all_terminated());
    }

    #[test]
    fn pending_cursor_wraps() {
        let mut group = test_group();
        let a = add_pending(&mut group, 0);
        let b = add_pending(&mut group, 1);

        assert_eq!(group.next_pending_after(""), Some(a.clone()));
        assert_eq!(group.next_pending_after(&a), Some(b.clone()));
        // Past the last id, wrap to the first.
        assert_eq!(group.next_pending_after(&b), Some(a));
    }

    #[test]
    fn no_pending_returns_none() {
        let group = test_group();
        assert_eq!(group.next_pending_after(""), None);
    }

    #[test]
    fn reinstall_replaces_bucket_entry() {
        let mut group = test_group();
        let id = add_pending(&mut group, 0);
        let mut replacement = Container::new(
            id.clone(),
            group.id.clone(),
            group.priority,
            Arc::clone(&group.require),
        );
        replacement.status = ContainerStatus::Ready;
        group.install(replacement);
        assert!(!group.bucket(ContainerStatus::Pending).contains(&id));
        assert!(group.bucket(ContainerStatus::Ready).contains(&id));
        assert_eq!(group.containers.len(), 1);
    }
}
