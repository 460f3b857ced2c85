//! Scheduler configuration.
//!
//! All tunables are passed explicitly — there is no process-wide mutable
//! state. The daemon builds one of these from its CLI flags.

use std::time::Duration;

/// Lowest assignable port on an agent.
pub const MIN_PORT: u16 = 1026;

/// Highest assignable port on an agent.
pub const MAX_PORT: u16 = 9999;

/// Tunables for the scheduler core.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between placement ticks (one agent is visited per tick).
    pub sched_interval: Duration,
    /// Delay between terminated-group garbage collection sweeps.
    pub gc_check_interval: Duration,
    /// Fraction of reported live usage counted towards the reserved
    /// baseline that gates best-effort admission.
    pub reserved_percent: f64,
    /// Maximum batch-priority containers admitted per agent.
    pub max_batch_pods: i32,
    /// Whether stale requirement versions are detected and re-placed
    /// (rolling updates). Disabled only in tests.
    pub check_container_version: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sched_interval: Duration::from_millis(500),
            gc_check_interval: Duration::from_secs(5),
            reserved_percent: 0.8,
            max_batch_pods: 50,
            check_container_version: true,
        }
    }
}

impl SchedulerConfig {
    /// Number of assignable ports per agent.
    pub fn port_total() -> usize {
        (MAX_PORT - MIN_PORT + 1) as usize
    }
}
