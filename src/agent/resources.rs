//! Process resource sampling for envelope metrics and admission checks

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

lazy_static! {
    static ref SAMPLER: Mutex<System> = Mutex::new(System::new());
}

fn current_pid() -> Option<Pid> {
    sysinfo::get_current_pid().ok()
}

/// Resident memory of the current process in bytes. Returns 0 when the
/// process cannot be sampled.
pub fn process_memory_bytes() -> u64 {
    let Some(pid) = current_pid() else {
        return 0;
    };
    let mut system = match SAMPLER.lock() {
        Ok(guard) => guard,
        Err(_) => return 0,
    };
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|p| p.memory()).unwrap_or(0)
}

/// CPU usage of the current process as a percentage of one core. Returns 0.0
/// when the process cannot be sampled.
pub fn process_cpu_percent() -> f32 {
    let Some(pid) = current_pid() else {
        return 0.0;
    };
    let mut system = match SAMPLER.lock() {
        Ok(guard) => guard,
        Err(_) => return 0.0,
    };
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|p| p.cpu_usage()).unwrap_or(0.0)
}

/// Registry-level agent counts for the resource snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCounts {
    /// Registered agents
    pub active: usize,
    /// Requests waiting on an internal queue (always 0: there is none)
    pub queued: usize,
    /// Registered agents currently reporting unhealthy
    pub failed: usize,
}

/// Coarse resource snapshot for admission-control decisions made by callers.
/// Nothing is enforced internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub memory_bytes: u64,
    pub cpu_percent: f32,
    pub agents: AgentCounts,
}
