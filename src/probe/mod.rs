//! System probe: process snapshots, CPU topology, load, and temperature.
//! Owned exclusively by the orchestrator.

pub mod topology;

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sysinfo::{ProcessesToUpdate, System};

use crate::config::ThermalThresholds;
use crate::types::{ProcessId, ProcessRecord, SystemLoad};
pub use topology::CpuTopology;

/// Maximum depth the process-tree walk will descend; reparenting can in
/// principle produce very deep or cyclic shapes, so both a visited set and
/// this cap keep `process_tree` total.
const MAX_TREE_DEPTH: usize = 256;

struct ProcessCache {
    records: Vec<ProcessRecord>,
    taken_at: Instant,
}

pub struct SystemProbe {
    sys: Mutex<System>,
    process_cache: Mutex<Option<ProcessCache>>,
    cache_ttl: Duration,
    topology: Mutex<Option<CpuTopology>>,
    topology_cache_path: std::path::PathBuf,
    battery_manager: Option<battery::Manager>,
}

impl SystemProbe {
    pub fn new(topology_cache_path: std::path::PathBuf) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        SystemProbe {
            sys: Mutex::new(sys),
            process_cache: Mutex::new(None),
            cache_ttl: Duration::from_secs(1),
            topology: Mutex::new(None),
            topology_cache_path,
            battery_manager: battery::Manager::new().ok(),
        }
    }

    /// Enumerates all processes once, building parent/child links. Cached
    /// for `cache_ttl` (~1s) so many lookups within the same orchestrator
    /// tick share one enumeration.
    pub fn snapshot_processes(&self) -> Vec<ProcessRecord> {
        let mut cache = self.process_cache.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = cache.as_ref() {
            if existing.taken_at.elapsed() < self.cache_ttl {
                return existing.records.clone();
            }
        }

        let mut sys = self.sys.lock().unwrap_or_else(|p| p.into_inner());
        sys.refresh_processes(ProcessesToUpdate::All, true);

        let mut children: std::collections::HashMap<ProcessId, Vec<ProcessId>> = std::collections::HashMap::new();
        for (pid, process) in sys.processes() {
            let parent = process.parent().map(|p| p.as_u32()).unwrap_or(0);
            children.entry(parent).or_default().push(pid.as_u32());
        }

        let records: Vec<ProcessRecord> = sys
            .processes()
            .iter()
            .map(|(pid, process)| {
                let pid = pid.as_u32();
                ProcessRecord {
                    pid,
                    name: process.name().to_string_lossy().to_string(),
                    parent_pid: process.parent().map(|p| p.as_u32()).unwrap_or(0),
                    user: process
                        .user_id()
                        .map(|uid| uid.to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                    session_id: process.session_id().map(|s| s.as_u32()).unwrap_or(0),
                    children: children.get(&pid).cloned().unwrap_or_default(),
                }
            })
            .collect();

        *cache = Some(ProcessCache { records: records.clone(), taken_at: Instant::now() });
        records
    }

    /// BFS through the parent→children map built from a fresh snapshot.
    /// Cycle-safe via a visited set; depth-capped to stay total under
    /// arbitrary reparenting shapes.
    pub fn process_tree(&self, root: ProcessId) -> HashSet<ProcessId> {
        let records = self.snapshot_processes();
        let by_pid: std::collections::HashMap<ProcessId, &ProcessRecord> =
            records.iter().map(|r| (r.pid, r)).collect();

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back((root, 0usize));
        visited.insert(root);

        while let Some((pid, depth)) = queue.pop_front() {
            if depth >= MAX_TREE_DEPTH {
                continue;
            }
            let Some(record) = by_pid.get(&pid) else { continue };
            for &child in &record.children {
                if visited.insert(child) {
                    queue.push_back((child, depth + 1));
                }
            }
        }

        visited
    }

    /// Immutable after the first call; persisted to disk keyed by a CPU
    /// fingerprint.
    pub fn cpu_topology(&self) -> CpuTopology {
        let mut guard = self.topology.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(topo) = guard.as_ref() {
            return topo.clone();
        }
        let topo = topology::load_or_detect(&self.topology_cache_path);
        *guard = Some(topo.clone());
        topo
    }

    /// `{cpu%, mem%, disk%}` — cheap, suitable for every tick.
    pub fn system_load(&self) -> SystemLoad {
        let mut sys = self.sys.lock().unwrap_or_else(|p| p.into_inner());
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let cpu_pct = sys.global_cpu_usage();
        let mem_pct = if sys.total_memory() == 0 {
            0.0
        } else {
            (sys.used_memory() as f64 / sys.total_memory() as f64 * 100.0) as f32
        };
        // Disk I/O utilization has no cheap cross-process signal on this
        // facade; approximated as 0 until a proper disk-counters probe is
        // added (out of scope: see the "Out of scope" list).
        let disk_pct = 0.0;

        SystemLoad { cpu_pct, mem_pct, disk_pct }
    }

    /// Available physical memory in MiB.
    pub fn mem_avail_mb(&self) -> u64 {
        let sys = self.sys.lock().unwrap_or_else(|p| p.into_inner());
        sys.available_memory() / (1024 * 1024)
    }

    /// Battery percentage and whether the host has a battery at all. `None`
    /// means "desktop, or no battery sensor available".
    pub fn battery_status(&self) -> Option<(u8, bool)> {
        let manager = self.battery_manager.as_ref()?;
        let mut batteries = manager.batteries().ok()?;
        let battery = batteries.next()?.ok()?;
        let pct = (battery.state_of_charge().value * 100.0).round().clamp(0.0, 100.0) as u8;
        Some((pct, true))
    }

    /// Maximum CPU-package temperature in °C, or `None` if no sensor is
    /// available. The temperature sensor reader itself is an external
    /// collaborator; this reads whatever `sysinfo`
    /// surfaces for it.
    pub fn temperature(&self) -> Option<i32> {
        let components = sysinfo::Components::new_with_refreshed_list();
        components
            .iter()
            .filter_map(|c| c.temperature())
            .fold(None, |max, t| Some(max.map_or(t, |m: f32| m.max(t))))
            .map(|t| t.round() as i32)
    }

    pub fn is_overheating(&self, thresholds: &ThermalThresholds) -> bool {
        self.temperature().map(|t| t >= thresholds.soft).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_tree_includes_root_even_with_no_children() {
        let probe = SystemProbe::new(std::env::temp_dir().join("wo-test-topology.json"));
        let tree = probe.process_tree(u32::MAX);
        assert!(tree.contains(&u32::MAX));
    }

    #[test]
    fn cpu_topology_is_stable_across_calls() {
        let probe = SystemProbe::new(std::env::temp_dir().join("wo-test-topology-2.json"));
        let first = probe.cpu_topology();
        let second = probe.cpu_topology();
        assert_eq!(first, second);
    }
}
