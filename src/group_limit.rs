//! Group-Limit Manager: creates and reuses group-limit objects
//! (Windows Job Objects), assigns PIDs, and sets CPU-rate/affinity caps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::OsResult;
use crate::os_facade::{GroupHandle, NativeCpuRate, OsFacade};
use crate::types::ProcessId;

struct ManagedGroup {
    handle: GroupHandle,
    cpu_rate_percent: Option<u8>,
    affinity_mask: Option<u64>,
    members: std::collections::HashSet<ProcessId>,
}

pub struct GroupLimitManager<F: OsFacade> {
    facade: Arc<F>,
    groups: Mutex<HashMap<String, ManagedGroup>>,
}

impl<F: OsFacade> GroupLimitManager<F> {
    pub fn new(facade: Arc<F>) -> Self {
        GroupLimitManager { facade, groups: Mutex::new(HashMap::new()) }
    }

    /// Returns the native group-limit handle for `group_name`, creating it
    /// the first time and reusing it thereafter.
    pub fn ensure(&self, group_name: &str) -> OsResult<()> {
        let mut groups = self.groups.lock().unwrap_or_else(|p| p.into_inner());
        if groups.contains_key(group_name) {
            return Ok(());
        }
        let handle = self.facade.ensure_group(group_name)?;
        groups.insert(
            group_name.to_string(),
            ManagedGroup { handle, cpu_rate_percent: None, affinity_mask: None, members: std::collections::HashSet::new() },
        );
        Ok(())
    }

    /// Installs a proportional CPU-time cap of `percent` (1..=100). The
    /// Win32 Job Object `CpuRate` field is expressed in units of 1/100 of a
    /// percent; that multiplication happens only at this boundary — callers
    /// of this API always deal in whole percent.
    pub fn set_cpu_rate(&self, group_name: &str, percent: u8) -> OsResult<()> {
        self.ensure(group_name)?;
        let mut groups = self.groups.lock().unwrap_or_else(|p| p.into_inner());
        let group = groups.get_mut(group_name).expect("ensure() just inserted this entry");
        let percent = percent.clamp(1, 100);
        self.facade.set_group_cpu_rate(&group.handle, NativeCpuRate(percent as u32 * 100))?;
        group.cpu_rate_percent = Some(percent);
        Ok(())
    }

    pub fn set_affinity(&self, group_name: &str, mask: u64) -> OsResult<()> {
        self.ensure(group_name)?;
        let mut groups = self.groups.lock().unwrap_or_else(|p| p.into_inner());
        let group = groups.get_mut(group_name).expect("ensure() just inserted this entry");
        self.facade.set_group_affinity(&group.handle, mask)?;
        group.affinity_mask = Some(mask);
        Ok(())
    }

    /// Adds `pid` to `group_name`. Per OS Job Object semantics, a process
    /// already assigned to another group keeps the union of both groups'
    /// constraints — this manager does not attempt to remove a process from
    /// a prior group before reassigning.
    pub fn assign(&self, group_name: &str, pid: ProcessId, handle: &crate::os_facade::NativeHandle) -> OsResult<()> {
        self.ensure(group_name)?;
        let mut groups = self.groups.lock().unwrap_or_else(|p| p.into_inner());
        let group = groups.get_mut(group_name).expect("ensure() just inserted this entry");
        self.facade.assign_to_group(&group.handle, handle)?;
        group.members.insert(pid);
        Ok(())
    }

    /// Destroys every group-limit object. Called once at shutdown.
    pub fn shutdown(&self) {
        let mut groups = self.groups.lock().unwrap_or_else(|p| p.into_inner());
        for (_, group) in groups.drain() {
            self.facade.close_group(group.handle);
        }
    }
}
