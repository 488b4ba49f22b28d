//! Settings Applicator: applies a batched bundle of per-process
//! tunables atomically against one cached handle.

use std::sync::Arc;

use crate::error::{OsError, OsResult};
use crate::handle_cache::HandleCache;
use crate::os_facade::{NativeHandle, OsFacade};
use crate::types::{ProcessId, SettingsBundle};

/// Per-field outcome of one `apply` call, for counting/logging at the
/// orchestrator level.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: u32,
    pub failed: u32,
}

pub struct SettingsApplicator<F: OsFacade> {
    facade: Arc<F>,
}

impl<F: OsFacade> SettingsApplicator<F> {
    pub fn new(facade: Arc<F>) -> Self {
        SettingsApplicator { facade }
    }

    /// Applies each present field of `bundle` in a fixed order:
    /// priority class → boost → page priority → working-set trim
    /// → affinity → I/O priority → efficiency mode → thread-level I/O
    /// priority. An empty bundle is a no-op and issues no syscalls. A vanished PID aborts early; otherwise individual field failures
    /// are best-effort — they don't short-circuit the rest of the bundle.
    pub fn apply(&self, cache: &HandleCache<F>, pid: ProcessId, bundle: &SettingsBundle) -> OsResult<ApplyReport> {
        if bundle.is_empty() {
            return Ok(ApplyReport::default());
        }

        let Some(report) = cache.with_handle(pid, |handle| self.apply_to_handle(handle, bundle)) else {
            return Err(OsError::Vanished(pid));
        };
        Ok(report)
    }

    fn apply_to_handle(&self, handle: &NativeHandle, bundle: &SettingsBundle) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut record = |result: OsResult<()>| match result {
            Ok(()) => report.applied += 1,
            Err(err) => {
                tracing::debug!(%err, "settings applicator field failed");
                report.failed += 1;
            }
        };

        if let Some(class) = bundle.priority_class {
            record(self.facade.set_priority_class(handle, class));
        }
        if let Some(disabled) = bundle.priority_boost_disabled {
            record(self.facade.set_priority_boost_disabled(handle, disabled));
        }
        if let Some(priority) = bundle.page_priority {
            record(self.facade.set_page_priority(handle, priority));
        }
        if let Some(true) = bundle.working_set_trim {
            record(self.facade.trim_working_set(handle));
        }
        if let Some(mask) = bundle.affinity_mask {
            record(self.facade.set_process_affinity(handle, mask));
        }
        if let Some(priority) = bundle.io_priority {
            record(self.facade.set_io_priority(handle, priority));
        }
        if let Some(enabled) = bundle.efficiency_mode {
            record(self.facade.set_efficiency_mode(handle, enabled));
        }
        if let Some(priority) = bundle.thread_io_priority {
            record(self.facade.set_thread_io_priority(handle, priority));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os_facade::{GroupHandle, NativeCpuRate, PrivilegeReport, RawHandle, ServiceState};
    use crate::types::{IoPriority, PagePriority, PriorityClass};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFacade {
        calls: AtomicUsize,
    }

    impl OsFacade for CountingFacade {
        fn bootstrap_privileges(&self) -> PrivilegeReport {
            PrivilegeReport::default()
        }
        fn open_process(&self, pid: ProcessId) -> OsResult<NativeHandle> {
            Ok(NativeHandle(pid as RawHandle))
        }
        fn open_thread(&self, tid: u32) -> OsResult<NativeHandle> {
            self.open_process(tid)
        }
        fn close_handle(&self, _h: NativeHandle) {}
        fn set_priority_class(&self, _h: &NativeHandle, _c: PriorityClass) -> OsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn set_priority_boost_disabled(&self, _h: &NativeHandle, _d: bool) -> OsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn set_page_priority(&self, _h: &NativeHandle, _p: PagePriority) -> OsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn trim_working_set(&self, _h: &NativeHandle) -> OsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn set_process_affinity(&self, _h: &NativeHandle, _m: u64) -> OsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn process_affinity(&self, _h: &NativeHandle) -> OsResult<u64> {
            Ok(u64::MAX)
        }
        fn set_io_priority(&self, _h: &NativeHandle, _p: IoPriority) -> OsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn set_efficiency_mode(&self, _h: &NativeHandle, _e: bool) -> OsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn set_thread_io_priority(&self, _h: &NativeHandle, _p: IoPriority) -> OsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
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
        fn stop_service(&self, _s: &str, _t: std::time::Duration) -> OsResult<()> {
            Ok(())
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

    #[test]
    fn empty_bundle_issues_no_syscalls() {
        let facade = Arc::new(CountingFacade::default());
        let cache = HandleCache::new(facade.clone(), 10, Box::new(|f, pid| f.open_process(pid)));
        let applicator = SettingsApplicator::new(facade.clone());

        applicator.apply(&cache, 100, &SettingsBundle::default()).unwrap();
        assert_eq!(facade.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn full_bundle_applies_every_present_field() {
        let facade = Arc::new(CountingFacade::default());
        let cache = HandleCache::new(facade.clone(), 10, Box::new(|f, pid| f.open_process(pid)));
        let applicator = SettingsApplicator::new(facade.clone());

        let mut bundle = SettingsBundle::default();
        bundle.priority_class = Some(PriorityClass::High);
        bundle.priority_boost_disabled = Some(true);
        bundle.page_priority = Some(PagePriority::Normal);
        bundle.working_set_trim = Some(true);
        bundle.affinity_mask = Some(0b11);
        bundle.io_priority = Some(IoPriority::High);
        bundle.efficiency_mode = Some(false);
        bundle.thread_io_priority = Some(IoPriority::Normal);

        let report = applicator.apply(&cache, 100, &bundle).unwrap();
        assert_eq!(report.applied, 8);
        assert_eq!(report.failed, 0);
        assert_eq!(facade.calls.load(Ordering::SeqCst), 8);
    }
}
