//! Non-Windows fallback: every call reports `Unsupported`, never panics.
//!
//! Keeps the orchestrator, rule engine, and config layers buildable and
//! testable off-Windows.

use super::{GroupHandle, NativeCpuRate, NativeHandle, OsFacade, PrivilegeReport, ServiceState};
use crate::error::{OsError, OsResult};
use crate::types::{IoPriority, PagePriority, PriorityClass, ProcessId, ThreadId};

#[derive(Debug, Default)]
pub struct StubFacade;

impl StubFacade {
    pub fn new() -> Self {
        StubFacade
    }

    fn unsupported<T>() -> OsResult<T> {
        Err(OsError::Unsupported("this platform has no OS facade implementation".to_string()))
    }
}

impl OsFacade for StubFacade {
    fn bootstrap_privileges(&self) -> PrivilegeReport {
        PrivilegeReport::default()
    }

    fn open_process(&self, _pid: ProcessId) -> OsResult<NativeHandle> {
        Self::unsupported()
    }

    fn open_thread(&self, _tid: ThreadId) -> OsResult<NativeHandle> {
        Self::unsupported()
    }

    fn close_handle(&self, _handle: NativeHandle) {}

    fn set_priority_class(&self, _handle: &NativeHandle, _class: PriorityClass) -> OsResult<()> {
        Self::unsupported()
    }

    fn set_priority_boost_disabled(&self, _handle: &NativeHandle, _disabled: bool) -> OsResult<()> {
        Self::unsupported()
    }

    fn set_page_priority(&self, _handle: &NativeHandle, _priority: PagePriority) -> OsResult<()> {
        Self::unsupported()
    }

    fn trim_working_set(&self, _handle: &NativeHandle) -> OsResult<()> {
        Self::unsupported()
    }

    fn set_process_affinity(&self, _handle: &NativeHandle, _mask: u64) -> OsResult<()> {
        Self::unsupported()
    }

    fn process_affinity(&self, _handle: &NativeHandle) -> OsResult<u64> {
        Self::unsupported()
    }

    fn set_io_priority(&self, _handle: &NativeHandle, _priority: IoPriority) -> OsResult<()> {
        Self::unsupported()
    }

    fn set_efficiency_mode(&self, _handle: &NativeHandle, _enabled: bool) -> OsResult<()> {
        Self::unsupported()
    }

    fn set_thread_io_priority(&self, _handle: &NativeHandle, _priority: IoPriority) -> OsResult<()> {
        Self::unsupported()
    }

    fn suspend_process(&self, _handle: &NativeHandle) -> OsResult<()> {
        Self::unsupported()
    }

    fn resume_process(&self, _handle: &NativeHandle) -> OsResult<()> {
        Self::unsupported()
    }

    fn set_power_throttling(&self, _handle: &NativeHandle, _enabled: bool) -> OsResult<()> {
        Self::unsupported()
    }

    fn ensure_group(&self, _group_name: &str) -> OsResult<GroupHandle> {
        Self::unsupported()
    }

    fn set_group_cpu_rate(&self, _group: &GroupHandle, _rate: NativeCpuRate) -> OsResult<()> {
        Self::unsupported()
    }

    fn set_group_affinity(&self, _group: &GroupHandle, _mask: u64) -> OsResult<()> {
        Self::unsupported()
    }

    fn assign_to_group(&self, _group: &GroupHandle, _handle: &NativeHandle) -> OsResult<()> {
        Self::unsupported()
    }

    fn close_group(&self, _group: GroupHandle) {}

    fn device_ioctl(&self, _device: &NativeHandle, _code: u32, _input: &[u8], _output: &mut [u8]) -> OsResult<bool> {
        Self::unsupported()
    }

    fn stop_service(&self, _service_name: &str, _timeout: std::time::Duration) -> OsResult<()> {
        Self::unsupported()
    }

    fn start_service(&self, _service_name: &str, _timeout: std::time::Duration) -> OsResult<()> {
        Self::unsupported()
    }

    fn service_state(&self, _service_name: &str) -> OsResult<ServiceState> {
        Ok(ServiceState::Unknown)
    }

    fn set_registry_dword(&self, _key_path: &str, _value_name: &str, _value: u32) -> OsResult<Option<u32>> {
        Self::unsupported()
    }

    fn restore_registry_dword(&self, _key_path: &str, _value_name: &str, _previous: Option<u32>) -> OsResult<()> {
        Self::unsupported()
    }
}
