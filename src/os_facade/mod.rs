//! OS Facade: typed wrappers over every privileged call the core needs.
//!
//! Every operation returns [`crate::error::OsResult`] classified into
//! `Denied` / `Vanished` / `Unsupported` / `Transient` / `Fatal` — no call
//! raises out of band. The real implementation lives in
//! [`windows`] behind `cfg(windows)`; every other target gets [`stub`], which
//! reports `Unsupported` for everything so the orchestration, rule engine,
//! and config layers still compile and run (degraded) off-Windows.

use crate::error::{OsError, OsResult};
use crate::types::{IoPriority, PagePriority, PriorityClass, ProcessId, ThreadId};

#[cfg(windows)]
pub mod windows;
#[cfg(not(windows))]
pub mod stub;

#[cfg(windows)]
pub use self::windows::WindowsFacade as DefaultFacade;
#[cfg(not(windows))]
pub use self::stub::StubFacade as DefaultFacade;

/// Opaque native OS handle. Never copied or compared by callers outside the
/// handle cache — treat as a move-only capability.
#[derive(Debug)]
pub struct NativeHandle(pub(crate) RawHandle);

#[cfg(windows)]
pub(crate) type RawHandle = ::windows::Win32::Foundation::HANDLE;
#[cfg(not(windows))]
pub(crate) type RawHandle = usize;

/// Which privileges the bootstrap sequence attempted, and whether each
/// succeeded. Partial success is logged, not fatal.
#[derive(Debug, Clone, Default)]
pub struct PrivilegeReport {
    pub debug: bool,
    pub lock_memory: bool,
    pub increase_priority: bool,
    pub increase_quota: bool,
}

impl PrivilegeReport {
    pub fn all_granted(&self) -> bool {
        self.debug && self.lock_memory && self.increase_priority && self.increase_quota
    }
}

/// A live group-limit object (Windows: a Job Object). Opaque outside the
/// group-limit manager.
#[derive(Debug)]
pub struct GroupHandle(pub(crate) RawHandle);

/// Native group-limit cap expressed in the transport's own units. The
/// group-limit manager converts the public 1..=100 percent into this at the
/// facade boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCpuRate(pub u32);

/// Typed wrappers over every OS call the core issues. One implementation per
/// platform; the orchestrator is generic over this trait so tests can swap in
/// a fake.
pub trait OsFacade: Send + Sync {
    /// Attempt to enable every startup privilege; never aborts on partial failure.
    fn bootstrap_privileges(&self) -> PrivilegeReport;

    fn open_process(&self, pid: ProcessId) -> OsResult<NativeHandle>;
    fn open_thread(&self, tid: ThreadId) -> OsResult<NativeHandle>;
    fn close_handle(&self, handle: NativeHandle);

    fn set_priority_class(&self, handle: &NativeHandle, class: PriorityClass) -> OsResult<()>;
    fn set_priority_boost_disabled(&self, handle: &NativeHandle, disabled: bool) -> OsResult<()>;
    fn set_page_priority(&self, handle: &NativeHandle, priority: PagePriority) -> OsResult<()>;
    fn trim_working_set(&self, handle: &NativeHandle) -> OsResult<()>;
    fn set_process_affinity(&self, handle: &NativeHandle, mask: u64) -> OsResult<()>;
    /// Reads the process's current affinity mask. Used to snapshot the true
    /// prior value before a mutation that must later be reversed exactly.
    fn process_affinity(&self, handle: &NativeHandle) -> OsResult<u64>;
    fn set_io_priority(&self, handle: &NativeHandle, priority: IoPriority) -> OsResult<()>;
    fn set_efficiency_mode(&self, handle: &NativeHandle, enabled: bool) -> OsResult<()>;
    fn set_thread_io_priority(&self, handle: &NativeHandle, priority: IoPriority) -> OsResult<()>;

    fn suspend_process(&self, handle: &NativeHandle) -> OsResult<()>;
    fn resume_process(&self, handle: &NativeHandle) -> OsResult<()>;

    fn set_power_throttling(&self, handle: &NativeHandle, enabled: bool) -> OsResult<()>;

    /// Create (or open, if already live) a named group-limit object.
    fn ensure_group(&self, group_name: &str) -> OsResult<GroupHandle>;
    fn set_group_cpu_rate(&self, group: &GroupHandle, rate: NativeCpuRate) -> OsResult<()>;
    fn set_group_affinity(&self, group: &GroupHandle, mask: u64) -> OsResult<()>;
    fn assign_to_group(&self, group: &GroupHandle, handle: &NativeHandle) -> OsResult<()>;
    fn close_group(&self, group: GroupHandle);

    /// Opaque device IOCTL call for the optional kernel transport. `input`
    /// and `output` are fixed-layout little-endian buffers; this method
    /// does not interpret them.
    fn device_ioctl(&self, device: &NativeHandle, code: u32, input: &[u8], output: &mut [u8]) -> OsResult<bool>;

    fn stop_service(&self, service_name: &str, timeout: std::time::Duration) -> OsResult<()>;
    fn start_service(&self, service_name: &str, timeout: std::time::Duration) -> OsResult<()>;
    fn service_state(&self, service_name: &str) -> OsResult<ServiceState>;

    fn set_registry_dword(&self, key_path: &str, value_name: &str, value: u32) -> OsResult<Option<u32>>;
    fn restore_registry_dword(&self, key_path: &str, value_name: &str, previous: Option<u32>) -> OsResult<()>;

    /// Opens the kernel-transport device node. Defaults to `Unsupported`
    /// so fakes built before the kernel transport existed, and the stub
    /// facade, don't need to implement a driver they don't have.
    fn open_device(&self, device_path: &str) -> OsResult<NativeHandle> {
        let _ = device_path;
        Err(OsError::Unsupported("no kernel transport device on this facade".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped,
    Unknown,
}

/// Single place mapping the public enum to the platform's native constants.
/// Platform modules implement this for their own native type.
pub trait PriorityClassMapping {
    type Native;
    fn to_native(class: PriorityClass) -> Self::Native;
}
