//! Kernel-Mode Transport (optional): install/open/IOCTL-call the
//! co-resident driver, falling back cleanly to user-mode calls on any
//! failure. The driver binary itself is out of scope; this is only
//! the IOCTL contract and the discovery sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::OsResult;
use crate::os_facade::{NativeHandle, OsFacade};
use crate::types::ProcessId;

const DRIVER_SERVICE_NAME: &str = "WorkloadOptimizerDrv";
const DEVICE_PATH: &str = r"\\.\WorkloadOptimizerDrv";

/// Opaque IOCTL codes. Fixed-layout little-endian input/output
/// structures are built and parsed only in this module.
mod ioctl {
    pub const SET_THREAD_PRIORITY: u32 = 0x0001;
    pub const SET_PROCESS_AFFINITY: u32 = 0x0002;
    pub const SET_QUANTUM: u32 = 0x0003;
    pub const FLUSH_TLB: u32 = 0x0004;
    pub const DISABLE_INTERRUPTS: u32 = 0x0005;
}

pub struct KernelTransport<F: OsFacade> {
    facade: Arc<F>,
    device: std::sync::Mutex<Option<NativeHandle>>,
    available: AtomicBool,
    consecutive_failures: std::sync::atomic::AtomicU32,
}

impl<F: OsFacade> KernelTransport<F> {
    /// Discovery: check for a live service with the driver name; if absent,
    /// check for the driver image on disk and install/start it; then open
    /// the device. Any failure along this path sets `available = false`
    /// rather than propagating.
    pub fn discover(facade: Arc<F>, driver_image_path: Option<&std::path::Path>) -> Self {
        let service_ready = Self::try_discover(&facade, driver_image_path);
        let device = if service_ready { facade.open_device(DEVICE_PATH).ok() } else { None };
        let available = device.is_some();
        KernelTransport {
            facade,
            device: std::sync::Mutex::new(device),
            available: AtomicBool::new(available),
            consecutive_failures: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Constructs a transport that reports itself unavailable without
    /// attempting discovery — used where the caller already knows no driver
    /// is present (tests, or an explicit config opt-out).
    pub fn unavailable(facade: Arc<F>) -> Self {
        KernelTransport {
            facade,
            device: std::sync::Mutex::new(None),
            available: AtomicBool::new(false),
            consecutive_failures: std::sync::atomic::AtomicU32::new(0),
        }
    }

    fn try_discover(facade: &Arc<F>, driver_image_path: Option<&std::path::Path>) -> bool {
        use crate::os_facade::ServiceState;

        let already_running = matches!(facade.service_state(DRIVER_SERVICE_NAME), Ok(ServiceState::Running));
        if already_running {
            return true;
        }

        let Some(image_path) = driver_image_path else {
            return false;
        };
        if !image_path.exists() {
            return false;
        }

        facade.start_service(DRIVER_SERVICE_NAME, std::time::Duration::from_secs(10)).is_ok()
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        // Repeated failures mark the transport permanently unavailable for
        // the rest of the process lifetime.
        if failures >= 3 {
            self.available.store(false, Ordering::SeqCst);
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    fn call(&self, code: u32, input: &[u8], output: &mut [u8]) -> OsResult<bool> {
        if !self.is_available() {
            return Ok(false);
        }
        let guard = self.device.lock().unwrap_or_else(|p| p.into_inner());
        let Some(device) = guard.as_ref() else {
            return Ok(false);
        };
        match self.facade.device_ioctl(device, code, input, output) {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    pub fn set_thread_priority(&self, tid: u32, priority: i32) -> OsResult<bool> {
        let mut input = Vec::with_capacity(8);
        input.extend_from_slice(&tid.to_le_bytes());
        input.extend_from_slice(&priority.to_le_bytes());
        self.call(ioctl::SET_THREAD_PRIORITY, &input, &mut [])
    }

    pub fn set_process_affinity(&self, pid: ProcessId, mask: u64) -> OsResult<bool> {
        let mut input = Vec::with_capacity(12);
        input.extend_from_slice(&pid.to_le_bytes());
        input.extend_from_slice(&mask.to_le_bytes());
        self.call(ioctl::SET_PROCESS_AFFINITY, &input, &mut [])
    }

    /// `multiplier` is clamped to the documented `1..=10` range.
    pub fn set_quantum(&self, pid: ProcessId, multiplier: u8) -> OsResult<bool> {
        let multiplier = multiplier.clamp(1, 10) as u32;
        let mut input = Vec::with_capacity(8);
        input.extend_from_slice(&pid.to_le_bytes());
        input.extend_from_slice(&multiplier.to_le_bytes());
        self.call(ioctl::SET_QUANTUM, &input, &mut [])
    }

    pub fn flush_tlb(&self, pid: ProcessId) -> OsResult<bool> {
        self.call(ioctl::FLUSH_TLB, &pid.to_le_bytes(), &mut [])
    }

    /// Extreme-mode only.
    pub fn disable_interrupts(&self, core: u32, disable: bool) -> OsResult<bool> {
        let mut input = Vec::with_capacity(5);
        input.extend_from_slice(&core.to_le_bytes());
        input.push(disable as u8);
        self.call(ioctl::DISABLE_INTERRUPTS, &input, &mut [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os_facade::{GroupHandle, NativeCpuRate, PrivilegeReport, RawHandle, ServiceState};
    use crate::types::{IoPriority, PagePriority, PriorityClass};

    struct AbsentFacade;

    impl OsFacade for AbsentFacade {
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
        fn set_process_affinity(&self, _h: &NativeHandle, _m: u64) -> OsResult<()> {
            Ok(())
        }
        fn process_affinity(&self, _h: &NativeHandle) -> OsResult<u64> {
            Ok(u64::MAX)
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
        fn stop_service(&self, _s: &str, _t: std::time::Duration) -> OsResult<()> {
            Ok(())
        }
        fn start_service(&self, _s: &str, _t: std::time::Duration) -> OsResult<()> {
            Ok(())
        }
        fn service_state(&self, _s: &str) -> OsResult<ServiceState> {
            Ok(ServiceState::Stopped)
        }
        fn set_registry_dword(&self, _k: &str, _v: &str, _val: u32) -> OsResult<Option<u32>> {
            Ok(None)
        }
        fn restore_registry_dword(&self, _k: &str, _v: &str, _p: Option<u32>) -> OsResult<()> {
            Ok(())
        }
    }

    struct PresentFacade;

    impl OsFacade for PresentFacade {
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
        fn set_process_affinity(&self, _h: &NativeHandle, _m: u64) -> OsResult<()> {
            Ok(())
        }
        fn process_affinity(&self, _h: &NativeHandle) -> OsResult<u64> {
            Ok(u64::MAX)
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
        fn open_device(&self, _device_path: &str) -> OsResult<NativeHandle> {
            Ok(NativeHandle(1 as RawHandle))
        }
    }

    #[test]
    fn discovery_without_service_or_image_marks_unavailable() {
        let transport = KernelTransport::discover(Arc::new(AbsentFacade), None);
        assert!(!transport.is_available());
    }

    #[test]
    fn discovery_with_running_service_opens_the_device_and_marks_available() {
        let transport = KernelTransport::discover(Arc::new(PresentFacade), None);
        assert!(transport.is_available());
        assert_eq!(transport.set_quantum(100, 5).unwrap(), true);
    }

    #[test]
    fn calls_on_unavailable_transport_fall_back_silently() {
        let transport = KernelTransport::unavailable(Arc::new(AbsentFacade));
        let result = transport.set_quantum(100, 10);
        assert_eq!(result.unwrap(), false);
    }

    #[test]
    fn quantum_multiplier_is_clamped_to_documented_range() {
        let transport = KernelTransport::unavailable(Arc::new(AbsentFacade));
        // Even though the transport is unavailable (so no real IOCTL is
        // issued), the clamp runs before the availability check short-circuits.
        assert_eq!(transport.set_quantum(100, 255).unwrap(), false);
    }
}
