//! Windows implementation of [`OsFacade`], built on the `windows` crate.
//!
//! Every Win32 failure is classified through [`classify_last_error`] into the
//! crate's own `OsError` kinds rather than surfaced as a raw `HRESULT` —
//! no call raises out of band, and no blanket catch-all masks a specific
//! failure kind.

use std::time::{Duration, Instant};

use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, HANDLE, WIN32_ERROR};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
};
use windows::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JobObjectBasicLimitInformation, JobObjectCpuRateControlInformation,
    SetInformationJobObject, JOBOBJECT_BASIC_LIMIT_INFORMATION, JOBOBJECT_CPU_RATE_CONTROL_INFORMATION,
    JOB_OBJECT_CPU_RATE_CONTROL_ENABLE, JOB_OBJECT_CPU_RATE_CONTROL_HARD_CAP, JOB_OBJECT_LIMIT_AFFINITY,
};
use windows::Win32::System::Power::{SetProcessInformation, PROCESS_POWER_THROTTLING_STATE};
use windows::Win32::System::ProcessStatus::EmptyWorkingSet;
use windows::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegQueryValueExW, RegSetValueExW, HKEY, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE,
    REG_DWORD, REG_OPTION_NON_VOLATILE,
};
use windows::Win32::System::Services::{
    CloseServiceHandle, ControlService, OpenSCManagerW, OpenServiceW, QueryServiceStatus, StartServiceW,
    SC_MANAGER_CONNECT, SERVICE_CONTROL_STOP, SERVICE_QUERY_STATUS, SERVICE_RUNNING, SERVICE_START, SERVICE_STATUS,
    SERVICE_STOP, SERVICE_STOPPED,
};
use windows::Win32::System::Threading::{
    GetCurrentProcess, GetProcessAffinityMask, OpenProcess, OpenThread, ProcessPowerThrottling, ResumeThread,
    SetPriorityClass, SetProcessAffinityMask, SetProcessPriorityBoost, SuspendThread, ABOVE_NORMAL_PRIORITY_CLASS, BELOW_NORMAL_PRIORITY_CLASS,
    HIGH_PRIORITY_CLASS, IDLE_PRIORITY_CLASS, NORMAL_PRIORITY_CLASS, PROCESS_ALL_ACCESS,
    PROCESS_POWER_THROTTLING_EXECUTION_SPEED, PROCESS_POWER_THROTTLING_IGNORE_TIMER_RESOLUTION, PROCESS_QUERY_INFORMATION,
    PROCESS_SET_INFORMATION, PROCESS_SET_LIMITED_INFORMATION, PROCESS_SUSPEND_RESUME, PROCESS_TERMINATE,
    PROCESS_VM_OPERATION, REALTIME_PRIORITY_CLASS, THREAD_ALL_ACCESS,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_SHARE_READ, FILE_SHARE_WRITE, GENERIC_READ, GENERIC_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::IO::DeviceIoControl;
use windows::core::PCWSTR;

use super::{GroupHandle, NativeCpuRate, NativeHandle, OsFacade, PriorityClassMapping, PrivilegeReport, ServiceState};
use crate::error::{OsError, OsResult};
use crate::types::{IoPriority, PagePriority, PriorityClass, ProcessId, ThreadId};

pub struct WindowsFacade;

impl WindowsFacade {
    pub fn new() -> Self {
        WindowsFacade
    }
}

impl Default for WindowsFacade {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a Win32 `GetLastError()` value into the crate's error taxonomy. Any
/// id not recognized falls back to `Transient`, since most Win32 failures
/// that aren't access or lifetime issues are retry-safe.
fn classify_last_error(id: u32, subject: u32) -> OsError {
    match WIN32_ERROR(id) {
        ERROR_ACCESS_DENIED => OsError::Denied(subject),
        e if e.0 == 87 => OsError::Vanished(subject), // ERROR_INVALID_HANDLE after the target exited
        ERROR_INVALID_PARAMETER => OsError::Unsupported(format!("invalid parameter for subject {subject}")),
        _ => OsError::Transient(format!("win32 error {id} for subject {subject}")),
    }
}

fn last_error_for(subject: u32) -> OsError {
    classify_last_error(unsafe { GetLastError() }.0, subject)
}

fn to_native(handle: &NativeHandle) -> HANDLE {
    handle.0
}

impl PriorityClassMapping for WindowsFacade {
    type Native = windows::Win32::System::Threading::PROCESS_CREATION_FLAGS;

    fn to_native(class: PriorityClass) -> Self::Native {
        match class {
            PriorityClass::Realtime => REALTIME_PRIORITY_CLASS,
            PriorityClass::High => HIGH_PRIORITY_CLASS,
            PriorityClass::AboveNormal => ABOVE_NORMAL_PRIORITY_CLASS,
            PriorityClass::Normal => NORMAL_PRIORITY_CLASS,
            PriorityClass::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
            PriorityClass::Idle => IDLE_PRIORITY_CLASS,
        }
    }
}

/// `PROCESS_PAGE_PRIORITY` values per `ntddk.h` / `winternl.h`; not exposed
/// as constants by the `windows` crate, so named here by hand.
mod page_priority_native {
    pub const IDLE: u32 = 0;
    pub const VERY_LOW: u32 = 1;
    pub const LOW: u32 = 2;
    pub const MEDIUM: u32 = 3;
    pub const BELOW_NORMAL: u32 = 4;
    pub const NORMAL: u32 = 5;
}

fn page_priority_to_native(p: PagePriority) -> u32 {
    use page_priority_native::*;
    match p {
        PagePriority::Idle => IDLE,
        PagePriority::VeryLow => VERY_LOW,
        PagePriority::Low => LOW,
        PagePriority::Medium => MEDIUM,
        PagePriority::BelowNormal => BELOW_NORMAL,
        PagePriority::Normal => NORMAL,
        // Windows has no "higher than Normal" page priority; Maximum maps to
        // the highest native value and is expected to never be reclaimed.
        PagePriority::Maximum => NORMAL,
    }
}

/// `IO_PRIORITY_HINT` values (`winnt.h`).
fn io_priority_to_native(p: IoPriority) -> u32 {
    match p {
        IoPriority::VeryLow => 0,
        IoPriority::Low => 1,
        IoPriority::Normal => 2,
        IoPriority::High => 3,
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

impl OsFacade for WindowsFacade {
    fn bootstrap_privileges(&self) -> PrivilegeReport {
        // Privilege enablement goes through AdjustTokenPrivileges on the
        // current process token; each is attempted independently so a
        // missing one (commonly IncreaseBasePriority under a standard
        // account) degrades rather than aborts startup.
        let mut report = PrivilegeReport::default();
        report.debug = enable_privilege("SeDebugPrivilege");
        report.lock_memory = enable_privilege("SeLockMemoryPrivilege");
        report.increase_priority = enable_privilege("SeIncreaseBasePriorityPrivilege");
        report.increase_quota = enable_privilege("SeIncreaseQuotaPrivilege");
        report
    }

    fn open_process(&self, pid: ProcessId) -> OsResult<NativeHandle> {
        let access = PROCESS_ALL_ACCESS;
        let handle = unsafe { OpenProcess(access, false, pid) };
        match handle {
            Ok(h) if !h.is_invalid() => Ok(NativeHandle(h)),
            _ => Err(last_error_for(pid)),
        }
    }

    fn open_thread(&self, tid: ThreadId) -> OsResult<NativeHandle> {
        let handle = unsafe { OpenThread(THREAD_ALL_ACCESS, false, tid) };
        match handle {
            Ok(h) if !h.is_invalid() => Ok(NativeHandle(h)),
            _ => Err(last_error_for(tid)),
        }
    }

    fn close_handle(&self, handle: NativeHandle) {
        unsafe {
            let _ = CloseHandle(handle.0);
        }
    }

    fn set_priority_class(&self, handle: &NativeHandle, class: PriorityClass) -> OsResult<()> {
        let native = WindowsFacade::to_native(class);
        unsafe { SetPriorityClass(to_native(handle), native) }.map_err(|_| last_error_for(0))
    }

    fn set_priority_boost_disabled(&self, handle: &NativeHandle, disabled: bool) -> OsResult<()> {
        unsafe { SetProcessPriorityBoost(to_native(handle), disabled) }.map_err(|_| last_error_for(0))
    }

    fn set_page_priority(&self, handle: &NativeHandle, priority: PagePriority) -> OsResult<()> {
        // PROCESS_INFORMATION_CLASS::ProcessPagePriority is an Nt-layer
        // class without a `windows`-crate ergonomic wrapper; this calls
        // through the Wdk `NtSetInformationProcess` surface enabled by the
        // `Wdk_System_SystemServices` feature.
        let native_priority = page_priority_to_native(priority);
        let status = unsafe {
            windows::Wdk::System::SystemServices::NtSetInformationProcess(
                to_native(handle),
                windows::Wdk::System::Threading::ProcessPagePriority,
                &native_priority as *const _ as *const _,
                std::mem::size_of::<u32>() as u32,
            )
        };
        if status.is_ok() {
            Ok(())
        } else {
            Err(OsError::Transient(format!("NtSetInformationProcess(ProcessPagePriority) status {:?}", status)))
        }
    }

    fn trim_working_set(&self, handle: &NativeHandle) -> OsResult<()> {
        unsafe { EmptyWorkingSet(to_native(handle)) }.map_err(|_| last_error_for(0))
    }

    fn set_process_affinity(&self, handle: &NativeHandle, mask: u64) -> OsResult<()> {
        unsafe { SetProcessAffinityMask(to_native(handle), mask as usize) }.map_err(|_| last_error_for(0))
    }

    fn process_affinity(&self, handle: &NativeHandle) -> OsResult<u64> {
        let mut process_mask: usize = 0;
        let mut system_mask: usize = 0;
        unsafe { GetProcessAffinityMask(to_native(handle), &mut process_mask, &mut system_mask) }
            .map_err(|_| last_error_for(0))?;
        Ok(process_mask as u64)
    }

    fn set_io_priority(&self, handle: &NativeHandle, priority: IoPriority) -> OsResult<()> {
        let native_priority = io_priority_to_native(priority);
        let status = unsafe {
            windows::Wdk::System::SystemServices::NtSetInformationProcess(
                to_native(handle),
                windows::Wdk::System::Threading::ProcessIoPriority,
                &native_priority as *const _ as *const _,
                std::mem::size_of::<u32>() as u32,
            )
        };
        if status.is_ok() {
            Ok(())
        } else {
            Err(OsError::Transient(format!("NtSetInformationProcess(ProcessIoPriority) status {:?}", status)))
        }
    }

    fn set_efficiency_mode(&self, handle: &NativeHandle, enabled: bool) -> OsResult<()> {
        let mut state = PROCESS_POWER_THROTTLING_STATE::default();
        state.Version = 1;
        state.ControlMask = PROCESS_POWER_THROTTLING_EXECUTION_SPEED;
        state.StateMask = if enabled { PROCESS_POWER_THROTTLING_EXECUTION_SPEED } else { 0 };
        unsafe {
            SetProcessInformation(
                to_native(handle),
                ProcessPowerThrottling,
                &state as *const _ as *const _,
                std::mem::size_of::<PROCESS_POWER_THROTTLING_STATE>() as u32,
            )
        }
        .map_err(|_| last_error_for(0))
    }

    fn set_thread_io_priority(&self, handle: &NativeHandle, priority: IoPriority) -> OsResult<()> {
        let native_priority = io_priority_to_native(priority);
        let status = unsafe {
            windows::Wdk::System::SystemServices::NtSetInformationThread(
                to_native(handle),
                windows::Wdk::System::Threading::ThreadIoPriority,
                &native_priority as *const _ as *const _,
                std::mem::size_of::<u32>() as u32,
            )
        };
        if status.is_ok() {
            Ok(())
        } else {
            Err(OsError::Transient(format!("NtSetInformationThread(ThreadIoPriority) status {:?}", status)))
        }
    }

    fn suspend_process(&self, handle: &NativeHandle) -> OsResult<()> {
        for_each_thread_of(handle, |thread_handle| unsafe {
            SuspendThread(thread_handle);
        })
    }

    fn resume_process(&self, handle: &NativeHandle) -> OsResult<()> {
        for_each_thread_of(handle, |thread_handle| unsafe {
            ResumeThread(thread_handle);
        })
    }

    fn set_power_throttling(&self, handle: &NativeHandle, enabled: bool) -> OsResult<()> {
        let mut state = PROCESS_POWER_THROTTLING_STATE::default();
        state.Version = 1;
        state.ControlMask = PROCESS_POWER_THROTTLING_IGNORE_TIMER_RESOLUTION;
        state.StateMask = if enabled { PROCESS_POWER_THROTTLING_IGNORE_TIMER_RESOLUTION } else { 0 };
        unsafe {
            SetProcessInformation(
                to_native(handle),
                ProcessPowerThrottling,
                &state as *const _ as *const _,
                std::mem::size_of::<PROCESS_POWER_THROTTLING_STATE>() as u32,
            )
        }
        .map_err(|_| last_error_for(0))
    }

    fn ensure_group(&self, group_name: &str) -> OsResult<GroupHandle> {
        let wide_name = wide(group_name);
        let handle = unsafe { CreateJobObjectW(None, PCWSTR(wide_name.as_ptr())) };
        match handle {
            Ok(h) if !h.is_invalid() => Ok(GroupHandle(h)),
            _ => Err(last_error_for(0)),
        }
    }

    fn set_group_cpu_rate(&self, group: &GroupHandle, rate: NativeCpuRate) -> OsResult<()> {
        let mut info = JOBOBJECT_CPU_RATE_CONTROL_INFORMATION::default();
        info.ControlFlags = JOB_OBJECT_CPU_RATE_CONTROL_ENABLE | JOB_OBJECT_CPU_RATE_CONTROL_HARD_CAP;
        info.Anonymous.CpuRate = rate.0;
        unsafe {
            SetInformationJobObject(
                group.0,
                JobObjectCpuRateControlInformation,
                &info as *const _ as *const _,
                std::mem::size_of::<JOBOBJECT_CPU_RATE_CONTROL_INFORMATION>() as u32,
            )
        }
        .map_err(|_| last_error_for(0))
    }

    fn set_group_affinity(&self, group: &GroupHandle, mask: u64) -> OsResult<()> {
        let mut info = JOBOBJECT_BASIC_LIMIT_INFORMATION::default();
        info.LimitFlags = JOB_OBJECT_LIMIT_AFFINITY;
        info.Affinity = mask as usize;
        unsafe {
            SetInformationJobObject(
                group.0,
                JobObjectBasicLimitInformation,
                &info as *const _ as *const _,
                std::mem::size_of::<JOBOBJECT_BASIC_LIMIT_INFORMATION>() as u32,
            )
        }
        .map_err(|_| last_error_for(0))
    }

    fn assign_to_group(&self, group: &GroupHandle, handle: &NativeHandle) -> OsResult<()> {
        unsafe { AssignProcessToJobObject(group.0, to_native(handle)) }.map_err(|_| last_error_for(0))
    }

    fn close_group(&self, group: GroupHandle) {
        unsafe {
            let _ = CloseHandle(group.0);
        }
    }

    fn device_ioctl(&self, device: &NativeHandle, code: u32, input: &[u8], output: &mut [u8]) -> OsResult<bool> {
        let mut bytes_returned: u32 = 0;
        let ok = unsafe {
            DeviceIoControl(
                to_native(device),
                code,
                Some(input.as_ptr() as *const _),
                input.len() as u32,
                Some(output.as_mut_ptr() as *mut _),
                output.len() as u32,
                Some(&mut bytes_returned),
                None,
            )
        };
        match ok {
            Ok(()) => Ok(true),
            Err(_) => Err(last_error_for(code)),
        }
    }

    fn stop_service(&self, service_name: &str, timeout: Duration) -> OsResult<()> {
        with_service_handle(service_name, SERVICE_STOP | SERVICE_QUERY_STATUS, |handle| {
            let mut status = SERVICE_STATUS::default();
            unsafe { ControlService(handle, SERVICE_CONTROL_STOP, &mut status) }.map_err(|_| last_error_for(0))?;
            wait_for_service_state(handle, SERVICE_STOPPED, timeout)
        })
    }

    fn start_service(&self, service_name: &str, timeout: Duration) -> OsResult<()> {
        with_service_handle(service_name, SERVICE_START | SERVICE_QUERY_STATUS, |handle| {
            unsafe { StartServiceW(handle, None) }.map_err(|_| last_error_for(0))?;
            wait_for_service_state(handle, SERVICE_RUNNING, timeout)
        })
    }

    fn service_state(&self, service_name: &str) -> OsResult<ServiceState> {
        with_service_handle(service_name, SERVICE_QUERY_STATUS, |handle| {
            let mut status = SERVICE_STATUS::default();
            unsafe { QueryServiceStatus(handle, &mut status) }.map_err(|_| last_error_for(0))?;
            Ok(match status.dwCurrentState {
                s if s == SERVICE_RUNNING => ServiceState::Running,
                s if s == SERVICE_STOPPED => ServiceState::Stopped,
                _ => ServiceState::Unknown,
            })
        })
    }

    fn set_registry_dword(&self, key_path: &str, value_name: &str, value: u32) -> OsResult<Option<u32>> {
        let key = open_or_create_key(key_path, KEY_READ | KEY_WRITE)?;
        let previous = read_dword(key, value_name);
        let name_wide = wide(value_name);
        let bytes = value.to_le_bytes();
        let result = unsafe { RegSetValueExW(key, PCWSTR(name_wide.as_ptr()), 0, REG_DWORD, Some(&bytes)) };
        unsafe {
            let _ = RegCloseKey(key);
        }
        if result.is_ok() {
            Ok(previous)
        } else {
            Err(classify_last_error(result.0, 0))
        }
    }

    fn restore_registry_dword(&self, key_path: &str, value_name: &str, previous: Option<u32>) -> OsResult<()> {
        match previous {
            Some(value) => self.set_registry_dword(key_path, value_name, value).map(|_| ()),
            None => Ok(()), // the value didn't exist before; leaving it unset is the correct restore.
        }
    }

    fn open_device(&self, device_path: &str) -> OsResult<NativeHandle> {
        let wide_path = wide(device_path);
        let handle = unsafe {
            CreateFileW(
                PCWSTR(wide_path.as_ptr()),
                (GENERIC_READ | GENERIC_WRITE).0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                None,
            )
        };
        match handle {
            Ok(h) if !h.is_invalid() => Ok(NativeHandle(h)),
            _ => Err(last_error_for(0)),
        }
    }
}

fn for_each_thread_of(process_handle: &NativeHandle, mut op: impl FnMut(HANDLE)) -> OsResult<()> {
    let pid = unsafe { windows::Win32::System::Threading::GetProcessId(to_native(process_handle)) };
    if pid == 0 {
        return Err(OsError::Vanished(0));
    }
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0) }.map_err(|_| last_error_for(pid))?;
    let mut entry = THREADENTRY32 { dwSize: std::mem::size_of::<THREADENTRY32>() as u32, ..Default::default() };
    let mut found_any = false;
    unsafe {
        if Thread32First(snapshot, &mut entry).is_ok() {
            loop {
                if entry.th32OwnerProcessID == pid {
                    if let Ok(thread_handle) = OpenThread(THREAD_ALL_ACCESS, false, entry.th32ThreadID) {
                        if !thread_handle.is_invalid() {
                            found_any = true;
                            op(thread_handle);
                            let _ = CloseHandle(thread_handle);
                        }
                    }
                }
                if Thread32Next(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }
        let _ = CloseHandle(snapshot);
    }
    if found_any {
        Ok(())
    } else {
        Err(OsError::Vanished(pid))
    }
}

fn with_service_handle<T>(service_name: &str, access: u32, op: impl FnOnce(windows::Win32::System::Services::SC_HANDLE) -> OsResult<T>) -> OsResult<T> {
    let scm = unsafe { OpenSCManagerW(None, None, SC_MANAGER_CONNECT) }.map_err(|_| last_error_for(0))?;
    let name_wide = wide(service_name);
    let service = unsafe { OpenServiceW(scm, PCWSTR(name_wide.as_ptr()), access) };
    let result = match service {
        Ok(h) => {
            let r = op(h);
            unsafe {
                let _ = CloseServiceHandle(h);
            }
            r
        }
        Err(_) => Err(last_error_for(0)),
    };
    unsafe {
        let _ = CloseServiceHandle(scm);
    }
    result
}

fn wait_for_service_state(handle: windows::Win32::System::Services::SC_HANDLE, target: windows::Win32::System::Services::SERVICE_STATUS_CURRENT_STATE, timeout: Duration) -> OsResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let mut status = SERVICE_STATUS::default();
        unsafe { QueryServiceStatus(handle, &mut status) }.map_err(|_| last_error_for(0))?;
        if status.dwCurrentState == target {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(OsError::Transient(format!("service did not reach state {:?} within timeout", target)));
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

fn open_or_create_key(path: &str, access: windows::Win32::System::Registry::REG_SAM_FLAGS) -> OsResult<HKEY> {
    let wide_path = wide(path);
    let mut key = HKEY::default();
    let result = unsafe {
        RegCreateKeyExW(
            HKEY_LOCAL_MACHINE,
            PCWSTR(wide_path.as_ptr()),
            0,
            PCWSTR::null(),
            REG_OPTION_NON_VOLATILE,
            access,
            None,
            &mut key,
            None,
        )
    };
    if result.is_ok() {
        Ok(key)
    } else {
        Err(classify_last_error(result.0, 0))
    }
}

fn read_dword(key: HKEY, value_name: &str) -> Option<u32> {
    let name_wide = wide(value_name);
    let mut data = [0u8; 4];
    let mut size: u32 = data.len() as u32;
    let result = unsafe { RegQueryValueExW(key, PCWSTR(name_wide.as_ptr()), None, None, Some(data.as_mut_ptr()), Some(&mut size)) };
    if result.is_ok() && size == 4 {
        Some(u32::from_le_bytes(data))
    } else {
        None
    }
}

/// Enables a single named privilege on the current process token. Returns
/// `false` on any failure rather than propagating — individual privilege
/// gaps are expected and logged by the caller.
fn enable_privilege(name: &str) -> bool {
    use windows::Win32::Security::{
        AdjustTokenPrivileges, LookupPrivilegeValueW, LUID_AND_ATTRIBUTES, SE_PRIVILEGE_ENABLED, TOKEN_ADJUST_PRIVILEGES,
        TOKEN_PRIVILEGES, TOKEN_QUERY,
    };
    use windows::Win32::System::Threading::OpenProcessToken;

    unsafe {
        let process = GetCurrentProcess();
        let mut token = HANDLE::default();
        if OpenProcessToken(process, TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY, &mut token).is_err() {
            return false;
        }

        let name_wide = wide(name);
        let mut luid = Default::default();
        if LookupPrivilegeValueW(PCWSTR::null(), PCWSTR(name_wide.as_ptr()), &mut luid).is_err() {
            let _ = CloseHandle(token);
            return false;
        }

        let privileges = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES { Luid: luid, Attributes: SE_PRIVILEGE_ENABLED }],
        };

        let ok = AdjustTokenPrivileges(token, false, Some(&privileges), 0, None, None).is_ok();
        let _ = CloseHandle(token);
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_priority_maximum_maps_to_highest_native_value() {
        assert_eq!(page_priority_to_native(PagePriority::Maximum), page_priority_to_native(PagePriority::Normal));
    }

    #[test]
    fn classify_access_denied() {
        let err = classify_last_error(ERROR_ACCESS_DENIED.0, 1234);
        assert_eq!(err, OsError::Denied(1234));
    }
}
