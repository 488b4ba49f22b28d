//! Foreground-change event hook: a dedicated thread pumping the
//! OS message loop, forwarding the owning PID of each foreground-window
//! change to the debouncer. Never issues blocking OS calls itself — that
//! would stall the message pump.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::ProcessId;

/// Handle to the running hook thread. Dropping this does not stop the
/// thread; call `stop()` explicitly as part of orchestrator shutdown.
pub struct ForegroundHook {
    stop_flag: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl ForegroundHook {
    /// Spawns the pump thread. `sink` receives the resolved PID for every
    /// foreground-window change; failures to resolve a PID are dropped
    /// silently (a transient race during window teardown), not surfaced.
    pub fn spawn(sink: Sender<ProcessId>) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop_flag = Arc::clone(&stop_flag);

        let join_handle = std::thread::Builder::new()
            .name("foreground-hook".to_string())
            .spawn(move || platform::pump(thread_stop_flag, sink))
            .expect("failed to spawn foreground-hook thread");

        ForegroundHook { stop_flag, join_handle: Some(join_handle) }
    }

    /// Signals the pump to quit and waits for it to join.
    pub fn stop(mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        platform::wake_pump();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(windows)]
mod platform {
    use super::*;
    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetWindowThreadProcessId;
    use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, GetForegroundWindow, GetMessageW, PostThreadMessageW, TranslateMessage, MSG,
        EVENT_SYSTEM_FOREGROUND, WINEVENT_OUTOFCONTEXT, WM_QUIT,
    };

    thread_local! {
        static SINK: std::cell::RefCell<Option<std::sync::mpsc::Sender<ProcessId>>> = std::cell::RefCell::new(None);
    }

    static PUMP_THREAD_ID: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

    pub fn pump(stop_flag: std::sync::Arc<std::sync::atomic::AtomicBool>, sink: std::sync::mpsc::Sender<ProcessId>) {
        PUMP_THREAD_ID.store(unsafe { windows::Win32::System::Threading::GetCurrentThreadId() }, std::sync::atomic::Ordering::SeqCst);
        SINK.with(|s| *s.borrow_mut() = Some(sink));

        let hook = unsafe {
            SetWinEventHook(
                EVENT_SYSTEM_FOREGROUND,
                EVENT_SYSTEM_FOREGROUND,
                None,
                Some(win_event_proc),
                0,
                0,
                WINEVENT_OUTOFCONTEXT,
            )
        };

        let mut msg = MSG::default();
        loop {
            if stop_flag.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }
            let got = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            if !got.as_bool() || msg.message == WM_QUIT {
                break;
            }
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        if !hook.is_invalid() {
            unsafe {
                let _ = UnhookWinEvent(hook);
            }
        }
    }

    pub fn wake_pump() {
        let tid = PUMP_THREAD_ID.load(std::sync::atomic::Ordering::SeqCst);
        if tid != 0 {
            unsafe {
                let _ = PostThreadMessageW(tid, WM_QUIT, WPARAM(0), LPARAM(0));
            }
        }
    }

    unsafe extern "system" fn win_event_proc(
        _hook: HWINEVENTHOOK,
        _event: u32,
        hwnd: HWND,
        _id_object: i32,
        _id_child: i32,
        _event_thread: u32,
        _event_time: u32,
    ) {
        if hwnd.is_invalid() {
            return;
        }
        let mut pid: u32 = 0;
        let _ = GetWindowThreadProcessId(hwnd, Some(&mut pid));
        if pid == 0 {
            return;
        }
        SINK.with(|s| {
            if let Some(sink) = s.borrow().as_ref() {
                let _ = sink.send(pid);
            }
        });
    }

    // Ensure GetForegroundWindow stays linked for an initial-state read the
    // orchestrator performs once at startup (before any hook event fires).
    pub fn current_foreground_pid() -> Option<ProcessId> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.is_invalid() {
            return None;
        }
        let mut pid: u32 = 0;
        unsafe {
            let _ = GetWindowThreadProcessId(hwnd, Some(&mut pid));
        }
        if pid == 0 {
            None
        } else {
            Some(pid)
        }
    }
}

#[cfg(not(windows))]
mod platform {
    use super::*;

    pub fn pump(stop_flag: std::sync::Arc<std::sync::atomic::AtomicBool>, _sink: std::sync::mpsc::Sender<ProcessId>) {
        while !stop_flag.load(std::sync::atomic::Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }

    pub fn wake_pump() {}

    pub fn current_foreground_pid() -> Option<ProcessId> {
        None
    }
}

pub use platform::current_foreground_pid;
