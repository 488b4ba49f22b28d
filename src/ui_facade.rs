//! Thin, thread-safe boundary between an external caller (tray icon,
//! settings window, CLI subcommand) and the orchestrator's shared state.
//! Every operation here is non-blocking — it touches only the
//! already-synchronized `ConfigStore` and `Orchestrator::stats()`, never the
//! OS facade directly.

use std::sync::Arc;

use crate::config::{ConfigStore, Mode, ThermalThresholds};
use crate::error::OptimizerError;
use crate::orchestrator::{Orchestrator, Stats};
use crate::os_facade::OsFacade;

/// Read-only snapshot of the optimizer's current state, handed across the
/// UI boundary in one call rather than several (mirrors `AlertContext`).
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub mode: Mode,
    pub thermal_thresholds: ThermalThresholds,
    pub stats: Stats,
}

/// Thin wrapper exposing exactly the five operations an external UI needs:
/// mode getter/setter, thermal-threshold setter, whitelist/gamelist
/// mutators, and a stats snapshot getter.
pub struct UiFacade<F: OsFacade> {
    config: Arc<ConfigStore>,
    orchestrator: Arc<Orchestrator<F>>,
}

impl<F: OsFacade> UiFacade<F> {
    pub fn new(config: Arc<ConfigStore>, orchestrator: Arc<Orchestrator<F>>) -> Self {
        UiFacade { config, orchestrator }
    }

    pub fn mode(&self) -> Mode {
        self.config.snapshot().last_mode
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), OptimizerError> {
        self.config.set_last_mode(mode)
    }

    pub fn set_thermal_thresholds(&self, thresholds: ThermalThresholds) -> Result<(), OptimizerError> {
        self.config.set_thermal_thresholds(thresholds)
    }

    pub fn add_whitelist(&self, process_name: String) -> Result<(), OptimizerError> {
        self.config.add_whitelist(process_name)
    }

    pub fn remove_whitelist(&self, process_name: &str) -> Result<(), OptimizerError> {
        self.config.remove_whitelist(process_name)
    }

    pub fn add_gamelist(&self, process_name: String) -> Result<(), OptimizerError> {
        self.config.add_gamelist(process_name)
    }

    pub fn remove_gamelist(&self, process_name: &str) -> Result<(), OptimizerError> {
        self.config.remove_gamelist(process_name)
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        let config = self.config.snapshot();
        StatsSnapshot {
            mode: config.last_mode,
            thermal_thresholds: config.thermal_thresholds,
            stats: self.orchestrator.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OsResult;
    use crate::os_facade::{GroupHandle, NativeCpuRate, NativeHandle, PrivilegeReport, RawHandle, ServiceState};
    use crate::types::{IoPriority, PagePriority, PriorityClass};

    /// A facade that answers every call successfully with inert data, just
    /// enough for the orchestrator to construct and sit idle — this module
    /// only exercises the config/stats boundary, never an OS call.
    struct NoopFacade;

    impl OsFacade for NoopFacade {
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
    }

    fn facade_pair(dir: &std::path::Path) -> (Arc<ConfigStore>, Arc<Orchestrator<NoopFacade>>) {
        let config = Arc::new(ConfigStore::load_or_default(dir.join("config.json")).unwrap());
        let orchestrator = Orchestrator::new(Arc::new(NoopFacade), Arc::clone(&config), dir.join("cpu_topology.json"), 0, None);
        (config, orchestrator)
    }

    #[test]
    fn set_mode_is_reflected_in_the_next_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (config, orchestrator) = facade_pair(dir.path());
        let ui = UiFacade::new(config, orchestrator);

        ui.set_mode(Mode::Game).unwrap();
        assert_eq!(ui.mode(), Mode::Game);
        assert_eq!(ui.stats_snapshot().mode, Mode::Game);
    }

    #[test]
    fn whitelist_and_gamelist_mutators_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (config, orchestrator) = facade_pair(dir.path());
        let ui = UiFacade::new(config.clone(), orchestrator);

        ui.add_whitelist("notepad.exe".to_string()).unwrap();
        assert!(config.snapshot().user_whitelist.contains("notepad.exe"));
        ui.remove_whitelist("notepad.exe").unwrap();
        assert!(!config.snapshot().user_whitelist.contains("notepad.exe"));

        ui.add_gamelist("game.exe".to_string()).unwrap();
        assert!(config.snapshot().user_gamelist.contains("game.exe"));
    }

    #[test]
    fn thermal_threshold_setter_updates_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (config, orchestrator) = facade_pair(dir.path());
        let ui = UiFacade::new(config, orchestrator);

        let custom = ThermalThresholds { soft: 70, hard: 85, shutdown: 95 };
        ui.set_thermal_thresholds(custom).unwrap();
        assert_eq!(ui.stats_snapshot().thermal_thresholds, custom);
    }
}
