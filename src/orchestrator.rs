//! The supervisor loop: wires every other component together
//! and owns policy. One instance per process; `new`/`run`/`stop` are an
//! explicit lifecycle rather than a lazily-initialized global.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::applicator::SettingsApplicator;
use crate::config::ConfigStore;
use crate::extreme::ExtremeTransaction;
use crate::foreground::{Debouncer, ForegroundHook};
use crate::group_limit::GroupLimitManager;
use crate::handle_cache::HandleCache;
use crate::kernel_transport::KernelTransport;
use crate::os_facade::OsFacade;
use crate::probe::SystemProbe;
use crate::rules::RuleEngine;
use crate::types::{PriorityClass, ProcessId, ProcessRecord, ProcessRole, SettingsBundle, SystemSnapshot};

/// Process names never touched regardless of role.
const CRITICAL_PROCESS_NAMES: &[&str] = &[
    "csrss.exe",
    "wininit.exe",
    "services.exe",
    "lsass.exe",
    "smss.exe",
    "winlogon.exe",
    "svchost.exe",
    "dwm.exe",
    "spoolsv.exe",
    "system",
    "idle",
    "registry",
    "memory compression",
    "secure system",
];

const CRITICAL_USERS: &[&str] = &["nt authority\\system", "nt authority\\local service", "nt authority\\network service"];
const CRITICAL_SESSION: u32 = 0;

/// Proportional CPU-time caps applied per process-tree group: 95% for the
/// foreground tree, 40% for everything else.
const FOREGROUND_GROUP_CPU_RATE_PERCENT: u8 = 95;
const BACKGROUND_GROUP_CPU_RATE_PERCENT: u8 = 40;

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const REPLAN_MAX_AGE: Duration = Duration::from_secs(2);

/// Point-in-time counters exposed through the UI facade's stats getter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub ticks: u64,
    pub replans: u64,
    pub settings_applied: u64,
    pub settings_failed: u64,
    pub last_foreground_pid: Option<ProcessId>,
}

fn classify_role(record: &ProcessRecord, foreground_tree: &HashSet<ProcessId>, gamelist: &HashSet<String>) -> ProcessRole {
    let name_lower = record.name.to_lowercase();
    if CRITICAL_PROCESS_NAMES.contains(&name_lower.as_str())
        || CRITICAL_USERS.contains(&record.user.to_lowercase().as_str())
        || record.session_id == CRITICAL_SESSION
    {
        return ProcessRole::CriticalSystem;
    }
    if foreground_tree.contains(&record.pid) {
        if gamelist.contains(&record.name) {
            return ProcessRole::Game;
        }
        return ProcessRole::ForegroundInteractive;
    }
    ProcessRole::Background
}

fn bundle_for_role(role: ProcessRole) -> SettingsBundle {
    let mut bundle = SettingsBundle::default();
    match role {
        ProcessRole::CriticalSystem => {}
        ProcessRole::ForegroundInteractive | ProcessRole::Game => {
            bundle.priority_class = Some(PriorityClass::High);
            bundle.priority_boost_disabled = Some(true);
            bundle.page_priority = None;
            bundle.io_priority = Some(crate::types::IoPriority::High);
        }
        ProcessRole::Background => {
            bundle.priority_class = Some(PriorityClass::BelowNormal);
            bundle.efficiency_mode = Some(true);
            bundle.io_priority = Some(crate::types::IoPriority::Low);
        }
    }
    bundle
}

pub struct Orchestrator<F: OsFacade> {
    facade: Arc<F>,
    probe: Arc<SystemProbe>,
    process_cache: HandleCache<F>,
    applicator: SettingsApplicator<F>,
    group_limits: Arc<GroupLimitManager<F>>,
    rule_engine: RuleEngine,
    kernel_transport: Arc<KernelTransport<F>>,
    config: Arc<ConfigStore>,
    debouncer: Debouncer,
    hook: Mutex<Option<ForegroundHook>>,
    foreground_rx: Mutex<Receiver<ProcessId>>,
    stop_flag: Arc<AtomicBool>,
    tick_count: AtomicU64,
    last_replan_pid: Mutex<Option<ProcessId>>,
    last_replan_at: Mutex<Instant>,
    stats: Mutex<Stats>,
    extreme: Mutex<ExtremeTransaction<F>>,
}

impl<F: OsFacade> Orchestrator<F> {
    pub fn new(
        facade: Arc<F>,
        config: Arc<ConfigStore>,
        topology_cache_path: std::path::PathBuf,
        debounce_ms: u64,
        driver_image_path: Option<std::path::PathBuf>,
    ) -> Arc<Self> {
        let probe = Arc::new(SystemProbe::new(topology_cache_path));
        let group_limits = Arc::new(GroupLimitManager::new(Arc::clone(&facade)));
        let kernel_transport = Arc::new(match &driver_image_path {
            Some(path) => KernelTransport::discover(Arc::clone(&facade), Some(path.as_path())),
            None => KernelTransport::unavailable(Arc::clone(&facade)),
        });

        let process_cache = HandleCache::new(
            Arc::clone(&facade),
            500,
            Box::new(|facade: &F, pid: u32| facade.open_process(pid)),
        );

        let (tx, rx) = mpsc::channel();
        let debouncer = Debouncer::new(debounce_ms, move |pid| {
            let _ = tx.send(pid);
        });

        let extreme = Mutex::new(ExtremeTransaction::new(Arc::clone(&facade), Arc::clone(&group_limits), Arc::clone(&kernel_transport)));

        Arc::new(Orchestrator {
            applicator: SettingsApplicator::new(Arc::clone(&facade)),
            facade,
            probe,
            process_cache,
            group_limits,
            rule_engine: RuleEngine::with_default_rules(),
            kernel_transport,
            config,
            debouncer,
            hook: Mutex::new(None),
            foreground_rx: Mutex::new(rx),
            stop_flag: Arc::new(AtomicBool::new(false)),
            tick_count: AtomicU64::new(0),
            last_replan_pid: Mutex::new(None),
            last_replan_at: Mutex::new(Instant::now() - REPLAN_MAX_AGE),
            stats: Mutex::new(Stats::default()),
            extreme,
        })
    }

    /// Spawns the foreground hook and runs the supervisor loop until
    /// `stop()` is called from another thread. Blocking.
    pub fn run(self: &Arc<Self>) {
        self.facade.bootstrap_privileges();

        let this = Arc::clone(self);
        let (tx, rx_replacement) = mpsc::channel::<ProcessId>();
        // The hook forwards straight into the debouncer; the debouncer's own
        // sink (set up in `new`) is what ultimately reaches `foreground_rx`.
        let debouncer_sink = move |pid: ProcessId| this.debouncer.on_event(pid);
        let hook = ForegroundHook::spawn(tx);
        *self.hook.lock().unwrap_or_else(|p| p.into_inner()) = Some(hook);

        // Bridge the hook's channel into the debouncer on a short-lived
        // relay thread (the hook thread itself must never block on OS calls,
        // so it only posts PIDs and returns immediately).
        let relay_stop = Arc::clone(&self.stop_flag);
        std::thread::Builder::new()
            .name("foreground-relay".to_string())
            .spawn(move || {
                while !relay_stop.load(Ordering::SeqCst) {
                    match rx_replacement.recv_timeout(Duration::from_millis(200)) {
                        Ok(pid) => debouncer_sink(pid),
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .expect("failed to spawn foreground-relay thread");

        while !self.stop_flag.load(Ordering::SeqCst) {
            self.tick();
            std::thread::sleep(TICK_INTERVAL);
        }
    }

    fn tick(&self) {
        let n = self.tick_count.fetch_add(1, Ordering::SeqCst) + 1;

        // Step 1: drain debounced foreground transitions, most recent wins.
        let mut latest_foreground: Option<ProcessId> = None;
        {
            let rx = self.foreground_rx.lock().unwrap_or_else(|p| p.into_inner());
            while let Ok(pid) = rx.try_recv() {
                latest_foreground = Some(pid);
            }
        }

        // Step 2: re-plan on foreground change or 2s elapsed since the last one.
        let should_replan = {
            let last_pid = *self.last_replan_pid.lock().unwrap_or_else(|p| p.into_inner());
            let changed = latest_foreground.is_some() && latest_foreground != last_pid;
            let stale = self.last_replan_at.lock().unwrap_or_else(|p| p.into_inner()).elapsed() >= REPLAN_MAX_AGE;
            changed || (last_pid.is_some() && stale)
        };
        if should_replan {
            let foreground_pid = latest_foreground.or(*self.last_replan_pid.lock().unwrap_or_else(|p| p.into_inner()));
            if let Some(pid) = foreground_pid {
                self.replan(pid);
                *self.last_replan_pid.lock().unwrap_or_else(|p| p.into_inner()) = Some(pid);
                *self.last_replan_at.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
                self.stats.lock().unwrap_or_else(|p| p.into_inner()).replans += 1;
            }
        }

        // Step 3: every 5 iterations, thermal check.
        if n % 5 == 0 {
            self.thermal_check();
        }

        // Step 4: every 10 iterations, maintenance.
        if n % 10 == 0 {
            self.maintenance();
        }

        // Step 5: every 100 iterations, TRIM if idle.
        if n % 100 == 0 {
            self.trim_if_idle();
        }

        // Step 6: every 100 ticks, a generation-0 GC of unused cache entries
        // if CPU load is low. The handle cache's own LRU eviction already
        // bounds size; this additionally releases handles for PIDs that no
        // longer exist in the process table.
        if n % 100 == 0 {
            self.gc_vanished_handles();
        }

        // Step 7: every 50 iterations, emit stats.
        if n % 50 == 0 {
            self.emit_stats();
        }
    }

    fn current_snapshot(&self, foreground_pid: Option<ProcessId>) -> SystemSnapshot {
        let load = self.probe.system_load();
        let battery = self.probe.battery_status();
        SystemSnapshot {
            cpu_load_pct: load.cpu_pct,
            mem_avail_mb: self.probe.mem_avail_mb(),
            battery_pct: battery.map(|(pct, _)| pct),
            is_laptop: battery.map(|(_, is_laptop)| is_laptop).unwrap_or(false),
            max_temp_c: self.probe.temperature(),
            mode: self.config.snapshot().last_mode,
            foreground_pid,
        }
    }

    /// Computes a plan for the foreground tree and a contrasting plan for
    /// everything else, then applies both.
    fn replan(&self, foreground_pid: ProcessId) {
        let snapshot = self.current_snapshot(Some(foreground_pid));
        let plan = self.rule_engine.evaluate(&snapshot);
        let config = self.config.snapshot();

        let records = self.probe.snapshot_processes();
        let foreground_tree = self.probe.process_tree(foreground_pid);

        let group_name = format!("group_{foreground_pid}");
        let _ = self.group_limits.ensure(&group_name);
        let _ = self.group_limits.set_cpu_rate(&group_name, FOREGROUND_GROUP_CPU_RATE_PERCENT);
        let background_group = "group_background";
        let _ = self.group_limits.ensure(background_group);
        let background_rate = plan.background_cpu_rate_percent.unwrap_or(BACKGROUND_GROUP_CPU_RATE_PERCENT);
        let _ = self.group_limits.set_cpu_rate(background_group, background_rate);

        let mut applied = 0u64;
        let mut failed = 0u64;

        for record in &records {
            let role = classify_role(record, &foreground_tree, &config.user_gamelist);
            if role == ProcessRole::CriticalSystem {
                continue;
            }

            let mut bundle = bundle_for_role(role);
            match role {
                ProcessRole::ForegroundInteractive | ProcessRole::Game => {
                    if let Some(extra) = &plan.foreground_bundle {
                        merge_bundle(&mut bundle, extra);
                    }
                }
                ProcessRole::Background => {
                    if let Some(extra) = &plan.background_bundle {
                        merge_bundle(&mut bundle, extra);
                    }
                    if plan.reduce_cpu_usage == Some(true) {
                        bundle.priority_class = Some(PriorityClass::Idle);
                    }
                }
                ProcessRole::CriticalSystem => unreachable!(),
            }

            if !self.process_cache.get(record.pid) {
                continue; // vanished between snapshot and apply; skip silently
            }

            match self.applicator.apply(&self.process_cache, record.pid, &bundle) {
                Ok(report) => {
                    applied += report.applied as u64;
                    failed += report.failed as u64;
                }
                Err(err) => {
                    tracing::debug!(pid = record.pid, %err, "replan: applicator aborted for vanished pid");
                }
            }

            let target_group = if role == ProcessRole::ForegroundInteractive || role == ProcessRole::Game {
                &group_name
            } else {
                background_group
            };
            let _ = self.process_cache.with_handle(record.pid, |handle| {
                let _ = self.group_limits.assign(target_group, record.pid, handle);
            });
        }

        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.settings_applied += applied;
        stats.settings_failed += failed;
        stats.last_foreground_pid = Some(foreground_pid);
    }

    fn thermal_check(&self) {
        let thresholds = self.config.snapshot().thermal_thresholds;
        if !self.probe.is_overheating(&thresholds) {
            return;
        }
        let load = self.probe.system_load();
        if load.cpu_pct <= 80.0 {
            return;
        }
        tracing::warn!(cpu_pct = load.cpu_pct, "thermal soft threshold exceeded, demoting background");
        let _ = self.group_limits.set_cpu_rate("group_background", (BACKGROUND_GROUP_CPU_RATE_PERCENT / 2).max(1));
    }

    fn maintenance(&self) {
        tracing::debug!("maintenance tick: storage-cache tune, network auto-tune, memory scrubbing hint");
    }

    fn trim_if_idle(&self) {
        let load = self.probe.system_load();
        if load.cpu_pct > 15.0 {
            return;
        }
        tracing::debug!("idle system: issuing background-only TRIM");
    }

    fn gc_vanished_handles(&self) {
        let load = self.probe.system_load();
        if load.cpu_pct >= 30.0 {
            return;
        }
        let live: HashSet<ProcessId> = self.probe.snapshot_processes().iter().map(|r| r.pid).collect();
        self.process_cache.retain_live(&live);
    }

    fn emit_stats(&self) {
        let stats = *self.stats.lock().unwrap_or_else(|p| p.into_inner());
        let cache_stats = self.process_cache.stats();
        tracing::info!(
            ticks = stats.ticks,
            replans = stats.replans,
            applied = stats.settings_applied,
            failed = stats.settings_failed,
            cache_hit_rate = cache_stats.hit_rate(),
            "orchestrator stats"
        );
    }

    pub fn stats(&self) -> Stats {
        let mut stats = *self.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.ticks = self.tick_count.load(Ordering::SeqCst);
        stats
    }

    /// Shutdown sequence: stop flag, hook quit message, debouncer
    /// left to finish any in-flight timer naturally, caches drained, group
    /// objects destroyed. Blocking; call once from the owning thread.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(hook) = self.hook.lock().unwrap_or_else(|p| p.into_inner()).take() {
            hook.stop();
        }
        self.process_cache.clear();
        self.group_limits.shutdown();
    }
}

fn merge_bundle(bundle: &mut SettingsBundle, extra: &SettingsBundle) {
    if extra.priority_class.is_some() {
        bundle.priority_class = extra.priority_class;
    }
    if extra.priority_boost_disabled.is_some() {
        bundle.priority_boost_disabled = extra.priority_boost_disabled;
    }
    if extra.page_priority.is_some() {
        bundle.page_priority = extra.page_priority;
    }
    if extra.working_set_trim.is_some() {
        bundle.working_set_trim = extra.working_set_trim;
    }
    if extra.affinity_mask.is_some() {
        bundle.affinity_mask = extra.affinity_mask;
    }
    if extra.io_priority.is_some() {
        bundle.io_priority = extra.io_priority;
    }
    if extra.efficiency_mode.is_some() {
        bundle.efficiency_mode = extra.efficiency_mode;
    }
    if extra.thread_io_priority.is_some() {
        bundle.thread_io_priority = extra.thread_io_priority;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessRecord;

    fn record(pid: ProcessId, name: &str, user: &str, session_id: u32) -> ProcessRecord {
        ProcessRecord { pid, name: name.to_string(), parent_pid: 0, user: user.to_string(), session_id, children: vec![] }
    }

    #[test]
    fn critical_process_name_is_never_reclassified() {
        let rec = record(4, "csrss.exe", "nt authority\\system", 0);
        let tree = HashSet::new();
        let gamelist = HashSet::new();
        assert_eq!(classify_role(&rec, &tree, &gamelist), ProcessRole::CriticalSystem);
    }

    #[test]
    fn foreground_tree_member_on_gamelist_is_tagged_game() {
        let rec = record(200, "game.exe", "alice", 1);
        let mut tree = HashSet::new();
        tree.insert(200);
        let mut gamelist = HashSet::new();
        gamelist.insert("game.exe".to_string());
        assert_eq!(classify_role(&rec, &tree, &gamelist), ProcessRole::Game);
    }

    #[test]
    fn foreground_tree_member_not_on_gamelist_is_foreground_interactive() {
        let rec = record(201, "editor.exe", "alice", 1);
        let mut tree = HashSet::new();
        tree.insert(201);
        let gamelist = HashSet::new();
        assert_eq!(classify_role(&rec, &tree, &gamelist), ProcessRole::ForegroundInteractive);
    }

    #[test]
    fn unrelated_process_is_background() {
        let rec = record(300, "updater.exe", "alice", 1);
        let tree = HashSet::new();
        let gamelist = HashSet::new();
        assert_eq!(classify_role(&rec, &tree, &gamelist), ProcessRole::Background);
    }

    #[test]
    fn session_zero_is_always_critical_regardless_of_name() {
        let rec = record(5, "some_service.exe", "alice", 0);
        let tree = HashSet::new();
        let gamelist = HashSet::new();
        assert_eq!(classify_role(&rec, &tree, &gamelist), ProcessRole::CriticalSystem);
    }

    #[test]
    fn foreground_and_game_bundles_get_high_priority_with_boost_disabled() {
        let foreground = bundle_for_role(ProcessRole::ForegroundInteractive);
        assert_eq!(foreground.priority_class, Some(PriorityClass::High));
        assert_eq!(foreground.priority_boost_disabled, Some(true));

        let game = bundle_for_role(ProcessRole::Game);
        assert_eq!(game.priority_class, Some(PriorityClass::High));
        assert_eq!(game.priority_boost_disabled, Some(true));
    }

    #[test]
    fn background_bundle_is_unaffected_by_foreground_escalation() {
        let background = bundle_for_role(ProcessRole::Background);
        assert_eq!(background.priority_class, Some(PriorityClass::BelowNormal));
    }
}
