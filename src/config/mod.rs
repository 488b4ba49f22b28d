//! Configuration: portable paths plus the JSON-backed settings document.
//!
//! `Config` is the path/IO facade; `Configuration` is the settings
//! document itself — merged over defaults on load, written through on
//! every setter, never read on the orchestrator's hot path.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::error::OptimizerError;

/// Path and environment facade: a set of `pub fn`s resolving well-known
/// files under a per-user data directory, rather than scattering
/// `$HOME`-joins across the crate.
pub struct Config;

impl Config {
    /// Root data directory: `%PROGRAMDATA%\workload-optimizer` on Windows
    /// (service-visible regardless of which user is logged in), falling back
    /// to `$HOME/.workload-optimizer` or the system temp dir.
    pub fn data_dir() -> PathBuf {
        if let Ok(program_data) = std::env::var("PROGRAMDATA") {
            return PathBuf::from(program_data).join("workload-optimizer");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".workload-optimizer");
        }
        std::env::temp_dir().join("workload-optimizer")
    }

    /// `<data_dir>/config.json` — the settings document.
    pub fn config_file_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    /// `<data_dir>/cpu_topology.json` — cached topology, invalidated by CPU fingerprint.
    pub fn topology_cache_path() -> PathBuf {
        Self::data_dir().join("cpu_topology.json")
    }

    /// `<data_dir>/optimizer.log` — persistent log file.
    pub fn log_file_path() -> PathBuf {
        Self::data_dir().join("optimizer.log")
    }

    /// `<data_dir>/WorkloadOptimizerDrv.sys` — the optional co-resident
    /// driver image the kernel-mode transport looks for at startup.
    pub fn driver_image_path() -> PathBuf {
        Self::data_dir().join("WorkloadOptimizerDrv.sys")
    }

    /// Create the data directory if it does not exist.
    pub fn ensure_data_dir() -> std::io::Result<()> {
        std::fs::create_dir_all(Self::data_dir())
    }

    pub fn version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

/// `last_mode` ∈ {normal, ahorro, game, extreme}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Normal,
    Ahorro,
    Game,
    Extreme,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThermalThresholds {
    pub soft: i32,
    pub hard: i32,
    pub shutdown: i32,
}

impl Default for ThermalThresholds {
    fn default() -> Self {
        ThermalThresholds { soft: 80, hard: 90, shutdown: 100 }
    }
}

/// The settings document. Unknown keys on disk are preserved via `extra`
/// (`#[serde(flatten)]`), so a round trip through [`Configuration::load`]
/// and [`Configuration::save`] never drops a key this build doesn't know
/// about; known keys missing from disk are filled from [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub thermal_thresholds: ThermalThresholds,
    pub autostart: bool,
    pub last_mode: Mode,
    pub game_mode_enabled: bool,
    pub ahorro_mode_enabled: bool,
    pub extremo_mode_enabled: bool,
    pub module_manager_enabled: bool,
    pub user_whitelist: HashSet<String>,
    pub user_gamelist: HashSet<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            thermal_thresholds: ThermalThresholds::default(),
            autostart: false,
            last_mode: Mode::Normal,
            game_mode_enabled: false,
            ahorro_mode_enabled: false,
            extremo_mode_enabled: false,
            module_manager_enabled: true,
            user_whitelist: HashSet::new(),
            user_gamelist: HashSet::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Configuration {
    /// Load from `path`, merging over defaults. A missing file is not an
    /// error — it yields the default document. A malformed file is a
    /// `Config` error.
    pub fn load(path: &std::path::Path) -> Result<Self, OptimizerError> {
        if !path.exists() {
            return Ok(Configuration::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let on_disk: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| OptimizerError::Config(format!("malformed config at {}: {e}", path.display())))?;
        let merged = Self::merge_over_defaults(on_disk)?;
        Ok(merged)
    }

    /// Merge a parsed JSON document over the default document: every field
    /// present on disk overrides the default, every field absent keeps the
    /// default (`#[serde(default)]`), and every top-level key this build
    /// doesn't recognize lands in `extra` (`#[serde(flatten)]`) instead of
    /// being dropped.
    fn merge_over_defaults(on_disk: serde_json::Value) -> Result<Self, OptimizerError> {
        let config: Configuration = serde_json::from_value(on_disk)
            .map_err(|e| OptimizerError::Config(format!("config schema error: {e}")))?;
        Ok(config)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), OptimizerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Thread-safe, write-through handle to the on-disk `Configuration`. Setters
/// mutate the in-memory copy and persist immediately; readers never touch
/// disk.
pub struct ConfigStore {
    path: PathBuf,
    inner: Mutex<Configuration>,
}

impl ConfigStore {
    pub fn load_or_default(path: PathBuf) -> Result<Self, OptimizerError> {
        let config = Configuration::load(&path)?;
        Ok(ConfigStore { path, inner: Mutex::new(config) })
    }

    pub fn snapshot(&self) -> Configuration {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Configuration> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `mutate`, then write the document through to disk. Disk errors
    /// are returned but never roll back the in-memory mutation — the core
    /// treats configuration as read-mostly and non-blocking for orchestration
    ///; a failed write is logged by the caller.
    fn mutate_and_save(&self, mutate: impl FnOnce(&mut Configuration)) -> Result<(), OptimizerError> {
        let snapshot = {
            let mut guard = self.lock();
            mutate(&mut guard);
            guard.clone()
        };
        snapshot.save(&self.path)
    }

    pub fn set_thermal_thresholds(&self, thresholds: ThermalThresholds) -> Result<(), OptimizerError> {
        self.mutate_and_save(|c| c.thermal_thresholds = thresholds)
    }

    pub fn set_last_mode(&self, mode: Mode) -> Result<(), OptimizerError> {
        self.mutate_and_save(|c| c.last_mode = mode)
    }

    pub fn add_whitelist(&self, name: String) -> Result<(), OptimizerError> {
        self.mutate_and_save(|c| {
            c.user_whitelist.insert(name);
        })
    }

    pub fn remove_whitelist(&self, name: &str) -> Result<(), OptimizerError> {
        self.mutate_and_save(|c| {
            c.user_whitelist.remove(name);
        })
    }

    pub fn add_gamelist(&self, name: String) -> Result<(), OptimizerError> {
        self.mutate_and_save(|c| {
            c.user_gamelist.insert(name);
        })
    }

    pub fn remove_gamelist(&self, name: &str) -> Result<(), OptimizerError> {
        self.mutate_and_save(|c| {
            c.user_gamelist.remove(name);
        })
    }
}
