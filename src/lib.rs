//! `optimizer_core`: a host-resident workload optimizer for Windows.
//!
//! The crate re-tunes process scheduling, memory, and I/O parameters around
//! the current foreground process, with an optional reversible
//! "Extreme-Latency" mode and an optional best-effort kernel-mode transport.
//! Everything here is generic over [`os_facade::OsFacade`] so the
//! orchestration, rule engine, and applicator logic can be exercised with a
//! fake facade off-Windows; only [`os_facade::windows`] talks to the real
//! Win32 surface.
//!
//! Module map:
//! - [`config`] — settings document and well-known paths.
//! - [`error`] — the `OsError`/`OptimizerError` taxonomy and process exit codes.
//! - [`types`] — shared value types crossing module boundaries.
//! - [`os_facade`] — the privileged-call trait and its Windows/stub implementations.
//! - [`handle_cache`] — bounded LRU cache of native handles.
//! - [`probe`] — process/CPU/thermal/battery snapshots and topology detection.
//! - [`foreground`] — the WinEvent hook and its debouncer.
//! - [`applicator`] — applies a `SettingsBundle` to one cached handle.
//! - [`group_limit`] — Job-Object-backed CPU-rate/affinity groups.
//! - [`rules`] — the dynamic-priority rule engine and its default rules.
//! - [`kernel_transport`] — the optional co-resident driver's IOCTL contract.
//! - [`extreme`] — the reversible Extreme-Latency activation transaction.
//! - [`irq_affinity`] — optional IRQ/RSS steering supplement.
//! - [`worker_pool`] — optional bounded priority pool for fire-and-forget work.
//! - [`orchestrator`] — the supervisor loop wiring everything together.
//! - [`ui_facade`] — the thin boundary an external UI mutates/reads through.
//! - [`logging`] — structured logging setup.

pub mod applicator;
pub mod config;
pub mod error;
pub mod extreme;
pub mod foreground;
pub mod group_limit;
pub mod handle_cache;
pub mod irq_affinity;
pub mod kernel_transport;
pub mod logging;
pub mod orchestrator;
pub mod os_facade;
pub mod probe;
pub mod rules;
pub mod types;
pub mod ui_facade;
pub mod worker_pool;

pub use config::{Config, ConfigStore, Configuration, Mode, ThermalThresholds};
pub use error::{exit_code, OptimizerError, OsError, OsResult};
pub use logging::init_tracing;
pub use orchestrator::{Orchestrator, Stats};
pub use os_facade::{DefaultFacade, OsFacade};
pub use ui_facade::{StatsSnapshot, UiFacade};
