// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use optimizer_core::config::Config;
use optimizer_core::{exit_code, init_tracing, ConfigStore, DefaultFacade, Orchestrator, OsFacade};

#[derive(Parser, Debug)]
#[command(name = "workload-optimizer")]
#[command(about = "Host-resident workload optimizer")]
#[command(long_about = "Re-tunes process scheduling, memory, and I/O parameters around the current foreground process, with an optional reversible Extreme-Latency mode.")]
struct Args {
    /// Verbose output level (use -v, -vv, or -vvv for increasing verbosity)
    #[arg(short = 'v', action = clap::ArgAction::Count, help = "Verbosity level: -v (info), -vv (debug), -vvv (trace)")]
    verbose: u8,

    /// Override the settings document path (defaults to the per-machine data directory)
    #[arg(long = "config")]
    config_path: Option<PathBuf>,

    /// Debounce window for foreground-change events, in milliseconds
    #[arg(long = "debounce-ms", default_value_t = 150)]
    debounce_ms: u64,

    /// Disable the persistent log file and log to stderr only
    #[arg(long = "no-log-file")]
    no_log_file: bool,

    /// Path to the optional co-resident driver image (defaults to the
    /// per-machine data directory; absence just disables the kernel-mode
    /// transport, falling back to user-mode calls)
    #[arg(long = "driver-image")]
    driver_image: Option<PathBuf>,

    /// Never attempt kernel-mode transport discovery, even if a driver image is present
    #[arg(long = "no-kernel-transport")]
    no_kernel_transport: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(err) = Config::ensure_data_dir() {
        eprintln!("failed to create data directory: {err}");
        std::process::exit(exit_code::CONFIG_ERROR);
    }

    let log_path = if args.no_log_file { None } else { Some(Config::log_file_path()) };
    init_tracing(args.verbose, log_path);

    let config_path = args.config_path.unwrap_or_else(Config::config_file_path);
    let config = match ConfigStore::load_or_default(config_path) {
        Ok(config) => Arc::new(config),
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            std::process::exit(exit_code::CONFIG_ERROR);
        }
    };

    let facade = Arc::new(DefaultFacade::new());
    let privileges = facade.bootstrap_privileges();
    if !privileges.all_granted() {
        tracing::warn!(?privileges, "not every startup privilege was granted; continuing in degraded mode");
    }

    let driver_image_path = if args.no_kernel_transport {
        None
    } else {
        Some(args.driver_image.unwrap_or_else(Config::driver_image_path))
    };

    let orchestrator = Orchestrator::new(Arc::clone(&facade), config, Config::topology_cache_path(), args.debounce_ms, driver_image_path);

    let stop_orchestrator = Arc::clone(&orchestrator);
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        stop_orchestrator.stop();
    }) {
        tracing::warn!(%err, "failed to install Ctrl-C handler; Ctrl-C will not cleanly stop the optimizer");
    }

    tracing::info!(version = %Config::version(), "workload optimizer starting");
    orchestrator.run();
    tracing::info!("workload optimizer stopped");
    std::process::exit(exit_code::OK);
}
