//! Error taxonomy for the optimizer core.
//!
//! Every fallible OS call returns an [`OsError`] classified into one of:
//! `Denied`, `Vanished`, `Unsupported`, `Transient`, `Fatal`, plus
//! `Timeout` and `Config` for the orchestration layer. No operation in
//! this crate uses a blanket catch-all — each failure path is named.

use thiserror::Error;

/// Result of a privileged OS operation.
pub type OsResult<T> = Result<T, OsError>;

/// Classified failure of a single OS-facade call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OsError {
    /// The caller lacks the privilege required for this operation.
    #[error("access denied (pid/tid {0})")]
    Denied(u32),

    /// The target process or thread no longer exists.
    #[error("target vanished (pid/tid {0})")]
    Vanished(u32),

    /// The OS version or build does not support this call.
    #[error("unsupported on this platform: {0}")]
    Unsupported(String),

    /// The call failed for a reason that may clear up on retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Unrecoverable facade failure; callers should surface this upward.
    #[error("fatal OS facade error: {0}")]
    Fatal(String),
}

/// Crate-wide error type for orchestration-level failures that are not a
/// single OS call (config parsing, IOCTL transport setup, rule evaluation).
#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error(transparent)]
    Os(#[from] OsError),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Exit codes per the external-interfaces contract.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const INSUFFICIENT_PRIVILEGES: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
    pub const FATAL_OS_FACADE: i32 = 4;
}
