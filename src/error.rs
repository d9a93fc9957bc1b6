//! The three error kinds the search pipeline can fail with: configuration
//! errors (bad CLI input), setup errors (OpenCL/device/kernel problems), and
//! runtime consistency errors (a kernel hit that fails host validation).

use thiserror::Error;

/// Aborts at startup with a one-line message and exit code 2. Never reached
/// once the search loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base64url character: {0}")]
    InvalidChar(char),
    #[error("--owner must be base64url (no padding)")]
    OwnerNotBase64Url,
    #[error("--owner is not valid base64url")]
    OwnerDecodeFailed,
    #[error("--owner decoded payload is too short (expected friendly address)")]
    OwnerTooShort,
    #[error("--start must contain only base64url characters")]
    StartNotBase64Url,
    #[error("--end must contain only base64url characters")]
    EndNotBase64Url,
    #[error("at least one of --start or --end is required")]
    MissingPattern,
}

/// Aborts before any worker runs. No result file is created or truncated.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no OpenCL devices found")]
    NoDevices,
    #[error("OpenCL error: {0}")]
    Ocl(#[from] ocl::Error),
    #[error("kernel template left unresolved placeholder: {0}")]
    UnresolvedPlaceholder(String),
}

/// Errors that can surface once the search has started. A `Validation`
/// failure is fatal: the stop flag is set, every worker is joined, then the
/// process exits non-zero.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Ocl(#[from] ocl::Error),
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "kernel/host disagreement on hit (iter_idx={iter_idx}, idx={idx}, variant_idx={variant_idx}): {reason}"
    )]
    Validation {
        iter_idx: u32,
        idx: u32,
        variant_idx: u32,
        reason: &'static str,
    },
}
