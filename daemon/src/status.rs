use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current operational state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// No watch session is active.
    Idle,
    /// A watch session is collecting new file paths.
    Watching,
}

/// Runtime status written by the daemon to status.toml in the Dropclip data
/// directory. The settings UI reads this file (read-only) to display daemon
/// state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Current operational state.
    pub state: DaemonState,
    /// Folder being watched, if one is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_folder: Option<String>,
    /// Number of paths collected in the current (or just-ended) session.
    pub collected_count: usize,
    /// Human-readable session status line.
    pub status_message: String,
    /// RFC 3339 timestamp of the most recent clipboard publish, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_copy_timestamp: Option<String>,
    /// Human-readable error message if the daemon hit a non-fatal error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStatus {
    /// Constructs the initial idle status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Idle,
            watch_folder: None,
            collected_count: 0,
            status_message: "Ready".to_string(),
            last_copy_timestamp: None,
            error: None,
        }
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Logs errors to stderr rather than panicking — a status write failure must
/// never crash the daemon.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("[status] Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                eprintln!("[status] Failed to write status file: {e}");
            }
        }
        Err(e) => eprintln!("[status] Failed to serialize status: {e}"),
    }
}
