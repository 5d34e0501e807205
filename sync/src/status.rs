use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current operational state of the sync daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Subscribed; live updates flow to the refresh markers.
    Live,
    /// Running without a subscription (signed out, or the source could not
    /// be reached); the UI falls back to manual refresh.
    Degraded,
    /// The daemon is not running.
    Stopped,
}

/// Runtime status written by the daemon to status.toml in the app data
/// directory. The UI shell reads this file (read-only) to decide whether to
/// show the live-updates indicator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Current operational state.
    pub state: SyncState,
    /// User the subscription is scoped to, when live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Human-readable message when the daemon is degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncStatus {
    /// Constructs the initial stopped status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: SyncState::Stopped,
            user_id: None,
            error: None,
        }
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Logs errors to stderr rather than panicking; a status write failure must
/// never crash the daemon.
pub fn write_status(path: &Path, status: &SyncStatus) {
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
