use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Refresh actions invoked when a debounce window closes.
///
/// Both actions are idempotent "re-fetch and re-render" operations owned by
/// the UI shell; the reconciler awaits them but never retries them.
#[async_trait]
pub trait RefreshActions: Send + Sync {
    /// Reloads user-dependent UI: profile, points, check-ins, streak.
    async fn refresh_user(&self) -> Result<()>;
    /// Reloads the campus events list.
    async fn refresh_events(&self) -> Result<()>;
}

pub const USER_MARKER_FILE_NAME: &str = "user.refresh";
pub const EVENTS_MARKER_FILE_NAME: &str = "events.refresh";

/// File-marker [`RefreshActions`] for the sidecar daemon.
///
/// Each refresh touches a per-concern marker file whose body is the RFC 3339
/// time of the refresh.  The UI shell polls the marker directory and
/// re-fetches a concern whenever its marker timestamp moves.
pub struct MarkerActions {
    dir: PathBuf,
}

impl MarkerActions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn touch(&self, file_name: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create marker directory: {}", self.dir.display()))?;
        let path = self.dir.join(file_name);
        let stamp = chrono::Local::now().to_rfc3339();
        std::fs::write(&path, stamp)
            .with_context(|| format!("Failed to write marker file: {}", path.display()))
    }

    pub fn marker_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

#[async_trait]
impl RefreshActions for MarkerActions {
    async fn refresh_user(&self) -> Result<()> {
        self.touch(USER_MARKER_FILE_NAME)
    }

    async fn refresh_events(&self) -> Result<()> {
        self.touch(EVENTS_MARKER_FILE_NAME)
    }
}

/// Reads a marker file's timestamp, if the marker exists and parses.
pub fn read_marker(path: &Path) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let content = std::fs::read_to_string(path).ok()?;
    chrono::DateTime::parse_from_rfc3339(content.trim()).ok()
}
