use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Read-only view of the authenticated session.
///
/// The reconciler only ever needs the current user id, and must be
/// constructible against a stub; it never mutates session state.
pub trait SessionAccessor {
    /// The signed-in user id, or `None` when signed out or expired.
    fn current_user_id(&self) -> Option<String>;
}

/// Session record written by the UI shell on login.  This daemon reads it
/// once at startup and treats it as immutable.
#[derive(Debug, Deserialize, Clone)]
pub struct Session {
    pub user_id: String,
    pub display_name: Option<String>,
    /// RFC 3339 expiry of the access token.  Absent means non-expiring.
    pub expires_at: Option<String>,
}

impl Session {
    /// True when `expires_at` is present and in the past.  An unparseable
    /// expiry counts as expired rather than as a forever-valid session.
    pub fn is_expired(&self) -> bool {
        let Some(raw) = self.expires_at.as_deref() else {
            return false;
        };
        match chrono::DateTime::parse_from_rfc3339(raw) {
            Ok(expiry) => expiry <= chrono::Local::now(),
            Err(e) => {
                eprintln!("[session] Unparseable expires_at '{raw}': {e}");
                true
            }
        }
    }
}

/// Loads the session file at `path`, returning `None` if it does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_session(path: &Path) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file: {}", path.display()))?;
    let session = toml::from_str(&content)
        .with_context(|| format!("Failed to parse session file: {}", path.display()))?;
    Ok(Some(session))
}

/// [`SessionAccessor`] over an optional loaded session.
pub struct FileSession {
    session: Option<Session>,
}

impl FileSession {
    pub fn new(session: Option<Session>) -> Self {
        Self { session }
    }
}

impl SessionAccessor for FileSession {
    fn current_user_id(&self) -> Option<String> {
        let session = self.session.as_ref()?;
        if session.is_expired() {
            eprintln!("[session] Session for '{}' has expired", session.user_id);
            return None;
        }
        Some(session.user_id.clone())
    }
}
