/// Canonical file locations for the EcoCampus sync sidecar.
///
/// Everything lives under one app data directory:
///   - sync.toml     Written by the user/installer, read by the daemon.
///   - session.toml  Written by the UI shell on login, read by the daemon.
///   - status.toml   Written by the daemon, read by the UI shell.
///   - spool/        Change notifications spooled by the UI shell.
///   - refresh/      Refresh markers written by the daemon.
use std::path::PathBuf;

const APP_DIR_NAME: &str = "EcoCampus";
pub const CONFIG_FILE_NAME: &str = "sync.toml";
pub const SESSION_FILE_NAME: &str = "session.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the app data directory.
///
/// `ECOCAMPUS_DATA_DIR` overrides everything; otherwise %APPDATA%\EcoCampus
/// on Windows and $XDG_DATA_HOME/ecocampus (falling back to
/// ~/.local/share/ecocampus) elsewhere.
pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ECOCAMPUS_DATA_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(windows)]
    {
        match std::env::var("APPDATA") {
            Ok(appdata) => PathBuf::from(appdata).join(APP_DIR_NAME),
            Err(_) => PathBuf::from(".").join(APP_DIR_NAME),
        }
    }

    #[cfg(not(windows))]
    {
        let base = match std::env::var("XDG_DATA_HOME") {
            Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
            _ => match std::env::var("HOME") {
                Ok(home) => PathBuf::from(home).join(".local").join("share"),
                Err(_) => PathBuf::from("."),
            },
        };
        base.join(APP_DIR_NAME.to_lowercase())
    }
}

/// Full path to the config file.
pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

/// Full path to the session file.
pub fn session_file_path() -> PathBuf {
    app_data_dir().join(SESSION_FILE_NAME)
}

/// Full path to the status file.
pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}
