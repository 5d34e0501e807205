use std::sync::Arc;

use ecocampus_sync::actions::{MarkerActions, RefreshActions};
use ecocampus_sync::session::SessionAccessor;
use ecocampus_sync::{config, paths, reconciler, session, spool, status};

#[tokio::main]
async fn main() {
    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir();
    if let Err(e) = std::fs::create_dir_all(&app_dir) {
        eprintln!("Failed to create app data directory {}: {e}", app_dir.display());
        std::process::exit(1);
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        eprintln!("[config] Error (using defaults): {e}");
        config::SyncConfig::default()
    });

    // ── Session ───────────────────────────────────────────────────────────────
    let session_path = paths::session_file_path();
    let loaded = session::load_session(&session_path).unwrap_or_else(|e| {
        eprintln!("[session] Error (treating as signed out): {e}");
        None
    });
    let session = session::FileSession::new(loaded);

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path();
    let mut current_status = status::SyncStatus::new();
    status::write_status(&status_path, &current_status);

    // ── Reconciler ────────────────────────────────────────────────────────────
    let source = spool::SpoolSource::new(config.spool_dir(&app_dir));
    let actions: Arc<dyn RefreshActions> =
        Arc::new(MarkerActions::new(config.refresh_dir(&app_dir)));

    let mut handle = reconciler::start(
        &session,
        &source,
        actions,
        config.effective_quiet_period(),
    );

    current_status.user_id = session.current_user_id();
    if handle.is_live() {
        current_status.state = status::SyncState::Live;
    } else {
        current_status.state = status::SyncState::Degraded;
        current_status.error = Some("No live subscription; manual refresh only".to_string());
    }
    status::write_status(&status_path, &current_status);

    println!("ecocampus-sync v{} started", env!("CARGO_PKG_VERSION"));

    // Graceful shutdown on Ctrl+C.
    if tokio::signal::ctrl_c().await.is_ok() {
        println!("Shutting down");
    }

    handle.stop().await;
    current_status.state = status::SyncState::Stopped;
    current_status.user_id = None;
    current_status.error = None;
    status::write_status(&status_path, &current_status);
}
