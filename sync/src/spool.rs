/// File-spool change-notification source.
///
/// The UI shell writes one JSON file per backend change notification into a
/// spool directory; this source watches the directory, parses each record,
/// delivers the ones matching the subscription's watch list, and removes the
/// file.  Records spooled while the daemon was not running are drained on
/// subscribe, oldest file name first.
///
/// Record format:
///   { "entity": "check_in", "scope": "u1", "payload": { ... } }
/// `scope` is the owning user id for user-scoped entities and omitted for
/// campus-wide ones; `payload` is optional and opaque.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};

use crate::entity::{ChangeNotification, EntityKind};
use crate::source::{
    matches_specs, NotificationSource, SourceEvent, Subscription, SubscriptionStatus, WatchSpec,
};

const SPOOL_EXTENSION: &str = "json";

/// One spooled change notification as written by the UI shell.
#[derive(Debug, Deserialize)]
struct SpoolRecord {
    entity: EntityKind,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Parses a spooled record from its JSON body.
fn parse_record(content: &str) -> Result<SpoolRecord> {
    serde_json::from_str(content).context("Failed to parse spool record")
}

/// [`NotificationSource`] backed by a spool directory.
pub struct SpoolSource {
    dir: PathBuf,
}

impl SpoolSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl NotificationSource for SpoolSource {
    fn subscribe(&self, specs: &[WatchSpec], tx: mpsc::Sender<SourceEvent>)
        -> Result<Subscription> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create spool directory: {}", self.dir.display()))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(run_spool(self.dir.clone(), specs.to_vec(), tx, stop_rx));

        Ok(Subscription::new(move || {
            let _ = stop_tx.send(true);
        }))
    }
}

/// Watcher loop: drain the backlog, then deliver each spooled file as it
/// appears until cancelled.
async fn run_spool(
    dir: PathBuf,
    specs: Vec<WatchSpec>,
    tx: mpsc::Sender<SourceEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("[spool] Failed to create watcher: {e}");
            let _ = tx.send(SourceEvent::Status(SubscriptionStatus::Error(e.to_string()))).await;
            return;
        }
    };

    if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        eprintln!("[spool] Failed to watch {}: {e}", dir.display());
        let _ = tx.send(SourceEvent::Status(SubscriptionStatus::Error(e.to_string()))).await;
        return;
    }

    let _ = tx.send(SourceEvent::Status(SubscriptionStatus::Subscribed)).await;

    // Records spooled while nobody was watching.
    drain_backlog(&dir, &specs, &tx).await;

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,

            event = watch_rx.recv() => match event {
                Some(event) => {
                    let is_write = matches!(
                        event.kind,
                        notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                    );
                    if !is_write {
                        continue;
                    }
                    for path in &event.paths {
                        if is_spool_file(path) {
                            deliver_file(path, &specs, &tx).await;
                        }
                    }
                }
                None => break,
            },
        }
    }

    let _ = tx.send(SourceEvent::Status(SubscriptionStatus::Closed)).await;
}

fn is_spool_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SPOOL_EXTENSION)
}

/// Delivers every spooled record already sitting in `dir`, oldest file name
/// first so bursts written by the shell keep their order.
async fn drain_backlog(dir: &Path, specs: &[WatchSpec], tx: &mpsc::Sender<SourceEvent>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("[spool] Failed to read {}: {e}", dir.display());
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| is_spool_file(p))
        .collect();
    paths.sort();

    for path in paths {
        deliver_file(&path, specs, tx).await;
    }
}

/// Parses one spool file, delivers it if the watch list matches, and removes
/// it.  Unmatched and malformed files are removed too so the spool never
/// grows unbounded; an already-deleted file is not an error.
async fn deliver_file(path: &Path, specs: &[WatchSpec], tx: &mpsc::Sender<SourceEvent>) {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            eprintln!("[spool] Failed to read {}: {e}", path.display());
            return;
        }
    };

    match parse_record(&content) {
        Ok(record) => {
            if matches_specs(specs, record.entity, record.scope.as_deref()) {
                let note = ChangeNotification { entity: record.entity, payload: record.payload };
                if tx.send(SourceEvent::Change(note)).await.is_err() {
                    return; // Subscriber gone; leave the file for the next run.
                }
            } else {
                eprintln!("[spool] Skipping unwatched record: {}", path.display());
            }
        }
        Err(e) => eprintln!("[spool] Dropping malformed record {}: {e}", path.display()),
    }

    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            eprintln!("[spool] Failed to remove {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    fn write_record(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    async fn next_change(rx: &mut mpsc::Receiver<SourceEvent>) -> ChangeNotification {
        loop {
            match timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap() {
                SourceEvent::Change(note) => return note,
                SourceEvent::Status(_) => continue,
            }
        }
    }

    // ── parse_record ──────────────────────────────────────────────────────────

    #[test]
    fn parse_record_full_body() {
        let record = parse_record(
            r#"{"entity": "check_in", "scope": "u1", "payload": {"points": 5}}"#,
        )
        .unwrap();
        assert_eq!(record.entity, CheckIn);
        assert_eq!(record.scope.as_deref(), Some("u1"));
        assert_eq!(record.payload["points"], 5);
    }

    #[test]
    fn parse_record_scope_and_payload_are_optional() {
        let record = parse_record(r#"{"entity": "event"}"#).unwrap();
        assert_eq!(record.entity, Event);
        assert!(record.scope.is_none());
        assert!(record.payload.is_null());
    }

    #[test]
    fn parse_record_rejects_unknown_entity() {
        assert!(parse_record(r#"{"entity": "leaderboard"}"#).is_err());
    }

    #[test]
    fn parse_record_rejects_invalid_json() {
        assert!(parse_record("not json ][[[").is_err());
    }

    // ── is_spool_file ─────────────────────────────────────────────────────────

    #[test]
    fn only_json_files_are_spool_files() {
        assert!(is_spool_file(Path::new("/spool/0001.json")));
        assert!(!is_spool_file(Path::new("/spool/0001.json.tmp")));
        assert!(!is_spool_file(Path::new("/spool/readme.txt")));
        assert!(!is_spool_file(Path::new("/spool/noext")));
    }

    // ── backlog drain ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn subscribe_drains_existing_records_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_record(dir.path(), "0002.json", r#"{"entity": "event"}"#);
        write_record(
            dir.path(),
            "0001.json",
            r#"{"entity": "check_in", "scope": "u1"}"#,
        );

        let source = SpoolSource::new(dir.path());
        let (tx, mut rx) = mpsc::channel(16);
        let specs = vec![WatchSpec::scoped(CheckIn, "u1"), WatchSpec::unscoped(Event)];
        let _sub = source.subscribe(&specs, tx).unwrap();

        assert_eq!(next_change(&mut rx).await.entity, CheckIn);
        assert_eq!(next_change(&mut rx).await.entity, Event);
    }

    #[tokio::test]
    async fn drained_records_are_removed_from_the_spool() {
        let dir = tempfile::tempdir().unwrap();
        write_record(dir.path(), "0001.json", r#"{"entity": "event"}"#);

        let source = SpoolSource::new(dir.path());
        let (tx, mut rx) = mpsc::channel(16);
        let _sub = source.subscribe(&[WatchSpec::unscoped(Event)], tx).unwrap();

        next_change(&mut rx).await;
        assert!(!dir.path().join("0001.json").exists());
    }

    #[tokio::test]
    async fn records_for_other_users_are_consumed_but_not_delivered() {
        let dir = tempfile::tempdir().unwrap();
        write_record(
            dir.path(),
            "0001.json",
            r#"{"entity": "check_in", "scope": "u2"}"#,
        );
        write_record(dir.path(), "0002.json", r#"{"entity": "event"}"#);

        let source = SpoolSource::new(dir.path());
        let (tx, mut rx) = mpsc::channel(16);
        let specs = vec![WatchSpec::scoped(CheckIn, "u1"), WatchSpec::unscoped(Event)];
        let _sub = source.subscribe(&specs, tx).unwrap();

        // The u2 check-in is skipped; the event arrives; both files are gone.
        assert_eq!(next_change(&mut rx).await.entity, Event);
        assert!(!dir.path().join("0001.json").exists());
        assert!(!dir.path().join("0002.json").exists());
    }

    #[tokio::test]
    async fn malformed_records_are_dropped_without_delivery() {
        let dir = tempfile::tempdir().unwrap();
        write_record(dir.path(), "0001.json", "not json");
        write_record(dir.path(), "0002.json", r#"{"entity": "event"}"#);

        let source = SpoolSource::new(dir.path());
        let (tx, mut rx) = mpsc::channel(16);
        let _sub = source.subscribe(&[WatchSpec::unscoped(Event)], tx).unwrap();

        assert_eq!(next_change(&mut rx).await.entity, Event);
        assert!(!dir.path().join("0001.json").exists());
    }

    #[tokio::test]
    async fn subscribe_creates_a_missing_spool_directory() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("spool");

        let source = SpoolSource::new(&spool);
        let (tx, _rx) = mpsc::channel(16);
        let _sub = source.subscribe(&[WatchSpec::unscoped(Event)], tx).unwrap();

        assert!(spool.is_dir());
    }
}
