/// Debounced realtime-to-UI refresh dispatcher.
///
/// Translates the noisy stream of backend change notifications into a
/// low-frequency set of refresh calls: every qualifying notification resets a
/// single shared timer, and when the stream has been quiet for the configured
/// period the most recent notification's classification is flushed to its
/// refresh action.  A burst touching several tables inside one window
/// therefore produces exactly one refresh — the last writer wins, and earlier
/// concerns in the same window are dropped.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::actions::RefreshActions;
use crate::entity::{ChangeNotification, EntityKind, RefreshConcern};
use crate::session::SessionAccessor;
use crate::source::{NotificationSource, SourceEvent, Subscription, WatchSpec};

/// Quiet period between the last notification and the flush.
pub const DEFAULT_QUIET_PERIOD: Duration =
    Duration::from_millis(crate::config::DEFAULT_QUIET_PERIOD_MS);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The fixed watch list: user-scoped entities filtered to `user_id`,
/// campus-wide entities unfiltered.
pub fn watch_list(user_id: &str) -> Vec<WatchSpec> {
    vec![
        WatchSpec::scoped(EntityKind::UserProfile, user_id),
        WatchSpec::scoped(EntityKind::CheckIn, user_id),
        WatchSpec::unscoped(EntityKind::Event),
        WatchSpec::unscoped(EntityKind::Product),
        WatchSpec::scoped(EntityKind::Streak, user_id),
    ]
}

/// Handle to a running (or inert) reconciler.
///
/// Obtained from [`start`]; [`stop`](ReconcilerHandle::stop) cancels any
/// pending flush, tears down the subscription, and waits for the dispatch
/// task to exit.  Stopping twice, or stopping an inert handle, is a no-op.
pub struct ReconcilerHandle {
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    subscription: Option<Subscription>,
}

impl ReconcilerHandle {
    /// A handle with nothing behind it, returned when no subscription could
    /// be established.  All methods are safe no-ops.
    fn inert() -> Self {
        Self { stop_tx: None, task: None, subscription: None }
    }

    /// True while the dispatch task is running.
    pub fn is_live(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops dispatch, then tears down delivery.  The dispatch task is
    /// stopped first so the pending timer can never start a new flush after
    /// teardown; a refresh already in flight runs to completion on its own
    /// task.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

/// Subscribes to the fixed watch list for the session's current user and
/// spawns the dispatch task.
///
/// A signed-out session is a precondition failure, not an error: it is
/// logged and an inert handle is returned, as is a subscription that cannot
/// be established.  Either way the application continues without live
/// updates.
pub fn start(
    session: &dyn SessionAccessor,
    source: &dyn NotificationSource,
    actions: Arc<dyn RefreshActions>,
    quiet_period: Duration,
) -> ReconcilerHandle {
    let Some(user_id) = session.current_user_id() else {
        eprintln!("[sync] No authenticated user; live updates disabled");
        return ReconcilerHandle::inert();
    };

    let (event_tx, event_rx) = mpsc::channel::<SourceEvent>(EVENT_CHANNEL_CAPACITY);
    let subscription = match source.subscribe(&watch_list(&user_id), event_tx) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[sync] Subscription failed; continuing without live updates: {e}");
            return ReconcilerHandle::inert();
        }
    };

    eprintln!("[sync] Subscribed for user '{user_id}'");

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(dispatch(event_rx, actions, quiet_period, stop_rx));

    ReconcilerHandle {
        stop_tx: Some(stop_tx),
        task: Some(task),
        subscription: Some(subscription),
    }
}

/// Dispatch loop: classify notifications, debounce, flush.
///
/// Each flush runs on its own task, so classification and timer resets keep
/// happening while a refresh is in flight: a notification arriving mid-flush
/// times the next window from its own arrival, not from the flush returning,
/// and a slow refresh action cannot stall notification processing or back the
/// channel up.  The in-flight flush itself is never affected by later
/// notifications.
async fn dispatch(
    mut events: mpsc::Receiver<SourceEvent>,
    actions: Arc<dyn RefreshActions>,
    quiet_period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    // Last classification wins.  Every notification — including ones mapping
    // to no refresh action — overwrites this and reschedules the timer.
    let mut pending: Option<EntityKind> = None;
    // Newest flush task; joined on exit so stop() waits for it.
    let mut in_flight: Option<JoinHandle<()>> = None;
    let mut closed = false;
    let timer = sleep_until(far_future());
    tokio::pin!(timer);

    loop {
        tokio::select! {
            // Stop wins over a ready timer so no flush starts during teardown.
            biased;

            _ = stop_rx.changed() => break,

            event = events.recv(), if !closed => match event {
                Some(SourceEvent::Change(note)) => {
                    log_notification(&note);
                    pending = Some(note.entity);
                    timer.as_mut().reset(Instant::now() + quiet_period);
                }
                Some(SourceEvent::Status(status)) => {
                    eprintln!("[sync] Subscription status: {status}");
                }
                None => {
                    // The source dropped the channel.  An already-scheduled
                    // flush still fires at its deadline before exit; only
                    // then does the daemon fall back to manual refresh.
                    if pending.is_none() {
                        break;
                    }
                    closed = true;
                }
            },

            _ = timer.as_mut(), if pending.is_some() => {
                if let Some(kind) = pending.take() {
                    let actions = Arc::clone(&actions);
                    in_flight = Some(tokio::spawn(async move {
                        flush(kind, actions.as_ref()).await;
                    }));
                }
                timer.as_mut().reset(far_future());
                if closed {
                    break;
                }
            }
        }
    }

    if let Some(flush_task) = in_flight.take() {
        let _ = flush_task.await;
    }
}

/// Invokes the refresh action for the surviving classification.  Failures are
/// logged and swallowed; there is no retry and no re-schedule.
async fn flush(kind: EntityKind, actions: &dyn RefreshActions) {
    match kind.concern() {
        Some(RefreshConcern::User) => {
            if let Err(e) = actions.refresh_user().await {
                eprintln!("[sync] refresh_user failed: {e}");
            }
        }
        Some(RefreshConcern::Events) => {
            if let Err(e) = actions.refresh_events().await {
                eprintln!("[sync] refresh_events failed: {e}");
            }
        }
        None => {
            eprintln!("[sync] No refresh action wired for '{kind}'; nothing to flush");
        }
    }
}

fn log_notification(note: &ChangeNotification) {
    match note.entity.concern() {
        Some(concern) => eprintln!("[sync] Change: {} -> {concern}", note.entity),
        None => eprintln!("[sync] Change: {} (unwired)", note.entity),
    }
}

fn far_future() -> Instant {
    // Effectively "timer disarmed"; re-armed on the next notification.
    Instant::now() + Duration::from_secs(86_400 * 365)
}
