//! Alert poller and dismissal
//!
//! The poller keeps a near-real-time view of the signed-in user's unresolved
//! alerts: one fetch immediately on start, then one per fixed interval for
//! as long as the identity is valid. Each cycle fetches the active alerts,
//! batch-joins event metadata, commits the result through the staleness
//! guards in [`Dashboard`], signals arrivals through the chime (once per
//! batch, never per alert), and kicks off media resolution for event ids
//! appearing in the active view.
//!
//! Stopping is owned: [`spawn_poller`] hands back a [`PollerHandle`] whose
//! cancellation token deterministically ends the loop and prevents in-flight
//! responses from mutating state. Starting a second poller for the same
//! identity is a caller error.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alerts::reconcile::{distinct_event_ids, join_events};
use crate::alerts::AlertWithEvent;
use crate::backend::AlertsBackend;
use crate::chime::ChimeControl;
use crate::media::{MediaResolver, ObjectStore};

mod state;

pub use state::{Commit, Dashboard, DashboardState};

/// Running poller. Dropping the handle does not stop the task; call
/// [`PollerHandle::stop`] or [`PollerHandle::shutdown`].
pub struct PollerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Clone of the cancellation token, e.g. for a signal handler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request the loop to stop after the current cycle.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    /// Wait until the task finishes (it only finishes once cancelled).
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Start polling alerts for one identity. Resets the dashboard for the new
/// identity (seen-id set and first-load flag), fetches once immediately,
/// then on the fixed interval until cancelled.
pub fn spawn_poller<B, S>(
    backend: Arc<B>,
    media: Arc<MediaResolver<S>>,
    chime: Arc<ChimeControl>,
    dashboard: Dashboard,
    user_id: String,
    interval: Duration,
) -> PollerHandle
where
    B: AlertsBackend + 'static,
    S: ObjectStore + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let generation = dashboard.begin_identity();
        info!(
            "poller: started for user {} (interval {:?})",
            user_id, interval
        );

        let mut seq = 0u64;
        loop {
            seq += 1;
            poll_cycle(
                backend.as_ref(),
                &media,
                &chime,
                &dashboard,
                &user_id,
                generation,
                seq,
                &token,
            )
            .await;

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("poller: stopped for user {}", user_id);
    });

    PollerHandle { cancel, task }
}

/// One poll cycle: fetch alerts, join events, commit, signal arrivals, and
/// start media resolution for event ids not yet probed. Failures surface an
/// error string and leave prior state untouched; the next tick retries on
/// schedule regardless.
#[allow(clippy::too_many_arguments)]
async fn poll_cycle<B, S>(
    backend: &B,
    media: &Arc<MediaResolver<S>>,
    chime: &ChimeControl,
    dashboard: &Dashboard,
    user_id: &str,
    generation: u64,
    seq: u64,
    cancel: &CancellationToken,
) where
    B: AlertsBackend,
    S: ObjectStore + 'static,
{
    let alerts = match backend.active_alerts(user_id).await {
        Ok(alerts) => alerts,
        Err(e) => {
            warn!("poller: alert fetch failed: {}", e);
            if !cancel.is_cancelled() {
                dashboard.commit_failure(generation, seq, format!("Failed to load alerts: {}", e));
            }
            return;
        }
    };

    let event_ids = distinct_event_ids(&alerts);
    let events = if event_ids.is_empty() {
        Vec::new()
    } else {
        match backend.events_by_ids(&event_ids).await {
            Ok(events) => events,
            Err(e) => {
                warn!("poller: event lookup failed: {}", e);
                if !cancel.is_cancelled() {
                    dashboard.commit_failure(
                        generation,
                        seq,
                        format!("Failed to load events: {}", e),
                    );
                }
                return;
            }
        }
    };

    if cancel.is_cancelled() {
        return;
    }

    let joined = join_events(alerts, &events);
    let active_count = joined.len();

    match dashboard.commit_success(generation, seq, joined) {
        Commit::Applied { arrivals } => {
            if arrivals {
                info!("poller: new alerts arrived ({} active)", active_count);
                chime.play();
            }
            for event_id in event_ids {
                if media.needs_resolution(&event_id) {
                    let media = Arc::clone(media);
                    tokio::spawn(async move {
                        media.resolve(&event_id).await;
                    });
                }
            }
        }
        Commit::Stale => {
            debug!(
                "poller: discarded stale result (generation {}, seq {})",
                generation, seq
            );
        }
    }
}

/// Dismiss one alert: remote action plus optimistic removal from the active
/// list. On failure the alert stays and an error string is surfaced. The
/// per-alert busy flag is cleared on every exit path; returns true when the
/// alert was dismissed. Completions carry the generation captured at start,
/// so a dismiss outliving its identity cannot touch the next session.
pub async fn dismiss_alert<B: AlertsBackend>(
    backend: &B,
    dashboard: &Dashboard,
    alert_id: &str,
) -> bool {
    let Some(generation) = dashboard.begin_dismiss(alert_id) else {
        debug!("dismiss: request already outstanding for {}", alert_id);
        return false;
    };

    // No early return between begin_dismiss and finish_dismiss.
    let dismissed = match backend.dismiss_alert(alert_id).await {
        Ok(()) => {
            info!("dismiss: alert {} dismissed", alert_id);
            dashboard.remove_alert(generation, alert_id);
            true
        }
        Err(e) => {
            warn!("dismiss: alert {} failed: {}", alert_id, e);
            dashboard.set_error(generation, format!("Failed to dismiss alert: {}", e));
            false
        }
    };
    dashboard.finish_dismiss(alert_id);

    dismissed
}

/// Fetch the dismissed-alert history (capped), joined with event metadata.
/// Fetched on demand rather than polled; media for these rows resolves only
/// when the caller expands a row.
pub async fn fetch_past_alerts<B: AlertsBackend>(
    backend: &B,
    user_id: &str,
    limit: usize,
) -> Result<Vec<AlertWithEvent>, String> {
    let alerts = backend
        .past_alerts(user_id, limit)
        .await
        .map_err(|e| format!("Failed to load past alerts: {}", e))?;

    let event_ids = distinct_event_ids(&alerts);
    let events = if event_ids.is_empty() {
        Vec::new()
    } else {
        backend
            .events_by_ids(&event_ids)
            .await
            .map_err(|e| format!("Failed to load events: {}", e))?
    };

    Ok(join_events(alerts, &events))
}
