//! The cron-second scheduler.
//!
//! A single one-second loop drives every periodic job, reading the
//! offset-corrected clock so all jobs align to exchange time:
//!
//! - every second: conflicting-order cancellation
//! - every 10 seconds (on the tick boundary): candle synthesis + gap fill,
//!   the decision cycle, reconciliation, and a time/connectivity sample
//! - every minute: apply the mean clock offset
//! - every hour: persist the candle partition and transactor state
//!
//! Jobs are guarded: a job whose previous run is still in flight skips the
//! tick instead of overlapping it.

use crate::core::Core;
use model::Moment;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Spawn `future` unless the guard says the previous run is still going.
fn spawn_guarded<F>(guard: &Arc<AtomicBool>, future: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if guard.swap(true, Ordering::SeqCst) {
        debug!("job still running, tick skipped");
        return;
    }
    let guard = guard.clone();
    tokio::spawn(async move {
        future.await;
        guard.store(false, Ordering::SeqCst);
    });
}

/// Sample server time: connectivity probe plus a clock-offset sample.
async fn sample_server_time(core: Arc<Core>) {
    match core.client.server_time().await {
        Ok((server_ms, rtt_ms)) => {
            core.connected.store(true, Ordering::Relaxed);
            // Offset measured against the uncorrected local clock; the
            // server responded roughly mid round trip.
            let local_ms = chrono::Utc::now().timestamp_millis();
            let raw_offset = server_ms + rtt_ms / 2 - local_ms;
            core.clock.record_sample(rtt_ms, raw_offset);
        }
        Err(e) => {
            debug!(error = %e, "time probe failed");
            core.connected.store(false, Ordering::Relaxed);
        }
    }
}

/// Run the scheduler until shutdown.
pub async fn run_scheduler(core: Arc<Core>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let collect_guard = Arc::new(AtomicBool::new(false));
    let decide_guard = Arc::new(AtomicBool::new(false));
    let reconcile_guard = Arc::new(AtomicBool::new(false));
    let conflict_guard = Arc::new(AtomicBool::new(false));
    let probe_guard = Arc::new(AtomicBool::new(false));

    let mut last_tick_moment: Option<Moment> = None;
    let mut last_offset_minute: i64 = -1;
    let mut last_persist_hour: i64 = -1;

    info!("scheduler started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("scheduler stopping");
                    if let Err(e) = core.transactor.save_state() {
                        warn!(error = %e, "final state save failed");
                    }
                    if let Err(e) = core.collector.persist_current_year() {
                        warn!(error = %e, "final partition save failed");
                    }
                    return;
                }
            }

            _ = interval.tick() => {}
        }

        let now = core.clock.now();
        let now_ms = now.timestamp_millis();

        // Every second.
        {
            let core = core.clone();
            spawn_guarded(&conflict_guard, async move {
                core.transactor.cancel_conflicting_orders().await;
            });
        }

        // Every 10 seconds, once per tick moment.
        let tick = Moment::floor(now);
        if Some(tick) != last_tick_moment && now_ms - tick.as_ms() < 2_000 {
            last_tick_moment = Some(tick);

            {
                let core = core.clone();
                spawn_guarded(&probe_guard, async move {
                    sample_server_time(core).await;
                });
            }
            {
                let core = core.clone();
                spawn_guarded(&collect_guard, async move {
                    core.collector.on_tick().await;
                });
            }
            {
                let core = core.clone();
                spawn_guarded(&decide_guard, async move {
                    core.transactor.on_tick().await;
                });
            }
            {
                let core = core.clone();
                spawn_guarded(&reconcile_guard, async move {
                    if let Err(e) = core.transactor.reconcile().await {
                        debug!(error = %e, "reconciliation failed");
                    }
                });
            }
        }

        // Every minute: shift the observable clock by the mean offset.
        let minute = now_ms / 60_000;
        if minute != last_offset_minute {
            last_offset_minute = minute;
            if let Some(offset) = core.clock.apply_mean_offset() {
                debug!(offset_ms = offset, "clock offset applied");
            }
        }

        // Every hour: persistence.
        let hour = now_ms / 3_600_000;
        if hour != last_persist_hour {
            last_persist_hour = hour;
            let core = core.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(e) = core.collector.persist_current_year() {
                    warn!(error = %e, "hourly partition save failed");
                }
                if let Err(e) = core.transactor.save_state() {
                    warn!(error = %e, "hourly state save failed");
                }
            });
        }
    }
}
