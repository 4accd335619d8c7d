use std::time::Duration;

use quiz_core::model::{TimerState, TimerStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use crate::sessions::SessionHandle;

/// Drives the countdown of a session while its timer is running.
///
/// The expiry callback fires once, on the transition into `expired`. Dropping the
/// controller cancels the background tick.
pub struct TimerController {
    task: Option<JoinHandle<()>>,
}

impl TimerController {
    /// Spawn the tick loop on the current tokio runtime.
    #[must_use]
    pub fn spawn<F>(handle: SessionHandle, tick: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let timer_rx = handle.subscribe_timer();
        let initial = timer_rx.borrow().status();
        let task = tokio::spawn(run(handle, timer_rx, initial, tick, on_expire));
        Self { task: Some(task) }
    }

    /// True once the loop stopped (expired, submitted or shut down).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TimerController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run<F>(
    handle: SessionHandle,
    mut timer_rx: watch::Receiver<TimerState>,
    initial: TimerStatus,
    tick: Duration,
    on_expire: F,
) where
    F: FnOnce() + Send + 'static,
{
    let mut on_expire = Some(on_expire);
    let mut last = initial;

    loop {
        let status = timer_rx.borrow_and_update().status();
        if last != TimerStatus::Expired && status == TimerStatus::Expired {
            if let Some(callback) = on_expire.take() {
                info!("quiz timer expired");
                callback();
            }
        }
        last = status;

        match status {
            TimerStatus::Expired => return,
            TimerStatus::Running => {
                let mut ticker = interval_at(Instant::now() + tick, tick);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            match handle.tick_timer() {
                                Ok(transition) => {
                                    debug!(remaining = handle.timer().remaining_secs(), "timer tick");
                                    if transition.changed() {
                                        break;
                                    }
                                }
                                Err(_) => return,
                            }
                        }
                        changed = timer_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            let running = timer_rx.borrow().is_running();
                            if !running {
                                break;
                            }
                        }
                    }
                }
            }
            TimerStatus::Idle | TimerStatus::Paused => {
                if handle.is_submitted() || timer_rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}
