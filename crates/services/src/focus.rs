use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use quiz_core::model::TimerState;

use crate::error::SessionError;
use crate::sessions::SessionHandle;

/// Visibility and focus events reported by the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusSignal {
    Hidden,
    Visible,
    Blur,
    Focus,
}

impl FocusSignal {
    #[must_use]
    pub fn is_loss(self) -> bool {
        matches!(self, FocusSignal::Hidden | FocusSignal::Blur)
    }
}

/// Turns raw signals into counted focus losses.
///
/// A tab switch usually emits both `hidden` and `blur`; only the first loss after
/// the page was focused counts. Regaining focus re-arms the tracker.
#[derive(Debug, Clone, Default)]
pub struct FocusTracker {
    enabled: bool,
    away: bool,
}

impl FocusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disabling forgets any pending loss, so re-enabling starts focused.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.away = false;
        }
        self.enabled = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true when `signal` is a new loss to count.
    pub fn observe(&mut self, signal: FocusSignal) -> bool {
        if !self.enabled {
            return false;
        }
        if signal.is_loss() {
            let counted = !self.away;
            self.away = true;
            counted
        } else {
            self.away = false;
            false
        }
    }
}

/// Counts focus losses while the quiz timer is running.
///
/// Signals go through [`FocusMonitor::sender`]. Each counted loss is written to the
/// store and reported once through the warning callback. The monitor never pauses
/// the timer.
pub struct FocusMonitor {
    signals: mpsc::UnboundedSender<FocusSignal>,
    task: Option<JoinHandle<()>>,
}

impl FocusMonitor {
    #[must_use]
    pub fn spawn<F>(handle: SessionHandle, on_warning: F) -> Self
    where
        F: FnMut(u32) + Send + 'static,
    {
        let (signals, signals_rx) = mpsc::unbounded_channel();
        let timer_rx = handle.subscribe_timer();
        let task = tokio::spawn(run(handle, signals_rx, timer_rx, on_warning));
        Self {
            signals,
            task: Some(task),
        }
    }

    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<FocusSignal> {
        self.signals.clone()
    }

    /// Forward one signal. Ignored once the monitor stopped.
    pub fn report(&self, signal: FocusSignal) {
        if self.signals.send(signal).is_err() {
            debug!(?signal, "focus monitor stopped, signal dropped");
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for FocusMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run<F>(
    handle: SessionHandle,
    mut signals: mpsc::UnboundedReceiver<FocusSignal>,
    mut timer_rx: watch::Receiver<TimerState>,
    mut on_warning: F,
) where
    F: FnMut(u32) + Send + 'static,
{
    let mut tracker = FocusTracker::new();
    tracker.set_enabled(timer_rx.borrow_and_update().is_running());

    loop {
        tokio::select! {
            changed = timer_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let running = timer_rx.borrow_and_update().is_running();
                if running != tracker.is_enabled() {
                    debug!(enabled = running, "focus monitoring toggled");
                }
                tracker.set_enabled(running);
            }
            signal = signals.recv() => {
                let Some(signal) = signal else { return };
                if !tracker.observe(signal) {
                    continue;
                }
                match handle.record_focus_loss() {
                    Ok(count) => {
                        warn!(count, "quiz lost focus");
                        on_warning(count);
                    }
                    Err(SessionError::Submitted) => return,
                    Err(err) => {
                        warn!(%err, "recording focus loss failed");
                    }
                }
            }
        }
    }
}
