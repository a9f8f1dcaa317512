//! Timer lifecycle for automatic artifact refreshes.
//!
//! At most one trigger is pending at any time. A trigger refreshes only while
//! the shared [`RunFlag`] is raised; once the aggregator lowers it the chain
//! stops until [`PollingController::request_refresh`] is called.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use spira_core::ArtifactAggregator;
use spira_domain::{RunFlag, SettingsProvider};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const WARM_UP_DELAY: Duration = Duration::from_millis(5_000);
pub const MIN_POLL_INTERVAL_MS: i64 = 5_000;

/// Something that can start a refresh cycle without waiting for it.
pub trait RefreshTarget: Send + Sync {
    fn refresh(&self);

    /// Raises the shared run flag and refreshes as one atomic step.
    fn resume_and_refresh(&self);
}

impl RefreshTarget for ArtifactAggregator {
    fn refresh(&self) {
        ArtifactAggregator::refresh(self);
    }

    fn resume_and_refresh(&self) {
        ArtifactAggregator::resume_and_refresh(self);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Scheduled,
}

/// Configured interval in milliseconds; absent counts as disabled.
pub fn configured_interval_ms(settings: &dyn SettingsProvider) -> i64 {
    settings
        .refresh_interval_secs()
        .unwrap_or(0)
        .saturating_mul(1_000)
}

/// Delay until the next trigger, or `None` when rescheduling is disabled.
pub fn effective_poll_interval(configured_ms: i64) -> Option<Duration> {
    if configured_ms <= 0 {
        return None;
    }
    let clamped = configured_ms.max(MIN_POLL_INTERVAL_MS);
    Some(Duration::from_millis(clamped.unsigned_abs()))
}

/// The trigger chain currently owning the schedule. A chain only clears the
/// slot while holding its lock, and only if its generation still matches.
#[derive(Debug, Default)]
struct PendingTrigger {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl PendingTrigger {
    fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Owns the refresh timer. `run_flag` must be the flag the target raises in
/// [`RefreshTarget::resume_and_refresh`].
pub struct PollingController {
    target: Arc<dyn RefreshTarget>,
    settings: Arc<dyn SettingsProvider>,
    run_flag: RunFlag,
    pending: Arc<Mutex<PendingTrigger>>,
}

impl PollingController {
    pub fn new(
        target: Arc<dyn RefreshTarget>,
        settings: Arc<dyn SettingsProvider>,
        run_flag: RunFlag,
    ) -> Self {
        Self {
            target,
            settings,
            run_flag,
            pending: Arc::new(Mutex::new(PendingTrigger::default())),
        }
    }

    pub fn run_flag(&self) -> &RunFlag {
        &self.run_flag
    }

    pub fn state(&self) -> PollerState {
        let pending = self.pending.lock().expect("poller pending trigger lock");
        if pending.is_active() {
            PollerState::Scheduled
        } else {
            PollerState::Idle
        }
    }

    /// Schedules the first trigger after the warm-up delay, regardless of
    /// the configured interval.
    pub fn activate(&self) {
        info!(
            delay_ms = WARM_UP_DELAY.as_millis() as u64,
            "activating artifact polling"
        );
        self.schedule(WARM_UP_DELAY);
    }

    /// Manual refresh: re-enables polling, makes sure a trigger chain is
    /// running and refreshes right away.
    ///
    /// Holds the pending-trigger lock throughout, so a chain deciding to stop
    /// either finishes first and leaves the poller idle, or sees the raised
    /// flag and keeps running.
    pub fn request_refresh(&self) {
        let mut pending = self.pending.lock().expect("poller pending trigger lock");
        self.target.resume_and_refresh();
        if pending.is_active() {
            return;
        }
        match effective_poll_interval(configured_interval_ms(self.settings.as_ref())) {
            Some(delay) => self.schedule_locked(&mut pending, delay),
            None => debug!("automatic refresh disabled by configuration; not scheduling"),
        }
    }

    /// Cancels the pending trigger, if any.
    pub fn stop(&self) {
        let handle = self
            .pending
            .lock()
            .expect("poller pending trigger lock")
            .handle
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("cancelled pending refresh trigger");
        }
    }

    fn schedule(&self, delay: Duration) {
        let mut pending = self.pending.lock().expect("poller pending trigger lock");
        self.schedule_locked(&mut pending, delay);
    }

    fn schedule_locked(&self, pending: &mut PendingTrigger, delay: Duration) {
        if let Some(previous) = pending.handle.take() {
            previous.abort();
        }
        pending.generation = pending.generation.wrapping_add(1);

        let chain = TriggerChain {
            generation: pending.generation,
            target: Arc::clone(&self.target),
            settings: Arc::clone(&self.settings),
            run_flag: self.run_flag.clone(),
            pending: Arc::clone(&self.pending),
        };
        pending.handle = Some(tokio::spawn(chain.run(delay)));
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(handle) = pending.handle.take() {
                handle.abort();
            }
        }
    }
}

struct TriggerChain {
    generation: u64,
    target: Arc<dyn RefreshTarget>,
    settings: Arc<dyn SettingsProvider>,
    run_flag: RunFlag,
    pending: Arc<Mutex<PendingTrigger>>,
}

impl TriggerChain {
    async fn run(self, first_delay: Duration) {
        let mut delay = first_delay;
        loop {
            tokio::time::sleep(delay).await;
            let next = effective_poll_interval(configured_interval_ms(self.settings.as_ref()));

            if self.run_flag.is_running() {
                self.target.refresh();
            } else if self.retire(|| !self.run_flag.is_running()) {
                info!("automatic polling halted; waiting for a manual refresh");
                return;
            } else {
                // Resumed by a manual refresh, which already fetched.
                debug!("polling resumed while the trigger was firing");
            }

            match next {
                Some(next) => {
                    debug!(delay_ms = next.as_millis() as u64, "next refresh scheduled");
                    delay = next;
                }
                None => {
                    self.retire(|| true);
                    debug!("automatic refresh disabled by configuration");
                    return;
                }
            }
        }
    }

    /// Releases the schedule when `should_exit` holds under the lock. A chain
    /// that has already been replaced always exits.
    fn retire(&self, should_exit: impl FnOnce() -> bool) -> bool {
        let mut pending = self.pending.lock().expect("poller pending trigger lock");
        if pending.generation != self.generation {
            return true;
        }
        if !should_exit() {
            return false;
        }
        pending.handle = None;
        true
    }
}
