//! Scheduled rotation hook
//!
//! Daily files roll over by name, so rotation currently has nothing to do.
//! The hook exists so pruning or closing old logs can be added without
//! touching the server wiring. It runs on a recurring timer registered once
//! at startup, and on demand through the admin endpoint.

use crate::clock::Clock;
use crate::store::StoreError;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub trait RotationHook: Send + Sync {
    fn rotate(&self, today: NaiveDate) -> Result<(), StoreError>;
}

/// Does nothing beyond logging the run
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRotation;

impl RotationHook for NoopRotation {
    fn rotate(&self, today: NaiveDate) -> Result<(), StoreError> {
        tracing::debug!(%today, "rotation hook ran; daily files roll over by name");
        Ok(())
    }
}

/// Recurring timer driving a [`RotationHook`]
pub struct RotationScheduler {
    hook: Arc<dyn RotationHook>,
    clock: Arc<dyn Clock>,
    first_delay: Duration,
    interval: Duration,
    registered: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RotationScheduler {
    pub fn new(
        hook: Arc<dyn RotationHook>,
        clock: Arc<dyn Clock>,
        first_delay: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            hook,
            clock,
            first_delay,
            interval,
            registered: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Register the recurring job unless it already is.
    ///
    /// Returns `true` if this call registered it. Must run inside a tokio
    /// runtime.
    pub fn ensure_registered(&self) -> bool {
        if self
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("rotation job already registered");
            return false;
        }

        let hook = Arc::clone(&self.hook);
        let clock = Arc::clone(&self.clock);
        let start = Instant::now() + self.first_delay;
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let today = clock.today();
                match hook.rotate(today) {
                    Ok(()) => tracing::info!(%today, "rotation job completed"),
                    Err(e) => tracing::warn!(%today, "rotation job failed: {}", e),
                }
            }
        });

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        tracing::info!(
            first_run_in_secs = self.first_delay.as_secs(),
            interval_secs = interval.as_secs(),
            "rotation job registered"
        );
        true
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Stop the recurring job. It can be registered again afterwards.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.registered.store(false, Ordering::Release);
    }
}

impl Drop for RotationScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;

    struct ChannelHook(mpsc::UnboundedSender<NaiveDate>);

    impl RotationHook for ChannelHook {
        fn rotate(&self, today: NaiveDate) -> Result<(), StoreError> {
            let _ = self.0.send(today);
            Ok(())
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_runs_after_delay_then_on_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = RotationScheduler::new(
            Arc::new(ChannelHook(tx)),
            clock(),
            Duration::from_secs(3600),
            Duration::from_secs(86_400),
        );
        let started = Instant::now();

        assert!(scheduler.ensure_registered());

        let first = rx.recv().await.unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert!(started.elapsed() >= Duration::from_secs(3600));

        rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3600 + 86_400));
    }

    #[tokio::test]
    async fn test_registration_is_idempotent() {
        let scheduler = RotationScheduler::new(
            Arc::new(NoopRotation),
            clock(),
            Duration::from_secs(3600),
            Duration::from_secs(86_400),
        );

        assert!(scheduler.ensure_registered());
        assert!(!scheduler.ensure_registered());
        assert!(scheduler.is_registered());

        scheduler.shutdown();
        assert!(!scheduler.is_registered());
        assert!(scheduler.ensure_registered());
    }

    #[test]
    fn test_noop_rotation_succeeds() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert!(NoopRotation.rotate(today).is_ok());
    }
}
