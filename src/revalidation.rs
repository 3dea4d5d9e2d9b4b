//! Background revalidation: single-flight scheduling and exponential
//! back-off on repeated failure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::Result;

/// Decides the delay before the next revalidation attempt for a key,
/// given how many consecutive failures it has accrued.
pub trait SchedulingStrategy: Send + Sync {
    /// Delay before the next attempt, given `consecutive_failures` so far.
    fn schedule(&self, consecutive_failures: u32) -> Duration;
}

/// Always revalidate immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateSchedulingStrategy;

impl SchedulingStrategy for ImmediateSchedulingStrategy {
    fn schedule(&self, _consecutive_failures: u32) -> Duration {
        Duration::ZERO
    }
}

/// `delay = min(initial * rate^(attempts-1), max)` for `attempts >= 1`, else
/// zero. With the RFC-recommended defaults (`rate=10, initial=6s,
/// max=86400s`) attempts 0..6 yield `0, 6s, 60s, 600s, 6000s, 60000s,
/// 86400s`, saturating thereafter.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackOffSchedulingStrategy {
    pub rate: f64,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ExponentialBackOffSchedulingStrategy {
    fn default() -> Self {
        Self { rate: 10.0, initial: Duration::from_secs(6), max: Duration::from_secs(86_400) }
    }
}

impl SchedulingStrategy for ExponentialBackOffSchedulingStrategy {
    fn schedule(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let factor = self.rate.powi(consecutive_failures as i32 - 1);
        let delay = self.initial.mul_f64(factor);
        delay.min(self.max)
    }
}

/// Abstracts the timer source so tests can drive revalidation deterministically.
pub trait ScheduledExecutor: Send + Sync {
    /// Run `job` after `delay`.
    fn schedule(&self, delay: Duration, job: Pin<Box<dyn Future<Output = ()> + Send>>) -> Result<()>;
}

/// Production executor: `tokio::spawn` + `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduledExecutor;

impl ScheduledExecutor for TokioScheduledExecutor {
    fn schedule(&self, delay: Duration, job: Pin<Box<dyn Future<Output = ()> + Send>>) -> Result<()> {
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            job.await;
        });
        Ok(())
    }
}

/// Test executor backed by a manually-advanced virtual clock: `schedule`
/// only records the job and its delay, and [`VirtualScheduledExecutor::advance`]
/// runs every job whose delay has elapsed. Lets back-off timing assertions
/// run without waiting on a real clock.
type PendingJob = (Duration, Pin<Box<dyn Future<Output = ()> + Send>>);

#[derive(Default)]
pub struct VirtualScheduledExecutor {
    pending: std::sync::Mutex<Vec<PendingJob>>,
}

impl std::fmt::Debug for VirtualScheduledExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualScheduledExecutor").finish_non_exhaustive()
    }
}

impl VirtualScheduledExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the virtual clock by `elapsed`, running every pending job
    /// whose delay is now due.
    pub async fn advance(&self, elapsed: Duration) {
        let ready = {
            let mut pending = self.pending.lock().unwrap();
            let mut ready = Vec::new();
            let mut i = 0;
            while i < pending.len() {
                if pending[i].0 <= elapsed {
                    ready.push(pending.remove(i).1);
                } else {
                    i += 1;
                }
            }
            ready
        };
        for job in ready {
            job.await;
        }
    }
}

impl ScheduledExecutor for VirtualScheduledExecutor {
    fn schedule(&self, delay: Duration, job: Pin<Box<dyn Future<Output = ()> + Send>>) -> Result<()> {
        self.pending.lock().unwrap().push((delay, job));
        Ok(())
    }
}

/// Tracks in-flight and recently-failed revalidation keys, and enforces
/// single-flight: a key already scheduled is never scheduled twice.
impl std::fmt::Debug for AsynchronousValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsynchronousValidator").finish()
    }
}

pub struct AsynchronousValidator {
    executor: Arc<dyn ScheduledExecutor>,
    strategy: Arc<dyn SchedulingStrategy>,
    scheduled: DashMap<String, ()>,
    failures: Mutex<HashMap<String, u32>>,
}

impl AsynchronousValidator {
    /// Build a validator with the given executor and back-off strategy.
    pub fn new(executor: Arc<dyn ScheduledExecutor>, strategy: Arc<dyn SchedulingStrategy>) -> Self {
        Self { executor, strategy, scheduled: DashMap::new(), failures: Mutex::new(HashMap::new()) }
    }

    /// Build a validator using the production executor and exponential back-off.
    pub fn default_production() -> Self {
        Self::new(
            Arc::new(TokioScheduledExecutor),
            Arc::new(ExponentialBackOffSchedulingStrategy::default()),
        )
    }

    /// Whether `key` is currently scheduled or running.
    pub fn is_scheduled(&self, key: &str) -> bool {
        self.scheduled.contains_key(key)
    }

    /// Schedule `operation` for `key` unless one is already in flight.
    /// Returns `true` if this call actually scheduled it (the caller is the
    /// single-flight leader for this revalidation). `operation` returns
    /// `true` on a successful revalidation, `false` on failure (which
    /// advances the back-off strategy's failure count for `key`).
    pub async fn schedule_revalidation<F, Fut>(
        self: &Arc<Self>,
        key: &str,
        operation: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        if self.scheduled.insert(key.to_string(), ()).is_some() {
            log::debug!("revalidation for {key} already in flight, skipping");
            return Ok(false);
        }

        let failures = *self.failures.lock().await.get(key).unwrap_or(&0);
        let delay = self.strategy.schedule(failures);
        log::debug!("scheduling revalidation for {key} in {delay:?} (failures so far: {failures})");

        let key_owned = key.to_string();
        let this = Arc::clone(self);

        let job: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            let succeeded = operation().await;
            this.scheduled.remove(&key_owned);
            let mut failures = this.failures.lock().await;
            if succeeded {
                failures.remove(&key_owned);
            } else {
                let count = failures.entry(key_owned.clone()).or_insert(0);
                *count += 1;
                log::debug!("revalidation for {key_owned} failed, consecutive failures now {count}");
            }
        });

        if let Err(err) = self.executor.schedule(delay, job) {
            self.scheduled.remove(key);
            return Err(err);
        }
        Ok(true)
    }

    /// Current consecutive-failure count recorded for `key`.
    pub async fn failure_count(&self, key: &str) -> u32 {
        *self.failures.lock().await.get(key).unwrap_or(&0)
    }
}
