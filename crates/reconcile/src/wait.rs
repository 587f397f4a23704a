//! Bounded polling for provider-side state transitions.
//!
//! Providers that must wait for a resource to settle (an instance reaching
//! `stopped`, say) poll through [`wait_until`] instead of blocking on an
//! open-ended call. Time comes from a [`Clock`], so tests can swap in a
//! [`ManualClock`] that fast-forwards instead of sleeping.

use crate::error::ProviderError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Smallest poll interval; a zero interval would spin on a manual clock.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Source of time for waits and provider-side transitions.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Let `duration` pass.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time with real sleeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual time that only moves when slept on or advanced.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        if let Ok(mut now) = self.now.lock() {
            *now = now.checked_add_signed(delta).unwrap_or(*now);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map_or_else(|e| *e.into_inner(), |now| *now)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Configuration for bounded waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Upper bound on the whole wait
    pub timeout: Duration,
    /// Delay between probes
    pub poll_interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl WaitConfig {
    /// Create a wait config with custom settings.
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

/// Time elapsed since `since`, clamped at zero.
pub fn elapsed_since(clock: &dyn Clock, since: DateTime<Utc>) -> Duration {
    (clock.now() - since).to_std().unwrap_or(Duration::ZERO)
}

/// Poll `probe` until it reports the condition holds.
///
/// Probe errors are returned immediately. Once `config.timeout` has passed
/// without the condition holding, returns [`ProviderError::Timeout`]
/// naming `operation`.
pub fn wait_until<F>(
    config: &WaitConfig,
    clock: &dyn Clock,
    operation: &str,
    mut probe: F,
) -> Result<(), ProviderError>
where
    F: FnMut() -> Result<bool, ProviderError>,
{
    let started = clock.now();
    let interval = config.poll_interval.max(MIN_POLL_INTERVAL);

    loop {
        if probe()? {
            return Ok(());
        }

        let waited = elapsed_since(clock, started);
        if waited >= config.timeout {
            log::warn!("Gave up waiting for {operation} after {}s", waited.as_secs());
            return Err(ProviderError::Timeout {
                operation: operation.to_string(),
                waited,
            });
        }

        log::trace!("Waiting for {operation} ({}s elapsed)", waited.as_secs());
        clock.sleep(interval.min(config.timeout - waited));
    }
}
