//! Media reconnection policy.
//!
//! An episode starts when the session escalates to Reconnecting. Each backoff
//! firing requests an ICE restart; the episode is abandoned once it has run
//! longer than the backoff ceiling.

use log::debug;
use rand::Rng;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::timer::{Timer, TimerId, Timers};

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub factor: f64,
    pub jitter: f64,
    pub min: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            factor: 1.1,
            jitter: 0.5,
            min: Duration::from_millis(1),
            max: Duration::from_millis(30_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackoffError {
    #[error("Backoff in progress.")]
    InProgress,
}

/// Exponential backoff whose "ready" signal is a session timer.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
    pending: Option<TimerId>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
            pending: None,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Delay for the next attempt, given a uniform sample in `[0, 1)`.
    /// Advances the attempt counter.
    fn next_delay(&mut self, sample: f64) -> Duration {
        let mut ms =
            self.config.min.as_micros() as f64 / 1000.0 * self.config.factor.powi(self.attempts as i32);
        if self.config.jitter > 0.0 {
            let deviation = (sample * self.config.jitter * ms).floor();
            ms = if ((sample * 10.0).floor() as u64) & 1 == 0 {
                ms - deviation
            } else {
                ms + deviation
            };
        }
        self.attempts = self.attempts.saturating_add(1);
        let max_ms = self.config.max.as_micros() as f64 / 1000.0;
        Duration::from_millis(ms.clamp(0.0, max_ms) as u64)
    }

    pub fn backoff(&mut self, timers: &mut dyn Timers) -> Result<Duration, BackoffError> {
        if self.pending.is_some() {
            return Err(BackoffError::InProgress);
        }
        let delay = self.next_delay(rand::rng().random::<f64>());
        self.pending = Some(timers.schedule(delay, Timer::ReconnectBackoff));
        Ok(delay)
    }

    /// Returns true when `id` is the pending backoff timer, which is then
    /// considered fired.
    pub fn take_fired(&mut self, id: TimerId) -> bool {
        if self.pending == Some(id) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self, timers: &mut dyn Timers) {
        if let Some(id) = self.pending.take() {
            timers.cancel(id);
        }
    }

    pub fn reset(&mut self, timers: &mut dyn Timers) {
        self.attempts = 0;
        self.cancel(timers);
    }
}

#[derive(Debug)]
pub struct ReconnectPolicy {
    backoff: Backoff,
    ceiling: Duration,
    episode_started: Option<Instant>,
}

impl ReconnectPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        let ceiling = config.max;
        Self {
            backoff: Backoff::new(config),
            ceiling,
            episode_started: None,
        }
    }

    pub fn in_episode(&self) -> bool {
        self.episode_started.is_some()
    }

    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    /// Starts a new episode: records its start, resets the backoff and
    /// schedules the first attempt.
    pub fn begin(&mut self, timers: &mut dyn Timers) -> Result<Duration, BackoffError> {
        self.episode_started = Some(timers.now());
        self.backoff.reset(timers);
        self.backoff.backoff(timers)
    }

    pub fn retry(&mut self, timers: &mut dyn Timers) -> Result<Duration, BackoffError> {
        self.backoff.backoff(timers)
    }

    pub fn ceiling_exceeded(&self, now: Instant) -> bool {
        self.episode_started
            .is_some_and(|started| now.saturating_duration_since(started) > self.ceiling)
    }

    pub fn take_fired(&mut self, id: TimerId) -> bool {
        self.backoff.take_fired(id)
    }

    /// Ends the episode and drops any pending attempt.
    pub fn finish(&mut self, timers: &mut dyn Timers) {
        if self.episode_started.take().is_some() {
            debug!(target: "Call/Reconnect", "Reconnect episode finished after {} attempts", self.backoff.attempts());
        }
        self.backoff.cancel(timers);
    }
}
