// src/reconnect.rs

//! Reconnect policy: ordered candidate endpoints plus retry timing.
//!
//! The policy is a pure decision function over the failure count of the
//! current connect cycle; it holds no protocol knowledge. The connection
//! actor owns the iteration position and consults the policy after every
//! classified-retryable failure.

use std::time::Duration;

/// Retry timing and failover configuration for one connection.
///
/// All bounds are configuration, not constants: the backoff starts at
/// `delay`, grows by `delay_multiplier` per failed attempt and is capped at
/// `max_delay`; `max_attempts == 0` means retry without bound.
#[derive(Debug, Clone)]
pub struct ReconnectOptions {
  delay: Duration,
  delay_multiplier: f64,
  max_delay: Duration,
  max_attempts: u32,
  failover_urls: Vec<String>,
}

impl Default for ReconnectOptions {
  fn default() -> Self {
    Self {
      delay: Duration::from_millis(10),
      delay_multiplier: 2.0,
      max_delay: Duration::from_secs(10),
      max_attempts: 0,
      failover_urls: Vec::new(),
    }
  }
}

impl ReconnectOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Delay before the first retry of a cycle.
  pub fn delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Backoff growth factor. Values below 1.0 are treated as 1.0 so the
  /// schedule stays non-decreasing.
  pub fn delay_multiplier(mut self, multiplier: f64) -> Self {
    self.delay_multiplier = multiplier.max(1.0);
    self
  }

  pub fn max_delay(mut self, max_delay: Duration) -> Self {
    self.max_delay = max_delay;
    self
  }

  /// Bound on consecutive failed attempts per cycle. 0 = unbounded.
  pub fn max_attempts(mut self, max_attempts: u32) -> Self {
    self.max_attempts = max_attempts;
    self
  }

  /// Alternate endpoints tried round-robin after the primary target fails.
  pub fn failover_urls<I, S>(mut self, urls: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.failover_urls = urls.into_iter().map(Into::into).collect();
    self
  }

  pub(crate) fn failover(&self) -> &[String] {
    &self.failover_urls
  }
}

/// Decision for the next transport attempt of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NextAttempt {
  Retry { endpoint: String, delay: Duration },
  GiveUp,
}

/// Per-cycle iteration state over an immutable candidate list.
///
/// The candidate list is the originally requested target followed by the
/// configured failover addresses; it never changes after construction.
/// Failure number n (1-based) selects `candidates[n % len]`, cycling back to
/// the primary after the last failover address. A cycle ends on success
/// (`reset`) or when `GiveUp` is returned.
#[derive(Debug)]
pub(crate) struct ReconnectState {
  candidates: Vec<String>,
  opts: ReconnectOptions,
  failures: u32,
}

impl ReconnectState {
  pub fn new(primary: String, opts: ReconnectOptions) -> Self {
    let mut candidates = Vec::with_capacity(1 + opts.failover_urls.len());
    candidates.push(primary);
    candidates.extend(opts.failover_urls.iter().cloned());
    Self {
      candidates,
      opts,
      failures: 0,
    }
  }

  /// Consulted after a retryable failure: the endpoint and delay for the next
  /// attempt, or `GiveUp` once the attempt bound is exhausted.
  pub fn next_attempt(&mut self) -> NextAttempt {
    self.failures += 1;
    if self.opts.max_attempts != 0 && self.failures > self.opts.max_attempts {
      return NextAttempt::GiveUp;
    }
    let endpoint = self.candidates[self.failures as usize % self.candidates.len()].clone();
    NextAttempt::Retry {
      endpoint,
      delay: self.delay_for(self.failures),
    }
  }

  /// A transport attempt succeeded: the cycle is over.
  pub fn reset(&mut self) {
    self.failures = 0;
  }

  fn delay_for(&self, failure: u32) -> Duration {
    let factor = self.opts.delay_multiplier.max(1.0).powi(failure.saturating_sub(1) as i32);
    let delay = self.opts.delay.mul_f64(factor);
    delay.min(self.opts.max_delay)
  }
}
