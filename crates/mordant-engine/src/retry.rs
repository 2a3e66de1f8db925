//! Retry policy for transient fetch failures.
//!
//! A requirement's fetch moves through `Attempt -> Backoff -> Attempt -> ...`
//! until it succeeds or the attempt cap is reached. The policy only decides
//! the next step; the provisioner drives the loop and sleeps on its clock.

use std::time::Duration;

use mordant_config::Settings;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
  /// Wait this long, then attempt again.
  Backoff(Duration),
  /// The attempt cap is reached.
  GiveUp,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first. Zero is treated as one.
  pub max_attempts: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from_settings(&Settings::default())
  }
}

impl RetryPolicy {
  pub fn from_settings(settings: &Settings) -> Self {
    Self {
      max_attempts: settings.max_attempts,
      initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
      max_backoff: Duration::from_millis(settings.max_backoff_ms),
    }
  }

  /// Never retry.
  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      initial_backoff: Duration::ZERO,
      max_backoff: Duration::ZERO,
    }
  }

  /// Decide what follows the `failures`-th failed attempt (1-based).
  pub fn after_failure(&self, failures: u32) -> RetryStep {
    if failures >= self.max_attempts.max(1) {
      return RetryStep::GiveUp;
    }
    RetryStep::Backoff(self.delay(failures))
  }

  /// Delay before retry number `retry` (1-based): `initial * 2^(retry-1)`,
  /// capped at `max_backoff`.
  pub fn delay(&self, retry: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry.saturating_sub(1));
    self
      .initial_backoff
      .saturating_mul(factor)
      .min(self.max_backoff)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn policy() -> RetryPolicy {
    RetryPolicy {
      max_attempts: 4,
      initial_backoff: Duration::from_millis(100),
      max_backoff: Duration::from_millis(250),
    }
  }

  #[test]
  fn test_backoff_doubles_until_cap() {
    let policy = policy();
    assert_eq!(
      policy.after_failure(1),
      RetryStep::Backoff(Duration::from_millis(100))
    );
    assert_eq!(
      policy.after_failure(2),
      RetryStep::Backoff(Duration::from_millis(200))
    );
    assert_eq!(
      policy.after_failure(3),
      RetryStep::Backoff(Duration::from_millis(250))
    );
    assert_eq!(policy.after_failure(4), RetryStep::GiveUp);
  }

  #[test]
  fn test_no_retries() {
    assert_eq!(RetryPolicy::none().after_failure(1), RetryStep::GiveUp);

    let zero = RetryPolicy {
      max_attempts: 0,
      ..policy()
    };
    assert_eq!(zero.after_failure(1), RetryStep::GiveUp);
  }

  #[test]
  fn test_large_retry_numbers_saturate() {
    assert_eq!(policy().delay(64), Duration::from_millis(250));
  }

  #[test]
  fn test_from_settings() {
    let settings = Settings {
      max_attempts: 2,
      initial_backoff_ms: 10,
      max_backoff_ms: 40,
      ..Settings::default()
    };
    let policy = RetryPolicy::from_settings(&settings);
    assert_eq!(policy.max_attempts, 2);
    assert_eq!(policy.delay(3), Duration::from_millis(40));
  }
}
