// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capped exponential backoff.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Doubling delay schedule: `base * 2^attempt`, capped at `max`.
///
/// With jitter enabled the delay is drawn from `[delay / 2, delay]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

/// Shift cap so the multiplication cannot overflow before the `max` clamp.
const MAX_SHIFT: u32 = 20;

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: false,
        }
    }

    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after the given zero-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_SHIFT);
        let delay = self.base.saturating_mul(factor).min(self.max);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let low = delay / 2;
        let spread = delay.saturating_sub(low);
        low + spread.mul_f64(rand::thread_rng().r#gen::<f64>())
    }
}

/// Sleeps for `delay` unless `cancel` fires first. Returns `false` when
/// cancelled.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        () = cancel.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let backoff = Backoff::from_millis(500, 3_000);
        assert_eq!(backoff.delay(0), Duration::from_millis(500));
        assert_eq!(backoff.delay(1), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(2), Duration::from_millis(2_000));
        assert_eq!(backoff.delay(3), Duration::from_millis(3_000));
        assert_eq!(backoff.delay(40), Duration::from_millis(3_000));
    }

    #[test]
    fn max_is_never_below_base() {
        let backoff = Backoff::from_millis(2_000, 10);
        assert_eq!(backoff.delay(0), Duration::from_millis(2_000));
    }

    #[test]
    fn jitter_stays_in_upper_half() {
        let backoff = Backoff::from_millis(1_000, 60_000).with_jitter(true);
        for _ in 0..64 {
            let d = backoff.delay(2);
            assert!(d >= Duration::from_millis(2_000), "{d:?}");
            assert!(d <= Duration::from_millis(4_000), "{d:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_interrupted_by_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!sleep_or_cancel(Duration::from_secs(3600), &cancel).await);

        let live = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::from_millis(10), &live).await);
    }
}
