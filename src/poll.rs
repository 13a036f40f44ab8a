//! Adaptive-backoff polling.
//!
//! One abstraction for every poll site: client status polling, resolver
//! readiness waits, and internal condition loops. Parameterized by initial
//! interval, growth factor, cap, and total deadline.

use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub struct PollSettings {
    pub initial: Duration,
    pub factor: f64,
    pub cap: Duration,
    pub deadline: Duration,
}

impl PollSettings {
    /// The client-loop contract: 500 ms → 3 s, doubling under error, 90 s
    /// total window.
    pub fn client_status() -> Self {
        Self {
            initial: Duration::from_millis(500),
            factor: 2.0,
            cap: Duration::from_millis(3_000),
            deadline: Duration::from_secs(90),
        }
    }

    /// Tight loop for element readiness checks.
    pub fn readiness(deadline: Duration) -> Self {
        Self {
            initial: Duration::from_millis(50),
            factor: 1.5,
            cap: Duration::from_millis(500),
            deadline,
        }
    }
}

/// Stateful poller. Interval grows only while errors persist and resets on
/// success, so a healthy endpoint is polled at the base rate.
#[derive(Debug)]
pub struct AdaptiveBackoff {
    settings: PollSettings,
    current: Duration,
    started: Instant,
}

impl AdaptiveBackoff {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings,
            current: settings.initial,
            started: Instant::now(),
        }
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.settings.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.settings
            .deadline
            .saturating_sub(self.started.elapsed())
    }

    /// Next sleep interval, or `None` once the deadline has passed.
    /// `had_error` grows the interval; success resets it.
    pub fn next_delay(&mut self, had_error: bool) -> Option<Duration> {
        if self.expired() {
            return None;
        }
        let delay = self.current.min(self.remaining());
        if had_error {
            let grown = self.current.as_secs_f64() * self.settings.factor;
            self.current = Duration::from_secs_f64(grown).min(self.settings.cap);
        } else {
            self.current = self.settings.initial;
        }
        Some(delay)
    }
}

/// Poll `probe` until it yields `Some`, backing off per `settings`.
/// Returns `None` when the deadline expires first.
pub async fn poll_until<T, F, Fut>(settings: PollSettings, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let mut backoff = AdaptiveBackoff::new(settings);
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        match backoff.next_delay(false) {
            Some(delay) => tokio::time::sleep(delay).await,
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_under_error_and_caps() {
        let mut b = AdaptiveBackoff::new(PollSettings::client_status());
        assert_eq!(b.next_delay(true), Some(Duration::from_millis(500)));
        assert_eq!(b.next_delay(true), Some(Duration::from_millis(1_000)));
        assert_eq!(b.next_delay(true), Some(Duration::from_millis(2_000)));
        assert_eq!(b.next_delay(true), Some(Duration::from_millis(3_000)));
        // Capped.
        assert_eq!(b.next_delay(true), Some(Duration::from_millis(3_000)));
    }

    #[test]
    fn success_resets_interval() {
        let mut b = AdaptiveBackoff::new(PollSettings::client_status());
        b.next_delay(true);
        b.next_delay(true);
        assert_eq!(b.next_delay(false), Some(Duration::from_millis(2_000)));
        assert_eq!(b.next_delay(false), Some(Duration::from_millis(500)));
    }

    #[test]
    fn deadline_exhausts() {
        let settings = PollSettings {
            initial: Duration::from_millis(10),
            factor: 2.0,
            cap: Duration::from_millis(100),
            deadline: Duration::ZERO,
        };
        let mut b = AdaptiveBackoff::new(settings);
        assert_eq!(b.next_delay(false), None);
    }

    #[tokio::test]
    async fn poll_until_finds_value() {
        let settings = PollSettings {
            initial: Duration::from_millis(1),
            factor: 1.0,
            cap: Duration::from_millis(1),
            deadline: Duration::from_secs(1),
        };
        let counter = std::sync::atomic::AtomicU32::new(0);
        let found = poll_until(settings, || async {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            (n >= 3).then_some(n)
        })
        .await;
        assert_eq!(found, Some(3));
    }
}
