//! Per-action execution policies.
//!
//! Each action kind carries its own timeout, retry budget, and
//! post-action stabilization. `options.ms` overrides the timeout.

use std::time::Duration;

use rand::Rng;

use crate::config::Config;
use crate::dsl::{ActionKind, ActionOptions, UntilCondition};

/// Post-action stabilization to run once an attempt succeeds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StabilizeKind {
    None,
    /// DOM quiescent for the given window (ms).
    DomQuiescent(u64),
    /// load → network-idle → DOM quiescent 500 ms.
    Navigation,
    /// DOM quiescent 200 ms plus URL-change detection.
    Click,
}

#[derive(Clone, Copy, Debug)]
pub struct ActionPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub stabilize: StabilizeKind,
}

pub fn policy_for(kind: ActionKind, options: &ActionOptions, config: &Config) -> ActionPolicy {
    let (timeout_ms, retries, stabilize) = match kind {
        ActionKind::Navigate => (config.navigate_timeout_ms, 5, StabilizeKind::Navigation),
        ActionKind::Click => (config.action_timeout_ms, 4, StabilizeKind::Click),
        ActionKind::Type => (20_000, 3, StabilizeKind::None),
        ActionKind::Select => (config.action_timeout_ms, 3, StabilizeKind::None),
        ActionKind::Hover => (5_000, 2, StabilizeKind::None),
        ActionKind::PressKey => (config.locator_timeout_ms, 2, StabilizeKind::DomQuiescent(100)),
        ActionKind::Wait => match options.until {
            Some(UntilCondition::Selector) => (config.locator_timeout_ms, 2, StabilizeKind::None),
            _ => (
                options.ms.unwrap_or(config.spa_stabilize_ms),
                1,
                StabilizeKind::None,
            ),
        },
        ActionKind::EvalJs => (config.action_timeout_ms, 1, StabilizeKind::None),
        ActionKind::Scroll | ActionKind::ScrollToText => {
            (5_000, 2, StabilizeKind::DomQuiescent(200))
        }
        ActionKind::Screenshot | ActionKind::Extract => (15_000, 2, StabilizeKind::None),
        ActionKind::GoBack | ActionKind::GoForward => {
            (config.navigate_timeout_ms, 2, StabilizeKind::Click)
        }
        ActionKind::SwitchTab | ActionKind::FocusIframe => {
            (config.action_timeout_ms, 2, StabilizeKind::DomQuiescent(200))
        }
        ActionKind::RefreshCatalog => (config.action_timeout_ms, 2, StabilizeKind::None),
        ActionKind::Assert => (config.locator_timeout_ms, 2, StabilizeKind::None),
        ActionKind::ClosePopup | ActionKind::ClickBlankArea => {
            (config.action_timeout_ms, 2, StabilizeKind::DomQuiescent(200))
        }
    };

    let timeout_ms = options.ms.unwrap_or(timeout_ms);
    ActionPolicy {
        timeout: Duration::from_millis(timeout_ms),
        retries,
        stabilize,
    }
}

/// Exponential backoff `base × factor^(n−1)` bounded by `max`, with a
/// small jitter so parallel retries spread out.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(300),
            factor: 2.0,
            max: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    /// Delay before attempt `n + 1`, given `n` completed attempts (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base.as_secs_f64() * self.factor.powi(attempt.saturating_sub(1) as i32);
        let bounded = Duration::from_secs_f64(exp).min(self.max);
        let jitter = rand::thread_rng().gen_range(0.0..=0.25);
        bounded.mul_f64(1.0 + jitter).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_defaults() {
        let config = Config::default();
        let opts = ActionOptions::default();

        let nav = policy_for(ActionKind::Navigate, &opts, &config);
        assert_eq!(nav.timeout, Duration::from_millis(15_000));
        assert_eq!(nav.retries, 5);
        assert_eq!(nav.stabilize, StabilizeKind::Navigation);

        let click = policy_for(ActionKind::Click, &opts, &config);
        assert_eq!(click.timeout, Duration::from_millis(10_000));
        assert_eq!(click.retries, 4);

        let typing = policy_for(ActionKind::Type, &opts, &config);
        assert_eq!(typing.timeout, Duration::from_millis(20_000));
        assert_eq!(typing.retries, 3);

        let eval = policy_for(ActionKind::EvalJs, &opts, &config);
        assert_eq!(eval.retries, 1);
    }

    #[test]
    fn ms_option_overrides_timeout() {
        let config = Config::default();
        let opts = ActionOptions {
            ms: Some(1_234),
            ..ActionOptions::default()
        };
        let policy = policy_for(ActionKind::Click, &opts, &config);
        assert_eq!(policy.timeout, Duration::from_millis(1_234));
        assert_eq!(policy.retries, 4);
    }

    #[test]
    fn wait_uses_its_ms_as_duration() {
        let config = Config::default();
        let opts = ActionOptions {
            ms: Some(500),
            ..ActionOptions::default()
        };
        let policy = policy_for(ActionKind::Wait, &opts, &config);
        assert_eq!(policy.timeout, Duration::from_millis(500));
        assert_eq!(policy.retries, 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = Backoff::default();
        let first = backoff.delay(1);
        let third = backoff.delay(3);
        assert!(first >= Duration::from_millis(300));
        assert!(third >= first);
        assert!(backoff.delay(20) <= Duration::from_secs(5));
    }
}
