use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::BackoffConfig;

/// Exponential backoff for watch resubscription. Each delay carries up to
/// 25% random jitter so that restarting engines do not hammer the control
/// plane in lockstep.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    next: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let next = config.first;
        Self { config, next }
    }

    /// Restart the schedule after a successful resubscription.
    pub fn reset(&mut self) {
        self.next = self.config.first;
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.next;
        self.next = base.mul_f64(self.config.factor).min(self.config.max);

        let jitter_ms = base.as_millis() as u64 / 4;
        let jitter = rand::thread_rng().gen_range(0..=jitter_ms);
        base + Duration::from_millis(jitter)
    }
}

/// Sleep for `delay` unless cancelled first. Returns true when cancelled.
pub async fn sleep_or_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BackoffConfig {
        BackoffConfig {
            first: Duration::from_millis(100),
            max: Duration::from_millis(400),
            factor: 2.0,
        }
    }

    #[test]
    fn delays_grow_to_the_cap() {
        let mut backoff = Backoff::new(test_config());

        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));

        let second = backoff.next_delay();
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(250));

        let third = backoff.next_delay();
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));

        // Capped from here on.
        let fourth = backoff.next_delay();
        assert!(fourth >= Duration::from_millis(400) && fourth <= Duration::from_millis(500));
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut backoff = Backoff::new(test_config());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(125));
    }

    #[tokio::test]
    async fn sleep_returns_early_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(sleep_or_cancelled(Duration::from_secs(60), &cancel).await);
    }
}
