use std::time::Duration;

/// Backoff parameters for watch resubscription.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub first: Duration,
    /// Ceiling for the growing delay.
    pub max: Duration,
    /// Multiplier applied after each retry.
    pub factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

/// Configuration for one placement engine instance.
///
/// The engine identity is injected rather than global so that several
/// instances with distinct names can coexist in one process, tests included.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Identity of this engine; only work units requesting this name are
    /// eligible for placement.
    pub engine_name: String,
    /// Capacity of the bounded intake queue. Pushing into a full queue
    /// blocks the producer.
    pub queue_capacity: usize,
    /// Interval between full node re-lists.
    pub resync_interval: Duration,
    pub backoff: BackoffConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_name: "random-placer".to_string(),
            queue_capacity: 300,
            resync_interval: Duration::from_secs(300),
            backoff: BackoffConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(engine_name: impl Into<String>) -> Self {
        Self {
            engine_name: engine_name.into(),
            ..Default::default()
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_default() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.engine_name, "random-placer");
        assert_eq!(cfg.queue_capacity, 300);
        assert_eq!(cfg.resync_interval, Duration::from_secs(300));
    }

    #[test]
    fn engine_config_new_sets_identity() {
        let cfg = EngineConfig::new("placer-a");
        assert_eq!(cfg.engine_name, "placer-a");
        assert_eq!(cfg.queue_capacity, 300);
    }

    #[test]
    fn engine_config_builders() {
        let cfg = EngineConfig::new("placer-b")
            .with_queue_capacity(8)
            .with_resync_interval(Duration::from_millis(250))
            .with_backoff(BackoffConfig {
                first: Duration::from_millis(10),
                max: Duration::from_millis(80),
                factor: 3.0,
            });
        assert_eq!(cfg.queue_capacity, 8);
        assert_eq!(cfg.resync_interval, Duration::from_millis(250));
        assert_eq!(cfg.backoff.first, Duration::from_millis(10));
        assert_eq!(cfg.backoff.max, Duration::from_millis(80));
        assert_eq!(cfg.backoff.factor, 3.0);
    }

    #[test]
    fn backoff_config_default() {
        let cfg = BackoffConfig::default();
        assert_eq!(cfg.first, Duration::from_millis(500));
        assert_eq!(cfg.max, Duration::from_secs(30));
        assert_eq!(cfg.factor, 2.0);
    }
}
