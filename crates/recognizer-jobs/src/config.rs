//! Configuration for the worker pool and the recognition pipeline.

use recognizer_core::defaults;
use recognizer_core::Priority;

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v != "false" && v != "0")
        .unwrap_or(default)
}

/// Configuration for [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Running-worker cap for the `default` tier.
    pub default_tier_max: usize,
    /// Running-worker cap for the `high` tier.
    pub high_tier_max: usize,
    /// Keep one idle engine warm while the pool has nothing to do.
    pub prewarm: bool,
    /// Capacity of each per-work broadcast channel.
    pub event_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_tier_max: Priority::Default.default_max_running(),
            high_tier_max: Priority::High.default_max_running(),
            prewarm: defaults::POOL_PREWARM,
            event_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `RECOGNIZER_DEFAULT_TIER_MAX` | `1` | Running workers in the default tier |
    /// | `RECOGNIZER_HIGH_TIER_MAX` | `3` | Running workers in the high tier |
    /// | `RECOGNIZER_PREWARM` | `true` | Keep an idle engine warm |
    /// | `RECOGNIZER_EVENT_CAPACITY` | `64` | Per-work event buffer |
    pub fn from_env() -> Self {
        Self {
            default_tier_max: env_usize(
                "RECOGNIZER_DEFAULT_TIER_MAX",
                defaults::DEFAULT_TIER_MAX_RUNNING,
            )
            .max(1),
            high_tier_max: env_usize("RECOGNIZER_HIGH_TIER_MAX", defaults::HIGH_TIER_MAX_RUNNING)
                .max(1),
            prewarm: env_bool("RECOGNIZER_PREWARM", defaults::POOL_PREWARM),
            event_capacity: env_usize(
                "RECOGNIZER_EVENT_CAPACITY",
                defaults::EVENT_CHANNEL_CAPACITY,
            )
            .max(1),
        }
    }

    /// Set the running-worker cap for one tier (clamped to at least 1).
    pub fn with_tier_max(mut self, tier: Priority, max: usize) -> Self {
        match tier {
            Priority::Default => self.default_tier_max = max.max(1),
            Priority::High => self.high_tier_max = max.max(1),
        }
        self
    }

    pub fn with_prewarm(mut self, prewarm: bool) -> Self {
        self.prewarm = prewarm;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn max_running(&self, tier: Priority) -> usize {
        match tier {
            Priority::Default => self.default_tier_max,
            Priority::High => self.high_tier_max,
        }
    }
}

/// Configuration for [`RecognitionPipeline`](crate::RecognitionPipeline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Tasks allowed past the `enqueued` stage at once.
    pub max_concurrent_tasks: usize,
    /// Capacity of each per-task and the aggregate broadcast channel.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: defaults::PIPELINE_MAX_CONCURRENT_TASKS,
            event_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `RECOGNIZER_MAX_CONCURRENT_TASKS` | `1` | Tasks in flight |
    /// | `RECOGNIZER_EVENT_CAPACITY` | `64` | Per-task event buffer |
    pub fn from_env() -> Self {
        Self {
            max_concurrent_tasks: env_usize(
                "RECOGNIZER_MAX_CONCURRENT_TASKS",
                defaults::PIPELINE_MAX_CONCURRENT_TASKS,
            )
            .max(1),
            event_capacity: env_usize(
                "RECOGNIZER_EVENT_CAPACITY",
                defaults::EVENT_CHANNEL_CAPACITY,
            )
            .max(1),
        }
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.max(1);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
