//! Configuration management for Turnstile.
//!
//! Limiters are described declaratively and built into
//! `Box<dyn RateLimiter>` so callers only ever hold the capability.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{FixedWindow, LeakyBucket, RateLimiter, SlidingWindow, TokenBucket};

/// Environment variable prefix for configuration overrides.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration: named limiters plus the workload used to drive them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Limiter definitions keyed by name
    #[serde(default = "default_limiters")]
    pub limiters: BTreeMap<String, LimiterConfig>,

    /// Workload driver settings
    #[serde(default)]
    pub workload: WorkloadConfig,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            limiters: default_limiters(),
            workload: WorkloadConfig::default(),
        }
    }
}

fn default_limiters() -> BTreeMap<String, LimiterConfig> {
    BTreeMap::from([
        (
            "token_bucket".to_string(),
            LimiterConfig::TokenBucket {
                capacity: 10,
                tokens_per_second: 5.0,
                initial_tokens: 5,
            },
        ),
        (
            "leaky_bucket".to_string(),
            LimiterConfig::LeakyBucket {
                capacity: 10,
                leak_rate: 5.0,
            },
        ),
        (
            "fixed_window".to_string(),
            LimiterConfig::FixedWindow {
                window_ms: 1000,
                capacity: 15,
            },
        ),
        (
            "sliding_window".to_string(),
            LimiterConfig::SlidingWindow {
                limit: 15,
                window_ms: 500,
            },
        ),
    ])
}

/// Definition of a single limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterConfig {
    TokenBucket {
        capacity: u64,
        tokens_per_second: f64,
        #[serde(default)]
        initial_tokens: u64,
    },
    LeakyBucket {
        capacity: u64,
        leak_rate: f64,
    },
    FixedWindow {
        window_ms: u64,
        capacity: u64,
    },
    SlidingWindow {
        limit: u64,
        window_ms: u64,
    },
}

impl LimiterConfig {
    /// The algorithm tag as written in configuration.
    pub fn algorithm(&self) -> &'static str {
        match self {
            LimiterConfig::TokenBucket { .. } => "token_bucket",
            LimiterConfig::LeakyBucket { .. } => "leaky_bucket",
            LimiterConfig::FixedWindow { .. } => "fixed_window",
            LimiterConfig::SlidingWindow { .. } => "sliding_window",
        }
    }

    /// Check the parameters describe a usable limiter.
    pub fn validate(&self, name: &str) -> Result<()> {
        match *self {
            LimiterConfig::TokenBucket {
                capacity,
                tokens_per_second,
                initial_tokens,
            } => {
                positive(name, "capacity", capacity)?;
                rate(name, "tokens_per_second", tokens_per_second)?;
                if initial_tokens > capacity {
                    return Err(TurnstileError::invalid(
                        name,
                        format!("initial_tokens ({initial_tokens}) exceeds capacity ({capacity})"),
                    ));
                }
            }
            LimiterConfig::LeakyBucket { capacity, leak_rate } => {
                positive(name, "capacity", capacity)?;
                rate(name, "leak_rate", leak_rate)?;
            }
            LimiterConfig::FixedWindow { window_ms, capacity } => {
                positive(name, "window_ms", window_ms)?;
                positive(name, "capacity", capacity)?;
            }
            LimiterConfig::SlidingWindow { limit, window_ms } => {
                positive(name, "limit", limit)?;
                positive(name, "window_ms", window_ms)?;
            }
        }
        Ok(())
    }

    /// Validate and construct the limiter.
    pub fn build(&self, name: &str) -> Result<Box<dyn RateLimiter>> {
        self.validate(name)?;
        debug!(name, algorithm = self.algorithm(), "Building rate limiter");

        let limiter: Box<dyn RateLimiter> = match *self {
            LimiterConfig::TokenBucket {
                capacity,
                tokens_per_second,
                initial_tokens,
            } => Box::new(TokenBucket::new(capacity, tokens_per_second, initial_tokens)),
            LimiterConfig::LeakyBucket { capacity, leak_rate } => {
                Box::new(LeakyBucket::new(capacity, leak_rate))
            }
            LimiterConfig::FixedWindow { window_ms, capacity } => {
                Box::new(FixedWindow::new(Duration::from_millis(window_ms), capacity))
            }
            LimiterConfig::SlidingWindow { limit, window_ms } => {
                Box::new(SlidingWindow::new(limit, Duration::from_millis(window_ms)))
            }
        };
        Ok(limiter)
    }
}

fn positive(name: &str, field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(TurnstileError::invalid(name, format!("{field} must be greater than 0")));
    }
    Ok(())
}

fn rate(name: &str, field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TurnstileError::invalid(
            name,
            format!("{field} must be a positive finite number, got {value}"),
        ));
    }
    Ok(())
}

/// Workload driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Concurrent tasks calling `allow`
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Units requested per call
    #[serde(default = "default_request_size")]
    pub request_size: i64,

    /// Pause between calls from a single worker
    #[serde(default = "default_request_interval")]
    pub request_interval_ms: u64,

    /// Total run time
    #[serde(default = "default_duration")]
    pub duration_ms: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            request_size: default_request_size(),
            request_interval_ms: default_request_interval(),
            duration_ms: default_duration(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_request_size() -> i64 {
    1
}

fn default_request_interval() -> u64 {
    10
}

fn default_duration() -> u64 {
    2000
}

impl WorkloadConfig {
    /// Pause between calls, never shorter than one millisecond.
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms.max(1))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(TurnstileError::Config("workload.workers must be greater than 0".to_string()));
        }
        if self.request_interval_ms == 0 {
            return Err(TurnstileError::Config(
                "workload.request_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl TurnstileConfig {
    /// Load configuration from a YAML file, then apply `TURNSTILE_*`
    /// environment overrides (`__` separates nested keys, e.g.
    /// `TURNSTILE_WORKLOAD__WORKERS=8`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: TurnstileConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every limiter definition and the workload.
    pub fn validate(&self) -> Result<()> {
        for (name, limiter) in &self.limiters {
            limiter.validate(name)?;
        }
        self.workload.validate()
    }
}
