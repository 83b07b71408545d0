//! Runtime configuration read from the environment.
//!
//! Every knob has a default so the monitor starts with no environment at all;
//! unparsable values fall back to the default as well, and so do zero periods.

use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Whole-second period; zero falls back to the default like any bad value.
fn env_period(key: &str, default: Duration) -> Duration {
    match env_or(key, default.as_secs()) {
        0 => default,
        secs => Duration::from_secs(secs),
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

/// Evaluation engine settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Cadence of the time/expiry sweep
    pub sweep_interval: Duration,

    /// Cadence of empty-group compaction in the condition index
    pub compaction_interval: Duration,

    /// Upper bound on a single trade-endpoint call; expiry counts as failure
    pub execution_timeout: Duration,

    /// Capacity of the outbound notification channel
    pub event_capacity: usize,

    /// Capacity of the inbound command queue
    pub command_capacity: usize,

    /// How often the metrics reporter logs a summary
    pub metrics_report_interval: Duration,
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep_interval: env_period("MONITOR_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            compaction_interval: env_period(
                "MONITOR_COMPACTION_INTERVAL_SECS",
                defaults.compaction_interval,
            ),
            execution_timeout: env_period(
                "MONITOR_EXECUTION_TIMEOUT_SECS",
                defaults.execution_timeout,
            ),
            event_capacity: env_or("MONITOR_EVENT_CAPACITY", defaults.event_capacity),
            command_capacity: env_or("MONITOR_COMMAND_CAPACITY", defaults.command_capacity),
            metrics_report_interval: env_period(
                "MONITOR_METRICS_REPORT_SECS",
                defaults.metrics_report_interval,
            ),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            compaction_interval: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(30),
            event_capacity: 1024,
            command_capacity: 256,
            metrics_report_interval: Duration::from_secs(30),
        }
    }
}

/// Price feed polling settings
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Poll cadence per subscribed instrument
    pub poll_interval: Duration,

    /// Minimum spacing between fetches of the same instrument, even when triggered externally
    pub min_fetch_interval: Duration,

    /// Attempts per cycle before giving up until the next poll
    pub max_retries: u32,

    /// Fixed delay between attempts
    pub retry_delay: Duration,

    /// HTTP timeout for a single source request
    pub request_timeout: Duration,

    /// Capacity of the price-changed broadcast channel
    pub channel_capacity: usize,
}

impl FeedConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_period("FEED_POLL_INTERVAL_SECS", defaults.poll_interval),
            min_fetch_interval: Duration::from_secs(env_or(
                "FEED_MIN_FETCH_INTERVAL_SECS",
                defaults.min_fetch_interval.as_secs(),
            )),
            max_retries: env_or("FEED_MAX_RETRIES", defaults.max_retries),
            retry_delay: Duration::from_millis(env_or(
                "FEED_RETRY_DELAY_MS",
                defaults.retry_delay.as_millis() as u64,
            )),
            request_timeout: env_period("FEED_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            channel_capacity: env_or("FEED_CHANNEL_CAPACITY", defaults.channel_capacity),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            min_fetch_interval: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(10),
            channel_capacity: 1024,
        }
    }
}

/// Settings only the server binary needs
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub trade_endpoint_url: Option<String>,
    pub metrics_addr: String,
    pub seed_orders_file: Option<String>,
    pub dry_run: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            trade_endpoint_url: std::env::var("TRADE_ENDPOINT_URL").ok(),
            metrics_addr: std::env::var("METRICS_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:9090".to_string()),
            seed_orders_file: std::env::var("SEED_ORDERS_FILE").ok(),
            dry_run: env_flag("DRY_RUN", false),
        }
    }
}
