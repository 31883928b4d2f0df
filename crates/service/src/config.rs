//! Message bus configuration loaded from environment variables.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Bus configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `EVENT_HANDLER_MAX_ATTEMPTS`: attempts per event handler (default: `3`)
/// - `EVENT_HANDLER_BACKOFF_MS`: first back-off, doubled after each failure (default: `1000`)
/// - `EVENT_HANDLER_MAX_BACKOFF_MS`: back-off ceiling (default: `10000`)
/// - `OUT_OF_STOCK_RECIPIENT`: where out-of-stock notices go (default: `"stock@allocation.local"`)
/// - `ALLOCATED_CHANNEL`: channel allocations are published on (default: `"line_allocated"`)
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub out_of_stock_recipient: String,
    pub allocated_channel: String,
}

impl BusConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("EVENT_HANDLER_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            initial_backoff: env_parse("EVENT_HANDLER_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: env_parse("EVENT_HANDLER_MAX_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
            out_of_stock_recipient: std::env::var("OUT_OF_STOCK_RECIPIENT")
                .unwrap_or(defaults.out_of_stock_recipient),
            allocated_channel: std::env::var("ALLOCATED_CHANNEL")
                .unwrap_or(defaults.allocated_channel),
        }
    }

    /// Returns the retry policy for event handlers.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.initial_backoff, self.max_backoff)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(10_000),
            out_of_stock_recipient: "stock@allocation.local".to_string(),
            allocated_channel: "line_allocated".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
