//! Publisher trait and its implementations.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use domain::Event;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Result, ServiceError};

/// Fans events out to other processes over a named channel.
///
/// Events go out as their flat key/value record (see `Event::to_record`).
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, event: &Event) -> Result<()>;
}

/// Writes each published record to the log as JSON.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, channel: &str, event: &Event) -> Result<()> {
        let payload = serde_json::to_string(&event.to_record())?;
        info!(channel, event = %event.kind(), %payload, "Publishing event");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    published: Vec<(String, Map<String, Value>)>,
    failures_remaining: u32,
}

/// In-memory publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publish calls fail.
    pub fn fail_next(&self, count: u32) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .failures_remaining = count;
    }

    /// Returns every published `(channel, record)` pair, oldest first.
    pub fn published(&self) -> Vec<(String, Map<String, Value>)> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .published
            .clone()
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, channel: &str, event: &Event) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(ServiceError::Publish(format!(
                "channel {channel} unavailable"
            )));
        }
        state
            .published
            .push((channel.to_string(), event.to_record()));
        Ok(())
    }
}
