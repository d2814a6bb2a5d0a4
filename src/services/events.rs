//! Publishing of transaction completion events.
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{EventMessage, EventValidationError};

#[derive(Debug, Error)]
pub enum EventProducerError {
    #[error("invalid event message: {0}")]
    Validation(#[from] EventValidationError),
    #[error("serializing event message: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("publishing event message: {0}")]
    Publish(String),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn write_messages(&self, messages: &[EventMessage]) -> Result<(), EventProducerError>;
}

/// Appends each message to a Redis stream named after its topic.
pub struct RedisStreamProducer {
    client: Arc<ConnectionManager>,
    key_prefix: String,
}

impl RedisStreamProducer {
    pub fn new(client: Arc<ConnectionManager>, key_prefix: &str) -> Self {
        Self {
            client,
            key_prefix: key_prefix.to_string(),
        }
    }

    fn stream_key(&self, topic: &str) -> String {
        format!("{}:events:{}", self.key_prefix, topic)
    }
}

#[async_trait]
impl EventProducer for RedisStreamProducer {
    async fn write_messages(&self, messages: &[EventMessage]) -> Result<(), EventProducerError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for msg in messages {
            msg.validate()?;
            let payload = serde_json::to_string(msg)?;
            pipe.cmd("XADD")
                .arg(self.stream_key(&msg.topic))
                .arg("*")
                .arg("key")
                .arg(&msg.key)
                .arg("tenant_id")
                .arg(&msg.tenant_id)
                .arg("type")
                .arg(&msg.event_type)
                .arg("payload")
                .arg(payload)
                .ignore();
        }

        let mut conn = self.client.as_ref().clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| EventProducerError::Publish(e.to_string()))?;

        debug!(count = messages.len(), "published event messages");
        Ok(())
    }
}

/// Producer used when no event stream is configured.
#[derive(Debug, Default, Clone)]
pub struct LoggingEventProducer;

#[async_trait]
impl EventProducer for LoggingEventProducer {
    async fn write_messages(&self, messages: &[EventMessage]) -> Result<(), EventProducerError> {
        for msg in messages {
            msg.validate()?;
            info!(
                topic = %msg.topic,
                key = %msg.key,
                tenant_id = %msg.tenant_id,
                event_type = %msg.event_type,
                transaction_id = %msg.data.transaction_id,
                "event message"
            );
        }
        Ok(())
    }
}
