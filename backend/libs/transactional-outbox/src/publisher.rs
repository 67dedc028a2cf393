use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::debug;

use crate::{OutboxError, OutboxEvent, OutboxResult};

/// Sends one outbox row to the broker and returns once it is acknowledged.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxPublisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> OutboxResult<()>;
}

/// Producer tuned for the relay: idempotent, `acks=all`.
pub fn create_producer(brokers: &str) -> Result<FutureProducer, KafkaError> {
    ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("enable.idempotence", "true")
        .set("acks", "all")
        .set("max.in.flight.requests.per.connection", "5")
        .set("message.timeout.ms", "30000")
        .create()
}

pub struct KafkaOutboxPublisher {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl KafkaOutboxPublisher {
    pub fn new(producer: FutureProducer) -> Self {
        Self {
            producer,
            delivery_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl OutboxPublisher for KafkaOutboxPublisher {
    async fn publish(&self, event: &OutboxEvent) -> OutboxResult<()> {
        let payload =
            serde_json::to_vec(&event.payload).context("Failed to serialize event payload")?;

        let event_id = event.id.to_string();
        let key = event.aggregate_id.to_string();

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "event_type",
                value: Some(event.event_type.as_bytes()),
            })
            .insert(Header {
                key: "event_id",
                value: Some(event_id.as_bytes()),
            })
            .insert(Header {
                key: "aggregate_type",
                value: Some(event.aggregate_type.as_bytes()),
            });

        // Keyed by aggregate so one identity always lands on one partition
        let record = FutureRecord::to(&event.topic)
            .key(&key)
            .payload(&payload)
            .headers(headers);

        let (partition, offset) = self
            .producer
            .send(record, self.delivery_timeout)
            .await
            .map_err(|(err, _)| OutboxError::PublishFailed(format!("Kafka publish failed: {}", err)))?;

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            topic = %event.topic,
            partition,
            offset,
            "Event acknowledged by broker"
        );

        Ok(())
    }
}
