//! Broker side of the replica consumer.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use thiserror::Error;
use tracing::info;

/// An owned copy of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("broker unavailable: {0}")]
pub struct BrokerError(pub String);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait up to `wait` for the next message. `Ok(None)` on timeout.
    async fn poll(&self, wait: Duration) -> Result<Option<InboundMessage>, BrokerError>;

    /// Record `message` as fully handled.
    async fn commit(&self, message: &InboundMessage) -> Result<(), BrokerError>;
}

pub struct KafkaMessageSource {
    consumer: StreamConsumer,
}

impl KafkaMessageSource {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| BrokerError(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError(e.to_string()))?;
        info!(
            "Created Kafka consumer for identity events: topic='{}', group='{}'",
            topic, group_id
        );

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn poll(&self, wait: Duration) -> Result<Option<InboundMessage>, BrokerError> {
        match tokio::time::timeout(wait, self.consumer.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Err(e)) => Err(BrokerError(e.to_string())),
            Ok(Ok(message)) => Ok(Some(InboundMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec),
            })),
        }
    }

    async fn commit(&self, message: &InboundMessage) -> Result<(), BrokerError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| BrokerError(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BrokerError(e.to_string()))
    }
}
