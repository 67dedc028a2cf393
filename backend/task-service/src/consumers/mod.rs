/// Kafka consumers for task-service
pub mod identity_events;
pub mod source;

pub use identity_events::{
    spawn_replica_consumer, ConsumerConfig, ConsumerHandle, ConsumerHealth, ConsumerState,
    HealthSnapshot, IdentityReplicaConsumer,
};
pub use source::{BrokerError, InboundMessage, KafkaMessageSource, MessageSource};
