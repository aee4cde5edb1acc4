//! Message bus with an at-least-once delivery contract
//!
//! Publishing to a topic enqueues one message per subscribed consumer group.
//! A consumer claims one message at a time, then either acks it or nacks it.
//! A nacked message is redelivered until it has been attempted
//! `max_attempts` times, after which it is parked as a dead letter.
//! Dead letters stay queryable and can be re-queued.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use t20i_common::{MatchId, Result};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryBus;
pub use postgres::PostgresBus;

/// Consumer group of the Delivery-wise aggregator
pub const DELIVERYWISE_GROUP: &str = "deliverywise";

/// Consumer group of the Match-wise aggregator
pub const MATCHWISE_GROUP: &str = "matchwise";

/// Payload announcing one newly stored raw input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMatchFile {
    pub json_file_key: String,
    pub match_id: MatchId,
}

/// A claimed message
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: Uuid,
    pub topic: String,
    pub consumer_group: String,
    pub payload: Value,
    /// Attempts so far, including this one
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
}

impl Delivery {
    /// Whether a failure of this attempt exhausts the message
    pub fn is_last_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// What a nack did with the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    Requeued,
    DeadLettered,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Register a consumer group on a topic; idempotent
    async fn subscribe(&self, topic: &str, consumer_group: &str) -> Result<()>;

    /// Enqueue `payload` for every group subscribed to `topic`
    ///
    /// Returns the number of groups the message was fanned out to.
    async fn publish(&self, topic: &str, payload: &Value) -> Result<usize>;

    /// Claim the oldest available message for a group
    async fn claim(&self, topic: &str, consumer_group: &str) -> Result<Option<Delivery>>;

    async fn ack(&self, id: Uuid) -> Result<()>;

    /// Release a failed message. With `retry` false, or once attempts are
    /// exhausted, the message is dead-lettered instead of requeued.
    async fn nack(&self, id: Uuid, error: &str, retry: bool) -> Result<NackOutcome>;

    async fn dead_letters(&self, topic: &str) -> Result<Vec<Delivery>>;

    /// Move every dead letter on `topic` back to pending with a fresh
    /// attempt budget. Returns the number re-queued.
    async fn requeue_dead_letters(&self, topic: &str) -> Result<usize>;
}

/// Publish a [`NewMatchFile`] announcement
pub async fn publish_new_match(
    bus: &dyn MessageBus,
    topic: &str,
    message: &NewMatchFile,
) -> Result<usize> {
    let payload = serde_json::to_value(message)?;
    bus.publish(topic, &payload).await
}
