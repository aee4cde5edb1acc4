use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use t20i_common::{PipelineError, Result};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Delivery, MessageBus, NackOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageState {
    Pending,
    Processing,
    Completed,
    DeadLetter,
}

#[derive(Debug)]
struct StoredMessage {
    delivery: Delivery,
    state: MessageState,
}

#[derive(Default)]
struct Inner {
    subscriptions: BTreeMap<String, BTreeSet<String>>,
    /// Insertion order doubles as delivery order
    messages: Vec<StoredMessage>,
}

/// In-process bus with the same delivery semantics as [`super::PostgresBus`]
pub struct MemoryBus {
    max_attempts: u32,
    inner: Mutex<Inner>,
}

impl MemoryBus {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Messages not yet completed or dead-lettered, across all groups
    pub async fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| matches!(m.state, MessageState::Pending | MessageState::Processing))
            .count()
    }
}

fn unknown(id: Uuid) -> PipelineError {
    PipelineError::TransientIo(format!("Unknown message id {}", id))
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn subscribe(&self, topic: &str, consumer_group: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .subscriptions
            .entry(topic.to_string())
            .or_default()
            .insert(consumer_group.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &Value) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let groups: Vec<String> = inner
            .subscriptions
            .get(topic)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default();

        for group in &groups {
            inner.messages.push(StoredMessage {
                delivery: Delivery {
                    id: Uuid::new_v4(),
                    topic: topic.to_string(),
                    consumer_group: group.clone(),
                    payload: payload.clone(),
                    attempts: 0,
                    max_attempts: self.max_attempts,
                    last_error: None,
                },
                state: MessageState::Pending,
            });
        }

        Ok(groups.len())
    }

    async fn claim(&self, topic: &str, consumer_group: &str) -> Result<Option<Delivery>> {
        let mut inner = self.inner.lock().await;
        let next = inner.messages.iter_mut().find(|m| {
            m.state == MessageState::Pending
                && m.delivery.topic == topic
                && m.delivery.consumer_group == consumer_group
        });

        Ok(next.map(|m| {
            m.state = MessageState::Processing;
            m.delivery.attempts += 1;
            m.delivery.clone()
        }))
    }

    async fn ack(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.delivery.id == id)
            .ok_or_else(|| unknown(id))?;
        message.state = MessageState::Completed;
        Ok(())
    }

    async fn nack(&self, id: Uuid, error: &str, retry: bool) -> Result<NackOutcome> {
        let mut inner = self.inner.lock().await;
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.delivery.id == id)
            .ok_or_else(|| unknown(id))?;

        message.delivery.last_error = Some(error.to_string());
        if retry && !message.delivery.is_last_attempt() {
            message.state = MessageState::Pending;
            Ok(NackOutcome::Requeued)
        } else {
            message.state = MessageState::DeadLetter;
            Ok(NackOutcome::DeadLettered)
        }
    }

    async fn dead_letters(&self, topic: &str) -> Result<Vec<Delivery>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.state == MessageState::DeadLetter && m.delivery.topic == topic)
            .map(|m| m.delivery.clone())
            .collect())
    }

    async fn requeue_dead_letters(&self, topic: &str) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let mut count = 0;
        for message in inner
            .messages
            .iter_mut()
            .filter(|m| m.state == MessageState::DeadLetter && m.delivery.topic == topic)
        {
            message.state = MessageState::Pending;
            message.delivery.attempts = 0;
            count += 1;
        }
        Ok(count)
    }
}
