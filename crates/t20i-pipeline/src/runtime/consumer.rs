//! Queue consumer
//!
//! Drains one consumer group's messages through an aggregator, one message
//! at a time. Running a single consumer per group serializes that group's
//! dataset writes; concurrent consumers are still safe because dataset
//! writes are conditional.

use std::sync::Arc;
use t20i_common::{PipelineError, Result};
use tracing::{info, instrument, warn};

use crate::aggregate::{AggregationReport, Aggregator, Extraction};
use crate::bus::{Delivery, MessageBus, NackOutcome};

use super::event::{BusEventNormalizer, EventNormalizer};

/// A message (or one input within it) that was not acked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMessage {
    pub input: String,
    pub reason: String,
    /// Requeued, or dead-lettered after exhausting its attempts
    pub retryable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeReport {
    pub claimed: usize,
    pub acked: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
    pub failed: Vec<FailedMessage>,
}

impl ConsumeReport {
    pub fn summary(&self, group: &str) -> String {
        format!(
            "{} consumer: {} claimed, {} acked, {} requeued, {} dead-lettered",
            group, self.claimed, self.acked, self.requeued, self.dead_lettered
        )
    }

    /// Malformed inputs fail the drain as `MalformedRecord`; otherwise any
    /// retryable failure fails it as `TransientIo`
    pub fn into_result(self, group: &str) -> Result<String> {
        let summary = self.summary(group);
        let (malformed, transient): (Vec<FailedMessage>, Vec<FailedMessage>) =
            self.failed.into_iter().partition(|f| !f.retryable);

        if !malformed.is_empty() {
            let inputs: Vec<&str> = malformed.iter().map(|f| f.input.as_str()).collect();
            let reasons: Vec<&str> = malformed.iter().map(|f| f.reason.as_str()).collect();
            return Err(PipelineError::malformed(
                inputs.join(", "),
                format!("{} ({})", reasons.join("; "), summary),
            ));
        }

        if !transient.is_empty() {
            let details: Vec<String> = transient
                .iter()
                .map(|f| format!("{}: {}", f.input, f.reason))
                .collect();
            return Err(PipelineError::TransientIo(format!(
                "{} ({})",
                details.join("; "),
                summary
            )));
        }

        Ok(summary)
    }
}

/// Input named by a message payload, or the message ID when it names none
fn message_label(delivery: &Delivery) -> String {
    delivery
        .payload
        .get("json_file_key")
        .and_then(|key| key.as_str())
        .and_then(|key| key.rsplit('/').next())
        .map(str::to_string)
        .unwrap_or_else(|| delivery.id.to_string())
}

pub struct QueueConsumer<E: Extraction> {
    bus: Arc<dyn MessageBus>,
    aggregator: Aggregator<E>,
    topic: String,
    group: String,
}

impl<E: Extraction> QueueConsumer<E> {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        aggregator: Aggregator<E>,
        topic: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            aggregator,
            topic: topic.into(),
            group: group.into(),
        }
    }

    /// Process messages until the queue is empty, `max_messages` have been
    /// claimed, or a message fails with a retryable error. A retryable
    /// failure ends the drain so the message is retried by a later run
    /// instead of being spun through its whole attempt budget at once.
    ///
    /// Failures are settled on the bus and collected in the report; see
    /// [`ConsumeReport::into_result`].
    #[instrument(skip(self), fields(topic = %self.topic, group = %self.group))]
    pub async fn drain(&self, max_messages: Option<usize>) -> Result<ConsumeReport> {
        let mut report = ConsumeReport::default();

        while max_messages.is_none_or(|max| report.claimed < max) {
            let Some(delivery) = self.bus.claim(&self.topic, &self.group).await? else {
                break;
            };
            report.claimed += 1;

            if delivery.attempts > delivery.max_attempts {
                // Reclaimed after a crashed attempt that used up the budget
                let reason = "attempt budget exhausted";
                self.settle(&delivery, reason, false, &mut report).await?;
                report.failed.push(FailedMessage {
                    input: message_label(&delivery),
                    reason: reason.to_string(),
                    retryable: true,
                });
                continue;
            }

            match self.process(&delivery).await {
                Ok(outcome) if outcome.failed.is_empty() => {
                    self.bus.ack(delivery.id).await?;
                    report.acked += 1;
                    info!(
                        message = %delivery.id,
                        summary = %outcome.summary(),
                        "Message processed"
                    );
                },
                Ok(outcome) => {
                    // Valid inputs are merged; the malformed ones keep the message
                    let reasons: Vec<String> = outcome
                        .failed
                        .iter()
                        .map(|f| format!("{}: {}", f.file_name, f.reason))
                        .collect();
                    self.settle(&delivery, &reasons.join("; "), false, &mut report)
                        .await?;
                    report
                        .failed
                        .extend(outcome.failed.into_iter().map(|f| FailedMessage {
                            input: f.file_name,
                            reason: f.reason,
                            retryable: false,
                        }));
                },
                Err(err) => {
                    let retryable = err.is_retryable();
                    let outcome = self
                        .settle(&delivery, &err.to_string(), retryable, &mut report)
                        .await?;
                    report.failed.push(FailedMessage {
                        input: message_label(&delivery),
                        reason: err.to_string(),
                        retryable,
                    });
                    if outcome == NackOutcome::Requeued {
                        break;
                    }
                },
            }
        }

        info!(summary = %report.summary(&self.group), "Drain finished");
        Ok(report)
    }

    async fn process(&self, delivery: &Delivery) -> Result<AggregationReport> {
        let batch = BusEventNormalizer.normalize(&delivery.payload)?;
        self.aggregator.run_batch(batch).await
    }

    async fn settle(
        &self,
        delivery: &Delivery,
        error: &str,
        retry: bool,
        report: &mut ConsumeReport,
    ) -> Result<NackOutcome> {
        let outcome = self.bus.nack(delivery.id, error, retry).await?;
        match outcome {
            NackOutcome::Requeued => {
                report.requeued += 1;
                warn!(
                    message = %delivery.id,
                    attempt = delivery.attempts,
                    max_attempts = delivery.max_attempts,
                    error,
                    "Message requeued"
                );
            },
            NackOutcome::DeadLettered => {
                report.dead_lettered += 1;
                warn!(message = %delivery.id, error, "Message dead-lettered");
            },
        }
        Ok(outcome)
    }
}
