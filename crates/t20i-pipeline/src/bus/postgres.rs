use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use t20i_common::{PipelineError, Result};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{Delivery, MessageBus, NackOutcome};

/// Claims older than this are assumed to belong to a crashed invocation and
/// become claimable again (counts as a new attempt).
pub const STALE_CLAIM_SECS: f64 = 900.0;

type MessageRow = (Uuid, String, String, Value, i32, i32, Option<String>);

fn from_row(
    (id, topic, consumer_group, payload, attempts, max_attempts, last_error): MessageRow,
) -> Delivery {
    Delivery {
        id,
        topic,
        consumer_group,
        payload,
        attempts: attempts.max(0) as u32,
        max_attempts: max_attempts.max(0) as u32,
        last_error,
    }
}

/// Queue backed by the `bus_messages` / `bus_subscriptions` tables
#[derive(Clone)]
pub struct PostgresBus {
    pool: PgPool,
    max_attempts: u32,
}

impl PostgresBus {
    pub fn new(pool: PgPool, max_attempts: u32) -> Self {
        Self {
            pool,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[async_trait]
impl MessageBus for PostgresBus {
    async fn subscribe(&self, topic: &str, consumer_group: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bus_subscriptions (topic, consumer_group)
            VALUES ($1, $2)
            ON CONFLICT (topic, consumer_group) DO NOTHING
            "#,
        )
        .bind(topic)
        .bind(consumer_group)
        .execute(&self.pool)
        .await
        .context("Failed to register subscription")?;
        Ok(())
    }

    #[instrument(skip(self, payload))]
    async fn publish(&self, topic: &str, payload: &Value) -> Result<usize> {
        let groups: Vec<(String,)> =
            sqlx::query_as("SELECT consumer_group FROM bus_subscriptions WHERE topic = $1")
                .bind(topic)
                .fetch_all(&self.pool)
                .await
                .context("Failed to load subscriptions")?;

        if groups.is_empty() {
            warn!(topic, "No consumer groups subscribed; message dropped");
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;
        for (group,) in &groups {
            sqlx::query(
                r#"
                INSERT INTO bus_messages (id, topic, consumer_group, payload, max_attempts)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(topic)
            .bind(group)
            .bind(payload)
            .bind(self.max_attempts as i32)
            .execute(&mut *tx)
            .await
            .context("Failed to enqueue message")?;
        }
        tx.commit().await.context("Failed to commit publish")?;

        debug!(topic, groups = groups.len(), "Message published");
        Ok(groups.len())
    }

    async fn claim(&self, topic: &str, consumer_group: &str) -> Result<Option<Delivery>> {
        let row: Option<MessageRow> = sqlx::query_as(
            r#"
            UPDATE bus_messages
            SET status = 'processing',
                attempts = attempts + 1,
                claimed_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM bus_messages
                WHERE topic = $1
                  AND consumer_group = $2
                  AND (
                      status = 'pending'
                      OR (status = 'processing'
                          AND claimed_at < NOW() - make_interval(secs => $3))
                  )
                ORDER BY created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, topic, consumer_group, payload, attempts, max_attempts, last_error
            "#,
        )
        .bind(topic)
        .bind(consumer_group)
        .bind(STALE_CLAIM_SECS)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim message")?;

        Ok(row.map(from_row))
    }

    async fn ack(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE bus_messages SET status = 'completed', updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to ack message")?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::TransientIo(format!("Unknown message id {}", id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn nack(&self, id: Uuid, error: &str, retry: bool) -> Result<NackOutcome> {
        let status: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE bus_messages
            SET status = CASE
                    WHEN $3 AND attempts < max_attempts THEN 'pending'
                    ELSE 'dead_letter'
                END,
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to nack message")?;

        match status {
            Some((status,)) if status == "pending" => Ok(NackOutcome::Requeued),
            Some(_) => {
                warn!(%id, error, "Message dead-lettered");
                Ok(NackOutcome::DeadLettered)
            },
            None => Err(PipelineError::TransientIo(format!("Unknown message id {}", id))),
        }
    }

    async fn dead_letters(&self, topic: &str) -> Result<Vec<Delivery>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, topic, consumer_group, payload, attempts, max_attempts, last_error
            FROM bus_messages
            WHERE topic = $1 AND status = 'dead_letter'
            ORDER BY created_at
            "#,
        )
        .bind(topic)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list dead letters")?;

        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn requeue_dead_letters(&self, topic: &str) -> Result<usize> {
        let result = sqlx::query(
            r#"
            UPDATE bus_messages
            SET status = 'pending', attempts = 0, claimed_at = NULL, updated_at = NOW()
            WHERE topic = $1 AND status = 'dead_letter'
            "#,
        )
        .bind(topic)
        .execute(&self.pool)
        .await
        .context("Failed to requeue dead letters")?;

        let count = result.rows_affected() as usize;
        info!(topic, count, "Dead letters requeued");
        Ok(count)
    }
}
