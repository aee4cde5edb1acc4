use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use t20i_common::{MatchId, ProcessingStatus, Result, StatusField};
use tracing::{debug, instrument};

use super::{StatusPage, StatusStore};

type StatusRow = (String, i64, bool, bool);

/// Status store backed by the `file_processing_status` table
#[derive(Clone)]
pub struct PostgresStatusStore {
    pool: PgPool,
}

impl PostgresStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn from_row((file_name, match_id, delivery_done, match_done): StatusRow) -> ProcessingStatus {
    ProcessingStatus {
        file_name,
        match_id: match_id as MatchId,
        delivery_done,
        match_done,
    }
}

#[async_trait]
impl StatusStore for PostgresStatusStore {
    async fn get_status(&self, file_name: &str) -> Result<Option<ProcessingStatus>> {
        let row: Option<StatusRow> = sqlx::query_as(
            r#"
            SELECT file_name, match_id,
                   deliverywise_data_extraction_status,
                   matchwise_data_extraction_status
            FROM file_processing_status
            WHERE file_name = $1
            "#,
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read processing status")?;

        Ok(row.map(from_row))
    }

    #[instrument(skip(self))]
    async fn register(&self, file_name: &str, match_id: MatchId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO file_processing_status (file_name, match_id)
            VALUES ($1, $2)
            ON CONFLICT (file_name) DO NOTHING
            "#,
        )
        .bind(file_name)
        .bind(match_id as i64)
        .execute(&self.pool)
        .await
        .context("Failed to register processing status")?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn set_field(
        &self,
        file_name: &str,
        match_id: MatchId,
        field: StatusField,
        value: bool,
    ) -> Result<()> {
        // Column names come from a closed enum, never from input
        let column = field.column();
        let sql = format!(
            r#"
            INSERT INTO file_processing_status (file_name, match_id, {column})
            VALUES ($1, $2, $3)
            ON CONFLICT (file_name)
            DO UPDATE SET {column} = EXCLUDED.{column}, updated_at = NOW()
            "#
        );

        sqlx::query(&sql)
            .bind(file_name)
            .bind(match_id as i64)
            .bind(value)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update {} for {}", column, file_name))?;

        debug!(file_name, %field, value, "Processing status updated");
        Ok(())
    }

    async fn scan_page(&self, after: Option<&str>, limit: usize) -> Result<StatusPage> {
        let rows: Vec<StatusRow> = sqlx::query_as(
            r#"
            SELECT file_name, match_id,
                   deliverywise_data_extraction_status,
                   matchwise_data_extraction_status
            FROM file_processing_status
            WHERE $1::TEXT IS NULL OR file_name > $1
            ORDER BY file_name
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to scan processing status")?;

        let entries: Vec<ProcessingStatus> = rows.into_iter().map(from_row).collect();
        let next = match entries.last() {
            Some(last) if entries.len() == limit => Some(last.file_name.clone()),
            _ => None,
        };

        Ok(StatusPage { entries, next })
    }
}
