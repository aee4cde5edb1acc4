//! Manual replay
//!
//! Re-announces every input that an aggregator has not completed (left
//! unmarked after a malformed document, or stuck behind a dead letter) and
//! returns dead-lettered messages to the queue. Aggregators skip inputs they
//! already completed, so re-announcing to every group is harmless.

use t20i_common::Result;
use tracing::info;

use crate::bus::{publish_new_match, MessageBus, NewMatchFile};
use crate::config::raw_input_key;
use crate::status::{scan_all, StatusStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub republished: Vec<String>,
    pub requeued_dead_letters: usize,
}

impl ReplayReport {
    pub fn summary(&self) -> String {
        format!(
            "Republished {} incomplete inputs, requeued {} dead letters",
            self.republished.len(),
            self.requeued_dead_letters
        )
    }
}

pub async fn replay(
    status: &dyn StatusStore,
    bus: &dyn MessageBus,
    topic: &str,
    page_size: usize,
) -> Result<ReplayReport> {
    let requeued_dead_letters = bus.requeue_dead_letters(topic).await?;

    let mut republished = Vec::new();
    for entry in scan_all(status, page_size).await? {
        if entry.is_complete() {
            continue;
        }

        let file_name = entry.file_name;
        let message = NewMatchFile {
            json_file_key: raw_input_key(&file_name),
            match_id: entry.match_id,
        };
        publish_new_match(bus, topic, &message).await?;
        info!(input = %file_name, "Input re-announced");
        republished.push(file_name);
    }

    Ok(ReplayReport {
        republished,
        requeued_dead_letters,
    })
}
