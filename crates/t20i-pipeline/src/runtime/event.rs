//! Trigger event normalization
//!
//! Aggregator stages can be triggered by a storage-write notification or by
//! a bus delivery. Each shape has its own normalizer; which one runs is a
//! configuration choice ([`EventTrigger`]), not something sniffed from the
//! payload.

use serde::Deserialize;
use serde_json::Value;
use t20i_common::records::match_id_from_key;
use t20i_common::{MatchId, PipelineError, Result};
use tracing::debug;

use crate::aggregate::{FailedInput, InputBatch, InputRef};
use crate::config::EventTrigger;

/// Name used for the event in `MalformedRecord` errors
const EVENT_INPUT: &str = "trigger event";

pub trait EventNormalizer: Send + Sync {
    /// Resolve an event to the raw inputs it announces
    ///
    /// An event that is unusable as a whole is an error; a multi-record
    /// event reports its unusable records in [`InputBatch::rejected`].
    fn normalize(&self, event: &Value) -> Result<InputBatch>;
}

pub fn normalizer_for(trigger: EventTrigger) -> Box<dyn EventNormalizer> {
    match trigger {
        EventTrigger::Storage => Box::new(StorageEventNormalizer),
        EventTrigger::Bus => Box::new(BusEventNormalizer),
    }
}

/// Scheduler ticks carry no input; an empty object counts as one too
pub fn is_timer_event(event: &Value) -> bool {
    match event {
        Value::Null => true,
        Value::Object(map) if map.is_empty() => true,
        Value::Object(map) => map.get("source").and_then(Value::as_str) == Some("scheduler"),
        _ => false,
    }
}

fn malformed(reason: impl Into<String>) -> PipelineError {
    PipelineError::malformed(EVENT_INPUT, reason)
}

// ============================================================================
// Storage notifications
// ============================================================================

#[derive(Deserialize)]
struct StorageEvent {
    detail: StorageDetail,
}

#[derive(Deserialize)]
struct StorageDetail {
    bucket: Option<BucketRef>,
    object: ObjectRef,
}

#[derive(Deserialize)]
struct BucketRef {
    name: String,
}

#[derive(Deserialize)]
struct ObjectRef {
    key: String,
}

/// `{"detail": {"bucket": {"name": ..}, "object": {"key": ..}}}`
pub struct StorageEventNormalizer;

impl EventNormalizer for StorageEventNormalizer {
    fn normalize(&self, event: &Value) -> Result<InputBatch> {
        let parsed = StorageEvent::deserialize(event)
            .map_err(|e| malformed(format!("not a storage notification: {}", e)))?;

        let key = parsed.detail.object.key;
        let match_id = match_id_from_key(&key)
            .ok_or_else(|| malformed(format!("cannot derive a match ID from key '{}'", key)))?;

        debug!(
            bucket = parsed.detail.bucket.as_ref().map(|b| b.name.as_str()),
            key = %key,
            match_id,
            "Normalized storage event"
        );
        Ok(vec![InputRef::new(key, match_id)].into())
    }
}

// ============================================================================
// Bus deliveries
// ============================================================================

#[derive(Deserialize)]
struct BusEnvelope {
    #[serde(rename = "Records")]
    records: Vec<BusRecord>,
}

#[derive(Deserialize)]
struct BusRecord {
    #[serde(rename = "Sns")]
    sns: BusBody,
}

#[derive(Deserialize)]
struct BusBody {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Deserialize)]
struct BusMessage {
    json_file_key: String,
    match_id: MatchIdField,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MatchIdField {
    Number(MatchId),
    Text(String),
}

impl BusMessage {
    fn into_input(self) -> Result<InputRef> {
        let match_id = match self.match_id {
            MatchIdField::Number(id) => id,
            MatchIdField::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| malformed(format!("match_id '{}' is not numeric", text)))?,
        };
        Ok(InputRef::new(self.json_file_key, match_id))
    }
}

/// `{"Records": [{"Sns": {"Message": "<json>"}}]}`, or the bare message
/// `{"json_file_key": .., "match_id": ..}` as stored in the queue
pub struct BusEventNormalizer;

impl EventNormalizer for BusEventNormalizer {
    fn normalize(&self, event: &Value) -> Result<InputBatch> {
        if event.get("Records").is_some() {
            let envelope = BusEnvelope::deserialize(event)
                .map_err(|e| malformed(format!("not a bus envelope: {}", e)))?;
            if envelope.records.is_empty() {
                return Err(malformed("bus envelope has no records"));
            }

            let mut batch = InputBatch::default();
            for (index, record) in envelope.records.iter().enumerate() {
                match record_input(&record.sns.message) {
                    Ok(input) => batch.inputs.push(input),
                    Err(err) => batch.rejected.push(FailedInput {
                        file_name: record_name(index, &record.sns.message),
                        reason: err.to_string(),
                    }),
                }
            }
            return Ok(batch);
        }

        let message = BusMessage::deserialize(event)
            .map_err(|e| malformed(format!("not a bus message: {}", e)))?;
        Ok(vec![message.into_input()?].into())
    }
}

fn record_input(message: &str) -> Result<InputRef> {
    let message: BusMessage = serde_json::from_str(message)
        .map_err(|e| malformed(format!("invalid bus message: {}", e)))?;
    message.into_input()
}

/// File name of a rejected record when its key is readable, else its position
fn record_name(index: usize, message: &str) -> String {
    serde_json::from_str::<Value>(message)
        .ok()
        .and_then(|v| v.get("json_file_key")?.as_str().map(str::to_string))
        .and_then(|key| key.rsplit('/').next().map(str::to_string))
        .unwrap_or_else(|| format!("bus record {}", index + 1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_storage_event() {
        let event = json!({
            "detail": {
                "bucket": {"name": "t20i-bucket"},
                "object": {"key": "cricsheet_data/new_cricsheet_data/1389389.json"}
            }
        });
        let inputs = normalizer_for(EventTrigger::Storage)
            .normalize(&event)
            .unwrap()
            .inputs;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].match_id, 1389389);
        assert_eq!(inputs[0].file_name(), "1389389.json");
    }

    #[test]
    fn test_storage_event_with_non_numeric_stem() {
        let event = json!({"detail": {"object": {"key": "cricsheet_data/README.txt"}}});
        let err = StorageEventNormalizer.normalize(&event).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { .. }));
    }

    #[test]
    fn test_bus_envelope_with_string_match_id() {
        let message = json!({
            "json_file_key": "cricsheet_data/new_cricsheet_data/42.json",
            "match_id": "42"
        });
        let event = json!({"Records": [{"Sns": {"Message": message.to_string()}}]});

        let batch = BusEventNormalizer.normalize(&event).unwrap();
        assert_eq!(
            batch.inputs,
            vec![InputRef::new("cricsheet_data/new_cricsheet_data/42.json", 42)]
        );
        assert!(batch.rejected.is_empty());
    }

    #[test]
    fn test_bare_bus_message() {
        let event = json!({"json_file_key": "k/7.json", "match_id": 7});
        let inputs = BusEventNormalizer.normalize(&event).unwrap().inputs;
        assert_eq!(inputs[0].match_id, 7);
    }

    #[test]
    fn test_bad_record_does_not_block_its_siblings() {
        let good = json!({
            "json_file_key": "cricsheet_data/new_cricsheet_data/8.json",
            "match_id": 8
        });
        let bad_id = json!({
            "json_file_key": "cricsheet_data/new_cricsheet_data/9.json",
            "match_id": "nine"
        });
        let event = json!({"Records": [
            {"Sns": {"Message": bad_id.to_string()}},
            {"Sns": {"Message": good.to_string()}},
            {"Sns": {"Message": "not json"}}
        ]});

        let batch = BusEventNormalizer.normalize(&event).unwrap();
        assert_eq!(
            batch.inputs,
            vec![InputRef::new("cricsheet_data/new_cricsheet_data/8.json", 8)]
        );
        let names: Vec<&str> = batch.rejected.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["9.json", "bus record 3"]);
        assert!(batch.rejected[0].reason.contains("nine"));
    }

    #[test]
    fn test_shapes_are_not_interchangeable() {
        let storage = json!({"detail": {"object": {"key": "k/7.json"}}});
        assert!(BusEventNormalizer.normalize(&storage).is_err());

        let bus = json!({"json_file_key": "k/7.json", "match_id": 7});
        assert!(StorageEventNormalizer.normalize(&bus).is_err());

        let bad_id = json!({"json_file_key": "k/7.json", "match_id": "seven"});
        assert!(BusEventNormalizer.normalize(&bad_id).is_err());
    }

    #[test]
    fn test_timer_events() {
        assert!(is_timer_event(&json!({})));
        assert!(is_timer_event(&json!({"source": "scheduler"})));
        assert!(is_timer_event(&Value::Null));
        assert!(!is_timer_event(&json!({"json_file_key": "k/7.json", "match_id": 7})));
    }
}
