use std::io::Write;

use dualcast::directory::IdentityRecord;
use serde::Serialize;

/// Write one JSON line to stdout.
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();
    }
}

// ── Directory events ────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct EventUpserted {
    pub event: &'static str,
    pub recipient_id: String,
    /// `"created"` or `"updated"`.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_index: Option<usize>,
}

impl EventUpserted {
    pub fn created(recipient_id: &str, shard_index: usize) -> Self {
        Self {
            event: "upserted",
            recipient_id: recipient_id.to_string(),
            outcome: "created",
            shard_index: Some(shard_index),
        }
    }

    pub fn updated(recipient_id: &str) -> Self {
        Self {
            event: "upserted",
            recipient_id: recipient_id.to_string(),
            outcome: "updated",
            shard_index: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventResolved {
    pub event: &'static str,
    pub recipient_id: String,
    pub field: &'static str,
    pub value: Option<String>,
}

impl EventResolved {
    pub fn new(recipient_id: &str, field: &'static str, value: Option<String>) -> Self {
        Self {
            event: "resolved",
            recipient_id: recipient_id.to_string(),
            field,
            value,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventRecord {
    pub event: &'static str,
    #[serde(flatten)]
    pub record: IdentityRecord,
}

impl EventRecord {
    pub fn new(record: IdentityRecord) -> Self {
        Self {
            event: "record",
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_event_carries_shard() {
        let json = serde_json::to_value(EventUpserted::created("a", 2)).unwrap();
        assert_eq!(json["event"], "upserted");
        assert_eq!(json["outcome"], "created");
        assert_eq!(json["shard_index"], 2);
    }

    #[test]
    fn updated_event_omits_shard() {
        let json = serde_json::to_value(EventUpserted::updated("a")).unwrap();
        assert!(json.get("shard_index").is_none());
    }

    #[test]
    fn record_event_is_flat() {
        let json = serde_json::to_value(EventRecord::new(IdentityRecord {
            recipient_id: "a".into(),
            push_token: None,
            direct_link_address: "peer-1".into(),
            shard_index: 0,
        }))
        .unwrap();
        assert_eq!(json["event"], "record");
        assert_eq!(json["direct_link_address"], "peer-1");
        assert!(json["push_token"].is_null());
    }
}
