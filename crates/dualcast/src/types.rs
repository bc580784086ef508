use dualcast_transport::RecipientId;
use serde::{Deserialize, Serialize};

/// A message to deliver.
///
/// Structured messages travel as their JSON text on both channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Text(String),
    Structured(serde_json::Value),
}

impl Message {
    /// The text sent on the wire.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        match self {
            Message::Text(text) => Ok(text.clone()),
            Message::Structured(value) => serde_json::to_string(value),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<serde_json::Value> for Message {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Message::Text(text),
            other => Message::Structured(other),
        }
    }
}

/// Which channel carried a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReceipt {
    /// Accepted by the push gateway; `receipt` is the gateway's message name.
    Push { receipt: String },
    /// Sent on the open direct link to `recipient`.
    Direct { recipient: RecipientId },
}

impl DeliveryReceipt {
    pub fn is_push(&self) -> bool {
        matches!(self, DeliveryReceipt::Push { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_is_sent_verbatim() {
        assert_eq!(Message::from("hi there").to_text().unwrap(), "hi there");
    }

    #[test]
    fn structured_is_sent_as_json() {
        let msg = Message::from(json!({"kind": "ping", "seq": 3}));
        assert_eq!(msg.to_text().unwrap(), r#"{"kind":"ping","seq":3}"#);
    }

    #[test]
    fn json_string_becomes_text() {
        assert_eq!(Message::from(json!("plain")), Message::Text("plain".into()));
    }
}
