//! Inbound webhook model: envelope, message key, and the text-bearing payload union.

use serde::Deserialize;

/// Event names that carry new messages.
const MESSAGE_EVENTS: &[&str] = &["messages.upsert", "messages_upsert"];

/// Webhook POST body: `{ "event", "instance", "data" }`. `data` is one event or an array.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WebhookEnvelope {
    /// True when the envelope announces new messages.
    pub fn is_message_event(&self) -> bool {
        let event = self.event.trim();
        MESSAGE_EVENTS.iter().any(|e| event.eq_ignore_ascii_case(e))
    }

    /// Decode `data` item by item. A single object yields one item; null yields none.
    /// An item that does not fit the event shape is returned as [`UndecodedEvent`] so
    /// the rest of the batch is unaffected.
    pub fn events(&self) -> Vec<Result<InboundEvent, UndecodedEvent>> {
        match &self.data {
            serde_json::Value::Null => Vec::new(),
            serde_json::Value::Array(items) => items.iter().map(decode_event).collect(),
            other => vec![decode_event(other)],
        }
    }
}

/// A `data` item that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodedEvent {
    /// `key.id` when the item carries one, else "unknown".
    pub message_id: String,
    pub error: String,
}

fn decode_event(item: &serde_json::Value) -> Result<InboundEvent, UndecodedEvent> {
    serde_json::from_value(item.clone()).map_err(|e| UndecodedEvent {
        message_id: item
            .pointer("/key/id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        error: e.to_string(),
    })
}

/// One inbound message event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(default)]
    pub key: Option<MessageKey>,
    #[serde(default)]
    pub message: Option<Payload>,
    #[serde(default)]
    pub message_timestamp: Option<Timestamp>,
}

impl InboundEvent {
    /// Correlation id for reporting; "unknown" when the key or id is absent.
    pub fn message_id(&self) -> &str {
        self.key
            .as_ref()
            .and_then(|k| k.id.as_deref())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    #[serde(default)]
    pub remote_jid: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// `null` and absent both mean "not sent by us".
    #[serde(default)]
    pub from_me: Option<bool>,
}

impl MessageKey {
    pub fn is_from_me(&self) -> bool {
        self.from_me.unwrap_or(false)
    }
}

/// Unix seconds, sent either as a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Seconds(i64),
    Text(String),
}

impl Timestamp {
    /// Unix seconds; None when the string form is not an integer.
    pub fn as_unix(&self) -> Option<i64> {
        match self {
            Timestamp::Seconds(s) => Some(*s),
            Timestamp::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// The text-bearing part of a message. Exactly one variant is active.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawMessage")]
pub enum Payload {
    /// Plain `conversation` text.
    Text(String),
    /// `extendedTextMessage.text` (quoted replies, links).
    ExtendedText(String),
    /// `buttonsResponseMessage.selectedDisplayText`.
    ButtonReply(String),
    /// `listResponseMessage.singleSelectReply.selectedRowId`.
    ListReply(String),
    /// Media, reactions, and anything else without text.
    Unsupported,
}

impl Payload {
    /// The carried text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Text(t)
            | Payload::ExtendedText(t)
            | Payload::ButtonReply(t)
            | Payload::ListReply(t) => Some(t),
            Payload::Unsupported => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    conversation: Option<String>,
    #[serde(default)]
    extended_text_message: Option<RawExtendedText>,
    #[serde(default)]
    buttons_response_message: Option<RawButtonsResponse>,
    #[serde(default)]
    list_response_message: Option<RawListResponse>,
}

#[derive(Debug, Deserialize)]
struct RawExtendedText {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawButtonsResponse {
    #[serde(default)]
    selected_display_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListResponse {
    #[serde(default)]
    single_select_reply: Option<RawSingleSelect>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSingleSelect {
    #[serde(default)]
    selected_row_id: Option<String>,
}

impl From<RawMessage> for Payload {
    fn from(raw: RawMessage) -> Self {
        let non_empty = |s: Option<String>| s.filter(|t| !t.is_empty());
        if let Some(t) = non_empty(raw.conversation) {
            return Payload::Text(t);
        }
        if let Some(t) = non_empty(raw.extended_text_message.and_then(|m| m.text)) {
            return Payload::ExtendedText(t);
        }
        if let Some(t) = non_empty(
            raw.buttons_response_message
                .and_then(|m| m.selected_display_text),
        ) {
            return Payload::ButtonReply(t);
        }
        if let Some(t) = non_empty(
            raw.list_response_message
                .and_then(|m| m.single_select_reply)
                .and_then(|r| r.selected_row_id),
        ) {
            return Payload::ListReply(t);
        }
        Payload::Unsupported
    }
}
