//! Message validator: decides which inbound events are eligible for the dialogue engine.
//!
//! Pure function of the event and the current time. Rules are checked in order and the
//! first match wins; rejected events are returned to the caller with a reason so they
//! can be reported rather than silently dropped.

use crate::channels::InboundEvent;
use crate::identity;

/// Events older than this are webhook retries of a backlog and are skipped.
pub const MAX_AGE_SECS: i64 = 300;

const GROUP_MARKER: &str = "@g.us";
const STATUS_BROADCAST: &str = "status@broadcast";
const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 13;

/// Why an event was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    SelfSent,
    Group,
    StatusBroadcast,
    NoText,
    Stale,
    BadNumber,
}

impl Rejection {
    /// Stable reason string reported to the webhook caller and in logs.
    pub fn reason(self) -> &'static str {
        match self {
            Rejection::Malformed => "malformed",
            Rejection::SelfSent => "self-sent",
            Rejection::Group => "group",
            Rejection::StatusBroadcast => "status-broadcast",
            Rejection::NoText => "no-text",
            Rejection::Stale => "stale",
            Rejection::BadNumber => "bad-number",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// An event that passed every rule, reduced to what the engine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleMessage {
    /// Id of the inbound message; anchors the session's persisted record.
    pub correlation_id: String,
    /// Raw chat address, used when marking the message as read.
    pub remote_jid: String,
    /// Destination for replies (chat address without the individual suffix).
    pub address: String,
    /// Canonical phone; the session key.
    pub phone: String,
    pub text: String,
}

/// Run the rules against `event` at time `now_unix` (seconds).
pub fn validate(event: &InboundEvent, now_unix: i64) -> Result<EligibleMessage, Rejection> {
    let (key, payload) = match (&event.key, &event.message) {
        (Some(key), Some(payload)) => (key, payload),
        _ => return Err(Rejection::Malformed),
    };
    let remote_jid = match key.remote_jid.as_deref().map(str::trim) {
        Some(jid) if !jid.is_empty() => jid,
        _ => return Err(Rejection::Malformed),
    };

    if key.is_from_me() {
        return Err(Rejection::SelfSent);
    }
    if remote_jid.contains(GROUP_MARKER) {
        return Err(Rejection::Group);
    }
    if remote_jid == STATUS_BROADCAST {
        return Err(Rejection::StatusBroadcast);
    }

    let text = match payload.text() {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Err(Rejection::NoText),
    };

    // An unparseable timestamp cannot prove staleness.
    if let Some(sent) = event.message_timestamp.as_ref().and_then(|t| t.as_unix()) {
        if now_unix.saturating_sub(sent) > MAX_AGE_SECS {
            return Err(Rejection::Stale);
        }
    }

    let address = identity::address_from_jid(remote_jid);
    let sender_digits = identity::digits(address);
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&sender_digits.len()) {
        return Err(Rejection::BadNumber);
    }

    let correlation_id = key
        .id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("local-{}", uuid::Uuid::new_v4()));

    Ok(EligibleMessage {
        correlation_id,
        remote_jid: remote_jid.to_string(),
        address: address.to_string(),
        phone: identity::normalize_phone(&sender_digits),
        text: text.to_string(),
    })
}
