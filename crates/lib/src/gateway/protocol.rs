//! HTTP response bodies for the webhook and status endpoints.

use serde::{Deserialize, Serialize};

/// Per-event outcome of a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Processed,
    Ignored,
    Error,
}

/// `{ "messageId", "status", "reason"? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    pub message_id: String,
    pub status: EventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EventResult {
    pub fn processed(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status: EventStatus::Processed,
            reason: None,
        }
    }

    pub fn ignored(message_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status: EventStatus::Ignored,
            reason: Some(reason.into()),
        }
    }

    pub fn error(message_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status: EventStatus::Error,
            reason: Some(reason.into()),
        }
    }
}

/// Body of `POST /webhook/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    /// Events in the delivery.
    pub total: usize,
    /// Events that completed an engine turn.
    pub processed: usize,
    pub results: Vec<EventResult>,
}

impl WebhookResponse {
    pub fn from_results(results: Vec<EventResult>) -> Self {
        let processed = results
            .iter()
            .filter(|r| r.status == EventStatus::Processed)
            .count();
        Self {
            success: true,
            total: results.len(),
            processed,
            results,
        }
    }
}

/// Dependency checks reported by `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChecks {
    pub directory: String,
    pub messenger: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// "healthy" or "unhealthy".
    pub status: String,
    pub checks: HealthChecks,
    pub active_sessions: usize,
    pub uptime_secs: u64,
}
