//! Evolution API channel: sendText, markMessageAsRead, webhook registration, and connection state.

use async_trait::async_trait;
use std::time::Duration;

/// Events requested when registering the webhook.
pub const WEBHOOK_EVENTS: &[&str] = &["MESSAGE_RECEIVED", "MESSAGE_SENT", "CONNECTION_UPDATE"];

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("messenger request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("messenger api error: {0}")]
    Api(String),
    #[error("messenger not configured: {0}")]
    NotConfigured(&'static str),
}

/// Outbound side of the channel. Addresses are opaque strings derived from the sender.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Channel id (e.g. "evolution").
    fn id(&self) -> &str;

    /// Send a text message to `address`.
    async fn send_text(&self, address: &str, text: &str) -> Result<(), MessengerError>;

    /// Mark an inbound message as read. Default is a no-op.
    async fn mark_read(&self, _message_id: &str, _remote_jid: &str) -> Result<(), MessengerError> {
        Ok(())
    }

    /// Check the connection for health reporting.
    async fn ping(&self) -> Result<(), MessengerError> {
        Ok(())
    }
}

/// HTTP client for an Evolution API instance.
#[derive(Clone)]
pub struct EvolutionChannel {
    id: String,
    base_url: Option<String>,
    api_key: Option<String>,
    instance: Option<String>,
    client: reqwest::Client,
}

impl EvolutionChannel {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        instance: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Self {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("evolution: http client with timeout failed ({}), using default", e);
                reqwest::Client::new()
            });
        Self {
            id: "evolution".to_string(),
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
            instance,
            client,
        }
    }

    fn endpoint(&self, path: &str) -> Result<String, MessengerError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(MessengerError::NotConfigured("evolution base url"))?;
        let instance = self
            .instance
            .as_deref()
            .ok_or(MessengerError::NotConfigured("evolution instance name"))?;
        Ok(format!("{}/{}/{}", base, path, instance))
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key.as_deref() {
            Some(key) => req.header("apikey", key),
            None => req,
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, MessengerError> {
        let url = self.endpoint(path)?;
        let res = self.authorized(self.client.post(&url)).json(body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(MessengerError::Api(format!("{} {}: {}", path, status, body)));
        }
        Ok(res.json().await.unwrap_or(serde_json::Value::Null))
    }

    /// Register `url` as the webhook for new messages.
    pub async fn set_webhook(&self, url: &str) -> Result<(), MessengerError> {
        let body = serde_json::json!({ "webhook": url, "events": WEBHOOK_EVENTS });
        self.post_json("webhook/set", &body).await.map(|_| ())
    }

    /// GET instance/connectionState: the reported state (e.g. "open").
    pub async fn connection_state(&self) -> Result<String, MessengerError> {
        let url = self.endpoint("instance/connectionState")?;
        let res = self.authorized(self.client.get(&url)).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(MessengerError::Api(format!("connectionState {}: {}", status, body)));
        }
        let data: serde_json::Value = res.json().await?;
        let state = data
            .pointer("/instance/state")
            .or_else(|| data.get("state"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(state)
    }
}

#[async_trait]
impl Messenger for EvolutionChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<(), MessengerError> {
        let body = serde_json::json!({ "number": address, "text": text });
        self.post_json("message/sendText", &body).await.map(|_| ())
    }

    async fn mark_read(&self, message_id: &str, remote_jid: &str) -> Result<(), MessengerError> {
        let body = serde_json::json!({
            "readMessages": [{ "id": message_id, "fromMe": false, "remoteJid": remote_jid }]
        });
        self.post_json("chat/markMessageAsRead", &body).await.map(|_| ())
    }

    async fn ping(&self) -> Result<(), MessengerError> {
        let state = self.connection_state().await?;
        log::debug!("evolution: connection state {}", state);
        Ok(())
    }
}
