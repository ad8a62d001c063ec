//! Transfer of a conversation to a human attendant.

use async_trait::async_trait;
use serde::Serialize;

/// What the attendant queue needs to pick up the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRequest {
    pub correlation_id: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("handoff request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("handoff endpoint error: {0}")]
    Api(String),
}

#[async_trait]
pub trait Handoff: Send + Sync {
    async fn transfer(&self, request: &HandoffRequest) -> Result<(), HandoffError>;
}

/// Logs the transfer; used when no attendant endpoint is configured.
#[derive(Debug, Default, Clone)]
pub struct LogHandoff;

#[async_trait]
impl Handoff for LogHandoff {
    async fn transfer(&self, request: &HandoffRequest) -> Result<(), HandoffError> {
        log::info!(
            "handoff: conversation {} ({}) queued for a human attendant",
            request.correlation_id,
            request.phone
        );
        Ok(())
    }
}

/// POSTs the request as JSON to an attendant-system endpoint.
#[derive(Clone)]
pub struct HttpHandoff {
    endpoint: String,
    queue_id: Option<String>,
    client: reqwest::Client,
}

impl HttpHandoff {
    pub fn new(endpoint: impl Into<String>, queue_id: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            queue_id,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Handoff for HttpHandoff {
    async fn transfer(&self, request: &HandoffRequest) -> Result<(), HandoffError> {
        let mut body = request.clone();
        if body.queue_id.is_none() {
            body.queue_id = self.queue_id.clone();
        }
        let res = self.client.post(&self.endpoint).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(HandoffError::Api(format!("{} {}", status, text)));
        }
        log::info!("handoff: conversation {} transferred", request.correlation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_absent_fields() {
        let req = HandoffRequest {
            correlation_id: "MSG1".into(),
            phone: "5531988887777".into(),
            customer_id: None,
            tax_id: Some("12.345.678/0001-99".into()),
            queue_id: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["correlationId"], "MSG1");
        assert_eq!(v["taxId"], "12.345.678/0001-99");
        assert!(v.get("customerId").is_none());
        assert!(v.get("queueId").is_none());
    }

    #[tokio::test]
    async fn log_handoff_always_succeeds() {
        let req = HandoffRequest {
            correlation_id: "MSG1".into(),
            phone: "5531988887777".into(),
            customer_id: None,
            tax_id: None,
            queue_id: None,
        };
        assert!(LogHandoff.transfer(&req).await.is_ok());
    }
}
