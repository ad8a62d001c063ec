//! Conversation sessions keyed by canonical phone number.
//!
//! One live session per phone. The store hands out copies; the dialogue engine is the
//! only writer and saves a session back once a turn has completed. Nothing here is
//! durable: long-term history lives in the persisted service record.

use crate::directory::Customer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Dialogue state. `Start` only exists until the first turn for a session succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    Start,
    AwaitingTaxId,
    MainMenu,
    Finished,
}

impl ConversationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationState::Start => "START",
            ConversationState::AwaitingTaxId => "AWAITING_TAX_ID",
            ConversationState::MainMenu => "MAIN_MENU",
            ConversationState::Finished => "FINISHED",
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Customer,
    Bot,
}

/// One transcript line; serialized as the persisted audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub at: String,
    pub text: String,
}

/// In-memory conversation for one customer phone.
#[derive(Debug, Clone)]
pub struct Session {
    pub phone: String,
    /// Where replies are sent.
    pub address: String,
    pub state: ConversationState,
    pub customer: Option<Customer>,
    /// Append-only.
    pub transcript: Vec<TranscriptEntry>,
    /// Id of the message that opened the session; key of the persisted record.
    pub correlation_id: String,
    /// True once a persisted record exists for `correlation_id`.
    pub recorded: bool,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        phone: impl Into<String>,
        address: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            phone: phone.into(),
            address: address.into(),
            state: ConversationState::Start,
            customer: None,
            transcript: Vec::new(),
            correlation_id: correlation_id.into(),
            recorded: false,
            updated_at: Utc::now(),
        }
    }

    /// Append a line to the transcript.
    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.transcript.push(TranscriptEntry {
            speaker,
            at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            text: text.into(),
        });
        self.updated_at = Utc::now();
    }
}

/// Read-only view of a session for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub phone: String,
    pub state: ConversationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    pub transcript_len: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            phone: s.phone.clone(),
            state: s.state,
            customer: s.customer.as_ref().map(|c| c.name.clone()),
            transcript_len: s.transcript.len(),
            updated_at: s.updated_at,
        }
    }
}

/// In-memory store: canonical phone -> session.
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Return a copy of the session if it exists.
    pub async fn get(&self, phone: &str) -> Option<Session> {
        self.inner.read().await.get(phone).cloned()
    }

    /// Return the existing session for `phone`, or insert a fresh `Start` session.
    /// An existing session is never replaced.
    pub async fn create_if_absent(
        &self,
        phone: &str,
        address: &str,
        correlation_id: &str,
    ) -> Session {
        if let Some(s) = self.inner.read().await.get(phone) {
            return s.clone();
        }
        let mut g = self.inner.write().await;
        g.entry(phone.to_string())
            .or_insert_with(|| Session::new(phone, address, correlation_id))
            .clone()
    }

    /// Write a session back under its phone.
    pub async fn save(&self, session: Session) {
        self.inner
            .write()
            .await
            .insert(session.phone.clone(), session);
    }

    /// Remove the session; returns true if one existed.
    pub async fn remove(&self, phone: &str) -> bool {
        self.inner.write().await.remove(phone).is_some()
    }

    /// Phones with a live session.
    pub async fn keys(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Read-only summaries, sorted by phone.
    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let g = self.inner.read().await;
        let mut out: Vec<SessionSummary> = g.values().map(SessionSummary::from).collect();
        out.sort_by(|a, b| a.phone.cmp(&b.phone));
        out
    }

    /// Remove `Finished` sessions last touched before `cutoff`; returns their phones.
    pub async fn remove_finished_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut g = self.inner.write().await;
        let expired: Vec<String> = g
            .values()
            .filter(|s| s.state == ConversationState::Finished && s.updated_at < cutoff)
            .map(|s| s.phone.clone())
            .collect();
        for phone in &expired {
            g.remove(phone);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_if_absent_keeps_existing_session() {
        let store = SessionStore::new();
        let mut s = store.create_if_absent("5531988887777", "5531988887777", "A").await;
        assert_eq!(s.state, ConversationState::Start);
        s.state = ConversationState::MainMenu;
        s.push(Speaker::Customer, "oi");
        store.save(s).await;

        let again = store.create_if_absent("5531988887777", "x", "B").await;
        assert_eq!(again.state, ConversationState::MainMenu);
        assert_eq!(again.correlation_id, "A");
        assert_eq!(again.transcript.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn remove_and_keys() {
        let store = SessionStore::new();
        store.create_if_absent("1", "1", "a").await;
        store.create_if_absent("2", "2", "b").await;
        let mut keys = store.keys().await;
        keys.sort();
        assert_eq!(keys, vec!["1", "2"]);
        assert!(store.remove("1").await);
        assert!(!store.remove("1").await);
        assert_eq!(store.keys().await, vec!["2"]);
    }

    #[tokio::test]
    async fn sweeper_only_removes_old_finished_sessions() {
        let store = SessionStore::new();
        let mut done = Session::new("1", "1", "a");
        done.state = ConversationState::Finished;
        done.updated_at = Utc::now() - chrono::Duration::hours(2);
        let mut menu = Session::new("2", "2", "b");
        menu.state = ConversationState::MainMenu;
        menu.updated_at = Utc::now() - chrono::Duration::hours(2);
        let mut fresh = Session::new("3", "3", "c");
        fresh.state = ConversationState::Finished;
        store.save(done).await;
        store.save(menu).await;
        store.save(fresh).await;

        let removed = store
            .remove_finished_before(Utc::now() - chrono::Duration::hours(1))
            .await;
        assert_eq!(removed, vec!["1"]);
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn transcript_serializes_speaker_lowercase() {
        let mut s = Session::new("1", "1", "a");
        s.push(Speaker::Bot, "olá");
        let v = serde_json::to_value(&s.transcript).unwrap();
        assert_eq!(v[0]["speaker"], "bot");
        assert_eq!(v[0]["text"], "olá");
    }
}
