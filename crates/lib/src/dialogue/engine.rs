//! Dialogue engine: applies one eligible inbound message to its session.
//!
//! Each turn works on a copy of the session and always writes it back. When a
//! collaborator call fails the conversation state is rolled back to where the turn
//! started, so the next message retries the same step, while the transcript keeps
//! everything that was said and sent.

use super::input::{classify, Input, MenuOption};
use super::replies::Replies;
use crate::channels::{Messenger, MessengerError};
use crate::directory::{CustomerGateway, DirectoryError};
use crate::handoff::{Handoff, HandoffError, HandoffRequest};
use crate::identity;
use crate::session::{ConversationState, Session, SessionStore, Speaker};
use crate::validate::EligibleMessage;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("customer directory failed: {0}")]
    Directory(#[from] DirectoryError),
    #[error("messenger failed: {0}")]
    Messenger(#[from] MessengerError),
    #[error("handoff failed: {0}")]
    Handoff(#[from] HandoffError),
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub phone: String,
    pub state: ConversationState,
    /// Outbound messages sent during the turn.
    pub sent: usize,
}

/// Session being worked on plus per-turn counters.
struct Turn {
    session: Session,
    sent: usize,
}

/// Finite-state controller for customer conversations.
pub struct Engine {
    sessions: Arc<SessionStore>,
    directory: Arc<dyn CustomerGateway>,
    messenger: Arc<dyn Messenger>,
    handoff: Arc<dyn Handoff>,
    replies: Replies,
}

impl Engine {
    pub fn new(
        sessions: Arc<SessionStore>,
        directory: Arc<dyn CustomerGateway>,
        messenger: Arc<dyn Messenger>,
        handoff: Arc<dyn Handoff>,
        replies: Replies,
    ) -> Self {
        Self {
            sessions,
            directory,
            messenger,
            handoff,
            replies,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Drop the session for `phone` so the next message starts a fresh interaction.
    pub async fn clear_session(&self, phone: &str) -> bool {
        let removed = self.sessions.remove(phone).await;
        if removed {
            log::info!("engine: session {} cleared", phone);
        }
        removed
    }

    /// Process one eligible message. Callers must serialize calls per phone.
    pub async fn handle(&self, msg: &EligibleMessage) -> Result<TurnReport, EngineError> {
        if let Err(e) = self
            .messenger
            .mark_read(&msg.correlation_id, &msg.remote_jid)
            .await
        {
            log::debug!("engine: mark_read {} failed: {}", msg.correlation_id, e);
        }

        let mut session = self
            .sessions
            .create_if_absent(&msg.phone, &msg.address, &msg.correlation_id)
            .await;
        session.address = msg.address.clone();
        let mut turn = Turn { session, sent: 0 };

        self.record(&mut turn.session, Speaker::Customer, &msg.text)
            .await;
        let input = classify(turn.session.state, &msg.text);
        log::debug!(
            "engine: {} in {} classified as {:?}",
            msg.phone,
            turn.session.state,
            input
        );

        let before = turn.session.state;
        let outcome = self.step(&mut turn, input).await;
        if let Err(e) = &outcome {
            log::warn!(
                "engine: turn for {} failed, state kept at {}: {}",
                msg.phone,
                before,
                e
            );
            turn.session.state = before;
            let notice = self.replies.temporary_failure();
            match self.messenger.send_text(&msg.address, &notice).await {
                Ok(()) => {
                    self.record(&mut turn.session, Speaker::Bot, &notice)
                        .await
                }
                Err(send_err) => {
                    log::warn!("engine: failure notice to {} not sent: {}", msg.phone, send_err)
                }
            }
        }
        let report = TurnReport {
            phone: turn.session.phone.clone(),
            state: turn.session.state,
            sent: turn.sent,
        };
        self.sessions.save(turn.session).await;
        outcome.map(|()| report)
    }

    /// Transition table: (state, input class) -> handler.
    async fn step(&self, turn: &mut Turn, input: Input) -> Result<(), EngineError> {
        match (turn.session.state, input) {
            (ConversationState::Start, Input::Opening { tax_id }) => {
                self.open(turn, tax_id).await
            }
            (ConversationState::AwaitingTaxId, Input::TaxId(digits)) => {
                self.resolve_tax_id(turn, &digits).await
            }
            (ConversationState::AwaitingTaxId, Input::BadTaxId) => {
                self.say(turn, self.replies.invalid_tax_id()).await
            }
            (ConversationState::MainMenu, Input::Menu(MenuOption::Invoices)) => {
                self.open_invoices(turn).await
            }
            (
                ConversationState::MainMenu,
                Input::Menu(option @ (MenuOption::FiscalNotes | MenuOption::Certificates)),
            ) => {
                self.say(turn, self.replies.coming_soon(option)).await?;
                self.say(turn, self.replies.back_or_exit()).await
            }
            (
                ConversationState::MainMenu,
                Input::Menu(MenuOption::Proposals | MenuOption::Attendant),
            ) => self.hand_off(turn).await,
            (ConversationState::MainMenu, Input::ShowMenu) => {
                self.say(turn, self.replies.main_menu()).await
            }
            (ConversationState::MainMenu, Input::Exit) => {
                self.say(turn, self.replies.goodbye()).await?;
                turn.session.state = ConversationState::Finished;
                Ok(())
            }
            (ConversationState::MainMenu, Input::InvalidOption) => {
                self.say(turn, self.replies.invalid_option()).await?;
                self.say(turn, self.replies.main_menu()).await
            }
            (_, _) => self.say(turn, self.replies.not_understood()).await,
        }
    }

    /// First turn: identify by phone, else by a tax id in the first message, else ask for one.
    async fn open(&self, turn: &mut Turn, tax_id: Option<String>) -> Result<(), EngineError> {
        if let Some(customer) = self.directory.lookup_by_phone(&turn.session.phone).await? {
            log::info!(
                "engine: {} identified by phone as {}",
                turn.session.phone,
                customer.customer_id
            );
            let greeting = self.replies.greeting(&customer.name);
            turn.session.customer = Some(customer);
            turn.session.state = ConversationState::MainMenu;
            self.say(turn, greeting).await?;
            return self.say(turn, self.replies.main_menu()).await;
        }
        match tax_id {
            Some(digits) => self.resolve_tax_id(turn, &digits).await,
            None => {
                turn.session.state = ConversationState::AwaitingTaxId;
                self.say(turn, self.replies.request_tax_id()).await
            }
        }
    }

    async fn resolve_tax_id(&self, turn: &mut Turn, digits: &str) -> Result<(), EngineError> {
        let Ok(formatted) = identity::format_tax_id(digits) else {
            turn.session.state = ConversationState::AwaitingTaxId;
            return self.say(turn, self.replies.invalid_tax_id()).await;
        };
        match self.directory.lookup_by_tax_id(&formatted).await? {
            Some(customer) => {
                log::info!(
                    "engine: {} identified by tax id as {}",
                    turn.session.phone,
                    customer.customer_id
                );
                let confirmation = self.replies.tax_id_confirmed(&customer.name);
                turn.session.customer = Some(customer);
                turn.session.state = ConversationState::MainMenu;
                self.open_record(&mut turn.session).await;
                self.say(turn, confirmation).await?;
                self.say(turn, self.replies.main_menu()).await
            }
            None => {
                log::info!("engine: tax id {} not found for {}", formatted, turn.session.phone);
                turn.session.state = ConversationState::Finished;
                self.say(turn, self.replies.tax_id_not_found()).await
            }
        }
    }

    async fn open_invoices(&self, turn: &mut Turn) -> Result<(), EngineError> {
        let Some(tax_id) = turn.session.customer.as_ref().map(|c| c.tax_id.clone()) else {
            log::warn!("engine: {} in main menu without a customer", turn.session.phone);
            return self.say(turn, self.replies.not_understood()).await;
        };
        let invoices = self.directory.list_open_invoices(&tax_id).await?;
        if invoices.is_empty() {
            self.say(turn, self.replies.no_open_invoices()).await?;
        } else {
            self.say(turn, self.replies.invoice_summary(invoices.len()))
                .await?;
            for invoice in &invoices {
                self.say(turn, self.replies.invoice(invoice)).await?;
            }
        }
        self.say(turn, self.replies.back_or_exit()).await
    }

    async fn hand_off(&self, turn: &mut Turn) -> Result<(), EngineError> {
        self.say(turn, self.replies.handoff()).await?;
        let customer = turn.session.customer.as_ref();
        let request = HandoffRequest {
            correlation_id: turn.session.correlation_id.clone(),
            phone: turn.session.phone.clone(),
            customer_id: customer.map(|c| c.customer_id.clone()),
            tax_id: customer.map(|c| c.tax_id.clone()),
            queue_id: None,
        };
        self.handoff.transfer(&request).await?;
        turn.session.state = ConversationState::Finished;
        Ok(())
    }

    /// Send a bot message, then record it.
    async fn say(&self, turn: &mut Turn, text: String) -> Result<(), EngineError> {
        self.messenger
            .send_text(&turn.session.address, &text)
            .await?;
        turn.sent += 1;
        self.record(&mut turn.session, Speaker::Bot, &text).await;
        Ok(())
    }

    /// Append to the transcript and, once a persisted record exists, push the update.
    /// Persistence failures are logged and never abort the turn.
    async fn record(&self, session: &mut Session, speaker: Speaker, text: &str) {
        session.push(speaker, text);
        if !session.recorded {
            return;
        }
        if let Err(e) = self
            .directory
            .update_transcript(&session.correlation_id, &session.transcript)
            .await
        {
            log::warn!(
                "engine: transcript update for {} failed: {}",
                session.correlation_id,
                e
            );
        }
    }

    /// Persist the initial service record for a newly identified customer.
    /// A session that already has one (a retried turn) only receives transcript updates.
    async fn open_record(&self, session: &mut Session) {
        if session.recorded {
            return;
        }
        let Some(customer) = session.customer.as_ref() else {
            return;
        };
        match self
            .directory
            .record_service_session(
                &session.correlation_id,
                &customer.customer_id,
                &customer.tax_id,
                &session.transcript,
            )
            .await
        {
            Ok(()) => session.recorded = true,
            Err(e) => log::warn!(
                "engine: service record for {} not saved: {}",
                session.correlation_id,
                e
            ),
        }
    }
}
