//! Messaging channel: inbound webhook model and the outbound messenger.
//!
//! Inbound events arrive as webhook POSTs and are decoded into [`InboundEvent`]s.
//! Replies go out through a [`Messenger`]; [`EvolutionChannel`] is the HTTP implementation.

mod evolution;
mod inbound;

pub use evolution::{EvolutionChannel, Messenger, MessengerError, WEBHOOK_EVENTS};
pub use inbound::{InboundEvent, MessageKey, Payload, Timestamp, UndecodedEvent, WebhookEnvelope};
