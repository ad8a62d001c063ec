//! Conversation engine: input classification, reply texts, and the state machine.

mod engine;
mod input;
mod replies;

pub use engine::{Engine, EngineError, TurnReport};
pub use input::{classify, Input, MenuOption};
pub use replies::{format_brl, Replies};

#[cfg(test)]
pub(crate) use engine::testing;
