//! Message types flowing through the bus.
//!
//! This module is a leaf: it knows nothing about aggregates. The model
//! imports it to record what happened, never the other way round.

mod commands;
mod events;

pub use commands::{Allocate, ChangeBatchQuantity, Command, CommandKind, CommandType, CreateBatch};
pub use events::{Allocated, Deallocated, Event, EventKind, EventType, OutOfStock};

use serde::{Deserialize, Serialize};

/// Anything the message bus can route: a command or an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Event(Event),
}

impl Message {
    /// Returns the message type name.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Command(command) => command.kind().as_str(),
            Message::Event(event) => event.kind().as_str(),
        }
    }

    /// Returns true for commands.
    pub fn is_command(&self) -> bool {
        matches!(self, Message::Command(_))
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Message::Command(command)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Message::Event(event)
    }
}

macro_rules! into_message {
    ($($ty:ident => $via:ident),* $(,)?) => {
        $(
            impl From<$ty> for Message {
                fn from(message: $ty) -> Self {
                    Message::from($via::from(message))
                }
            }
        )*
    };
}

into_message! {
    CreateBatch => Command,
    Allocate => Command,
    ChangeBatchQuantity => Command,
    Allocated => Event,
    Deallocated => Event,
    OutOfStock => Event,
}
