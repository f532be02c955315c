//! Messages exchanged through the message bus.
//!
//! Commands carry an intent and are handled by exactly one handler whose
//! failure is reported to the caller. Events record facts and fan out to
//! zero or more handlers on a best-effort basis.

mod commands;
mod events;

pub use commands::{
    Allocate, ChangeBatchQuantity, Command, CommandKind, CreateBatch, Deallocate,
};
pub use events::{
    AllocatedData, AllocationRequestedData, DeallocatedData, Event, EventKind, OutOfStockData,
};

/// A command or an event waiting in the bus queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Command(Command),
    Event(Event),
}

impl Message {
    /// Returns the message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Command(command) => command.kind().as_str(),
            Message::Event(event) => event.kind().as_str(),
        }
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

impl From<CreateBatch> for Message {
    fn from(cmd: CreateBatch) -> Self {
        Message::Command(cmd.into())
    }
}

impl From<Allocate> for Message {
    fn from(cmd: Allocate) -> Self {
        Message::Command(cmd.into())
    }
}

impl From<Deallocate> for Message {
    fn from(cmd: Deallocate) -> Self {
        Message::Command(cmd.into())
    }
}

impl From<ChangeBatchQuantity> for Message {
    fn from(cmd: ChangeBatchQuantity) -> Self {
        Message::Command(cmd.into())
    }
}
