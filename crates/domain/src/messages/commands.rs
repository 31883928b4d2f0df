//! Commands: requests for exactly one state change.

use chrono::NaiveDate;
use common::{BatchReference, OrderId, Sku};
use serde::{Deserialize, Serialize};

/// Registers a newly purchased batch of stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatch {
    /// Reference of the new batch.
    #[serde(rename = "ref")]
    pub reference: BatchReference,

    /// Product the batch contains.
    pub sku: Sku,

    /// Number of units purchased.
    #[serde(rename = "qty")]
    pub quantity: u32,

    /// Expected arrival date. `None` means the stock is already in the warehouse.
    #[serde(default)]
    pub eta: Option<NaiveDate>,
}

impl CreateBatch {
    /// Creates a new CreateBatch command.
    pub fn new(
        reference: impl Into<BatchReference>,
        sku: impl Into<Sku>,
        quantity: u32,
        eta: Option<NaiveDate>,
    ) -> Self {
        Self {
            reference: reference.into(),
            sku: sku.into(),
            quantity,
            eta,
        }
    }
}

/// Allocates an order line to the best available batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocate {
    #[serde(rename = "orderid")]
    pub order_id: OrderId,

    pub sku: Sku,

    #[serde(rename = "qty")]
    pub quantity: u32,
}

impl Allocate {
    /// Creates a new Allocate command.
    pub fn new(order_id: impl Into<OrderId>, sku: impl Into<Sku>, quantity: u32) -> Self {
        Self {
            order_id: order_id.into(),
            sku: sku.into(),
            quantity,
        }
    }
}

/// Changes the purchased quantity of an existing batch.
///
/// Shrinking a batch below what is already allocated to it bumps order lines
/// off the batch until it fits again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatchQuantity {
    #[serde(rename = "ref")]
    pub reference: BatchReference,

    #[serde(rename = "qty")]
    pub quantity: u32,
}

impl ChangeBatchQuantity {
    /// Creates a new ChangeBatchQuantity command.
    pub fn new(reference: impl Into<BatchReference>, quantity: u32) -> Self {
        Self {
            reference: reference.into(),
            quantity,
        }
    }
}

/// Every command the allocation service accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    CreateBatch(CreateBatch),
    Allocate(Allocate),
    ChangeBatchQuantity(ChangeBatchQuantity),
}

impl Command {
    /// Returns the tag used to route this command to its handler.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateBatch(_) => CommandKind::CreateBatch,
            Command::Allocate(_) => CommandKind::Allocate,
            Command::ChangeBatchQuantity(_) => CommandKind::ChangeBatchQuantity,
        }
    }
}

/// Routing tag of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateBatch,
    Allocate,
    ChangeBatchQuantity,
}

impl CommandKind {
    /// All command kinds, in declaration order.
    pub const ALL: [CommandKind; 3] = [
        CommandKind::CreateBatch,
        CommandKind::Allocate,
        CommandKind::ChangeBatchQuantity,
    ];

    /// Returns the kind name, identical to the serialized `type` tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::CreateBatch => "CreateBatch",
            CommandKind::Allocate => "Allocate",
            CommandKind::ChangeBatchQuantity => "ChangeBatchQuantity",
        }
    }

    /// Looks a kind up by its serialized tag.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A concrete command struct that can be registered with a handler.
pub trait CommandType: Into<Command> + Send + 'static {
    /// The routing tag of this command type.
    const KIND: CommandKind;

    /// Unwraps the concrete command, handing the original back on mismatch.
    fn try_from_command(command: Command) -> Result<Self, Command>;
}

macro_rules! command_type {
    ($ty:ident) => {
        impl From<$ty> for Command {
            fn from(command: $ty) -> Self {
                Command::$ty(command)
            }
        }

        impl CommandType for $ty {
            const KIND: CommandKind = CommandKind::$ty;

            fn try_from_command(command: Command) -> Result<Self, Command> {
                match command {
                    Command::$ty(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }
    };
}

command_type!(CreateBatch);
command_type!(Allocate);
command_type!(ChangeBatchQuantity);
