//! Events: facts that already happened.

use common::{BatchReference, OrderId, Sku};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An order line was allocated to a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocated {
    #[serde(rename = "orderid")]
    pub order_id: OrderId,

    pub sku: Sku,

    #[serde(rename = "qty")]
    pub quantity: u32,

    #[serde(rename = "batchref")]
    pub batch_reference: BatchReference,
}

/// An order line was bumped off its batch and needs to be allocated again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deallocated {
    #[serde(rename = "orderid")]
    pub order_id: OrderId,

    pub sku: Sku,

    #[serde(rename = "qty")]
    pub quantity: u32,
}

/// No batch of the product could take an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfStock {
    pub sku: Sku,
}

/// Every event the allocation service emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    Allocated(Allocated),
    Deallocated(Deallocated),
    OutOfStock(OutOfStock),
}

impl Event {
    /// Returns the tag used to route this event to its handlers.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Allocated(_) => EventKind::Allocated,
            Event::Deallocated(_) => EventKind::Deallocated,
            Event::OutOfStock(_) => EventKind::OutOfStock,
        }
    }

    /// Renders the event's fields as a flat key/value record, without the
    /// type tag. This is the shape handed to external publishers.
    pub fn to_record(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut record)) => {
                record.remove("type");
                record
            }
            _ => Map::new(),
        }
    }
}

/// Routing tag of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Allocated,
    Deallocated,
    OutOfStock,
}

impl EventKind {
    /// All event kinds, in declaration order.
    pub const ALL: [EventKind; 3] = [
        EventKind::Allocated,
        EventKind::Deallocated,
        EventKind::OutOfStock,
    ];

    /// Returns the kind name, identical to the serialized `type` tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Allocated => "Allocated",
            EventKind::Deallocated => "Deallocated",
            EventKind::OutOfStock => "OutOfStock",
        }
    }

    /// Looks a kind up by its serialized tag.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A concrete event struct that handlers can subscribe to.
pub trait EventType: Into<Event> + Clone + Send + 'static {
    /// The routing tag of this event type.
    const KIND: EventKind;

    /// Unwraps the concrete event, handing the original back on mismatch.
    fn try_from_event(event: Event) -> Result<Self, Event>;
}

macro_rules! event_type {
    ($ty:ident) => {
        impl From<$ty> for Event {
            fn from(event: $ty) -> Self {
                Event::$ty(event)
            }
        }

        impl EventType for $ty {
            const KIND: EventKind = EventKind::$ty;

            fn try_from_event(event: Event) -> Result<Self, Event> {
                match event {
                    Event::$ty(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }
    };
}

event_type!(Allocated);
event_type!(Deallocated);
event_type!(OutOfStock);
