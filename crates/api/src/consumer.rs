//! Consumer for messages published by other processes.
//!
//! Two shapes are accepted: the compact `{"batchref": .., "qty": ..}` body
//! published on the `change_batch_quantity` channel, and any fully tagged
//! message (`{"type": "Allocate", ..}`).

use common::BatchReference;
use domain::{ChangeBatchQuantity, Message};
use serde::Deserialize;
use serde_json::Value;
use service::{CommandOutcome, MessageBus, decode_value};
use store::Backend;
use tracing::{info, warn};

#[derive(Deserialize)]
struct BatchQuantityChanged {
    batchref: BatchReference,
    qty: u32,
}

/// Decodes an external payload into a bus message.
pub fn decode_external(payload: &str) -> service::Result<Message> {
    let value: Value = serde_json::from_str(payload)?;
    if value.get("type").is_some() {
        return decode_value(value);
    }

    let change: BatchQuantityChanged = serde_json::from_value(value)?;
    Ok(ChangeBatchQuantity::new(change.batchref, change.qty).into())
}

/// Runs one external message on the bus.
///
/// Failures are logged and swallowed so a bad message never stops the
/// consumer. Returns the command results when the message was handled.
#[tracing::instrument(skip_all)]
pub async fn handle_external_message<B: Backend>(
    bus: &MessageBus<B>,
    payload: &str,
) -> Option<Vec<CommandOutcome>> {
    metrics::counter!("external_messages_total").increment(1);

    let message = match decode_external(payload) {
        Ok(message) => message,
        Err(err) => {
            metrics::counter!("external_messages_rejected_total").increment(1);
            warn!(error = %err, payload, "Dropping undecodable message");
            return None;
        }
    };

    let name = message.name();
    match bus.handle(message).await {
        Ok(results) => {
            info!(message = name, "External message handled");
            Some(results)
        }
        Err(err) => {
            metrics::counter!("external_messages_rejected_total").increment(1);
            warn!(message = name, error = %err, "External message failed");
            None
        }
    }
}
