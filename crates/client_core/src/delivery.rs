use std::sync::Arc;

use anyhow::anyhow;
use shared::protocol::{Message, OutgoingMessage};
use tracing::{debug, warn};

use crate::{
    api::ChatApi,
    channel::RealtimeChannel,
    error::{ChannelError, SendError},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Handed to the channel; the `new-message` echo updates the stores.
    Channel,
    /// Persisted over request/response; the caller applies the returned
    /// message, which carries the server-assigned id.
    Fallback(Message),
}

#[derive(Clone)]
pub struct DeliveryPath {
    channel: Arc<RealtimeChannel>,
    api: Arc<dyn ChatApi>,
}

impl DeliveryPath {
    pub fn new(channel: Arc<RealtimeChannel>, api: Arc<dyn ChatApi>) -> Self {
        Self { channel, api }
    }

    pub async fn send_message(&self, outgoing: OutgoingMessage) -> Result<Delivery, SendError> {
        if self.channel.is_connected() {
            match self.channel.send(outgoing.clone()) {
                Ok(()) => {
                    debug!(
                        conversation_id = %outgoing.conversation_id,
                        "delivery: handed message to channel"
                    );
                    return Ok(Delivery::Channel);
                }
                Err(ChannelError::NotConnected) => {
                    debug!("delivery: channel dropped before send; using fallback");
                }
                Err(err) => return Err(SendError::Transport(err.into())),
            }
        }

        let conversation_id = outgoing.conversation_id.clone();
        let persisted = self.api.send_message(&outgoing).await.map_err(|err| {
            warn!(conversation_id = %conversation_id, "delivery: fallback send failed: {err:#}");
            SendError::Transport(err)
        })?;

        if persisted.conversation_id != conversation_id {
            warn!(
                conversation_id = %conversation_id,
                message_id = %persisted.id,
                "delivery: server echoed a different conversation"
            );
            return Err(SendError::Transport(anyhow!(
                "server stored message {} in {} instead of {}",
                persisted.id,
                persisted.conversation_id,
                conversation_id
            )));
        }

        debug!(
            conversation_id = %conversation_id,
            message_id = %persisted.id,
            "delivery: message persisted via fallback"
        );
        Ok(Delivery::Fallback(persisted))
    }
}

#[cfg(test)]
#[path = "tests/delivery_tests.rs"]
mod tests;
