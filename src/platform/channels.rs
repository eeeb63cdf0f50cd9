use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use super::{ConversationStore, Direction, WEBHOOK_CHANNEL};
use crate::mixitup::{ChatMessage, MixItUpClient};
use crate::payload::Payload;
use crate::webhook::WebhookClient;

/// Channel name for replies posted straight into MixItUp chat.
pub const ENDPOINT_CHANNEL: &str = "endpoint";

/// Delivers bot replies to MixItUp over either leg.
#[derive(Clone)]
pub struct Outbound {
    webhook: WebhookClient,
    mixitup: MixItUpClient,
    store: Arc<dyn ConversationStore>,
    platform: String,
    send_as_streamer: bool,
}

impl Outbound {
    pub fn new(
        webhook: WebhookClient,
        mixitup: MixItUpClient,
        store: Arc<dyn ConversationStore>,
        platform: &str,
        send_as_streamer: bool,
    ) -> Self {
        Self {
            webhook,
            mixitup,
            store,
            platform: platform.to_string(),
            send_as_streamer,
        }
    }

    /// Push the payload to the webhook. When `conversation` is given the reply
    /// is recorded under it once delivered.
    pub async fn send_webhook(&self, conversation: Option<&str>, payload: &Payload) -> Result<()> {
        self.webhook.send(payload).await?;
        self.record(WEBHOOK_CHANNEL, conversation, payload).await
    }

    /// Post the payload into chat, rendered as a single chat line.
    pub async fn send_chat(&self, conversation: Option<&str>, payload: &Payload) -> Result<()> {
        self.send_chat_as(conversation, payload, &self.platform, self.send_as_streamer)
            .await
    }

    pub async fn send_chat_as(
        &self,
        conversation: Option<&str>,
        payload: &Payload,
        platform: &str,
        send_as_streamer: bool,
    ) -> Result<()> {
        payload.validate()?;
        let message = ChatMessage::from_payload(payload, platform, send_as_streamer);
        self.mixitup.send_chat_message(&message).await?;
        self.record(ENDPOINT_CHANNEL, conversation, payload).await
    }

    async fn record(&self, channel: &str, conversation: Option<&str>, payload: &Payload) -> Result<()> {
        let Some(tag) = conversation else {
            return Ok(());
        };
        let conversation = self.store.get_or_create_conversation(channel, tag).await?;
        let message = self
            .store
            .create_message(&conversation.id, None, Direction::Outgoing, payload)
            .await?;
        info!(
            "Recorded outgoing {} message {} in conversation {}",
            message.kind, message.id, tag
        );
        Ok(())
    }
}
