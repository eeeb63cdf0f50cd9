pub mod channels;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::payload::Payload;

/// Channel name conversations created by inbound webhook calls live under.
pub const WEBHOOK_CHANNEL: &str = "webhook";

/// A chat message posted to the relay's inbound endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// External (MixItUp) user id
    pub user_id: String,
    /// External conversation id
    pub conversation_id: String,
    /// The message text
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub channel: String,
    /// External id the conversation is keyed by.
    pub tag: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub tag: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "incoming" => Some(Direction::Incoming),
            "outgoing" => Some(Direction::Outgoing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub conversation_id: String,
    pub user_id: Option<String>,
    pub direction: Direction,
    pub payload: Payload,
    pub created_at: String,
}

/// The bot platform's conversation and user records, as the relay needs them.
/// Both get-or-create calls are idempotent on their external tag.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_or_create_conversation(&self, channel: &str, tag: &str) -> Result<Conversation>;

    async fn find_conversation(&self, channel: &str, tag: &str) -> Result<Option<Conversation>>;

    async fn get_or_create_user(&self, tag: &str) -> Result<User>;

    async fn create_message(
        &self,
        conversation_id: &str,
        user_id: Option<&str>,
        direction: Direction,
        payload: &Payload,
    ) -> Result<Message>;

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;
}

/// Record an inbound message: ensure its conversation and user exist, then
/// store it as a text message.
pub async fn ingest(store: &dyn ConversationStore, incoming: &IncomingMessage) -> Result<Message> {
    let conversation = store
        .get_or_create_conversation(WEBHOOK_CHANNEL, &incoming.conversation_id)
        .await?;
    let user = store.get_or_create_user(&incoming.user_id).await?;

    store
        .create_message(
            &conversation.id,
            Some(&user.id),
            Direction::Incoming,
            &Payload::text(incoming.text.clone()),
        )
        .await
}

/// Messages recorded under `(channel, tag)`, oldest first. An unknown
/// conversation has no history and is not created.
pub async fn history(store: &dyn ConversationStore, channel: &str, tag: &str) -> Result<Vec<Message>> {
    match store.find_conversation(channel, tag).await? {
        Some(conversation) => store.list_messages(&conversation.id).await,
        None => Ok(Vec::new()),
    }
}
