use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::MemoryStore;
use crate::payload::Payload;
use crate::platform::{Conversation, ConversationStore, Direction, Message, User};

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl ConversationStore for MemoryStore {
    /// Get or create the conversation keyed by `(channel, tag)`
    async fn get_or_create_conversation(&self, channel: &str, tag: &str) -> Result<Conversation> {
        let conn = self.conn.lock().await;
        let ts = now();

        conn.execute(
            "INSERT INTO conversations (id, channel, tag, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(channel, tag) DO NOTHING",
            rusqlite::params![Uuid::new_v4().to_string(), channel, tag, &ts],
        )
        .context("Failed to create conversation")?;

        conn.query_row(
            "SELECT id, channel, tag, created_at, updated_at FROM conversations
             WHERE channel = ?1 AND tag = ?2",
            rusqlite::params![channel, tag],
            |row| {
                Ok(Conversation {
                    id: row.get(0)?,
                    channel: row.get(1)?,
                    tag: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .context("Failed to load conversation")
    }

    async fn find_conversation(&self, channel: &str, tag: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, channel, tag, created_at, updated_at FROM conversations
             WHERE channel = ?1 AND tag = ?2",
            rusqlite::params![channel, tag],
            |row| {
                Ok(Conversation {
                    id: row.get(0)?,
                    channel: row.get(1)?,
                    tag: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()
        .context("Failed to look up conversation")
    }

    /// Get or create the user keyed by its external tag
    async fn get_or_create_user(&self, tag: &str) -> Result<User> {
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO users (id, tag, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(tag) DO NOTHING",
            rusqlite::params![Uuid::new_v4().to_string(), tag, now()],
        )
        .context("Failed to create user")?;

        conn.query_row(
            "SELECT id, tag, created_at FROM users WHERE tag = ?1",
            rusqlite::params![tag],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    tag: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .context("Failed to load user")
    }

    async fn create_message(
        &self,
        conversation_id: &str,
        user_id: Option<&str>,
        direction: Direction,
        payload: &Payload,
    ) -> Result<Message> {
        let id = Uuid::new_v4().to_string();
        let created_at = now();
        let payload_json =
            serde_json::to_string(payload).context("Failed to serialize payload")?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO messages (id, conversation_id, user_id, kind, direction, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                &id,
                conversation_id,
                user_id,
                payload.kind(),
                direction.as_str(),
                &payload_json,
                &created_at,
            ],
        )
        .context("Failed to save message")?;

        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![&created_at, conversation_id],
        )?;

        Ok(Message {
            id,
            kind: payload.kind().to_string(),
            conversation_id: conversation_id.to_string(),
            user_id: user_id.map(str::to_string),
            direction,
            payload: payload.clone(),
            created_at,
        })
    }

    /// Load all messages for a conversation, oldest first
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, kind, conversation_id, user_id, direction, payload, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![conversation_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to load messages")?;

        rows.into_iter()
            .map(
                |(id, kind, conversation_id, user_id, direction, payload, created_at)| -> Result<Message> {
                    let direction = Direction::parse(&direction).with_context(|| {
                        format!("Unknown direction '{direction}' on message {id}")
                    })?;
                    let payload: Payload = serde_json::from_str(&payload)
                        .with_context(|| format!("Corrupt payload on message {id}"))?;
                    Ok(Message {
                        id,
                        kind,
                        conversation_id,
                        user_id,
                        direction,
                        payload,
                        created_at,
                    })
                },
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_conversation_is_idempotent() {
        let store = MemoryStore::open_in_memory().unwrap();
        let a = store.get_or_create_conversation("webhook", "conv-1").await.unwrap();
        let b = store.get_or_create_conversation("webhook", "conv-1").await.unwrap();
        let other = store.get_or_create_conversation("endpoint", "conv-1").await.unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(a.tag, "conv-1");
        assert_ne!(a.id, other.id);
    }

    #[tokio::test]
    async fn test_find_conversation_does_not_create() {
        let store = MemoryStore::open_in_memory().unwrap();
        assert!(store.find_conversation("webhook", "c").await.unwrap().is_none());

        let created = store.get_or_create_conversation("webhook", "c").await.unwrap();
        let found = store.find_conversation("webhook", "c").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(store.find_conversation("endpoint", "c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_create_user_is_idempotent() {
        let store = MemoryStore::open_in_memory().unwrap();
        let a = store.get_or_create_user("user-1").await.unwrap();
        let b = store.get_or_create_user("user-1").await.unwrap();
        let c = store.get_or_create_user("user-2").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_messages_round_trip_rich_payloads() {
        let store = MemoryStore::open_in_memory().unwrap();
        let conv = store.get_or_create_conversation("webhook", "c").await.unwrap();

        for payload in crate::payload::tests::all_variants() {
            store
                .create_message(&conv.id, None, Direction::Outgoing, &payload)
                .await
                .unwrap();
        }

        let loaded = store.list_messages(&conv.id).await.unwrap();
        let kinds: Vec<_> = loaded.iter().map(|m| m.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["text", "image", "audio", "video", "file", "card", "carousel", "location"]
        );
        assert!(loaded.iter().all(|m| m.user_id.is_none()));
    }

    #[tokio::test]
    async fn test_message_requires_existing_conversation() {
        let store = MemoryStore::open_in_memory().unwrap();
        let result = store
            .create_message("missing", None, Direction::Incoming, &Payload::text("x"))
            .await;
        assert!(result.is_err());
    }
}
