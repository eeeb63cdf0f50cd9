use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::payload::Payload;

/// Chat message as accepted by `POST /api/v2/chat/message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChatMessage {
    pub message: String,
    pub platform: String,
    pub send_as_streamer: bool,
}

impl ChatMessage {
    pub fn from_payload(payload: &Payload, platform: &str, send_as_streamer: bool) -> Self {
        Self {
            message: payload.to_chat_text(),
            platform: platform.to_string(),
            send_as_streamer,
        }
    }
}

/// Body of `GET /api/v2/users/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserEnvelope {
    pub user: Profile,
}

/// Body of `GET /api/v2/users`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserPage {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub users: Vec<Profile>,
}

/// A MixItUp user profile. Per-platform details live under `PlatformData`,
/// keyed by platform name, in the order the API returned them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Profile {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub online_viewing_minutes: Option<i64>,
    #[serde(default)]
    pub currency_amounts: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub inventory_amounts: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub stream_pass_amounts: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub custom_title: Option<String>,
    #[serde(default)]
    pub is_specialty_excluded: Option<bool>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub platform_data: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlatformData {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default, rename = "ID")]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_link: Option<String>,
    #[serde(default)]
    pub subscriber_badge_link: Option<String>,
    #[serde(default)]
    pub role_badge_link: Option<String>,
    #[serde(default)]
    pub specialty_badge_link: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub account_date: Option<String>,
    #[serde(default)]
    pub follow_date: Option<String>,
    #[serde(default)]
    pub subscribe_date: Option<String>,
    #[serde(default)]
    pub subscriber_tier: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_message_wire_shape() {
        let msg = ChatMessage::from_payload(&Payload::text("hi"), "Twitch", true);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"Message": "hi", "Platform": "Twitch", "SendAsStreamer": true})
        );
    }

    #[test]
    fn test_profile_parses_sparse_user() {
        let envelope: UserEnvelope = serde_json::from_value(json!({
            "User": {
                "ID": "5f1c",
                "PlatformData": {
                    "YouTube": {"Platform": "YouTube", "Username": "yt"},
                    "Twitch": {"Platform": "Twitch", "Username": "tw"}
                }
            }
        }))
        .unwrap();
        let profile = envelope.user;
        assert_eq!(profile.id, "5f1c");
        assert!(profile.notes.is_none());
        let keys: Vec<_> = profile.platform_data.unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["YouTube", "Twitch"]);
    }

    #[test]
    fn test_user_page_defaults() {
        let page: UserPage = serde_json::from_value(json!({})).unwrap();
        assert!(page.users.is_empty());
        assert!(page.total_count.is_none());
    }
}
