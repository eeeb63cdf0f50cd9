pub mod types;

use std::collections::HashSet;

use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};
use tracing::{debug, error, info, warn};

pub use types::{ChatMessage, PlatformData, Profile, UserEnvelope, UserPage};

/// Client for the MixItUp developer REST API (`/api/v2`).
#[derive(Clone)]
pub struct MixItUpClient {
    client: reqwest::Client,
    base_url: String,
}

impl MixItUpClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, path)
    }

    /// Post a chat message into the streamer's chat.
    pub async fn send_chat_message(&self, message: &ChatMessage) -> Result<()> {
        let url = self.url("chat/message");
        debug!("Sending chat message to MixItUp: {}", url);

        let response = self
            .client
            .post(&url)
            .json(message)
            .send()
            .await
            .context("Failed to send chat message to MixItUp")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("MixItUp rejected chat message ({}): {}", status, body);
            anyhow::bail!("MixItUp API error ({}): {}", status, body);
        }

        info!("Chat message sent to MixItUp on {}", message.platform);
        Ok(())
    }

    /// `users/{id}` with the id percent-encoded as a single path segment.
    fn user_url(&self, user_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.url("users"))
            .with_context(|| format!("Invalid MixItUp base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("MixItUp base URL cannot carry a path: {}", self.base_url))?
            .push(user_id);
        Ok(url)
    }

    /// Fetch one user profile by its MixItUp id.
    pub async fn get_user(&self, user_id: &str) -> Result<Profile> {
        let url = self.user_url(user_id)?;
        debug!("Fetching MixItUp user: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch MixItUp user {user_id}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("MixItUp API error ({}): {}", status, body);
        }

        let envelope: UserEnvelope = response
            .json()
            .await
            .context("Failed to parse MixItUp user response")?;
        Ok(envelope.user)
    }

    /// Fetch one page of users.
    pub async fn list_users(&self, skip: u64, page_size: u32) -> Result<UserPage> {
        let url = self.url("users");
        debug!("Listing MixItUp users: skip={} page_size={}", skip, page_size);

        let response = self
            .client
            .get(&url)
            .query(&[("skip", skip.to_string()), ("pageSize", page_size.to_string())])
            .send()
            .await
            .context("Failed to list MixItUp users")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("MixItUp API error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse MixItUp user list")
    }

    /// Fetch every user, page by page, until a short page, `TotalCount`, or
    /// a page with no unseen ids (a server that ignores `skip`).
    pub async fn list_all_users(&self, page_size: u32) -> Result<Vec<Profile>> {
        let page_size = page_size.max(1);
        let mut users: Vec<Profile> = Vec::new();
        let mut seen = HashSet::new();
        loop {
            let page = self.list_users(users.len() as u64, page_size).await?;
            let fetched = page.users.len();
            let before = users.len();
            users.extend(
                page.users
                    .into_iter()
                    .filter(|profile| seen.insert(profile.id.clone())),
            );

            if fetched > 0 && users.len() == before {
                warn!(
                    "MixItUp returned a page of already seen users at skip={}, stopping",
                    before
                );
                break;
            }

            let reached_total = page
                .total_count
                .is_some_and(|total| users.len() as u64 >= total);
            if fetched < page_size as usize || reached_total {
                break;
            }
        }
        info!("Fetched {} MixItUp users", users.len());
        Ok(users)
    }

    /// Liveness check: `GET /api/v2/status/version` must answer 200.
    pub async fn check_status(&self) -> Result<String> {
        let url = self.url("status/version");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("MixItUp endpoint URL is not reachable")?;

        if response.status() != StatusCode::OK {
            anyhow::bail!(
                "MixItUp endpoint URL is not responsive ({})",
                response.status()
            );
        }
        Ok(response.text().await.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn profile_json(id: &str) -> serde_json::Value {
        json!({"ID": id, "Notes": null, "PlatformData": {}})
    }

    #[tokio::test]
    async fn test_send_chat_message_posts_pascal_case_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/chat/message")
            .match_body(Matcher::Json(json!({
                "Message": "hello",
                "Platform": "Twitch",
                "SendAsStreamer": false
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = MixItUpClient::new(reqwest::Client::new(), &server.url());
        let msg = ChatMessage {
            message: "hello".into(),
            platform: "Twitch".into(),
            send_as_streamer: false,
        };
        client.send_chat_message(&msg).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_chat_message_surfaces_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v2/chat/message")
            .with_status(503)
            .with_body("offline")
            .create_async()
            .await;

        let client = MixItUpClient::new(reqwest::Client::new(), &server.url());
        let msg = ChatMessage {
            message: "hello".into(),
            platform: "Twitch".into(),
            send_as_streamer: false,
        };
        let err = client.send_chat_message(&msg).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_get_user_unwraps_envelope() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/users/abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"User": profile_json("abc")}).to_string())
            .create_async()
            .await;

        let client = MixItUpClient::new(reqwest::Client::new(), &server.url());
        let profile = client.get_user("abc").await.unwrap();
        assert_eq!(profile.id, "abc");
    }

    #[tokio::test]
    async fn test_list_all_users_pages_until_short_page() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/api/v2/users")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("skip".into(), "0".into()),
                Matcher::UrlEncoded("pageSize".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(json!({"Users": [profile_json("a"), profile_json("b")]}).to_string())
            .create_async()
            .await;
        let second = server
            .mock("GET", "/api/v2/users")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("skip".into(), "2".into()),
                Matcher::UrlEncoded("pageSize".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(json!({"Users": [profile_json("c")]}).to_string())
            .create_async()
            .await;

        let client = MixItUpClient::new(reqwest::Client::new(), &server.url());
        let users = client.list_all_users(2).await.unwrap();
        let ids: Vec<_> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_all_users_stops_at_total_count() {
        let mut server = mockito::Server::new_async().await;
        let only = server
            .mock("GET", "/api/v2/users")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({"TotalCount": 2, "Users": [profile_json("a"), profile_json("b")]})
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let client = MixItUpClient::new(reqwest::Client::new(), &server.url());
        assert_eq!(client.list_all_users(2).await.unwrap().len(), 2);
        only.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_all_users_stops_when_skip_is_ignored() {
        let mut server = mockito::Server::new_async().await;
        let pages = server
            .mock("GET", "/api/v2/users")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"Users": [profile_json("a"), profile_json("b")]}).to_string())
            .expect(2)
            .create_async()
            .await;

        let client = MixItUpClient::new(reqwest::Client::new(), &server.url());
        let users = client.list_all_users(2).await.unwrap();
        let ids: Vec<_> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        pages.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_user_encodes_id_as_one_segment() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v2/users/team%2Fa%3Fb")
            .with_status(200)
            .with_body(json!({"User": profile_json("team/a?b")}).to_string())
            .create_async()
            .await;

        let client = MixItUpClient::new(reqwest::Client::new(), &server.url());
        let profile = client.get_user("team/a?b").await.unwrap();
        assert_eq!(profile.id, "team/a?b");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_check_status() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/api/v2/status/version")
            .with_status(200)
            .with_body("1.0.0")
            .create_async()
            .await;
        let client = MixItUpClient::new(reqwest::Client::new(), &server.url());
        assert_eq!(client.check_status().await.unwrap(), "1.0.0");
    }

    #[tokio::test]
    async fn test_check_status_rejects_non_200() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/status/version")
            .with_status(204)
            .create_async()
            .await;
        let client = MixItUpClient::new(reqwest::Client::new(), &server.url());
        let err = client.check_status().await.unwrap_err();
        assert!(err.to_string().contains("not responsive"));
    }
}
