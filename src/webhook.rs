use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::payload::Payload;

/// Pushes validated payloads to the configured MixItUp webhook.
#[derive(Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    url: String,
}

impl WebhookClient {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    /// Validate `payload` and post it unchanged as the request body.
    /// Nothing is sent when validation fails.
    pub async fn send(&self, payload: &Payload) -> Result<()> {
        payload.validate()?;

        debug!("Posting {} payload to webhook {}", payload.kind(), self.url);
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .context("Failed to send payload to MixItUp webhook")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Webhook rejected {} payload ({}): {}", payload.kind(), status, body);
            anyhow::bail!("Webhook error ({}): {}", status, body);
        }

        info!("Message sent to MixItUp webhook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::tests::all_variants;
    use crate::payload::{AudioPayload, PayloadError};
    use mockito::Matcher;

    #[tokio::test]
    async fn test_every_variant_survives_the_trip() {
        let mut server = mockito::Server::new_async().await;
        let client = WebhookClient::new(reqwest::Client::new(), &format!("{}/hook", server.url()));

        for payload in all_variants() {
            let wire = serde_json::to_value(&payload).unwrap();
            let mock = server
                .mock("POST", "/hook")
                .match_body(Matcher::Json(wire.clone()))
                .with_status(200)
                .create_async()
                .await;

            client.send(&payload).await.unwrap();
            mock.assert_async().await;

            // What the receiver got parses back into the same, still-valid payload.
            let received: Payload = serde_json::from_value(wire).unwrap();
            assert_eq!(received, payload);
            assert!(received.validate().is_ok());
        }
    }

    #[tokio::test]
    async fn test_invalid_payload_is_never_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = WebhookClient::new(reqwest::Client::new(), &server.url());
        let payload = Payload::Audio(AudioPayload {
            audio_url: "not-a-url".into(),
        });
        let err = client.send(&payload).await.unwrap_err();
        let invalid = err.downcast_ref::<PayloadError>().unwrap();
        let PayloadError::Invalid { violations, .. } = invalid;
        assert_eq!(violations[0].field, "audioUrl");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .create_async()
            .await;

        let client = WebhookClient::new(reqwest::Client::new(), &format!("{}/", server.url()));
        assert!(client.send(&Payload::text("hi")).await.is_err());
    }
}
