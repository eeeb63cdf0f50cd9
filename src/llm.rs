use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GenerationConfig;

pub const UNKNOWN_MODEL_ID: &str = "unknown-model-id";
pub const UNKNOWN_PROVIDER: &str = "Unknown Provider";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPricing {
    pub cost_per_1m_tokens: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub description: String,
    pub tags: Vec<String>,
    pub input: TokenPricing,
    pub output: TokenPricing,
}

impl ModelInfo {
    fn catalog_entry(id: &str, name: &str, description: &str, tag: &str) -> Self {
        let free = TokenPricing {
            cost_per_1m_tokens: 0.0,
            max_tokens: 0,
        };
        Self {
            id: id.to_string(),
            name: name.to_string(),
            provider: "Hugging Face".to_string(),
            description: description.to_string(),
            tags: vec![tag.to_string()],
            input: free,
            output: free,
        }
    }

    fn unknown() -> Self {
        let free = TokenPricing {
            cost_per_1m_tokens: 0.0,
            max_tokens: 0,
        };
        Self {
            id: UNKNOWN_MODEL_ID.to_string(),
            name: "Unknown".to_string(),
            provider: UNKNOWN_PROVIDER.to_string(),
            description: String::new(),
            tags: Vec::new(),
            input: free,
            output: free,
        }
    }
}

/// Models served by the local generation endpoint.
pub fn list_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::catalog_entry("gpt2", "GPT-2", "Local GPT-2 checkpoint", "general-purpose"),
        ModelInfo::catalog_entry(
            "distilgpt2",
            "DistilGPT-2",
            "https://huggingface.co/distilgpt2",
            "general-purpose",
        ),
        ModelInfo::catalog_entry(
            "distilbert-base-uncased",
            "DistilBERT",
            "distilbert-base-uncased",
            "roleplay",
        ),
    ]
}

pub fn find_model(id: &str) -> Option<ModelInfo> {
    list_models().into_iter().find(|m| m.id == id)
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,
    #[error("Failed to generate text: {0:#}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    text: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generated_text: String,
}

/// Thin client for the text-generation backend.
#[derive(Clone)]
pub struct GenerationClient {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl GenerationClient {
    pub fn new(client: reqwest::Client, config: GenerationConfig) -> Self {
        Self { client, config }
    }

    /// Returns the generated text. A JSON reply carrying `generated_text` is
    /// unwrapped; any other body is returned as is.
    pub async fn generate_text(&self, prompt: &str, model: &str) -> anyhow::Result<String> {
        let request = GenerateRequest {
            text: prompt,
            model,
            device: self.config.device,
        };

        debug!("Sending prompt to generation endpoint: {}", self.config.endpoint);

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to generation endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Generation endpoint error ({}): {}", status, error_body);
        }

        let body = response
            .text()
            .await
            .context("Failed to read generation response")?;

        Ok(match serde_json::from_str::<GenerateResponse>(&body) {
            Ok(parsed) => parsed.generated_text,
            Err(_) => body,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub role: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub index: u32,
    pub stop_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub input_cost: f64,
    pub output_tokens: u64,
    pub output_cost: f64,
}

impl Usage {
    /// Word-count estimate priced at the model's per-million rates.
    pub fn estimate(model: &ModelInfo, prompt: &str, completion: &str) -> Self {
        let input_tokens = count_tokens(prompt);
        let output_tokens = count_tokens(completion);
        Self {
            input_tokens,
            input_cost: price(input_tokens, model.input.cost_per_1m_tokens),
            output_tokens,
            output_cost: price(output_tokens, model.output.cost_per_1m_tokens),
        }
    }

    pub fn cost(&self) -> f64 {
        self.input_cost + self.output_cost
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOutput {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    pub cost: f64,
}

pub fn count_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn price(tokens: u64, cost_per_1m_tokens: f64) -> f64 {
    tokens as f64 * cost_per_1m_tokens / 1_000_000.0
}

pub struct ContentGenerator {
    client: GenerationClient,
}

impl ContentGenerator {
    pub fn new(client: GenerationClient) -> Self {
        Self { client }
    }

    pub async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
    ) -> Result<GenerationOutput, GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let model = find_model(model_id).unwrap_or_else(|| {
            warn!("Model '{}' is not in the catalog, reporting as unknown", model_id);
            ModelInfo::unknown()
        });

        let content = self.client.generate_text(prompt, model_id).await?;
        let usage = Usage::estimate(&model, prompt, &content);
        info!(
            "Generated {} word(s) with {} ({} in)",
            usage.output_tokens, model.id, usage.input_tokens
        );

        Ok(GenerationOutput {
            id: Uuid::new_v4().to_string(),
            provider: model.provider,
            model: model.id,
            choices: vec![Choice {
                role: "assistant".to_string(),
                kind: "text".to_string(),
                content,
                index: 0,
                stop_reason: "stop".to_string(),
            }],
            cost: usage.cost(),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn generator(server: &mockito::Server) -> ContentGenerator {
        ContentGenerator::new(GenerationClient::new(
            reqwest::Client::new(),
            GenerationConfig {
                endpoint: format!("{}/generate", server.url()),
                device: Some(0),
            },
        ))
    }

    #[test]
    fn test_catalog() {
        let ids: Vec<_> = list_models().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["gpt2", "distilgpt2", "distilbert-base-uncased"]);
        assert!(find_model("gpt-4").is_none());
    }

    #[test]
    fn test_usage_is_linear_in_words() {
        let mut model = ModelInfo::unknown();
        model.input.cost_per_1m_tokens = 2.0;
        model.output.cost_per_1m_tokens = 10.0;

        let usage = Usage::estimate(&model, "one two  three", "four five");
        assert_eq!(usage.input_tokens, 3);
        assert_eq!(usage.output_tokens, 2);
        assert!((usage.input_cost - 0.000006).abs() < 1e-12);
        assert!((usage.output_cost - 0.00002).abs() < 1e-12);
        assert!((usage.cost() - 0.000026).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_generate_known_model() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate")
            .match_body(Matcher::Json(json!({
                "text": "tell me a joke",
                "model": "gpt2",
                "device": 0
            })))
            .with_status(200)
            .with_body(r#"{"generated_text": "why did the chicken"}"#)
            .create_async()
            .await;

        let output = generator(&server)
            .generate("gpt2", "tell me a joke")
            .await
            .unwrap();

        assert_eq!(output.model, "gpt2");
        assert_eq!(output.provider, "Hugging Face");
        assert_eq!(output.choices[0].content, "why did the chicken");
        assert_eq!(output.usage.input_tokens, 4);
        assert_eq!(output.usage.output_tokens, 4);
        assert_eq!(output.cost, 0.0);
        mock.assert_async().await;

        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["choices"][0]["stopReason"], "stop");
        assert_eq!(value["choices"][0]["type"], "text");
        assert_eq!(value["usage"]["inputTokens"], 4);
    }

    #[tokio::test]
    async fn test_unknown_model_falls_back() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/generate")
            .with_status(200)
            .with_body("plain text reply")
            .create_async()
            .await;

        let output = generator(&server).generate("mystery", "hi").await.unwrap();
        assert_eq!(output.model, UNKNOWN_MODEL_ID);
        assert_eq!(output.provider, UNKNOWN_PROVIDER);
        assert_eq!(output.choices[0].content, "plain text reply");
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = generator(&server).generate("gpt2", "   ").await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyPrompt));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_backend_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/generate")
            .with_status(500)
            .create_async()
            .await;

        let err = generator(&server).generate("gpt2", "hi").await.unwrap_err();
        assert!(matches!(err, GenerationError::Backend(_)));
    }
}
