use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::TableConfig;
use crate::users::mapper::UserRecord;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    rows: &'a [UserRecord],
    key_column: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest {
    ids: Vec<String>,
    delete_all_rows: bool,
}

/// Client for the bot platform's hosted user table.
#[derive(Clone)]
pub struct TableClient {
    client: reqwest::Client,
    config: TableConfig,
}

impl TableClient {
    pub fn new(client: reqwest::Client, config: TableConfig) -> Self {
        Self { client, config }
    }

    fn rows_url(&self, action: &str) -> String {
        format!(
            "{}/v1/tables/{}/rows/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.name,
            action
        )
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("x-bot-id", &self.config.bot_id)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .context("Failed to reach the user table")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("User table request failed ({}): {}", status, body);
            anyhow::bail!("Table API error ({}): {}", status, body);
        }

        let text = response.text().await.unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).context("Failed to parse table API response")
    }

    /// Insert or update rows keyed by the configured key column.
    pub async fn upsert_rows(&self, rows: &[UserRecord]) -> Result<Value> {
        let url = self.rows_url("upsert");
        debug!("Upserting {} row(s) into {}", rows.len(), self.config.name);
        self.post(
            &url,
            &UpsertRequest {
                rows,
                key_column: &self.config.key_column,
            },
        )
        .await
    }

    /// Delete every row in the table.
    pub async fn delete_all_rows(&self) -> Result<Value> {
        let url = self.rows_url("delete");
        debug!("Deleting all rows from {}", self.config.name);
        self.post(
            &url,
            &DeleteRequest {
                ids: Vec::new(),
                delete_all_rows: true,
            },
        )
        .await
    }
}
