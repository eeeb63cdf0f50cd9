use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the table store bearer token.
pub const TOKEN_ENV: &str = "BOTPRESS_TOKEN";
/// Environment variable holding the table store bot (tenant) id.
pub const BOT_ID_ENV: &str = "BOTPRESS_BOT_ID";
/// Overrides the MixItUp base URL for the table sync utilities.
pub const SYNC_BASE_URL_ENV: &str = "MIXITUP_BASE_URL";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub mixitup: MixItUpConfig,
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default = "default_table_config")]
    pub table: TableConfig,
    #[serde(default = "default_generation_config")]
    pub generation: GenerationConfig,
    #[serde(default = "default_memory_config")]
    pub memory: MemoryConfig,
    #[serde(default = "default_sync_config")]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MixItUpConfig {
    /// Webhook the bot's outgoing payloads are posted to.
    pub webhook_url: String,
    /// Base URL of the MixItUp developer API (without `/api/v2`).
    pub endpoint_url: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub send_as_streamer: bool,
    /// Platform sub-record to flatten when a profile carries several.
    #[serde(default)]
    pub preferred_platform: Option<String>,
    /// Set from `MIXITUP_BASE_URL`; only the table sync utilities read it.
    #[serde(skip)]
    pub sync_base_url: Option<String>,
}

impl MixItUpConfig {
    /// Base URL used by the user table sync utilities.
    pub fn sync_base_url(&self) -> &str {
        self.sync_base_url.as_deref().unwrap_or(&self.endpoint_url)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    #[serde(default = "default_table_base_url")]
    pub base_url: String,
    #[serde(default = "default_table_name")]
    pub name: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub bot_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    /// Device index forwarded to the generator (GPU ordinal), if any.
    #[serde(default)]
    pub device: Option<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Cron expression (with seconds) for the background user sync.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_platform() -> String {
    "Twitch".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_table_base_url() -> String {
    "https://api.botpress.cloud".to_string()
}

fn default_table_name() -> String {
    "UserTable".to_string()
}

fn default_key_column() -> String {
    "mixitupUserId".to_string()
}

fn default_generation_endpoint() -> String {
    "http://127.0.0.1:5000/generate".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("relay.db")
}

fn default_page_size() -> u32 {
    100
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        bind_address: default_bind_address(),
    }
}

fn default_table_config() -> TableConfig {
    TableConfig {
        base_url: default_table_base_url(),
        name: default_table_name(),
        key_column: default_key_column(),
        token: String::new(),
        bot_id: String::new(),
    }
}

fn default_generation_config() -> GenerationConfig {
    GenerationConfig {
        endpoint: default_generation_endpoint(),
        device: None,
    }
}

fn default_memory_config() -> MemoryConfig {
    MemoryConfig {
        database_path: default_db_path(),
    }
}

fn default_sync_config() -> SyncConfig {
    SyncConfig {
        schedule: None,
        page_size: default_page_size(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content, |name| std::env::var(name).ok())
    }

    /// Parse a TOML document and apply environment overrides through `env`.
    pub fn parse(content: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;

        if let Some(token) = env(TOKEN_ENV).filter(|v| !v.is_empty()) {
            config.table.token = token;
        }
        if let Some(bot_id) = env(BOT_ID_ENV).filter(|v| !v.is_empty()) {
            config.table.bot_id = bot_id;
        }
        config.mixitup.sync_base_url = env(SYNC_BASE_URL_ENV).filter(|v| !v.is_empty());

        config.mixitup.endpoint_url = config.mixitup.endpoint_url.trim_end_matches('/').to_string();

        if config.mixitup.webhook_url.trim().is_empty() {
            anyhow::bail!("mixitup.webhook_url must not be empty");
        }
        if config.mixitup.endpoint_url.trim().is_empty() {
            anyhow::bail!("mixitup.endpoint_url must not be empty");
        }

        Ok(config)
    }

    /// Credentials are only needed by the table sync paths, so they are
    /// checked lazily rather than at load time.
    pub fn require_table_credentials(&self) -> Result<()> {
        if self.table.token.is_empty() {
            anyhow::bail!("table.token is not set (config or {})", TOKEN_ENV);
        }
        if self.table.bot_id.is_empty() {
            anyhow::bail!("table.bot_id is not set (config or {})", BOT_ID_ENV);
        }
        Ok(())
    }
}
