mod config;
mod llm;
mod memory;
mod mixitup;
mod payload;
mod platform;
mod scheduler;
mod server;
mod users;
mod validation;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::llm::{ContentGenerator, GenerationClient};
use crate::memory::MemoryStore;
use crate::mixitup::MixItUpClient;
use crate::payload::Payload;
use crate::platform::channels::Outbound;
use crate::scheduler::Scheduler;
use crate::server::AppState;
use crate::users::{SyncOutcome, UserSync};
use crate::users::table::TableClient;
use crate::webhook::WebhookClient;

#[derive(Parser)]
#[command(name = "mixitup-relay", version, about = "Relay between a Botpress bot and MixItUp")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register with MixItUp and serve the inbound HTTP endpoints
    Serve,
    /// Sync one MixItUp user into the user table
    SyncUser { id: String },
    /// Sync every MixItUp user into the user table
    SyncUsers,
    /// Delete every row from the user table
    DeleteUsers,
    /// Post a chat message through the MixItUp REST API
    SendChat {
        message: String,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        as_streamer: bool,
        /// Record the message under this conversation id
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Post a payload (JSON) to the MixItUp webhook
    SendWebhook {
        payload: String,
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Generate text with a catalog model
    Generate {
        #[arg(long)]
        model: String,
        prompt: String,
    },
    /// List the generation model catalog
    Models,
    /// Print the recorded messages of a conversation
    History {
        conversation: String,
        #[arg(long, default_value = platform::WEBHOOK_CHANNEL)]
        channel: String,
    },
}

struct Relay {
    http: reqwest::Client,
    mixitup: MixItUpClient,
    webhook: WebhookClient,
}

impl Relay {
    fn new(config: &Config) -> Self {
        let http = reqwest::Client::new();
        Self {
            mixitup: MixItUpClient::new(http.clone(), &config.mixitup.endpoint_url),
            webhook: WebhookClient::new(http.clone(), &config.mixitup.webhook_url),
            http,
        }
    }

    /// `bulk` selects the sync base URL, which may point at a different
    /// MixItUp instance than the live endpoint.
    fn user_sync(&self, config: &Config, bulk: bool) -> UserSync {
        let mixitup = if bulk {
            MixItUpClient::new(self.http.clone(), config.mixitup.sync_base_url())
        } else {
            self.mixitup.clone()
        };
        UserSync::new(
            mixitup,
            TableClient::new(self.http.clone(), config.table.clone()),
            config.mixitup.preferred_platform.clone(),
            config.sync.page_size,
        )
    }

    fn outbound(&self, config: &Config, store: MemoryStore) -> Outbound {
        Outbound::new(
            self.webhook.clone(),
            self.mixitup.clone(),
            Arc::new(store),
            &config.mixitup.platform,
            config.mixitup.send_as_streamer,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mixitup_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from: {}", cli.config.display());
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    info!("Configuration loaded successfully");
    info!("  Webhook: {}", config.mixitup.webhook_url);
    info!("  Endpoint: {}", config.mixitup.endpoint_url);
    info!("  Platform: {}", config.mixitup.platform);

    let relay = Relay::new(&config);

    match cli.command {
        Command::Serve => serve(&config, &relay).await,
        Command::SyncUser { id } => {
            config.require_table_credentials()?;
            report(relay.user_sync(&config, false).upsert_user(&id).await)
        }
        Command::SyncUsers => {
            config.require_table_credentials()?;
            report(relay.user_sync(&config, true).sync_all_users().await)
        }
        Command::DeleteUsers => {
            config.require_table_credentials()?;
            report(relay.user_sync(&config, true).delete_all_users().await)
        }
        Command::SendChat {
            message,
            platform,
            as_streamer,
            conversation,
        } => {
            let store = MemoryStore::open(&config.memory.database_path)?;
            let outbound = relay.outbound(&config, store);
            let payload = Payload::text(message);
            match platform {
                None if !as_streamer => {
                    outbound.send_chat(conversation.as_deref(), &payload).await?
                }
                platform => {
                    let platform = platform.as_deref().unwrap_or(&config.mixitup.platform);
                    outbound
                        .send_chat_as(
                            conversation.as_deref(),
                            &payload,
                            platform,
                            as_streamer || config.mixitup.send_as_streamer,
                        )
                        .await?
                }
            }
            info!("Chat message sent");
            Ok(())
        }
        Command::SendWebhook {
            payload,
            conversation,
        } => {
            let payload: Payload =
                serde_json::from_str(&payload).context("Payload is not valid JSON")?;
            let store = MemoryStore::open(&config.memory.database_path)?;
            relay
                .outbound(&config, store)
                .send_webhook(conversation.as_deref(), &payload)
                .await?;
            info!("Webhook payload sent");
            Ok(())
        }
        Command::Generate { model, prompt } => {
            let generator = ContentGenerator::new(GenerationClient::new(
                relay.http.clone(),
                config.generation.clone(),
            ));
            let output = generator.generate(&model, &prompt).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::Models => {
            println!("{}", serde_json::to_string_pretty(&llm::list_models())?);
            Ok(())
        }
        Command::History {
            conversation,
            channel,
        } => {
            let store = MemoryStore::open(&config.memory.database_path)?;
            let messages = platform::history(&store, &channel, &conversation).await?;
            info!("{} message(s) in conversation {}", messages.len(), conversation);
            println!("{}", serde_json::to_string_pretty(&messages)?);
            Ok(())
        }
    }
}

async fn serve(config: &Config, relay: &Relay) -> Result<()> {
    server::register(&relay.webhook, &relay.mixitup)
        .await
        .context("Registration with MixItUp failed")?;

    if let Err(e) = config.require_table_credentials() {
        warn!("User sync is unavailable: {:#}", e);
    }

    let store = MemoryStore::open(&config.memory.database_path)?;
    info!("Conversation store: {}", config.memory.database_path.display());

    let mut scheduler = Scheduler::new().await?;
    crate::scheduler::tasks::register_sync_task(
        &mut scheduler,
        &config.sync,
        relay.user_sync(config, true),
    )
    .await?;
    scheduler.start().await?;

    let state = AppState {
        store: Arc::new(store),
        users: relay.user_sync(config, false),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    server::run(listener, server::router(state)).await?;

    scheduler.shutdown().await
}

fn report(outcome: SyncOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        anyhow::bail!(outcome.message.unwrap_or_else(|| "Sync failed".to_string()));
    }
    Ok(())
}
