//! Pincer - Telegram relay for a local LM Studio model.

mod attachments;
mod chunk;
mod commands;
mod handler;
mod telegram;

use std::sync::Arc;

use anyhow::Result;

use pincer_agent::{ChatModel, ContextBuilder, LmStudioClient, SessionStore};
use pincer_common::{init_logging, Config};
use pincer_memory::MemoryStore;

use crate::handler::Bot;
use crate::telegram::TelegramApi;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Pincer v{}", env!("CARGO_PKG_VERSION"));

    let memory = Arc::new(MemoryStore::new(config.memory_file.clone()));
    let persona = ContextBuilder::load_persona(config.persona_file.as_deref());
    let context = ContextBuilder::new(persona, Arc::clone(&memory));

    let model: Arc<dyn ChatModel> = Arc::new(LmStudioClient::new(
        &config.lm_studio.base_url,
        &config.lm_studio.model,
        config.lm_studio.max_tokens,
    ));

    tracing::info!("Connecting to LM Studio at {}", config.lm_studio.base_url);
    if model.health_check().await {
        tracing::info!(model = %config.lm_studio.model, "LM Studio connected");
    } else {
        tracing::warn!(
            model = %config.lm_studio.model,
            "LM Studio not responding. Make sure it's running with the API server enabled."
        );
    }

    if config.telegram.allowed_users.is_empty() {
        tracing::warn!("No user whitelist - anyone can use the bot");
    } else {
        tracing::info!(
            users = config.telegram.allowed_users.len(),
            "User whitelist active"
        );
    }

    let api = TelegramApi::new(config.telegram.bot_token.clone());
    let bot = Bot::new(api, config, context, SessionStore::new(), memory, model);

    // Wait for a shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = bot.run() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = bot.run() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        }
    }

    Ok(())
}
