//! Update routing: commands, chat turns, and attachments.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value;

use pincer_agent::{ChatMessage, ChatModel, ContextBuilder, SessionStore, Turn};
use pincer_common::Config;
use pincer_memory::MemoryStore;

use crate::attachments;
use crate::chunk;
use crate::commands::{self, Command, ForgetScope};
use crate::telegram::TelegramApi;

const NOT_AUTHORIZED: &str = "⛔ Not authorized";
const EMPTY_REPLY: &str = "❌ No response from the model";

pub struct Bot {
    api: TelegramApi,
    config: Config,
    context: ContextBuilder,
    sessions: SessionStore,
    memory: Arc<MemoryStore>,
    model: Arc<dyn ChatModel>,
}

impl Bot {
    pub fn new(
        api: TelegramApi,
        config: Config,
        context: ContextBuilder,
        sessions: SessionStore,
        memory: Arc<MemoryStore>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            api,
            config,
            context,
            sessions,
            memory,
            model,
        }
    }

    /// Long-poll loop. Poll failures back off and retry; a failure inside
    /// one update is logged and never stops the loop.
    pub async fn run(&self) {
        let mut offset: i64 = 0;

        tracing::info!("Listening for updates...");

        loop {
            let updates = match self.api.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e:#}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in updates {
                if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                    offset = update_id + 1;
                }
                if let Err(e) = self.handle_update(&update).await {
                    tracing::error!("Update handling failed: {e:#}");
                }
            }
        }
    }

    async fn handle_update(&self, update: &Value) -> Result<()> {
        let Some(message) = update.get("message") else {
            return Ok(());
        };
        let Some(chat_id) = message
            .get("chat")
            .and_then(|chat| chat.get("id"))
            .and_then(Value::as_i64)
        else {
            return Ok(());
        };
        let user_id = message
            .get("from")
            .and_then(|from| from.get("id"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let caption = message.get("caption").and_then(Value::as_str);

        if let Some(text) = message.get("text").and_then(Value::as_str) {
            return self.handle_text(chat_id, user_id, text).await;
        }
        if let Some(photos) = message.get("photo").and_then(Value::as_array) {
            return self.handle_photo(chat_id, user_id, photos, caption).await;
        }
        if let Some(document) = message.get("document") {
            return self
                .handle_document(chat_id, user_id, document, caption)
                .await;
        }

        Ok(())
    }

    fn is_allowed(&self, user_id: i64) -> bool {
        self.config.telegram.is_allowed(user_id)
    }

    /// Check the whitelist and tell the user off when they are not on it.
    async fn authorize(&self, chat_id: i64, user_id: i64) -> Result<bool> {
        if self.is_allowed(user_id) {
            return Ok(true);
        }
        tracing::warn!("Ignoring message from unauthorized user {user_id}");
        self.api.send_message(chat_id, NOT_AUTHORIZED).await?;
        Ok(false)
    }

    async fn handle_text(&self, chat_id: i64, user_id: i64, text: &str) -> Result<()> {
        if let Some(command) = commands::parse(text) {
            return self.handle_command(chat_id, user_id, command).await;
        }
        if text.starts_with('/') {
            // Unknown command, stay quiet
            return Ok(());
        }

        if !self.authorize(chat_id, user_id).await? {
            return Ok(());
        }
        self.api.send_chat_action(chat_id, "typing").await?;

        if let Err(e) = self.run_turn(chat_id, Turn::text(text)).await {
            tracing::error!("Chat turn failed: {e:#}");
            self.api
                .send_message(
                    chat_id,
                    "❌ Could not process your message. Is the inference server running?",
                )
                .await?;
        }
        Ok(())
    }

    async fn handle_command(&self, chat_id: i64, user_id: i64, command: Command) -> Result<()> {
        if !self.is_allowed(user_id) {
            // Only /start answers unauthorized users, the rest stay silent
            if matches!(command, Command::Start) {
                self.api.send_message(chat_id, NOT_AUTHORIZED).await?;
            }
            return Ok(());
        }

        match command {
            Command::Start => {
                let memory = self.memory.load();
                let greeting = match memory.user.name {
                    Some(name) => format!("Hello, {name}."),
                    None => "Hello.".to_string(),
                };
                let text = format!(
                    "🦀 **Pincer**\n\n{greeting}\n\n\
                     **Commands:**\n\
                     `/new` — New conversation\n\
                     `/status` — System status\n\
                     `/iam <name>` — Tell me your name\n\
                     `/remember <something>` — Remember something\n\
                     `/memory` — Show what I remember\n\
                     `/forget [n]` — Forget everything, or fact n"
                );
                self.api.send_message(chat_id, &text).await
            }
            Command::New => {
                self.sessions.clear(chat_id);
                self.api
                    .send_message(chat_id, "🔄 New conversation started")
                    .await
            }
            Command::Status => {
                let online = self.model.health_check().await;
                let text = format!(
                    "📊 **Status**\n\n\
                     • LM Studio: {}\n\
                     • Model: `{}`\n\
                     • Active sessions: {}",
                    if online { "✅ Online" } else { "❌ Offline" },
                    self.model.model(),
                    self.sessions.active_count(),
                );
                self.api.send_message(chat_id, &text).await
            }
            Command::Iam(None) => {
                self.api
                    .send_message(chat_id, "Usage: `/iam Your Name`")
                    .await
            }
            Command::Iam(Some(name)) => {
                self.memory.set_user_name(&name);
                self.api
                    .send_message(chat_id, &format!("Saved. I now know your name is {name}."))
                    .await
            }
            Command::Remember(None) => {
                self.api
                    .send_message(chat_id, "Usage: `/remember something you want me to keep`")
                    .await
            }
            Command::Remember(Some(fact)) => {
                self.memory.add_fact(&fact);
                self.api
                    .send_message(chat_id, &format!("Saved: \"{fact}\""))
                    .await
            }
            Command::Memory => {
                let memory = self.memory.load();
                let mut parts = Vec::new();
                if let Some(name) = memory.user.name {
                    parts.push(format!("**Your name:** {name}"));
                }
                if !memory.facts.is_empty() {
                    parts.push("**I remember:**".to_string());
                    for (i, fact) in memory.facts.iter().enumerate() {
                        parts.push(format!("{}. {fact}", i + 1));
                    }
                }
                if parts.is_empty() {
                    return self
                        .api
                        .send_message(
                            chat_id,
                            "I don't remember anything yet. Use `/iam` or `/remember` to teach me.",
                        )
                        .await;
                }
                self.api.send_message(chat_id, &parts.join("\n")).await
            }
            Command::Forget(Some(ForgetScope::All)) => {
                self.memory.clear();
                self.api
                    .send_message(chat_id, "Memory wiped. Clean slate.")
                    .await
            }
            Command::Forget(Some(ForgetScope::Fact(shown))) => {
                // /memory numbers facts from 1
                let removed = shown
                    .checked_sub(1)
                    .is_some_and(|index| self.memory.forget_fact(index));
                let text = if removed {
                    format!("Forgot fact {shown}.")
                } else {
                    format!("There is no fact {shown}.")
                };
                self.api.send_message(chat_id, &text).await
            }
            Command::Forget(None) => {
                self.api
                    .send_message(
                        chat_id,
                        "Usage: `/forget` to wipe everything, or `/forget <n>` to drop one fact",
                    )
                    .await
            }
        }
    }

    async fn handle_photo(
        &self,
        chat_id: i64,
        user_id: i64,
        photos: &[Value],
        caption: Option<&str>,
    ) -> Result<()> {
        if !self.authorize(chat_id, user_id).await? {
            return Ok(());
        }
        self.api.send_chat_action(chat_id, "typing").await?;

        let caption = caption.unwrap_or("Describe this image");
        if let Err(e) = self.photo_turn(chat_id, photos, caption).await {
            tracing::error!("Image turn failed: {e:#}");
            self.api
                .send_message(
                    chat_id,
                    "❌ Could not process the image. Does the loaded model support vision?",
                )
                .await?;
        }
        Ok(())
    }

    async fn photo_turn(&self, chat_id: i64, photos: &[Value], caption: &str) -> Result<()> {
        // Telegram lists photo sizes smallest first
        let file_id = photos
            .last()
            .and_then(|photo| photo.get("file_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("photo update without file_id"))?;

        let bytes = self.api.download_file(file_id).await?;
        let turn = Turn::image(caption, attachments::image_data_uri(&bytes));
        self.run_turn(chat_id, turn).await
    }

    async fn handle_document(
        &self,
        chat_id: i64,
        user_id: i64,
        document: &Value,
        caption: Option<&str>,
    ) -> Result<()> {
        if !self.authorize(chat_id, user_id).await? {
            return Ok(());
        }

        let file_name = document
            .get("file_name")
            .and_then(Value::as_str)
            .unwrap_or("document");

        let extension = attachments::extension_of(file_name);
        let supported = extension
            .as_deref()
            .is_some_and(attachments::is_supported_document);
        if !supported {
            let shown = extension
                .map(|ext| format!(".{ext}"))
                .unwrap_or_else(|| file_name.to_lowercase());
            let text = format!(
                "❌ Unsupported format: `{shown}`\n\nSupported formats: {}",
                attachments::supported_formats()
            );
            return self.api.send_message(chat_id, &text).await;
        }

        self.api.send_chat_action(chat_id, "typing").await?;

        let caption = caption.unwrap_or("Summarize this document");
        if let Err(e) = self.document_turn(chat_id, document, file_name, caption).await {
            tracing::error!("Document turn failed: {e:#}");
            self.api
                .send_message(chat_id, "❌ Could not process the document")
                .await?;
        }
        Ok(())
    }

    async fn document_turn(
        &self,
        chat_id: i64,
        document: &Value,
        file_name: &str,
        caption: &str,
    ) -> Result<()> {
        let file_id = document
            .get("file_id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("document update without file_id"))?;

        let bytes = self.api.download_file(file_id).await?;
        let text = attachments::extract_document_text(&bytes, file_name)?;
        if text.trim().is_empty() {
            return self
                .api
                .send_message(chat_id, "❌ Could not extract any text from the document")
                .await;
        }

        let turn = Turn::document(file_name, &text, caption);
        self.run_turn(chat_id, turn).await
    }

    /// One model turn: capture history, record the user line in the
    /// session, call the model, then store and deliver the reply.
    ///
    /// The user line is recorded before the model call, so a failed turn
    /// still shows up in the context of the next one.
    async fn run_turn(&self, chat_id: i64, turn: Turn) -> Result<()> {
        let Turn {
            content,
            session_proxy,
        } = turn;

        let history = self.sessions.history(chat_id);
        self.sessions.append(chat_id, ChatMessage::user(session_proxy));
        let messages = self.context.assemble(&history, content);

        let reply = self.model.complete(&messages, None).await?;
        if reply.is_empty() {
            return self.api.send_message(chat_id, EMPTY_REPLY).await;
        }

        self.sessions
            .append(chat_id, ChatMessage::assistant(reply.clone()));
        self.reply_long(chat_id, &reply).await
    }

    async fn reply_long(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in chunk::chunk_message(text) {
            self.api.send_message(chat_id, &chunk).await?;
        }
        Ok(())
    }
}
