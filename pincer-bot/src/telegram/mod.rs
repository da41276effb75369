//! Minimal Telegram Bot API client.
//!
//! Long-polls `getUpdates` and pushes replies back over HTTPS. Only the
//! handful of methods the bot needs; updates are handled as raw JSON.

pub mod format;

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};

pub struct TelegramApi {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramApi {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot_token, file_path
        )
    }

    /// Fetch updates past `offset`. Blocks server-side for up to 30 seconds,
    /// so the poll loop needs no sleep of its own.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Value>> {
        let body = json!({
            "offset": offset,
            "timeout": 30,
            "allowed_updates": ["message"],
        });

        let resp = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            bail!("Telegram getUpdates failed: {err}");
        }

        let data: Value = resp.json().await?;
        Ok(data
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Send one message, rendering Markdown as Telegram HTML.
    ///
    /// A 400 "can't parse entities" answer means the markup was bad, not
    /// the transport; the text is resent once as plain text. Any other
    /// failure is returned without a retry so nothing arrives twice.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = json!({
            "chat_id": chat_id,
            "text": format::to_telegram_html(text),
            "parse_mode": "HTML",
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let error_text = resp.text().await.unwrap_or_default();

        if status.as_u16() == 400 && error_text.contains("parse entities") {
            tracing::warn!("Telegram rejected HTML, retrying as plain text: {error_text}");

            let body_plain = json!({ "chat_id": chat_id, "text": text });
            let resp_plain = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&body_plain)
                .send()
                .await?;

            if resp_plain.status().is_success() {
                return Ok(());
            }

            let plain_error = resp_plain.text().await.unwrap_or_default();
            bail!("Telegram sendMessage failed: {plain_error}");
        }

        bail!("Telegram sendMessage failed: {error_text}")
    }

    /// Show a chat action such as "typing" while the model works.
    pub async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<()> {
        let body = json!({ "chat_id": chat_id, "action": action });

        let resp = self
            .client
            .post(self.api_url("sendChatAction"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            bail!("Telegram sendChatAction failed: {err}");
        }
        Ok(())
    }

    /// Download a file by its `file_id`: resolve the path via `getFile`,
    /// then fetch the bytes.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let body = json!({ "file_id": file_id });
        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            bail!("Telegram getFile failed: {err}");
        }

        let data: Value = resp.json().await?;
        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing file_path in getFile response"))?;

        let file_resp = self.client.get(self.file_url(file_path)).send().await?;
        if !file_resp.status().is_success() {
            bail!("Telegram file download failed: {}", file_resp.status());
        }

        Ok(file_resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_embeds_the_token() {
        let api = TelegramApi::new("123:ABC".into());
        assert_eq!(
            api.api_url("getUpdates"),
            "https://api.telegram.org/bot123:ABC/getUpdates"
        );
    }

    #[test]
    fn file_url_embeds_token_and_path() {
        let api = TelegramApi::new("123:ABC".into());
        assert_eq!(
            api.file_url("photos/file_1.jpg"),
            "https://api.telegram.org/file/bot123:ABC/photos/file_1.jpg"
        );
    }
}
