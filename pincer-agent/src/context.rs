//! Builds the message list sent to the model for one turn.
//!
//! Every request starts with a single system message: the persona, plus the
//! long-term memory summary when there is one. History and the new turn
//! follow in order. Attachments never enter the session verbatim; a short
//! text proxy stands in for them so the window stays small.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pincer_memory::MemoryStore;

use crate::types::{ChatMessage, ContentPart, ImageUrl, MessageContent, Role};

/// System prompt used when no persona file is configured.
pub const DEFAULT_PERSONA: &str = "You are a helpful assistant. Be concise and direct.";

/// Header that separates the persona from the memory summary inside the
/// system message.
pub const MEMORY_HEADER: &str = "--- Long-term memory ---";

/// Longest document text forwarded to the model, in characters.
pub const MAX_DOCUMENT_CHARS: usize = 15_000;

const TRUNCATION_MARKER: &str = "\n\n[...truncated]";

/// One inbound turn: what the model sees and what the session records in
/// its place.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Content posted to the model.
    pub content: MessageContent,
    /// Lightweight stand-in appended to the session window.
    pub session_proxy: String,
}

impl Turn {
    /// A plain text turn. The session records the text itself.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            content: MessageContent::Text(text.clone()),
            session_proxy: text,
        }
    }

    /// An image turn: caption plus a base64 data URI, sent as multimodal
    /// parts. The session records only `[Image] {caption}`.
    pub fn image(caption: impl Into<String>, data_uri: impl Into<String>) -> Self {
        let caption = caption.into();
        Self {
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: caption.clone(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_uri.into(),
                    },
                },
            ]),
            session_proxy: format!("[Image] {caption}"),
        }
    }

    /// A document turn. The extracted text is capped at
    /// [`MAX_DOCUMENT_CHARS`] characters with a visible truncation marker;
    /// the session records only `[Document: name] {caption}`.
    pub fn document(file_name: &str, extracted: &str, caption: &str) -> Self {
        let body = truncate_chars(extracted, MAX_DOCUMENT_CHARS);
        Self {
            content: MessageContent::Text(format!(
                "[Document: {file_name}]\n\n{body}\n\n---\n{caption}"
            )),
            session_proxy: format!("[Document: {file_name}] {caption}"),
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Assembles the full message list for a completion request.
pub struct ContextBuilder {
    persona: String,
    memory: Arc<MemoryStore>,
}

impl ContextBuilder {
    pub fn new(persona: String, memory: Arc<MemoryStore>) -> Self {
        Self { persona, memory }
    }

    /// Read the persona from a file, falling back to [`DEFAULT_PERSONA`]
    /// when no path is given or the file is missing or blank.
    pub fn load_persona(path: Option<&Path>) -> String {
        let Some(path) = path else {
            return DEFAULT_PERSONA.to_string();
        };
        match fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!(path = %path.display(), "persona file is empty, using default");
                DEFAULT_PERSONA.to_string()
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "could not read persona file, using default");
                DEFAULT_PERSONA.to_string()
            }
        }
    }

    /// The system message text for the current memory state.
    pub fn system_content(&self) -> String {
        let summary = self.memory.build_context();
        if summary.is_empty() {
            self.persona.clone()
        } else {
            format!("{}\n\n{MEMORY_HEADER}\n{summary}", self.persona)
        }
    }

    /// System message first, then history, then the new turn.
    pub fn assemble(&self, history: &[ChatMessage], turn: MessageContent) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_content()));
        messages.extend_from_slice(history);
        messages.push(ChatMessage {
            role: Role::User,
            content: turn,
        });
        messages
    }
}
