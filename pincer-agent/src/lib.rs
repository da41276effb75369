//! Pincer Agent - Conversation state and inference for the Pincer bot.
//!
//! This crate provides:
//! - Chat message types in the OpenAI chat-completions wire shape
//! - Per-chat rolling session windows with idle expiry
//! - Context assembly (persona + long-term memory + history)
//! - An OpenAI-compatible client for LM Studio with optional streaming

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod client;
pub mod context;
pub mod session;
pub mod types;

pub use client::{ChatModel, LlmError, LmStudioClient, TokenSink};
pub use context::{ContextBuilder, Turn, DEFAULT_PERSONA, MAX_DOCUMENT_CHARS};
pub use session::{SessionStore, MAX_CONTEXT_MESSAGES, SESSION_TIMEOUT};
pub use types::{ChatMessage, ContentPart, ImageUrl, MessageContent, Role};
