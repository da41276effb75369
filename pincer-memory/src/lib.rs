//! Pincer Memory - Long-term memory persisted as a single JSON file.
//!
//! Unlike the per-chat conversation windows, memory survives restarts and is
//! shared across chats: the user's name, free-form notes about them, and a
//! list of facts they asked the bot to keep.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

mod store;

pub use store::{Memory, MemoryStore, UserProfile};
