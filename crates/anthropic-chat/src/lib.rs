//! Streaming client for the Anthropic Messages API.

mod client;
pub mod types;

pub use client::{AnthropicClient, CorsRestricted, EventStream, MessagesApi, DEFAULT_MAX_TOKENS};
