//! Streaming client for the Gemini `generateContent` API, plus a chat session
//! that keeps its own multi-turn history.

mod chat;
mod client;
pub mod types;

pub use chat::ChatSession;
pub use client::{GeminiClient, GenerateContentApi, ResponseStream};
