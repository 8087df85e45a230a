//! Shared helpers for the interview workspace: server-sent event decoding for
//! the streaming chat clients, and audio plumbing for the microphone engine.

pub mod audio;
pub mod device;
pub mod sse;
