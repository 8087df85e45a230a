pub mod anthropic_adapter;
pub mod config;
pub mod gemini_adapter;
pub mod microphone;
pub mod openai_adapter;
pub mod prompt_loader;
pub mod providers;
mod replay;
pub mod speech_command;
pub mod terminal;
