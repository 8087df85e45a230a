mod client;
pub mod types;

pub use client::{ChunkStream, Client, Config, ConfigBuilder, OAIClient, Stats};
