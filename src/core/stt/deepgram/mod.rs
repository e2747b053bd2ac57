//! Deepgram live transcription client.

pub mod client;
pub mod config;
pub mod messages;

pub use client::DeepgramStt;
pub use config::DeepgramSttConfig;
