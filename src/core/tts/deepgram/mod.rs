//! Deepgram Speak (streaming TTS) client.

pub mod client;
pub mod config;
pub mod messages;

pub use client::DeepgramTts;
pub use config::DeepgramTtsConfig;
