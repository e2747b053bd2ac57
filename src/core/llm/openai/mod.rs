//! OpenAI-compatible streaming chat completion client.

pub mod client;
pub mod messages;

pub use client::OpenAiLlm;
