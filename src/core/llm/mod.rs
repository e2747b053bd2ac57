//! Language model (generation) adapters.

pub mod base;
pub mod openai;

pub use base::{BaseLlm, CompletionStream, LlmError};
