//! Text-to-speech (synthesis) adapters.

pub mod base;
pub mod deepgram;

pub use base::{BaseTts, TtsConfig, TtsError, TtsOutput};
