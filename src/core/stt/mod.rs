//! Speech-to-text (recognition) adapters.

pub mod base;
pub mod deepgram;

pub use base::{BaseStt, SttConfig, SttError, SttResult};
