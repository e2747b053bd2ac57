pub mod llm;
pub mod session;
pub mod stt;
pub mod telephony;
pub mod tts;
