//! The single event type all adapters feed into a session.

use crate::core::llm::LlmError;
use crate::core::stt::{SttError, SttResult};
use crate::core::tts::{TtsError, TtsOutput};

/// Everything that can happen to a running session, in one channel.
///
/// Each adapter pushes into the session's bounded event channel from its own
/// I/O task; the session task consumes events one at a time, so per-source
/// ordering is preserved and no session state needs locking.
#[derive(Debug)]
pub enum SessionEvent {
    /// Recognition produced an interim/final transcript or a boundary.
    Transcript(SttResult),

    /// The recognition connection failed.
    SttFailure(SttError),

    /// Synthesis produced audio or an acknowledgement.
    Synthesis(TtsOutput),

    /// The synthesis connection failed.
    TtsFailure(TtsError),

    /// Generation produced a text delta. Tagged with the generation id so
    /// deltas from a cancelled utterance can be discarded.
    GenerationDelta { generation: u64, text: String },

    /// The generation stream finished normally.
    GenerationDone { generation: u64 },

    /// The generation request or stream failed.
    GenerationFailed { generation: u64, error: LlmError },
}
