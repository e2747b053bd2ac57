//! Text buffers used by the session orchestrator.
//!
//! [`UtteranceBuffer`] collects finalized transcript fragments until the
//! utterance boundary fires; [`SpeechSegmenter`] collects generation deltas
//! and releases them to synthesis at sentence-terminating punctuation so the
//! caller hears speech before the full reply exists.

/// Punctuation that releases the pending speech buffer to synthesis.
const SEGMENT_BREAKS: [char; 6] = ['.', ',', '!', '?', ';', ':'];

/// Finalized transcript fragments for the in-progress utterance.
#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    fragments: Vec<String>,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one final transcript fragment. Empty fragments are ignored.
    pub fn push(&mut self, fragment: &str) {
        if !fragment.is_empty() {
            self.fragments.push(fragment.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Join all fragments in arrival order with single spaces and reset.
    pub fn flush(&mut self) -> String {
        let utterance = self.fragments.join(" ");
        self.fragments.clear();
        utterance
    }
}

/// Accumulates generation deltas and releases punctuation-bounded fragments.
#[derive(Debug, Default)]
pub struct SpeechSegmenter {
    pending: String,
}

impl SpeechSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta; returns the fragments released by any punctuation it
    /// completed, one per punctuation occurrence, in order.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.pending.push_str(delta);

        let mut released = Vec::new();
        loop {
            let Some(break_at) = self.pending.find(&SEGMENT_BREAKS[..]) else {
                break;
            };
            // Include the punctuation character itself.
            let end = break_at + self.pending[break_at..].chars().next().map_or(1, char::len_utf8);
            let fragment: String = self.pending.drain(..end).collect();
            let fragment = fragment.trim_start().to_string();
            if !fragment.is_empty() {
                released.push(fragment);
            }
        }
        released
    }

    /// Take whatever is left after generation ends, if anything.
    pub fn take_remainder(&mut self) -> Option<String> {
        let remainder = std::mem::take(&mut self.pending);
        let remainder = remainder.trim();
        if remainder.is_empty() {
            None
        } else {
            Some(remainder.to_string())
        }
    }

    /// Drop everything pending. Used on barge-in.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
