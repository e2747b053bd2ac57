//! End-to-end session orchestration tests with in-process mock adapters.
//!
//! The mocks record every call the session makes; tests drive the session
//! exactly the way the stream handler does, by feeding transport frames into
//! `on_transport_event` and adapter events into `on_session_event`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

use voicebridge::config::AgentProfile;
use voicebridge::core::llm::{BaseLlm, CompletionStream, LlmError};
use voicebridge::core::session::{CallSession, SessionEvent, TtsConnector};
use voicebridge::core::stt::{BaseStt, SttError, SttResult};
use voicebridge::core::stt::base::{SttErrorCallback, SttResultCallback};
use voicebridge::core::telephony::TwilioEvent;
use voicebridge::core::tts::{BaseTts, TtsError, TtsOutput};
use voicebridge::core::tts::base::{TtsErrorCallback, TtsOutputCallback};
use voicebridge::directory::{CallResolver, DirectoryError};

type CallLog = Arc<Mutex<Vec<String>>>;

// =============================================================================
// Mock adapters
// =============================================================================

struct MockStt {
    log: CallLog,
}

#[async_trait]
impl BaseStt for MockStt {
    async fn connect(&mut self) -> Result<(), SttError> {
        self.log.lock().await.push("stt:connect".to_string());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SttError> {
        self.log.lock().await.push("stt:disconnect".to_string());
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn send_audio(&mut self, audio: Bytes) -> Result<(), SttError> {
        self.log
            .lock()
            .await
            .push(format!("stt:audio:{}", audio.len()));
        Ok(())
    }

    async fn on_result(&mut self, _callback: SttResultCallback) -> Result<(), SttError> {
        Ok(())
    }

    async fn on_error(&mut self, _callback: SttErrorCallback) -> Result<(), SttError> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock-stt"
    }
}

struct MockTts {
    log: CallLog,
    /// Number of upcoming `speak` calls that fail before the mock recovers.
    fail_speaks: Arc<AtomicUsize>,
}

#[async_trait]
impl BaseTts for MockTts {
    async fn connect(&mut self) -> Result<(), TtsError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TtsError> {
        self.log.lock().await.push("tts:disconnect".to_string());
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn speak(&mut self, text: &str) -> Result<(), TtsError> {
        if self.fail_speaks.load(Ordering::SeqCst) > 0 {
            self.fail_speaks.fetch_sub(1, Ordering::SeqCst);
            self.log.lock().await.push(format!("tts:speak-err:{text}"));
            return Err(TtsError::NetworkError(
                "synthesis socket dropped".to_string(),
            ));
        }
        self.log.lock().await.push(format!("tts:speak:{text}"));
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TtsError> {
        self.log.lock().await.push("tts:flush".to_string());
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), TtsError> {
        self.log.lock().await.push("tts:clear".to_string());
        Ok(())
    }

    async fn on_output(&mut self, _callback: TtsOutputCallback) -> Result<(), TtsError> {
        Ok(())
    }

    async fn on_error(&mut self, _callback: TtsErrorCallback) -> Result<(), TtsError> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock-tts"
    }
}

struct MockTtsConnector {
    log: CallLog,
    fail_speaks: Arc<AtomicUsize>,
}

#[async_trait]
impl TtsConnector for MockTtsConnector {
    async fn connect(&mut self, voice_id: &str) -> Result<Box<dyn BaseTts>, TtsError> {
        self.log
            .lock()
            .await
            .push(format!("tts:connect:{voice_id}"));
        Ok(Box::new(MockTts {
            log: self.log.clone(),
            fail_speaks: self.fail_speaks.clone(),
        }))
    }
}

struct MockLlm {
    log: CallLog,
    deltas: Vec<String>,
    fail: bool,
}

#[async_trait]
impl BaseLlm for MockLlm {
    async fn stream_completion(
        &self,
        _persona_prompt: &str,
        utterance: &str,
    ) -> Result<CompletionStream, LlmError> {
        self.log.lock().await.push(format!("llm:{utterance}"));
        if self.fail {
            return Err(LlmError::Request("connection refused".to_string()));
        }
        let items: Vec<Result<String, LlmError>> =
            self.deltas.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }

    fn provider_name(&self) -> &'static str {
        "mock-llm"
    }
}

struct MapResolver {
    agents: HashMap<String, AgentProfile>,
}

#[async_trait]
impl CallResolver for MapResolver {
    async fn resolve(&self, call_sid: &str) -> Result<Option<AgentProfile>, DirectoryError> {
        Ok(self.agents.get(call_sid).cloned())
    }
}

// =============================================================================
// Harness
// =============================================================================

fn test_agent() -> AgentProfile {
    AgentProfile {
        persona_prompt: "You are a concise booking assistant.".to_string(),
        welcome_message: "Hi, how can I help?".to_string(),
        voice_id: "aura-asteria-en".to_string(),
    }
}

struct Harness {
    session: CallSession,
    events: mpsc::Receiver<SessionEvent>,
    transport_rx: mpsc::Receiver<String>,
    log: CallLog,
    /// Pending `speak` failures for whatever TTS client is currently wired.
    fail_speaks: Arc<AtomicUsize>,
}

async fn open_session(with_agent: bool, deltas: Vec<&str>) -> Harness {
    open_session_with(with_agent, deltas, false).await
}

async fn open_session_with(with_agent: bool, deltas: Vec<&str>, llm_fails: bool) -> Harness {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let fail_speaks = Arc::new(AtomicUsize::new(0));

    let mut agents = HashMap::new();
    if with_agent {
        agents.insert("CA1".to_string(), test_agent());
    }

    let (transport_tx, transport_rx) = mpsc::channel(64);

    let (session, events) = CallSession::open(
        Box::new(MockStt { log: log.clone() }),
        Box::new(MockTtsConnector {
            log: log.clone(),
            fail_speaks: fail_speaks.clone(),
        }),
        Arc::new(MockLlm {
            log: log.clone(),
            deltas: deltas.into_iter().map(String::from).collect(),
            fail: llm_fails,
        }),
        Arc::new(MapResolver { agents }),
        transport_tx,
    )
    .await
    .expect("session should open");

    Harness {
        session,
        events,
        transport_rx,
        log,
        fail_speaks,
    }
}

fn start_event() -> TwilioEvent {
    TwilioEvent::parse(
        r#"{"event":"start","streamSid":"MZ1","start":{"streamSid":"MZ1","callSid":"CA1","tracks":["inbound"]}}"#,
    )
    .unwrap()
}

fn media_event(payload: &str, track: &str) -> TwilioEvent {
    TwilioEvent::parse(&format!(
        r#"{{"event":"media","streamSid":"MZ1","media":{{"track":"{track}","payload":"{payload}"}}}}"#
    ))
    .unwrap()
}

fn stop_event() -> TwilioEvent {
    TwilioEvent::parse(r#"{"event":"stop","streamSid":"MZ1"}"#).unwrap()
}

async fn next_event(harness: &mut Harness) -> SessionEvent {
    timeout(Duration::from_secs(1), harness.events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

/// Pump generation events from the channel back into the session until the
/// generation with the given id completes.
async fn pump_generation(harness: &mut Harness, generation: u64) {
    loop {
        let event = next_event(harness).await;
        let done = matches!(
            event,
            SessionEvent::GenerationDone { generation: g } if g == generation
        );
        assert!(harness.session.on_session_event(event).await.unwrap());
        if done {
            break;
        }
    }
}

// =============================================================================
// Scenario A: greeting
// =============================================================================

#[tokio::test]
async fn greeting_is_spoken_on_start() {
    let mut harness = open_session(true, vec![]).await;

    assert!(
        harness
            .session
            .on_transport_event(start_event())
            .await
            .unwrap()
    );

    let log = harness.log.lock().await.clone();
    assert_eq!(
        log,
        vec![
            "tts:connect:aura-asteria-en",
            "tts:speak:Hi, how can I help?",
            "tts:flush",
        ]
    );
}

#[tokio::test]
async fn greeting_audio_is_relayed_to_transport() {
    let mut harness = open_session(true, vec![]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();

    let chunk = Bytes::from_static(&[0x7f; 160]);
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Audio(chunk)))
        .await
        .unwrap();

    let frame = harness.transport_rx.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["event"], "media");
    assert_eq!(value["streamSid"], "MZ1");
    assert!(value["media"]["payload"].is_string());
}

// =============================================================================
// Scenario B: one conversational turn
// =============================================================================

#[tokio::test]
async fn utterance_flows_through_generation_to_synthesis() {
    let mut harness = open_session(true, vec!["Sure, I can", " book that.", " Anything else?"]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();
    // Greeting playback finishes.
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Flushed))
        .await
        .unwrap();

    // Caller speaks one utterance, finalized in two fragments.
    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "i want to".to_string(),
            true,
            false,
        )))
        .await
        .unwrap();
    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "book a table".to_string(),
            true,
            true,
        )))
        .await
        .unwrap();

    pump_generation(&mut harness, 1).await;

    let log = harness.log.lock().await.clone();
    // Fragments are joined with a single space for the prompt.
    assert!(log.contains(&"llm:i want to book a table".to_string()));
    // Deltas are released at each punctuation occurrence, remainder at end.
    let speaks: Vec<&String> = log.iter().filter(|l| l.starts_with("tts:speak:")).collect();
    assert_eq!(
        speaks,
        vec![
            "tts:speak:Hi, how can I help?",
            "tts:speak:Sure,",
            "tts:speak:I can book that.",
            "tts:speak:Anything else?",
        ]
    );
    // Generation end forces a flush of the synthesis buffer.
    assert_eq!(log.last().unwrap(), "tts:flush");
}

#[tokio::test]
async fn boundary_without_buffered_speech_starts_nothing() {
    let mut harness = open_session(true, vec!["never spoken"]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Flushed))
        .await
        .unwrap();

    // Boundary with an empty utterance buffer (silence, then UtteranceEnd).
    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::utterance_end()))
        .await
        .unwrap();

    let log = harness.log.lock().await.clone();
    assert!(!log.iter().any(|l| l.starts_with("llm:")));
}

// =============================================================================
// Scenario C: barge-in
// =============================================================================

#[tokio::test]
async fn barge_in_clears_synthesis_and_transport() {
    let mut harness = open_session(true, vec!["One moment please.", " I am checking."]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Flushed))
        .await
        .unwrap();

    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "check my booking".to_string(),
            true,
            true,
        )))
        .await
        .unwrap();

    // First delta arrives and playback starts.
    let delta = next_event(&mut harness).await;
    harness.session.on_session_event(delta).await.unwrap();
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Audio(
            Bytes::from_static(&[1; 160]),
        )))
        .await
        .unwrap();
    // Drain the media frame that playback produced.
    let media_frame = harness.transport_rx.recv().await.unwrap();
    assert!(media_frame.contains("\"media\""));

    // Caller interrupts: interim transcript while speaking.
    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "actually wait".to_string(),
            false,
            false,
        )))
        .await
        .unwrap();

    // The very next transport effect is a clear frame.
    let frame = harness.transport_rx.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["event"], "clear");
    assert!(harness.log.lock().await.contains(&"tts:clear".to_string()));

    // Audio from the cancelled utterance is dropped, not relayed.
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Audio(
            Bytes::from_static(&[2; 160]),
        )))
        .await
        .unwrap();
    assert!(harness.transport_rx.try_recv().is_err());
}

#[tokio::test]
async fn deltas_from_cancelled_generation_are_discarded() {
    let mut harness = open_session(true, vec!["Let me see."]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Flushed))
        .await
        .unwrap();

    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "hello".to_string(),
            true,
            true,
        )))
        .await
        .unwrap();
    // Start playback so barge-in has something to interrupt.
    let delta = next_event(&mut harness).await;
    harness.session.on_session_event(delta).await.unwrap();

    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "stop".to_string(),
            false,
            false,
        )))
        .await
        .unwrap();

    let speaks_before = harness
        .log
        .lock()
        .await
        .iter()
        .filter(|l| l.starts_with("tts:speak:"))
        .count();

    // A straggler delta tagged with the cancelled generation id.
    harness
        .session
        .on_session_event(SessionEvent::GenerationDelta {
            generation: 1,
            text: " More words. Even more.".to_string(),
        })
        .await
        .unwrap();

    let speaks_after = harness
        .log
        .lock()
        .await
        .iter()
        .filter(|l| l.starts_with("tts:speak:"))
        .count();
    assert_eq!(speaks_before, speaks_after);
}

// =============================================================================
// Scenario D: unresolvable call
// =============================================================================

#[tokio::test]
async fn unresolved_number_never_speaks_or_generates() {
    let mut harness = open_session(false, vec!["should never run"]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();

    // Audio still flows to recognition.
    assert!(
        harness
            .session
            .on_transport_event(media_event("AAAA", "inbound"))
            .await
            .unwrap()
    );

    // A complete utterance arrives, but with no agent nothing is generated.
    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "hello".to_string(),
            true,
            true,
        )))
        .await
        .unwrap();

    let log = harness.log.lock().await.clone();
    assert!(log.iter().any(|l| l.starts_with("stt:audio:")));
    assert!(!log.iter().any(|l| l.starts_with("tts:")));
    assert!(!log.iter().any(|l| l.starts_with("llm:")));
    assert!(harness.transport_rx.try_recv().is_err());
}

// =============================================================================
// Frame handling
// =============================================================================

#[tokio::test]
async fn inbound_frames_are_forwarded_in_order() {
    let mut harness = open_session(true, vec![]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();

    // Three frames of different sizes, plus one outbound-track frame that
    // must be ignored.
    harness
        .session
        .on_transport_event(media_event("AA==", "inbound")) // 1 byte
        .await
        .unwrap();
    harness
        .session
        .on_transport_event(media_event("AAAA", "outbound")) // ignored
        .await
        .unwrap();
    harness
        .session
        .on_transport_event(media_event("AAEC", "inbound")) // 3 bytes
        .await
        .unwrap();

    let log = harness.log.lock().await.clone();
    let audio: Vec<&String> = log.iter().filter(|l| l.starts_with("stt:audio:")).collect();
    assert_eq!(audio, vec!["stt:audio:1", "stt:audio:3"]);
}

#[tokio::test]
async fn media_before_start_is_ignored() {
    let mut harness = open_session(true, vec![]).await;

    harness
        .session
        .on_transport_event(media_event("AAAA", "inbound"))
        .await
        .unwrap();

    let log = harness.log.lock().await.clone();
    assert!(!log.iter().any(|l| l.starts_with("stt:audio:")));
}

#[tokio::test]
async fn stop_is_idempotent() {
    let mut harness = open_session(true, vec![]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();

    assert!(!harness.session.on_transport_event(stop_event()).await.unwrap());
    assert!(!harness.session.on_transport_event(stop_event()).await.unwrap());

    let log = harness.log.lock().await.clone();
    let disconnects = log.iter().filter(|l| *l == "stt:disconnect").count();
    assert_eq!(disconnects, 1);
}

#[tokio::test]
async fn unknown_events_are_ignored() {
    let mut harness = open_session(true, vec![]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();

    let unknown = TwilioEvent::parse(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#).unwrap();
    assert!(harness.session.on_transport_event(unknown).await.unwrap());
}

// =============================================================================
// Utterance boundaries
// =============================================================================

#[tokio::test]
async fn utterance_end_flushes_buffered_finals() {
    let mut harness = open_session(true, vec!["Done."]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Flushed))
        .await
        .unwrap();

    // A final without speech_final buffers; the boundary arrives as a
    // silence-based UtteranceEnd instead.
    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "see you tomorrow".to_string(),
            true,
            false,
        )))
        .await
        .unwrap();
    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::utterance_end()))
        .await
        .unwrap();

    pump_generation(&mut harness, 1).await;

    let log = harness.log.lock().await.clone();
    assert!(log.contains(&"llm:see you tomorrow".to_string()));
}

#[tokio::test]
async fn interim_transcripts_never_reach_generation() {
    let mut harness = open_session(true, vec!["Reply."]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Flushed))
        .await
        .unwrap();

    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "boo".to_string(),
            false,
            false,
        )))
        .await
        .unwrap();
    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "book a room".to_string(),
            true,
            true,
        )))
        .await
        .unwrap();

    pump_generation(&mut harness, 1).await;

    let log = harness.log.lock().await.clone();
    // Only the final text forms the prompt; the interim never entered it.
    assert!(log.contains(&"llm:book a room".to_string()));
}

// =============================================================================
// Adapter failure policy
// =============================================================================

#[tokio::test]
async fn greeting_speak_fault_reconnects_and_keeps_the_session() {
    let mut harness = open_session(true, vec![]).await;
    harness.fail_speaks.store(1, Ordering::SeqCst);

    // A failing speak gets one reconnect; the fragment is dropped, the
    // session stays up.
    assert!(
        harness
            .session
            .on_transport_event(start_event())
            .await
            .unwrap()
    );

    let log = harness.log.lock().await.clone();
    assert_eq!(
        log,
        vec![
            "tts:connect:aura-asteria-en",
            "tts:speak-err:Hi, how can I help?",
            "tts:disconnect",
            "tts:connect:aura-asteria-en",
            "tts:flush",
        ]
    );
}

#[tokio::test]
async fn second_consecutive_synthesis_fault_ends_the_call() {
    let mut harness = open_session(true, vec![]).await;
    harness.fail_speaks.store(1, Ordering::SeqCst);
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();

    // A second fault before any audio made it out ends the call.
    assert!(
        !harness
            .session
            .on_session_event(SessionEvent::TtsFailure(TtsError::NetworkError(
                "socket closed".to_string(),
            )))
            .await
            .unwrap()
    );

    let log = harness.log.lock().await.clone();
    let connects = log.iter().filter(|l| l.starts_with("tts:connect:")).count();
    assert_eq!(connects, 2);
    assert!(log.contains(&"stt:disconnect".to_string()));
}

#[tokio::test]
async fn relayed_audio_resets_the_synthesis_fault_counter() {
    let mut harness = open_session(true, vec![]).await;
    harness.fail_speaks.store(1, Ordering::SeqCst);
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();

    // Audio reaching the caller counts as recovery.
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Audio(
            Bytes::from_static(&[0x7f; 160]),
        )))
        .await
        .unwrap();

    // The next fault is a first fault again and gets its own reconnect.
    assert!(
        harness
            .session
            .on_session_event(SessionEvent::TtsFailure(TtsError::NetworkError(
                "socket closed".to_string(),
            )))
            .await
            .unwrap()
    );

    let log = harness.log.lock().await.clone();
    let connects = log.iter().filter(|l| l.starts_with("tts:connect:")).count();
    assert_eq!(connects, 3);
}

#[tokio::test]
async fn recognition_fault_reconnects_once_then_ends_the_call() {
    let mut harness = open_session(true, vec![]).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();

    assert!(
        harness
            .session
            .on_session_event(SessionEvent::SttFailure(SttError::NetworkError(
                "socket closed".to_string(),
            )))
            .await
            .unwrap()
    );
    {
        let log = harness.log.lock().await;
        assert!(log.contains(&"stt:disconnect".to_string()));
        assert!(log.contains(&"stt:connect".to_string()));
    }

    assert!(
        !harness
            .session
            .on_session_event(SessionEvent::SttFailure(SttError::NetworkError(
                "socket closed again".to_string(),
            )))
            .await
            .unwrap()
    );

    let log = harness.log.lock().await.clone();
    let connects = log.iter().filter(|l| *l == "stt:connect").count();
    assert_eq!(connects, 1);
}

#[tokio::test]
async fn generation_fault_returns_to_listening_then_second_ends_the_call() {
    let mut harness = open_session_with(true, vec![], true).await;
    harness
        .session
        .on_transport_event(start_event())
        .await
        .unwrap();
    harness
        .session
        .on_session_event(SessionEvent::Synthesis(TtsOutput::Flushed))
        .await
        .unwrap();

    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "hello".to_string(),
            true,
            true,
        )))
        .await
        .unwrap();
    let failed = next_event(&mut harness).await;
    assert!(matches!(
        failed,
        SessionEvent::GenerationFailed { generation: 1, .. }
    ));
    // First failure: back to listening, call continues.
    assert!(harness.session.on_session_event(failed).await.unwrap());

    harness
        .session
        .on_session_event(SessionEvent::Transcript(SttResult::transcript(
            "hello again".to_string(),
            true,
            true,
        )))
        .await
        .unwrap();
    let failed = next_event(&mut harness).await;
    assert!(matches!(
        failed,
        SessionEvent::GenerationFailed { generation: 2, .. }
    ));
    assert!(!harness.session.on_session_event(failed).await.unwrap());

    let log = harness.log.lock().await.clone();
    assert!(log.contains(&"stt:disconnect".to_string()));
}
