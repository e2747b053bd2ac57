//! The per-call state machine.
//!
//! One `CallSession` exists per telephony stream and is owned by the stream
//! handler's task; all mutable state lives here, unlocked. Two entry points
//! drive it: [`CallSession::on_transport_event`] for frames from the
//! telephony socket and [`CallSession::on_session_event`] for everything the
//! adapters push into the session channel. Both return `Ok(false)` when the
//! session is over and the caller should drop the socket.
//!
//! Lifecycle: `Idle` until the `start` frame, then `Listening`/`Speaking`
//! until `stop` or a fatal adapter failure moves it to `Closed`.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AgentProfile;
use crate::core::llm::BaseLlm;
use crate::core::session::buffer::{SpeechSegmenter, UtteranceBuffer};
use crate::core::session::events::SessionEvent;
use crate::core::stt::{BaseStt, SttError, SttResult};
use crate::core::telephony::messages::{MediaEvent, StartEvent, TwilioEvent};
use crate::core::telephony::transport::{TelephonyTransport, TransportError, decode_media_payload};
use crate::core::tts::{BaseTts, TtsError, TtsOutput};
use crate::directory::CallResolver;

/// Capacity of the session event channel shared by all adapters.
pub const SESSION_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Stt(#[from] SttError),

    #[error(transparent)]
    Tts(#[from] TtsError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Connects a synthesis client for a given voice.
///
/// The voice model is only known once the call's agent has been resolved, so
/// the TTS connection is established lazily at call start.
#[async_trait::async_trait]
pub trait TtsConnector: Send {
    async fn connect(&mut self, voice_id: &str) -> Result<Box<dyn BaseTts>, TtsError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Socket open, no `start` frame yet.
    Idle,
    /// Call live, caller audio flowing to recognition.
    Listening,
    /// Synthesized audio flowing to the caller. Recognition keeps running.
    Speaking,
    Closed,
}

/// Latency checkpoints for the utterance currently in flight.
#[derive(Debug, Default)]
struct LatencyMarks {
    utterance_finalized_at: Option<Instant>,
    first_token_at: Option<Instant>,
    first_audio_at: Option<Instant>,
}

impl LatencyMarks {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One phone call, bridged across recognition, generation and synthesis.
pub struct CallSession {
    phase: Phase,

    stream_sid: Option<String>,
    call_sid: Option<String>,
    agent: Option<AgentProfile>,

    transport_tx: mpsc::Sender<String>,
    transport: Option<TelephonyTransport>,

    stt: Box<dyn BaseStt>,
    tts_connector: Box<dyn TtsConnector>,
    tts: Option<Box<dyn BaseTts>>,
    llm: Arc<dyn BaseLlm>,
    resolver: Arc<dyn CallResolver>,

    event_tx: mpsc::Sender<SessionEvent>,

    utterance: UtteranceBuffer,
    segmenter: SpeechSegmenter,

    /// Monotonic id tagging generation output; bumping it orphans in-flight
    /// deltas after a cancel.
    generation: u64,
    generating: bool,
    cancel: CancellationToken,
    generation_task: Option<tokio::task::JoinHandle<()>>,

    latency: LatencyMarks,

    // Consecutive-failure counters, reset on recovery. One reconnect is
    // attempted per adapter; the second consecutive failure ends the call.
    stt_faults: u8,
    tts_faults: u8,
    llm_faults: u8,
}

impl CallSession {
    /// Wire up a session around an already-connected recognition client.
    ///
    /// Returns the session plus the receiver side of its event channel; the
    /// caller owns the select loop that feeds both receivers back in.
    pub async fn open(
        mut stt: Box<dyn BaseStt>,
        tts_connector: Box<dyn TtsConnector>,
        llm: Arc<dyn BaseLlm>,
        resolver: Arc<dyn CallResolver>,
        transport_tx: mpsc::Sender<String>,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), SessionError> {
        let (event_tx, event_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);

        wire_stt_callbacks(stt.as_mut(), &event_tx).await?;

        let session = Self {
            phase: Phase::Idle,
            stream_sid: None,
            call_sid: None,
            agent: None,
            transport_tx,
            transport: None,
            stt,
            tts_connector,
            tts: None,
            llm,
            resolver,
            event_tx,
            utterance: UtteranceBuffer::new(),
            segmenter: SpeechSegmenter::new(),
            generation: 0,
            generating: false,
            cancel: CancellationToken::new(),
            generation_task: None,
            latency: LatencyMarks::default(),
            stt_faults: 0,
            tts_faults: 0,
            llm_faults: 0,
        };

        Ok((session, event_rx))
    }

    /// Handle one frame from the telephony socket.
    ///
    /// Returns `Ok(false)` when the session has ended.
    pub async fn on_transport_event(&mut self, event: TwilioEvent) -> Result<bool, SessionError> {
        if self.phase == Phase::Closed {
            return Ok(false);
        }

        match event {
            TwilioEvent::Connected(_) => {
                debug!("Telephony stream connected");
            }

            TwilioEvent::Start(start) => {
                self.handle_start(start).await?;
            }

            TwilioEvent::Media(media) => {
                self.handle_media(media).await;
            }

            TwilioEvent::Stop(_) => {
                info!(call_sid = ?self.call_sid, "Call stopped");
                self.teardown().await;
                return Ok(false);
            }

            TwilioEvent::Mark(mark) => {
                debug!(name = %mark.mark.name, "Playback mark reached");
            }

            TwilioEvent::Unknown(raw) => {
                debug!("Ignoring unknown telephony event: {}", raw);
            }
        }

        Ok(self.phase != Phase::Closed)
    }

    /// Handle one adapter event.
    ///
    /// Returns `Ok(false)` when the session has ended.
    pub async fn on_session_event(&mut self, event: SessionEvent) -> Result<bool, SessionError> {
        if self.phase == Phase::Closed {
            return Ok(false);
        }

        match event {
            SessionEvent::Transcript(result) => self.handle_transcript(result).await?,

            SessionEvent::Synthesis(output) => self.handle_synthesis(output).await?,

            SessionEvent::GenerationDelta { generation, text } => {
                self.handle_generation_delta(generation, text).await?;
            }

            SessionEvent::GenerationDone { generation } => {
                self.handle_generation_done(generation).await?;
            }

            SessionEvent::GenerationFailed { generation, error } => {
                if generation != self.generation {
                    debug!("Dropping failure from cancelled generation {}", generation);
                } else {
                    error!("Generation failed: {}", error);
                    self.generating = false;
                    self.llm_faults += 1;
                    if self.llm_faults > 1 {
                        warn!("Second consecutive generation failure, ending call");
                        self.teardown().await;
                    } else {
                        self.phase = Phase::Listening;
                    }
                }
            }

            SessionEvent::SttFailure(error) => {
                self.recover_stt(error).await;
            }

            SessionEvent::TtsFailure(error) => {
                self.recover_tts(error).await;
            }
        }

        Ok(self.phase != Phase::Closed)
    }

    /// End the session. Safe to call more than once.
    pub async fn teardown(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.phase = Phase::Closed;

        self.cancel.cancel();
        if let Some(task) = self.generation_task.take() {
            task.abort();
        }

        if let Err(e) = self.stt.disconnect().await {
            warn!("Error disconnecting recognition: {}", e);
        }
        if let Some(mut tts) = self.tts.take()
            && let Err(e) = tts.disconnect().await
        {
            warn!("Error disconnecting synthesis: {}", e);
        }

        info!(call_sid = ?self.call_sid, "Session closed");
    }

    async fn handle_start(&mut self, start: StartEvent) -> Result<(), SessionError> {
        info!(
            stream_sid = %start.stream_sid,
            call_sid = %start.start.call_sid,
            "Call started"
        );

        self.stream_sid = Some(start.stream_sid.clone());
        self.call_sid = Some(start.start.call_sid.clone());
        self.transport = Some(TelephonyTransport::new(
            start.stream_sid,
            self.transport_tx.clone(),
        ));
        self.phase = Phase::Listening;

        // Resolve which agent answers this number. A miss (or a lookup
        // failure) leaves the session listening; it will never speak.
        let agent = match self.resolver.resolve(&start.start.call_sid).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Agent resolution failed: {}", e);
                None
            }
        };

        let Some(agent) = agent else {
            info!(call_sid = %start.start.call_sid, "No agent for this number");
            return Ok(());
        };

        // The agent is bound before the first synthesis attempt so the fault
        // policy can reconnect with the right voice.
        let greeting = agent.welcome_message.clone();
        self.agent = Some(agent);

        // The initial connect falls under the same retry policy as any later
        // synthesis fault.
        if let Err(error) = self.connect_tts().await
            && !self.recover_tts(error).await
        {
            return Ok(());
        }

        // Greet the caller straight through synthesis; no recognition or
        // generation is involved.
        self.phase = Phase::Speaking;
        if self.speak_checked(&greeting).await {
            self.flush_checked().await;
        }

        Ok(())
    }

    async fn handle_media(&mut self, media: MediaEvent) {
        if self.phase == Phase::Idle || !media.is_inbound() {
            return;
        }

        // Caller audio is relayed in both Listening and Speaking: recognition
        // keeps running during playback so barge-in can be detected.
        let frame = match decode_media_payload(&media.media.payload) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Dropping malformed media frame: {}", e);
                return;
            }
        };

        if let Err(e) = self.stt.send_audio(frame).await {
            warn!("Failed to forward audio to recognition: {}", e);
        }
    }

    async fn handle_transcript(&mut self, result: SttResult) -> Result<(), SessionError> {
        // Any sign of caller speech during playback interrupts it.
        if self.phase == Phase::Speaking && !result.transcript.is_empty() {
            self.barge_in().await?;
        }

        if result.is_final && !result.transcript.is_empty() {
            debug!(transcript = %result.transcript, "Final transcript fragment");
            self.utterance.push(&result.transcript);
            self.stt_faults = 0;
        }

        if result.is_utterance_boundary() && !self.utterance.is_empty() && !self.generating {
            let utterance = self.utterance.flush();
            info!(utterance = %utterance, "Utterance complete");
            self.start_generation(utterance);
        }

        Ok(())
    }

    async fn handle_synthesis(&mut self, output: TtsOutput) -> Result<(), SessionError> {
        match output {
            TtsOutput::Audio(chunk) => {
                // Audio arriving outside Speaking belongs to a cancelled
                // utterance and is dropped.
                if self.phase != Phase::Speaking {
                    debug!("Dropping {} bytes of stale synthesis audio", chunk.len());
                    return Ok(());
                }

                if self.latency.first_audio_at.is_none() {
                    self.latency.first_audio_at = Some(Instant::now());
                    if let Some(finalized) = self.latency.utterance_finalized_at {
                        info!(
                            elapsed_ms = finalized.elapsed().as_millis() as u64,
                            "Time to first audio byte"
                        );
                    }
                }

                if let Some(transport) = &self.transport {
                    transport.send_audio(&chunk).await?;
                }
                self.tts_faults = 0;
            }

            TtsOutput::Flushed => {
                debug!("Synthesis flushed");
                if self.phase == Phase::Speaking && !self.generating {
                    // Everything queued has been synthesized; go back to
                    // listening for the next utterance.
                    self.phase = Phase::Listening;
                    self.latency.reset();
                }
            }

            TtsOutput::Cleared => {
                debug!("Synthesis buffer cleared");
            }
        }

        Ok(())
    }

    async fn handle_generation_delta(
        &mut self,
        generation: u64,
        text: String,
    ) -> Result<(), SessionError> {
        if generation != self.generation {
            debug!("Dropping delta from cancelled generation {}", generation);
            return Ok(());
        }

        if self.latency.first_token_at.is_none() {
            self.latency.first_token_at = Some(Instant::now());
            if let Some(finalized) = self.latency.utterance_finalized_at {
                info!(
                    elapsed_ms = finalized.elapsed().as_millis() as u64,
                    "Time to first token"
                );
            }
        }

        let fragments = self.segmenter.push(&text);
        if fragments.is_empty() {
            return Ok(());
        }

        if self.tts.is_none() {
            warn!("Generation output with no synthesis connection");
            return Ok(());
        }

        for fragment in fragments {
            debug!(fragment = %fragment, "Releasing fragment to synthesis");
            if !self.speak_checked(&fragment).await {
                return Ok(());
            }
        }
        // Speaking starts as soon as the first fragment is queued; audio
        // chunks arriving before this flip would otherwise be dropped.
        self.phase = Phase::Speaking;

        Ok(())
    }

    async fn handle_generation_done(&mut self, generation: u64) -> Result<(), SessionError> {
        if generation != self.generation {
            debug!("Dropping completion of cancelled generation {}", generation);
            return Ok(());
        }

        self.generating = false;
        self.llm_faults = 0;
        self.generation_task = None;

        if self.tts.is_some() {
            if let Some(remainder) = self.segmenter.take_remainder() {
                if !self.speak_checked(&remainder).await {
                    return Ok(());
                }
                self.phase = Phase::Speaking;
            }
            self.flush_checked().await;
        }

        Ok(())
    }

    /// The caller spoke while we were speaking: stop everything downstream.
    async fn barge_in(&mut self) -> Result<(), SessionError> {
        info!(call_sid = ?self.call_sid, "Barge-in detected");

        // Order matters: silence synthesis first, then drop what the
        // telephony side has buffered, then orphan the generation. If the
        // clear itself faults, the replacement socket starts empty.
        if !self.clear_checked().await {
            return Ok(());
        }
        if let Some(transport) = &self.transport {
            transport.clear().await?;
        }

        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation = self.generation.wrapping_add(1);
        self.generating = false;
        if let Some(task) = self.generation_task.take() {
            task.abort();
        }
        self.segmenter.reset();
        self.latency.reset();
        self.phase = Phase::Listening;

        Ok(())
    }

    fn start_generation(&mut self, utterance: String) {
        let Some(agent) = self.agent.as_ref() else {
            debug!("No agent bound; utterance discarded");
            return;
        };

        self.generation = self.generation.wrapping_add(1);
        self.generating = true;
        self.cancel = CancellationToken::new();
        self.latency.reset();
        self.latency.utterance_finalized_at = Some(Instant::now());

        let generation = self.generation;
        let persona = agent.persona_prompt.clone();
        let llm = self.llm.clone();
        let event_tx = self.event_tx.clone();
        let cancel = self.cancel.clone();

        self.generation_task = Some(tokio::spawn(async move {
            let mut stream = match llm.stream_completion(&persona, &utterance).await {
                Ok(stream) => stream,
                Err(error) => {
                    let _ = event_tx
                        .send(SessionEvent::GenerationFailed { generation, error })
                        .await;
                    return;
                }
            };

            loop {
                tokio::select! {
                    // Cancellation drops the stream, aborting the HTTP body.
                    _ = cancel.cancelled() => {
                        debug!("Generation {} cancelled", generation);
                        return;
                    }
                    item = stream.next() => {
                        match item {
                            Some(Ok(text)) => {
                                if event_tx
                                    .send(SessionEvent::GenerationDelta { generation, text })
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            Some(Err(error)) => {
                                let _ = event_tx
                                    .send(SessionEvent::GenerationFailed { generation, error })
                                    .await;
                                return;
                            }
                            None => {
                                let _ = event_tx
                                    .send(SessionEvent::GenerationDone { generation })
                                    .await;
                                return;
                            }
                        }
                    }
                }
            }
        }));
    }

    /// Apply the single-reconnect policy to a recognition fault.
    ///
    /// Returns `false` when the session was torn down.
    async fn recover_stt(&mut self, error: SttError) -> bool {
        error!("Recognition failure: {}", error);
        self.stt_faults += 1;
        if self.stt_faults > 1 {
            warn!("Second consecutive recognition failure, ending call");
            self.teardown().await;
            return false;
        }
        // One reconnect with the same configuration.
        if let Err(e) = self.reconnect_stt().await {
            warn!("Recognition reconnect failed: {}", e);
            self.teardown().await;
            return false;
        }
        true
    }

    /// Apply the single-reconnect policy to a synthesis fault, whether it
    /// surfaced through the error callback or a direct call.
    ///
    /// Returns `false` when the session was torn down.
    async fn recover_tts(&mut self, error: TtsError) -> bool {
        error!("Synthesis failure: {}", error);
        self.tts_faults += 1;
        if self.tts_faults > 1 {
            warn!("Second consecutive synthesis failure, ending call");
            self.teardown().await;
            return false;
        }
        if let Err(e) = self.reconnect_tts().await {
            warn!("Synthesis reconnect failed: {}", e);
            self.teardown().await;
            return false;
        }
        true
    }

    /// Speak one fragment, recovering synthesis on failure. The fragment is
    /// dropped when a reconnect was needed.
    ///
    /// Returns `false` when the session was torn down.
    async fn speak_checked(&mut self, text: &str) -> bool {
        let result = match self.tts.as_mut() {
            Some(tts) => tts.speak(text).await,
            None => return true,
        };
        match result {
            Ok(()) => true,
            Err(error) => self.recover_tts(error).await,
        }
    }

    /// Flush synthesis, recovering on failure.
    ///
    /// Returns `false` when the session was torn down.
    async fn flush_checked(&mut self) -> bool {
        let result = match self.tts.as_mut() {
            Some(tts) => tts.flush().await,
            None => return true,
        };
        match result {
            Ok(()) => true,
            Err(error) => self.recover_tts(error).await,
        }
    }

    /// Clear synthesis, recovering on failure.
    ///
    /// Returns `false` when the session was torn down.
    async fn clear_checked(&mut self) -> bool {
        let result = match self.tts.as_mut() {
            Some(tts) => tts.clear().await,
            None => return true,
        };
        match result {
            Ok(()) => true,
            Err(error) => self.recover_tts(error).await,
        }
    }

    async fn reconnect_stt(&mut self) -> Result<(), SttError> {
        info!("Reconnecting recognition");
        let _ = self.stt.disconnect().await;
        self.stt.connect().await?;
        wire_stt_callbacks(self.stt.as_mut(), &self.event_tx).await?;
        Ok(())
    }

    async fn reconnect_tts(&mut self) -> Result<(), TtsError> {
        info!("Reconnecting synthesis");
        self.connect_tts().await
    }

    /// Connect (or replace) the synthesis client for the bound agent's voice.
    async fn connect_tts(&mut self) -> Result<(), TtsError> {
        let Some(agent) = self.agent.as_ref() else {
            return Ok(());
        };
        if let Some(mut old) = self.tts.take() {
            let _ = old.disconnect().await;
        }
        let mut tts = self.tts_connector.connect(&agent.voice_id).await?;
        wire_tts_callbacks(tts.as_mut(), &self.event_tx).await?;
        self.tts = Some(tts);
        Ok(())
    }
}

async fn wire_stt_callbacks(
    stt: &mut dyn BaseStt,
    event_tx: &mpsc::Sender<SessionEvent>,
) -> Result<(), SttError> {
    let tx = event_tx.clone();
    stt.on_result(Arc::new(move |result| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(SessionEvent::Transcript(result)).await;
        })
    }))
    .await?;

    let tx = event_tx.clone();
    stt.on_error(Arc::new(move |error| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(SessionEvent::SttFailure(error)).await;
        })
    }))
    .await?;

    Ok(())
}

async fn wire_tts_callbacks(
    tts: &mut dyn BaseTts,
    event_tx: &mpsc::Sender<SessionEvent>,
) -> Result<(), TtsError> {
    let tx = event_tx.clone();
    tts.on_output(Arc::new(move |output| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(SessionEvent::Synthesis(output)).await;
        })
    }))
    .await?;

    let tx = event_tx.clone();
    tts.on_error(Arc::new(move |error| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(SessionEvent::TtsFailure(error)).await;
        })
    }))
    .await?;

    Ok(())
}
