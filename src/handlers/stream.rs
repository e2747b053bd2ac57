//! Media stream websocket handler: one connection per phone call.
//!
//! The socket is split into a writer task fed by a bounded channel and a
//! reader driven by the session select loop. The session owns all call state;
//! this handler only moves frames between the socket and the session.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::core::llm::openai::OpenAiLlm;
use crate::core::session::{CallSession, TtsConnector};
use crate::core::stt::deepgram::{DeepgramStt, DeepgramSttConfig};
use crate::core::stt::{BaseStt, SttConfig};
use crate::core::telephony::TwilioEvent;
use crate::core::tts::deepgram::{DeepgramTts, DeepgramTtsConfig};
use crate::core::tts::{BaseTts, TtsConfig, TtsError};
use crate::state::AppState;

/// Outbound frame queue depth between the session and the socket writer.
const TRANSPORT_QUEUE_CAPACITY: usize = 64;

/// Connects a Deepgram Speak client once the agent's voice is known.
struct DeepgramTtsConnector {
    api_key: String,
    endpoint: String,
}

#[async_trait::async_trait]
impl TtsConnector for DeepgramTtsConnector {
    async fn connect(&mut self, voice_id: &str) -> Result<Box<dyn BaseTts>, TtsError> {
        let config = DeepgramTtsConfig::from_base(
            TtsConfig {
                api_key: self.api_key.clone(),
                voice_id: voice_id.to_string(),
                ..Default::default()
            },
            self.endpoint.clone(),
        );
        let mut tts = DeepgramTts::new(config)?;
        tts.connect().await?;
        Ok(Box::new(tts))
    }
}

/// Upgrade handler for `/streams`.
pub async fn stream_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let session_id = Uuid::new_v4();
    ws.on_upgrade(move |socket| {
        handle_stream(socket, state).instrument(info_span!("stream", %session_id))
    })
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    info!("Media stream connected");

    let stt_config = DeepgramSttConfig::from_base(
        SttConfig {
            api_key: state.config.deepgram_api_key.clone(),
            ..Default::default()
        },
        state.config.deepgram_stt_url.clone(),
    );

    let mut stt = match DeepgramStt::new(stt_config) {
        Ok(stt) => stt,
        Err(e) => {
            error!("Failed to build recognition client: {}", e);
            return;
        }
    };
    if let Err(e) = stt.connect().await {
        error!("Failed to connect recognition: {}", e);
        return;
    }

    let tts_connector = DeepgramTtsConnector {
        api_key: state.config.deepgram_api_key.clone(),
        endpoint: state.config.deepgram_tts_url.clone(),
    };

    let llm = Arc::new(OpenAiLlm::new(
        state.http.clone(),
        state.config.openai_base_url.clone(),
        state.config.openai_api_key.clone(),
        state.config.openai_model.clone(),
    ));

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (transport_tx, mut transport_rx) = mpsc::channel::<String>(TRANSPORT_QUEUE_CAPACITY);

    // Writer task: the only place that touches the socket sink.
    let writer = tokio::spawn(async move {
        while let Some(frame) = transport_rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let (mut session, mut events) = match CallSession::open(
        Box::new(stt),
        Box::new(tts_connector),
        llm,
        state.resolver.clone(),
        transport_tx,
    )
    .await
    {
        Ok(opened) => opened,
        Err(e) => {
            error!("Failed to open session: {}", e);
            writer.abort();
            return;
        }
    };

    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match TwilioEvent::parse(&text) {
                            Ok(event) => match session.on_transport_event(event).await {
                                Ok(true) => {}
                                Ok(false) => break,
                                Err(e) => {
                                    error!("Session error: {}", e);
                                    session.teardown().await;
                                    break;
                                }
                            },
                            Err(e) => {
                                debug!("Ignoring malformed telephony frame: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Media stream closed");
                        session.teardown().await;
                        break;
                    }
                    Some(Ok(_)) => {
                        // Twilio only sends text frames; ignore anything else.
                    }
                    Some(Err(e)) => {
                        warn!("Media stream socket error: {}", e);
                        session.teardown().await;
                        break;
                    }
                }
            }

            Some(event) = events.recv() => {
                match session.on_session_event(event).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        error!("Session error: {}", e);
                        session.teardown().await;
                        break;
                    }
                }
            }
        }
    }

    writer.abort();
    info!("Media stream handler finished");
}
