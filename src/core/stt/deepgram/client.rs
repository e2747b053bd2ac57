//! Deepgram live transcription WebSocket client.
//!
//! One spawned task owns the socket. Audio enters through a bounded channel
//! and is written as binary frames; parsed transcripts and connection errors
//! leave through two more bounded channels, each drained by a forwarding task
//! that drives the registered callback:
//!
//! ```text
//! send_audio ─▶ [audio chan] ─▶ socket task ─▶ [result chan] ─▶ result callback
//!                                          └─▶ [error chan]  ─▶ error callback
//! ```
//!
//! The socket task also ticks a KeepAlive heartbeat so Deepgram does not
//! drop the socket during long stretches of caller silence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{interval, timeout};
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::config::DeepgramSttConfig;
use super::messages::{CloseStreamMessage, DeepgramSttMessage, KeepAliveMessage};
use crate::core::stt::base::{
    BaseStt, SttError, SttErrorCallback, SttResult, SttResultCallback,
};

/// A socket that produces nothing for this long is treated as dead. The
/// timer restarts on every received message.
const WS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// KeepAlive heartbeat interval. Deepgram closes idle connections after ~10s
/// without audio or a KeepAlive.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(8);

/// Handshake timeout waiting for the websocket to come up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type AsyncResultCallback = Box<
    dyn Fn(SttResult) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        + Send
        + Sync,
>;

type AsyncErrorCallback = Box<
    dyn Fn(SttError) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        + Send
        + Sync,
>;

/// Deepgram live transcription client.
pub struct DeepgramStt {
    config: DeepgramSttConfig,

    /// Audio frames queued for the socket task. Bounded at 32 so a stalled
    /// socket pushes back on the media handler instead of buffering.
    ws_sender: Option<mpsc::Sender<Bytes>>,

    /// Tells the socket task to close the stream.
    shutdown_tx: Option<oneshot::Sender<()>>,

    connection_handle: Option<tokio::task::JoinHandle<()>>,
    result_forward_handle: Option<tokio::task::JoinHandle<()>>,
    error_forward_handle: Option<tokio::task::JoinHandle<()>>,

    /// Registered transcript callback, shared with the forwarding task.
    result_callback: Arc<Mutex<Option<AsyncResultCallback>>>,

    /// Registered error callback, shared with the forwarding task.
    error_callback: Arc<Mutex<Option<AsyncErrorCallback>>>,

    /// Flipped by the socket task as the connection comes and goes.
    is_connected: Arc<AtomicBool>,
}

impl DeepgramStt {
    pub fn new(config: DeepgramSttConfig) -> Result<Self, SttError> {
        if config.base.api_key.is_empty() {
            return Err(SttError::AuthenticationFailed(
                "API key is required for Deepgram STT".to_string(),
            ));
        }

        Ok(Self {
            config,
            ws_sender: None,
            shutdown_tx: None,
            connection_handle: None,
            result_forward_handle: None,
            error_forward_handle: None,
            result_callback: Arc::new(Mutex::new(None)),
            error_callback: Arc::new(Mutex::new(None)),
            is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle one incoming WebSocket message.
    ///
    /// Returns `Ok(true)` to keep the connection running, `Ok(false)` when
    /// the server closed the stream.
    fn handle_websocket_message(
        message: Message,
        result_tx: &mpsc::Sender<SttResult>,
    ) -> Result<bool, SttError> {
        match message {
            Message::Text(text) => {
                match DeepgramSttMessage::parse(&text) {
                    Ok(parsed) => match parsed {
                        DeepgramSttMessage::Results(results) => {
                            let transcript = results.transcript().to_string();
                            // Deepgram emits empty interim results during
                            // silence; skip them to keep the channel quiet.
                            if transcript.is_empty() && !results.is_final {
                                return Ok(true);
                            }

                            let result = SttResult::transcript(
                                transcript,
                                results.is_final,
                                results.speech_final,
                            );
                            if result_tx.try_send(result).is_err() {
                                warn!("Failed to send transcription result - channel closed");
                            }
                        }

                        DeepgramSttMessage::UtteranceEnd(end) => {
                            debug!(last_word_end = ?end.last_word_end, "Utterance end");
                            if result_tx.try_send(SttResult::utterance_end()).is_err() {
                                warn!("Failed to send utterance end - channel closed");
                            }
                        }

                        DeepgramSttMessage::SpeechStarted(_) => {
                            debug!("Speech started");
                        }

                        DeepgramSttMessage::Metadata(meta) => {
                            info!(request_id = ?meta.request_id, "Deepgram STT metadata");
                        }

                        DeepgramSttMessage::Unknown(raw) => {
                            debug!("Unknown Deepgram STT message: {}", raw);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to parse Deepgram STT message: {}", e);
                    }
                }
            }

            Message::Close(frame) => {
                info!("Deepgram STT WebSocket closed: {:?}", frame);
                return Ok(false);
            }

            Message::Ping(_) | Message::Pong(_) => {}

            Message::Binary(_) => {
                debug!("Unexpected binary message from Deepgram STT");
            }

            _ => {}
        }

        Ok(true)
    }
}

impl Drop for DeepgramStt {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

#[async_trait::async_trait]
impl BaseStt for DeepgramStt {
    async fn connect(&mut self) -> Result<(), SttError> {
        let ws_url = self.config.build_websocket_url()?;

        let (ws_tx, mut ws_rx) = mpsc::channel::<Bytes>(32);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        // Transcripts and errors travel on separate channels so one cannot
        // starve the other.
        let (result_tx, mut result_rx) = mpsc::channel::<SttResult>(256);
        let (error_tx, mut error_rx) = mpsc::channel::<SttError>(64);
        let (connected_tx, connected_rx) = oneshot::channel::<()>();

        self.ws_sender = Some(ws_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let api_key = self.config.base.api_key.clone();
        let host = url::Url::parse(&ws_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();
        let is_connected = self.is_connected.clone();

        let connection_handle = tokio::spawn(async move {
            let request = match tokio_tungstenite::tungstenite::http::Request::builder()
                .method("GET")
                .uri(&ws_url)
                .header("Host", host)
                .header("Upgrade", "websocket")
                .header("Connection", "upgrade")
                .header("Sec-WebSocket-Key", generate_key())
                .header("Sec-WebSocket-Version", "13")
                .header("Authorization", format!("Token {api_key}"))
                .body(())
            {
                Ok(request) => request,
                Err(e) => {
                    let stt_error = SttError::ConnectionFailed(format!(
                        "Failed to create WebSocket request: {e}"
                    ));
                    error!("{}", stt_error);
                    let _ = error_tx.try_send(stt_error);
                    return;
                }
            };

            let (ws_stream, _response) = match connect_async(request).await {
                Ok(result) => result,
                Err(e) => {
                    let stt_error =
                        SttError::ConnectionFailed(format!("Failed to connect to Deepgram: {e}"));
                    error!("{}", stt_error);
                    let _ = error_tx.try_send(stt_error);
                    return;
                }
            };

            info!("Connected to Deepgram STT WebSocket");
            is_connected.store(true, Ordering::Release);
            let _ = connected_tx.send(());

            let (mut ws_sink, mut ws_stream) = ws_stream.split();
            let mut keepalive = interval(KEEPALIVE_INTERVAL);
            keepalive.tick().await; // swallow the immediate tick

            loop {
                tokio::select! {
                    // Outgoing audio
                    Some(audio_data) = ws_rx.recv() => {
                        if let Err(e) = ws_sink.send(Message::Binary(audio_data)).await {
                            let stt_error = SttError::NetworkError(format!(
                                "Failed to send audio to Deepgram: {e}"
                            ));
                            error!("{}", stt_error);
                            let _ = error_tx.try_send(stt_error);
                            break;
                        }
                    }

                    // Heartbeat, independent of audio traffic
                    _ = keepalive.tick() => {
                        if let Ok(json) = serde_json::to_string(&KeepAliveMessage::default())
                            && let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                warn!("Failed to send KeepAlive: {}", e);
                            }
                    }

                    // Incoming messages with idle timeout
                    message = timeout(WS_MESSAGE_TIMEOUT, ws_stream.next()) => {
                        match message {
                            Ok(Some(Ok(msg))) => {
                                match Self::handle_websocket_message(msg, &result_tx) {
                                    Ok(true) => {}
                                    Ok(false) => {
                                        is_connected.store(false, Ordering::Release);
                                        break;
                                    }
                                    Err(e) => {
                                        error!("Deepgram STT streaming error: {}", e);
                                        let _ = error_tx.try_send(e);
                                        is_connected.store(false, Ordering::Release);
                                        break;
                                    }
                                }
                            }
                            Ok(Some(Err(e))) => {
                                let stt_error = SttError::NetworkError(format!(
                                    "WebSocket error: {e}"
                                ));
                                error!("{}", stt_error);
                                let _ = error_tx.try_send(stt_error);
                                is_connected.store(false, Ordering::Release);
                                break;
                            }
                            Ok(None) => {
                                info!("Deepgram STT WebSocket stream ended");
                                is_connected.store(false, Ordering::Release);
                                break;
                            }
                            Err(_elapsed) => {
                                let stt_error = SttError::NetworkError(
                                    "WebSocket idle timeout - no message for 60 seconds".into()
                                );
                                error!("Deepgram STT idle timeout");
                                let _ = error_tx.try_send(stt_error);
                                is_connected.store(false, Ordering::Release);
                                break;
                            }
                        }
                    }

                    // Shutdown signal
                    _ = &mut shutdown_rx => {
                        info!("Received shutdown signal for Deepgram STT");
                        if let Ok(json) = serde_json::to_string(&CloseStreamMessage::default()) {
                            let _ = ws_sink.send(Message::Text(json.into())).await;
                        }
                        let _ = ws_sink.send(Message::Close(None)).await;
                        is_connected.store(false, Ordering::Release);
                        break;
                    }
                }
            }

            info!("Deepgram STT WebSocket connection closed");
        });

        self.connection_handle = Some(connection_handle);

        // Result forwarding task
        let callback_ref = self.result_callback.clone();
        self.result_forward_handle = Some(tokio::spawn(async move {
            while let Some(result) = result_rx.recv().await {
                if let Some(callback) = callback_ref.lock().await.as_ref() {
                    callback(result).await;
                } else {
                    debug!(
                        "Deepgram STT result (no callback): {} (final: {})",
                        result.transcript, result.is_final
                    );
                }
            }
        }));

        // Error forwarding task
        let error_callback_ref = self.error_callback.clone();
        self.error_forward_handle = Some(tokio::spawn(async move {
            while let Some(err) = error_rx.recv().await {
                if let Some(callback) = error_callback_ref.lock().await.as_ref() {
                    callback(err).await;
                } else {
                    error!("Deepgram STT error (no callback registered): {}", err);
                }
            }
        }));

        match timeout(CONNECT_TIMEOUT, connected_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SttError::ConnectionFailed(
                "Connection task ended before handshake completed".to_string(),
            )),
            Err(_) => Err(SttError::ConnectionFailed(
                "Timeout waiting for Deepgram STT connection".to_string(),
            )),
        }
    }

    async fn disconnect(&mut self) -> Result<(), SttError> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.connection_handle.take() {
            let _ = timeout(Duration::from_secs(5), handle).await;
        }

        if let Some(handle) = self.result_forward_handle.take() {
            handle.abort();
            let _ = handle.await;
        }

        if let Some(handle) = self.error_forward_handle.take() {
            handle.abort();
            let _ = handle.await;
        }

        self.ws_sender = None;
        *self.result_callback.lock().await = None;
        *self.error_callback.lock().await = None;
        self.is_connected.store(false, Ordering::Release);

        info!("Disconnected from Deepgram STT");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.is_connected.load(Ordering::Acquire) && self.ws_sender.is_some()
    }

    async fn send_audio(&mut self, audio: Bytes) -> Result<(), SttError> {
        if !self.is_ready() {
            return Err(SttError::ConnectionFailed(
                "Not connected to Deepgram STT".to_string(),
            ));
        }

        if let Some(ws_sender) = &self.ws_sender {
            ws_sender
                .send(audio)
                .await
                .map_err(|e| SttError::NetworkError(format!("Failed to queue audio: {e}")))?;
        }

        Ok(())
    }

    async fn on_result(&mut self, callback: SttResultCallback) -> Result<(), SttError> {
        *self.result_callback.lock().await = Some(Box::new(move |result| {
            let cb = callback.clone();
            Box::pin(async move {
                cb(result).await;
            })
        }));
        Ok(())
    }

    async fn on_error(&mut self, callback: SttErrorCallback) -> Result<(), SttError> {
        *self.error_callback.lock().await = Some(Box::new(move |error| {
            let cb = callback.clone();
            Box::pin(async move {
                cb(error).await;
            })
        }));
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "Deepgram Live Transcription"
    }
}
