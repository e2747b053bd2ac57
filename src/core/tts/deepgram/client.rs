//! Deepgram Speak WebSocket client.
//!
//! Mirrors the STT client architecture: a connection task owns the websocket
//! and multiplexes outgoing control messages with incoming audio, while a
//! forwarding task drives the registered output callback. Binary frames are
//! synthesized audio and are relayed in arrival order; JSON text frames are
//! control acknowledgements.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::config::DeepgramTtsConfig;
use super::messages::{
    ClearMessage, CloseMessage, DeepgramTtsMessage, FlushMessage, SpeakMessage,
};
use crate::core::tts::base::{
    BaseTts, TtsError, TtsErrorCallback, TtsOutput, TtsOutputCallback,
};

/// A socket that produces nothing for this long is treated as dead. The
/// timer restarts on every received message.
const WS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Handshake timeout waiting for the websocket to come up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type AsyncOutputCallback = Box<
    dyn Fn(TtsOutput) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        + Send
        + Sync,
>;

type AsyncErrorCallback = Box<
    dyn Fn(TtsError) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        + Send
        + Sync,
>;

/// Deepgram streaming TTS client.
pub struct DeepgramTts {
    config: DeepgramTtsConfig,

    /// Control messages (Speak, Flush, Clear) queued for the socket task.
    /// Bounded at 32: sentence fragments can burst during fast generation.
    control_tx: Option<mpsc::Sender<String>>,

    /// Tells the socket task to close the stream.
    shutdown_tx: Option<oneshot::Sender<()>>,

    connection_handle: Option<tokio::task::JoinHandle<()>>,
    output_forward_handle: Option<tokio::task::JoinHandle<()>>,
    error_forward_handle: Option<tokio::task::JoinHandle<()>>,

    /// Registered output callback, shared with the forwarding task.
    output_callback: Arc<Mutex<Option<AsyncOutputCallback>>>,

    /// Registered error callback, shared with the forwarding task.
    error_callback: Arc<Mutex<Option<AsyncErrorCallback>>>,

    /// Flipped by the socket task as the connection comes and goes.
    is_connected: Arc<AtomicBool>,
}

impl DeepgramTts {
    pub fn new(config: DeepgramTtsConfig) -> Result<Self, TtsError> {
        if config.base.api_key.is_empty() {
            return Err(TtsError::AuthenticationFailed(
                "API key is required for Deepgram TTS".to_string(),
            ));
        }
        if config.base.voice_id.is_empty() {
            return Err(TtsError::ConfigurationError(
                "Voice model is required for Deepgram TTS".to_string(),
            ));
        }

        Ok(Self {
            config,
            control_tx: None,
            shutdown_tx: None,
            connection_handle: None,
            output_forward_handle: None,
            error_forward_handle: None,
            output_callback: Arc::new(Mutex::new(None)),
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
        output_tx: &mpsc::Sender<TtsOutput>,
    ) -> Result<bool, TtsError> {
        match message {
            Message::Binary(audio) => {
                if output_tx.try_send(TtsOutput::Audio(audio)).is_err() {
                    warn!("Failed to send synthesized audio - channel closed");
                }
            }

            Message::Text(text) => match DeepgramTtsMessage::parse(&text) {
                Ok(parsed) => match parsed {
                    DeepgramTtsMessage::Metadata(meta) => {
                        info!(request_id = ?meta.request_id, "Deepgram TTS metadata");
                    }
                    DeepgramTtsMessage::Flushed(_) => {
                        if output_tx.try_send(TtsOutput::Flushed).is_err() {
                            warn!("Failed to send flushed signal - channel closed");
                        }
                    }
                    DeepgramTtsMessage::Cleared(_) => {
                        debug!("Deepgram TTS buffer cleared");
                        if output_tx.try_send(TtsOutput::Cleared).is_err() {
                            warn!("Failed to send cleared signal - channel closed");
                        }
                    }
                    DeepgramTtsMessage::Warning(warning) => {
                        warn!(
                            code = ?warning.code,
                            description = ?warning.description,
                            "Deepgram TTS warning"
                        );
                    }
                    DeepgramTtsMessage::Unknown(raw) => {
                        debug!("Unknown Deepgram TTS message: {}", raw);
                    }
                },
                Err(e) => {
                    warn!("Failed to parse Deepgram TTS message: {}", e);
                }
            },

            Message::Close(frame) => {
                info!("Deepgram TTS WebSocket closed: {:?}", frame);
                return Ok(false);
            }

            Message::Ping(_) | Message::Pong(_) => {}

            _ => {}
        }

        Ok(true)
    }

    async fn send_control(&self, json: String) -> Result<(), TtsError> {
        if !self.is_ready() {
            return Err(TtsError::ConnectionFailed(
                "Not connected to Deepgram TTS".to_string(),
            ));
        }

        let control_tx = self
            .control_tx
            .as_ref()
            .ok_or_else(|| TtsError::ConnectionFailed("Control channel not available".into()))?;

        control_tx
            .send(json)
            .await
            .map_err(|e| TtsError::NetworkError(format!("Failed to queue control message: {e}")))
    }
}

impl Drop for DeepgramTts {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

#[async_trait::async_trait]
impl BaseTts for DeepgramTts {
    async fn connect(&mut self) -> Result<(), TtsError> {
        let ws_url = self.config.build_websocket_url()?;

        let (control_tx, mut control_rx) = mpsc::channel::<String>(32);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (output_tx, mut output_rx) = mpsc::channel::<TtsOutput>(256);
        let (error_tx, mut error_rx) = mpsc::channel::<TtsError>(64);
        let (connected_tx, connected_rx) = oneshot::channel::<()>();

        self.control_tx = Some(control_tx);
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
                    let tts_error = TtsError::ConnectionFailed(format!(
                        "Failed to create WebSocket request: {e}"
                    ));
                    error!("{}", tts_error);
                    let _ = error_tx.try_send(tts_error);
                    return;
                }
            };

            let (ws_stream, _response) = match connect_async(request).await {
                Ok(result) => result,
                Err(e) => {
                    let tts_error =
                        TtsError::ConnectionFailed(format!("Failed to connect to Deepgram: {e}"));
                    error!("{}", tts_error);
                    let _ = error_tx.try_send(tts_error);
                    return;
                }
            };

            info!("Connected to Deepgram TTS WebSocket");
            is_connected.store(true, Ordering::Release);
            let _ = connected_tx.send(());

            let (mut ws_sink, mut ws_stream) = ws_stream.split();

            loop {
                tokio::select! {
                    // Outgoing control messages (Speak, Flush, Clear)
                    Some(control_msg) = control_rx.recv() => {
                        if let Err(e) = ws_sink.send(Message::Text(control_msg.into())).await {
                            let tts_error = TtsError::NetworkError(format!(
                                "Failed to send control message: {e}"
                            ));
                            error!("{}", tts_error);
                            let _ = error_tx.try_send(tts_error);
                            break;
                        }
                    }

                    // Incoming audio and acknowledgements with idle timeout
                    message = timeout(WS_MESSAGE_TIMEOUT, ws_stream.next()) => {
                        match message {
                            Ok(Some(Ok(msg))) => {
                                match Self::handle_websocket_message(msg, &output_tx) {
                                    Ok(true) => {}
                                    Ok(false) => {
                                        is_connected.store(false, Ordering::Release);
                                        break;
                                    }
                                    Err(e) => {
                                        error!("Deepgram TTS streaming error: {}", e);
                                        let _ = error_tx.try_send(e);
                                        is_connected.store(false, Ordering::Release);
                                        break;
                                    }
                                }
                            }
                            Ok(Some(Err(e))) => {
                                let tts_error = TtsError::NetworkError(format!(
                                    "WebSocket error: {e}"
                                ));
                                error!("{}", tts_error);
                                let _ = error_tx.try_send(tts_error);
                                is_connected.store(false, Ordering::Release);
                                break;
                            }
                            Ok(None) => {
                                info!("Deepgram TTS WebSocket stream ended");
                                is_connected.store(false, Ordering::Release);
                                break;
                            }
                            Err(_elapsed) => {
                                let tts_error = TtsError::NetworkError(
                                    "WebSocket idle timeout - no message for 60 seconds".into()
                                );
                                error!("Deepgram TTS idle timeout");
                                let _ = error_tx.try_send(tts_error);
                                is_connected.store(false, Ordering::Release);
                                break;
                            }
                        }
                    }

                    // Shutdown signal
                    _ = &mut shutdown_rx => {
                        info!("Received shutdown signal for Deepgram TTS");
                        if let Ok(json) = serde_json::to_string(&CloseMessage::default()) {
                            let _ = ws_sink.send(Message::Text(json.into())).await;
                        }
                        let _ = ws_sink.send(Message::Close(None)).await;
                        is_connected.store(false, Ordering::Release);
                        break;
                    }
                }
            }

            info!("Deepgram TTS WebSocket connection closed");
        });

        self.connection_handle = Some(connection_handle);

        // Output forwarding task
        let callback_ref = self.output_callback.clone();
        self.output_forward_handle = Some(tokio::spawn(async move {
            while let Some(output) = output_rx.recv().await {
                if let Some(callback) = callback_ref.lock().await.as_ref() {
                    callback(output).await;
                } else {
                    debug!("Deepgram TTS output dropped (no callback registered)");
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
                    error!("Deepgram TTS error (no callback registered): {}", err);
                }
            }
        }));

        match timeout(CONNECT_TIMEOUT, connected_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TtsError::ConnectionFailed(
                "Connection task ended before handshake completed".to_string(),
            )),
            Err(_) => Err(TtsError::ConnectionFailed(
                "Timeout waiting for Deepgram TTS connection".to_string(),
            )),
        }
    }

    async fn disconnect(&mut self) -> Result<(), TtsError> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.connection_handle.take() {
            let _ = timeout(Duration::from_secs(5), handle).await;
        }

        if let Some(handle) = self.output_forward_handle.take() {
            handle.abort();
            let _ = handle.await;
        }

        if let Some(handle) = self.error_forward_handle.take() {
            handle.abort();
            let _ = handle.await;
        }

        self.control_tx = None;
        *self.output_callback.lock().await = None;
        *self.error_callback.lock().await = None;
        self.is_connected.store(false, Ordering::Release);

        info!("Disconnected from Deepgram TTS");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.is_connected.load(Ordering::Acquire) && self.control_tx.is_some()
    }

    async fn speak(&mut self, text: &str) -> Result<(), TtsError> {
        let json = serde_json::to_string(&SpeakMessage::new(text))
            .map_err(|e| TtsError::ProviderError(format!("Failed to serialize Speak: {e}")))?;
        self.send_control(json).await
    }

    async fn flush(&mut self) -> Result<(), TtsError> {
        let json = serde_json::to_string(&FlushMessage::default())
            .map_err(|e| TtsError::ProviderError(format!("Failed to serialize Flush: {e}")))?;
        self.send_control(json).await
    }

    async fn clear(&mut self) -> Result<(), TtsError> {
        let json = serde_json::to_string(&ClearMessage::default())
            .map_err(|e| TtsError::ProviderError(format!("Failed to serialize Clear: {e}")))?;
        self.send_control(json).await
    }

    async fn on_output(&mut self, callback: TtsOutputCallback) -> Result<(), TtsError> {
        *self.output_callback.lock().await = Some(Box::new(move |output| {
            let cb = callback.clone();
            Box::pin(async move {
                cb(output).await;
            })
        }));
        Ok(())
    }

    async fn on_error(&mut self, callback: TtsErrorCallback) -> Result<(), TtsError> {
        *self.error_callback.lock().await = Some(Box::new(move |error| {
            let cb = callback.clone();
            Box::pin(async move {
                cb(error).await;
            })
        }));
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "Deepgram Speak"
    }
}
