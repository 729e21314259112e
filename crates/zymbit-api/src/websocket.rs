//! Persistent message stream over WebSocket.
//!
//! Connects to the account's WebSocket endpoint, broadcasts every inbound
//! frame through a [`tokio::sync::broadcast`] channel and forwards lines
//! queued on the outbound sender. By default a single connection is
//! attempted; [`ReconnectConfig::with_retries`] turns on exponential
//! backoff with jitter.
//!
//! # Example
//!
//! ```rust,ignore
//! use zymbit_api::websocket::{EventStream, ReconnectConfig};
//! use zymbit_api::TlsMode;
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let url = url::Url::parse("wss://ws.zymbit.com/")?;
//! let stream = EventStream::connect(
//!     url,
//!     headers,
//!     TlsMode::Verify,
//!     ReconnectConfig::default(),
//!     cancel.clone(),
//! );
//! let mut rx = stream.subscribe();
//!
//! while let Ok(msg) = rx.recv().await {
//!     println!("{msg}");
//! }
//!
//! stream.shutdown();
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use reqwest::header::HeaderMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::TlsMode;

// ── Channel capacities ───────────────────────────────────────────────

const INBOUND_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

// ── InboundMessage ───────────────────────────────────────────────────

/// Payload of one inbound text frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
}

/// A frame received on the stream, stamped with its arrival time.
#[derive(Debug, Clone, Serialize)]
pub struct InboundMessage {
    pub received_at: DateTime<Utc>,
    pub payload: Payload,
}

impl InboundMessage {
    /// Parse a text frame: JSON when it parses, raw text otherwise.
    pub fn from_frame(text: &str) -> Self {
        let payload = serde_json::from_str(text)
            .map_or_else(|_| Payload::Text(text.to_owned()), Payload::Json);
        Self {
            received_at: Utc::now(),
            payload,
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Json(value) => write!(f, "{value}"),
            Payload::Text(text) => write!(f, "{text}"),
        }
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts after a failure. `Some(0)` means the
    /// stream gives up after the first failed connection; `None` retries
    /// forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: Some(0),
        }
    }
}

impl ReconnectConfig {
    pub fn with_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }
}

// ── EventStream ──────────────────────────────────────────────────────

/// Handle to a running message stream.
pub struct EventStream {
    inbound_rx: broadcast::Receiver<Arc<InboundMessage>>,
    outbound_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl EventStream {
    /// Spawn the connection loop and return immediately.
    ///
    /// The first connection attempt happens asynchronously; subscribe to
    /// start consuming frames. `headers` are sent on the upgrade request;
    /// `tls` applies to `wss://` URLs.
    pub fn connect(
        url: Url,
        headers: HeaderMap,
        tls: TlsMode,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (inbound_tx, inbound_rx) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            ws_loop(url, headers, tls, inbound_tx, outbound_rx, reconnect, task_cancel).await;
        });

        Self {
            inbound_rx,
            outbound_tx,
            cancel,
        }
    }

    /// Get a new receiver for inbound frames.
    ///
    /// The sender is dropped when the connection loop exits, so receivers
    /// observe [`broadcast::error::RecvError::Closed`] after a final failure.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<InboundMessage>> {
        self.inbound_rx.resubscribe()
    }

    /// Queue a text frame for sending.
    pub async fn send(&self, text: String) -> Result<(), Error> {
        self.outbound_tx
            .send(text)
            .await
            .map_err(|_| Error::WebSocketClosed {
                code: 1006,
                reason: "stream is no longer running".into(),
            })
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background connection loop ───────────────────────────────────────

/// Main loop: connect → pump frames → on error, maybe backoff → reconnect.
async fn ws_loop(
    url: Url,
    headers: HeaderMap,
    tls: TlsMode,
    inbound_tx: broadcast::Sender<Arc<InboundMessage>>,
    mut outbound_rx: mpsc::Receiver<String>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_pump(&url, &headers, tls, &inbound_tx, &mut outbound_rx, &cancel) => result,
        };

        match result {
            Ok(()) if cancel.is_cancelled() => break,
            Ok(()) => {
                tracing::info!("WebSocket disconnected cleanly");
                attempt = 0;
                if reconnect.max_retries == Some(0) {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "WebSocket error");

                if let Some(max) = reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(max_retries = max, "WebSocket giving up");
                        break;
                    }
                }

                let delay = calculate_backoff(attempt, &reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "Waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
            }
        }
    }

    tracing::debug!("WebSocket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn connect_and_pump(
    url: &Url,
    headers: &HeaderMap,
    tls: TlsMode,
    inbound_tx: &broadcast::Sender<Arc<InboundMessage>>,
    outbound_rx: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    let connector = tls.ws_connector()?;
    let (ws_stream, _response) =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!(tls = ?tls, "WebSocket connected");

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            Some(line) = outbound_rx.recv() => {
                write
                    .send(tungstenite::Message::text(line))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        // No subscribers is fine; the console may not be printing yet.
                        let _ = inbound_tx.send(Arc::new(InboundMessage::from_frame(text.as_str())));
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame received");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return Ok(());
                    }
                    // tungstenite answers pings itself; binary frames are not part of the protocol
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`, jitter within ±25%.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
