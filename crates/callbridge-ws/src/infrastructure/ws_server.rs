//! WebSocket session with one page.
//!
//! This module is responsible for:
//!
//! 1. Accepting a TCP connection on an already bound listener.
//! 2. Upgrading it to a WebSocket session.
//! 3. Waiting (bounded by `hello_timeout`) for the page's `Hello`.
//! 4. Building a [`PageHost`] and a [`BridgeContext`] on top of it.
//! 5. Running two tasks for the rest of the session:
//!    - **Writer**: drains the host's outbound channel into JSON text frames.
//!    - **Reader**: parses page frames, completes operations, routes resource
//!      events, and forwards trusted events and wake signals to the context.
//!
//! When the page goes away the reader fails every operation still in flight,
//! so no native caller is left suspended.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use callbridge_core::HostCapabilities;
use callbridge_runtime::{BridgeConfig, BridgeContext, MainThreadProxy};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::PageError;
use crate::domain::config::ServeConfig;
use crate::domain::messages::{BridgeToPage, PageToBridge};
use crate::infrastructure::page_host::{PageEvent, PageHost};

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

// ── Public API ────────────────────────────────────────────────────────────────

/// A connected page and the bridge context it hosts.
pub struct PageSession {
    /// Address the page connected from.
    pub peer: SocketAddr,
    /// The host driving the page.
    pub host: Arc<PageHost>,
    /// Context whose entry points run on this page.
    pub context: Arc<BridgeContext>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PageSession {
    /// Waits until the page disconnects.
    pub async fn closed(self) {
        if let Err(e) = self.reader.await {
            error!("page {}: reader task failed: {e}", self.peer);
        }
        self.writer.abort();
    }

    /// Ends the session without waiting for the page.
    pub fn shutdown(self) {
        self.reader.abort();
        self.writer.abort();
        self.host.disconnect();
    }
}

/// Accepts the next page on `listener` and sets up a bridge context for it.
///
/// `proxy` must be supplied when `bridge.bridge.strategy` is blocking-proxy;
/// the caller keeps the matching pump running.
///
/// # Errors
///
/// Fails if the accept or the WebSocket handshake fails, or if the page does
/// not open with a valid `Hello` within `serve.hello_timeout`.
pub async fn accept_page(
    listener: &TcpListener,
    serve: &ServeConfig,
    bridge: BridgeConfig,
    proxy: Option<MainThreadProxy>,
) -> anyhow::Result<PageSession> {
    let (stream, peer) = listener
        .accept()
        .await
        .context("failed to accept page connection")?;
    info!("page connection from {peer}");

    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer}"))?;
    let (ws_tx, mut ws_rx) = ws_stream.split();

    let capabilities = timeout(serve.hello_timeout, read_hello(&mut ws_rx))
        .await
        .map_err(|_| PageError::HelloTimeout)
        .and_then(|hello| hello)
        .with_context(|| format!("page {peer} did not introduce itself"))?;
    info!("page {peer} ready with {} capabilities", capabilities.0.len());

    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let host = Arc::new(PageHost::new(capabilities, outbound));
    let mut builder = BridgeContext::builder(host.clone()).config(bridge);
    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy);
    }
    let context = Arc::new(builder.build());

    let writer = tokio::spawn(write_page_frames(ws_tx, outbound_rx, peer));
    let reader = tokio::spawn({
        let host = Arc::clone(&host);
        let context = Arc::clone(&context);
        async move {
            read_page_frames(ws_rx, &host, &context, peer).await;
            host.disconnect();
        }
    });

    Ok(PageSession {
        peer,
        host,
        context,
        reader,
        writer,
    })
}

// ── Session tasks ─────────────────────────────────────────────────────────────

/// Reads frames until the first real message, which must be `Hello`.
async fn read_hello(ws_rx: &mut WsSource) -> Result<HostCapabilities, PageError> {
    loop {
        let frame = match ws_rx.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                debug!("WebSocket error before Hello: {e}");
                return Err(PageError::Disconnected);
            }
            None => return Err(PageError::Disconnected),
        };
        match frame {
            WsMessage::Text(json) => {
                return match serde_json::from_str::<PageToBridge>(&json)? {
                    PageToBridge::Hello { capabilities } => Ok(capabilities.into_iter().collect()),
                    other => Err(PageError::UnexpectedFirstMessage(other.type_name())),
                };
            }
            WsMessage::Close(_) => return Err(PageError::Disconnected),
            _ => continue,
        }
    }
}

async fn write_page_frames(
    mut ws_tx: WsSink,
    mut outbound: mpsc::UnboundedReceiver<BridgeToPage>,
    peer: SocketAddr,
) {
    while let Some(msg) = outbound.recv().await {
        debug!("page {peer}: bridge → page: {}", msg.type_name());
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                error!("page {peer}: JSON serialization error: {e}");
                continue;
            }
        };
        if ws_tx.send(WsMessage::Text(json)).await.is_err() {
            debug!("page {peer}: WebSocket send failed (page disconnected)");
            break;
        }
    }
    let _ = ws_tx.close().await;
}

async fn read_page_frames(
    mut ws_rx: WsSource,
    host: &PageHost,
    context: &BridgeContext,
    peer: SocketAddr,
) {
    loop {
        let frame = match ws_rx.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!("page {peer}: WebSocket closed");
                break;
            }
            Some(Err(e)) => {
                warn!("page {peer}: WebSocket error: {e}");
                break;
            }
            None => {
                debug!("page {peer}: stream ended");
                break;
            }
        };

        match frame {
            WsMessage::Text(json) => {
                let msg: PageToBridge = match serde_json::from_str(&json) {
                    Ok(msg) => msg,
                    Err(e) => {
                        // One bad frame does not end the session.
                        warn!("page {peer}: invalid JSON: {e}");
                        continue;
                    }
                };
                debug!("page {peer}: page → bridge: {}", msg.type_name());
                match host.handle_page_message(msg) {
                    Some(PageEvent::Trusted(kind)) => {
                        context.on_trusted_event(kind);
                    }
                    Some(PageEvent::Wake(code)) => {
                        if !context.wake(code) {
                            debug!("page {peer}: wake {code} with nobody waiting");
                        }
                    }
                    None => {}
                }
            }
            WsMessage::Binary(_) => {
                warn!("page {peer}: unexpected binary frame (ignored)");
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            WsMessage::Close(_) => {
                debug!("page {peer}: Close frame received");
                break;
            }
        }
    }
    info!("page {peer} disconnected");
}
