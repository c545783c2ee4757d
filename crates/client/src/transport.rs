//! Transport seam.
//!
//! The connection manager only sees a [`Connector`] that yields a text
//! sink and a text stream. `WebSocketConnector` is the production
//! implementation; `MemoryConnector` is an in-process fake.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::channel::mpsc as fmpsc;
use futures::future::{self, BoxFuture};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;

use crate::error::TransportError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Something that can open a bidirectional text-frame connection.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'static, Result<(FrameSink, FrameStream), TransportError>>;
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    headers: Vec<(String, String)>,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header sent with every handshake.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'static, Result<(FrameSink, FrameStream), TransportError>> {
        let url = self.url.clone();
        let headers = self.headers.clone();

        Box::pin(async move {
            let mut request = url
                .as_str()
                .into_client_request()
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            for (name, value) in &headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| TransportError::Connect(format!("invalid header name: {e}")))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| TransportError::Connect(format!("invalid header value: {e}")))?;
                request.headers_mut().insert(name, value);
            }

            let (ws, _response) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            debug!(
                component = "transport",
                event = "transport.ws.connected",
                url = %url,
                "WebSocket handshake complete"
            );

            let (ws_tx, ws_rx) = ws.split();
            let sink = ws_tx
                .sink_map_err(|e| TransportError::WebSocket(e.to_string()))
                .with(|text: String| {
                    future::ready(Ok::<_, TransportError>(WsMessage::Text(text.into())))
                });
            let stream = ws_rx
                .take_while(|item| future::ready(!matches!(item, Ok(WsMessage::Close(_)))))
                .filter_map(|item| {
                    future::ready(match item {
                        Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
                        // Binary, ping and pong frames carry no chat payload
                        Ok(_) => None,
                        Err(e) => Some(Err(TransportError::WebSocket(e.to_string()))),
                    })
                });

            Ok((Box::pin(sink) as FrameSink, Box::pin(stream) as FrameStream))
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Fake connector. Each successful `connect()` hands the peer side of the
/// new link to whoever holds the matching [`MemoryLinks`].
#[derive(Clone)]
pub struct MemoryConnector {
    links_tx: mpsc::UnboundedSender<MemoryLink>,
    failures: Arc<AtomicUsize>,
}

/// Receiving end for links opened by a [`MemoryConnector`].
pub struct MemoryLinks {
    links_rx: mpsc::UnboundedReceiver<MemoryLink>,
}

/// Peer side of one in-memory connection.
pub struct MemoryLink {
    inbound: fmpsc::UnboundedSender<Result<String, TransportError>>,
    outbound: fmpsc::UnboundedReceiver<String>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryLinks) {
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        (
            Self {
                links_tx,
                failures: Arc::new(AtomicUsize::new(0)),
            },
            MemoryLinks { links_rx },
        )
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> BoxFuture<'static, Result<(FrameSink, FrameStream), TransportError>> {
        let scripted_failure = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure {
            return Box::pin(future::ready(Err(TransportError::Connect(
                "scripted failure".to_string(),
            ))));
        }

        let (in_tx, in_rx) = fmpsc::unbounded();
        let (out_tx, out_rx) = fmpsc::unbounded();
        let link = MemoryLink {
            inbound: in_tx,
            outbound: out_rx,
        };
        if self.links_tx.send(link).is_err() {
            return Box::pin(future::ready(Err(TransportError::Connect(
                "memory peer dropped".to_string(),
            ))));
        }

        let sink = out_tx.sink_map_err(|_| TransportError::Closed);
        Box::pin(future::ready(Ok((
            Box::pin(sink) as FrameSink,
            Box::pin(in_rx) as FrameStream,
        ))))
    }
}

impl MemoryLinks {
    /// Wait for the next connection the client opens.
    pub async fn next(&mut self) -> Option<MemoryLink> {
        self.links_rx.recv().await
    }
}

impl MemoryLink {
    /// Deliver a text frame to the client. Returns false if the client
    /// side of this link is gone.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.inbound.unbounded_send(Ok(text.into())).is_ok()
    }

    pub fn push_json(&self, value: &serde_json::Value) -> bool {
        self.push(value.to_string())
    }

    /// Deliver a transport error to the client.
    pub fn fail(&self, error: TransportError) -> bool {
        self.inbound.unbounded_send(Err(error)).is_ok()
    }

    /// End the inbound stream, as if the server closed the socket.
    pub fn close(&self) {
        self.inbound.close_channel();
    }

    /// Next frame the client sent, waiting if none is queued yet.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.outbound.next().await
    }

    /// Next frame the client sent, parsed as JSON.
    pub async fn next_sent_json(&mut self) -> Option<serde_json::Value> {
        let text = self.next_sent().await?;
        serde_json::from_str(&text).ok()
    }

    /// Frames already sent, without waiting.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut sent = Vec::new();
        while let Ok(Some(text)) = self.outbound.try_next() {
            sent.push(text);
        }
        sent
    }
}
