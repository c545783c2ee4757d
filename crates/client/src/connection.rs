//! Connection manager. Owns the single transport link.
//!
//! Reconnects forever with exponential backoff and jitter. Payloads are
//! passed through untouched; interpretation happens in the dispatcher.
//! `next_event` is cancel-safe, so it can sit in a `select!` next to
//! other inputs of the owning event loop.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::{SinkExt, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::{ClientError, TransportError};
use crate::transport::{Connector, FrameSink, FrameStream};

/// Something that happened on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Frame(String),
    Disconnected { reason: String, retry_in: Duration },
}

enum Phase {
    Connecting(BoxFuture<'static, Result<(FrameSink, FrameStream), TransportError>>),
    Open { sink: FrameSink, stream: FrameStream },
    Waiting { until: Instant },
    Closed,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Connecting(_) => "connecting",
            Phase::Open { .. } => "open",
            Phase::Waiting { .. } => "waiting",
            Phase::Closed => "closed",
        }
    }
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    backoff: Backoff,
    retry_count: u32,
    phase: Phase,
    /// Cleared first on teardown; nothing acts on the link afterwards
    alive: bool,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, backoff: Backoff) -> Self {
        Self {
            connector,
            backoff,
            retry_count: 0,
            phase: Phase::Closed,
            alive: true,
        }
    }

    /// Start connecting. No-op if a link is already open or pending.
    pub fn connect(&mut self) {
        if !self.alive {
            return;
        }
        if matches!(self.phase, Phase::Connecting(_) | Phase::Open { .. }) {
            return;
        }
        debug!(
            component = "connection",
            event = "connection.connecting",
            retry_count = self.retry_count,
            "Opening transport"
        );
        self.phase = Phase::Connecting(self.connector.connect());
    }

    pub fn is_open(&self) -> bool {
        self.alive && matches!(self.phase, Phase::Open { .. })
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Waiting { until } => Some(until),
            _ => None,
        }
    }

    /// Send one text frame. Fails immediately with `NotConnected` when the
    /// link is not open; nothing is queued.
    pub async fn send(&mut self, payload: String) -> Result<(), ClientError> {
        if !self.alive {
            return Err(ClientError::NotConnected);
        }
        let Phase::Open { sink, .. } = &mut self.phase else {
            return Err(ClientError::NotConnected);
        };

        match sink.send(payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    component = "connection",
                    event = "connection.send_failed",
                    error = %e,
                    "Send failed, dropping link"
                );
                self.schedule_reconnect();
                Err(ClientError::Transport(e))
            }
        }
    }

    /// Wait for the next link event. Never resolves once closed.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            if !self.alive {
                return future::pending().await;
            }

            match &mut self.phase {
                Phase::Closed => return future::pending().await,
                Phase::Connecting(connecting) => match connecting.await {
                    Ok((sink, stream)) => {
                        self.phase = Phase::Open { sink, stream };
                        info!(
                            component = "connection",
                            event = "connection.opened",
                            previous_retries = self.retry_count,
                            "Transport connected"
                        );
                        self.retry_count = 0;
                        return ConnectionEvent::Opened;
                    }
                    Err(e) => {
                        let retry_in = self.schedule_reconnect();
                        return ConnectionEvent::Disconnected {
                            reason: e.to_string(),
                            retry_in,
                        };
                    }
                },
                Phase::Waiting { until } => {
                    let until = *until;
                    tokio::time::sleep_until(until).await;
                    self.retry_count = self.retry_count.saturating_add(1);
                    debug!(
                        component = "connection",
                        event = "connection.reconnect_attempt",
                        attempt = self.retry_count,
                        "Reconnecting"
                    );
                    self.phase = Phase::Connecting(self.connector.connect());
                }
                Phase::Open { stream, .. } => match stream.next().await {
                    Some(Ok(text)) => return ConnectionEvent::Frame(text),
                    Some(Err(e)) => {
                        let retry_in = self.schedule_reconnect();
                        return ConnectionEvent::Disconnected {
                            reason: e.to_string(),
                            retry_in,
                        };
                    }
                    None => {
                        let retry_in = self.schedule_reconnect();
                        return ConnectionEvent::Disconnected {
                            reason: TransportError::Closed.to_string(),
                            retry_in,
                        };
                    }
                },
            }
        }
    }

    /// Drop the current link and arm the reconnect timer. A timer that is
    /// already armed is kept as is.
    fn schedule_reconnect(&mut self) -> Duration {
        let now = Instant::now();
        if let Phase::Waiting { until } = self.phase {
            return until.saturating_duration_since(now);
        }

        let delay = self.backoff.delay(self.retry_count);
        let previous = self.phase.name();
        self.phase = Phase::Waiting { until: now + delay };
        info!(
            component = "connection",
            event = "connection.reconnect_scheduled",
            from_phase = previous,
            retry_count = self.retry_count,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
        delay
    }

    /// Tear down: liveness off, timer cancelled, inbound detached, then
    /// the sink closed. No reconnect happens afterwards.
    pub async fn close(&mut self) {
        self.alive = false;
        let phase = std::mem::replace(&mut self.phase, Phase::Closed);
        if let Phase::Open { mut sink, stream } = phase {
            drop(stream);
            if let Err(e) = sink.close().await {
                debug!(
                    component = "connection",
                    event = "connection.close_failed",
                    error = %e,
                    "Sink close failed"
                );
            }
        }
        info!(
            component = "connection",
            event = "connection.closed",
            "Transport closed"
        );
    }
}
