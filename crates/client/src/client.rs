//! Client actor and its handle.
//!
//! One tokio task owns the connection and all chat state and processes
//! inputs one at a time: handle commands, link events and the fragment
//! flush deadline. External callers hold a `ChatClient`, which sends
//! `ClientCommand`s over an mpsc channel. Reads go through `ArcSwap`.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chatstream_protocol::{ChatTurn, ClientFrame};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::command::{ChatRequest, ClientCommand};
use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::error::ClientError;
use crate::fragment_buffer::FragmentBuffer;
use crate::state::{ChatSnapshot, ChatState, ClientEvent, Effect};
use crate::transport::{Connector, WebSocketConnector};

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Handle to a running client actor (cheap to clone).
///
/// The actor exits, closing the link, on `shutdown()` or when the last
/// handle is dropped.
#[derive(Clone)]
pub struct ChatClient {
    command_tx: mpsc::Sender<ClientCommand>,
    snapshot: Arc<ArcSwap<ChatSnapshot>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ChatClient {
    /// Spawn a client speaking WebSocket to `config.url`. Must be called
    /// from within a tokio runtime.
    pub fn connect(config: &ClientConfig) -> Self {
        let connector = config
            .headers
            .iter()
            .fold(WebSocketConnector::new(&config.url), |connector, (name, value)| {
                connector.with_header(name, value)
            });
        Self::with_connector(config, Arc::new(connector))
    }

    /// Spawn a client over any transport.
    pub fn with_connector(config: &ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let state = ChatState::new(
            config.session_id.clone(),
            FragmentBuffer::new(config.flush_interval()),
        );
        let snapshot = Arc::new(ArcSwap::from_pointee(state.snapshot()));
        let connection =
            ConnectionManager::new(connector, Backoff::from_config(&config.reconnect));

        let actor = ClientActor {
            state,
            connection,
            default_mode: config.mode.clone(),
            snapshot: snapshot.clone(),
            events: events.clone(),
        };
        tokio::spawn(actor.run(command_rx));

        Self {
            command_tx,
            snapshot,
            events,
        }
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<ChatSnapshot> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ClientCommand,
    ) -> Result<T, ClientError> {
        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| ClientError::Shutdown)?;
        reply_rx.await.map_err(|_| ClientError::Shutdown)
    }

    /// Send a chat turn. Fails with `NotConnected` while the link is down.
    pub async fn send_message(&self, request: ChatRequest) -> Result<(), ClientError> {
        self.request(|reply| ClientCommand::SendMessage { request, reply })
            .await?
    }

    /// Ask the backend to stop the current generation.
    pub async fn stop(&self) -> Result<(), ClientError> {
        self.request(|reply| ClientCommand::Stop { reply }).await?
    }

    pub async fn request_stats(&self) -> Result<(), ClientError> {
        self.request(|reply| ClientCommand::RequestStats { reply })
            .await?
    }

    /// Switch the active session. The transcript is cleared before this
    /// returns; history arrives later. Works while disconnected.
    pub async fn set_current_session_id(
        &self,
        session_id: impl Into<String>,
    ) -> Result<(), ClientError> {
        let session_id = session_id.into();
        self.request(|reply| ClientCommand::SetSession { session_id, reply })
            .await
    }

    /// Answer a tool-confirmation request. With `approved && remember`,
    /// later requests for the same tool are approved automatically.
    pub async fn handle_tool_confirmation(
        &self,
        request_id: impl Into<String>,
        approved: bool,
        remember: bool,
    ) -> Result<(), ClientError> {
        let request_id = request_id.into();
        self.request(|reply| ClientCommand::ToolConfirmation {
            request_id,
            approved,
            remember,
            reply,
        })
        .await?
    }

    /// Close the link and stop the actor. Buffered text is flushed into
    /// the final snapshot. Calling this again is a no-op.
    pub async fn shutdown(&self) {
        if self
            .request(|reply| ClientCommand::Shutdown { reply })
            .await
            .is_err()
        {
            debug!(
                component = "client",
                event = "client.shutdown_repeat",
                "Client already shut down"
            );
        }
    }
}

enum Input {
    Command(Option<ClientCommand>),
    Link(ConnectionEvent),
    FlushDue,
}

struct ClientActor {
    state: ChatState,
    connection: ConnectionManager,
    default_mode: String,
    snapshot: Arc<ArcSwap<ChatSnapshot>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ClientActor {
    async fn run(mut self, mut command_rx: mpsc::Receiver<ClientCommand>) {
        info!(
            component = "client",
            event = "client.started",
            session_id = %self.state.session_id(),
            "Client actor started"
        );
        self.connection.connect();

        loop {
            let flush_at = self.state.flush_deadline();
            let input = tokio::select! {
                cmd = command_rx.recv() => Input::Command(cmd),
                event = self.connection.next_event() => Input::Link(event),
                () = sleep_until_deadline(flush_at), if flush_at.is_some() => Input::FlushDue,
            };

            match input {
                Input::Command(Some(ClientCommand::Shutdown { reply })) => {
                    self.teardown().await;
                    let _ = reply.send(());
                    return;
                }
                Input::Command(Some(cmd)) => self.handle_command(cmd).await,
                Input::Command(None) => {
                    debug!(
                        component = "client",
                        event = "client.handles_dropped",
                        "All handles dropped"
                    );
                    self.teardown().await;
                    return;
                }
                Input::Link(event) => self.handle_link_event(event).await,
                Input::FlushDue => self.state.flush_due(Instant::now()),
            }

            self.publish();
        }
    }

    /// Replies go out after the resulting snapshot is published, so a
    /// caller that awaited a command always reads its effect.
    async fn handle_command(&mut self, cmd: ClientCommand) {
        debug!(
            component = "client",
            event = "client.command",
            command = cmd.name(),
            "Handling command"
        );
        match cmd {
            ClientCommand::SendMessage { request, reply } => {
                let result = self.send_chat_turn(request).await;
                self.publish();
                let _ = reply.send(result);
            }
            ClientCommand::Stop { reply } => {
                let result = self.send_frame(&ClientFrame::stop()).await;
                self.publish();
                let _ = reply.send(result);
            }
            ClientCommand::RequestStats { reply } => {
                let result = self.send_frame(&ClientFrame::get_stats()).await;
                self.publish();
                let _ = reply.send(result);
            }
            ClientCommand::SetSession { session_id, reply } => {
                let effects = self
                    .state
                    .switch_session(session_id, self.connection.is_open());
                self.apply_effects(effects).await;
                self.publish();
                let _ = reply.send(());
            }
            ClientCommand::ToolConfirmation {
                request_id,
                approved,
                remember,
                reply,
            } => {
                let frame = ClientFrame::tool_confirmation_response(request_id.clone(), approved);
                let result = self.send_frame(&frame).await;
                if result.is_ok() {
                    self.state
                        .resolve_confirmation(&request_id, approved, remember);
                }
                self.publish();
                let _ = reply.send(result);
            }
            // Handled by the run loop
            ClientCommand::Shutdown { .. } => {}
        }
    }

    async fn send_chat_turn(&mut self, request: ChatRequest) -> Result<(), ClientError> {
        if !self.connection.is_open() {
            return Err(ClientError::NotConnected);
        }
        let ChatRequest {
            message,
            mode,
            attachments,
            skip_web_search,
        } = request;
        let frame = ClientFrame::Chat(ChatTurn {
            message: message.clone(),
            mode: mode.unwrap_or_else(|| self.default_mode.clone()),
            attachments,
            skip_web_search,
            session_id: self.state.session_id().to_string(),
        });
        self.send_frame(&frame).await?;
        self.state.record_user_turn(message);
        Ok(())
    }

    async fn send_frame(&mut self, frame: &ClientFrame) -> Result<(), ClientError> {
        let payload = frame.to_json()?;
        let was_open = self.connection.is_open();
        let result = self.connection.send(payload).await;
        if was_open && !self.connection.is_open() {
            self.state.on_disconnect();
        }
        result
    }

    async fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(frame) => {
                    if let Err(e) = self.send_frame(&frame).await {
                        warn!(
                            component = "client",
                            event = "client.effect_send_failed",
                            error = %e,
                            "Failed to send frame"
                        );
                    }
                }
                Effect::Notify(event) => {
                    // No subscribers is fine
                    let _ = self.events.send(event);
                }
            }
        }
    }

    async fn handle_link_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                let effects = self.state.on_open();
                self.apply_effects(effects).await;
            }
            ConnectionEvent::Frame(text) => {
                let effects = self.state.receive(&text, Instant::now());
                self.apply_effects(effects).await;
            }
            ConnectionEvent::Disconnected { reason, retry_in } => {
                warn!(
                    component = "client",
                    event = "client.disconnected",
                    reason = %reason,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "Connection lost"
                );
                self.state.on_disconnect();
            }
        }
    }

    /// Store and announce a new snapshot if anything visible changed.
    fn publish(&mut self) {
        if let Some(snapshot) = self.state.take_changes() {
            let revision = snapshot.revision;
            self.snapshot.store(Arc::new(snapshot));
            let _ = self.events.send(ClientEvent::StateChanged { revision });
        }
    }

    async fn teardown(&mut self) {
        self.connection.close().await;
        self.state.teardown();
        self.publish();
        info!(
            component = "client",
            event = "client.stopped",
            revision = self.state.revision(),
            "Client actor stopped"
        );
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
