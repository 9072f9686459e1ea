use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use live_voice_types::{AudioFrame, ClientMessage, Content, FunctionCall, FunctionResponse, LiveConfig, ServerMessage};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub use crate::client::config::{ClientConfig, ClientConfigBuilder};
pub use crate::client::consts::DEFAULT_MODEL;
pub use crate::client::stats::Stats;

mod config;
pub(crate) mod consts;
mod demux;
mod stats;
mod utils;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

type ClientTx = mpsc::Sender<Outbound>;
type ServerTx = broadcast::Sender<SessionEvent>;
pub type ServerRx = broadcast::Receiver<SessionEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Disconnected,
    Connecting,
    Connected,
}

/// Everything a session reports to its subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Open,
    Close(Option<String>),
    Error(String),
    SetupComplete,
    ToolCall(Vec<FunctionCall>),
    ToolCallCancellation(Vec<String>),
    /// Non-audio parts of a model turn, reassembled.
    Content(Content),
    Audio(AudioFrame),
    Interrupted,
    TurnComplete,
    InputTranscription(String),
    OutputTranscription(String),
    GoAway(Option<String>),
}

#[derive(Debug, thiserror::Error)]
enum SessionError {
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to serialize setup: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("timed out after {0:?} waiting for the handshake")]
    Timeout(Duration),
}

enum Outbound {
    Message(ClientMessage),
    Close,
}

struct Connection {
    c_tx: ClientTx,
    send_handle: tokio::task::JoinHandle<()>,
    recv_handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    fn abort(&self) {
        self.send_handle.abort();
        self.recv_handle.abort();
    }
}

struct State {
    status: Status,
    generation: u64,
    connection: Option<Connection>,
}

struct Shared {
    config: ClientConfig,
    state: Arc<Mutex<State>>,
    s_tx: ServerTx,
    stats: Arc<Mutex<Stats>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(connection) = lock(&self.state).connection.take() {
            connection.abort();
        }
    }
}

/// A duplex session with the live service.
///
/// Cloning is cheap and every clone drives the same underlying connection.
/// At most one transport is open at a time, and the session can be connected
/// again after it has been disconnected.
#[derive(Clone)]
pub struct LiveSession {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Puts a `Connecting` session back to `Disconnected` if the connect future
/// is dropped before it finishes.
struct ConnectAttempt {
    state: Arc<Mutex<State>>,
    generation: u64,
    settled: bool,
}

impl ConnectAttempt {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for ConnectAttempt {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = lock(&self.state);
        if state.generation == self.generation && state.status == Status::Connecting {
            tracing::warn!("connect cancelled before the handshake finished");
            state.status = Status::Disconnected;
        }
    }
}

impl LiveSession {
    pub fn new(config: ClientConfig) -> Self {
        let (s_tx, _) = broadcast::channel(config.capacity());
        Self {
            shared: Arc::new(Shared {
                config,
                state: Arc::new(Mutex::new(State {
                    status: Status::Disconnected,
                    generation: 0,
                    connection: None,
                })),
                s_tx,
                stats: Arc::new(Mutex::new(Stats::new())),
            }),
        }
    }

    pub fn status(&self) -> Status {
        lock(&self.shared.state).status
    }

    pub fn subscribe(&self) -> ServerRx {
        self.shared.s_tx.subscribe()
    }

    pub fn stats(&self) -> Stats {
        lock(&self.shared.stats).clone()
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.shared.s_tx.send(event);
    }

    /// Opens the transport and sends the setup message for `model_id`.
    ///
    /// Returns `false` without touching the network when `config` is empty or
    /// when a connection is already open or being opened. A failed handshake
    /// reverts to [`Status::Disconnected`] and emits one [`SessionEvent::Error`].
    /// Dropping the future mid-handshake also reverts to `Disconnected`.
    pub async fn connect(&self, model_id: &str, config: &LiveConfig) -> bool {
        if config.is_empty() {
            tracing::warn!("refusing to connect with an empty session config");
            return false;
        }

        let generation = {
            let mut state = lock(&self.shared.state);
            if state.status != Status::Disconnected {
                tracing::debug!("connect ignored, session is {:?}", state.status);
                return false;
            }
            state.status = Status::Connecting;
            state.generation += 1;
            state.generation
        };

        let attempt = ConnectAttempt {
            state: Arc::clone(&self.shared.state),
            generation,
            settled: false,
        };

        tracing::info!("connecting to live service, model={}", model_id);
        let opened = self.open(generation, model_id, config).await;
        attempt.settle();

        let mut state = lock(&self.shared.state);
        match opened {
            Ok((connection, ready_tx)) => {
                state.status = Status::Connected;
                state.connection = Some(connection);
                drop(state);
                self.emit(SessionEvent::Open);
                // the reader only starts once `Open` is out
                let _ = ready_tx.send(());
                true
            }
            Err(e) => {
                if state.generation == generation {
                    state.status = Status::Disconnected;
                }
                drop(state);
                tracing::error!("failed to connect: {}", e);
                self.emit(SessionEvent::Error(e.to_string()));
                false
            }
        }
    }

    async fn open(
        &self,
        generation: u64,
        model_id: &str,
        config: &LiveConfig,
    ) -> Result<(Connection, oneshot::Sender<()>), SessionError> {
        let request = utils::build_request(&self.shared.config)?;
        let timeout = self.shared.config.connect_timeout();
        let (ws_stream, _) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| SessionError::Timeout(timeout))??;

        let (mut write, read) = ws_stream.split();

        let setup = serde_json::to_string(&ClientMessage::Setup(config.to_setup(model_id)))?;
        write.send(Message::Text(setup)).await?;

        let (c_tx, c_rx) = mpsc::channel(self.shared.config.capacity());
        let (ready_tx, ready_rx) = oneshot::channel();

        let send_handle = tokio::spawn(send_loop(write, c_rx));
        let recv_handle = tokio::spawn(recv_loop(
            read,
            ready_rx,
            generation,
            Arc::clone(&self.shared.state),
            self.shared.s_tx.clone(),
            Arc::clone(&self.shared.stats),
        ));

        Ok((
            Connection {
                c_tx,
                send_handle,
                recv_handle,
            },
            ready_tx,
        ))
    }

    /// Closes the transport. Does nothing when no transport is open.
    pub async fn disconnect(&self) {
        let connection = {
            let mut state = lock(&self.shared.state);
            match state.connection.take() {
                Some(connection) => {
                    state.status = Status::Disconnected;
                    connection
                }
                None => {
                    tracing::debug!("disconnect ignored, no active transport");
                    return;
                }
            }
        };

        connection.recv_handle.abort();
        if connection.c_tx.try_send(Outbound::Close).is_ok() {
            let grace = Duration::from_millis(consts::CLOSE_TIMEOUT_MS);
            if tokio::time::timeout(grace, connection.send_handle).await.is_err() {
                tracing::warn!("close frame not flushed within {:?}", grace);
            }
        } else {
            connection.send_handle.abort();
        }

        tracing::info!("disconnected from live service");
        self.emit(SessionEvent::Close(Some("client disconnect".to_string())));
    }

    fn outbound(&self) -> Option<ClientTx> {
        let state = lock(&self.shared.state);
        match (state.status, state.connection.as_ref()) {
            (Status::Connected, Some(connection)) => Some(connection.c_tx.clone()),
            _ => None,
        }
    }

    fn queue(&self, c_tx: &ClientTx, message: ClientMessage) -> bool {
        match c_tx.try_send(Outbound::Message(message)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("failed to queue outbound message: {}", e);
                false
            }
        }
    }

    /// Forwards `frames` in order. Silently drops them when not connected.
    pub fn send_audio(&self, frames: &[AudioFrame]) {
        let Some(c_tx) = self.outbound() else {
            tracing::debug!("dropping {} audio frame(s), not connected", frames.len());
            return;
        };
        for frame in frames {
            self.queue(&c_tx, ClientMessage::audio(frame));
        }
    }

    /// Tells the service that the microphone stream has ended.
    pub fn send_audio_stream_end(&self) {
        if let Some(c_tx) = self.outbound() {
            self.queue(&c_tx, ClientMessage::audio_stream_end());
        }
    }

    /// Sends every response of a tool call batch as one message.
    pub fn send_tool_response(&self, responses: Vec<FunctionResponse>) {
        if responses.is_empty() {
            return;
        }
        let Some(c_tx) = self.outbound() else {
            tracing::warn!("dropping {} tool response(s), not connected", responses.len());
            return;
        };
        tracing::debug!("sending {} tool response(s)", responses.len());
        self.queue(&c_tx, ClientMessage::tool_response(responses));
    }

    pub fn send_content(&self, turns: Vec<Content>, turn_complete: bool) {
        let Some(c_tx) = self.outbound() else {
            tracing::debug!("dropping client content, not connected");
            return;
        };
        self.queue(&c_tx, ClientMessage::content(turns, turn_complete));
    }
}

async fn send_loop(mut write: WsWriter, mut c_rx: mpsc::Receiver<Outbound>) {
    while let Some(outbound) = c_rx.recv().await {
        match outbound {
            Outbound::Message(message) => match serde_json::to_string(&message) {
                Ok(text) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        tracing::error!("failed to send message: {}", e);
                    }
                }
                Err(e) => {
                    tracing::error!("failed to serialize message: {}", e);
                }
            },
            Outbound::Close => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!("failed to send close frame: {}", e);
                }
                let _ = write.close().await;
                break;
            }
        }
    }
}

async fn recv_loop(
    mut read: WsReader,
    ready_rx: oneshot::Receiver<()>,
    generation: u64,
    state: Arc<Mutex<State>>,
    s_tx: ServerTx,
    stats: Arc<Mutex<Stats>>,
) {
    if ready_rx.await.is_err() {
        return;
    }

    let mut reason = None;
    while let Some(message) = read.next().await {
        let message = match message {
            Err(e) => {
                tracing::error!("failed to read message: {}", e);
                let _ = s_tx.send(SessionEvent::Error(e.to_string()));
                reason = Some(e.to_string());
                break;
            }
            Ok(message) => message,
        };
        match message {
            Message::Text(text) => dispatch(&text, &s_tx, &stats),
            // the service may deliver JSON in binary frames
            Message::Binary(bin) => match std::str::from_utf8(&bin) {
                Ok(text) if text.trim_start().starts_with('{') => dispatch(text, &s_tx, &stats),
                _ => tracing::warn!("unexpected binary message ({} bytes)", bin.len()),
            },
            Message::Close(frame) => {
                tracing::info!("connection closed: {:?}", frame);
                reason = frame.map(|f| f.reason.to_string());
                break;
            }
            _ => {}
        }
    }

    let connection = {
        let mut state = lock(&state);
        if state.generation != generation || state.status == Status::Disconnected {
            return;
        }
        state.status = Status::Disconnected;
        state.connection.take()
    };
    if let Some(connection) = connection {
        connection.send_handle.abort();
    }
    let _ = s_tx.send(SessionEvent::Close(reason));
}

fn dispatch(text: &str, s_tx: &ServerTx, stats: &Mutex<Stats>) {
    let message = match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::error!("failed to deserialize server message: {}, text=> {:?}", e, text);
            return;
        }
    };

    if let Some(usage) = message.usage_metadata.as_ref() {
        lock(stats).update_usage(usage);
        tracing::debug!("usage: total_tokens={}", usage.total_token_count);
    }

    let events = demux::demux(message);
    if events.is_empty() {
        tracing::debug!("unrecognized server message dropped: {}", text);
    }
    for event in events {
        let _ = s_tx.send(event);
    }
}
