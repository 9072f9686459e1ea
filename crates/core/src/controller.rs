use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use live_voice::{LiveSession, SessionEvent, Status};
use live_voice_types::{AudioFrame, FunctionCall, LiveConfig};
use live_voice_utils::recorder::{CaptureError, CaptureSource};
use live_voice_utils::streamer::PlayerHandle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::dispatcher::CommandDispatcher;

/// Message carried by [`AgentState::Error`] when listening cannot start or is cut off.
pub const LISTENING_FAILED: &str = "listening failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Connecting,
    Listening,
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("audio capture is not available")]
    CaptureUnavailable,
    #[error("listening failed: {0}")]
    ListeningFailed(String),
}

impl From<CaptureError> for ControllerError {
    fn from(e: CaptureError) -> Self {
        ControllerError::ListeningFailed(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub model_id: String,
    pub config: LiveConfig,
    /// Status polls after `connect` before giving up.
    pub connect_attempts: u32,
    pub connect_poll: Duration,
}

impl ControllerOptions {
    pub fn new(model_id: &str, config: LiveConfig) -> Self {
        Self {
            model_id: model_id.to_string(),
            config,
            connect_attempts: 20,
            connect_poll: Duration::from_millis(100),
        }
    }
}

/// What was said in the current (or last finished) turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub input: String,
    pub output: String,
    complete: bool,
}

impl Transcript {
    fn reopen(&mut self) {
        if self.complete {
            self.input.clear();
            self.output.clear();
            self.complete = false;
        }
    }

    fn push_input(&mut self, text: &str) {
        self.reopen();
        self.input.push_str(text);
    }

    fn push_output(&mut self, text: &str) {
        self.reopen();
        self.output.push_str(text);
    }

    fn finish(&mut self) {
        self.complete = true;
    }
}

/// Decides when the persisted auto-start flag should trigger listening.
///
/// Fires once per transition to enabled, so a failed attempt is not retried
/// until the flag is turned off and on again.
#[derive(Debug, Default)]
pub struct AutoStart {
    enabled: bool,
}

impl AutoStart {
    pub fn observe(&mut self, enabled: bool) -> bool {
        let fire = enabled && !self.enabled;
        self.enabled = enabled;
        fire
    }
}

#[derive(Default)]
struct Turn {
    text: String,
    tool_called: bool,
}

/// Work handed from the event loop to the command worker.
enum CommandJob {
    ToolCalls(Vec<FunctionCall>),
    Text(String),
}

/// Ties a live session, microphone capture, playback and the command
/// dispatcher together.
pub struct VoiceAgentController {
    session: LiveSession,
    capture: Arc<dyn CaptureSource>,
    dispatcher: Arc<CommandDispatcher>,
    player: PlayerHandle,
    options: ControllerOptions,
    state_tx: watch::Sender<AgentState>,
    // held across start and stop so they never interleave
    forward: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    transcript: Mutex<Transcript>,
}

impl VoiceAgentController {
    pub fn new(
        session: LiveSession,
        capture: Arc<dyn CaptureSource>,
        dispatcher: Arc<CommandDispatcher>,
        player: PlayerHandle,
        options: ControllerOptions,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(AgentState::Idle);
        Arc::new(Self {
            session,
            capture,
            dispatcher,
            player,
            options,
            state_tx,
            forward: tokio::sync::Mutex::new(None),
            transcript: Mutex::new(Transcript::default()),
        })
    }

    pub fn state(&self) -> AgentState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AgentState> {
        self.state_tx.subscribe()
    }

    pub fn is_listening(&self) -> bool {
        self.state() == AgentState::Listening
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn session(&self) -> &LiveSession {
        &self.session
    }

    fn set_state(&self, state: AgentState) {
        tracing::debug!("agent state -> {:?}", state);
        self.state_tx.send_replace(state);
    }

    fn fail(&self, error: ControllerError) -> ControllerError {
        tracing::error!("{}", error);
        self.set_state(AgentState::Error(LISTENING_FAILED.to_string()));
        error
    }

    /// Connects if needed, then starts the microphone and streams it to the session.
    pub async fn start_listening(&self) -> Result<(), ControllerError> {
        let mut forward = self.forward.lock().await;
        if forward.is_some() {
            return Ok(());
        }
        if !self.capture.is_supported() {
            return Err(self.fail(ControllerError::CaptureUnavailable));
        }

        self.set_state(AgentState::Connecting);
        if let Err(e) = self.ensure_connected().await {
            return Err(self.fail(e));
        }

        let capture = Arc::clone(&self.capture);
        let frames = match tokio::task::spawn_blocking(move || capture.start()).await {
            Ok(Ok(frames)) => frames,
            Ok(Err(e)) => return Err(self.fail(e.into())),
            Err(e) => return Err(self.fail(ControllerError::ListeningFailed(e.to_string()))),
        };

        *forward = Some(tokio::spawn(forward_frames(self.session.clone(), frames)));
        self.set_state(AgentState::Listening);
        tracing::info!("listening");
        Ok(())
    }

    /// Waits at most `connect_attempts` polls in total, handshake included.
    async fn ensure_connected(&self) -> Result<(), ControllerError> {
        let budget = self.options.connect_poll * self.options.connect_attempts;
        let deadline = tokio::time::Instant::now() + budget;
        if self.session.status() == Status::Disconnected {
            let connect = self.session.connect(&self.options.model_id, &self.options.config);
            if tokio::time::timeout(budget, connect).await.is_err() {
                tracing::warn!("connect did not finish within {:?}", budget);
            }
        }
        loop {
            if self.session.status() == Status::Connected {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.options.connect_poll).await;
        }
        Err(ControllerError::ListeningFailed("session did not connect".to_string()))
    }

    /// Stops the microphone. The session stays open.
    pub async fn stop_listening(&self) {
        let mut forward = self.forward.lock().await;
        let was_listening = self.stop_capture(&mut forward).await;
        if was_listening {
            self.session.send_audio_stream_end();
        }
        *self.transcript.lock().unwrap_or_else(PoisonError::into_inner) = Transcript::default();
        self.set_state(AgentState::Idle);
    }

    async fn stop_capture(&self, forward: &mut Option<JoinHandle<()>>) -> bool {
        let Some(handle) = forward.take() else {
            return false;
        };
        let capture = Arc::clone(&self.capture);
        if tokio::task::spawn_blocking(move || capture.stop()).await.is_err() {
            tracing::warn!("capture stop panicked");
        }
        handle.abort();
        tracing::info!("stopped listening");
        true
    }

    /// Returns whether the agent is listening afterwards.
    pub async fn toggle_listening(&self) -> Result<bool, ControllerError> {
        if self.forward.lock().await.is_some() {
            self.stop_listening().await;
            Ok(false)
        } else {
            self.start_listening().await.map(|_| true)
        }
    }

    pub async fn shutdown(&self) {
        self.stop_listening().await;
        self.session.disconnect().await;
    }

    /// Routes session events until the session is dropped.
    ///
    /// Commands run on a separate worker, one job at a time in arrival
    /// order, so a slow handler never holds back audio or interruptions.
    pub fn spawn_event_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let mut events = self.session.subscribe();
        let (jobs, jobs_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_commands(Arc::clone(&self.dispatcher), self.session.clone(), jobs_rx));
        tokio::spawn(async move {
            let mut turn = Turn::default();
            loop {
                match events.recv().await {
                    Ok(event) => controller.handle_event(event, &mut turn, &jobs).await,
                    Err(RecvError::Lagged(n)) => tracing::warn!("event loop lagged, {} event(s) skipped", n),
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("event loop finished");
        })
    }

    async fn handle_event(&self, event: SessionEvent, turn: &mut Turn, jobs: &mpsc::UnboundedSender<CommandJob>) {
        match event {
            SessionEvent::Open => tracing::debug!("session open"),
            SessionEvent::SetupComplete => tracing::info!("session setup complete"),
            SessionEvent::ToolCall(calls) => {
                turn.tool_called = true;
                tracing::info!("tool call batch of {}", calls.len());
                if jobs.send(CommandJob::ToolCalls(calls)).is_err() {
                    tracing::error!("command worker gone, tool call batch dropped");
                }
            }
            SessionEvent::ToolCallCancellation(ids) => {
                tracing::info!("tool calls cancelled: {:?}", ids);
            }
            SessionEvent::Content(content) => turn.text.push_str(&content.text()),
            SessionEvent::Audio(frame) => self.player.add_pcm16(frame.into_data()),
            SessionEvent::Interrupted => {
                tracing::debug!("model interrupted");
                self.player.stop();
            }
            SessionEvent::InputTranscription(text) => {
                self.transcript.lock().unwrap_or_else(PoisonError::into_inner).push_input(&text);
            }
            SessionEvent::OutputTranscription(text) => {
                self.transcript.lock().unwrap_or_else(PoisonError::into_inner).push_output(&text);
            }
            SessionEvent::TurnComplete => {
                let turn = std::mem::take(turn);
                if !turn.tool_called && !turn.text.trim().is_empty() && jobs.send(CommandJob::Text(turn.text)).is_err() {
                    tracing::error!("command worker gone, model text dropped");
                }
                let mut transcript = self.transcript.lock().unwrap_or_else(PoisonError::into_inner);
                if !transcript.input.is_empty() {
                    tracing::info!("user said: {:?}", transcript.input);
                }
                transcript.finish();
            }
            SessionEvent::GoAway(time_left) => {
                tracing::warn!("service is going away, time left {:?}", time_left);
            }
            SessionEvent::Close(reason) => self.connection_lost(&format!("closed: {:?}", reason)).await,
            SessionEvent::Error(message) => self.connection_lost(&message).await,
        }
    }

    async fn connection_lost(&self, reason: &str) {
        let mut forward = self.forward.lock().await;
        if self.stop_capture(&mut forward).await {
            tracing::error!("session lost while listening: {}", reason);
            self.set_state(AgentState::Error(LISTENING_FAILED.to_string()));
        } else {
            tracing::debug!("session event while idle: {}", reason);
        }
    }

    /// Starts listening whenever the persisted auto-start flag turns on.
    pub fn spawn_auto_start(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let mut settings = self.dispatcher.settings().subscribe();
        tokio::spawn(async move {
            let mut policy = AutoStart::default();
            loop {
                let enabled = settings.borrow_and_update().auto_start;
                if policy.observe(enabled) {
                    controller.auto_start().await;
                }
                if settings.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    async fn auto_start(&self) {
        if self.options.config.is_empty() {
            tracing::debug!("auto-start skipped, no session config");
            return;
        }
        if !self.capture.is_supported() {
            tracing::debug!("auto-start skipped, capture unsupported");
            return;
        }
        if let Err(e) = self.start_listening().await {
            tracing::warn!("auto-start failed: {}", e);
        }
    }
}

async fn run_commands(
    dispatcher: Arc<CommandDispatcher>,
    session: LiveSession,
    mut jobs: mpsc::UnboundedReceiver<CommandJob>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            CommandJob::ToolCalls(calls) => {
                let responses = dispatcher.execute_tool_calls(&calls).await;
                session.send_tool_response(responses);
            }
            CommandJob::Text(text) => {
                if dispatcher.execute_text(&text).await {
                    tracing::info!("ran command found in model text");
                }
            }
        }
    }
    tracing::debug!("command worker finished");
}

async fn forward_frames(session: LiveSession, mut frames: mpsc::Receiver<AudioFrame>) {
    while let Some(frame) = frames.recv().await {
        if session.status() != Status::Connected {
            tracing::debug!("dropping microphone frame, session not connected");
            continue;
        }
        session.send_audio(std::slice::from_ref(&frame));
    }
}
