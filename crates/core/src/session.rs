use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::Duration;

use rio_live_types::ServerEvent;
use rio_live_types::audio::OUTPUT_SAMPLE_RATE;
use rio_live_types::events::server::ToolCallEvent;
use rio_live_utils::audio;

use crate::alarm::AlarmKind;
use crate::history::{ChatTurn, HistoryStore};
use crate::playback::{AudioClock, OutputScheduler};
use crate::state::{RioState, UserProfile, split_emotion_tag};
use crate::tools::{ToolDispatcher, TurnEffect};
use crate::wake::WakeWordGate;
use crate::{ClientCommand, PlaybackCommand, UiCommand};

/// Silence window after which an activated session goes back to resting.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// How long an emotion overlay stays on screen.
const EMOTION_OVERLAY: Duration = Duration::from_secs(3);
/// Grace period before a goodbye actually rests the session.
const FAREWELL_DELAY: Duration = Duration::from_millis(500);

/// Everything the orchestrator can react to: microphone chunks, remote
/// session events, alarm events, UI gestures and its own timers. All
/// mutation happens inside `handle_input`, one input at a time.
#[derive(Debug)]
pub enum SessionInput {
    /// One chunk of mono microphone samples in capture order.
    Audio(Vec<f32>),
    /// An event from the live connection.
    Server(ServerEvent),
    /// Explicit user activation gesture (double tap).
    Activate,
    /// The alarm subsystem started ringing.
    AlarmRing {
        id: u64,
        label: String,
        kind: AlarmKind,
    },
    /// The alarm subsystem asks for a visible state.
    AlarmState {
        state: RioState,
        status: Option<String>,
    },
    /// The playback engine finished one scheduled source.
    PlaybackEnded(u64),
    /// The idle deadline armed with this generation fired.
    IdleTimeout { generation: u64 },
    /// The emotion overlay armed with this turn token expired.
    EmotionRevert {
        token: u64,
        emotion: RioState,
        to_listening: bool,
    },
    /// The farewell grace period armed with this turn token expired.
    Farewell { token: u64, message: String },
    /// The TV player became active or inactive.
    TvActive(bool),
    /// The user started talking while the TV was playing.
    TvInteractionStarted,
    /// Stop the session.
    Stop,
}

/// Capability channels handed to the orchestrator at construction. The
/// orchestrator is the only producer on the first three; `self_tx` loops
/// timer events back into its own input queue.
pub struct OrchestratorChannels {
    pub ui_tx: mpsc::Sender<UiCommand>,
    pub client_tx: mpsc::Sender<ClientCommand>,
    pub playback_tx: mpsc::Sender<PlaybackCommand>,
    pub self_tx: mpsc::Sender<SessionInput>,
}

/// Per-activation session value. Created on start, destroyed on stop;
/// exactly one is live at a time.
#[derive(Default)]
struct SessionState {
    input_transcript: String,
    output_transcript: String,
    is_speaking: bool,
    wake_word_detected: bool,
    state_before_speaking: Option<RioState>,
    scheduler: OutputScheduler,
    deep_sleep_requested: bool,
    channel_just_opened: bool,
    video_just_opened: bool,
    was_tv_playing: bool,
}

/// Single authority for the companion's externally visible state.
///
/// Arbitrates three concurrent event sources (microphone, remote session,
/// alarms) into one consistent transition stream. Timers are modelled as
/// inputs carrying a generation counter or turn token, so a stale timer
/// can never act after the state has moved on.
pub struct Orchestrator {
    profile: UserProfile,
    state: RioState,
    session: Option<SessionState>,
    gate: WakeWordGate,
    dispatcher: ToolDispatcher,
    history_store: Arc<dyn HistoryStore>,
    history: Vec<ChatTurn>,
    clock: Box<dyn AudioClock>,
    tv_active: bool,
    idle_generation: u64,
    turn_token: u64,
    ui_tx: mpsc::Sender<UiCommand>,
    client_tx: mpsc::Sender<ClientCommand>,
    playback_tx: mpsc::Sender<PlaybackCommand>,
    self_tx: mpsc::Sender<SessionInput>,
}

impl Orchestrator {
    pub fn new(
        profile: UserProfile,
        gate: WakeWordGate,
        dispatcher: ToolDispatcher,
        history_store: Arc<dyn HistoryStore>,
        clock: Box<dyn AudioClock>,
        channels: OrchestratorChannels,
    ) -> Self {
        Self {
            profile,
            state: RioState::Idle,
            session: None,
            gate,
            dispatcher,
            history_store,
            history: Vec::new(),
            clock,
            tv_active: false,
            idle_generation: 0,
            turn_token: 0,
            ui_tx: channels.ui_tx,
            client_tx: channels.client_tx,
            playback_tx: channels.playback_tx,
            self_tx: channels.self_tx,
        }
    }

    pub fn state(&self) -> RioState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.is_speaking)
            .unwrap_or(false)
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Begins a session. A no-op while one is already live.
    pub async fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            tracing::warn!("session already running; ignoring start");
            return Ok(());
        }

        self.set_state(RioState::Loading, Some("Đang khởi động...".to_string()))
            .await;

        match self.history_store.load().await {
            Ok(turns) => self.history = turns,
            Err(e) => {
                tracing::error!("failed to restore chat history: {:?}", e);
                self.history = Vec::new();
            }
        }
        if !self.history.is_empty() {
            self.send_ui(UiCommand::HistoryUpdate(self.history.clone()))
                .await;
        }

        self.session = Some(SessionState::default());
        Ok(())
    }

    pub async fn handle_input(&mut self, input: SessionInput) -> Result<()> {
        match input {
            SessionInput::Audio(samples) => self.handle_audio_chunk(samples).await,
            SessionInput::Server(event) => self.handle_server_event(event).await,
            SessionInput::Activate => {
                self.activate().await;
                Ok(())
            }
            SessionInput::AlarmRing { label, kind, .. } => {
                self.handle_alarm_ring(label, kind).await;
                Ok(())
            }
            SessionInput::AlarmState { state, status } => {
                self.set_state(state, status).await;
                Ok(())
            }
            SessionInput::PlaybackEnded(source) => {
                if let Some(session) = self.session.as_mut() {
                    session.scheduler.source_ended(source);
                }
                Ok(())
            }
            SessionInput::IdleTimeout { generation } => {
                self.handle_idle_timeout(generation).await;
                Ok(())
            }
            SessionInput::EmotionRevert {
                token,
                emotion,
                to_listening,
            } => {
                self.handle_emotion_revert(token, emotion, to_listening).await;
                Ok(())
            }
            SessionInput::Farewell { token, message } => {
                if token == self.turn_token {
                    self.set_state(RioState::Idle, Some(message)).await;
                }
                Ok(())
            }
            SessionInput::TvActive(active) => {
                self.tv_active = active;
                Ok(())
            }
            SessionInput::TvInteractionStarted => {
                if self.tv_active {
                    if let Some(session) = self.session.as_mut() {
                        session.was_tv_playing = true;
                    }
                }
                Ok(())
            }
            SessionInput::Stop => {
                self.stop(None).await;
                Ok(())
            }
        }
    }

    /// Stops the session and releases everything, in teardown order. Safe
    /// to call repeatedly.
    pub async fn stop(&mut self, user_name: Option<&str>) {
        let status = match user_name {
            Some(name) => format!("Hẹn gặp lại nà, {}!", name),
            None => "Phiên đã kết thúc.".to_string(),
        };
        self.teardown(Some((RioState::Idle, Some(status)))).await;
    }

    /// Wipes the conversation history on explicit user request.
    pub async fn clear_history(&mut self) {
        self.history.clear();
        self.send_ui(UiCommand::HistoryUpdate(Vec::new())).await;
        if let Err(e) = self.history_store.clear().await {
            tracing::error!("failed to clear chat history: {:?}", e);
        }
    }

    // --- microphone path ---

    async fn handle_audio_chunk(&mut self, samples: Vec<f32>) -> Result<()> {
        let (speaking, detected) = match self.session.as_ref() {
            Some(session) => (session.is_speaking, session.wake_word_detected),
            None => return Ok(()),
        };
        // The mic stays muted towards the model while the assistant speaks.
        if speaking {
            return Ok(());
        }

        if self.state.requires_wake_word() && !detected {
            if !self.gate.is_ready() {
                // Deliberate backpressure: chunks are dropped, never queued,
                // while the detector loads.
                tracing::debug!("wake gate not ready; dropping chunk");
                return Ok(());
            }
            if self.gate.process_chunk(&samples) {
                self.activate().await;
                // The triggering chunk itself is forwarded: nothing is lost
                // at the activation boundary.
                self.send_client(ClientCommand::Audio(audio::encode(&samples)))
                    .await;
            }
            return Ok(());
        }

        self.send_client(ClientCommand::Audio(audio::encode(&samples)))
            .await;
        Ok(())
    }

    /// Marks the session activated and opens the listening window. Both
    /// detectors (gate and transcript scan) land here; the first one wins
    /// and the second is a no-op.
    async fn activate(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.wake_word_detected {
            return;
        }
        session.wake_word_detected = true;
        if self.tv_active {
            session.was_tv_playing = true;
        }
        self.transition_to_listening().await;
    }

    // --- remote session path ---

    async fn handle_server_event(&mut self, event: ServerEvent) -> Result<()> {
        match event {
            ServerEvent::SetupComplete(_) => {
                let prompt = self.wake_prompt();
                self.set_state(RioState::Idle, Some(prompt)).await;
            }
            ServerEvent::ToolCall(tool_call) => self.handle_tool_call(&tool_call).await,
            ServerEvent::AudioDelta(delta) => self.handle_audio_delta(delta.delta()).await,
            ServerEvent::InputTranscription(t) => self.handle_input_transcription(t.text()).await,
            ServerEvent::OutputTranscription(t) => self.handle_output_transcription(t.text()).await,
            ServerEvent::Interrupted(_) => self.handle_interruption().await,
            ServerEvent::TurnComplete(_) => self.handle_turn_complete().await,
            ServerEvent::Error(e) => {
                tracing::error!("live session error: {}", e.message());
                self.set_state(
                    RioState::Error,
                    Some(format!("Đã xảy ra lỗi kết nối: {}", e.message())),
                )
                .await;
                self.teardown(None).await;
            }
            ServerEvent::Close { reason } => {
                tracing::info!("live session closed: {:?}", reason);
                self.stop(None).await;
            }
        }
        Ok(())
    }

    async fn handle_tool_call(&mut self, event: &ToolCallEvent) {
        for call in event.function_calls() {
            if let Some(status) = ToolDispatcher::thinking_status(call) {
                self.set_state(RioState::Thinking, Some(status)).await;
            }
            let outcome = self.dispatcher.dispatch(call).await;
            if let Some(session) = self.session.as_mut() {
                match outcome.effect {
                    Some(TurnEffect::DeepSleep) => session.deep_sleep_requested = true,
                    Some(TurnEffect::ChannelOpened) => session.channel_just_opened = true,
                    Some(TurnEffect::VideoOpened) => session.video_just_opened = true,
                    None => {}
                }
            }
            self.send_client(ClientCommand::ToolResponse {
                id: call.id().to_string(),
                name: call.name().to_string(),
                result: outcome.reply,
            })
            .await;
        }
    }

    async fn handle_audio_delta(&mut self, delta: &str) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        // No output is played while still gated behind the wake word.
        if self.state.requires_wake_word() && !session.wake_word_detected {
            return;
        }

        if !session.is_speaking {
            let previous = self.state;
            if let Some(session) = self.session.as_mut() {
                session.state_before_speaking = Some(previous);
                session.is_speaking = true;
            }
            self.send_ui(UiCommand::TranscriptionUpdate(None)).await;
            self.set_state(RioState::Speaking, None).await;
        }

        let samples = audio::decode(delta);
        if samples.is_empty() {
            return;
        }
        let duration = audio::duration_secs(samples.len(), OUTPUT_SAMPLE_RATE);
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let (source, start_at) = session.scheduler.schedule(duration, now);
        if let Err(e) = self
            .playback_tx
            .send(PlaybackCommand::Play {
                samples,
                start_at,
                source,
            })
            .await
        {
            tracing::warn!("failed to schedule output audio: {:?}", e);
        }
    }

    async fn handle_input_transcription(&mut self, text: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.input_transcript.push_str(text);
        let full_input = session.input_transcript.clone();
        let detected = session.wake_word_detected;

        if !self.state.requires_wake_word() {
            // Fresh recognized input keeps the activated window open.
            self.arm_idle_timer();
            self.send_ui(UiCommand::TranscriptionUpdate(Some(ChatTurn::user(
                full_input,
            ))))
            .await;
            return;
        }

        // Redundant wake detector: the remote transcript is scanned for the
        // phrase in case the offline gate missed it.
        if !detected && full_input.to_lowercase().contains(&self.profile.wake_phrase()) {
            self.activate().await;
            self.send_ui(UiCommand::TranscriptionUpdate(Some(ChatTurn::user(
                full_input,
            ))))
            .await;
        } else if detected {
            self.send_ui(UiCommand::TranscriptionUpdate(Some(ChatTurn::user(
                full_input,
            ))))
            .await;
        }
        // Still gated: nothing is surfaced.
    }

    async fn handle_output_transcription(&mut self, text: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.output_transcript.push_str(text);
        let full_output = session.output_transcript.clone();
        if self.state.requires_wake_word() && !session.wake_word_detected {
            return;
        }
        self.send_ui(UiCommand::TranscriptionUpdate(Some(ChatTurn::rio(
            full_output,
        ))))
        .await;
    }

    async fn handle_interruption(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.scheduler.stop_all();
        session.is_speaking = false;
        session.input_transcript.clear();
        session.output_transcript.clear();
        session.state_before_speaking = None;
        // Any emotion or farewell timer still in flight belongs to the turn
        // that just died.
        self.turn_token += 1;

        if let Err(e) = self.playback_tx.send(PlaybackCommand::StopAll).await {
            tracing::warn!("failed to stop playback: {:?}", e);
        }
        self.send_ui(UiCommand::TranscriptionUpdate(None)).await;
        self.set_state(RioState::Listening, None).await;
    }

    async fn handle_turn_complete(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let final_input = session.input_transcript.trim().to_string();
        let final_output = session.output_transcript.trim().to_string();
        session.input_transcript.clear();
        session.output_transcript.clear();
        session.is_speaking = false;
        let state_before_speaking = session.state_before_speaking.take();
        session.wake_word_detected = false;
        self.turn_token += 1;

        self.send_ui(UiCommand::TranscriptionUpdate(None)).await;

        // A turn that completed while still gated never surfaced anything;
        // its one-shot flags stay for the turn that actually activates.
        if self.state.requires_wake_word() {
            return;
        }

        let (emotion, cleaned_output) = split_emotion_tag(&final_output);

        if !final_input.is_empty() {
            self.history.push(ChatTurn::user(final_input.clone()));
        }
        if !cleaned_output.is_empty() {
            self.history.push(ChatTurn::rio(cleaned_output.clone()));
        }
        if !final_input.is_empty() || !cleaned_output.is_empty() {
            self.send_ui(UiCommand::HistoryUpdate(self.history.clone()))
                .await;
            if let Err(e) = self.history_store.save(&self.history).await {
                tracing::error!("failed to save chat history: {:?}", e);
            }
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let channel_opened = std::mem::take(&mut session.channel_just_opened);
        let video_opened = std::mem::take(&mut session.video_just_opened);
        let was_tv_playing = std::mem::take(&mut session.was_tv_playing);
        let deep_sleep = std::mem::take(&mut session.deep_sleep_requested);

        // Priority ladder. The first matching case decides the next state,
        // regardless of any emotion tag.
        if channel_opened || video_opened {
            let rio_name = self.profile.rio_name();
            self.set_state(
                RioState::Idle,
                Some(format!("{} đang nghỉ ngơi...", rio_name)),
            )
            .await;
            return;
        }

        let input_lower = final_input.to_lowercase();
        if input_lower.contains("tạm biệt") || input_lower.contains("goodbye") {
            let token = self.turn_token;
            let message = format!("Hẹn gặp lại, {}!", self.profile.name);
            let tx = self.self_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(FAREWELL_DELAY).await;
                let _ = tx.send(SessionInput::Farewell { token, message }).await;
            });
            return;
        }

        if was_tv_playing {
            self.send_ui(UiCommand::ResumeMedia).await;
            self.set_state(RioState::Idle, None).await;
            return;
        }

        if deep_sleep {
            let rio_name = self.profile.rio_name();
            self.set_state(
                RioState::EnteringDeepSleep,
                Some(format!(
                    "{} đang ngủ sâu. Chạm hoặc gọi để đánh thức.",
                    rio_name
                )),
            )
            .await;
            return;
        }

        if let Some(emotion) = emotion {
            self.set_state(emotion, None).await;
            let token = self.turn_token;
            let to_listening = state_before_speaking == Some(RioState::Listening);
            let tx = self.self_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(EMOTION_OVERLAY).await;
                let _ = tx
                    .send(SessionInput::EmotionRevert {
                        token,
                        emotion,
                        to_listening,
                    })
                    .await;
            });
            return;
        }

        if !final_input.is_empty() || !cleaned_output.is_empty() {
            self.transition_to_listening().await;
        }
    }

    // --- alarms ---

    async fn handle_alarm_ring(&mut self, label: String, kind: AlarmKind) {
        // Ringing suspends the session's own turn bookkeeping: the state is
        // forced no matter what the turn machinery was doing.
        match kind {
            AlarmKind::Alarm => {
                self.set_state(RioState::AlarmRinging, Some(label)).await;
            }
            AlarmKind::Reminder => {
                self.set_state(RioState::Speaking, Some(format!("Nhắc nhở: {}", label)))
                    .await;
            }
        }
    }

    // --- timers ---

    async fn handle_idle_timeout(&mut self, generation: u64) {
        if generation != self.idle_generation {
            return;
        }
        if self.session.is_none() {
            return;
        }
        if matches!(
            self.state,
            RioState::Listening | RioState::Thinking | RioState::Speaking
        ) {
            // The activated window expired: lock the session behind the
            // wake word again.
            if let Some(session) = self.session.as_mut() {
                session.wake_word_detected = false;
            }
            let prompt = self.wake_prompt();
            self.set_state(RioState::Idle, Some(prompt)).await;
        }
    }

    async fn handle_emotion_revert(&mut self, token: u64, emotion: RioState, to_listening: bool) {
        if token != self.turn_token {
            return;
        }
        // Belt and braces: even with a live token the overlay may already
        // have been replaced.
        if self.state != emotion {
            return;
        }
        if to_listening {
            self.transition_to_listening().await;
        } else {
            let prompt = self.wake_prompt();
            self.set_state(RioState::Idle, Some(prompt)).await;
        }
    }

    async fn transition_to_listening(&mut self) {
        self.set_state(RioState::Listening, None).await;
        self.arm_idle_timer();
    }

    /// (Re)arms the 30 second idle deadline. Bumping the generation
    /// invalidates whatever deadline was outstanding, so at most one is
    /// ever live.
    fn arm_idle_timer(&mut self) {
        self.idle_generation += 1;
        let generation = self.idle_generation;
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(IDLE_TIMEOUT).await;
            let _ = tx.send(SessionInput::IdleTimeout { generation }).await;
        });
    }

    // --- plumbing ---

    fn wake_prompt(&self) -> String {
        format!(
            "{} đang nghỉ. Nói '{}' để bắt đầu.",
            self.profile.rio_name(),
            self.profile.wake_phrase()
        )
    }

    async fn set_state(&mut self, state: RioState, status: Option<String>) {
        self.state = state;
        self.send_ui(UiCommand::StateChange { state, status }).await;
    }

    async fn send_ui(&self, command: UiCommand) {
        if let Err(e) = self.ui_tx.send(command).await {
            tracing::warn!("failed to deliver UI command: {:?}", e);
        }
    }

    async fn send_client(&self, command: ClientCommand) {
        if let Err(e) = self.client_tx.send(command).await {
            tracing::warn!("failed to deliver client command: {:?}", e);
        }
    }

    /// Full teardown in order: gate, timers, playback, connection, session
    /// value. Tolerates everything already being gone.
    async fn teardown(&mut self, final_state: Option<(RioState, Option<String>)>) {
        self.gate.teardown();
        self.idle_generation += 1;
        self.turn_token += 1;

        if let Some(mut session) = self.session.take() {
            session.scheduler.stop_all();
        }
        if let Err(e) = self.playback_tx.send(PlaybackCommand::StopAll).await {
            tracing::debug!("playback already gone: {:?}", e);
        }
        if let Err(e) = self.client_tx.send(ClientCommand::Close).await {
            tracing::debug!("connection already gone: {:?}", e);
        }
        self.tv_active = false;

        self.send_ui(UiCommand::TranscriptionUpdate(None)).await;
        self.send_ui(UiCommand::SessionEnd).await;
        if let Some((state, status)) = final_state {
            self.set_state(state, status).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmScheduler;
    use crate::history::MemoryHistoryStore;
    use crate::media::{Channel, MockMediaLookup};
    use crate::playback::MockAudioClock;
    use crate::search::MockSearchProvider;
    use crate::wake::MockSpeechRecognizer;
    use rio_live_types::events::server::{
        AudioDeltaEvent, FunctionCall, InterruptedEvent, SetupCompleteEvent, ToolCallEvent,
        TranscriptionEvent, TurnCompleteEvent,
    };

    struct Harness {
        orchestrator: Orchestrator,
        ui_rx: mpsc::Receiver<UiCommand>,
        client_rx: mpsc::Receiver<ClientCommand>,
        playback_rx: mpsc::Receiver<PlaybackCommand>,
        self_rx: mpsc::Receiver<SessionInput>,
        store: Arc<MemoryHistoryStore>,
    }

    fn profile() -> UserProfile {
        UserProfile {
            name: "Minh".to_string(),
            gender: "nam".to_string(),
            rio_name: None,
            wake_word: Some("Rio ơi".to_string()),
            voice: None,
        }
    }

    fn build_harness(
        search: MockSearchProvider,
        media: MockMediaLookup,
        recognizer: Option<Box<dyn crate::wake::SpeechRecognizer>>,
    ) -> Harness {
        let (ui_tx, ui_rx) = mpsc::channel(64);
        let (client_tx, client_rx) = mpsc::channel(64);
        let (playback_tx, playback_rx) = mpsc::channel(64);
        let (self_tx, self_rx) = mpsc::channel(64);
        let (alarm_tx, _alarm_rx) = mpsc::channel(64);

        let mut gate = WakeWordGate::new("Rio ơi", 16000);
        if let Some(recognizer) = recognizer {
            gate.attach(recognizer);
        }

        let dispatcher = ToolDispatcher::new(
            Arc::new(search),
            Arc::new(media),
            AlarmScheduler::new(alarm_tx),
            ui_tx.clone(),
        );

        let mut clock = MockAudioClock::new();
        clock.expect_now().return_const(0.0f64);

        let store = Arc::new(MemoryHistoryStore::new());
        let orchestrator = Orchestrator::new(
            profile(),
            gate,
            dispatcher,
            store.clone(),
            Box::new(clock),
            OrchestratorChannels {
                ui_tx,
                client_tx,
                playback_tx,
                self_tx,
            },
        );

        Harness {
            orchestrator,
            ui_rx,
            client_rx,
            playback_rx,
            self_rx,
            store,
        }
    }

    fn harness() -> Harness {
        build_harness(MockSearchProvider::new(), MockMediaLookup::new(), None)
    }

    /// A recognizer that always has a transcript but never the wake phrase.
    fn deaf_recognizer() -> Box<dyn crate::wake::SpeechRecognizer> {
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer.expect_accept_waveform().return_const(());
        recognizer.expect_is_ready().return_const(true);
        recognizer
            .expect_decode()
            .returning(|| Some("tiếng ồn xung quanh".to_string()));
        recognizer.expect_reset().return_const(());
        Box::new(recognizer)
    }

    /// A recognizer that hears the wake phrase on the nth decoded chunk.
    fn keen_recognizer(detect_on: usize) -> Box<dyn crate::wake::SpeechRecognizer> {
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer.expect_accept_waveform().return_const(());
        recognizer.expect_is_ready().return_const(true);
        let mut calls = 0usize;
        recognizer.expect_decode().returning(move || {
            calls += 1;
            if calls >= detect_on {
                Some("rio ơi".to_string())
            } else {
                Some("ừm".to_string())
            }
        });
        recognizer.expect_reset().return_const(());
        Box::new(recognizer)
    }

    async fn start(h: &mut Harness) {
        h.orchestrator.start().await.unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(ServerEvent::SetupComplete(
                SetupCompleteEvent::new(),
            )))
            .await
            .unwrap();
        drain_ui(&mut h.ui_rx);
    }

    fn drain_ui(rx: &mut mpsc::Receiver<UiCommand>) -> Vec<UiCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    fn drain_client(rx: &mut mpsc::Receiver<ClientCommand>) -> Vec<ClientCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    fn audio_delta(samples: usize) -> ServerEvent {
        let pcm = vec![0.25f32; samples];
        ServerEvent::AudioDelta(AudioDeltaEvent::new(audio::encode(&pcm)))
    }

    fn input_transcription(text: &str) -> ServerEvent {
        ServerEvent::InputTranscription(TranscriptionEvent::new(text.to_string()))
    }

    fn output_transcription(text: &str) -> ServerEvent {
        ServerEvent::OutputTranscription(TranscriptionEvent::new(text.to_string()))
    }

    fn turn_complete() -> ServerEvent {
        ServerEvent::TurnComplete(TurnCompleteEvent::new())
    }

    #[tokio::test]
    async fn gated_chunks_are_dropped_while_the_gate_loads() {
        let mut h = harness();
        start(&mut h).await;
        assert_eq!(h.orchestrator.state(), RioState::Idle);

        for _ in 0..5 {
            h.orchestrator
                .handle_input(SessionInput::Audio(vec![0.1; 160]))
                .await
                .unwrap();
        }
        assert!(drain_client(&mut h.client_rx).is_empty());
        assert_eq!(h.orchestrator.state(), RioState::Idle);
    }

    #[tokio::test]
    async fn gated_chunks_stay_local_even_with_a_ready_gate() {
        let mut h = build_harness(
            MockSearchProvider::new(),
            MockMediaLookup::new(),
            Some(deaf_recognizer()),
        );
        start(&mut h).await;

        for _ in 0..5 {
            h.orchestrator
                .handle_input(SessionInput::Audio(vec![0.1; 160]))
                .await
                .unwrap();
        }
        assert!(drain_client(&mut h.client_rx).is_empty());
    }

    #[tokio::test]
    async fn detection_forwards_the_triggering_chunk_and_listens_once() {
        let mut h = build_harness(
            MockSearchProvider::new(),
            MockMediaLookup::new(),
            Some(keen_recognizer(3)),
        );
        start(&mut h).await;

        for _ in 0..3 {
            h.orchestrator
                .handle_input(SessionInput::Audio(vec![0.1; 160]))
                .await
                .unwrap();
        }

        assert_eq!(h.orchestrator.state(), RioState::Listening);
        let forwarded = drain_client(&mut h.client_rx);
        assert_eq!(forwarded.len(), 1, "only the triggering chunk is forwarded");
        assert!(matches!(forwarded[0], ClientCommand::Audio(_)));

        let listening_transitions = drain_ui(&mut h.ui_rx)
            .into_iter()
            .filter(|command| {
                matches!(
                    command,
                    UiCommand::StateChange {
                        state: RioState::Listening,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(listening_transitions, 1);
    }

    #[tokio::test]
    async fn activated_chunks_flow_through_in_order() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Listening);

        for amplitude in [0.1f32, 0.2, 0.3] {
            h.orchestrator
                .handle_input(SessionInput::Audio(vec![amplitude; 160]))
                .await
                .unwrap();
        }
        let forwarded = drain_client(&mut h.client_rx);
        assert_eq!(forwarded.len(), 3);
        let expected: Vec<String> = [0.1f32, 0.2, 0.3]
            .iter()
            .map(|&a| audio::encode(&vec![a; 160]))
            .collect();
        for (command, expected) in forwarded.iter().zip(expected.iter()) {
            match command {
                ClientCommand::Audio(encoded) => assert_eq!(encoded, expected),
                other => panic!("expected audio, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn transcript_scan_is_a_redundant_wake_detector() {
        let mut h = harness();
        start(&mut h).await;

        h.orchestrator
            .handle_input(SessionInput::Server(input_transcription("RIO ơi, mấy giờ rồi?")))
            .await
            .unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Listening);

        // A second mention does not re-activate.
        h.orchestrator
            .handle_input(SessionInput::Server(input_transcription(" rio ơi")))
            .await
            .unwrap();
        let listening_transitions = drain_ui(&mut h.ui_rx)
            .into_iter()
            .filter(|command| {
                matches!(
                    command,
                    UiCommand::StateChange {
                        state: RioState::Listening,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(listening_transitions, 1);
    }

    #[tokio::test]
    async fn gated_transcription_is_never_surfaced() {
        let mut h = harness();
        start(&mut h).await;

        h.orchestrator
            .handle_input(SessionInput::Server(input_transcription("chuyện phiếm")))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(output_transcription("…")))
            .await
            .unwrap();
        assert!(drain_ui(&mut h.ui_rx).is_empty());
    }

    #[tokio::test]
    async fn output_chunks_are_scheduled_gaplessly_in_order() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();

        // 24000 Hz output: 12000 samples = 0.5 s, 6000 = 0.25 s.
        let chunk_sizes = [12000usize, 6000, 3000];
        for samples in chunk_sizes {
            h.orchestrator
                .handle_input(SessionInput::Server(audio_delta(samples)))
                .await
                .unwrap();
        }
        assert_eq!(h.orchestrator.state(), RioState::Speaking);
        assert!(h.orchestrator.is_speaking());

        let mut scheduled = Vec::new();
        while let Ok(command) = h.playback_rx.try_recv() {
            if let PlaybackCommand::Play {
                samples, start_at, ..
            } = command
            {
                scheduled.push((samples.len(), start_at));
            }
        }
        assert_eq!(scheduled.len(), 3);
        assert!((scheduled[0].1 - 0.0).abs() < f64::EPSILON);
        assert!((scheduled[1].1 - 0.5).abs() < 1e-9);
        assert!((scheduled[2].1 - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn gated_output_audio_is_not_played() {
        let mut h = harness();
        start(&mut h).await;

        h.orchestrator
            .handle_input(SessionInput::Server(audio_delta(2400)))
            .await
            .unwrap();
        assert!(h.playback_rx.try_recv().is_err());
        assert!(!h.orchestrator.is_speaking());
    }

    #[tokio::test]
    async fn interruption_stops_all_pending_output_and_listens() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();
        for _ in 0..3 {
            h.orchestrator
                .handle_input(SessionInput::Server(audio_delta(2400)))
                .await
                .unwrap();
        }
        assert!(h.orchestrator.is_speaking());
        drain_ui(&mut h.ui_rx);
        while h.playback_rx.try_recv().is_ok() {}

        h.orchestrator
            .handle_input(SessionInput::Server(ServerEvent::Interrupted(
                InterruptedEvent::new(),
            )))
            .await
            .unwrap();

        assert!(!h.orchestrator.is_speaking());
        assert_eq!(h.orchestrator.state(), RioState::Listening);
        assert!(matches!(
            h.playback_rx.try_recv().unwrap(),
            PlaybackCommand::StopAll
        ));

        // The cursor rewound: the next turn starts scheduling from zero.
        h.orchestrator
            .handle_input(SessionInput::Server(audio_delta(2400)))
            .await
            .unwrap();
        let mut first_start = None;
        while let Ok(command) = h.playback_rx.try_recv() {
            if let PlaybackCommand::Play { start_at, .. } = command {
                first_start = Some(start_at);
            }
        }
        assert_eq!(first_start, Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn emotion_tag_overlays_then_reverts_to_listening() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();

        h.orchestrator
            .handle_input(SessionInput::Server(audio_delta(2400)))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(output_transcription(
                "[HAPPY] Tuyệt vời!",
            )))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(turn_complete()))
            .await
            .unwrap();

        assert_eq!(h.orchestrator.state(), RioState::Happy);
        let history = h.orchestrator.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "Tuyệt vời!");

        // The 3 s overlay timer loops back through the input queue.
        let revert = h.self_rx.recv().await.unwrap();
        assert!(matches!(revert, SessionInput::EmotionRevert { .. }));
        h.orchestrator.handle_input(revert).await.unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_emotion_timer_cannot_act_after_an_interruption() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(audio_delta(2400)))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(output_transcription("[SAD] Ôi không.")))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(turn_complete()))
            .await
            .unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Sad);

        // A new exchange starts before the overlay expires.
        h.orchestrator
            .handle_input(SessionInput::Server(ServerEvent::Interrupted(
                InterruptedEvent::new(),
            )))
            .await
            .unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Listening);

        let revert = h.self_rx.recv().await.unwrap();
        h.orchestrator.handle_input(revert).await.unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Listening);
    }

    #[tokio::test]
    async fn channel_open_wins_over_emotion_at_turn_complete() {
        let mut media = MockMediaLookup::new();
        media.expect_find_channel().returning(|_| {
            Ok(Some(Channel {
                name: "VTV1".to_string(),
                logo: String::new(),
                url: "http://stream/vtv1".to_string(),
            }))
        });
        let mut h = build_harness(MockSearchProvider::new(), media, None);
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();

        let tool_call = ToolCallEvent::new(vec![FunctionCall::new(
            "fc-7".to_string(),
            "open_tv_channel".to_string(),
            serde_json::json!({"channel_name": "VTV1"}),
        )]);
        h.orchestrator
            .handle_input(SessionInput::Server(ServerEvent::ToolCall(tool_call)))
            .await
            .unwrap();

        let responses = drain_client(&mut h.client_rx);
        assert!(responses.iter().any(|command| matches!(
            command,
            ClientCommand::ToolResponse { id, .. } if id == "fc-7"
        )));

        h.orchestrator
            .handle_input(SessionInput::Server(output_transcription(
                "[HAPPY] Mở kênh ngay đây!",
            )))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(turn_complete()))
            .await
            .unwrap();

        assert_eq!(h.orchestrator.state(), RioState::Idle);
        let last_state = drain_ui(&mut h.ui_rx)
            .into_iter()
            .filter_map(|command| match command {
                UiCommand::StateChange { state, status } => Some((state, status)),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(last_state.0, RioState::Idle);
        assert!(last_state.1.unwrap().contains("nghỉ ngơi"));
    }

    #[tokio::test]
    async fn plain_turn_returns_to_listening_and_saves_history() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();

        h.orchestrator
            .handle_input(SessionInput::Server(input_transcription("rio ơi, chào buổi sáng")))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(output_transcription(
                "Chào buổi sáng, Minh!",
            )))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(turn_complete()))
            .await
            .unwrap();

        assert_eq!(h.orchestrator.state(), RioState::Listening);
        assert_eq!(h.orchestrator.history().len(), 2);
        let persisted = h.store.load().await.unwrap();
        assert_eq!(persisted, h.orchestrator.history().to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_after_activation_reverts_to_idle_with_a_prompt() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Listening);
        drain_ui(&mut h.ui_rx);

        let timeout = h.self_rx.recv().await.unwrap();
        assert!(matches!(timeout, SessionInput::IdleTimeout { .. }));
        h.orchestrator.handle_input(timeout).await.unwrap();

        assert_eq!(h.orchestrator.state(), RioState::Idle);
        let prompt = drain_ui(&mut h.ui_rx)
            .into_iter()
            .find_map(|command| match command {
                UiCommand::StateChange {
                    state: RioState::Idle,
                    status: Some(status),
                } => Some(status),
                _ => None,
            })
            .unwrap();
        assert!(prompt.contains("rio ơi"), "prompt: {}", prompt);

        // Locked again: chunks no longer reach the session.
        h.orchestrator
            .handle_input(SessionInput::Audio(vec![0.1; 160]))
            .await
            .unwrap();
        assert!(drain_client(&mut h.client_rx)
            .iter()
            .all(|command| !matches!(command, ClientCommand::Audio(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn recognized_input_rearms_the_idle_deadline() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        h.orchestrator
            .handle_input(SessionInput::Server(input_transcription("vẫn đang nói")))
            .await
            .unwrap();

        // The first deadline fires but its generation is stale.
        tokio::time::advance(Duration::from_secs(10)).await;
        let stale = h.self_rx.recv().await.unwrap();
        h.orchestrator.handle_input(stale).await.unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Listening);

        // The rearmed deadline is the one that matters.
        tokio::time::advance(Duration::from_secs(20)).await;
        let live = h.self_rx.recv().await.unwrap();
        h.orchestrator.handle_input(live).await.unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn farewell_rests_after_a_short_grace_period() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();

        h.orchestrator
            .handle_input(SessionInput::Server(input_transcription("tạm biệt nhé")))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(output_transcription("Tạm biệt Minh!")))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(turn_complete()))
            .await
            .unwrap();

        let farewell = h.self_rx.recv().await.unwrap();
        assert!(matches!(farewell, SessionInput::Farewell { .. }));
        h.orchestrator.handle_input(farewell).await.unwrap();

        assert_eq!(h.orchestrator.state(), RioState::Idle);
        let goodbye = drain_ui(&mut h.ui_rx)
            .into_iter()
            .filter_map(|command| match command {
                UiCommand::StateChange { status: Some(s), .. } => Some(s),
                _ => None,
            })
            .last()
            .unwrap();
        assert!(goodbye.contains("Hẹn gặp lại, Minh"));
    }

    #[tokio::test]
    async fn suspended_tv_resumes_after_the_turn_in_order() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::TvActive(true))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();
        drain_ui(&mut h.ui_rx);

        h.orchestrator
            .handle_input(SessionInput::Server(input_transcription("rio ơi to quá")))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(output_transcription("Đã giảm nhé!")))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(turn_complete()))
            .await
            .unwrap();

        let commands = drain_ui(&mut h.ui_rx);
        let history_at = commands
            .iter()
            .position(|c| matches!(c, UiCommand::HistoryUpdate(_)))
            .unwrap();
        let resume_at = commands
            .iter()
            .position(|c| matches!(c, UiCommand::ResumeMedia))
            .unwrap();
        let idle_at = commands
            .iter()
            .position(|c| {
                matches!(
                    c,
                    UiCommand::StateChange {
                        state: RioState::Idle,
                        ..
                    }
                )
            })
            .unwrap();
        assert!(history_at < resume_at && resume_at < idle_at);
        assert_eq!(h.orchestrator.state(), RioState::Idle);
    }

    #[tokio::test]
    async fn deep_sleep_request_is_honored_at_turn_complete() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();

        let tool_call = ToolCallEvent::new(vec![FunctionCall::new(
            "fc-9".to_string(),
            "enter_deep_sleep".to_string(),
            serde_json::json!({}),
        )]);
        h.orchestrator
            .handle_input(SessionInput::Server(ServerEvent::ToolCall(tool_call)))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(output_transcription("Chúc ngủ ngon!")))
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(turn_complete()))
            .await
            .unwrap();

        assert_eq!(h.orchestrator.state(), RioState::EnteringDeepSleep);
    }

    #[tokio::test]
    async fn alarm_ring_forces_its_state_from_anywhere() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();
        h.orchestrator
            .handle_input(SessionInput::Server(audio_delta(2400)))
            .await
            .unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Speaking);

        h.orchestrator
            .handle_input(SessionInput::AlarmRing {
                id: 1,
                label: "Báo thức dậy".to_string(),
                kind: AlarmKind::Alarm,
            })
            .await
            .unwrap();
        assert_eq!(h.orchestrator.state(), RioState::AlarmRinging);
    }

    #[tokio::test]
    async fn double_stop_is_idempotent() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator.stop(Some("Minh")).await;
        assert_eq!(h.orchestrator.state(), RioState::Idle);
        assert!(!h.orchestrator.is_speaking());

        h.orchestrator.stop(None).await;
        assert_eq!(h.orchestrator.state(), RioState::Idle);

        // And a fresh session can start afterwards.
        h.orchestrator.start().await.unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Loading);
    }

    #[tokio::test]
    async fn start_is_a_noop_while_a_session_is_live() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Activate)
            .await
            .unwrap();
        assert_eq!(h.orchestrator.state(), RioState::Listening);

        h.orchestrator.start().await.unwrap();
        // No LOADING transition happened.
        assert_eq!(h.orchestrator.state(), RioState::Listening);
    }

    #[tokio::test]
    async fn connection_error_is_fatal_and_tears_down() {
        let mut h = harness();
        start(&mut h).await;
        h.orchestrator
            .handle_input(SessionInput::Server(ServerEvent::Error(
                rio_live_types::events::server::ErrorEvent::new("mất kết nối".to_string()),
            )))
            .await
            .unwrap();

        assert_eq!(h.orchestrator.state(), RioState::Error);
        // The session value is gone; new audio is ignored entirely.
        h.orchestrator
            .handle_input(SessionInput::Audio(vec![0.1; 160]))
            .await
            .unwrap();
        assert!(drain_client(&mut h.client_rx)
            .iter()
            .all(|command| !matches!(command, ClientCommand::Audio(_))));
    }
}
