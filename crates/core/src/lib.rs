pub mod alarm;
pub mod history;
pub mod media;
pub mod playback;
pub mod search;
pub mod session;
pub mod state;
pub mod tools;
pub mod wake;

use rio_live_types::audio::Base64EncodedAudioBytes;

use crate::history::ChatTurn;
use crate::media::Channel;
use crate::state::RioState;

/// Commands the orchestrator issues to the embedding UI layer.
///
/// This enum is the capability surface injected at construction: the
/// orchestrator is the only producer, the runtime owns the receiver and
/// executes the side effects (rendering, media players, hardware knobs).
#[derive(Debug, Clone)]
pub enum UiCommand {
    StateChange {
        state: RioState,
        status: Option<String>,
    },
    HistoryUpdate(Vec<ChatTurn>),
    TranscriptionUpdate(Option<ChatTurn>),
    PlayChannel(Channel),
    ResumeMedia,
    PlayVideo { id: String, title: String },
    SetVolume(u8),
    SetBrightness(u8),
    SessionEnd,
}

/// Commands to the live connection task.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// One chunk of microphone audio, already encoded for the wire.
    Audio(Base64EncodedAudioBytes),
    /// Result of a tool call, keyed by the id of the originating call.
    ToolResponse {
        id: String,
        name: String,
        result: String,
    },
    Close,
}

/// Commands to the audio output engine.
#[derive(Debug, Clone)]
pub enum PlaybackCommand {
    /// Play decoded samples at the given output-clock position.
    Play {
        samples: Vec<f32>,
        start_at: f64,
        source: u64,
    },
    /// Drop everything scheduled or playing. Must not fail when nothing
    /// is playing.
    StopAll,
}
