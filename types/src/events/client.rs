use crate::audio::Base64EncodedAudioBytes;
use crate::session::SessionConfig;

/// `setup` event — declares the session configuration, sent once right
/// after the connection opens.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SetupEvent {
    config: SessionConfig,
}

impl SetupEvent {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

/// `audio.append` event — one chunk of realtime microphone audio.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AudioAppendEvent {
    audio: Base64EncodedAudioBytes,
}

impl AudioAppendEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self { audio }
    }

    pub fn audio(&self) -> &Base64EncodedAudioBytes {
        &self.audio
    }
}

/// `tool.response` event — the textual result of a tool call, keyed by the
/// id of the originating call.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolResponseEvent {
    id: String,
    name: String,
    result: String,
}

impl ToolResponseEvent {
    pub fn new(id: String, name: String, result: String) -> Self {
        Self { id, name, result }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result(&self) -> &str {
        &self.result
    }
}
