use crate::audio::Base64EncodedAudioBytes;

/// `error` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    /// Human readable description of the failure
    message: String,
}

impl ErrorEvent {
    pub fn new(message: String) -> Self {
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// `setup.complete` event — the service accepted the session configuration
/// and is ready for realtime audio.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SetupCompleteEvent {}

impl SetupCompleteEvent {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for SetupCompleteEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// A single function invocation requested by the model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCall {
    id: String,
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

impl FunctionCall {
    pub fn new(id: String, name: String, args: serde_json::Value) -> Self {
        Self { id, name, args }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &serde_json::Value {
        &self.args
    }
}

/// `tool_call` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallEvent {
    function_calls: Vec<FunctionCall>,
}

impl ToolCallEvent {
    pub fn new(function_calls: Vec<FunctionCall>) -> Self {
        Self { function_calls }
    }

    pub fn function_calls(&self) -> &[FunctionCall] {
        &self.function_calls
    }
}

/// `audio.delta` event — one chunk of the model's spoken output.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AudioDeltaEvent {
    delta: Base64EncodedAudioBytes,
}

impl AudioDeltaEvent {
    pub fn new(delta: Base64EncodedAudioBytes) -> Self {
        Self { delta }
    }

    pub fn delta(&self) -> &Base64EncodedAudioBytes {
        &self.delta
    }
}

/// `transcription.input` / `transcription.output` event — a partial
/// transcript delta for the current turn.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TranscriptionEvent {
    text: String,
}

impl TranscriptionEvent {
    pub fn new(text: String) -> Self {
        Self { text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `interrupted` event — the user cut in while the model was speaking.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InterruptedEvent {}

impl InterruptedEvent {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for InterruptedEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// `turn.complete` event — the service finished one full exchange.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TurnCompleteEvent {}

impl TurnCompleteEvent {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for TurnCompleteEvent {
    fn default() -> Self {
        Self::new()
    }
}
