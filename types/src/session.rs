use crate::audio::Voice;
use crate::tools::{Tool, ToolChoice};

/// Configuration declared when a live session is opened. Mirrors the wire
/// shape of the `setup` client event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionConfig {
    /// The system instruction prepended to the whole session.
    system_instruction: Option<String>,

    /// The set of modalities the model responds with. Audio-only for a
    /// voice companion.
    response_modalities: Vec<String>,

    /// The voice the model speaks with. Cannot change mid-session.
    voice: Option<Voice>,

    /// Whether the service streams partial transcripts of the user's audio.
    input_audio_transcription: bool,

    /// Whether the service streams partial transcripts of its own audio.
    output_audio_transcription: bool,

    /// Tools(Functions) available to the model.
    tools: Vec<Tool>,

    /// How the model chooses tools.
    tool_choice: Option<ToolChoice>,
}

pub struct SessionConfigurator {
    config: SessionConfig,
}

impl SessionConfigurator {
    pub fn new() -> Self {
        Self {
            config: SessionConfig {
                system_instruction: None,
                response_modalities: vec!["audio".to_string()],
                voice: None,
                input_audio_transcription: false,
                output_audio_transcription: false,
                tools: vec![],
                tool_choice: Some(ToolChoice::Auto),
            },
        }
    }

    pub fn with_system_instruction(mut self, instruction: &str) -> Self {
        self.config.system_instruction = Some(instruction.to_string());
        self
    }

    pub fn with_response_modalities(mut self, modalities: Vec<String>) -> Self {
        self.config.response_modalities = modalities;
        self
    }

    pub fn with_modalities_audio_only(mut self) -> Self {
        self.config.response_modalities = vec!["audio".to_string()];
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.config.voice = Some(voice);
        self
    }

    pub fn with_input_audio_transcription_enable(mut self) -> Self {
        self.config.input_audio_transcription = true;
        self
    }

    pub fn with_output_audio_transcription_enable(mut self) -> Self {
        self.config.output_audio_transcription = true;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.config.tool_choice = Some(tool_choice);
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

impl Default for SessionConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigurator {
        SessionConfigurator::new()
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    pub fn voice(&self) -> Option<&Voice> {
        self.voice.as_ref()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }
}
