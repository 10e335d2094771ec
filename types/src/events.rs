pub mod client;
pub mod server;

use client::*;
use server::*;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "setup")]
    Setup(SetupEvent),
    #[serde(rename = "audio.append")]
    AudioAppend(AudioAppendEvent),
    #[serde(rename = "tool.response")]
    ToolResponse(ToolResponseEvent),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "close")]
    Close { reason: Option<String> },
    #[serde(rename = "error")]
    Error(ErrorEvent),
    #[serde(rename = "setup.complete")]
    SetupComplete(SetupCompleteEvent),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallEvent),
    #[serde(rename = "audio.delta")]
    AudioDelta(AudioDeltaEvent),
    #[serde(rename = "transcription.input")]
    InputTranscription(TranscriptionEvent),
    #[serde(rename = "transcription.output")]
    OutputTranscription(TranscriptionEvent),
    #[serde(rename = "interrupted")]
    Interrupted(InterruptedEvent),
    #[serde(rename = "turn.complete")]
    TurnComplete(TurnCompleteEvent),
}
