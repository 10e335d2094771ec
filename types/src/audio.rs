/// Audio data encoded as base64 PCM16 little-endian
pub type Base64EncodedAudioBytes = String;

/// Sample rate of microphone audio sent to the live session.
pub const INPUT_SAMPLE_RATE: f64 = 16000.0;

/// Sample rate of audio produced by the live session.
pub const OUTPUT_SAMPLE_RATE: f64 = 24000.0;

/// Prebuilt voices the live session can respond with.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Voice {
    #[serde(rename = "Zephyr")]
    Zephyr,
    #[serde(rename = "Kore")]
    Kore,
    #[serde(rename = "Puck")]
    Puck,
    #[serde(rename = "Charon")]
    Charon,
    #[serde(rename = "Aoede")]
    Aoede,
}

impl Voice {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Zephyr" => Some(Voice::Zephyr),
            "Kore" => Some(Voice::Kore),
            "Puck" => Some(Voice::Puck),
            "Charon" => Some(Voice::Charon),
            "Aoede" => Some(Voice::Aoede),
            _ => None,
        }
    }
}
