/// Externally visible states of the companion. Exactly one is current at
/// any time; transitions are owned by the session orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RioState {
    Idle,
    Listening,
    Thinking,
    Speaking,
    Loading,
    Error,
    EnteringDeepSleep,
    AlarmRinging,
    Happy,
    Sad,
    Angry,
    Confused,
}

impl RioState {
    /// States in which voice input stays locked behind the wake word.
    pub fn requires_wake_word(&self) -> bool {
        matches!(self, RioState::Idle | RioState::EnteringDeepSleep)
    }

    pub fn is_emotion(&self) -> bool {
        matches!(
            self,
            RioState::Happy | RioState::Sad | RioState::Angry | RioState::Confused
        )
    }
}

/// Splits a leading emotion tag off the model's output text.
///
/// Recognized tags are `[HAPPY] [SAD] [ANGRY] [CONFUSED] [NORMAL]`.
/// `[NORMAL]` is stripped but requests no overlay. Anything else is not a
/// tag: the text is returned untouched so malformed output still reaches
/// the user.
pub fn split_emotion_tag(text: &str) -> (Option<RioState>, String) {
    let Some(rest) = text.strip_prefix('[') else {
        return (None, text.to_string());
    };
    let Some(end) = rest.find(']') else {
        return (None, text.to_string());
    };
    let overlay = match &rest[..end] {
        "HAPPY" => Some(RioState::Happy),
        "SAD" => Some(RioState::Sad),
        "ANGRY" => Some(RioState::Angry),
        "CONFUSED" => Some(RioState::Confused),
        "NORMAL" => None,
        _ => return (None, text.to_string()),
    };
    (overlay, rest[end + 1..].trim_start().to_string())
}

/// Who the companion is talking to, and what it calls itself.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub gender: String,
    pub rio_name: Option<String>,
    pub wake_word: Option<String>,
    pub voice: Option<String>,
}

impl UserProfile {
    pub fn rio_name(&self) -> String {
        self.rio_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "Rio".to_string())
    }

    /// The phrase that unlocks a gated session, lowercased for matching.
    pub fn wake_phrase(&self) -> String {
        match &self.wake_word {
            Some(word) if !word.trim().is_empty() => word.trim().to_lowercase(),
            _ => format!("{} ơi", self.rio_name().to_lowercase()),
        }
    }

    pub fn voice_name(&self) -> String {
        self.voice
            .clone()
            .filter(|voice| !voice.trim().is_empty())
            .unwrap_or_else(|| "Zephyr".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_wake_word_only_when_resting() {
        assert!(RioState::Idle.requires_wake_word());
        assert!(RioState::EnteringDeepSleep.requires_wake_word());
        assert!(!RioState::Listening.requires_wake_word());
        assert!(!RioState::Speaking.requires_wake_word());
        assert!(!RioState::AlarmRinging.requires_wake_word());
    }

    #[test]
    fn emotion_tag_is_split_and_stripped() {
        let (overlay, text) = split_emotion_tag("[HAPPY] Tuyệt vời!");
        assert_eq!(overlay, Some(RioState::Happy));
        assert_eq!(text, "Tuyệt vời!");
    }

    #[test]
    fn normal_tag_is_stripped_without_overlay() {
        let (overlay, text) = split_emotion_tag("[NORMAL] Chào bạn.");
        assert_eq!(overlay, None);
        assert_eq!(text, "Chào bạn.");
    }

    #[test]
    fn unknown_tag_is_left_in_place() {
        let (overlay, text) = split_emotion_tag("[EXCITED] Xin chào!");
        assert_eq!(overlay, None);
        assert_eq!(text, "[EXCITED] Xin chào!");
    }

    #[test]
    fn untagged_text_passes_through() {
        let (overlay, text) = split_emotion_tag("Không có tag nào cả.");
        assert_eq!(overlay, None);
        assert_eq!(text, "Không có tag nào cả.");
    }

    #[test]
    fn profile_defaults_follow_rio_name() {
        let profile = UserProfile {
            name: "Minh".to_string(),
            gender: "nam".to_string(),
            rio_name: None,
            wake_word: None,
            voice: None,
        };
        assert_eq!(profile.rio_name(), "Rio");
        assert_eq!(profile.wake_phrase(), "rio ơi");
        assert_eq!(profile.voice_name(), "Zephyr");
    }

    #[test]
    fn custom_wake_word_is_lowercased() {
        let profile = UserProfile {
            name: "Minh".to_string(),
            gender: "nam".to_string(),
            rio_name: Some("Bông".to_string()),
            wake_word: Some("  Bông Ơi  ".to_string()),
            voice: Some("Kore".to_string()),
        };
        assert_eq!(profile.wake_phrase(), "bông ơi");
        assert_eq!(profile.voice_name(), "Kore");
    }
}
