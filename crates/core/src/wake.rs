#[cfg(test)]
use mockall::automock;

// The offline recognizer is an external capability: the embedder hands the
// gate whatever keyword/ASR engine the platform ships. The gate only cares
// about a rolling transcript of the stream.
#[cfg_attr(test, automock)]
pub trait SpeechRecognizer: Send + Sync {
    /// Feed one chunk of mono samples into the rolling stream.
    fn accept_waveform(&mut self, sample_rate: u32, samples: &[f32]);

    /// Whether enough audio is buffered to decode a result.
    fn is_ready(&self) -> bool;

    /// The transcript recognized so far, if any.
    fn decode(&mut self) -> Option<String>;

    /// Drop the accumulated stream so the same utterance cannot match twice.
    fn reset(&mut self);
}

/// Offline wake-word gate: transcribes the gated microphone stream and
/// substring-matches the recognized text against the wake phrase.
pub struct WakeWordGate {
    phrase: String,
    sample_rate: u32,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
}

impl WakeWordGate {
    pub fn new(phrase: &str, sample_rate: u32) -> Self {
        Self {
            phrase: phrase.trim().to_lowercase(),
            sample_rate,
            recognizer: None,
        }
    }

    pub fn attach(&mut self, recognizer: Box<dyn SpeechRecognizer>) {
        tracing::info!("wake word gate armed with phrase {:?}", self.phrase);
        self.recognizer = Some(recognizer);
    }

    pub fn is_ready(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Runs one chunk through the recognizer. Returns true exactly once per
    /// detected utterance; querying before a recognizer is attached returns
    /// false without side effects.
    pub fn process_chunk(&mut self, samples: &[f32]) -> bool {
        let Some(recognizer) = self.recognizer.as_mut() else {
            return false;
        };
        if samples.is_empty() {
            return false;
        }

        recognizer.accept_waveform(self.sample_rate, samples);
        if !recognizer.is_ready() {
            return false;
        }
        let Some(text) = recognizer.decode() else {
            return false;
        };
        if text.trim().to_lowercase().contains(&self.phrase) {
            tracing::debug!("wake phrase heard in {:?}", text);
            recognizer.reset();
            return true;
        }
        false
    }

    /// Releases the recognizer. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.reset();
        }
    }
}
