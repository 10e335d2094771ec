use std::collections::HashSet;

#[cfg(test)]
use mockall::automock;

/// Position of the audio output clock, in seconds. The runtime backs this
/// with the playback device's sample counter.
#[cfg_attr(test, automock)]
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Schedules output chunks back to back on a monotonically advancing
/// cursor, so playback is gapless and non-overlapping even when chunks
/// arrive in bursts.
#[derive(Debug, Default)]
pub struct OutputScheduler {
    next_start_time: f64,
    next_source: u64,
    sources: HashSet<u64>,
}

impl OutputScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next playback slot for a chunk of the given duration.
    /// Returns the source id and the start position on the output clock.
    pub fn schedule(&mut self, duration: f64, now: f64) -> (u64, f64) {
        self.next_start_time = self.next_start_time.max(now);
        let start_at = self.next_start_time;
        self.next_start_time += duration;

        let source = self.next_source;
        self.next_source += 1;
        self.sources.insert(source);
        (source, start_at)
    }

    pub fn source_ended(&mut self, source: u64) {
        self.sources.remove(&source);
    }

    /// Drops every live source and rewinds the cursor. Safe to call when
    /// nothing is scheduled.
    pub fn stop_all(&mut self) -> Vec<u64> {
        self.next_start_time = 0.0;
        self.sources.drain().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}
