//! Energy-based voice activity detection used for utterance segmentation.

/// State change reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    SpeechStarted,
    SpeechEnded,
}

/// RMS-energy detector with silent-frame hysteresis over 16-bit PCM frames.
pub struct EnergyVad {
    /// RMS threshold above which a frame counts as speech.
    threshold: f64,
    /// Consecutive silent frames required before declaring the utterance over.
    hang_frames: usize,
    active: bool,
    silent_frames: usize,
}

impl EnergyVad {
    pub fn new(threshold: f64, hang_frames: usize) -> Self {
        Self {
            threshold,
            hang_frames,
            active: false,
            silent_frames: 0,
        }
    }

    /// Defaults tuned for 16kHz audio in 20ms frames: ~300ms of trailing
    /// silence ends the utterance.
    pub fn default_16khz() -> Self {
        Self::new(300.0, 15)
    }

    /// RMS energy of one PCM frame.
    pub fn rms(samples: &[i16]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    /// Advance the detector by one frame, reporting a state change if any.
    pub fn advance(&mut self, frame: &[i16]) -> Option<VadEvent> {
        let speaking = Self::rms(frame) > self.threshold;

        if speaking {
            self.silent_frames = 0;
            if !self.active {
                self.active = true;
                return Some(VadEvent::SpeechStarted);
            }
        } else if self.active {
            self.silent_frames += 1;
            if self.silent_frames >= self.hang_frames {
                self.active = false;
                self.silent_frames = 0;
                return Some(VadEvent::SpeechEnded);
            }
        }

        None
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.silent_frames = 0;
    }
}
