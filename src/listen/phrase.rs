//! Energy-based phrase detection
//!
//! Pure sample bookkeeping, independent of the audio device: calibrate a
//! threshold from ambient noise, then feed frames until a phrase has started
//! and ended (trailing silence) or hit the length cap.

use std::collections::VecDeque;
use std::time::Duration;

/// Root-mean-square level of mono f32 samples (0.0 for an empty frame)
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum = frame.iter().map(|x| x * x).sum::<f32>();
    (sum / frame.len() as f32).sqrt()
}

/// Speech threshold from an ambient recording
pub fn ambient_threshold(ambient: &[f32], ratio: f32, floor: f32) -> f32 {
    (rms(ambient) * ratio).max(floor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseState {
    /// No speech yet
    Waiting,
    /// Speech in progress
    Speaking,
    /// Trailing silence seen or length cap reached
    Finished,
}

/// Tracks one phrase across fed frames
pub struct PhraseDetector {
    threshold: f32,
    silence_samples: usize,
    max_samples: usize,
    preroll: VecDeque<f32>,
    preroll_samples: usize,
    recorded: Vec<f32>,
    quiet_run: usize,
    state: PhraseState,
}

impl PhraseDetector {
    pub fn new(
        threshold: f32,
        sample_rate: u32,
        silence: Duration,
        max_phrase: Duration,
        preroll: Duration,
    ) -> Self {
        let to_samples = |d: Duration| (d.as_secs_f64() * sample_rate as f64) as usize;
        Self {
            threshold,
            silence_samples: to_samples(silence).max(1),
            max_samples: to_samples(max_phrase).max(1),
            preroll: VecDeque::new(),
            preroll_samples: to_samples(preroll),
            recorded: Vec::new(),
            quiet_run: 0,
            state: PhraseState::Waiting,
        }
    }

    pub fn state(&self) -> PhraseState {
        self.state
    }

    /// Feed one frame of mono samples and return the new state
    pub fn feed(&mut self, frame: &[f32]) -> PhraseState {
        let loud = rms(frame) > self.threshold;

        match self.state {
            PhraseState::Waiting => {
                if loud {
                    self.recorded.extend(self.preroll.drain(..));
                    self.recorded.extend_from_slice(frame);
                    self.state = PhraseState::Speaking;
                } else {
                    self.preroll.extend(frame.iter().copied());
                    while self.preroll.len() > self.preroll_samples {
                        self.preroll.pop_front();
                    }
                }
            }
            PhraseState::Speaking => {
                self.recorded.extend_from_slice(frame);
                if loud {
                    self.quiet_run = 0;
                } else {
                    self.quiet_run += frame.len();
                }

                if self.quiet_run >= self.silence_samples || self.recorded.len() >= self.max_samples
                {
                    self.recorded.truncate(self.max_samples);
                    self.state = PhraseState::Finished;
                }
            }
            PhraseState::Finished => {}
        }

        self.state
    }

    /// Samples of the phrase so far (including pre-roll)
    pub fn into_samples(self) -> Vec<f32> {
        self.recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1000;

    fn detector() -> PhraseDetector {
        PhraseDetector::new(
            0.1,
            RATE,
            Duration::from_millis(100),
            Duration::from_millis(500),
            Duration::from_millis(20),
        )
    }

    fn frame(level: f32) -> Vec<f32> {
        vec![level; 10] // 10ms @ 1kHz
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_ambient_threshold_respects_floor() {
        assert_eq!(ambient_threshold(&[0.0; 100], 1.5, 0.01), 0.01);
        assert!((ambient_threshold(&[0.2; 100], 1.5, 0.01) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_quiet_input_keeps_waiting() {
        let mut d = detector();
        for _ in 0..100 {
            assert_eq!(d.feed(&frame(0.01)), PhraseState::Waiting);
        }
        assert!(d.into_samples().is_empty());
    }

    #[test]
    fn test_phrase_ends_after_trailing_silence() {
        let mut d = detector();
        d.feed(&frame(0.0));
        assert_eq!(d.feed(&frame(0.5)), PhraseState::Speaking);
        for _ in 0..5 {
            d.feed(&frame(0.5));
        }
        for _ in 0..9 {
            assert_eq!(d.feed(&frame(0.0)), PhraseState::Speaking);
        }
        assert_eq!(d.feed(&frame(0.0)), PhraseState::Finished);

        // 10 pre-roll + 60 speech + 100 silence
        assert_eq!(d.into_samples().len(), 170);
    }

    #[test]
    fn test_phrase_is_capped() {
        let mut d = detector();
        let mut state = PhraseState::Waiting;
        for _ in 0..100 {
            state = d.feed(&frame(0.9));
            if state == PhraseState::Finished {
                break;
            }
        }
        assert_eq!(state, PhraseState::Finished);
        assert_eq!(d.into_samples().len(), 500);
    }

    #[test]
    fn test_preroll_is_bounded() {
        let mut d = detector();
        for _ in 0..50 {
            d.feed(&frame(0.0));
        }
        d.feed(&frame(0.5));
        // 20ms pre-roll + 10ms loud frame
        assert_eq!(d.into_samples().len(), 30);
    }
}
