//! Speech input - one capture-and-transcribe attempt per call
//!
//! This module provides utterance capture using either:
//! - Microphone (mic feature, default): cpal capture, energy-gated phrase
//!   detection, HTTP transcription
//! - Console: typed lines stand in for recognized speech (text mode)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod cloud;
pub mod console;
pub mod phrase;

cfg_if::cfg_if! {
    if #[cfg(feature = "mic")] {
        pub mod capture;
    }
}

pub use cloud::{CloudTranscriber, TranscriptionConfig};
pub use console::ConsoleInput;

/// Why a capture attempt produced no text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Nobody started speaking before the start timeout
    #[error("No speech before timeout")]
    Timeout,

    /// Audio was captured but could not be turned into words
    #[error("Speech was not intelligible")]
    Unintelligible,

    /// The recognition backend could not be reached or refused the request
    #[error("Recognition service error: {0}")]
    Service(String),

    /// The input device is gone or unusable; listening cannot continue
    #[error("Audio input error: {0}")]
    Device(String),
}

impl RecognitionError {
    /// Expected conditions that simply yield an empty utterance
    pub fn is_empty_result(&self) -> bool {
        matches!(self, RecognitionError::Timeout | RecognitionError::Unintelligible)
    }
}

/// Timing bounds for one capture attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureWindow {
    /// Time spent measuring background noise before listening
    pub ambient: Duration,
    /// How long to wait for speech to begin
    pub start_timeout: Duration,
    /// Upper bound on the length of one phrase
    pub max_phrase: Duration,
}

/// Source of recognized utterances
///
/// Implementations block for at most roughly
/// `ambient + start_timeout + max_phrase` plus transcription time.
pub trait AudioInput: Send + Sync {
    fn capture_utterance(&self, window: &CaptureWindow) -> Result<String, RecognitionError>;

    /// Called when a new listening session starts. Input that arrived while
    /// nobody was listening must not be reported to the new session.
    fn begin_session(&self) {}
}

/// Which input backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Microphone,
    Console,
}

/// Listening configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    pub mode: InputMode,
    pub ambient_calibration_secs: f32,
    pub phrase_start_timeout_secs: f32,
    pub max_phrase_secs: f32,
    /// Speech must be this many times louder than the measured ambient level
    pub energy_ratio: f32,
    /// Absolute RMS floor for speech, used in very quiet rooms
    pub min_energy: f32,
    /// Trailing silence that ends a phrase
    pub silence_ms: u32,
    /// Audio kept from just before speech was detected
    pub preroll_ms: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            mode: InputMode::Microphone,
            ambient_calibration_secs: 1.0,
            phrase_start_timeout_secs: 5.0,
            max_phrase_secs: 10.0,
            energy_ratio: 1.5,
            min_energy: 0.01,
            silence_ms: 800,
            preroll_ms: 300,
            device_name: None,
            transcription: TranscriptionConfig::default(),
        }
    }
}

impl ListenConfig {
    pub fn window(&self) -> CaptureWindow {
        CaptureWindow {
            ambient: secs(self.ambient_calibration_secs),
            start_timeout: secs(self.phrase_start_timeout_secs),
            max_phrase: secs(self.max_phrase_secs),
        }
    }
}

fn secs(value: f32) -> Duration {
    Duration::from_secs_f32(value.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_config_window() {
        let window = ListenConfig::default().window();
        assert_eq!(window.ambient, Duration::from_secs(1));
        assert_eq!(window.start_timeout, Duration::from_secs(5));
        assert_eq!(window.max_phrase, Duration::from_secs(10));
    }

    #[test]
    fn test_empty_result_classification() {
        assert!(RecognitionError::Timeout.is_empty_result());
        assert!(RecognitionError::Unintelligible.is_empty_result());
        assert!(!RecognitionError::Service("down".into()).is_empty_result());
        assert!(!RecognitionError::Device("unplugged".into()).is_empty_result());
    }
}
