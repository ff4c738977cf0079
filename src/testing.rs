//! In-memory fakes for the collaborator seams, shared by unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::launcher::{LaunchError, ResourceLauncher};
use crate::listen::{AudioInput, CaptureWindow, RecognitionError};
use crate::speech::{SpeechError, SpeechSynthesizer};
use crate::transcript::TranscriptSink;
use crate::weather::{WeatherError, WeatherReport, WeatherService};

/// Shared counter readable after the fake moved into a worker
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything a [`RecordingVoice`] rendered
#[derive(Clone, Default)]
pub struct SpokenLog {
    lines: Arc<Mutex<Vec<String>>>,
    started: Counter,
}

impl SpokenLog {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// Number of `speak` calls entered, including failed ones
    pub fn started(&self) -> usize {
        self.started.get()
    }

    pub fn count(&self, text: &str) -> usize {
        self.lines().iter().filter(|l| l.as_str() == text).count()
    }
}

#[derive(Clone)]
pub enum VoiceScript {
    Normal,
    FailOn(String),
    PanicOn(String),
    Delay(Duration),
}

/// Synthesizer that records what it was asked to say
pub struct RecordingVoice {
    script: VoiceScript,
    spoken: SpokenLog,
    reinits: Counter,
}

impl RecordingVoice {
    pub fn new() -> Self {
        Self::with_script(VoiceScript::Normal)
    }

    pub fn with_script(script: VoiceScript) -> Self {
        Self {
            script,
            spoken: SpokenLog::default(),
            reinits: Counter::default(),
        }
    }

    pub fn spoken(&self) -> SpokenLog {
        self.spoken.clone()
    }

    pub fn reinit_count(&self) -> Counter {
        self.reinits.clone()
    }
}

impl SpeechSynthesizer for RecordingVoice {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        self.spoken.started.bump();
        match self.script {
            VoiceScript::FailOn(ref bad) if bad == text => {
                return Err(SpeechError::Engine("scripted failure".to_string()));
            }
            VoiceScript::PanicOn(ref bad) if bad == text => panic!("scripted panic"),
            VoiceScript::Delay(delay) => thread::sleep(delay),
            _ => {}
        }
        self.spoken.lines.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn reinitialize(&mut self) -> Result<(), SpeechError> {
        self.reinits.bump();
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Audio input that replays a fixed script, then times out forever
pub struct ScriptedInput {
    script: Mutex<VecDeque<Result<String, RecognitionError>>>,
    calls: Counter,
}

impl ScriptedInput {
    pub fn new(script: Vec<Result<String, RecognitionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Counter::default(),
        }
    }

    pub fn said(lines: &[&str]) -> Self {
        Self::new(lines.iter().map(|l| Ok(l.to_string())).collect())
    }

    pub fn calls(&self) -> Counter {
        self.calls.clone()
    }
}

impl AudioInput for ScriptedInput {
    fn capture_utterance(&self, _window: &CaptureWindow) -> Result<String, RecognitionError> {
        self.calls.bump();
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                // Stand-in for a real capture timeout
                thread::sleep(Duration::from_millis(5));
                Err(RecognitionError::Timeout)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launched {
    Url(String),
    Executable(String),
    Folder(String),
}

/// Launcher that records requests instead of starting anything
#[derive(Clone, Default)]
pub struct RecordingLauncher {
    launched: Arc<Mutex<Vec<Launched>>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launched(&self) -> Vec<Launched> {
        self.launched.lock().unwrap().clone()
    }

    fn record(&self, item: Launched) -> Result<(), LaunchError> {
        if self.fail {
            return Err(LaunchError::NotFound(format!("{:?}", item)));
        }
        self.launched.lock().unwrap().push(item);
        Ok(())
    }
}

impl ResourceLauncher for RecordingLauncher {
    fn open_url(&self, url: &str) -> Result<(), LaunchError> {
        self.record(Launched::Url(url.to_string()))
    }

    fn launch_executable(&self, path: &str) -> Result<(), LaunchError> {
        self.record(Launched::Executable(path.to_string()))
    }

    fn open_folder(&self, path: &std::path::Path) -> Result<(), LaunchError> {
        self.record(Launched::Folder(path.display().to_string()))
    }
}

/// Weather service returning a canned answer and recording queried cities
pub struct CannedWeather {
    answer: Result<WeatherReport, WeatherError>,
    cities: Mutex<Vec<String>>,
}

impl CannedWeather {
    pub fn sunny() -> Self {
        Self {
            answer: Ok(WeatherReport {
                city: "London".to_string(),
                description: "clear sky".to_string(),
                temp_c: 21.4,
                humidity_percent: 40,
            }),
            cities: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: WeatherError) -> Self {
        Self {
            answer: Err(error),
            cities: Mutex::new(Vec::new()),
        }
    }

    pub fn cities(&self) -> Vec<String> {
        self.cities.lock().unwrap().clone()
    }
}

impl WeatherService for CannedWeather {
    fn fetch(&self, city: &str) -> Result<WeatherReport, WeatherError> {
        self.cities.lock().unwrap().push(city.to_string());
        match self.answer {
            Ok(ref report) => Ok(WeatherReport {
                city: city.to_string(),
                ..report.clone()
            }),
            Err(ref e) => Err(e.clone()),
        }
    }
}

/// One recorded transcript line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub text: String,
    pub from_user: bool,
}

/// Transcript sink that keeps everything in memory
#[derive(Default)]
pub struct MemoryTranscript {
    lines: Mutex<Vec<TranscriptLine>>,
    statuses: Mutex<Vec<String>>,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<TranscriptLine> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TranscriptSink for MemoryTranscript {
    fn on_utterance(&self, text: &str, from_user: bool) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(TranscriptLine {
                text: text.to_string(),
                from_user,
            });
    }

    fn on_status(&self, status: &str) {
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(status.to_string());
    }
}
