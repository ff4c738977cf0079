//! Listening state machine, the listening loop, and teardown
//!
//! The loop runs on its own thread and owns nothing but an `Arc<Shared>`.
//! Every session gets a generation number; a loop whose generation is no
//! longer current (stop, restart, shutdown) exits at its next check instead
//! of running alongside a newer one.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::commands::{normalize, CommandContext, CommandTable, Resources};
use crate::launcher::ResourceLauncher;
use crate::listen::{AudioInput, CaptureWindow, RecognitionError};
use crate::speech::{SpeechHandle, SpeechQueue};
use crate::transcript::TranscriptSink;
use crate::validation;
use crate::weather::WeatherService;
use crate::worker::Worker;

pub const STARTUP_GREETING: &str =
    "Hello! I am ZILNOVA, your personal AI assistant. Starting up...";
pub const LISTENING_PROMPT: &str = "I'm listening. How can I help you?";
pub const PAUSE_NOTICE: &str = "Voice recognition paused. Enter start in the terminal when you need me!";
pub const FAREWELL: &str = "Goodbye! ZILNOVA powering down.";
pub const SERVICE_NOTICE: &str = "I'm having trouble connecting to my speech service.";
pub const RECOGNITION_FAILED: &str =
    "I encountered an error with voice recognition. Please try again.";

pub const STATUS_READY: &str = "Ready";
pub const STATUS_LISTENING: &str = "Listening...";
pub const STATUS_SHUTTING_DOWN: &str = "Shutting down";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningState {
    Idle,
    Listening,
    ShuttingDown,
}

/// Loop and lifecycle tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Pause between handling one utterance and listening again
    pub debounce_ms: u64,
    /// Consecutive empty listens before listening pauses itself
    pub empty_threshold: u32,
    /// Minimum gap between two "trouble connecting" notices
    pub service_notice_cooldown_secs: u64,
    /// Whole words (or word sequences) that end the session
    pub exit_phrases: Vec<String>,
    pub loop_join_timeout_secs: f32,
    pub speech_join_timeout_secs: f32,
    /// Longest wait for the farewell, the listening prompt, or a reply to
    /// finish playing before the loop moves on
    pub farewell_wait_secs: f32,
    /// Start listening right after the startup greeting
    pub autostart: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            empty_threshold: 5,
            service_notice_cooldown_secs: 30,
            exit_phrases: ["exit", "quit", "bye", "goodbye"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            loop_join_timeout_secs: 3.0,
            speech_join_timeout_secs: 3.0,
            farewell_wait_secs: 5.0,
            autostart: true,
        }
    }
}

impl AssistantConfig {
    pub fn validate(&self) -> Result<(), validation::ValidationError> {
        validation::validate_debounce_ms(self.debounce_ms)?;
        validation::validate_empty_threshold(self.empty_threshold)?;
        validation::validate_exit_phrases(&self.exit_phrases)?;
        validation::validate_timeout_secs("loop_join_timeout_secs", self.loop_join_timeout_secs)?;
        validation::validate_timeout_secs("speech_join_timeout_secs", self.speech_join_timeout_secs)?;
        validation::validate_timeout_secs("farewell_wait_secs", self.farewell_wait_secs)?;
        Ok(())
    }

    fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    fn service_cooldown(&self) -> Duration {
        Duration::from_secs(self.service_notice_cooldown_secs)
    }
}

fn secs(value: f32) -> Duration {
    Duration::from_secs_f32(value.max(0.0))
}

/// True if one of `phrases` occurs in `utterance` as whole words
pub fn is_exit_phrase(utterance: &str, phrases: &[String]) -> bool {
    let heard = words(utterance);
    phrases.iter().any(|phrase| {
        let target = words(phrase);
        !target.is_empty() && heard.windows(target.len()).any(|w| w == target.as_slice())
    })
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Collaborators the assistant drives
pub struct Collaborators {
    pub input: Arc<dyn AudioInput>,
    pub launcher: Arc<dyn ResourceLauncher>,
    pub weather: Arc<dyn WeatherService>,
    pub transcript: Arc<dyn TranscriptSink>,
}

struct Session {
    state: ListeningState,
    generation: u64,
}

type TerminateFn = Box<dyn FnOnce() + Send>;

struct Shared {
    session: Mutex<Session>,
    speech: SpeechHandle,
    table: CommandTable,
    resources: Resources,
    parts: Collaborators,
    config: AssistantConfig,
    window: CaptureWindow,
    last_service_notice: Mutex<Option<Instant>>,
    on_terminate: Mutex<Option<TerminateFn>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn state(&self) -> ListeningState {
        lock(&self.session).state
    }

    fn is_current(&self, generation: u64) -> bool {
        let session = lock(&self.session);
        session.generation == generation && session.state == ListeningState::Listening
    }

    /// Move this generation's session out of Listening
    fn leave_listening(&self, generation: u64, to: ListeningState) -> bool {
        let mut session = lock(&self.session);
        if session.generation != generation || session.state != ListeningState::Listening {
            return false;
        }
        session.state = to;
        session.generation += 1;
        true
    }

    /// One capture attempt. `Err` only for failures that end listening.
    fn listen(&self) -> Result<String, RecognitionError> {
        match self.parts.input.capture_utterance(&self.window) {
            Ok(text) => Ok(normalize(&text)),
            Err(e) if e.is_empty_result() => {
                log::trace!("Empty listen: {}", e);
                Ok(String::new())
            }
            Err(RecognitionError::Service(reason)) => {
                log::warn!("Speech service error: {}", reason);
                if self.service_notice() {
                    self.wait_for_speech();
                }
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }

    fn service_notice(&self) -> bool {
        let mut last = lock(&self.last_service_notice);
        let due = (*last).map_or(true, |at| at.elapsed() >= self.config.service_cooldown());
        if due {
            *last = Some(Instant::now());
            drop(last);
            self.speech.enqueue(SERVICE_NOTICE);
        }
        due
    }

    /// Block until queued speech has played so capture never hears it
    fn wait_for_speech(&self) {
        if !self.speech.drain(secs(self.config.farewell_wait_secs)) {
            log::warn!("Speech still playing, listening anyway");
        }
    }

    fn status(&self, status: &str) {
        self.parts.transcript.on_status(status);
    }

    fn dispatch(&self, utterance: &str) {
        let ctx = CommandContext {
            speech: &self.speech,
            launcher: &*self.parts.launcher,
            weather: &*self.parts.weather,
            resources: &self.resources,
        };
        let outcome = self.table.dispatch(&ctx, utterance);
        log::debug!("Dispatch outcome: {:?}", outcome);
    }

    fn pause(&self, generation: u64, notice: &str) {
        if self.leave_listening(generation, ListeningState::Idle) {
            log::info!("Listening paused");
            self.speech.enqueue(notice);
            self.status(STATUS_READY);
        }
    }

    /// Exit phrase heard: farewell, then notify the owner
    fn exit(&self, generation: u64) {
        if !self.leave_listening(generation, ListeningState::ShuttingDown) {
            return;
        }
        log::info!("Exit phrase heard, shutting down");
        self.status(STATUS_SHUTTING_DOWN);

        if !self.speech.say_and_wait(FAREWELL, secs(self.config.farewell_wait_secs)) {
            log::warn!("Farewell did not finish playing in time");
        }

        let callback = lock(&self.on_terminate).take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

fn run_loop(shared: Arc<Shared>, generation: u64) {
    log::info!("✓ Listening loop started (session {})", generation);
    shared.parts.input.begin_session();

    if shared.is_current(generation) {
        shared
            .speech
            .say_and_wait(LISTENING_PROMPT, secs(shared.config.farewell_wait_secs));
    }

    let mut empty_streak = 0u32;
    while shared.is_current(generation) {
        let utterance = match shared.listen() {
            Ok(text) => text,
            Err(e) => {
                log::error!("Voice recognition failed: {}", e);
                shared.pause(generation, RECOGNITION_FAILED);
                break;
            }
        };

        if !shared.is_current(generation) {
            break;
        }

        if utterance.is_empty() {
            empty_streak += 1;
            if empty_streak >= shared.config.empty_threshold {
                log::info!("{} empty listens in a row", empty_streak);
                shared.pause(generation, PAUSE_NOTICE);
                break;
            }
            continue;
        }
        empty_streak = 0;

        shared.parts.transcript.on_utterance(&utterance, true);

        if is_exit_phrase(&utterance, &shared.config.exit_phrases) {
            shared.exit(generation);
            break;
        }

        shared.dispatch(&utterance);

        if !shared.is_current(generation) {
            break;
        }
        shared.wait_for_speech();
        thread::sleep(shared.config.debounce());
    }

    log::info!("Listening loop exited (session {})", generation);
}

/// The assistant: owns the speech queue and the listening loop
pub struct Assistant {
    shared: Arc<Shared>,
    speech: Mutex<Option<SpeechQueue>>,
    loop_worker: Mutex<Option<Worker>>,
    torn_down: AtomicBool,
}

impl Assistant {
    pub fn new(
        config: AssistantConfig,
        window: CaptureWindow,
        speech: SpeechQueue,
        table: CommandTable,
        resources: Resources,
        parts: Collaborators,
    ) -> Self {
        let shared = Arc::new(Shared {
            session: Mutex::new(Session {
                state: ListeningState::Idle,
                generation: 0,
            }),
            speech: speech.handle(),
            table,
            resources,
            parts,
            config,
            window,
            last_service_notice: Mutex::new(None),
            on_terminate: Mutex::new(None),
        });
        shared.status(STATUS_READY);

        Self {
            shared,
            speech: Mutex::new(Some(speech)),
            loop_worker: Mutex::new(None),
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ListeningState {
        self.shared.state()
    }

    pub fn speech(&self) -> SpeechHandle {
        self.shared.speech.clone()
    }

    /// Called once, from the listening thread, after the farewell. Must not
    /// block or call [`Assistant::shutdown`] itself.
    pub fn on_terminate(&self, callback: impl FnOnce() + Send + 'static) {
        *lock(&self.shared.on_terminate) = Some(Box::new(callback));
    }

    /// Idle → Listening and spawn the loop. False if not Idle.
    pub fn start_listening(&self) -> bool {
        let generation = {
            let mut session = lock(&self.shared.session);
            if session.state != ListeningState::Idle {
                log::debug!("start_listening ignored in {:?}", session.state);
                return false;
            }
            session.state = ListeningState::Listening;
            session.generation += 1;
            session.generation
        };

        log::info!("Starting listening (session {})", generation);
        self.shared.status(STATUS_LISTENING);

        let shared = Arc::clone(&self.shared);
        match Worker::spawn("listen-loop", move || run_loop(shared, generation)) {
            Ok(worker) => {
                // A stale loop still blocked in capture is detached here
                *lock(&self.loop_worker) = Some(worker);
                true
            }
            Err(e) => {
                log::error!("Failed to spawn listening loop: {}", e);
                self.shared.leave_listening(generation, ListeningState::Idle);
                self.shared.status(STATUS_READY);
                false
            }
        }
    }

    /// Listening → Idle with the pause notice. No-op otherwise.
    pub fn stop_listening(&self) -> bool {
        let stopped = {
            let mut session = lock(&self.shared.session);
            if session.state == ListeningState::Listening {
                session.state = ListeningState::Idle;
                session.generation += 1;
                true
            } else {
                false
            }
        };

        if stopped {
            log::info!("Listening stopped");
            self.shared.speech.enqueue(PAUSE_NOTICE);
            self.shared.status(STATUS_READY);
        }
        stopped
    }

    /// Bounded two-phase teardown: listening loop, then speech. Idempotent.
    pub fn shutdown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        log::info!("Shutting down assistant...");
        {
            let mut session = lock(&self.shared.session);
            session.state = ListeningState::ShuttingDown;
            session.generation += 1;
        }
        self.shared.status(STATUS_SHUTTING_DOWN);

        let worker = lock(&self.loop_worker).take();
        if let Some(worker) = worker {
            let timeout = secs(self.shared.config.loop_join_timeout_secs);
            if !worker.join_timeout(timeout) {
                log::warn!("Listening loop still busy, detached");
            }
        }

        let speech = lock(&self.speech).take();
        if let Some(mut speech) = speech {
            speech.shutdown(secs(self.shared.config.speech_join_timeout_secs));
        }

        log::info!("✓ Assistant shut down");
    }
}

impl Drop for Assistant {
    fn drop(&mut self) {
        self.shutdown();
    }
}
