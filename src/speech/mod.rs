//! Speech output queue
//!
//! All spoken output goes through one worker thread that owns the
//! synthesizer. Producers (command handlers, the listening loop, the shell)
//! hold a cloneable [`SpeechHandle`] and never block.
//!
//! Thread Safety:
//! The synthesizer is moved into the worker and only touched there.
//! Communication happens via an unbounded crossbeam channel.

pub mod system;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::transcript::TranscriptSink;
use crate::worker::Worker;

pub use system::{SilentVoice, SystemVoice};

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("No speech program found (tried: {0})")]
    ProgramNotFound(String),

    #[error("Speech program exited with {0}")]
    ProgramFailed(String),

    #[error("Speech engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Text-to-speech engine driven by the speech worker
///
/// `speak` blocks until the text has been rendered. After a failure the
/// worker calls `reinitialize` before the next item.
pub trait SpeechSynthesizer: Send {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError>;

    fn reinitialize(&mut self) -> Result<(), SpeechError>;

    fn name(&self) -> &str {
        "synthesizer"
    }
}

impl SpeechSynthesizer for Box<dyn SpeechSynthesizer> {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        (**self).speak(text)
    }

    fn reinitialize(&mut self) -> Result<(), SpeechError> {
        (**self).reinitialize()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Speech output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// When false, nothing is played (transcript still shows the text)
    pub enabled: bool,
    /// Speaking rate in words per minute
    pub rate_wpm: u32,
    /// Explicit voice name for the speech program
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Pick a female voice when no explicit voice is set
    #[serde(default = "default_prefer_female")]
    pub prefer_female: bool,
    /// Override the speech program (e.g. "espeak-ng", "say")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
}

fn default_prefer_female() -> bool {
    true
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_wpm: 150,
            voice: None,
            prefer_female: true,
            program: None,
        }
    }
}

enum SpeechJob {
    Say {
        text: String,
        done: Option<Sender<()>>,
    },
    /// Acknowledged once everything queued before it has played
    Drain(Sender<()>),
    Stop,
}

/// Producer side of the speech queue
#[derive(Clone)]
pub struct SpeechHandle {
    tx: Sender<SpeechJob>,
    accepting: Arc<AtomicBool>,
}

impl SpeechHandle {
    /// Queue `text` for speaking. Blank text is ignored; after shutdown the
    /// call is accepted and dropped.
    pub fn enqueue(&self, text: impl AsRef<str>) {
        let _ = self.submit(text.as_ref(), None);
    }

    /// Queue `text` and wait up to `timeout` for it to finish playing.
    ///
    /// Returns false on timeout, after shutdown, or for blank text.
    pub fn say_and_wait(&self, text: impl AsRef<str>, timeout: Duration) -> bool {
        let (done_tx, done_rx) = bounded::<()>(1);
        if !self.submit(text.as_ref(), Some(done_tx)) {
            return false;
        }
        done_rx.recv_timeout(timeout).is_ok()
    }

    /// Wait up to `timeout` until everything queued so far has played.
    ///
    /// Returns false on timeout or after shutdown.
    pub fn drain(&self, timeout: Duration) -> bool {
        if !self.is_accepting() {
            return false;
        }
        let (done_tx, done_rx) = bounded::<()>(1);
        if self.tx.send(SpeechJob::Drain(done_tx)).is_err() {
            return false;
        }
        done_rx.recv_timeout(timeout).is_ok()
    }

    /// False once the queue has been shut down
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    fn submit(&self, text: &str, done: Option<Sender<()>>) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        if !self.is_accepting() {
            log::debug!("Speech queue closed, dropping: {}", text);
            return false;
        }

        self.tx
            .send(SpeechJob::Say {
                text: text.to_string(),
                done,
            })
            .is_ok()
    }
}

/// Queue with no worker; lets tests read what producers submitted
#[cfg(test)]
pub(crate) struct SpeechCapture(Receiver<SpeechJob>);

#[cfg(test)]
impl SpeechCapture {
    pub(crate) fn new() -> (SpeechHandle, Self) {
        let (tx, rx) = unbounded();
        let handle = SpeechHandle {
            tx,
            accepting: Arc::new(AtomicBool::new(true)),
        };
        (handle, Self(rx))
    }

    /// Texts submitted since the last call
    pub(crate) fn texts(&self) -> Vec<String> {
        self.0
            .try_iter()
            .filter_map(|job| match job {
                SpeechJob::Say { text, .. } => Some(text),
                SpeechJob::Drain(_) | SpeechJob::Stop => None,
            })
            .collect()
    }
}

/// Owner of the speech worker thread
pub struct SpeechQueue {
    handle: SpeechHandle,
    worker: Option<Worker>,
}

impl SpeechQueue {
    /// Start the speech worker with the given synthesizer
    pub fn start<S>(synth: S, transcript: Arc<dyn TranscriptSink>) -> anyhow::Result<Self>
    where
        S: SpeechSynthesizer + 'static,
    {
        log::info!("Starting speech worker ({})", synth.name());

        let (tx, rx) = unbounded::<SpeechJob>();
        let accepting = Arc::new(AtomicBool::new(true));
        let worker_accepting = Arc::clone(&accepting);

        let worker = Worker::spawn("speech-worker", move || {
            run_speech_worker(synth, rx, worker_accepting, transcript);
        })?;

        log::info!("✓ Speech worker started");

        Ok(Self {
            handle: SpeechHandle { tx, accepting },
            worker: Some(worker),
        })
    }

    /// Cloneable producer handle
    pub fn handle(&self) -> SpeechHandle {
        self.handle.clone()
    }

    pub fn enqueue(&self, text: impl AsRef<str>) {
        self.handle.enqueue(text);
    }

    /// Stop accepting work, let the current item finish, abandon the rest,
    /// and join the worker for at most `timeout`. Safe to call repeatedly.
    pub fn shutdown(&mut self, timeout: Duration) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        log::info!("Stopping speech worker...");
        self.handle.accepting.store(false, Ordering::SeqCst);
        // Wakes the worker if it is idle; ignored if it already exited
        let _ = self.handle.tx.send(SpeechJob::Stop);

        if worker.join_timeout(timeout) {
            log::info!("✓ Speech worker stopped");
        } else {
            log::warn!("Speech worker still busy after {:?}, continuing shutdown", timeout);
        }
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(500));
    }
}

fn run_speech_worker<S: SpeechSynthesizer>(
    mut synth: S,
    rx: Receiver<SpeechJob>,
    accepting: Arc<AtomicBool>,
    transcript: Arc<dyn TranscriptSink>,
) {
    let mut spoken = 0u64;

    for job in rx.iter() {
        let (text, done) = match job {
            SpeechJob::Say { text, done } => (text, done),
            SpeechJob::Drain(done) => {
                if accepting.load(Ordering::SeqCst) {
                    let _ = done.send(());
                }
                continue;
            }
            SpeechJob::Stop => break,
        };

        if !accepting.load(Ordering::SeqCst) {
            break;
        }

        transcript.on_utterance(&text, false);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| synth.speak(&text)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("synthesizer panicked".to_string()),
        };

        if let Some(reason) = failure {
            log::error!("Speech failed for '{}': {}", text, reason);
            match panic::catch_unwind(AssertUnwindSafe(|| synth.reinitialize())) {
                Ok(Ok(())) => log::info!("Speech engine reinitialized"),
                Ok(Err(e)) => log::warn!("Speech engine reinitialization failed: {}", e),
                Err(_) => log::warn!("Speech engine panicked during reinitialization"),
            }
        }

        spoken += 1;
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    let abandoned = rx.try_iter().count();
    log::debug!(
        "Speech worker exiting: {} items handled, {} abandoned",
        spoken,
        abandoned
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingVoice, VoiceScript};
    use crate::testing::MemoryTranscript;
    use std::thread;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(2);

    fn start_queue(voice: RecordingVoice) -> (SpeechQueue, Arc<MemoryTranscript>) {
        let transcript = Arc::new(MemoryTranscript::new());
        let queue = SpeechQueue::start(voice, transcript.clone()).unwrap();
        (queue, transcript)
    }

    #[test]
    fn test_fifo_from_one_thread() {
        let voice = RecordingVoice::new();
        let spoken = voice.spoken();
        let (mut queue, _) = start_queue(voice);

        let handle = queue.handle();
        handle.enqueue("A");
        handle.enqueue("B");
        assert!(handle.say_and_wait("C", WAIT));

        assert_eq!(spoken.lines(), vec!["A", "B", "C"]);
        queue.shutdown(WAIT);
    }

    #[test]
    fn test_fifo_across_threads_with_external_order() {
        let voice = RecordingVoice::new();
        let spoken = voice.spoken();
        let (mut queue, _) = start_queue(voice);

        let first = queue.handle();
        thread::spawn(move || first.enqueue("A")).join().unwrap();
        let second = queue.handle();
        thread::spawn(move || second.enqueue("B")).join().unwrap();

        assert!(queue.handle().say_and_wait("end", WAIT));
        assert_eq!(spoken.lines(), vec!["A", "B", "end"]);
        queue.shutdown(WAIT);
    }

    #[test]
    fn test_blank_text_is_ignored() {
        let voice = RecordingVoice::new();
        let spoken = voice.spoken();
        let (mut queue, transcript) = start_queue(voice);

        queue.enqueue("");
        queue.enqueue("   \t ");
        assert!(!queue.handle().say_and_wait("  ", WAIT));
        assert!(queue.handle().say_and_wait("  trimmed  ", WAIT));

        assert_eq!(spoken.lines(), vec!["trimmed"]);
        assert_eq!(transcript.lines().len(), 1);
        queue.shutdown(WAIT);
    }

    #[test]
    fn test_transcript_sees_assistant_lines() {
        let (mut queue, transcript) = start_queue(RecordingVoice::new());
        assert!(queue.handle().say_and_wait("Opening youtube", WAIT));

        let lines = transcript.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Opening youtube");
        assert!(!lines[0].from_user);
        queue.shutdown(WAIT);
    }

    #[test]
    fn test_failure_reinitializes_and_continues() {
        let voice = RecordingVoice::with_script(VoiceScript::FailOn("bad".to_string()));
        let spoken = voice.spoken();
        let reinits = voice.reinit_count();
        let (mut queue, _) = start_queue(voice);

        queue.enqueue("before");
        queue.enqueue("bad");
        assert!(queue.handle().say_and_wait("after", WAIT));

        assert_eq!(spoken.lines(), vec!["before", "after"]);
        assert_eq!(reinits.get(), 1);
        queue.shutdown(WAIT);
    }

    #[test]
    fn test_panicking_synth_does_not_kill_worker() {
        let voice = RecordingVoice::with_script(VoiceScript::PanicOn("boom".to_string()));
        let spoken = voice.spoken();
        let (mut queue, _) = start_queue(voice);

        queue.enqueue("boom");
        assert!(queue.handle().say_and_wait("still here", WAIT));
        assert_eq!(spoken.lines(), vec!["still here"]);
        queue.shutdown(WAIT);
    }

    #[test]
    fn test_no_audio_after_shutdown() {
        let voice = RecordingVoice::new();
        let spoken = voice.spoken();
        let (mut queue, _) = start_queue(voice);
        let handle = queue.handle();

        assert!(handle.say_and_wait("last words", WAIT));
        queue.shutdown(WAIT);

        handle.enqueue("too late");
        assert!(!handle.say_and_wait("also too late", Duration::from_millis(50)));
        thread::sleep(Duration::from_millis(50));

        assert_eq!(spoken.lines(), vec!["last words"]);
        assert!(!handle.is_accepting());
    }

    #[test]
    fn test_shutdown_finishes_current_item_and_drops_backlog() {
        let voice = RecordingVoice::with_script(VoiceScript::Delay(Duration::from_millis(200)));
        let spoken = voice.spoken();
        let (mut queue, _) = start_queue(voice);

        queue.enqueue("current");
        // Give the worker time to pick up the first item
        let deadline = Instant::now() + WAIT;
        while spoken.started() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        queue.enqueue("queued one");
        queue.enqueue("queued two");

        queue.shutdown(WAIT);
        assert_eq!(spoken.lines(), vec!["current"]);
    }

    #[test]
    fn test_shutdown_is_bounded_when_synth_hangs() {
        let voice = RecordingVoice::with_script(VoiceScript::Delay(Duration::from_secs(3)));
        let (mut queue, _) = start_queue(voice);

        queue.enqueue("a very long sentence");
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        queue.shutdown(Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_drain_waits_for_queued_items() {
        let voice = RecordingVoice::with_script(VoiceScript::Delay(Duration::from_millis(30)));
        let spoken = voice.spoken();
        let (mut queue, _) = start_queue(voice);
        let handle = queue.handle();

        handle.enqueue("one");
        handle.enqueue("two");
        handle.enqueue("three");
        assert!(handle.drain(WAIT));
        assert_eq!(spoken.lines(), vec!["one", "two", "three"]);

        // Nothing queued: returns right away
        assert!(handle.drain(WAIT));
        queue.shutdown(WAIT);
        assert!(!handle.drain(Duration::from_millis(50)));
    }

    #[test]
    fn test_drain_times_out_on_long_item() {
        let voice = RecordingVoice::with_script(VoiceScript::Delay(Duration::from_millis(500)));
        let (mut queue, _) = start_queue(voice);
        let handle = queue.handle();

        handle.enqueue("a long reply");
        assert!(!handle.drain(Duration::from_millis(50)));
        queue.shutdown(WAIT);
    }

    #[test]
    fn test_shutdown_twice_is_harmless() {
        let (mut queue, _) = start_queue(RecordingVoice::new());
        queue.shutdown(WAIT);
        queue.shutdown(WAIT);
        queue.enqueue("ignored");
    }
}
