//! Typed input standing in for the microphone
//!
//! The shell forwards every non-command line it reads to this input, so the
//! listening loop sees typed text exactly like recognized speech. Lines typed
//! while nobody listens are dropped when the next session begins.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{AudioInput, CaptureWindow, RecognitionError};

/// How often a waiting capture checks whether its session is still current
const POLL: Duration = Duration::from_millis(50);

struct ConsoleSession {
    epoch: u64,
    /// Lines a stale capture received on behalf of the current session
    handed_over: VecDeque<String>,
}

pub struct ConsoleInput {
    rx: Receiver<String>,
    session: Mutex<ConsoleSession>,
}

impl ConsoleInput {
    /// Create the input and the sender the shell feeds lines into
    pub fn new() -> (Self, Sender<String>) {
        let (tx, rx) = unbounded();
        let input = Self {
            rx,
            session: Mutex::new(ConsoleSession {
                epoch: 0,
                handed_over: VecDeque::new(),
            }),
        };
        (input, tx)
    }

    fn session(&self) -> MutexGuard<'_, ConsoleSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accept(line: String) -> Result<String, RecognitionError> {
        if line.trim().is_empty() {
            Err(RecognitionError::Unintelligible)
        } else {
            Ok(line)
        }
    }
}

impl AudioInput for ConsoleInput {
    fn capture_utterance(&self, window: &CaptureWindow) -> Result<String, RecognitionError> {
        let epoch = self.session().epoch;
        let deadline = Instant::now() + window.start_timeout;

        loop {
            {
                let mut session = self.session();
                if session.epoch != epoch {
                    return Err(RecognitionError::Timeout);
                }
                if let Some(line) = session.handed_over.pop_front() {
                    return Self::accept(line);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RecognitionError::Timeout);
            }

            match self.rx.recv_timeout(remaining.min(POLL)) {
                Ok(line) => {
                    let mut session = self.session();
                    if session.epoch != epoch {
                        session.handed_over.push_back(line);
                        return Err(RecognitionError::Timeout);
                    }
                    return Self::accept(line);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RecognitionError::Device("console input closed".to_string()))
                }
            }
        }
    }

    fn begin_session(&self) {
        let mut session = self.session();
        session.epoch += 1;
        let dropped = session.handed_over.len() + self.rx.try_iter().count();
        session.handed_over.clear();
        if dropped > 0 {
            log::debug!("Discarded {} line(s) typed while not listening", dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn window(start_timeout: Duration) -> CaptureWindow {
        CaptureWindow {
            ambient: Duration::ZERO,
            start_timeout,
            max_phrase: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_console_input_lines() {
        let (input, tx) = ConsoleInput::new();
        let window = window(Duration::from_millis(20));
        tx.send("open youtube".to_string()).unwrap();
        tx.send("   ".to_string()).unwrap();

        assert_eq!(input.capture_utterance(&window), Ok("open youtube".to_string()));
        assert_eq!(
            input.capture_utterance(&window),
            Err(RecognitionError::Unintelligible)
        );
        assert_eq!(input.capture_utterance(&window), Err(RecognitionError::Timeout));

        drop(tx);
        assert!(matches!(
            input.capture_utterance(&window),
            Err(RecognitionError::Device(_))
        ));
    }

    #[test]
    fn test_lines_typed_before_session_are_discarded() {
        let (input, tx) = ConsoleInput::new();
        tx.send("who are you".to_string()).unwrap();
        tx.send("open youtube".to_string()).unwrap();

        input.begin_session();
        assert_eq!(
            input.capture_utterance(&window(Duration::from_millis(20))),
            Err(RecognitionError::Timeout)
        );

        tx.send("what time is it".to_string()).unwrap();
        assert_eq!(
            input.capture_utterance(&window(Duration::from_millis(20))),
            Ok("what time is it".to_string())
        );
    }

    #[test]
    fn test_stale_capture_hands_line_to_new_session() {
        let (input, tx) = ConsoleInput::new();
        let input = Arc::new(input);
        input.begin_session();

        let stale_input = Arc::clone(&input);
        let stale = thread::spawn(move || {
            stale_input.capture_utterance(&window(Duration::from_secs(2)))
        });
        thread::sleep(Duration::from_millis(20));

        // Stop and restart while the first capture is still waiting
        input.begin_session();
        tx.send("who are you".to_string()).unwrap();

        assert_eq!(
            input.capture_utterance(&window(Duration::from_secs(1))),
            Ok("who are you".to_string())
        );
        assert_eq!(stale.join().unwrap(), Err(RecognitionError::Timeout));
    }
}
