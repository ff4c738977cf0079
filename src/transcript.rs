//! Transcript notifications for the UI shell
//!
//! Both the listening loop (user utterances) and the speech worker (assistant
//! utterances) report here. Implementations must return quickly; they are
//! called from worker threads.

/// Receiver of transcript lines and status text
pub trait TranscriptSink: Send + Sync {
    /// A line of conversation: `from_user` is true for recognized speech,
    /// false for text the assistant is about to speak.
    fn on_utterance(&self, text: &str, from_user: bool);

    /// Short status text ("Ready", "Listening...")
    fn on_status(&self, _status: &str) {}
}
