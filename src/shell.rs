//! Terminal shell: the UI around the assistant
//!
//! Prints the conversation and status lines, maps typed controls onto
//! start/stop/quit, and in text mode forwards everything else as an
//! utterance. Runs on the tokio runtime; blocking teardown is moved to
//! `spawn_blocking`.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::controller::{Assistant, ListeningState};
use crate::transcript::TranscriptSink;

const HELP: &str = "Controls: start, stop, quit (prefix with ':' in text mode while listening). \
In text mode any other line is treated as something you said.";

/// Transcript sink that prints to the terminal
pub struct ConsoleTranscript;

impl TranscriptSink for ConsoleTranscript {
    fn on_utterance(&self, text: &str, from_user: bool) {
        let speaker = if from_user { "You" } else { "ZILNOVA" };
        log::debug!("{}: {}", speaker, text);
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}: {}", speaker, text);
        let _ = out.flush();
    }

    fn on_status(&self, status: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "[{}]", status);
        let _ = out.flush();
    }
}

/// What one line of terminal input means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Start,
    Stop,
    Quit,
    Help,
    Utterance(String),
    Ignore,
}

/// Interpret a terminal line. In text mode controls need a ':' prefix.
pub fn parse_line(line: &str, text_mode: bool) -> ShellEvent {
    let line = line.trim();
    if line.is_empty() {
        return ShellEvent::Ignore;
    }

    let control = match line.strip_prefix(':') {
        Some(rest) => Some(rest.trim()),
        None if !text_mode => Some(line),
        None => None,
    };

    match control.map(str::to_lowercase).as_deref() {
        Some("start") => ShellEvent::Start,
        Some("stop") => ShellEvent::Stop,
        Some("quit") | Some("q") | Some("exit") => ShellEvent::Quit,
        Some("help") | Some("?") => ShellEvent::Help,
        Some(_) if !text_mode => {
            println!("Unknown control. {}", HELP);
            ShellEvent::Ignore
        }
        Some(other) => {
            println!("Unknown control ':{}'. {}", other, HELP);
            ShellEvent::Ignore
        }
        None => ShellEvent::Utterance(line.to_string()),
    }
}

/// Typed lines count as speech only in text mode while a session is
/// listening; otherwise every line is a control.
pub fn takes_utterances(text_mode: bool, state: ListeningState) -> bool {
    text_mode && state == ListeningState::Listening
}

/// Why the shell loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    Interrupted,
    Terminated,
    InputClosed,
}

/// Run the shell until quit, Ctrl-C, or the assistant terminates itself.
/// Tears the assistant down before returning.
pub async fn run(
    assistant: Arc<Assistant>,
    typed: Option<crossbeam_channel::Sender<String>>,
    mut terminated: mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<ExitReason> {
    let text_mode = typed.is_some();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    println!("{}", HELP);

    let reason = loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        log::debug!("stdin closed");
                        stdin_open = false;
                        if text_mode {
                            break ExitReason::InputClosed;
                        }
                        continue;
                    }
                    Err(e) => {
                        log::warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                        continue;
                    }
                };

                match parse_line(&line, takes_utterances(text_mode, assistant.state())) {
                    ShellEvent::Start => {
                        if !assistant.start_listening() {
                            println!("Already listening.");
                        }
                    }
                    ShellEvent::Stop => {
                        if !assistant.stop_listening() {
                            println!("Not listening.");
                        }
                    }
                    ShellEvent::Quit => break ExitReason::Quit,
                    ShellEvent::Help => println!("{}", HELP),
                    ShellEvent::Utterance(text) => {
                        if let Some(ref typed) = typed {
                            if typed.send(text).is_err() {
                                log::warn!("Typed input channel closed");
                            }
                        }
                    }
                    ShellEvent::Ignore => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break ExitReason::Interrupted;
            }
            _ = terminated.recv() => {
                break ExitReason::Terminated;
            }
        }
    };

    log::info!("Shell exiting: {:?}", reason);
    tokio::task::spawn_blocking(move || assistant.shutdown()).await?;
    Ok(reason)
}
