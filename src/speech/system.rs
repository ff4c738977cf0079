//! Platform speech programs
//!
//! Renders speech by running the OS text-to-speech program and waiting for
//! it to exit:
//! - Linux: `espeak-ng`, `espeak`, or `spd-say`
//! - macOS: `say`
//! - Windows: PowerShell with System.Speech

use std::io::Write;
use std::process::{Child, Command, ExitStatus, Stdio};

use super::{SpeechConfig, SpeechError, SpeechSynthesizer};

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        const CANDIDATES: &[&str] = &["powershell"];
    } else if #[cfg(target_os = "macos")] {
        const CANDIDATES: &[&str] = &["say"];
    } else {
        const CANDIDATES: &[&str] = &["espeak-ng", "espeak", "spd-say"];
    }
}

/// A speech program found on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceProgram {
    Espeak(String),
    SpdSay,
    Say,
    PowerShell,
}

impl VoiceProgram {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "espeak-ng" | "espeak" => Some(VoiceProgram::Espeak(name.to_string())),
            "spd-say" => Some(VoiceProgram::SpdSay),
            "say" => Some(VoiceProgram::Say),
            "powershell" | "powershell.exe" => Some(VoiceProgram::PowerShell),
            _ => None,
        }
    }

    pub fn binary(&self) -> &str {
        match self {
            VoiceProgram::Espeak(bin) => bin,
            VoiceProgram::SpdSay => "spd-say",
            VoiceProgram::Say => "say",
            VoiceProgram::PowerShell => "powershell",
        }
    }

    /// Program names to probe on this platform, in preference order
    pub fn candidates() -> &'static [&'static str] {
        CANDIDATES
    }

    /// Build the command line; the second value is text to feed on stdin
    fn command(&self, config: &SpeechConfig, text: &str) -> (Command, Option<String>) {
        let mut cmd = Command::new(self.binary());
        let mut stdin_text = None;

        match self {
            VoiceProgram::Espeak(_) => {
                cmd.arg("-s").arg(config.rate_wpm.to_string());
                if let Some(voice) = espeak_voice(config) {
                    cmd.arg("-v").arg(voice);
                }
                cmd.arg("--").arg(text);
            }
            VoiceProgram::SpdSay => {
                cmd.arg("-w").arg("-r").arg(spd_rate(config.rate_wpm).to_string());
                if let Some(ref voice) = config.voice {
                    cmd.arg("-y").arg(voice);
                } else if config.prefer_female {
                    cmd.arg("-t").arg("female1");
                }
                cmd.arg("--").arg(text);
            }
            VoiceProgram::Say => {
                cmd.arg("-r").arg(config.rate_wpm.to_string());
                if let Some(ref voice) = config.voice {
                    cmd.arg("-v").arg(voice);
                } else if config.prefer_female {
                    cmd.arg("-v").arg("Samantha");
                }
                cmd.arg("--").arg(text);
            }
            VoiceProgram::PowerShell => {
                let hint = match config.voice {
                    Some(ref voice) => format!("$s.SelectVoice('{}');", voice.replace('\'', "''")),
                    None if config.prefer_female => "$s.SelectVoiceByHints('Female');".to_string(),
                    None => String::new(),
                };
                let script = format!(
                    "Add-Type -AssemblyName System.Speech; \
                     $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
                     $s.Rate = {}; {} $s.Speak([Console]::In.ReadToEnd())",
                    sapi_rate(config.rate_wpm),
                    hint
                );
                cmd.arg("-NoProfile").arg("-Command").arg(script);
                stdin_text = Some(text.to_string());
            }
        }

        (cmd, stdin_text)
    }
}

fn espeak_voice(config: &SpeechConfig) -> Option<String> {
    match config.voice {
        Some(ref voice) => Some(voice.clone()),
        None if config.prefer_female => Some("en+f3".to_string()),
        None => None,
    }
}

/// spd-say takes -100..100 around its default of ~175 wpm
fn spd_rate(wpm: u32) -> i32 {
    ((wpm as i32 - 175) / 2).clamp(-100, 100)
}

/// SAPI takes -10..10 around ~150 wpm
fn sapi_rate(wpm: u32) -> i32 {
    ((wpm as i32 - 150) / 15).clamp(-10, 10)
}

/// Check whether a program can be started at all
fn program_available(binary: &str) -> bool {
    let probe_arg = if binary == "powershell" { "-Help" } else { "--version" };
    Command::new(binary)
        .arg(probe_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Find a usable speech program, honoring an explicit override
pub fn detect_program(config: &SpeechConfig) -> Result<VoiceProgram, SpeechError> {
    if let Some(ref name) = config.program {
        let program = VoiceProgram::from_name(name)
            .ok_or_else(|| SpeechError::ProgramNotFound(format!("unsupported '{}'", name)))?;
        if program_available(program.binary()) {
            return Ok(program);
        }
        return Err(SpeechError::ProgramNotFound(name.clone()));
    }

    for name in VoiceProgram::candidates() {
        if program_available(name) {
            if let Some(program) = VoiceProgram::from_name(name) {
                log::debug!("Speech program detected: {}", name);
                return Ok(program);
            }
        }
    }

    Err(SpeechError::ProgramNotFound(
        VoiceProgram::candidates().join(", "),
    ))
}

/// Synthesizer that shells out to the platform speech program
pub struct SystemVoice {
    config: SpeechConfig,
    program: Option<VoiceProgram>,
}

impl SystemVoice {
    /// Create the synthesizer. A missing program is not fatal: the worker
    /// reports the failure per item and retries detection on reinitialize.
    pub fn new(config: SpeechConfig) -> Self {
        let program = match detect_program(&config) {
            Ok(program) => {
                log::info!("✓ Speech output via '{}'", program.binary());
                Some(program)
            }
            Err(e) => {
                log::warn!("{}; spoken output will only appear in the transcript", e);
                None
            }
        };

        Self { config, program }
    }

    pub fn program(&self) -> Option<&VoiceProgram> {
        self.program.as_ref()
    }
}

/// Feed `stdin_text` to the child and wait for it. The child is reaped on
/// every path.
fn run_to_completion(mut child: Child, stdin_text: Option<&str>) -> Result<ExitStatus, SpeechError> {
    if let Some(input) = stdin_text {
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                drop(stdin);
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        }
    }

    Ok(child.wait()?)
}

impl SpeechSynthesizer for SystemVoice {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| SpeechError::ProgramNotFound(VoiceProgram::candidates().join(", ")))?;

        let (mut cmd, stdin_text) = program.command(&self.config, text);
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        if stdin_text.is_some() {
            cmd.stdin(Stdio::piped());
        }

        let status = run_to_completion(cmd.spawn()?, stdin_text.as_deref())?;
        if !status.success() {
            return Err(SpeechError::ProgramFailed(status.to_string()));
        }

        Ok(())
    }

    fn reinitialize(&mut self) -> Result<(), SpeechError> {
        self.program = Some(detect_program(&self.config)?);
        Ok(())
    }

    fn name(&self) -> &str {
        self.program
            .as_ref()
            .map(VoiceProgram::binary)
            .unwrap_or("system (unavailable)")
    }
}

/// Synthesizer that renders nothing (headless and `--silent` runs)
pub struct SilentVoice;

impl SpeechSynthesizer for SilentVoice {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        log::trace!("(silent) {}", text);
        Ok(())
    }

    fn reinitialize(&mut self) -> Result<(), SpeechError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "silent"
    }
}
