/**
 * Preflight checks for speech output, audio input, and service keys
 *
 * Runs at startup (and on `--preflight`), logs each result with a fix hint,
 * and returns a structured report.
 */
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, STT_KEY_VARS, WEATHER_KEY_VARS};
use crate::listen::InputMode;
use crate::speech::system::detect_program;

/// Status of an individual preflight check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Individual preflight check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightItem {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub fix_hint: Option<String>,
}

impl PreflightItem {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            message: message.into(),
            fix_hint: None,
        }
    }

    fn problem(name: &str, status: CheckStatus, message: impl Into<String>, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            fix_hint: Some(hint.to_string()),
        }
    }
}

/// Complete preflight report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    pub items: Vec<PreflightItem>,
    pub overall: CheckStatus,
    pub can_proceed: bool,
}

impl PreflightReport {
    fn from_items(items: Vec<PreflightItem>) -> Self {
        let overall = Self::compute_overall(&items);
        let can_proceed = Self::can_proceed(&items);
        Self {
            items,
            overall,
            can_proceed,
        }
    }

    /// Determine overall status from individual checks
    fn compute_overall(items: &[PreflightItem]) -> CheckStatus {
        if items.iter().any(|i| i.status == CheckStatus::Fail) {
            CheckStatus::Fail
        } else if items.iter().any(|i| i.status == CheckStatus::Warn) {
            CheckStatus::Warn
        } else {
            CheckStatus::Pass
        }
    }

    /// Can app proceed despite warnings?
    fn can_proceed(items: &[PreflightItem]) -> bool {
        !items.iter().any(|i| i.status == CheckStatus::Fail)
    }
}

/// Run all preflight checks and log the results
pub fn run_preflight(config: &AppConfig) -> PreflightReport {
    log::info!("Starting preflight checks...");

    let items = vec![
        check_speech_program(config),
        check_audio_input(config),
        check_transcription_key(config),
        check_weather_key(config),
    ];

    for item in &items {
        match item.status {
            CheckStatus::Pass => log::info!("✓ {}: {}", item.name, item.message),
            CheckStatus::Warn => log::warn!("{}: {}", item.name, item.message),
            CheckStatus::Fail => log::error!("{}: {}", item.name, item.message),
        }
        if let Some(ref hint) = item.fix_hint {
            log::info!("  hint: {}", hint);
        }
    }

    let report = PreflightReport::from_items(items);
    log::info!("Preflight complete: {:?}", report.overall);
    report
}

fn check_speech_program(config: &AppConfig) -> PreflightItem {
    if !config.speech.enabled {
        return PreflightItem::pass("speech_output", "Speech output disabled");
    }

    match detect_program(&config.speech) {
        Ok(program) => PreflightItem::pass(
            "speech_output",
            format!("Using '{}'", program.binary()),
        ),
        Err(e) => PreflightItem::problem(
            "speech_output",
            CheckStatus::Warn,
            format!("{} (replies will only be printed)", e),
            "Install a speech program:\n\
             • Arch: sudo pacman -S espeak-ng\n\
             • Ubuntu/Debian: sudo apt install espeak-ng\n\
             • Fedora: sudo dnf install espeak-ng",
        ),
    }
}

fn check_audio_input(config: &AppConfig) -> PreflightItem {
    match config.listen.mode {
        InputMode::Console => PreflightItem::pass("audio_input", "Typed input mode"),
        InputMode::Microphone => check_microphone(),
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "mic")] {
        fn check_microphone() -> PreflightItem {
            use cpal::traits::HostTrait;

            match cpal::default_host().input_devices() {
                Ok(mut devices) => {
                    if devices.next().is_some() {
                        PreflightItem::pass("audio_input", "Microphone devices found")
                    } else {
                        PreflightItem::problem(
                            "audio_input",
                            CheckStatus::Warn,
                            "No microphone devices detected",
                            "Connect a microphone, or run with --text to type commands",
                        )
                    }
                }
                Err(e) => PreflightItem::problem(
                    "audio_input",
                    CheckStatus::Fail,
                    format!("Cannot access audio devices: {}", e),
                    "Check permissions and audio configuration:\n\
                     • Ensure user is in 'audio' group: sudo usermod -aG audio $USER\n\
                     • Verify audio server is running (PipeWire/PulseAudio)",
                ),
            }
        }
    } else {
        fn check_microphone() -> PreflightItem {
            PreflightItem::problem(
                "audio_input",
                CheckStatus::Fail,
                "Built without microphone support",
                "Rebuild with the 'mic' feature, or run with --text",
            )
        }
    }
}

fn check_transcription_key(config: &AppConfig) -> PreflightItem {
    if config.listen.mode == InputMode::Console {
        return PreflightItem::pass("transcription", "Not needed for typed input");
    }

    let has_key = config
        .listen
        .transcription
        .api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty());
    let local = config.listen.transcription.endpoint.contains("localhost")
        || config.listen.transcription.endpoint.contains("127.0.0.1");

    if has_key || local {
        PreflightItem::pass(
            "transcription",
            format!("Endpoint {}", config.listen.transcription.endpoint),
        )
    } else {
        PreflightItem::problem(
            "transcription",
            CheckStatus::Warn,
            "No transcription API key configured",
            &format!("Set {} or listen.transcription.api_key", STT_KEY_VARS.join(" or ")),
        )
    }
}

fn check_weather_key(config: &AppConfig) -> PreflightItem {
    let has_key = config
        .weather
        .api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty());

    if has_key {
        PreflightItem::pass("weather", "Weather API key configured")
    } else {
        PreflightItem::problem(
            "weather",
            CheckStatus::Warn,
            "No weather API key (weather command will ask for one)",
            &format!("Set {} or weather.api_key", WEATHER_KEY_VARS.join(" or ")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: CheckStatus) -> PreflightItem {
        PreflightItem {
            name: "x".to_string(),
            status,
            message: String::new(),
            fix_hint: None,
        }
    }

    #[test]
    fn test_overall_status() {
        let report = PreflightReport::from_items(vec![item(CheckStatus::Pass), item(CheckStatus::Warn)]);
        assert_eq!(report.overall, CheckStatus::Warn);
        assert!(report.can_proceed);

        let report = PreflightReport::from_items(vec![item(CheckStatus::Fail), item(CheckStatus::Warn)]);
        assert_eq!(report.overall, CheckStatus::Fail);
        assert!(!report.can_proceed);

        let report = PreflightReport::from_items(vec![item(CheckStatus::Pass)]);
        assert_eq!(report.overall, CheckStatus::Pass);
    }

    #[test]
    fn test_console_mode_needs_no_microphone_or_key() {
        let mut config = AppConfig::default();
        config.listen.mode = InputMode::Console;

        assert_eq!(check_audio_input(&config).status, CheckStatus::Pass);
        assert_eq!(check_transcription_key(&config).status, CheckStatus::Pass);
    }

    #[test]
    fn test_missing_keys_warn() {
        let config = AppConfig::default();
        assert_eq!(check_transcription_key(&config).status, CheckStatus::Warn);

        let weather = check_weather_key(&config);
        assert_eq!(weather.status, CheckStatus::Warn);
        assert!(weather.fix_hint.unwrap().contains("OPENWEATHER_API_KEY"));
    }

    #[test]
    fn test_local_transcription_endpoint_needs_no_key() {
        let mut config = AppConfig::default();
        config.listen.transcription.endpoint =
            "http://localhost:8080/v1/audio/transcriptions".to_string();
        assert_eq!(check_transcription_key(&config).status, CheckStatus::Pass);
    }

    #[test]
    fn test_disabled_speech_passes() {
        let mut config = AppConfig::default();
        config.speech.enabled = false;
        assert_eq!(check_speech_program(&config).status, CheckStatus::Pass);
    }
}
