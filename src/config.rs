//! Application configuration (config.toml)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::commands::ResourceConfig;
use crate::controller::AssistantConfig;
use crate::listen::ListenConfig;
use crate::speech::SpeechConfig;
use crate::validation::{self, ValidationError};
use crate::weather::WeatherConfig;

pub const WEATHER_KEY_VARS: &[&str] = &["ZILNOVA_WEATHER_API_KEY", "OPENWEATHER_API_KEY"];
pub const STT_KEY_VARS: &[&str] = &["ZILNOVA_STT_API_KEY", "OPENAI_API_KEY"];

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub speech: SpeechConfig,
    pub listen: ListenConfig,
    pub assistant: AssistantConfig,
    pub weather: WeatherConfig,
    pub resources: ResourceConfig,
}

impl AppConfig {
    /// Load config from file or create default
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Invalid config in {}", path.display()))?;
            log::info!("Config loaded from: {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save(path)?;
            log::info!("Default config created at: {}", path.display());
            Ok(config)
        }
    }

    /// Write the config, readable by the owner only on unix
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_str)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .context("Failed to restrict config permissions")?;
        }
        Ok(())
    }

    /// Fill missing API keys from the environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|n| lookup(n))
                .find(|v| !v.trim().is_empty())
        };

        if is_blank(&self.weather.api_key) {
            if let Some(key) = first(WEATHER_KEY_VARS) {
                log::debug!("Weather API key taken from environment");
                self.weather.api_key = Some(key);
            }
        }
        if is_blank(&self.listen.transcription.api_key) {
            if let Some(key) = first(STT_KEY_VARS) {
                log::debug!("Transcription API key taken from environment");
                self.listen.transcription.api_key = Some(key);
            }
        }
    }

    /// Range and format checks for every section
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_speech_rate(self.speech.rate_wpm)?;

        let listen = &self.listen;
        validation::validate_timeout_secs("ambient_calibration_secs", listen.ambient_calibration_secs)?;
        validation::validate_timeout_secs("phrase_start_timeout_secs", listen.phrase_start_timeout_secs)?;
        validation::validate_timeout_secs("max_phrase_secs", listen.max_phrase_secs)?;
        validation::validate_opt_device_name(&listen.device_name)?;
        validation::validate_url(&listen.transcription.endpoint)?;

        self.assistant.validate()?;

        validation::validate_url(&self.weather.endpoint)?;
        if let Some(ref city) = self.weather.default_city {
            validation::validate_city(city)?;
        }

        for site in &self.resources.websites {
            validation::validate_url(&site.target)?;
        }
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
