//! Current-weather lookups via OpenWeatherMap

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeatherError {
    #[error("No weather API key configured")]
    MissingApiKey,

    #[error("City not found: {0}")]
    CityNotFound(String),

    #[error("Weather service unavailable: {0}")]
    Unavailable(String),
}

/// Conditions reported for one city
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub city: String,
    pub description: String,
    pub temp_c: f32,
    pub humidity_percent: u8,
}

impl WeatherReport {
    /// Sentence suitable for speaking
    pub fn spoken(&self) -> String {
        format!(
            "In {} it is {:.0} degrees Celsius with {}, and humidity is {} percent.",
            self.city, self.temp_c, self.description, self.humidity_percent
        )
    }
}

pub trait WeatherService: Send + Sync {
    fn fetch(&self, city: &str) -> Result<WeatherReport, WeatherError>;
}

/// Weather configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// City used when the request does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_city: Option<String>,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_city: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Deserialize)]
struct OwmResponse {
    name: Option<String>,
    weather: Vec<OwmCondition>,
    main: OwmMain,
}

#[derive(Deserialize)]
struct OwmCondition {
    description: String,
}

#[derive(Deserialize)]
struct OwmMain {
    temp: f32,
    humidity: f32,
}

/// Blocking OpenWeatherMap client, called from the listening thread
pub struct OpenWeatherMap {
    client: reqwest::blocking::Client,
    config: WeatherConfig,
}

impl OpenWeatherMap {
    pub fn new(config: WeatherConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

impl WeatherService for OpenWeatherMap {
    fn fetch(&self, city: &str) -> Result<WeatherReport, WeatherError> {
        // Checked per request and never retried
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(WeatherError::MissingApiKey)?;

        let url = url::Url::parse_with_params(
            &self.config.endpoint,
            &[("q", city), ("appid", api_key), ("units", "metric")],
        )
        .map_err(|e| WeatherError::Unavailable(e.to_string()))?;

        log::debug!("Fetching weather for '{}'", city);
        let response = self.client.get(url).send().map_err(|e| {
            log::warn!("Weather request failed: {}", e);
            WeatherError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(WeatherError::CityNotFound(city.to_string()));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            log::error!("Weather API rejected the configured key");
            return Err(WeatherError::Unavailable("API key rejected".to_string()));
        }
        if !status.is_success() {
            return Err(WeatherError::Unavailable(format!("HTTP {}", status)));
        }

        let body: OwmResponse = response
            .json()
            .map_err(|e| WeatherError::Unavailable(format!("bad response: {}", e)))?;

        Ok(report_from(body, city))
    }
}

fn report_from(body: OwmResponse, requested: &str) -> WeatherReport {
    let description = body
        .weather
        .into_iter()
        .next()
        .map(|w| w.description)
        .unwrap_or_else(|| "unknown conditions".to_string());

    WeatherReport {
        city: body.name.unwrap_or_else(|| requested.to_string()),
        description,
        temp_c: body.main.temp,
        humidity_percent: body.main.humidity.clamp(0.0, 100.0).round() as u8,
    }
}
