/**
 * Input Validation Module
 *
 * Centralized validation for configuration values and for text pulled out
 * of utterances before it reaches an external service.
 */
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Value too long: max {max}, got {actual}")]
    ValueTooLong { max: usize, actual: usize },
}

/// Validate a city name taken from speech (letters, spaces, `-'.,`, max 64 chars)
pub fn validate_city(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "City name cannot be empty".to_string(),
        ));
    }

    let len = name.chars().count();
    if len > 64 {
        return Err(ValidationError::ValueTooLong { max: 64, actual: len });
    }

    if !name
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '\'' || c == '.' || c == ',')
    {
        return Err(ValidationError::InvalidFormat(format!(
            "City name contains invalid characters: '{}'",
            name
        )));
    }

    Ok(name.to_string())
}

/// Validate a website target (absolute http or https URL)
pub fn validate_url(raw: &str) -> Result<url::Url, ValidationError> {
    let parsed =
        url::Url::parse(raw).map_err(|e| ValidationError::InvalidFormat(format!("{}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ValidationError::InvalidFormat(format!(
            "Unsupported URL scheme '{}'",
            other
        ))),
    }
}

/// Validate device name (max 256 chars, no control characters)
pub fn validate_device_name(name: &str) -> Result<String, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "Device name cannot be empty".to_string(),
        ));
    }

    if name.len() > 256 {
        return Err(ValidationError::ValueTooLong {
            max: 256,
            actual: name.len(),
        });
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat(
            "Device name contains invalid control characters".to_string(),
        ));
    }

    Ok(name.to_string())
}

/// Validate optional device name
pub fn validate_opt_device_name(name: &Option<String>) -> Result<(), ValidationError> {
    if let Some(n) = name {
        validate_device_name(n)?;
    }
    Ok(())
}

/// Validate a capture timeout in seconds (0.1s to 60s)
pub fn validate_timeout_secs(field: &str, secs: f32) -> Result<f32, ValidationError> {
    if !(0.1..=60.0).contains(&secs) {
        return Err(ValidationError::InvalidRange(format!(
            "{} must be between 0.1s and 60s, got {}s",
            field, secs
        )));
    }
    Ok(secs)
}

/// Validate speech rate in words per minute (80 to 400)
pub fn validate_speech_rate(wpm: u32) -> Result<u32, ValidationError> {
    if !(80..=400).contains(&wpm) {
        return Err(ValidationError::InvalidRange(format!(
            "Speech rate must be between 80 and 400 wpm, got {}",
            wpm
        )));
    }
    Ok(wpm)
}

/// Validate debounce window in milliseconds (0ms to 5000ms)
pub fn validate_debounce_ms(ms: u64) -> Result<u64, ValidationError> {
    if ms > 5_000 {
        return Err(ValidationError::InvalidRange(format!(
            "Debounce must be at most 5000ms, got {}ms",
            ms
        )));
    }
    Ok(ms)
}

/// Validate consecutive-empty-result threshold (1 to 50)
pub fn validate_empty_threshold(count: u32) -> Result<u32, ValidationError> {
    if !(1..=50).contains(&count) {
        return Err(ValidationError::InvalidRange(format!(
            "Empty-result threshold must be between 1 and 50, got {}",
            count
        )));
    }
    Ok(count)
}

/// Validate exit phrases (at least one, none blank)
pub fn validate_exit_phrases(phrases: &[String]) -> Result<(), ValidationError> {
    if phrases.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "At least one exit phrase is required".to_string(),
        ));
    }
    if phrases.iter().any(|p| p.trim().is_empty()) {
        return Err(ValidationError::InvalidFormat(
            "Exit phrases cannot be blank".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_valid() {
        assert_eq!(validate_city(" London ").unwrap(), "London");
        assert!(validate_city("New York").is_ok());
        assert!(validate_city("Saint-Étienne").is_ok());
        assert!(validate_city("St. John's").is_ok());
    }

    #[test]
    fn test_city_invalid() {
        assert!(validate_city("").is_err());
        assert!(validate_city("   ").is_err());
        assert!(validate_city(&"a".repeat(65)).is_err());
        assert!(validate_city("paris&appid=x").is_err());
        assert!(validate_city("city42").is_err());
    }

    #[test]
    fn test_url_valid() {
        assert!(validate_url("https://www.youtube.com").is_ok());
        assert!(validate_url("http://localhost:8080/path").is_ok());
    }

    #[test]
    fn test_url_invalid() {
        assert!(validate_url("youtube.com").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_device_name_valid() {
        assert!(validate_device_name("USB Microphone").is_ok());
        assert!(validate_device_name("Built-in Audio").is_ok());
    }

    #[test]
    fn test_device_name_invalid() {
        assert!(validate_device_name("").is_err()); // Empty
        assert!(validate_device_name(&"a".repeat(257)).is_err()); // Too long
        assert!(validate_device_name("test\x00name").is_err()); // Null byte
        assert!(validate_device_name("test\nname").is_err()); // Newline
    }

    #[test]
    fn test_opt_device_name() {
        assert!(validate_opt_device_name(&None).is_ok());
        assert!(validate_opt_device_name(&Some("USB Mic".to_string())).is_ok());
        assert!(validate_opt_device_name(&Some("".to_string())).is_err());
    }

    #[test]
    fn test_timeout_bounds() {
        assert!(validate_timeout_secs("start_timeout", 0.1).is_ok());
        assert!(validate_timeout_secs("start_timeout", 60.0).is_ok());
        assert!(validate_timeout_secs("start_timeout", 0.0).is_err());
        assert!(validate_timeout_secs("start_timeout", 61.0).is_err());
    }

    #[test]
    fn test_speech_rate_bounds() {
        assert!(validate_speech_rate(150).is_ok());
        assert!(validate_speech_rate(79).is_err());
        assert!(validate_speech_rate(401).is_err());
    }

    #[test]
    fn test_exit_phrases() {
        assert!(validate_exit_phrases(&["bye".to_string()]).is_ok());
        assert!(validate_exit_phrases(&[]).is_err());
        assert!(validate_exit_phrases(&["bye".to_string(), " ".to_string()]).is_err());
    }

    #[test]
    fn test_threshold_and_debounce() {
        assert!(validate_empty_threshold(5).is_ok());
        assert!(validate_empty_threshold(0).is_err());
        assert!(validate_debounce_ms(500).is_ok());
        assert!(validate_debounce_ms(5_001).is_err());
    }
}
