//! HTTP speech-to-text client
//!
//! Posts a WAV phrase to an OpenAI-compatible `/v1/audio/transcriptions`
//! endpoint (OpenAI, or a local whisper server exposing the same API).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::RecognitionError;

/// Transcription backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub endpoint: String,
    pub model: String,
    /// Sent as a bearer token when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            model: "whisper-1".to_string(),
            api_key: None,
            language: Some("en".to_string()),
            timeout_secs: 15,
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Blocking transcription client, used from the listening thread
pub struct CloudTranscriber {
    client: reqwest::blocking::Client,
    config: TranscriptionConfig,
}

impl CloudTranscriber {
    pub fn new(config: TranscriptionConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Transcribe WAV bytes into text
    pub fn transcribe(&self, wav: Vec<u8>) -> Result<String, RecognitionError> {
        log::debug!("Transcribing {} bytes of audio", wav.len());

        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("phrase.wav")
            .mime_str("audio/wav")
            .map_err(|e| RecognitionError::Service(e.to_string()))?;

        let mut form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone());
        if let Some(ref language) = self.config.language {
            form = form.text("language", language.clone());
        }

        let mut request = self.client.post(&self.config.endpoint).multipart(form);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            log::warn!("Transcription request failed: {}", e);
            RecognitionError::Service(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            log::warn!("Transcription service returned {}: {}", status, body);
            return Err(RecognitionError::Service(format!("HTTP {}", status)));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .map_err(|e| RecognitionError::Service(format!("bad response: {}", e)))?;

        interpret_transcript(&parsed.text)
    }
}

/// Blank transcripts and bare punctuation count as unintelligible
pub fn interpret_transcript(text: &str) -> Result<String, RecognitionError> {
    let trimmed = text.trim();
    if trimmed.chars().any(|c| c.is_alphanumeric()) {
        Ok(trimmed.to_string())
    } else {
        Err(RecognitionError::Unintelligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_transcript() {
        assert_eq!(interpret_transcript("  Open YouTube. "), Ok("Open YouTube.".to_string()));
        assert_eq!(interpret_transcript(""), Err(RecognitionError::Unintelligible));
        assert_eq!(interpret_transcript(" ... "), Err(RecognitionError::Unintelligible));
    }

    #[test]
    fn test_unreachable_endpoint_is_service_error() {
        let transcriber = CloudTranscriber::new(TranscriptionConfig {
            endpoint: "http://127.0.0.1:9/v1/audio/transcriptions".to_string(),
            timeout_secs: 2,
            ..TranscriptionConfig::default()
        })
        .unwrap();

        let result = transcriber.transcribe(vec![0u8; 44]);
        assert!(matches!(result, Err(RecognitionError::Service(_))));
    }
}
