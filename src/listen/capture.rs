//! Microphone capture with cpal
//!
//! Each capture attempt opens the input stream, measures ambient noise,
//! waits for a phrase, records it, closes the stream, and hands the WAV to
//! the transcriber. The stream lives only inside `capture_utterance`, so
//! the non-Send cpal handle never leaves the listening thread.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use super::phrase::{ambient_threshold, PhraseDetector, PhraseState};
use super::{AudioInput, CaptureWindow, CloudTranscriber, ListenConfig, RecognitionError};

/// Recognizer reading from the default (or configured) microphone
pub struct MicInput {
    config: ListenConfig,
    transcriber: CloudTranscriber,
}

impl MicInput {
    pub fn new(config: ListenConfig) -> Result<Self> {
        let transcriber = CloudTranscriber::new(config.transcription.clone())
            .context("Failed to create transcription client")?;
        Ok(Self {
            config,
            transcriber,
        })
    }

    fn record_phrase(&self, window: &CaptureWindow) -> Result<(Vec<f32>, u32), RecognitionError> {
        let (stream, rx, sample_rate) = open_input(self.config.device_name.as_deref())
            .map_err(|e| RecognitionError::Device(format!("{:#}", e)))?;

        // Ambient calibration
        let ambient = collect_for(&rx, window.ambient)?;
        let threshold =
            ambient_threshold(&ambient, self.config.energy_ratio, self.config.min_energy);
        log::debug!(
            "Ambient calibration: {} samples, speech threshold {:.4}",
            ambient.len(),
            threshold
        );

        let mut detector = PhraseDetector::new(
            threshold,
            sample_rate,
            Duration::from_millis(self.config.silence_ms as u64),
            window.max_phrase,
            Duration::from_millis(self.config.preroll_ms as u64),
        );

        let start_deadline = Instant::now() + window.start_timeout;
        // Hard stop even if the device keeps feeding loud frames
        let phrase_deadline = start_deadline + window.max_phrase + Duration::from_secs(1);

        loop {
            let now = Instant::now();
            if detector.state() == PhraseState::Waiting && now >= start_deadline {
                return Err(RecognitionError::Timeout);
            }
            if now >= phrase_deadline {
                break;
            }

            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(frame) => {
                    if detector.feed(&frame) == PhraseState::Finished {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RecognitionError::Device("input stream closed".to_string()));
                }
            }
        }

        drop(stream);
        Ok((detector.into_samples(), sample_rate))
    }
}

impl AudioInput for MicInput {
    fn capture_utterance(&self, window: &CaptureWindow) -> Result<String, RecognitionError> {
        log::debug!("Listening...");
        let (samples, sample_rate) = self.record_phrase(window)?;
        if samples.is_empty() {
            return Err(RecognitionError::Unintelligible);
        }

        let wav = samples_to_wav(&samples, sample_rate)
            .map_err(|e| RecognitionError::Device(format!("WAV encoding failed: {:#}", e)))?;
        self.transcriber.transcribe(wav)
    }
}

/// Drain frames for `duration`
fn collect_for(rx: &Receiver<Vec<f32>>, duration: Duration) -> Result<Vec<f32>, RecognitionError> {
    let deadline = Instant::now() + duration;
    let mut samples = Vec::new();

    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(remaining) {
            Ok(frame) => samples.extend(frame),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(RecognitionError::Device("input stream closed".to_string()));
            }
        }
    }

    Ok(samples)
}

/// Open the input device and start a stream delivering mono f32 frames
fn open_input(device_name: Option<&str>) -> Result<(Stream, Receiver<Vec<f32>>, u32)> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().ok().as_deref() == Some(name))
            .with_context(|| format!("Input device '{}' not found", name))?,
        None => host
            .default_input_device()
            .context("No input device available")?,
    };

    let supported_config = device
        .default_input_config()
        .context("Failed to get default input config")?;
    let sample_rate = supported_config.sample_rate().0;
    let channels = supported_config.channels() as usize;

    log::debug!(
        "Input device '{}': {} Hz, {} channels, {:?}",
        device.name().unwrap_or_default(),
        sample_rate,
        channels,
        supported_config.sample_format()
    );

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let (tx, rx) = unbounded::<Vec<f32>>();

    let stream = match supported_config.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &_| send_mono_f32(data, channels, &tx),
            |err| log::error!("Audio stream error: {}", err),
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &_| send_mono_i16(data, channels, &tx),
            |err| log::error!("Audio stream error: {}", err),
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _: &_| send_mono_u16(data, channels, &tx),
            |err| log::error!("Audio stream error: {}", err),
            None,
        )?,
        other => anyhow::bail!("Unsupported sample format {:?}", other),
    };

    stream.play()?;
    Ok((stream, rx, sample_rate))
}

fn send_mono_f32(data: &[f32], channels: usize, tx: &Sender<Vec<f32>>) {
    let mono = data
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
        .collect();
    let _ = tx.send(mono);
}

fn send_mono_i16(data: &[i16], channels: usize, tx: &Sender<Vec<f32>>) {
    let mono = data
        .chunks(channels)
        .map(|chunk| {
            chunk.iter().map(|&s| s as f32 / i16::MAX as f32).sum::<f32>() / channels as f32
        })
        .collect();
    let _ = tx.send(mono);
}

fn send_mono_u16(data: &[u16], channels: usize, tx: &Sender<Vec<f32>>) {
    let mono = data
        .chunks(channels)
        .map(|chunk| {
            chunk
                .iter()
                .map(|&s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
                .sum::<f32>()
                / channels as f32
        })
        .collect();
    let _ = tx.send(mono);
}

/// Encode mono f32 samples as 16-bit PCM WAV
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let value = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer.write_sample(value)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_to_wav_header_and_length() {
        let wav = samples_to_wav(&[0.0, 0.5, -0.5, 1.0], 16000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header + 4 samples * 2 bytes
        assert_eq!(wav.len(), 52);
    }

    #[test]
    fn test_mono_downmix() {
        let (tx, rx) = unbounded();
        send_mono_i16(&[i16::MAX, i16::MAX, 0, 0], 2, &tx);
        let frame = rx.recv().unwrap();
        assert_eq!(frame.len(), 2);
        assert!((frame[0] - 1.0).abs() < 1e-4);
        assert_eq!(frame[1], 0.0);
    }

    #[test]
    fn test_collect_for_stops_at_deadline() {
        let (tx, rx) = unbounded::<Vec<f32>>();
        tx.send(vec![0.1; 10]).unwrap();
        let collected = collect_for(&rx, Duration::from_millis(30)).unwrap();
        assert_eq!(collected.len(), 10);
        drop(tx);
    }
}
