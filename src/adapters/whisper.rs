//! Whisper transcription backend.
//!
//! Shells out to the local whisper binary for transcription.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ExtractorSettings;

use super::{Extraction, Extractor};

/// RMS level under which a 16-bit WAV recording is flagged as quiet
const POOR_AUDIO_RMS: f64 = 500.0;

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
}

/// Audio extractor backed by the whisper CLI
#[derive(Debug, Clone)]
pub struct WhisperExtractor {
    binary_path: PathBuf,
    model: String,
    language: Option<String>,
}

impl WhisperExtractor {
    pub fn new(binary_path: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model: model.into(),
            language: None,
        }
    }

    pub fn from_settings(settings: &ExtractorSettings) -> Self {
        Self {
            binary_path: settings.whisper_path.clone(),
            model: settings.whisper_model.clone(),
            language: settings.whisper_language.clone(),
        }
    }

    /// Transcribe any audio/video file whisper (via ffmpeg) can read
    pub async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;

        let mut command = Command::new(&self.binary_path);
        command
            .arg(audio_path)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(temp_dir.path())
            .arg("--output_format")
            .arg("json");
        if let Some(ref language) = self.language {
            command.arg("--language").arg(language);
        }

        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run whisper at {}", self.binary_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Whisper failed: {}", stderr.trim());
        }

        let stem = audio_path.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));

        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .context("Failed to read whisper output")?;

        let whisper: WhisperOutput =
            serde_json::from_str(&json_content).context("Failed to parse whisper JSON")?;

        Ok(whisper.text.trim().to_string())
    }
}

#[async_trait]
impl Extractor for WhisperExtractor {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let is_wav = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);

        if is_wav {
            let wav_path = path.to_path_buf();
            match tokio::task::spawn_blocking(move || wav_rms(&wav_path)).await {
                Ok(Ok(Some(rms))) if rms < POOR_AUDIO_RMS => {
                    warn!(path = %path.display(), rms, "Audio quality is poor, results may vary")
                }
                Ok(Ok(Some(rms))) => debug!(path = %path.display(), rms, "Audio level ok"),
                Ok(Ok(None)) => debug!(path = %path.display(), "Not 16-bit PCM, skipping level check"),
                Ok(Err(e)) => debug!(path = %path.display(), error = %e, "Level check skipped"),
                Err(e) => debug!(path = %path.display(), error = %e, "Level check aborted"),
            }
        }

        let text = self.transcribe(path).await?;
        Ok(Extraction::text(text))
    }
}

/// Root-mean-square level of a 16-bit PCM WAV file, streamed sample by sample.
///
/// Returns None when the samples are not 16-bit integers.
pub fn wav_rms(path: &Path) -> Result<Option<f64>> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Ok(None);
    }

    let mut sum_squares = 0.0;
    let mut count = 0u64;
    for sample in reader.into_samples::<i16>() {
        let sample = f64::from(sample.context("Failed to read WAV sample")?);
        sum_squares += sample * sample;
        count += 1;
    }

    if count == 0 {
        return Ok(Some(0.0));
    }
    Ok(Some((sum_squares / count as f64).sqrt()))
}
