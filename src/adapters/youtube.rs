//! YouTube / video transcription.
//!
//! URLs are downloaded as audio with `yt-dlp` into a temp dir, then handed to
//! whisper. Local video files go straight to whisper.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use super::{Extraction, Extractor, WhisperExtractor};

/// Video extractor: yt-dlp for remote sources, whisper for the audio track
pub struct YouTubeExtractor {
    ytdlp_path: PathBuf,
    whisper: Arc<WhisperExtractor>,
}

impl YouTubeExtractor {
    pub fn new(ytdlp_path: impl Into<PathBuf>, whisper: Arc<WhisperExtractor>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            whisper,
        }
    }

    /// Download the audio track of `url` into `dir`, returning the file path
    async fn download_audio(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        let template = dir.join("audio.%(ext)s");

        let output = Command::new(&self.ytdlp_path)
            .args(["--no-playlist", "-x", "--audio-format", "mp3", "-o"])
            .arg(&template)
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run yt-dlp at {}", self.ytdlp_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed for {}: {}", url, stderr.trim());
        }

        let audio = dir.join("audio.mp3");
        if !audio.exists() {
            anyhow::bail!("yt-dlp finished but produced no audio for {}", url);
        }
        Ok(audio)
    }
}

#[async_trait]
impl Extractor for YouTubeExtractor {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let source = path.to_string_lossy();

        let text = if is_url(&source) {
            let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;
            info!(url = %source, "Downloading audio track");
            let audio = self.download_audio(&source, temp_dir.path()).await?;
            self.whisper.transcribe(&audio).await?
        } else {
            self.whisper.transcribe(path).await?
        };

        Ok(Extraction::text(text))
    }
}

/// Whether a source string is an http(s) URL
pub fn is_url(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
