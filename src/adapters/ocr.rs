//! Vision-model OCR for image tasks.
//!
//! Posts the image to an OpenAI-compatible chat completions endpoint and asks
//! for the transcription as JSON segments with per-segment confidence.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ExtractorSettings;
use crate::domain::Segment;

use super::{Extraction, Extractor};

const OCR_PROMPT: &str = "Transcribe the text in this image accurately, preserving line breaks. \
Respond only with JSON of the form {\"segments\": [{\"text\": \"...\", \"confidence\": 0.0}]} \
with one segment per line of text and a confidence between 0 and 1.";

/// Chat completions response (only the fields we read)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Segment payload the model is asked to return
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SegmentPayload {
    Wrapped { segments: Vec<Segment> },
    Bare(Vec<Segment>),
}

/// Image extractor using a hosted vision model
pub struct VisionOcrExtractor {
    api_base: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl VisionOcrExtractor {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            model: model.into(),
            max_tokens: 1000,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &ExtractorSettings) -> Self {
        Self::new(
            settings.ocr_api_base.clone(),
            settings.openai_api_key.clone(),
            settings.ocr_model.clone(),
        )
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    async fn complete(&self, data_url: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .context("OPENAI_API_KEY is not set; cannot run image OCR")?;

        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": OCR_PROMPT },
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }]
            }))
            .send()
            .await
            .context("Failed to send OCR request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OCR request failed with {}: {}", status, body.trim());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OCR response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("OCR response contained no message content")
    }
}

#[async_trait]
impl Extractor for VisionOcrExtractor {
    fn name(&self) -> &str {
        "vision-ocr"
    }

    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image: {}", path.display()))?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let data_url = format!("data:{};base64,{}", mime_type(path), encoded);
        debug!(path = %path.display(), bytes = bytes.len(), "Sending image for OCR");

        let content = self.complete(&data_url).await?;
        Ok(Extraction::from_segments(parse_segments(&content)))
    }
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        _ => "image/jpeg",
    }
}

/// Strip a surrounding markdown code fence, if any
fn strip_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json, ```txt, ...)
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse model output into segments.
///
/// Output that is not the requested JSON becomes a single zero-confidence
/// segment so the task is routed to human verification.
pub fn parse_segments(content: &str) -> Vec<Segment> {
    let body = strip_fence(content);

    match serde_json::from_str::<SegmentPayload>(body) {
        Ok(SegmentPayload::Wrapped { segments }) | Ok(SegmentPayload::Bare(segments)) => segments
            .into_iter()
            .map(|s| {
                let confidence = if s.confidence.is_nan() { 0.0 } else { s.confidence.clamp(0.0, 1.0) };
                Segment::new(s.text, confidence)
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "OCR response was not segment JSON, treating as unscored text");
            vec![Segment::new(body, 0.0)]
        }
    }
}
