//! Extraction collaborators.
//!
//! Each [`FileType`] is handled by one [`Extractor`]. The core only sees the
//! trait; the implementations here shell out to local tools or call a
//! vision model over HTTP.

pub mod ocr;
pub mod text;
pub mod whisper;
pub mod youtube;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::ExtractorSettings;
use crate::domain::{FileType, Segment};

pub use ocr::VisionOcrExtractor;
pub use text::TextExtractor;
pub use whisper::WhisperExtractor;
pub use youtube::YouTubeExtractor;

/// Output of an extraction
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Full extracted text
    pub text: String,

    /// Scored segments (only meaningful for image extraction)
    pub segments: Option<Vec<Segment>>,
}

impl Extraction {
    /// Plain text without confidence data
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            segments: None,
        }
    }

    /// Text assembled from scored segments, joined by spaces
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            text,
            segments: Some(segments),
        }
    }
}

/// Trait for extraction collaborators.
///
/// Implementations must be safe to call concurrently from both lanes.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Human-readable extractor name
    fn name(&self) -> &str;

    /// Convert the source at `path` into text
    async fn extract(&self, path: &Path) -> Result<Extraction>;
}

/// Capability table mapping file types to extractors
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<FileType, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry wired to the built-in extractors
    pub fn with_defaults(settings: &ExtractorSettings) -> Self {
        let whisper = Arc::new(WhisperExtractor::from_settings(settings));

        Self::new()
            .with(FileType::Text, Arc::new(TextExtractor::new()))
            .with(FileType::Audio, whisper.clone())
            .with(FileType::Image, Arc::new(VisionOcrExtractor::from_settings(settings)))
            .with(
                FileType::YouTube,
                Arc::new(YouTubeExtractor::new(settings.ytdlp_path.clone(), whisper)),
            )
    }

    /// Register (or replace) the extractor for a file type
    pub fn register(&mut self, file_type: FileType, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(file_type, extractor);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, file_type: FileType, extractor: Arc<dyn Extractor>) -> Self {
        self.register(file_type, extractor);
        self
    }

    /// Look up the extractor for a file type
    pub fn get(&self, file_type: FileType) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(&file_type).cloned()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for file_type in FileType::ALL {
            if let Some(extractor) = self.extractors.get(&file_type) {
                map.entry(&file_type, &extractor.name());
            }
        }
        map.finish()
    }
}
