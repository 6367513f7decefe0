//! Plain text extractor.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{Extraction, Extractor};

/// Reads the file as UTF-8, verbatim
#[derive(Debug, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for TextExtractor {
    fn name(&self) -> &str {
        "text"
    }

    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read text file: {}", path.display()))?;

        Ok(Extraction::text(content))
    }
}
