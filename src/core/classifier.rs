//! File type classification.
//!
//! Maps a file name (or URL) to the [`FileType`] whose extractor handles it.

use std::path::Path;

use crate::adapters::youtube::is_url;
use crate::domain::{FileType, TaskError};

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com", "youtu.be"];

/// Classify a file name by extension (case-insensitive).
///
/// YouTube URLs classify as [`FileType::YouTube`]; anything unrecognised is
/// reported as [`TaskError::UnsupportedType`].
pub fn classify(name: &str) -> Result<FileType, TaskError> {
    if is_url(name) {
        return if is_youtube_url(name) {
            Ok(FileType::YouTube)
        } else {
            Err(TaskError::UnsupportedType(name.to_string()))
        };
    }

    let extension = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .ok_or_else(|| TaskError::UnsupportedType(name.to_string()))?;

    match extension.as_str() {
        "wav" | "mp3" | "m4a" => Ok(FileType::Audio),
        "jpg" | "jpeg" | "png" | "gif" | "pdf" => Ok(FileType::Image),
        "txt" => Ok(FileType::Text),
        "mp4" => Ok(FileType::YouTube),
        _ => Err(TaskError::UnsupportedType(name.to_string())),
    }
}

/// Whether `name` would classify successfully
pub fn is_supported(name: &str) -> bool {
    classify(name).is_ok()
}

fn is_youtube_url(url: &str) -> bool {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .rsplit('@')
        .next()
        .unwrap_or("");
    let host = host.split(':').next().unwrap_or("").to_ascii_lowercase();

    YOUTUBE_HOSTS.contains(&host.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(classify("memo.wav").unwrap(), FileType::Audio);
        assert_eq!(classify("song.MP3").unwrap(), FileType::Audio);
        assert_eq!(classify("voice.m4a").unwrap(), FileType::Audio);
        assert_eq!(classify("scan.JPG").unwrap(), FileType::Image);
        assert_eq!(classify("page.pdf").unwrap(), FileType::Image);
        assert_eq!(classify("/tmp/notes.txt").unwrap(), FileType::Text);
        assert_eq!(classify("lecture.mp4").unwrap(), FileType::YouTube);
    }

    #[test]
    fn test_unknown_extension_is_reported() {
        let err = classify("archive.tar.gz").unwrap_err();
        assert!(matches!(err, TaskError::UnsupportedType(ref n) if n == "archive.tar.gz"));

        assert!(classify("README").is_err());
        assert!(!is_supported("slides.pptx"));
    }

    #[test]
    fn test_youtube_urls() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap(),
            FileType::YouTube
        );
        assert_eq!(classify("https://youtu.be/dQw4w9WgXcQ").unwrap(), FileType::YouTube);
        assert!(classify("https://example.com/video").is_err());
        assert!(classify("https://notyoutube.com/watch").is_err());
    }
}
