//! Configuration for notecrew.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (NOTECREW_HOME, NOTECREW_MAX_FILES, WHISPER_PATH,
//!    YTDLP_PATH, OPENAI_API_KEY)
//! 2. Config file (.notecrew/config.yaml)
//! 3. Defaults (~/.notecrew)
//!
//! Config file discovery:
//! - Searches current directory and parents for .notecrew/config.yaml
//! - Paths in config file are relative to the .notecrew/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Default per-session file cap
pub const DEFAULT_MAX_FILES_PER_SESSION: usize = 5;

/// Default small-lane ceiling (15 MiB, inclusive)
pub const DEFAULT_SMALL_FILE_THRESHOLD_BYTES: u64 = 15 * 1024 * 1024;

/// Default confidence under which an OCR segment needs review
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Default upper bound on how long an idle lane sleeps before rechecking
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_secs(1);

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub session: Option<SessionSection>,
    #[serde(default)]
    pub extractors: Option<ExtractorsSection>,
    #[serde(default)]
    pub persistence: Option<PersistenceSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSection {
    pub max_files_per_session: Option<usize>,
    pub small_file_threshold_bytes: Option<u64>,
    pub confidence_threshold: Option<f64>,
    pub idle_wait_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractorsSection {
    pub whisper_path: Option<String>,
    pub whisper_model: Option<String>,
    pub whisper_language: Option<String>,
    pub ytdlp_path: Option<String>,
    pub ocr_api_base: Option<String>,
    pub ocr_model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersistenceSection {
    pub backend: Option<PersistenceBackend>,
    /// Journal/database path (relative to the config directory)
    pub path: Option<String>,
}

/// Where task updates are persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    /// Append-only JSONL journal
    #[default]
    Jsonl,
    /// SQLite database
    Sqlite,
    /// Discard updates
    None,
}

/// Limits and thresholds for one task manager session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    /// Maximum number of tracked tasks
    pub max_files_per_session: usize,

    /// Files at or below this size go to the small lane
    pub small_file_threshold_bytes: u64,

    /// Segments strictly below this score need verification
    pub confidence_threshold: f64,

    /// Longest an idle or paused lane waits before rechecking
    #[serde(with = "duration_ms")]
    pub idle_wait: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_files_per_session: DEFAULT_MAX_FILES_PER_SESSION,
            small_file_threshold_bytes: DEFAULT_SMALL_FILE_THRESHOLD_BYTES,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }
}

impl SessionConfig {
    pub fn with_max_files(mut self, max: usize) -> Self {
        self.max_files_per_session = max;
        self
    }

    pub fn with_small_file_threshold(mut self, bytes: u64) -> Self {
        self.small_file_threshold_bytes = bytes;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    /// Reject settings the scheduler cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.max_files_per_session == 0 {
            anyhow::bail!("max_files_per_session must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            anyhow::bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        if self.idle_wait.is_zero() {
            anyhow::bail!("idle_wait must be greater than zero");
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Settings for the built-in extractors
#[derive(Debug, Clone, Serialize)]
pub struct ExtractorSettings {
    pub whisper_path: PathBuf,
    pub whisper_model: String,
    pub whisper_language: Option<String>,
    pub ytdlp_path: PathBuf,
    pub ocr_api_base: String,
    pub ocr_model: String,
    /// Never printed
    #[serde(skip)]
    pub openai_api_key: Option<String>,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            whisper_path: PathBuf::from("whisper"),
            whisper_model: "base".to_string(),
            whisper_language: None,
            ytdlp_path: PathBuf::from("yt-dlp"),
            ocr_api_base: "https://api.openai.com/v1".to_string(),
            ocr_model: "gpt-4o-mini".to_string(),
            openai_api_key: None,
        }
    }
}

/// Resolved persistence settings
#[derive(Debug, Clone, Serialize)]
pub struct PersistenceSettings {
    pub backend: PersistenceBackend,
    pub path: PathBuf,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Absolute path to notecrew home (journals, databases)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub session: SessionConfig,
    pub extractors: ExtractorSettings,
    pub persistence: PersistenceSettings,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".notecrew").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Merge a parsed config file (if any) with environment and defaults
fn resolve(file: Option<(&Path, ConfigFile)>, default_home: PathBuf) -> Result<ResolvedConfig> {
    let config_dir = file
        .as_ref()
        .and_then(|(path, _)| path.parent())
        .map(Path::to_path_buf);
    let config_file = file.as_ref().map(|(path, _)| path.to_path_buf());
    let parsed = file.map(|(_, parsed)| parsed);

    let home = if let Some(env_home) = env_var("NOTECREW_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(dir), Some(home)) = (
        config_dir.as_deref(),
        parsed.as_ref().and_then(|c| c.home.as_deref()),
    ) {
        resolve_path(dir, home)
    } else {
        default_home
    };

    let session_section = parsed.as_ref().and_then(|c| c.session.clone()).unwrap_or_default();
    let defaults = SessionConfig::default();
    let max_files = match env_var("NOTECREW_MAX_FILES") {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("NOTECREW_MAX_FILES is not a number: {}", raw))?,
        None => session_section
            .max_files_per_session
            .unwrap_or(defaults.max_files_per_session),
    };
    let session = SessionConfig {
        max_files_per_session: max_files,
        small_file_threshold_bytes: session_section
            .small_file_threshold_bytes
            .unwrap_or(defaults.small_file_threshold_bytes),
        confidence_threshold: session_section
            .confidence_threshold
            .unwrap_or(defaults.confidence_threshold),
        idle_wait: session_section
            .idle_wait_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.idle_wait),
    };
    session.validate()?;

    let ex = parsed.as_ref().and_then(|c| c.extractors.clone()).unwrap_or_default();
    let ex_defaults = ExtractorSettings::default();
    let extractors = ExtractorSettings {
        whisper_path: env_var("WHISPER_PATH")
            .or(ex.whisper_path)
            .map(PathBuf::from)
            .unwrap_or(ex_defaults.whisper_path),
        whisper_model: ex.whisper_model.unwrap_or(ex_defaults.whisper_model),
        whisper_language: ex.whisper_language,
        ytdlp_path: env_var("YTDLP_PATH")
            .or(ex.ytdlp_path)
            .map(PathBuf::from)
            .unwrap_or(ex_defaults.ytdlp_path),
        ocr_api_base: ex.ocr_api_base.unwrap_or(ex_defaults.ocr_api_base),
        ocr_model: ex.ocr_model.unwrap_or(ex_defaults.ocr_model),
        openai_api_key: env_var("OPENAI_API_KEY"),
    };

    let ps = parsed.as_ref().and_then(|c| c.persistence.clone()).unwrap_or_default();
    let backend = ps.backend.unwrap_or_default();
    let path = match (ps.path.as_deref(), config_dir.as_deref()) {
        (Some(p), Some(dir)) => resolve_path(dir, p),
        (Some(p), None) => PathBuf::from(p),
        (None, _) => match backend {
            PersistenceBackend::Sqlite => home.join("notecrew.db"),
            _ => home.join("tasks.jsonl"),
        },
    };

    Ok(ResolvedConfig {
        home,
        config_file,
        session,
        extractors,
        persistence: PersistenceSettings { backend, path },
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".notecrew");

    match find_config_file() {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            resolve(Some((&path, parsed)), default_home)
        }
        None => resolve(None, default_home),
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
