//! Command-line interface for notecrew.
//!
//! Provides commands for extracting a batch of files, reviewing
//! low-confidence OCR, classifying files, and reading the task journal.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::adapters::ExtractorRegistry;
use crate::config::{self, PersistenceBackend};
use crate::core::{classify, TaskManager};
use crate::domain::{Task, TaskStatus};
use crate::persistence::{open_sink, JsonlSink};

/// notecrew - Dual-lane note extraction orchestrator
#[derive(Parser, Debug)]
#[command(name = "notecrew")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract text from a batch of files
    Process {
        /// Files (or YouTube URLs) to process
        #[arg(required = true)]
        files: Vec<String>,

        /// Topic to group the files under
        #[arg(short, long)]
        topic: Option<String>,

        /// Prompt for corrections on low-confidence results
        #[arg(long)]
        verify: bool,
    },

    /// Show the file type each input would be processed as
    Classify {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Show journal records (optionally for one file)
    History {
        path: Option<PathBuf>,

        /// Maximum number of records to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Process {
                files,
                topic,
                verify,
            } => process_files(files, topic, verify).await,
            Commands::Classify { files } => {
                classify_files(&files);
                Ok(())
            }
            Commands::History { path, limit } => show_history(path, limit).await,
            Commands::Config => show_config(),
        }
    }
}

/// Add, run, and report a batch of files
async fn process_files(files: Vec<String>, topic: Option<String>, verify: bool) -> Result<()> {
    let cfg = config::config()?;
    let registry = ExtractorRegistry::with_defaults(&cfg.extractors);
    let sink = open_sink(&cfg.persistence).await?;
    let manager = TaskManager::new(cfg.session.clone(), registry, sink)?;

    let mut added = 0;
    for file in &files {
        let file_type = match classify(file) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("Skipping {}: {}", file, e);
                continue;
            }
        };

        let result = match &topic {
            Some(topic) => manager.add_task_with_topic(file, file_type, topic.clone()).await,
            None => manager.add_task(file, file_type).await,
        };
        match result {
            Ok(task) => {
                added += 1;
                eprintln!("Queued {} ({}, {} lane)", file, task.file_type, task.lane);
            }
            Err(e) => eprintln!("Skipping {}: {}", file, e),
        }
    }

    if added == 0 {
        anyhow::bail!("No files to process");
    }

    manager.run_until_drained().await?;

    if verify {
        let mut stdin = BufReader::new(tokio::io::stdin());
        for task in manager.get_tasks_needing_verification().await {
            if let Some(text) = prompt_correction(&task, &mut stdin).await? {
                manager.apply_user_verification(&task.path, text).await?;
            }
        }
    }

    let tasks = manager.tasks().await;
    for task in &tasks {
        print_task(task);
    }

    let status = manager.get_status().await;
    eprintln!(
        "\n[{} completed, {} need verification, {} failed]",
        status.completed, status.needs_verification, status.failed
    );

    if status.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn print_task(task: &Task) {
    println!("=== {} [{}] ===", task.path.display(), task.status);
    match task.status {
        TaskStatus::Failed => {
            println!("Error: {}", task.error.as_deref().unwrap_or("unknown"));
        }
        _ => {
            if let Some(result) = &task.result {
                println!("{}", result);
            }
        }
    }
    if let Some(low) = task.low_confidence_segments.as_ref().filter(|l| !l.is_empty()) {
        if task.status == TaskStatus::NeedsVerification {
            println!("Low confidence:");
            for segment in low {
                println!("  {:.2}  {}", segment.confidence, segment.text);
            }
        }
    }
    println!();
}

/// Ask for corrected text; empty input keeps the task parked
async fn prompt_correction<R>(task: &Task, input: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    eprintln!("\n{} needs verification.", task.path.display());
    if let Some(result) = &task.result {
        eprintln!("Extracted text:\n{}", result);
    }
    for segment in task.low_confidence_segments.iter().flatten() {
        eprintln!("  low confidence ({:.2}): {}", segment.confidence, segment.text);
    }
    eprint!("Corrected text (empty to skip): ");
    io::stderr().flush().ok();

    let mut line = String::new();
    input
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;

    let line = line.trim();
    if line.is_empty() {
        Ok(None)
    } else {
        Ok(Some(line.to_string()))
    }
}

fn classify_files(files: &[String]) {
    for file in files {
        match classify(file) {
            Ok(file_type) => println!("{}\t{}", file_type, file),
            Err(e) => println!("-\t{} ({})", file, e),
        }
    }
}

/// Print journal records, newest last
async fn show_history(path: Option<PathBuf>, limit: usize) -> Result<()> {
    let cfg = config::config()?;
    if cfg.persistence.backend != PersistenceBackend::Jsonl {
        anyhow::bail!("History is only available for the jsonl persistence backend");
    }

    let journal = JsonlSink::open(&cfg.persistence.path).await?;
    let records = match &path {
        Some(path) => journal.history(path).await?,
        None => journal.replay().await?,
    };

    if records.is_empty() {
        println!("No records found.");
        return Ok(());
    }

    let skip = records.len().saturating_sub(limit);
    for record in records.iter().skip(skip) {
        let detail = match (&record.error, &record.content_hash) {
            (Some(error), _) => format!("error: {}", error),
            (None, Some(hash)) => format!("content {}", hash),
            (None, None) => String::new(),
        };
        println!(
            "{}  {:<16} {:<18} {}  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            format!("{:?}", record.kind),
            record.status,
            record.path.display(),
            detail
        );
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("notecrew configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Home:        {}", cfg.home.display());
    println!();
    println!("Session:");
    println!("  Max files:            {}", cfg.session.max_files_per_session);
    println!("  Small file threshold: {} bytes", cfg.session.small_file_threshold_bytes);
    println!("  Confidence threshold: {}", cfg.session.confidence_threshold);
    println!("  Idle wait:            {}ms", cfg.session.idle_wait.as_millis());
    println!();
    println!("Extractors:");
    println!("  whisper: {} (model {})", cfg.extractors.whisper_path.display(), cfg.extractors.whisper_model);
    println!("  yt-dlp:  {}", cfg.extractors.ytdlp_path.display());
    println!("  OCR:     {} ({})", cfg.extractors.ocr_api_base, cfg.extractors.ocr_model);
    println!(
        "  API key: {}",
        if cfg.extractors.openai_api_key.is_some() { "set" } else { "(not set)" }
    );
    println!();
    println!("Persistence:");
    println!("  Backend: {:?}", cfg.persistence.backend);
    println!("  Path:    {}", cfg.persistence.path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileType, Lane};

    fn parked_task() -> Task {
        let mut task = Task::new("scan.png", FileType::Image, Lane::Small);
        task.start().unwrap();
        task.finish("ok maybe".to_string(), None, 0.7).unwrap();
        task
    }

    #[tokio::test]
    async fn test_prompt_reads_one_line_per_task() {
        let task = parked_task();
        let mut input: &[u8] = b"ok surely\n\nlast one\n";

        assert_eq!(
            prompt_correction(&task, &mut input).await.unwrap().as_deref(),
            Some("ok surely")
        );
        assert_eq!(prompt_correction(&task, &mut input).await.unwrap(), None);
        assert_eq!(
            prompt_correction(&task, &mut input).await.unwrap().as_deref(),
            Some("last one")
        );
    }

    #[tokio::test]
    async fn test_prompt_at_end_of_input_skips() {
        let task = parked_task();
        let mut input: &[u8] = b"";
        assert_eq!(prompt_correction(&task, &mut input).await.unwrap(), None);
    }
}
