//! Durable output: script text, per-utterance clips, and the final podcast.
//!
//! Every write replaces whatever is at the target path. Nothing is appended
//! or versioned, so a rerun simply overwrites the previous run's files.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::config::OutputConfig;
use crate::error::PodcastError;

/// File layout for one pipeline run.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
    script_file: String,
    podcast_stem: String,
    clip_prefix: String,
}

impl OutputStore {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            script_file: config.script_file.clone(),
            podcast_stem: config.podcast_stem.clone(),
            clip_prefix: config.clip_prefix.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn script_path(&self) -> PathBuf {
        self.dir.join(&self.script_file)
    }

    /// Path of the raw clip for one utterance, e.g. `output_audio_007_Guest.mp3`.
    pub fn clip_path(&self, sequence_index: usize, speaker_label: &str, extension: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{:03}_{}.{}",
            self.clip_prefix,
            sequence_index,
            sanitize_file_component(speaker_label),
            extension
        ))
    }

    pub fn podcast_path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.podcast_stem, extension))
    }

    pub async fn write_script(&self, script: &str) -> Result<PathBuf, PodcastError> {
        let path = self.script_path();
        write_file(&path, script.as_bytes()).await?;
        Ok(path)
    }

    /// Script saved by a previous run, if any.
    pub async fn read_script(&self) -> Option<String> {
        fs::read_to_string(self.script_path()).await.ok()
    }

    pub async fn write_clip(
        &self,
        sequence_index: usize,
        speaker_label: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, PodcastError> {
        let path = self.clip_path(sequence_index, speaker_label, extension);
        write_file(&path, bytes).await?;
        Ok(path)
    }

    /// Previously written clip, if one exists and is non-empty.
    pub async fn read_clip(
        &self,
        sequence_index: usize,
        speaker_label: &str,
        extension: &str,
    ) -> Option<Vec<u8>> {
        let path = self.clip_path(sequence_index, speaker_label, extension);
        match fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }

    pub async fn write_podcast(&self, extension: &str, bytes: &[u8]) -> Result<PathBuf, PodcastError> {
        let path = self.podcast_path(extension);
        write_file(&path, bytes).await?;
        Ok(path)
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PodcastError> {
    let persistence = |source: std::io::Error| PodcastError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(persistence)?;
    }
    fs::write(path, bytes).await.map_err(persistence)
}

/// Make a speaker label safe to embed in a file name.
fn sanitize_file_component(label: &str) -> String {
    let sanitized: String = label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(40)
        .collect();

    if sanitized.is_empty() {
        "speaker".to_string()
    } else {
        sanitized
    }
}
