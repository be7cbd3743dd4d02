use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hex::encode as hex_encode;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::warn;
use uuid::Uuid;

use super::error::{ProcessorError, ProcessorResult};
use crate::archive::ArchiveEntry;
use crate::compress::{BudgetStatus, CompressedBlob};
use crate::segment::ClipHandle;

/// Scratch directory for one part. Removed when dropped, including on
/// early returns; [`StagingDir::cleanup`] reports removal failures.
#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    pub fn create(parent: Option<&Path>, part: &str) -> ProcessorResult<Self> {
        let prefix = format!("clipforge-{part}-");
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix(&prefix);
            builder
        };
        let dir = match parent {
            Some(parent) => builder
                .tempdir_in(parent)
                .map_err(|source| ProcessorError::io(parent, source))?,
            None => builder
                .tempdir()
                .map_err(|source| ProcessorError::io(std::env::temp_dir(), source))?,
        };
        Ok(Self { dir })
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!(path = %path.display(), error = %err, "failed to clean staging directory");
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryRecord {
    pub name: String,
    pub size_bytes: usize,
    pub sha256: String,
}

impl From<&ArchiveEntry> for EntryRecord {
    fn from(entry: &ArchiveEntry) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&entry.bytes);
        Self {
            name: entry.name.clone(),
            size_bytes: entry.bytes.len(),
            sha256: hex_encode(hasher.finalize()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PartReport {
    pub part: String,
    pub start: f64,
    pub end: f64,
    pub audio_chunks: usize,
    pub frames: usize,
    pub audio_skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lowest_quality: Option<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub budget_misses: Vec<String>,
    pub entries: Vec<EntryRecord>,
}

impl PartReport {
    pub fn new(clip: &ClipHandle<'_>) -> Self {
        Self {
            part: clip.name(),
            start: clip.start,
            end: clip.end,
            audio_chunks: 0,
            frames: 0,
            audio_skipped: false,
            lowest_quality: None,
            budget_misses: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn record_blob(&mut self, name: &str, blob: &CompressedBlob) {
        self.lowest_quality = Some(
            self.lowest_quality
                .map_or(blob.quality, |lowest| lowest.min(blob.quality)),
        );
        if blob.budget == BudgetStatus::Unmet {
            self.budget_misses.push(name.to_string());
        }
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessorReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub duration_seconds: f64,
    pub parts: Vec<PartReport>,
    pub completed_at: DateTime<Utc>,
}

impl ProcessorReport {
    pub fn new(source: impl Into<PathBuf>, duration_seconds: f64, parts: Vec<PartReport>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source: source.into(),
            duration_seconds,
            parts,
            completed_at: Utc::now(),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.parts.iter().map(|part| part.entries.len()).sum()
    }

    pub fn entry_names(&self) -> Vec<&str> {
        self.parts.iter().flat_map(|part| part.entry_names()).collect()
    }
}
