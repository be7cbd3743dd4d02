//! Narrow seam over the external decode/encode tooling.
//!
//! Everything the pipeline needs from a multimedia toolkit goes through
//! [`MediaBackend`]: probing the source, cutting a part to a video file,
//! writing a part's audio as WAV and grabbing a single still frame.

mod ffmpeg;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;

use crate::processor::ProcessorResult;
use crate::segment::ClipHandle;

pub use ffmpeg::FfmpegBackend;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub duration: f64,
    pub container: String,
    pub audio: Option<AudioStreamInfo>,
    pub video: Option<VideoStreamInfo>,
}

impl MediaInfo {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// A probed input file. Clips borrow it, nothing copies the media.
#[derive(Debug, Clone)]
pub struct MediaSource {
    pub path: PathBuf,
    pub info: MediaInfo,
}

impl MediaSource {
    pub fn new(path: impl Into<PathBuf>, info: MediaInfo) -> Self {
        Self {
            path: path.into(),
            info,
        }
    }

    pub fn duration(&self) -> f64 {
        self.info.duration
    }
}

#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn probe(&self, path: &Path) -> ProcessorResult<MediaInfo>;

    /// Writes the clip window as a standalone video file.
    async fn write_video(&self, clip: &ClipHandle<'_>, dest: &Path, codec: &str)
        -> ProcessorResult<()>;

    /// Writes the clip window's audio as PCM WAV. `None` keeps the source
    /// sample rate and channel layout.
    async fn write_audio(
        &self,
        clip: &ClipHandle<'_>,
        dest: &Path,
        sample_rate: Option<u32>,
    ) -> ProcessorResult<()>;

    /// Decodes the frame shown `offset` seconds into the clip.
    async fn extract_frame(&self, clip: &ClipHandle<'_>, offset: f64)
        -> ProcessorResult<DynamicImage>;
}
