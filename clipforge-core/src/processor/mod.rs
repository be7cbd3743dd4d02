mod error;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveBuilder, EntryKind, PartArtifacts};
use crate::audio::{encode_wav, read_wav};
use crate::compress::{bound_size, JpegCodec, LossyEncoder, SizeBudget};
use crate::config::{
    MissingAudioPolicy, PipelineConfig, CHUNK_SECONDS, MIN_CLIP_SECONDS, PART_COUNT,
    TARGET_SAMPLE_RATE,
};
use crate::frames::{frame_schedule, FrameImage};
use crate::media::{FfmpegBackend, MediaBackend, MediaSource};
use crate::segment::{segment, ClipHandle};
use crate::spectrogram::SpectrogramRenderer;

pub use error::{ProcessorError, ProcessorResult};
pub use types::{EntryRecord, PartReport, ProcessorReport, StagingDir};

/// Runs the derivative pipeline for one input video.
///
/// Parts are processed one after another. Each part stages its entries in
/// a [`PartArtifacts`] and is flushed into the archive only once every
/// stage of that part succeeded, so a failing part never leaves half of
/// its entries behind.
#[derive(Clone)]
pub struct Processor {
    config: Arc<PipelineConfig>,
    backend: Arc<dyn MediaBackend>,
    encoder: Arc<dyn LossyEncoder>,
    renderer: SpectrogramRenderer,
    budget: SizeBudget,
    staging_root: Option<PathBuf>,
}

impl Processor {
    pub fn new(config: PipelineConfig, backend: Arc<dyn MediaBackend>) -> Self {
        let renderer = SpectrogramRenderer::from_config(&config.spectrogram);
        Self {
            config: Arc::new(config),
            backend,
            encoder: Arc::new(JpegCodec),
            renderer,
            budget: SizeBudget::default(),
            staging_root: None,
        }
    }

    pub fn with_ffmpeg(config: PipelineConfig) -> Self {
        let backend = Arc::new(FfmpegBackend::from_config(&config));
        Self::new(config, backend)
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn LossyEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_budget(mut self, budget: SizeBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Parent directory for per-part staging; defaults to the system temp dir.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Checks the container allow-list and probes the file.
    pub async fn open_source(&self, path: &Path) -> ProcessorResult<MediaSource> {
        if !self.config.input.accepts(path) {
            return Err(ProcessorError::UnsupportedContainer(
                path.display().to_string(),
            ));
        }
        fs::metadata(path)
            .await
            .map_err(|source| ProcessorError::io(path, source))?;
        let info = self.backend.probe(path).await?;
        Ok(MediaSource::new(path, info))
    }

    pub async fn process_to_archive(
        &self,
        path: &Path,
    ) -> ProcessorResult<(Vec<u8>, ProcessorReport)> {
        let mut archive = ArchiveBuilder::new();
        let report = self.process(path, &mut archive).await?;
        Ok((archive.finalize()?, report))
    }

    /// Processes every part into `archive`. On error, parts that finished
    /// before the failing one remain in the builder.
    pub async fn process(
        &self,
        path: &Path,
        archive: &mut ArchiveBuilder,
    ) -> ProcessorResult<ProcessorReport> {
        let source = self.open_source(path).await?;
        info!(
            source = %path.display(),
            duration = source.duration(),
            has_audio = source.info.has_audio(),
            "processing video"
        );

        let clips = segment(&source, PART_COUNT)?;
        let mut parts = Vec::with_capacity(clips.len());
        for clip in &clips {
            let (artifacts, report) = self.process_part(clip).await.map_err(|err| {
                ProcessorError::PartFailed {
                    part: clip.name(),
                    source: Box::new(err),
                }
            })?;
            archive.extend(artifacts)?;
            info!(
                part = %report.part,
                entries = report.entries.len(),
                audio_chunks = report.audio_chunks,
                frames = report.frames,
                "part complete"
            );
            parts.push(report);
        }

        let report = ProcessorReport::new(path, source.duration(), parts);
        info!(run_id = %report.run_id, entries = report.entry_count(), "processing complete");
        Ok(report)
    }

    async fn process_part(
        &self,
        clip: &ClipHandle<'_>,
    ) -> ProcessorResult<(PartArtifacts, PartReport)> {
        let name = clip.name();
        let mut artifacts = PartArtifacts::new(&name);
        let mut report = PartReport::new(clip);
        if clip.is_empty() {
            warn!(part = %name, "part has zero duration, nothing to derive");
            return Ok((artifacts, report));
        }

        let staging = StagingDir::create(self.staging_root.as_deref(), &name)?;

        let video_path = staging.join(&EntryKind::Video.file_name(&name));
        self.backend
            .write_video(clip, &video_path, &self.config.video.codec)
            .await?;
        artifacts.push(EntryKind::Video, read_staged(&video_path).await?);

        if clip.source.info.has_audio() {
            self.derive_audio(clip, &staging, &mut artifacts, &mut report)
                .await?;
        } else {
            match self.config.audio.missing_audio {
                MissingAudioPolicy::Fail => {
                    return Err(ProcessorError::NoAudioTrack {
                        path: clip.source.path.clone(),
                    });
                }
                MissingAudioPolicy::Skip => {
                    warn!(part = %name, "source has no audio track, skipping audio entries");
                    report.audio_skipped = true;
                }
            }
        }

        self.derive_frames(clip, &mut artifacts, &mut report).await?;

        staging.cleanup();
        report.entries = artifacts.entries().iter().map(EntryRecord::from).collect();
        Ok((artifacts, report))
    }

    async fn derive_audio(
        &self,
        clip: &ClipHandle<'_>,
        staging: &StagingDir,
        artifacts: &mut PartArtifacts,
        report: &mut PartReport,
    ) -> ProcessorResult<()> {
        let name = artifacts.part().to_string();

        let full_path = staging.join(&EntryKind::FullAudio.file_name(&name));
        self.backend.write_audio(clip, &full_path, None).await?;
        artifacts.push(EntryKind::FullAudio, read_staged(&full_path).await?);

        if clip.duration() < MIN_CLIP_SECONDS {
            debug!(part = %name, duration = clip.duration(), "part too short for audio chunks");
            return Ok(());
        }

        let resampled_path = staging.join(&format!("{name}_resampled.wav"));
        self.backend
            .write_audio(clip, &resampled_path, Some(TARGET_SAMPLE_RATE))
            .await?;
        let buffer = read_wav(&resampled_path).await?;
        debug!(
            part = %name,
            samples = buffer.len(),
            sample_rate = buffer.sample_rate,
            "resampled audio loaded"
        );

        for chunk in buffer.chunks(CHUNK_SECONDS) {
            artifacts.push(
                EntryKind::AudioChunk(chunk.index),
                encode_wav(chunk.samples, chunk.sample_rate)?,
            );
            let image = self.renderer.render(chunk.samples, chunk.sample_rate);
            let blob = bound_size(
                &DynamicImage::ImageRgb8(image),
                &self.budget,
                self.encoder.as_ref(),
            )?;
            debug!(
                part = %name,
                chunk = chunk.index,
                samples = ?chunk.range(),
                quality = blob.quality,
                "audio chunk derived"
            );
            let kind = EntryKind::Spectrogram(chunk.index);
            report.record_blob(&kind.file_name(&name), &blob);
            artifacts.push(kind, blob.bytes);
            report.audio_chunks += 1;
        }
        Ok(())
    }

    async fn derive_frames(
        &self,
        clip: &ClipHandle<'_>,
        artifacts: &mut PartArtifacts,
        report: &mut PartReport,
    ) -> ProcessorResult<()> {
        for slot in frame_schedule(clip) {
            let frame = FrameImage {
                slot,
                image: self.backend.extract_frame(clip, slot.offset).await?,
            };
            let blob = bound_size(&frame.image, &self.budget, self.encoder.as_ref())?;
            let kind = EntryKind::Frame(frame.slot.index);
            report.record_blob(&kind.file_name(artifacts.part()), &blob);
            artifacts.push(kind, blob.bytes);
            report.frames += 1;
        }
        Ok(())
    }
}

async fn read_staged(path: &Path) -> ProcessorResult<Vec<u8>> {
    fs::read(path)
        .await
        .map_err(|source| ProcessorError::io(path, source))
}
