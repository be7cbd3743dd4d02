pub mod archive;
pub mod audio;
pub mod compress;
pub mod config;
pub mod error;
pub mod frames;
pub mod media;
pub mod processor;
pub mod segment;
pub mod spectrogram;

pub use archive::{ArchiveBuilder, ArchiveEntry, EntryKind, PartArtifacts};
pub use audio::{decode_wav, encode_wav, read_wav, AudioBuffer, AudioChunk, Chunks};
pub use compress::{bound_size, BudgetStatus, CompressedBlob, JpegCodec, LossyEncoder, SizeBudget};
pub use config::{
    load_pipeline_config, AudioSection, InputSection, MissingAudioPolicy, PipelineConfig,
    SpectrogramSection, ToolsSection, VideoSection, CHUNK_SECONDS, MAX_IMAGE_BYTES,
    MIN_CLIP_SECONDS, PART_COUNT, QUALITY_FLOOR, QUALITY_START, QUALITY_STEP, TARGET_SAMPLE_RATE,
};
pub use error::{ConfigError, Result};
pub use frames::{frame_schedule, FrameImage, FrameSlot};
pub use media::{
    AudioStreamInfo, FfmpegBackend, MediaBackend, MediaInfo, MediaSource, VideoStreamInfo,
};
pub use processor::{
    EntryRecord, PartReport, Processor, ProcessorError, ProcessorReport, ProcessorResult,
    StagingDir,
};
pub use segment::{segment, ClipHandle};
pub use spectrogram::SpectrogramRenderer;
