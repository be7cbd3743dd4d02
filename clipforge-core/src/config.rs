use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Number of parts the source video is split into.
pub const PART_COUNT: usize = 2;
/// Sample rate used for chunking and spectrogram analysis.
pub const TARGET_SAMPLE_RATE: u32 = 22_050;
/// Length of one audio chunk in seconds.
pub const CHUNK_SECONDS: u32 = 5;
/// Byte budget for every image written to the archive.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const QUALITY_START: u8 = 95;
pub const QUALITY_FLOOR: u8 = 10;
pub const QUALITY_STEP: u8 = 10;
/// Parts shorter than this produce neither frames nor audio chunks.
pub const MIN_CLIP_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tools: ToolsSection,
    pub input: InputSection,
    pub video: VideoSection,
    pub audio: AudioSection,
    pub spectrogram: SpectrogramSection,
}

impl PipelineConfig {
    pub fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |reason: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.input.allowed_extensions.is_empty() {
            return Err(invalid("input.allowed_extensions must not be empty"));
        }
        if self.spectrogram.width == 0 || self.spectrogram.height == 0 {
            return Err(invalid("spectrogram dimensions must be positive"));
        }
        if self.tools.probe_timeout_seconds == 0 || self.tools.encode_timeout_seconds == 0 {
            return Err(invalid("tool timeouts must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub probe_timeout_seconds: u64,
    pub encode_timeout_seconds: u64,
}

impl ToolsSection {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_seconds)
    }
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            probe_timeout_seconds: 20,
            encode_timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputSection {
    pub allowed_extensions: Vec<String>,
}

impl InputSection {
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            allowed_extensions: ["mp4", "mov", "avi", "mkv"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoSection {
    pub codec: String,
    pub audio_codec: String,
}

impl Default for VideoSection {
    fn default() -> Self {
        Self {
            codec: "libx264".into(),
            audio_codec: "aac".into(),
        }
    }
}

/// What to do when the source has no audio stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingAudioPolicy {
    #[default]
    Fail,
    Skip,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    pub missing_audio: MissingAudioPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpectrogramSection {
    pub width: u32,
    pub height: u32,
}

impl Default for SpectrogramSection {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let config: PipelineConfig = load_toml(path)?;
    config.validate(path)?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/clipforge.toml");
        let config = load_pipeline_config(path).expect("config should parse");
        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.video.codec, "libx264");
        assert_eq!(config.audio.missing_audio, MissingAudioPolicy::Fail);
        assert_eq!(config.spectrogram.width, 640);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [audio]
            missing_audio = "skip"
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.missing_audio, MissingAudioPolicy::Skip);
        assert_eq!(config.tools.probe_timeout(), Duration::from_secs(20));
        assert!(config.input.accepts(Path::new("clip.MOV")));
        assert!(!config.input.accepts(Path::new("notes.txt")));
        assert!(!config.input.accepts(Path::new("no_extension")));
    }

    #[test]
    fn rejects_empty_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipforge.toml");
        std::fs::write(&path, "[input]\nallowed_extensions = []\n").unwrap();
        let err = load_pipeline_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[tools\nffmpeg = 1").unwrap();
        match load_pipeline_config(&path) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
