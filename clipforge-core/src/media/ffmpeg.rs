use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{AudioStreamInfo, MediaBackend, MediaInfo, VideoStreamInfo};
use crate::config::PipelineConfig;
use crate::processor::{ProcessorError, ProcessorResult};
use crate::segment::ClipHandle;

/// [`MediaBackend`] driving the `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    audio_codec: String,
    probe_timeout: Duration,
    encode_timeout: Duration,
}

impl FfmpegBackend {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            ffmpeg: config.tools.ffmpeg.clone(),
            ffprobe: config.tools.ffprobe.clone(),
            audio_codec: config.video.audio_codec.clone(),
            probe_timeout: config.tools.probe_timeout(),
            encode_timeout: config.tools.encode_timeout(),
        }
    }

    /// Runs `-version` on both tools; used by health checks.
    pub async fn verify_tools(&self) -> ProcessorResult<()> {
        for program in [&self.ffmpeg, &self.ffprobe] {
            let mut command = Command::new(program);
            command.arg("-version");
            let output = run(program, command, self.probe_timeout).await?;
            if !output.status.success() {
                return Err(ProcessorError::ToolMissing(program.clone()));
            }
        }
        Ok(())
    }

    fn ffmpeg_command(&self) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command.arg("-y").arg("-hide_banner").arg("-loglevel").arg("error");
        command
    }

    async fn encode(&self, command: Command, dest: &Path) -> ProcessorResult<()> {
        let output = run(&self.ffmpeg, command, self.encode_timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessorError::EncodeFailure(format!(
                "ffmpeg could not write {}: {}",
                dest.display(),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe(&self, path: &Path) -> ProcessorResult<MediaInfo> {
        let mut command = Command::new(&self.ffprobe);
        command
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg("-show_format")
            .arg(path);
        let output = run(&self.ffprobe, command, self.probe_timeout).await?;
        if !output.status.success() {
            return Err(ProcessorError::DecodeFailure {
                path: path.to_path_buf(),
                reason: format!("ffprobe exited with {}", output.status),
            });
        }
        parse_probe(path, &output.stdout)
    }

    async fn write_video(
        &self,
        clip: &ClipHandle<'_>,
        dest: &Path,
        codec: &str,
    ) -> ProcessorResult<()> {
        let mut command = self.ffmpeg_command();
        command
            .arg("-ss")
            .arg(seconds(clip.start))
            .arg("-i")
            .arg(&clip.source.path)
            .arg("-t")
            .arg(seconds(clip.duration()))
            .arg("-c:v")
            .arg(codec)
            .arg("-c:a")
            .arg(&self.audio_codec)
            .arg(dest);
        debug!(part = %clip.name(), dest = %dest.display(), codec, "writing part video");
        self.encode(command, dest).await
    }

    async fn write_audio(
        &self,
        clip: &ClipHandle<'_>,
        dest: &Path,
        sample_rate: Option<u32>,
    ) -> ProcessorResult<()> {
        let mut command = self.ffmpeg_command();
        command
            .arg("-ss")
            .arg(seconds(clip.start))
            .arg("-i")
            .arg(&clip.source.path)
            .arg("-t")
            .arg(seconds(clip.duration()))
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le");
        if let Some(rate) = sample_rate {
            command.arg("-ar").arg(rate.to_string());
        }
        command.arg(dest);
        debug!(part = %clip.name(), dest = %dest.display(), ?sample_rate, "writing part audio");
        self.encode(command, dest).await
    }

    async fn extract_frame(
        &self,
        clip: &ClipHandle<'_>,
        offset: f64,
    ) -> ProcessorResult<DynamicImage> {
        let mut command = self.ffmpeg_command();
        command
            .arg("-ss")
            .arg(seconds(clip.start + offset))
            .arg("-i")
            .arg(&clip.source.path)
            .arg("-frames:v")
            .arg("1")
            .arg("-f")
            .arg("image2pipe")
            .arg("-c:v")
            .arg("png")
            .arg("pipe:1");
        let output = run(&self.ffmpeg, command, self.encode_timeout).await?;
        if !output.status.success() || output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessorError::DecodeFailure {
                path: clip.source.path.clone(),
                reason: format!("no frame at {:.3}s: {}", clip.start + offset, stderr.trim()),
            });
        }
        Ok(image::load_from_memory_with_format(
            &output.stdout,
            ImageFormat::Png,
        )?)
    }
}

async fn run(program: &Path, mut command: Command, limit: Duration) -> ProcessorResult<Output> {
    command
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    match timeout(limit, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(ProcessorError::ToolMissing(program.to_path_buf()))
        }
        Ok(Err(err)) => Err(ProcessorError::io(program, err)),
        Err(_) => Err(ProcessorError::Timeout(limit)),
    }
}

fn parse_probe(path: &Path, stdout: &[u8]) -> ProcessorResult<MediaInfo> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|err| ProcessorError::DecodeFailure {
            path: path.to_path_buf(),
            reason: format!("invalid ffprobe payload: {err}"),
        })?;
    parsed.into_media_info(path)
}

fn seconds(value: f64) -> String {
    format!("{:.3}", value.max(0.0))
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sample_rate: Option<String>,
    channels: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

impl FfprobeOutput {
    fn into_media_info(self, path: &Path) -> ProcessorResult<MediaInfo> {
        let duration = self
            .format
            .duration
            .as_deref()
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value >= 0.0)
            .ok_or_else(|| ProcessorError::DecodeFailure {
                path: path.to_path_buf(),
                reason: "container reports no duration".into(),
            })?;
        let video = self
            .streams
            .iter()
            .find(|stream| stream.codec_type.as_deref() == Some("video"))
            .map(|stream| VideoStreamInfo {
                codec: stream.codec_name.clone().unwrap_or_default(),
                width: stream.width.unwrap_or_default(),
                height: stream.height.unwrap_or_default(),
            });
        if video.is_none() {
            return Err(ProcessorError::DecodeFailure {
                path: path.to_path_buf(),
                reason: "no video stream".into(),
            });
        }
        let audio = self
            .streams
            .iter()
            .find(|stream| stream.codec_type.as_deref() == Some("audio"))
            .map(|stream| AudioStreamInfo {
                codec: stream.codec_name.clone().unwrap_or_default(),
                sample_rate: stream
                    .sample_rate
                    .as_deref()
                    .and_then(|rate| rate.parse().ok())
                    .unwrap_or_default(),
                channels: stream.channels.unwrap_or(1),
            });
        Ok(MediaInfo {
            duration,
            container: self.format.format_name.unwrap_or_default(),
            audio,
            video,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_PAYLOAD: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720},
            {"codec_type": "audio", "codec_name": "aac", "sample_rate": "44100", "channels": 2}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "10.000000"}
    }"#;

    #[test]
    fn parses_ffprobe_payload() {
        let parsed: FfprobeOutput = serde_json::from_str(PROBE_PAYLOAD).unwrap();
        let info = parsed.into_media_info(Path::new("clip.mp4")).unwrap();
        assert_eq!(info.duration, 10.0);
        let audio = info.audio.expect("audio stream");
        assert_eq!(audio.sample_rate, 44_100);
        assert_eq!(audio.channels, 2);
        assert_eq!(info.video.unwrap().height, 720);
    }

    #[test]
    fn malformed_payload_is_a_decode_failure() {
        let err = parse_probe(Path::new("clip.mp4"), b"{\"streams\": [").unwrap_err();
        match err {
            ProcessorError::DecodeFailure { path, reason } => {
                assert_eq!(path, PathBuf::from("clip.mp4"));
                assert!(reason.starts_with("invalid ffprobe payload"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        let info = parse_probe(Path::new("clip.mp4"), PROBE_PAYLOAD.as_bytes()).unwrap();
        assert_eq!(info.container, "mov,mp4,m4a,3gp,3g2,mj2");
    }

    #[test]
    fn payload_without_video_is_a_decode_failure() {
        let parsed: FfprobeOutput = serde_json::from_str(
            r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#,
        )
        .unwrap();
        let err = parsed.into_media_info(Path::new("song.mp4")).unwrap_err();
        assert!(matches!(err, ProcessorError::DecodeFailure { .. }));
    }

    #[test]
    fn payload_without_audio_probes_fine() {
        let parsed: FfprobeOutput = serde_json::from_str(
            r#"{"streams": [{"codec_type": "video"}], "format": {"duration": "4.5"}}"#,
        )
        .unwrap();
        let info = parsed.into_media_info(Path::new("silent.mkv")).unwrap();
        assert!(!info.has_audio());
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let mut config = PipelineConfig::default();
        config.tools.ffprobe = PathBuf::from("/nonexistent/clipforge-ffprobe");
        let backend = FfmpegBackend::from_config(&config);
        let err = backend.probe(Path::new("clip.mp4")).await.unwrap_err();
        assert!(matches!(err, ProcessorError::ToolMissing(_)));
    }
}
