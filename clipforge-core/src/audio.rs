//! Mono sample buffers, WAV encoding and fixed-window chunking.

use std::io::{Cursor, Read};
use std::ops::Range;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::processor::{ProcessorError, ProcessorResult};

#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    /// Collapses interleaved frames to mono by averaging the channels.
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(sample_rate: u32, channels: u16, data: &[f32]) -> Self {
        let channels = usize::from(channels.max(1));
        let samples = if channels == 1 {
            data.to_vec()
        } else {
            data.chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };
        Self::new(sample_rate, samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Fixed-length windows of `chunk_seconds`; the last one may be shorter.
    pub fn chunks(&self, chunk_seconds: u32) -> Chunks<'_> {
        Chunks {
            buffer: self,
            chunk_len: self.sample_rate as usize * chunk_seconds as usize,
            offset: 0,
            index: 0,
        }
    }
}

/// Non-owning slice of an [`AudioBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct AudioChunk<'a> {
    pub index: usize,
    pub sample_rate: u32,
    pub offset: usize,
    pub samples: &'a [f32],
}

impl AudioChunk<'_> {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.samples.len()
    }
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    buffer: &'a AudioBuffer,
    chunk_len: usize,
    offset: usize,
    index: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = AudioChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.buffer.samples.len();
        if self.chunk_len == 0 || self.offset >= total {
            return None;
        }
        let end = (self.offset + self.chunk_len).min(total);
        let chunk = AudioChunk {
            index: self.index,
            sample_rate: self.buffer.sample_rate,
            offset: self.offset,
            samples: &self.buffer.samples[self.offset..end],
        };
        self.offset = end;
        self.index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.chunk_len == 0 {
            return (0, Some(0));
        }
        let remaining = self.buffer.samples.len().saturating_sub(self.offset);
        let count = remaining.div_ceil(self.chunk_len);
        (count, Some(count))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

/// Reads a WAV file into a mono buffer normalised to [-1.0, 1.0].
pub async fn read_wav(path: &Path) -> ProcessorResult<AudioBuffer> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ProcessorError::io(path, source))?;
    decode_wav(Cursor::new(bytes)).map_err(|err| ProcessorError::DecodeFailure {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

pub fn decode_wav<R: Read>(reader: R) -> Result<AudioBuffer, hound::Error> {
    let mut reader = WavReader::new(reader)?;
    let spec = reader.spec();
    let data: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    Ok(AudioBuffer::from_interleaved(
        spec.sample_rate,
        spec.channels,
        &data,
    ))
}

/// Encodes mono samples as 32-bit float WAV so they round-trip exactly.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> ProcessorResult<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 4));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_collapses_to_mean() {
        let data = [0.5, -0.25, 1.0, 0.0, -1.0, -0.5];
        let mono = AudioBuffer::from_interleaved(44_100, 2, &data);
        assert_eq!(mono.samples, vec![0.125, 0.5, -0.75]);
        for (frame, sample) in data.chunks_exact(2).zip(&mono.samples) {
            assert_eq!(*sample, (frame[0] + frame[1]) / 2.0);
        }
    }

    #[test]
    fn chunks_reassemble_the_buffer() {
        for len in [0usize, 1, 9, 10, 11, 29, 30, 31, 1000] {
            let samples: Vec<f32> = (0..len).map(|i| i as f32 * 0.001).collect();
            let buffer = AudioBuffer::new(2, samples.clone());
            let chunks: Vec<_> = buffer.chunks(5).collect();
            assert_eq!(chunks.len(), len.div_ceil(10), "len {len}");
            assert!(chunks.iter().all(|chunk| !chunk.samples.is_empty()));
            let joined: Vec<f32> = chunks.iter().flat_map(|c| c.samples.iter().copied()).collect();
            assert_eq!(joined, samples, "len {len}");
            for (expected, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, expected);
            }
        }
    }

    #[test]
    fn last_chunk_keeps_the_remainder() {
        let buffer = AudioBuffer::new(10, vec![0.0; 123]);
        let chunks: Vec<_> = buffer.chunks(5).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].range(), 100..123);
        assert_eq!(buffer.chunks(5).len(), 3);
    }

    #[test]
    fn float_wav_round_trips() {
        let samples = vec![0.0, 0.25, -0.75, 1.0, -1.0];
        let bytes = encode_wav(&samples, 22_050).unwrap();
        let decoded = decode_wav(Cursor::new(bytes)).unwrap();
        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.samples, samples);
    }

    #[test]
    fn int_wav_is_normalised_and_downmixed() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for sample in [16_384i16, 0, -32_768, -32_768] {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.set_position(0);
        let decoded = decode_wav(cursor).unwrap();
        assert_eq!(decoded.samples, vec![0.25, -1.0]);
        assert_eq!(decoded.duration(), 2.0 / 8_000.0);
    }

    #[tokio::test]
    async fn garbage_is_a_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"not a wav").unwrap();
        assert!(matches!(
            read_wav(&path).await,
            Err(ProcessorError::DecodeFailure { .. })
        ));
    }

    #[tokio::test]
    async fn reads_stereo_file_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [8_192i16, 0, -16_384, -16_384, 0, 0] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let buffer = read_wav(&path).await.unwrap();
        assert_eq!(buffer.sample_rate, 22_050);
        assert_eq!(buffer.samples, vec![0.125, -0.5, 0.0]);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_wav(&dir.path().join("absent.wav")).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Io { .. }));
    }
}
