//! In-memory zip accumulation for one pipeline run.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::processor::{ProcessorError, ProcessorResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// The derivative kinds a part contributes, with their archive names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Video,
    FullAudio,
    AudioChunk(usize),
    Spectrogram(usize),
    Frame(usize),
}

impl EntryKind {
    pub fn file_name(&self, part: &str) -> String {
        match self {
            EntryKind::Video => format!("{part}.mp4"),
            EntryKind::FullAudio => format!("{part}_full_audio.wav"),
            EntryKind::AudioChunk(index) => format!("{part}_audio_chunk_{index}.wav"),
            EntryKind::Spectrogram(index) => format!("{part}_spectrogram_{index}.jpg"),
            EntryKind::Frame(index) => format!("{part}_frame_{index}.jpg"),
        }
    }
}

/// Entries of a single part, held back until the part completes.
#[derive(Debug, Clone)]
pub struct PartArtifacts {
    part: String,
    entries: Vec<ArchiveEntry>,
}

impl PartArtifacts {
    pub fn new(part: impl Into<String>) -> Self {
        Self {
            part: part.into(),
            entries: Vec::new(),
        }
    }

    pub fn part(&self) -> &str {
        &self.part
    }

    pub fn push(&mut self, kind: EntryKind, bytes: Vec<u8>) {
        let name = kind.file_name(&self.part);
        debug!(entry = %name, bytes = bytes.len(), "staged archive entry");
        self.entries.push(ArchiveEntry { name, bytes });
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Append-only entry list finalised into a deflate zip.
///
/// Names must be unique: a second write under an existing name is
/// rejected and leaves the builder untouched.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: Vec<ArchiveEntry>,
    names: HashSet<String>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> ProcessorResult<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(ProcessorError::DuplicateEntry(name));
        }
        self.names.insert(name.clone());
        self.entries.push(ArchiveEntry { name, bytes });
        Ok(())
    }

    /// Flushes a whole part, or nothing if any of its names collide.
    pub fn extend(&mut self, artifacts: PartArtifacts) -> ProcessorResult<()> {
        let mut incoming = HashSet::new();
        for entry in &artifacts.entries {
            if self.names.contains(&entry.name) || !incoming.insert(entry.name.as_str()) {
                return Err(ProcessorError::DuplicateEntry(entry.name.clone()));
            }
        }
        for entry in artifacts.entries {
            self.names.insert(entry.name.clone());
            self.entries.push(entry);
        }
        Ok(())
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries are written in insertion order with a fixed timestamp, so
    /// the same entry list always yields the same bytes.
    pub fn finalize(&self) -> ProcessorResult<Vec<u8>> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &self.entries {
            writer.start_file(entry.name.as_str(), options)?;
            writer
                .write_all(&entry.bytes)
                .map_err(|err| ProcessorError::Archive(format!("{}: {err}", entry.name)))?;
        }
        Ok(writer.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_back(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|index| {
                let mut file = archive.by_index(index).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    #[test]
    fn entry_names_follow_the_scheme() {
        assert_eq!(EntryKind::Video.file_name("part1"), "part1.mp4");
        assert_eq!(EntryKind::FullAudio.file_name("part2"), "part2_full_audio.wav");
        assert_eq!(
            EntryKind::AudioChunk(3).file_name("part1"),
            "part1_audio_chunk_3.wav"
        );
        assert_eq!(
            EntryKind::Spectrogram(0).file_name("part2"),
            "part2_spectrogram_0.jpg"
        );
        assert_eq!(EntryKind::Frame(12).file_name("part1"), "part1_frame_12.jpg");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut builder = ArchiveBuilder::new();
        builder.write("part1.mp4", b"first".to_vec()).unwrap();
        let err = builder.write("part1.mp4", b"second".to_vec()).unwrap_err();
        assert!(matches!(err, ProcessorError::DuplicateEntry(name) if name == "part1.mp4"));
        assert_eq!(builder.len(), 1);
        let contents = read_back(builder.finalize().unwrap());
        assert_eq!(contents, vec![("part1.mp4".to_string(), b"first".to_vec())]);
    }

    #[test]
    fn colliding_part_is_not_flushed() {
        let mut builder = ArchiveBuilder::new();
        builder.write("part1_frame_1.jpg", vec![1]).unwrap();
        let mut part = PartArtifacts::new("part1");
        part.push(EntryKind::Frame(0), vec![0]);
        part.push(EntryKind::Frame(1), vec![1]);
        assert!(builder.extend(part).is_err());
        assert_eq!(builder.names().collect::<Vec<_>>(), ["part1_frame_1.jpg"]);
    }

    #[test]
    fn finalize_keeps_order_and_is_repeatable() {
        let mut builder = ArchiveBuilder::new();
        let mut part = PartArtifacts::new("part2");
        part.push(EntryKind::Video, vec![7; 64]);
        part.push(EntryKind::Frame(0), vec![1, 2, 3]);
        builder.write("part1.mp4", vec![9; 128]).unwrap();
        builder.extend(part).unwrap();

        let first = builder.finalize().unwrap();
        let second = builder.finalize().unwrap();
        assert_eq!(first, second);

        let names: Vec<String> = read_back(first).into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["part1.mp4", "part2.mp4", "part2_frame_0.jpg"]);
    }

    #[test]
    fn empty_archive_is_still_valid() {
        let builder = ArchiveBuilder::new();
        assert!(read_back(builder.finalize().unwrap()).is_empty());
    }
}
