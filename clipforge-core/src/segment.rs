use crate::media::MediaSource;
use crate::processor::{ProcessorError, ProcessorResult};

/// Time window over a [`MediaSource`]. Borrowing keeps it a view: the
/// underlying media is only read when a backend renders the window.
#[derive(Debug, Clone, Copy)]
pub struct ClipHandle<'a> {
    pub source: &'a MediaSource,
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl<'a> ClipHandle<'a> {
    pub fn new(source: &'a MediaSource, index: usize, start: f64, end: f64) -> ProcessorResult<Self> {
        let duration = source.duration();
        if !(0.0..=duration).contains(&start) || !(start..=duration).contains(&end) {
            return Err(ProcessorError::InvalidClip(format!(
                "window [{start}, {end}] outside [0, {duration}]"
            )));
        }
        Ok(Self {
            source,
            index,
            start,
            end,
        })
    }

    /// Archive prefix for this clip: `part1`, `part2`, ...
    pub fn name(&self) -> String {
        format!("part{}", self.index + 1)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.duration() <= 0.0
    }
}

/// Splits the source into `count` consecutive windows of equal length.
/// The last window always ends exactly at the source duration.
pub fn segment(source: &MediaSource, count: usize) -> ProcessorResult<Vec<ClipHandle<'_>>> {
    if count == 0 {
        return Err(ProcessorError::InvalidClip(
            "segment count must be positive".into(),
        ));
    }
    let duration = source.duration();
    let boundary = |k: usize| {
        if k == count {
            duration
        } else {
            duration * k as f64 / count as f64
        }
    };
    (0..count)
        .map(|index| ClipHandle::new(source, index, boundary(index), boundary(index + 1)))
        .collect()
}
