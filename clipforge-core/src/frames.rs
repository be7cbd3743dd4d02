use image::DynamicImage;

use crate::segment::ClipHandle;

/// Position of one sampled frame inside a clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSlot {
    pub index: usize,
    /// Seconds from the start of the clip.
    pub offset: f64,
}

#[derive(Debug, Clone)]
pub struct FrameImage {
    pub slot: FrameSlot,
    pub image: DynamicImage,
}

/// One slot per whole second of the clip, truncating any fractional tail.
pub fn frame_schedule(clip: &ClipHandle<'_>) -> impl Iterator<Item = FrameSlot> {
    let whole_seconds = clip.duration().max(0.0).floor() as usize;
    (0..whole_seconds).map(|index| FrameSlot {
        index,
        offset: index as f64,
    })
}
