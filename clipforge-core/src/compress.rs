//! Size-bounded lossy re-encoding.
//!
//! [`bound_size`] walks the quality ladder downwards until the encoding
//! fits the byte budget. The budget is best-effort: when even the last
//! rung of the ladder is too large that encoding is returned flagged
//! [`BudgetStatus::Unmet`] rather than failing.

use image::codecs::jpeg;
use image::{DynamicImage, RgbImage};
use serde::Serialize;
use tracing::warn;

use crate::config::{MAX_IMAGE_BYTES, QUALITY_FLOOR, QUALITY_START, QUALITY_STEP};
use crate::processor::ProcessorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBudget {
    pub max_bytes: usize,
    pub start: u8,
    pub floor: u8,
    pub step: u8,
}

impl SizeBudget {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }

    /// Qualities tried in order: `start`, `start - step`, ... Another step is
    /// taken only while the current quality is still above `floor`.
    pub fn ladder(&self) -> impl Iterator<Item = u8> {
        let SizeBudget { floor, step, .. } = *self;
        std::iter::successors(Some(self.start), move |&quality| {
            if step == 0 || quality <= floor {
                return None;
            }
            quality.checked_sub(step).filter(|next| *next > 0)
        })
    }
}

impl Default for SizeBudget {
    fn default() -> Self {
        Self {
            max_bytes: MAX_IMAGE_BYTES,
            start: QUALITY_START,
            floor: QUALITY_FLOOR,
            step: QUALITY_STEP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Met,
    Unmet,
}

#[derive(Debug, Clone)]
pub struct CompressedBlob {
    pub bytes: Vec<u8>,
    pub quality: u8,
    pub attempts: usize,
    pub budget: BudgetStatus,
}

pub trait LossyEncoder: Send + Sync {
    fn encode(&self, image: &RgbImage, quality: u8) -> ProcessorResult<Vec<u8>>;
}

/// Baseline JPEG via the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl LossyEncoder for JpegCodec {
    fn encode(&self, image: &RgbImage, quality: u8) -> ProcessorResult<Vec<u8>> {
        let mut bytes = Vec::new();
        jpeg::JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
            .encode_image(image)?;
        Ok(bytes)
    }
}

pub fn bound_size<E>(
    image: &DynamicImage,
    budget: &SizeBudget,
    encoder: &E,
) -> ProcessorResult<CompressedBlob>
where
    E: LossyEncoder + ?Sized,
{
    let rgb = image.to_rgb8();
    let mut last = None;
    for (attempt, quality) in budget.ladder().enumerate() {
        let bytes = encoder.encode(&rgb, quality)?;
        if bytes.len() <= budget.max_bytes {
            return Ok(CompressedBlob {
                bytes,
                quality,
                attempts: attempt + 1,
                budget: BudgetStatus::Met,
            });
        }
        last = Some(CompressedBlob {
            bytes,
            quality,
            attempts: attempt + 1,
            budget: BudgetStatus::Unmet,
        });
    }
    // The ladder always yields `start`, so at least one encode happened.
    let blob = last.ok_or_else(|| {
        crate::processor::ProcessorError::EncodeFailure("empty quality ladder".into())
    })?;
    warn!(
        bytes = blob.bytes.len(),
        max_bytes = budget.max_bytes,
        quality = blob.quality,
        "size budget unmet at lowest quality"
    );
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};
    use std::sync::Mutex;

    /// Size grows linearly with quality; records every quality it sees.
    #[derive(Default)]
    struct LinearEncoder {
        seen: Mutex<Vec<u8>>,
    }

    impl LossyEncoder for LinearEncoder {
        fn encode(&self, _image: &RgbImage, quality: u8) -> ProcessorResult<Vec<u8>> {
            self.seen.lock().unwrap().push(quality);
            Ok(vec![0; usize::from(quality) * 100])
        }
    }

    fn noise(width: u32, height: u32) -> RgbImage {
        let mut state = 0x2545_f491u32;
        ImageBuffer::from_fn(width, height, |_, _| {
            let mut next = || {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state & 0xff) as u8
            };
            Rgb([next(), next(), next()])
        })
    }

    #[test]
    fn default_ladder_steps_from_95_to_5() {
        let ladder: Vec<u8> = SizeBudget::default().ladder().collect();
        assert_eq!(ladder, vec![95, 85, 75, 65, 55, 45, 35, 25, 15, 5]);
    }

    #[test]
    fn ladder_stops_once_quality_reaches_the_floor() {
        let budget = SizeBudget {
            max_bytes: 1,
            start: 50,
            floor: 10,
            step: 20,
        };
        assert_eq!(budget.ladder().collect::<Vec<_>>(), vec![50, 30, 10]);
    }

    #[test]
    fn stops_at_first_quality_that_fits() {
        let encoder = LinearEncoder::default();
        let image = DynamicImage::ImageRgb8(noise(4, 4));
        let blob = bound_size(&image, &SizeBudget::new(5_000), &encoder).unwrap();
        assert_eq!(blob.quality, 45);
        assert_eq!(blob.attempts, 6);
        assert_eq!(blob.budget, BudgetStatus::Met);
        assert_eq!(*encoder.seen.lock().unwrap(), vec![95, 85, 75, 65, 55, 45]);
    }

    #[test]
    fn budget_met_only_at_quality_five() {
        let encoder = LinearEncoder::default();
        let image = DynamicImage::ImageRgb8(noise(4, 4));
        let blob = bound_size(&image, &SizeBudget::new(600), &encoder).unwrap();
        assert_eq!(blob.budget, BudgetStatus::Met);
        assert_eq!(blob.quality, 5);
        assert_eq!(blob.attempts, 10);
        assert_eq!(blob.bytes.len(), 500);
    }

    #[test]
    fn unreachable_budget_returns_last_encoding() {
        let encoder = LinearEncoder::default();
        let image = DynamicImage::ImageRgb8(noise(4, 4));
        let blob = bound_size(&image, &SizeBudget::new(100), &encoder).unwrap();
        assert_eq!(blob.budget, BudgetStatus::Unmet);
        assert_eq!(blob.quality, 5);
        assert_eq!(blob.attempts, 10);
        assert_eq!(blob.bytes.len(), 500);
        assert_eq!(encoder.seen.lock().unwrap().len(), 10);
    }

    #[test]
    fn jpeg_size_shrinks_down_the_ladder() {
        let image = noise(96, 96);
        let sizes: Vec<usize> = SizeBudget::default()
            .ladder()
            .map(|quality| JpegCodec.encode(&image, quality).unwrap().len())
            .collect();
        assert_eq!(sizes.len(), 10);
        for pair in sizes.windows(2) {
            assert!(pair[1] <= pair[0], "sizes not monotonic: {sizes:?}");
        }
    }

    #[test]
    fn generous_budget_keeps_top_quality() {
        let image = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(32, 24, Rgba([10, 200, 30, 128])));
        let blob = bound_size(&image, &SizeBudget::default(), &JpegCodec).unwrap();
        assert_eq!(blob.quality, 95);
        assert_eq!(blob.attempts, 1);
        let decoded = image::load_from_memory(&blob.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }
}
