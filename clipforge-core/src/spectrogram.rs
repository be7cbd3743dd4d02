//! Power spectral density spectrograms rendered straight to pixels.
//!
//! Each [`SpectrogramRenderer::render`] call builds its own
//! [`RenderContext`] and drops it on return, so renders never share
//! mutable state and the output depends only on the samples and rate.

use std::borrow::Cow;
use std::f32::consts::PI;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::SpectrogramSection;

/// FFT length per STFT frame.
pub const NFFT: usize = 256;
/// Samples shared by consecutive frames.
pub const OVERLAP: usize = 128;

const POWER_FLOOR: f32 = 1e-20;

/// Viridis control points, low to high.
const RAMP: [(f32, [f32; 3]); 5] = [
    (0.0, [68.0, 1.0, 84.0]),
    (0.25, [59.0, 82.0, 139.0]),
    (0.5, [33.0, 145.0, 140.0]),
    (0.75, [94.0, 201.0, 98.0]),
    (1.0, [253.0, 231.0, 37.0]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectrogramRenderer {
    width: u32,
    height: u32,
}

impl SpectrogramRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn from_config(section: &SpectrogramSection) -> Self {
        Self::new(section.width, section.height)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn render(&self, samples: &[f32], sample_rate: u32) -> RgbImage {
        let mut context = RenderContext::new(NFFT);
        let grid = context.psd_db(samples, sample_rate.max(1), NFFT - OVERLAP);
        paint(&grid, self.width, self.height)
    }
}

impl Default for SpectrogramRenderer {
    fn default() -> Self {
        Self::from_config(&SpectrogramSection::default())
    }
}

/// Per-render FFT plan, window and scratch space.
struct RenderContext {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    window_power: f32,
    frame: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl RenderContext {
    fn new(nfft: usize) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(nfft);
        let window = hann(nfft);
        let window_power: f32 = window.iter().map(|w| w * w).sum();
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self {
            fft,
            window,
            window_power,
            frame: vec![Complex::default(); nfft],
            scratch,
        }
    }

    /// One-sided PSD in dB, one row of `nfft / 2 + 1` bins per frame.
    fn psd_db(&mut self, samples: &[f32], sample_rate: u32, hop: usize) -> Vec<Vec<f32>> {
        let nfft = self.window.len();
        let signal: Cow<'_, [f32]> = if samples.len() < nfft {
            let mut buffer = samples.to_vec();
            buffer.resize(nfft, 0.0);
            Cow::Owned(buffer)
        } else {
            Cow::Borrowed(samples)
        };
        let frames = (signal.len() - nfft) / hop + 1;
        let bins = nfft / 2 + 1;
        let scale = 1.0 / (sample_rate as f32 * self.window_power);

        (0..frames)
            .map(|frame_index| {
                let start = frame_index * hop;
                for ((slot, sample), weight) in self
                    .frame
                    .iter_mut()
                    .zip(&signal[start..start + nfft])
                    .zip(&self.window)
                {
                    *slot = Complex::new(sample * weight, 0.0);
                }
                self.fft
                    .process_with_scratch(&mut self.frame, &mut self.scratch);
                (0..bins)
                    .map(|bin| {
                        let mut power = self.frame[bin].norm_sqr() * scale;
                        if bin != 0 && bin != nfft / 2 {
                            power *= 2.0;
                        }
                        10.0 * power.max(POWER_FLOOR).log10()
                    })
                    .collect()
            })
            .collect()
    }
}

fn hann(len: usize) -> Vec<f32> {
    if len == 1 {
        return vec![1.0];
    }
    let denominator = (len - 1) as f32;
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / denominator).cos())
        .collect()
}

/// Nearest-neighbour scale of the frame x bin grid onto the canvas.
/// Time runs left to right, frequency bottom to top.
fn paint(grid: &[Vec<f32>], width: u32, height: u32) -> RgbImage {
    let (min, max) = grid
        .iter()
        .flatten()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &value| {
            (lo.min(value), hi.max(value))
        });
    let span = max - min;
    let frames = grid.len();
    let bins = grid.first().map(Vec::len).unwrap_or(0);
    if frames == 0 || bins == 0 {
        return RgbImage::from_pixel(width, height, colour(0.0));
    }

    RgbImage::from_fn(width, height, |x, y| {
        let frame = (x as usize * frames / width as usize).min(frames - 1);
        let bin = ((height - 1 - y) as usize * bins / height as usize).min(bins - 1);
        let level = if span > 0.0 {
            (grid[frame][bin] - min) / span
        } else {
            0.0
        };
        colour(level)
    })
}

fn colour(level: f32) -> Rgb<u8> {
    let level = level.clamp(0.0, 1.0);
    let upper = RAMP
        .iter()
        .position(|(stop, _)| *stop >= level)
        .unwrap_or(RAMP.len() - 1)
        .max(1);
    let (lo_stop, lo) = RAMP[upper - 1];
    let (hi_stop, hi) = RAMP[upper];
    let t = (level - lo_stop) / (hi_stop - lo_stop);
    let channel = |i: usize| (lo[i] + (hi[i] - lo[i]) * t).round() as u8;
    Rgb([channel(0), channel(1), channel(2)])
}
