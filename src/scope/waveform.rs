use crate::scope::{PickArea, bin_boxes};

/// Tone resolution of the waveform axis.
pub const TONES: usize = 128;

// Opacity boost exponent for legibility.
const GAMMA: f32 = 1.0 / 1.5;

/// Waveform direction: which image axis is kept spatial.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveformOrientation {
    /// Columns stay spatial; tones run vertically.
    Horizontal,
    /// Rows stay spatial; tones run horizontally.
    Vertical,
}

/// A 2-D histogram: one axis is image column/row, the other the 128-bin
/// tone. `bins` is image-shaped, three channels per cell.
#[derive(Clone, Debug)]
pub struct WaveformScope {
    /// Orientation the scope was binned with.
    pub orientation: WaveformOrientation,
    /// Bin-image width.
    pub width: usize,
    /// Bin-image height.
    pub height: usize,
    /// `bins[(y * width + x) * 3 + c]` counts.
    pub bins: Vec<u32>,
}

impl WaveformScope {
    /// Largest cell count.
    pub fn max(&self) -> u32 {
        self.bins.iter().copied().max().unwrap_or(0)
    }

    /// Per-channel total count; equals the pixels considered.
    pub fn total(&self, channel: usize) -> u64 {
        self.bins
            .chunks_exact(3)
            .map(|cell| u64::from(cell[channel]))
            .sum()
    }

    /// RGBA8 scope image; cell opacity is `(count/max)^(1/1.5)`.
    pub fn image(&self) -> Vec<u8> {
        let max = self.max().max(1) as f32;
        let mut out = vec![0u8; self.width * self.height * 4];
        for (cell, px) in self.bins.chunks_exact(3).zip(out.chunks_exact_mut(4)) {
            for c in 0..3 {
                px[c] = ((cell[c] as f32 / max).powf(GAMMA) * 255.0)
                    .round()
                    .clamp(0.0, 255.0) as u8;
            }
            px[3] = 255;
        }
        out
    }

    /// Parade: the waveform split per channel, each image to be painted at
    /// a third of the display (side-by-side horizontally, stacked
    /// vertically).
    pub fn parade_images(&self) -> [Vec<u8>; 3] {
        let full = self.image();
        let mut channels = [
            vec![0u8; full.len()],
            vec![0u8; full.len()],
            vec![0u8; full.len()],
        ];
        for (i, px) in full.chunks_exact(4).enumerate() {
            for (c, target) in channels.iter_mut().enumerate() {
                target[4 * i + c] = px[c];
                target[4 * i + 3] = px[3];
            }
        }
        channels
    }
}

/// Bin a snapshot into a waveform.
pub fn waveform(
    pixels: &[f32],
    width: usize,
    height: usize,
    orientation: WaveformOrientation,
    restrict: &[PickArea],
) -> WaveformScope {
    let (img_w, img_h) = match orientation {
        WaveformOrientation::Horizontal => (width, TONES),
        WaveformOrientation::Vertical => (TONES, height),
    };
    let mut bins = vec![0u32; img_w * img_h * 3];

    for (min_x, max_x, min_y, max_y) in bin_boxes(restrict, width, height) {
        for y in min_y..max_y {
            for x in min_x..max_x {
                let base = 4 * (y * width + x);
                for c in 0..3 {
                    let value = pixels[base + c];
                    let tone = (value * (TONES - 1) as f32)
                        .round()
                        .clamp(0.0, (TONES - 1) as f32) as usize;
                    let cell = match orientation {
                        // Tone 0 sits at the bottom of the image.
                        WaveformOrientation::Horizontal => ((TONES - 1) - tone) * img_w + x,
                        WaveformOrientation::Vertical => y * img_w + tone,
                    };
                    bins[cell * 3 + c] += 1;
                }
            }
        }
    }

    WaveformScope {
        orientation,
        width: img_w,
        height: img_h,
        bins,
    }
}
