use crate::scope::{PickArea, bin_boxes};

/// Bin count per channel.
pub const HISTOGRAM_BINS: usize = 256;

/// 256-bin per-channel pixel counts.
#[derive(Clone, Debug)]
pub struct HistogramScope {
    /// `bins[bin][channel]` pixel counts.
    pub bins: Vec<[u32; 3]>,
}

impl HistogramScope {
    /// Largest count across channels and bins.
    pub fn max(&self) -> u32 {
        self.bins
            .iter()
            .flat_map(|b| b.iter())
            .copied()
            .max()
            .unwrap_or(0)
    }

    /// Per-channel total; equals the number of pixels considered.
    pub fn total(&self, channel: usize) -> u64 {
        self.bins.iter().map(|b| u64::from(b[channel])).sum()
    }

    /// Display height of one bin on the rendering contract
    /// `y = log(1 + count)`, normalized to `[0, 1]` against the maximum.
    pub fn display_height(&self, bin: usize, channel: usize) -> f32 {
        let max = self.max();
        if max == 0 {
            return 0.0;
        }
        (1.0 + self.bins[bin][channel] as f32).ln() / (1.0 + max as f32).ln()
    }
}

/// Bin an RGBA f32 snapshot, optionally restricted to picker regions.
pub fn histogram(
    pixels: &[f32],
    width: usize,
    height: usize,
    restrict: &[PickArea],
) -> HistogramScope {
    let mut bins = vec![[0u32; 3]; HISTOGRAM_BINS];

    for (min_x, max_x, min_y, max_y) in bin_boxes(restrict, width, height) {
        for y in min_y..max_y {
            for x in min_x..max_x {
                let base = 4 * (y * width + x);
                for c in 0..3 {
                    let value = pixels[base + c];
                    let index = (value * (HISTOGRAM_BINS - 1) as f32)
                        .round()
                        .clamp(0.0, (HISTOGRAM_BINS - 1) as f32)
                        as usize;
                    bins[index][c] += 1;
                }
            }
        }
    }

    HistogramScope { bins }
}
