//! Scope consumers: histogram, waveform, parade, vectorscope, and the
//! color picker, all computed from a backbuffer tap snapshot.
//!
//! These functions produce bins, RGBA8 scope images, and overlay geometry;
//! widget drawing stays in the UI shell.

pub mod histogram;
pub mod picker;
pub mod reader;
pub mod vectorscope;
pub mod waveform;

pub use histogram::{HISTOGRAM_BINS, HistogramScope, histogram};
pub use picker::{ColorPick, pick};
pub use reader::{DEFAULT_TAP_RETRIES, read_tap, read_tap_latest};
pub use vectorscope::{VECTORSCOPE_BINS, VectorscopeOverlay, VectorscopeScope, vectorscope};
pub use waveform::{TONES, WaveformOrientation, WaveformScope, waveform};

use crate::foundation::core::PipelineOpts;

/// The restriction list a scope should bin with under the current options:
/// the active picker regions when `scope_restrict_to_pickers` is set, the
/// whole image otherwise.
pub fn effective_restriction<'a>(opts: &PipelineOpts, pickers: &'a [PickArea]) -> &'a [PickArea] {
    if opts.scope_restrict_to_pickers {
        pickers
    } else {
        &[]
    }
}

/// A picker region in normalized image coordinates `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PickArea {
    /// A single point sample.
    Point {
        x: f32,
        y: f32,
    },
    /// A rectangle `(x0, y0)..(x1, y1)`.
    Box {
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
    },
}

/// Pixel-space half-open boxes `(min_x, max_x, min_y, max_y)` to bin.
///
/// An empty restriction list means the whole image.
pub(crate) fn bin_boxes(
    restrict: &[PickArea],
    width: usize,
    height: usize,
) -> Vec<(usize, usize, usize, usize)> {
    if restrict.is_empty() {
        return vec![(0, width, 0, height)];
    }
    restrict
        .iter()
        .map(|area| match *area {
            PickArea::Box { x0, y0, x1, y1 } => (
                ((x0 * width as f32).round() as usize).min(width),
                ((x1 * width as f32).round() as usize).min(width),
                ((y0 * height as f32).round() as usize).min(height),
                ((y1 * height as f32).round() as usize).min(height),
            ),
            PickArea::Point { x, y } => {
                let px = ((x * width as f32).round() as usize).min(width.saturating_sub(1));
                let py = ((y * height as f32).round() as usize).min(height.saturating_sub(1));
                (px, px + 1, py, py + 1)
            }
        })
        .collect()
}
