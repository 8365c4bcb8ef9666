use crate::foundation::core::Roi;

/// Memory footprint an IOP declares for one `(roi_in, roi_out)` pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TilingFootprint {
    /// Peak working-set size as a multiple of one ROI-sized RGBA f32 buffer.
    pub factor: f32,
    /// Constant extra bytes on top of `factor`.
    pub overhead: usize,
    /// Input margin in pixels required on every side of an output tile.
    pub overlap: u32,
    /// Tile x origin alignment.
    pub xalign: u32,
    /// Tile y origin alignment.
    pub yalign: u32,
}

impl Default for TilingFootprint {
    fn default() -> Self {
        Self {
            factor: 2.0,
            overhead: 0,
            overlap: 0,
            xalign: 1,
            yalign: 1,
        }
    }
}

impl TilingFootprint {
    /// Working-set bytes for processing `roi` in one piece.
    pub fn bytes_for(&self, roi: Roi) -> usize {
        let base = roi.byte_len() as f64 * f64::from(self.factor.max(1.0));
        (base as usize).saturating_add(self.overhead)
    }

    /// Does the whole ROI overflow the memory budget?
    pub fn needs_tiling(&self, roi: Roi, budget_bytes: usize) -> bool {
        self.bytes_for(roi) > budget_bytes
    }
}

/// One planned tile: the output rectangle a worker must produce, and the
/// input rectangle it may read (output grown by `overlap`, clamped to the
/// full input region).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    /// Output subregion, absolute coordinates.
    pub out: Roi,
    /// Input region including the overlap margin.
    pub input: Roi,
}

/// Cut `roi_out` into overlapping tiles whose per-tile working set fits
/// `budget_bytes`.
///
/// Always returns at least one tile and always covers `roi_out` exactly:
/// out rectangles are disjoint and their union is `roi_out`. When the
/// budget is too small even for the minimum tile edge, the planner degrades
/// to minimum-size tiles and reports it.
pub fn plan_tiles(
    roi_out: Roi,
    roi_in: Roi,
    footprint: &TilingFootprint,
    budget_bytes: usize,
) -> Vec<Tile> {
    const MIN_EDGE: u32 = 16;

    let budget = budget_bytes.saturating_sub(footprint.overhead).max(1);
    let bytes_per_px = 16.0 * f64::from(footprint.factor.max(1.0));
    let px_budget = (budget as f64 / bytes_per_px).max(1.0);

    // Square-ish tiles; the overlap margin counts against the budget since
    // the input tile is what actually gets allocated.
    let margin = 2 * footprint.overlap;
    let mut edge = (px_budget.sqrt() as u32).saturating_sub(margin);
    if edge < MIN_EDGE {
        tracing::warn!(
            budget_bytes,
            overlap = footprint.overlap,
            "tile budget below minimum edge, degrading to minimum tiles"
        );
        edge = MIN_EDGE;
    }

    let tile_w = align_down(edge, footprint.xalign).min(roi_out.width).max(1);
    let tile_h = align_down(edge, footprint.yalign).min(roi_out.height).max(1);

    let mut tiles = Vec::new();
    let mut y = 0u32;
    while y < roi_out.height {
        let h = tile_h.min(roi_out.height - y);
        let mut x = 0u32;
        while x < roi_out.width {
            let w = tile_w.min(roi_out.width - x);
            let out = Roi {
                x: roi_out.x + x as i32,
                y: roi_out.y + y as i32,
                width: w,
                height: h,
                scale: roi_out.scale,
            };
            let grown = Roi {
                x: out.x - footprint.overlap as i32,
                y: out.y - footprint.overlap as i32,
                width: out.width + margin,
                height: out.height + margin,
                scale: roi_in.scale,
            };
            let input = grown.intersect(roi_in).unwrap_or(roi_in);
            tiles.push(Tile { out, input });
            x += w;
        }
        y += h;
    }
    tiles
}

fn align_down(v: u32, align: u32) -> u32 {
    if align <= 1 {
        return v;
    }
    (v / align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_roi_fits_in_one_tile_when_budget_allows() {
        let roi = Roi::full(64, 64);
        let fp = TilingFootprint::default();
        assert!(!fp.needs_tiling(roi, 1 << 20));
        let tiles = plan_tiles(roi, roi, &fp, 1 << 20);
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].out, roi);
    }

    #[test]
    fn tiles_cover_roi_exactly_and_disjointly() {
        let roi = Roi::full(100, 70);
        let fp = TilingFootprint {
            factor: 4.0,
            ..Default::default()
        };
        // Budget forces roughly 32x32 tiles.
        let tiles = plan_tiles(roi, roi, &fp, 4 * 16 * 32 * 32);
        assert!(tiles.len() > 1);

        let mut covered = vec![0u8; roi.npixels()];
        for t in &tiles {
            for j in 0..t.out.height {
                for i in 0..t.out.width {
                    let x = (t.out.x + i as i32) as usize;
                    let y = (t.out.y + j as i32) as usize;
                    covered[y * roi.width as usize + x] += 1;
                }
            }
        }
        assert!(covered.iter().all(|&c| c == 1), "coverage must be exact");
    }

    #[test]
    fn input_tiles_carry_overlap_clamped_to_roi_in() {
        let roi = Roi::full(64, 64);
        let fp = TilingFootprint {
            factor: 2.0,
            overlap: 8,
            ..Default::default()
        };
        let tiles = plan_tiles(roi, roi, &fp, 2 * 16 * 24 * 24);
        for t in &tiles {
            // Interior edges must be expanded by the overlap.
            if t.out.x > 0 {
                assert!(t.input.x <= t.out.x - 8);
            }
            // Never read outside the declared input.
            assert!(t.input.x >= roi.x && t.input.y >= roi.y);
            assert!(t.input.x + t.input.width as i32 <= roi.x + roi.width as i32);
            assert!(t.input.y + t.input.height as i32 <= roi.y + roi.height as i32);
        }
    }

    #[test]
    fn degenerate_budget_still_covers() {
        let roi = Roi::full(40, 40);
        let fp = TilingFootprint {
            factor: 8.0,
            overlap: 4,
            ..Default::default()
        };
        let tiles = plan_tiles(roi, roi, &fp, 64);
        let area: usize = tiles.iter().map(|t| t.out.npixels()).sum();
        assert_eq!(area, roi.npixels());
    }
}
