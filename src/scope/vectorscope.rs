use crate::color::{RgbProfile, luv_to_xyy, xyy_to_luv, xyy_to_xyz, xyz_to_xyy};
use crate::scope::{PickArea, bin_boxes};

/// Side length of the square u-v bin grid.
pub const VECTORSCOPE_BINS: usize = 256;

/// 2-D chromaticity histogram in CIE Luv u\*v\*, D65-centered.
#[derive(Clone, Debug)]
pub struct VectorscopeScope {
    /// `bins[row * 256 + col]`; v\* = 0 sits at the bottom row.
    pub bins: Vec<u32>,
    /// Half-extent of the u/v axes in Luv units.
    pub zoom: f32,
}

/// Overlay geometry for the UI: everything is in bin-grid coordinates.
#[derive(Clone, Debug)]
pub struct VectorscopeOverlay {
    /// Display-profile primaries and secondaries (R, Y, G, C, B, M).
    pub primaries: [[f32; 2]; 6],
    /// Radii of the concentric chroma circles, in bins.
    pub chroma_circles: [f32; 3],
    /// Average skin-tone zone polygon.
    pub skin_zone: Vec<[f32; 2]>,
}

fn uv_to_bin(value: f32, zoom: f32) -> f32 {
    (value + zoom) * (VECTORSCOPE_BINS - 1) as f32 / (2.0 * zoom)
}

fn bin_to_uv(value: f32, zoom: f32) -> f32 {
    value * (2.0 * zoom) / (VECTORSCOPE_BINS - 1) as f32 - zoom
}

fn plot_cell(u: f32, v: f32, zoom: f32) -> usize {
    let max = (VECTORSCOPE_BINS - 1) as f32;
    let u_index = uv_to_bin(u, zoom).round().clamp(0.0, max) as usize;
    let v_index = uv_to_bin(v, zoom).round().clamp(0.0, max) as usize;
    // v* = 0 at the bottom of the plot.
    (VECTORSCOPE_BINS - 1 - v_index) * VECTORSCOPE_BINS + u_index
}

/// Bin a snapshot through `profile` into the u-v grid.
///
/// `profile` is the space the pixels live in: the input profile for the
/// demosaic tap (sensor RGB), the output profile otherwise.
pub fn vectorscope(
    pixels: &[f32],
    width: usize,
    height: usize,
    profile: &RgbProfile,
    zoom: f32,
    restrict: &[PickArea],
) -> VectorscopeScope {
    let zoom = zoom.clamp(32.0, 512.0);
    let mut bins = vec![0u32; VECTORSCOPE_BINS * VECTORSCOPE_BINS];

    for (min_x, max_x, min_y, max_y) in bin_boxes(restrict, width, height) {
        for y in min_y..max_y {
            for x in min_x..max_x {
                let base = 4 * (y * width + x);
                let xyz = profile.rgb_to_xyz([pixels[base], pixels[base + 1], pixels[base + 2]]);
                let luv = xyy_to_luv(xyz_to_xyy(xyz));
                bins[plot_cell(luv[1], luv[2], zoom)] += 1;
            }
        }
    }

    VectorscopeScope { bins, zoom }
}

impl VectorscopeScope {
    /// Largest cell count.
    pub fn max(&self) -> u32 {
        self.bins.iter().copied().max().unwrap_or(0)
    }

    /// Total count; equals the pixels considered.
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|&v| u64::from(v)).sum()
    }

    /// RGBA8 plot image: hue background from the display profile at a dim
    /// lightness, pixel alpha `sqrt(count/max)`.
    pub fn image(&self, display_profile: &RgbProfile) -> Vec<u8> {
        let max = self.max().max(1) as f32;
        let mut out = vec![0u8; VECTORSCOPE_BINS * VECTORSCOPE_BINS * 4];

        for i in 0..VECTORSCOPE_BINS {
            for j in 0..VECTORSCOPE_BINS {
                let index = (VECTORSCOPE_BINS - 1 - i) * VECTORSCOPE_BINS + j;
                let value = (self.bins[index] as f32 / max).sqrt();

                // RGB gamuts keep their chroma well below L = 67; a dim L
                // keeps the hue field inside the gamut.
                let luv = [25.0, bin_to_uv(j as f32, self.zoom), bin_to_uv(i as f32, self.zoom)];
                let mut xyy = luv_to_xyy(luv);
                xyy[0] = xyy[0].max(0.0);
                xyy[1] = xyy[1].max(0.0);
                let xyz = xyy_to_xyz(xyy);
                let mut rgb = display_profile.xyz_to_rgb([
                    xyz[0].max(0.0),
                    xyz[1].max(0.0),
                    xyz[2].max(0.0),
                ]);
                for c in &mut rgb {
                    *c = c.max(0.0);
                }
                let peak = rgb[0].max(rgb[1]).max(rgb[2]).max(1e-6);
                for c in &mut rgb {
                    *c /= peak;
                }

                let px = &mut out[index * 4..index * 4 + 4];
                for c in 0..3 {
                    px[c] = ((rgb[c] * value).powf(1.0 / 2.2) * 255.0)
                        .round()
                        .clamp(0.0, 255.0) as u8;
                }
                px[3] = (value * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }

    /// Overlay geometry: profile primaries/secondaries, chroma circles,
    /// and the skin-tone zone, all in bin-grid coordinates.
    pub fn overlay(&self, display_profile: &RgbProfile) -> VectorscopeOverlay {
        const COLORS: [[f32; 3]; 6] = [
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 1.0, 1.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
        ];
        let mut primaries = [[0.0f32; 2]; 6];
        for (slot, rgb) in primaries.iter_mut().zip(COLORS) {
            let luv = xyy_to_luv(xyz_to_xyy(display_profile.rgb_to_xyz(rgb)));
            *slot = [
                uv_to_bin(luv[1], self.zoom),
                (VECTORSCOPE_BINS - 1) as f32 - uv_to_bin(luv[2], self.zoom),
            ];
        }

        // Average skin tones cluster on the orange axis; the zone is a
        // coarse quadrilateral in u*v*.
        let skin_uv = [[15.0f32, 12.0], [55.0, 28.0], [48.0, 45.0], [12.0, 22.0]];
        let skin_zone = skin_uv
            .iter()
            .map(|[u, v]| {
                [
                    uv_to_bin(*u, self.zoom),
                    (VECTORSCOPE_BINS - 1) as f32 - uv_to_bin(*v, self.zoom),
                ]
            })
            .collect();

        VectorscopeOverlay {
            primaries,
            chroma_circles: [
                VECTORSCOPE_BINS as f32 / 8.0,
                VECTORSCOPE_BINS as f32 / 4.0,
                3.0 * VECTORSCOPE_BINS as f32 / 8.0,
            ],
            skin_zone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_image(w: usize, h: usize, v: f32) -> Vec<f32> {
        let mut px = vec![0.0f32; 4 * w * h];
        for chunk in px.chunks_exact_mut(4) {
            chunk.copy_from_slice(&[v, v, v, 1.0]);
        }
        px
    }

    #[test]
    fn neutral_gray_bins_at_the_center() {
        let profile = RgbProfile::linear_srgb();
        let img = gray_image(16, 16, 0.46);
        let scope = vectorscope(&img, 16, 16, &profile, 120.0, &[]);

        assert_eq!(scope.total(), 256);

        let center = (VECTORSCOPE_BINS / 2) as isize;
        let mut centered = 0u64;
        let mut occupied_cells = 0usize;
        for (idx, &count) in scope.bins.iter().enumerate() {
            if count == 0 {
                continue;
            }
            occupied_cells += 1;
            let row = (idx / VECTORSCOPE_BINS) as isize;
            let col = (idx % VECTORSCOPE_BINS) as isize;
            // The plot's v axis is flipped; the neutral point maps near
            // (127..128, 127..128) either way.
            if (row - center).abs() <= 1 && (col - center).abs() <= 1 {
                centered += u64::from(count);
            }
        }
        assert_eq!(centered, 256, "all gray pixels must land at the center");
        assert!(occupied_cells <= 4, "{occupied_cells} cells occupied");
        // 99.9% of bins elsewhere stay empty.
        let empty = scope.bins.iter().filter(|&&c| c == 0).count();
        assert!(empty as f32 / scope.bins.len() as f32 > 0.999);
    }

    #[test]
    fn zoom_is_clamped_into_range() {
        let profile = RgbProfile::linear_srgb();
        let img = gray_image(2, 2, 0.5);
        let scope = vectorscope(&img, 2, 2, &profile, 1.0, &[]);
        assert_eq!(scope.zoom, 32.0);
    }

    #[test]
    fn saturated_red_lands_off_center() {
        let profile = RgbProfile::linear_srgb();
        let mut img = gray_image(4, 4, 0.0);
        for chunk in img.chunks_exact_mut(4) {
            chunk.copy_from_slice(&[0.8, 0.05, 0.05, 1.0]);
        }
        let scope = vectorscope(&img, 4, 4, &profile, 120.0, &[]);
        let center_cell = (VECTORSCOPE_BINS / 2) * VECTORSCOPE_BINS + VECTORSCOPE_BINS / 2;
        assert_eq!(scope.bins[center_cell], 0);
        assert_eq!(scope.total(), 16);
    }

    #[test]
    fn image_and_overlay_have_plot_shape() {
        let profile = RgbProfile::linear_srgb();
        let img = gray_image(4, 4, 0.4);
        let scope = vectorscope(&img, 4, 4, &profile, 120.0, &[]);
        assert_eq!(
            scope.image(&profile).len(),
            VECTORSCOPE_BINS * VECTORSCOPE_BINS * 4
        );
        let overlay = scope.overlay(&profile);
        assert_eq!(overlay.skin_zone.len(), 4);
        assert!(overlay.chroma_circles[0] < overlay.chroma_circles[2]);
    }
}
