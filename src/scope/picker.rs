use crate::color::{RgbProfile, lab_to_lch, rgb_to_hsl, rgb_to_hsv, xyz_to_lab};
use crate::foundation::core::TapStage;
use crate::scope::{PickArea, bin_boxes};

/// One color-picker reading: channel statistics plus the mean converted
/// through the fixed color-math paths.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorPick {
    /// Mean RGB in the tap's space.
    pub mean: [f32; 3],
    /// Channel-wise minimum (not a color; kept per channel).
    pub min: [f32; 3],
    /// Channel-wise maximum.
    pub max: [f32; 3],
    /// Mean converted to display RGB.
    pub display_rgb: [f32; 3],
    /// Mean as CIE Lab.
    pub lab: [f32; 3],
    /// Mean as LCh.
    pub lch: [f32; 3],
    /// Mean as HSL (from display RGB).
    pub hsl: [f32; 3],
    /// Mean as HSV (from display RGB).
    pub hsv: [f32; 3],
    /// Display swatch, RGBA.
    pub swatch: [f32; 4],
}

/// Sample a tap snapshot over a point or a box.
///
/// `stage` decides the conversion path: the demosaic tap carries sensor
/// RGB (converted through the input profile), the later taps already carry
/// display RGB.
pub fn pick(
    pixels: &[f32],
    width: usize,
    height: usize,
    area: &PickArea,
    stage: TapStage,
    input_profile: &RgbProfile,
    output_profile: &RgbProfile,
) -> ColorPick {
    let mut mean = [0.0f32; 3];
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    let mut count = 0.0f32;

    for (min_x, max_x, min_y, max_y) in bin_boxes(std::slice::from_ref(area), width, height) {
        for y in min_y..max_y {
            for x in min_x..max_x {
                let base = 4 * (y * width + x);
                count += 1.0;
                for c in 0..3 {
                    let v = pixels[base + c];
                    mean[c] += v;
                    min[c] = min[c].min(v);
                    max[c] = max[c].max(v);
                }
            }
        }
    }

    if count > 0.0 {
        for c in &mut mean {
            *c /= count;
        }
    } else {
        min = [0.0; 3];
        max = [0.0; 3];
    }

    let (display_rgb, xyz) = match stage {
        TapStage::Demosaic => {
            let xyz = input_profile.rgb_to_xyz(mean);
            (output_profile.xyz_to_rgb(xyz), xyz)
        }
        TapStage::Colorout | TapStage::Gamma => (mean, output_profile.rgb_to_xyz(mean)),
    };

    let lab = xyz_to_lab(xyz);
    ColorPick {
        mean,
        min,
        max,
        display_rgb,
        lab,
        lch: lab_to_lch(lab),
        hsl: rgb_to_hsl(display_rgb),
        hsv: rgb_to_hsv(display_rgb),
        swatch: [
            display_rgb[0].clamp(0.0, 1.0),
            display_rgb[1].clamp(0.0, 1.0),
            display_rgb[2].clamp(0.0, 1.0),
            1.0,
        ],
    }
}
