//! Color math shared by the pipeline, the scopes, and the picker.
//!
//! Profiles are plain 3×3 matrix transforms between a linear RGB space and
//! CIE XYZ with a D65 white. That covers the spaces the core needs
//! (sensor working space, display space) without an ICC engine; profile
//! loading from disk stays outside the core.

use crate::foundation::math::{Mat3, mat3_mul_vec};

/// D65 reference white in XYZ, normalized to `Y = 1`.
pub const D65_XYZ: [f32; 3] = [0.95047, 1.0, 1.08883];

/// D65 reference chromaticity in CIE 1976 `u' v'`.
pub const D65_UV_PRIME: [f32; 2] = [0.19783, 0.46832];

/// A linear RGB space described by its matrices to and from CIE XYZ (D65).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RgbProfile {
    /// Display name of the space.
    pub name: &'static str,
    /// Linear RGB → XYZ.
    pub to_xyz: Mat3,
    /// XYZ → linear RGB.
    pub from_xyz: Mat3,
}

impl RgbProfile {
    /// Linear sRGB / Rec.709 primaries.
    pub fn linear_srgb() -> Self {
        Self {
            name: "linear sRGB",
            to_xyz: [
                [0.412_456_4, 0.357_576_1, 0.180_437_5],
                [0.212_672_9, 0.715_152_2, 0.072_175_0],
                [0.019_333_9, 0.119_192_0, 0.950_304_1],
            ],
            from_xyz: [
                [3.240_454_2, -1.537_138_5, -0.498_531_4],
                [-0.969_266_0, 1.876_010_8, 0.041_556_0],
                [0.055_643_4, -0.204_025_9, 1.057_225_2],
            ],
        }
    }

    /// Linear Rec.2020 primaries; the default camera working space.
    pub fn linear_rec2020() -> Self {
        Self {
            name: "linear Rec.2020",
            to_xyz: [
                [0.636_958_0, 0.144_616_9, 0.168_881_0],
                [0.262_700_2, 0.677_998_1, 0.059_301_7],
                [0.0, 0.028_072_7, 1.060_985_1],
            ],
            from_xyz: [
                [1.716_651_2, -0.355_670_8, -0.253_366_3],
                [-0.666_684_4, 1.616_481_2, 0.015_768_5],
                [0.017_639_9, -0.042_770_6, 0.942_103_1],
            ],
        }
    }

    /// Linear Display-P3 primaries.
    pub fn linear_display_p3() -> Self {
        Self {
            name: "linear Display P3",
            to_xyz: [
                [0.486_570_9, 0.265_667_7, 0.198_217_3],
                [0.228_974_6, 0.691_738_5, 0.079_286_9],
                [0.0, 0.045_113_4, 1.043_944_4],
            ],
            from_xyz: [
                [2.493_496_9, -0.931_383_6, -0.402_710_8],
                [-0.829_489_0, 1.762_664_1, 0.023_624_7],
                [0.035_845_8, -0.076_172_4, 0.956_884_5],
            ],
        }
    }

    /// Linear RGB in this space → XYZ.
    #[inline]
    pub fn rgb_to_xyz(&self, rgb: [f32; 3]) -> [f32; 3] {
        mat3_mul_vec(&self.to_xyz, rgb)
    }

    /// XYZ → linear RGB in this space.
    #[inline]
    pub fn xyz_to_rgb(&self, xyz: [f32; 3]) -> [f32; 3] {
        mat3_mul_vec(&self.from_xyz, xyz)
    }
}

/// XYZ → xyY.
#[inline]
pub fn xyz_to_xyy(xyz: [f32; 3]) -> [f32; 3] {
    let sum = xyz[0] + xyz[1] + xyz[2];
    if sum <= 0.0 {
        // Black maps onto the white chromaticity so downstream u/v stay finite.
        let white_sum = D65_XYZ[0] + D65_XYZ[1] + D65_XYZ[2];
        return [D65_XYZ[0] / white_sum, D65_XYZ[1] / white_sum, 0.0];
    }
    [xyz[0] / sum, xyz[1] / sum, xyz[1]]
}

/// xyY → XYZ.
#[inline]
pub fn xyy_to_xyz(xyy: [f32; 3]) -> [f32; 3] {
    if xyy[1] <= 0.0 {
        return [0.0; 3];
    }
    let f = xyy[2] / xyy[1];
    [xyy[0] * f, xyy[2], (1.0 - xyy[0] - xyy[1]) * f]
}

fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

/// XYZ (D65) → CIE L\*a\*b\*.
pub fn xyz_to_lab(xyz: [f32; 3]) -> [f32; 3] {
    let fx = lab_f(xyz[0] / D65_XYZ[0]);
    let fy = lab_f(xyz[1] / D65_XYZ[1]);
    let fz = lab_f(xyz[2] / D65_XYZ[2]);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// L\*a\*b\* → L\*C\*h, hue in degrees `[0, 360)`.
pub fn lab_to_lch(lab: [f32; 3]) -> [f32; 3] {
    let c = (lab[1] * lab[1] + lab[2] * lab[2]).sqrt();
    let mut h = lab[2].atan2(lab[1]).to_degrees();
    if h < 0.0 {
        h += 360.0;
    }
    [lab[0], c, h]
}

/// xyY → CIE 1976 L\*u\*v\* with the D65 reference.
pub fn xyy_to_luv(xyy: [f32; 3]) -> [f32; 3] {
    let denom = -2.0 * xyy[0] + 12.0 * xyy[1] + 3.0;
    if denom <= 0.0 {
        return [0.0; 3];
    }
    let u_prime = 4.0 * xyy[0] / denom;
    let v_prime = 9.0 * xyy[1] / denom;

    let yr = xyy[2] / D65_XYZ[1];
    let l = if yr > (6.0f32 / 29.0).powi(3) {
        116.0 * yr.cbrt() - 16.0
    } else {
        (29.0f32 / 3.0).powi(3) * yr
    };

    [
        l,
        13.0 * l * (u_prime - D65_UV_PRIME[0]),
        13.0 * l * (v_prime - D65_UV_PRIME[1]),
    ]
}

/// L\*u\*v\* → xyY (D65 reference); inverse of [`xyy_to_luv`].
pub fn luv_to_xyy(luv: [f32; 3]) -> [f32; 3] {
    if luv[0] <= 0.0 {
        return [D65_UV_PRIME[0], D65_UV_PRIME[1], 0.0];
    }
    let u_prime = luv[1] / (13.0 * luv[0]) + D65_UV_PRIME[0];
    let v_prime = luv[2] / (13.0 * luv[0]) + D65_UV_PRIME[1];

    let y = if luv[0] > 8.0 {
        ((luv[0] + 16.0) / 116.0).powi(3)
    } else {
        luv[0] * (3.0f32 / 29.0).powi(3)
    };

    let denom = 6.0 * u_prime - 16.0 * v_prime + 12.0;
    if denom <= 0.0 {
        return [D65_UV_PRIME[0], D65_UV_PRIME[1], y];
    }
    [9.0 * u_prime / denom, 4.0 * v_prime / denom, y]
}

/// Linear RGB → HSL; H in degrees `[0, 360)`, S and L in `[0, 1]`.
pub fn rgb_to_hsl(rgb: [f32; 3]) -> [f32; 3] {
    let r = rgb[0].clamp(0.0, 1.0);
    let g = rgb[1].clamp(0.0, 1.0);
    let b = rgb[2].clamp(0.0, 1.0);

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let l = (max + min) / 2.0;

    if delta < 1e-6 {
        return [0.0, 0.0, l];
    }

    let s = if l < 0.5 {
        delta / (max + min)
    } else {
        delta / (2.0 - max - min)
    };

    [hue_degrees(r, g, b, max, delta), s, l]
}

/// Linear RGB → HSV; H in degrees `[0, 360)`, S and V in `[0, 1]`.
pub fn rgb_to_hsv(rgb: [f32; 3]) -> [f32; 3] {
    let r = rgb[0].clamp(0.0, 1.0);
    let g = rgb[1].clamp(0.0, 1.0);
    let b = rgb[2].clamp(0.0, 1.0);

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    if delta < 1e-6 {
        return [0.0, 0.0, max];
    }

    let s = if max > 0.0 { delta / max } else { 0.0 };
    [hue_degrees(r, g, b, max, delta), s, max]
}

fn hue_degrees(r: f32, g: f32, b: f32, max: f32, delta: f32) -> f32 {
    let mut h = if (max - r).abs() < 1e-6 {
        let mut h = (g - b) / delta;
        if g < b {
            h += 6.0;
        }
        h
    } else if (max - g).abs() < 1e-6 {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    h *= 60.0;
    if h >= 360.0 {
        h -= 360.0;
    }
    h
}

/// Linear → sRGB display transfer.
#[inline]
pub fn srgb_oetf(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB display → linear transfer; inverse of [`srgb_oetf`].
#[inline]
pub fn srgb_eotf(v: f32) -> f32 {
    if v <= 0.040_45 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_maps_to_profile_white() {
        for profile in [
            RgbProfile::linear_srgb(),
            RgbProfile::linear_rec2020(),
            RgbProfile::linear_display_p3(),
        ] {
            let xyz = profile.rgb_to_xyz([1.0, 1.0, 1.0]);
            for c in 0..3 {
                assert!(
                    (xyz[c] - D65_XYZ[c]).abs() < 2e-3,
                    "{} white channel {c}: {} vs {}",
                    profile.name,
                    xyz[c],
                    D65_XYZ[c]
                );
            }
        }
    }

    #[test]
    fn profile_matrices_round_trip() {
        let profile = RgbProfile::linear_rec2020();
        let rgb = [0.2, 0.5, 0.8];
        let back = profile.xyz_to_rgb(profile.rgb_to_xyz(rgb));
        for c in 0..3 {
            assert!((back[c] - rgb[c]).abs() < 1e-4);
        }
    }

    #[test]
    fn neutral_gray_has_zero_uv() {
        let profile = RgbProfile::linear_srgb();
        let luv = xyy_to_luv(xyz_to_xyy(profile.rgb_to_xyz([0.18, 0.18, 0.18])));
        assert!(luv[1].abs() < 0.05, "u* = {}", luv[1]);
        assert!(luv[2].abs() < 0.05, "v* = {}", luv[2]);
    }

    #[test]
    fn luv_round_trips_through_xyy() {
        let xyy = [0.41, 0.38, 0.35];
        let back = luv_to_xyy(xyy_to_luv(xyy));
        for c in 0..3 {
            assert!((back[c] - xyy[c]).abs() < 1e-3, "{back:?} vs {xyy:?}");
        }
    }

    #[test]
    fn lab_of_white_is_l100() {
        let lab = xyz_to_lab(D65_XYZ);
        assert!((lab[0] - 100.0).abs() < 1e-3);
        assert!(lab[1].abs() < 1e-3 && lab[2].abs() < 1e-3);
    }

    #[test]
    fn hsl_and_hsv_agree_on_primaries() {
        let hsl = rgb_to_hsl([1.0, 0.0, 0.0]);
        let hsv = rgb_to_hsv([1.0, 0.0, 0.0]);
        assert_eq!(hsl[0], 0.0);
        assert_eq!(hsv[0], 0.0);
        let hsl_g = rgb_to_hsl([0.0, 1.0, 0.0]);
        assert!((hsl_g[0] - 120.0).abs() < 1e-3);
    }

    #[test]
    fn srgb_transfer_round_trips() {
        for v in [0.0, 0.001, 0.01, 0.18, 0.5, 1.0] {
            let back = srgb_eotf(srgb_oetf(v));
            assert!((back - v).abs() < 1e-5);
        }
    }
}
