//! Generalized Anscombe variance stabilization.
//!
//! Forward transform per Makitalo & Foi, "Optimal inversion of the
//! generalized Anscombe transformation for Poisson-Gaussian noise": the
//! inverse is the closed-form unbiased rational polynomial, not the
//! algebraic inverse.

use crate::foundation::math::rgb_norm;

/// Per-channel `(b / (a · wb · scale))² + k/8` terms used by both
/// directions of the transform.
pub fn sigma_terms(
    a: [f32; 3],
    b: [f32; 3],
    wb: [f32; 3],
    scale: f32,
    k_over_8: f32,
) -> [f32; 3] {
    let mut out = [0.0f32; 3];
    for c in 0..3 {
        let s = b[c] / (a[c] * wb[c] * scale);
        out[c] = s * s + k_over_8;
    }
    out
}

/// Forward transform in place: `y = 2 · sqrt(x/a + σ² + 3/8)` per channel.
/// The alpha slot passes through.
pub fn precondition(buf: &mut [f32], a: [f32; 3], sigma2_plus_3_8: [f32; 3]) {
    for px in buf.chunks_exact_mut(4) {
        for c in 0..3 {
            let d = (px[c] / a[c] + sigma2_plus_3_8[c]).max(0.0);
            px[c] = 2.0 * d.sqrt();
        }
    }
}

/// Unbiased inverse in place, per channel; alpha passes through.
pub fn backtransform(buf: &mut [f32], a: [f32; 3], sigma2_plus_1_8: [f32; 3]) {
    let sqrt_3_2 = (3.0f32 / 2.0).sqrt();
    for px in buf.chunks_exact_mut(4) {
        for c in 0..3 {
            let x = px[c];
            let x2 = x * x;
            px[c] = if x < 0.5 {
                0.0
            } else {
                a[c] * (0.25 * x2 + 0.25 * sqrt_3_2 / x - 1.375 / x2
                    + 0.625 * sqrt_3_2 / (x * x2)
                    - sigma2_plus_1_8[c])
            };
        }
    }
}

/// Break RGB into chroma ratios plus a norm carrier in the alpha slot.
pub fn split_ratios(buf: &mut [f32]) {
    for px in buf.chunks_exact_mut(4) {
        let norm = rgb_norm(px[0], px[1], px[2]);
        for c in 0..3 {
            px[c] /= norm;
        }
        px[3] = norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_tight_at_realistic_gains() {
        // Sensor-scale gains make the unbiased-inverse correction terms
        // vanish relative to the signal.
        let a = [1.2e-6f32; 3];
        let b = [4.0e-7f32; 3];
        let wb = [1.0f32; 3];
        let s38 = sigma_terms(a, b, wb, 1.0, 3.0 / 8.0);
        let s18 = sigma_terms(a, b, wb, 1.0, 1.0 / 8.0);

        for value in [0.09f32, 0.18, 0.5] {
            let mut buf = vec![value, value, value, 1.0];
            precondition(&mut buf, a, s38);
            backtransform(&mut buf, a, s18);
            for c in 0..3 {
                let rel = (buf[c] - value).abs() / value;
                assert!(
                    rel <= 2.0f32.powi(-20),
                    "value {value}: relative error {rel}"
                );
            }
            assert_eq!(buf[3], 1.0);
        }
    }

    #[test]
    fn forward_clamps_negatives_to_zero_signal() {
        let a = [1.0e-6f32; 3];
        let s38 = sigma_terms(a, [0.0; 3], [1.0; 3], 1.0, 3.0 / 8.0);
        let mut buf = vec![-1.0, -1.0, -1.0, 1.0];
        precondition(&mut buf, a, s38);
        // max(0, x/a + 3/8) under a strongly negative input is 0.
        for c in 0..3 {
            assert_eq!(buf[c], 0.0);
        }
    }

    #[test]
    fn inverse_floors_small_codes() {
        let mut buf = vec![0.25, 0.4, 0.499, 1.0];
        backtransform(&mut buf, [1.0; 3], [0.125; 3]);
        for c in 0..3 {
            assert_eq!(buf[c], 0.0);
        }
    }

    #[test]
    fn ratio_split_preserves_recombination() {
        let mut buf = vec![0.4, 0.2, 0.1, 1.0];
        let original = buf.clone();
        split_ratios(&mut buf);
        for c in 0..3 {
            let back = buf[c] * buf[3];
            assert!((back - original[c]).abs() < 1e-6);
        }
    }
}
