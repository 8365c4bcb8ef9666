//! Non-decimated ("à trous") wavelet decomposition on a separable B-spline
//! kernel whose support doubles at each scale.

use rayon::prelude::*;

use crate::foundation::math::B_SPLINE_SIGMA;

const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Position of a scale inside the decomposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaleKind {
    /// First scale: the reconstruction target starts from this HF.
    pub first: bool,
    /// Last scale: the residual LF is added and the result clamped.
    pub last: bool,
}

impl ScaleKind {
    pub fn of(s: u32, scales: u32) -> Self {
        Self {
            first: s == 0,
            last: s + 1 == scales,
        }
    }
}

/// Number of doubling B-spline steps needed to reach an equivalent Gaussian
/// radius, clamped to `[1, 10]`.
pub fn scales_for_radius(radius: f32) -> u32 {
    if radius <= B_SPLINE_SIGMA {
        return 1;
    }
    let steps = (radius / B_SPLINE_SIGMA).log2().ceil() as i64;
    steps.clamp(1, 10) as u32
}

/// One decomposition step at spacing `mult`: low-pass `src` into `lf`,
/// leaving `hf = src - lf`. `scratch` must hold one full RGBA image for the
/// horizontal pass.
pub fn decompose_bspline(
    src: &[f32],
    hf: &mut [f32],
    lf: &mut [f32],
    width: usize,
    height: usize,
    mult: usize,
    scratch: &mut [f32],
) {
    let row = 4 * width;

    // Horizontal pass.
    scratch
        .par_chunks_mut(row)
        .enumerate()
        .for_each(|(y, out_row)| {
            let src_row = &src[y * row..(y + 1) * row];
            for x in 0..width {
                let mut acc = [0.0f32; 4];
                for (k, weight) in KERNEL.iter().enumerate() {
                    let offset = (k as isize - 2) * mult as isize;
                    let xx = (x as isize + offset).clamp(0, width as isize - 1) as usize;
                    for c in 0..4 {
                        acc[c] += weight * src_row[4 * xx + c];
                    }
                }
                out_row[4 * x..4 * x + 4].copy_from_slice(&acc);
            }
        });

    // Vertical pass.
    lf.par_chunks_mut(row).enumerate().for_each(|(y, out_row)| {
        for x in 0..width {
            let mut acc = [0.0f32; 4];
            for (k, weight) in KERNEL.iter().enumerate() {
                let offset = (k as isize - 2) * mult as isize;
                let yy = (y as isize + offset).clamp(0, height as isize - 1) as usize;
                for c in 0..4 {
                    acc[c] += weight * scratch[yy * row + 4 * x + c];
                }
            }
            out_row[4 * x..4 * x + 4].copy_from_slice(&acc);
        }
    });

    // High frequency is what the low-pass removed.
    hf.par_chunks_mut(row)
        .zip(src.par_chunks(row).zip(lf.par_chunks(row)))
        .for_each(|(hf_row, (src_row, lf_row))| {
            for (h, (s, l)) in hf_row.iter_mut().zip(src_row.iter().zip(lf_row.iter())) {
                *h = s - l;
            }
        });
}

/// Run the whole decomposition, handing each scale's HF and LF to `sink`.
///
/// Two alternating low-pass buffers suffice: the sequence is restartable
/// from any `input` without reallocating. `sink(scale, kind, hf, lf)` may
/// mutate the HF in place before the next scale overwrites it.
#[allow(clippy::too_many_arguments)]
pub fn decompose_sequence<F>(
    input: &[f32],
    scales: u32,
    width: usize,
    height: usize,
    hf: &mut [f32],
    lf_odd: &mut Vec<f32>,
    lf_even: &mut Vec<f32>,
    scratch: &mut [f32],
    mut sink: F,
) where
    F: FnMut(u32, ScaleKind, &mut [f32], &[f32]),
{
    for s in 0..scales {
        let mult = 1usize << s;
        if s == 0 {
            decompose_bspline(input, hf, lf_odd, width, height, mult, scratch);
            sink(s, ScaleKind::of(s, scales), hf, lf_odd);
        } else if s % 2 == 1 {
            decompose_bspline(lf_odd, hf, lf_even, width, height, mult, scratch);
            sink(s, ScaleKind::of(s, scales), hf, lf_even);
        } else {
            decompose_bspline(lf_even, hf, lf_odd, width, height, mult, scratch);
            sink(s, ScaleKind::of(s, scales), hf, lf_odd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_count_follows_radius() {
        assert_eq!(scales_for_radius(0.5), 1);
        assert_eq!(scales_for_radius(1.0), 1);
        assert!(scales_for_radius(12.0) >= 3);
        assert_eq!(scales_for_radius(1.0e9), 10);
    }

    #[test]
    fn hf_plus_lf_reconstructs_input() {
        let (w, h) = (16usize, 8usize);
        let mut src = vec![0.0f32; 4 * w * h];
        for (i, v) in src.iter_mut().enumerate() {
            *v = ((i % 23) as f32) / 23.0;
        }
        let mut hf = vec![0.0f32; src.len()];
        let mut lf = vec![0.0f32; src.len()];
        let mut scratch = vec![0.0f32; src.len()];
        decompose_bspline(&src, &mut hf, &mut lf, w, h, 1, &mut scratch);
        for i in 0..src.len() {
            assert!((hf[i] + lf[i] - src[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn constant_input_has_zero_hf() {
        let (w, h) = (8usize, 8usize);
        let src = vec![0.42f32; 4 * w * h];
        let mut hf = vec![1.0f32; src.len()];
        let mut lf = vec![0.0f32; src.len()];
        let mut scratch = vec![0.0f32; src.len()];
        decompose_bspline(&src, &mut hf, &mut lf, w, h, 2, &mut scratch);
        for v in &hf {
            assert!(v.abs() < 1e-6);
        }
        for v in &lf {
            assert!((v - 0.42).abs() < 1e-6);
        }
    }

    #[test]
    fn sum_of_hf_plus_residual_is_the_input() {
        // Reconstruction invariant: Σ HF_s + LF_{S-1} == input.
        let (w, h) = (12usize, 12usize);
        let mut src = vec![0.0f32; 4 * w * h];
        for (i, v) in src.iter_mut().enumerate() {
            *v = (i as f32 * 0.37).sin() * 0.5 + 0.5;
        }
        let scales = 3;
        let mut hf = vec![0.0f32; src.len()];
        let mut lf_odd = vec![0.0f32; src.len()];
        let mut lf_even = vec![0.0f32; src.len()];
        let mut scratch = vec![0.0f32; src.len()];

        let mut sum = vec![0.0f32; src.len()];
        let mut residual = vec![0.0f32; src.len()];
        decompose_sequence(
            &src,
            scales,
            w,
            h,
            &mut hf,
            &mut lf_odd,
            &mut lf_even,
            &mut scratch,
            |_, kind, hf, lf| {
                for (acc, v) in sum.iter_mut().zip(hf.iter()) {
                    *acc += v;
                }
                if kind.last {
                    residual.copy_from_slice(lf);
                }
            },
        );

        for i in 0..src.len() {
            assert!(
                (sum[i] + residual[i] - src[i]).abs() < 1e-5,
                "pixel {i}: {} vs {}",
                sum[i] + residual[i],
                src[i]
            );
        }
    }
}
