//! Guided-filter reconstruction of wavelet high frequencies, with the
//! diffusion fallbacks and the hot-pixel guard.
//!
//! Per pixel: gather the 7×7 window of HF coefficients, build the 3×3
//! channel covariance, and solve the cross-channel linear model
//! `y = A·x + b` when the regularized covariance inverts. Singular or
//! rejected solutions fall back to isotropic diffusion gated by local
//! variance; the norm channel carries the sharpening term.

use rayon::prelude::*;

use crate::foundation::math::{Mat3, invert_mat3, mat3_row_mul, rgb_norm, sqf};
use crate::iop::denoise::wavelet::ScaleKind;

const FILTER_RADIUS: isize = 3;
const FILTER_WIDTH: usize = (2 * FILTER_RADIUS as usize) + 1;
const FILTER_SIZE: usize = FILTER_WIDTH * FILTER_WIDTH;

/// Knobs for one [`guided_filter_3d`] call.
#[derive(Clone, Copy, Debug)]
pub struct GuidedParams {
    /// ε added to the covariance diagonal before inversion.
    pub threshold: f32,
    /// Diffusion strength.
    pub denoise: f32,
    /// Edge-avoidance factor for the diffusion step gate.
    pub regularization: f32,
    /// Current wavelet radius in pixels.
    pub radius: f32,
    /// First-order (chroma) variant; second-order (RGB) otherwise.
    pub first_order: bool,
    /// Hot-pixel detector threshold on bilaplacian²/variance.
    pub hot_threshold: f32,
    /// Norm-channel sharpening strength (chroma variant only).
    pub sharpen: f32,
    /// Variance gate for the sharpening penalty.
    pub regularization_sharpen: f32,
}

struct Window {
    neighbours: [[f32; 4]; FILTER_SIZE],
    mask: [bool; FILTER_SIZE],
    average: [f32; 4],
    num_elem: f32,
    variance: f32,
}

fn gather_window(buf: &[f32], i: usize, j: usize, width: usize, height: usize) -> Window {
    let mut w = Window {
        neighbours: [[0.0; 4]; FILTER_SIZE],
        mask: [false; FILTER_SIZE],
        average: [0.0; 4],
        num_elem: 0.0,
        variance: 0.0,
    };

    for ii in 0..FILTER_WIDTH {
        let index_v = i as isize + ii as isize - FILTER_RADIUS;
        if index_v < 0 || index_v >= height as isize {
            continue;
        }
        for jj in 0..FILTER_WIDTH {
            let index_h = j as isize + jj as isize - FILTER_RADIUS;
            if index_h < 0 || index_h >= width as isize {
                continue;
            }
            let k = ii * FILTER_WIDTH + jj;
            let base = 4 * (index_v as usize * width + index_h as usize);
            w.mask[k] = true;
            w.num_elem += 1.0;
            for c in 0..4 {
                w.neighbours[k][c] = buf[base + c];
                w.average[c] += buf[base + c];
            }
            // Local variance on the norm carrier: a sharpness metric less
            // biased by per-channel noise.
            w.variance += sqf(buf[base + 3]);
        }
    }

    for c in 0..4 {
        w.average[c] /= w.num_elem;
    }
    w.variance /= w.num_elem;
    w
}

/// Channel covariance of the window. Accumulation divides by the element
/// count inside the sum: HF averages sit near zero and the early division
/// avoids catastrophic cancellation.
fn covariance(w: &Window) -> Mat3 {
    let mut cov = [[0.0f32; 3]; 3];
    for k in 0..FILTER_SIZE {
        if !w.mask[k] {
            continue;
        }
        for ii in 0..3 {
            for jj in ii..3 {
                cov[ii][jj] +=
                    (w.average[ii] - w.neighbours[k][ii]) * (w.average[jj] - w.neighbours[k][jj])
                        / w.num_elem;
            }
        }
    }
    cov[1][0] = cov[0][1];
    cov[2][0] = cov[0][2];
    cov[2][1] = cov[1][2];
    cov
}

fn solve_linear_model(cov: &Mat3, threshold: f32) -> Option<[[f32; 3]; 3]> {
    let mut sigma = *cov;
    for (ii, row) in sigma.iter_mut().enumerate() {
        row[ii] += threshold;
    }
    let sigma_inv = invert_mat3(&sigma)?;
    let mut a = [[0.0f32; 3]; 3];
    for c in 0..3 {
        a[c] = mat3_row_mul(cov[c], &sigma_inv);
    }
    Some(a)
}

/// Plain guided filter used to prepare the image between iterations: solve
/// the linear model when possible, keep the input otherwise.
pub fn basic_guided_filter_3d(
    rgb: &mut [f32; 4],
    input: &[f32],
    i: usize,
    j: usize,
    width: usize,
    height: usize,
    threshold: f32,
) {
    let w = gather_window(input, i, j, width, height);
    let cov = covariance(&w);

    if let Some(a) = solve_linear_model(&cov, threshold) {
        let original = *rgb;
        for c in 0..3 {
            let b = w.average[c]
                - a[c][0] * w.average[0]
                - a[c][1] * w.average[1]
                - a[c][2] * w.average[2];
            rgb[c] = a[c][0] * original[0] + a[c][1] * original[1] + a[c][2] * original[2] + b;
        }
    }
}

/// Guided reconstruction of one HF pixel; returns the local norm variance.
pub fn guided_filter_3d(
    rgb: &mut [f32; 4],
    hf: &[f32],
    i: usize,
    j: usize,
    width: usize,
    height: usize,
    p: &GuidedParams,
) -> f32 {
    let w = gather_window(hf, i, j, width, height);
    let local_variance = w.variance;

    // Bilaplacian: laplacian of the HF coefficients.
    let mut bilaplacian = [0.0f32; 4];
    for c in 0..4 {
        bilaplacian[c] = (w.average[c] - rgb[c]) * 24.0 / FILTER_SIZE as f32;
    }

    // Hot pixels show as a bilaplacian spike over the local variance.
    let is_hot = (0..3).any(|c| sqf(bilaplacian[c]) / (local_variance + 1e-9) > p.hot_threshold);
    if is_hot {
        *rgb = w.average;
        return local_variance;
    }

    let norm_backup = rgb[3];
    let cov = covariance(&w);
    let mut guided_success = false;

    if p.first_order
        && let Some(a) = solve_linear_model(&cov, p.threshold)
    {
        // Cross-channel linear model; the typical case on edges.
        let original = *rgb;
        let mut all_ok = true;
        for c in 0..3 {
            let b = w.average[c]
                - a[c][0] * w.average[0]
                - a[c][1] * w.average[1]
                - a[c][2] * w.average[2];
            let test_value =
                a[c][0] * original[0] + a[c][1] * original[1] + a[c][2] * original[2] + b;

            // Discard solutions outside original HF ± 100%: poorly
            // conditioned matrices ring and overshoot at edges.
            let ok = (test_value - original[c]).abs() / (original[c].abs() + 1e-9) < 1.0;
            if ok {
                rgb[c] = test_value;
            } else {
                all_ok = false;
            }
        }
        guided_success = all_ok;
    }

    if !guided_success {
        if p.first_order {
            // First-order diffusion, laplacian → 0; aggressive, chroma only.
            let penalty = (1.0 / (1.0 + p.regularization * local_variance)).min(1.0);
            let factor = p.denoise * penalty / p.radius;
            for c in 0..3 {
                rgb[c] += factor * (-0.5 * rgb[c] + bilaplacian[c]);
            }
        } else {
            // Second-order diffusion, laplacian(laplacian) → 0; preserves
            // edges better for RGB.
            for c in 0..3 {
                let gate = (1.0 / (1.0 + p.regularization * cov[c][c])).min(1.0);
                rgb[c] += p.denoise * gate * bilaplacian[c] / p.radius;
            }
        }
    }

    rgb[3] = norm_backup;

    if p.first_order && i > 4 && j > 4 && i + 4 < height && j + 4 < width {
        let sharp_penalty = (p.regularization_sharpen
            * local_variance
            * (1.0 - p.regularization_sharpen * local_variance).abs())
        .min(1.0);
        rgb[3] -= 0.5 * p.sharpen * sharp_penalty * bilaplacian[3] / p.radius;
    }

    local_variance
}

/// Between-iteration image preparation: guided smoothing plus the norm
/// carrier refresh in the alpha slot.
pub fn prepare_image(input: &[f32], output: &mut [f32], width: usize, height: usize, edge_threshold: f32) {
    let row = 4 * width;
    output
        .par_chunks_mut(row)
        .enumerate()
        .for_each(|(i, out_row)| {
            for j in 0..width {
                let base = 4 * (i * width + j);
                let mut rgb = [input[base], input[base + 1], input[base + 2], input[base + 3]];
                basic_guided_filter_3d(&mut rgb, input, i, j, width, height, edge_threshold);
                rgb[3] = rgb_norm(rgb[0], rgb[1], rgb[2]);
                out_row[4 * j..4 * j + 4].copy_from_slice(&rgb);
            }
        });
}

/// RGB variant of the per-scale reconstruction: second-order guided
/// laplacians accumulated into `output`.
#[allow(clippy::too_many_arguments)]
pub fn guided_laplacians(
    high_freq: &[f32],
    low_freq: &[f32],
    output: &mut [f32],
    width: usize,
    height: usize,
    kind: ScaleKind,
    radius: f32,
    regularization: f32,
    denoise: f32,
    hot_threshold: f32,
) {
    let p = GuidedParams {
        threshold: 0.0,
        denoise,
        regularization,
        radius,
        first_order: false,
        hot_threshold,
        sharpen: 0.0,
        regularization_sharpen: 0.0,
    };

    let row = 4 * width;
    output
        .par_chunks_mut(row)
        .enumerate()
        .for_each(|(i, out_row)| {
            for j in 0..width {
                let base = 4 * (i * width + j);
                let mut hf_px = [
                    high_freq[base],
                    high_freq[base + 1],
                    high_freq[base + 2],
                    high_freq[base + 3],
                ];
                let norm_backup = hf_px[3];
                guided_filter_3d(&mut hf_px, high_freq, i, j, width, height, &p);
                hf_px[3] = norm_backup;

                let out_px = &mut out_row[4 * j..4 * j + 4];
                if kind.first {
                    out_px.copy_from_slice(&hf_px);
                } else {
                    for c in 0..4 {
                        out_px[c] += hf_px[c];
                    }
                }

                if kind.last {
                    for c in 0..4 {
                        out_px[c] = (out_px[c] + low_freq[base + c]).max(0.0);
                    }
                }
            }
        });
}

// Discretized 4th-order isotropic laplacian, 5x5 support.
const ISOTROPIC_KERNEL: [[f32; 5]; 5] = [
    [-0.008_333_33, 0.0, -0.066_666_6, 0.0, -0.008_333_33],
    [0.0, 0.133_333_33, 1.066_666_67, 0.133_333_33, 0.0],
    [-0.066_666_67, 1.066_666_67, -4.5, 1.066_666_67, -0.066_666_67],
    [0.0, 0.133_333_33, 1.066_666_67, 0.133_333_33, 0.0],
    [-0.008_333_33, 0.0, -0.066_666_67, 0.0, -0.008_333_33],
];

/// Chroma variant: first-order diffusion on the ratio channels and
/// heat-PDE sharpening on the norm carrier; the last scale recombines
/// ratios and norm back into RGB.
#[allow(clippy::too_many_arguments)]
pub fn heat_pde_diffusion(
    high_freq: &[f32],
    low_freq: &[f32],
    output: &mut [f32],
    width: usize,
    height: usize,
    kind: ScaleKind,
    radius: f32,
    regularization: f32,
    edge_threshold: f32,
    denoise: f32,
    sharpen: f32,
    regularization_sharpen: f32,
    hot_threshold: f32,
) {
    let p = GuidedParams {
        threshold: edge_threshold,
        denoise,
        regularization,
        radius,
        first_order: true,
        hot_threshold,
        sharpen,
        regularization_sharpen,
    };

    let row = 4 * width;
    output
        .par_chunks_mut(row)
        .enumerate()
        .for_each(|(i, out_row)| {
            for j in 0..width {
                let base = 4 * (i * width + j);
                let mut hf_px = [
                    high_freq[base],
                    high_freq[base + 1],
                    high_freq[base + 2],
                    high_freq[base + 3],
                ];
                let local_variance =
                    guided_filter_3d(&mut hf_px, high_freq, i, j, width, height, &p);

                if i > 2 && j > 2 && i + 2 < height && j + 2 < width {
                    // HF modulates the signal around LF: scale the boost by
                    // the base signal to avoid over-sharpening near black.
                    let mut laplacian_lf = 0.0f32;
                    for (ii, krow) in ISOTROPIC_KERNEL.iter().enumerate() {
                        for (jj, k) in krow.iter().enumerate() {
                            let index_v = i + ii - 2;
                            let index_h = j + jj - 2;
                            laplacian_lf += low_freq[4 * (index_v * width + index_h) + 3] * k;
                        }
                    }
                    let sharp_penalty = (regularization_sharpen
                        * local_variance
                        * (1.0 - regularization_sharpen * local_variance).abs())
                    .min(1.0);
                    hf_px[3] -= sharpen * sharp_penalty * laplacian_lf / radius;
                }

                let out_px = &mut out_row[4 * j..4 * j + 4];
                if kind.first {
                    out_px.copy_from_slice(&hf_px);
                } else {
                    for c in 0..4 {
                        out_px[c] += hf_px[c];
                    }
                }

                if kind.last {
                    for c in 0..4 {
                        out_px[c] = (out_px[c] + low_freq[base + c]).max(0.0);
                    }
                    // Reconstruct RGB from ratios and norm, then refresh the
                    // norm carrier for the next pass.
                    for c in 0..3 {
                        out_px[c] *= out_px[3];
                    }
                    out_px[3] = rgb_norm(out_px[0], out_px[1], out_px[2]);
                }
            }
        });
}
