//! Denoise / diffuse engine.
//!
//! Iterative wavelet à-trous decomposition with a guided-filter step per
//! scale, Anscombe variance stabilization, and a heat-PDE sharpening pass
//! on the norm carrier. Works scene-linear, never raises dead or hot
//! pixels, and guards edges against ringing.

pub mod anscombe;
pub mod guided;
pub mod wavelet;

use crate::foundation::core::{PixelBuf, Roi};
use crate::foundation::error::ArgentumResult;
use crate::iop::params::{ParamField, ParamsBlob};
use crate::iop::{IopColorspace, IopFlags, IopGroup, IopModule, ProcessCtx};
use crate::pipe::tiling::TilingFootprint;

/// User parameters; ranges and defaults match the historical module.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DenoiseParams {
    /// Diffusion iterations; more is stronger and slower.
    pub iterations: u32,
    /// Diffusion radius in pixels at full scale.
    pub radius: u32,
    /// RGB denoise strength.
    pub denoise_rgb: f32,
    /// Chroma denoise strength.
    pub denoise_chroma: f32,
    /// Edges/noise threshold, RGB pass (log10 exponent).
    pub edges_threshold_rgb: f32,
    /// Edges/noise threshold, chroma pass.
    pub edges_threshold_chroma: f32,
    /// Edge protection, RGB pass.
    pub edges_sensibility_rgb: f32,
    /// Edge protection, chroma pass.
    pub edges_sensibility_chroma: f32,
    /// Sharpness applied on the norm carrier.
    pub sharpness: f32,
    /// Edge sensitivity of the sharpening penalty.
    pub edges_sensibility_sharpness: f32,
    /// Hot-pixel detector threshold.
    pub hot_pixels_threshold: f32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            iterations: 5,
            radius: 12,
            denoise_rgb: 0.05,
            denoise_chroma: 1.0,
            edges_threshold_rgb: 6.0,
            edges_threshold_chroma: 1.0,
            edges_sensibility_rgb: 6.0,
            edges_sensibility_chroma: 0.0,
            sharpness: 0.07,
            edges_sensibility_sharpness: 6.0,
            hot_pixels_threshold: 8.0,
        }
    }
}

const SCHEMA: &[ParamField] = &[
    ParamField::int("iterations", 1.0, 32.0, 5.0),
    ParamField::int("radius", 1.0, 32.0, 12.0),
    ParamField::float("denoise_rgb", 0.0, 1.0, 0.05),
    ParamField::float("denoise_chroma", 0.0, 1.0, 1.0),
    ParamField::float("edges_threshold_rgb", 0.0, 15.0, 6.0),
    ParamField::float("edges_threshold_chroma", 0.0, 15.0, 1.0),
    ParamField::float("edges_sensibility_rgb", 0.0, 15.0, 6.0),
    ParamField::float("edges_sensibility_chroma", 0.0, 15.0, 0.0),
    ParamField::float("sharpness", 0.0, 1.0, 0.07),
    ParamField::float("edges_sensibility_sharpness", 0.0, 15.0, 6.0),
    ParamField::float("hot_pixels_threshold", 0.0, 15.0, 8.0),
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum ReconstructVariant {
    Rgb,
    Chroma,
}

#[allow(clippy::too_many_arguments)]
fn wavelets_process(
    input: &[f32],
    reconstructed: &mut [f32],
    width: usize,
    height: usize,
    zoom: f32,
    scales: u32,
    hf: &mut [f32],
    lf_odd: &mut Vec<f32>,
    lf_even: &mut Vec<f32>,
    scratch: &mut [f32],
    variant: ReconstructVariant,
    p: &DenoiseParams,
) {
    let (denoise, edges_sensibility, edges_threshold) = match variant {
        ReconstructVariant::Rgb => (
            p.denoise_rgb,
            p.edges_sensibility_rgb,
            p.edges_threshold_rgb,
        ),
        ReconstructVariant::Chroma => (
            p.denoise_chroma,
            p.edges_sensibility_chroma,
            p.edges_threshold_chroma,
        ),
    };
    let threshold = 10.0f32.powf(-edges_threshold);
    let regularization = 10.0f32.powf(edges_sensibility) - 1.0;
    let hot_threshold = 10.0f32.powf(p.hot_pixels_threshold);
    let regularization_sharpen = 10.0f32.powf(p.edges_sensibility_sharpness);

    wavelet::decompose_sequence(
        input,
        scales,
        width,
        height,
        hf,
        lf_odd,
        lf_even,
        scratch,
        |s, kind, hf, lf| {
            let radius = (1u32 << s) as f32 * zoom;
            match variant {
                ReconstructVariant::Rgb => guided::guided_laplacians(
                    hf,
                    lf,
                    reconstructed,
                    width,
                    height,
                    kind,
                    radius,
                    regularization,
                    denoise,
                    hot_threshold,
                ),
                ReconstructVariant::Chroma => guided::heat_pde_diffusion(
                    hf,
                    lf,
                    reconstructed,
                    width,
                    height,
                    kind,
                    radius,
                    regularization,
                    threshold,
                    denoise,
                    p.sharpness,
                    regularization_sharpen,
                    hot_threshold,
                ),
            }
        },
    );
}

/// The denoise/diffuse IOP.
pub struct Denoise;

impl IopModule for Denoise {
    fn op(&self) -> &'static str {
        "denoise"
    }

    fn name(&self) -> &'static str {
        "pixel cleaner"
    }

    fn default_group(&self) -> IopGroup {
        IopGroup::Correct
    }

    fn flags(&self) -> IopFlags {
        IopFlags {
            supports_blending: true,
            allow_tiling: true,
            reentrant: true,
            ..Default::default()
        }
    }

    fn colorspace(&self) -> IopColorspace {
        IopColorspace::LinearRgb
    }

    fn params_schema(&self) -> &'static [ParamField] {
        SCHEMA
    }

    fn default_params(&self) -> ParamsBlob {
        ParamsBlob::from_typed(1, &DenoiseParams::default()).expect("default params serialize")
    }

    fn footprint(&self, _roi_in: &Roi, roi_out: &Roi, params: &ParamsBlob) -> TilingFootprint {
        let p: DenoiseParams = params.typed().unwrap_or_default();
        let detail_scale = (1.0 / roi_out.scale).max(1.0);
        let scales = wavelet::scales_for_radius(p.radius as f32 / detail_scale);
        TilingFootprint {
            // input + output + temp + HF + two LF + scratch working buffers.
            factor: 8.0,
            overhead: 0,
            // À-trous reach across all scales plus the guided window.
            overlap: (1u32 << (scales + 1)) + 4 * scales,
            xalign: 1,
            yalign: 1,
        }
    }

    fn process(
        &self,
        ctx: &ProcessCtx<'_>,
        input: &PixelBuf,
        roi_in: &Roi,
        roi_out: &Roi,
        params: &ParamsBlob,
    ) -> ArgentumResult<PixelBuf> {
        let p: DenoiseParams = params.typed()?;

        let width = roi_in.width as usize;
        let height = roi_in.height as usize;
        let size = 4 * width * height;

        // Effective scale: preview pipes run the same radius on fewer pixels.
        let detail_scale = (1.0 / roi_in.scale).max(1.0);
        let final_radius = p.radius as f32 / detail_scale;
        let iterations = p.iterations.max(1);
        let scales = wavelet::scales_for_radius(final_radius);

        let wb = ctx.raw.wb_coeffs;
        let a = [
            ctx.raw.noise_profile[0].a,
            ctx.raw.noise_profile[1].a,
            ctx.raw.noise_profile[2].a,
        ];
        let b = [
            ctx.raw.noise_profile[0].b,
            ctx.raw.noise_profile[1].b,
            ctx.raw.noise_profile[2].b,
        ];
        // Variance grows with the WB coefficients and the scaling factor.
        let sigma2_plus_3_8 = anscombe::sigma_terms(a, b, wb, detail_scale, 3.0 / 8.0);
        let sigma2_plus_1_8 = anscombe::sigma_terms(a, b, wb, detail_scale, 1.0 / 8.0);

        let rgb_prepare_threshold = 10.0f32.powf(-p.edges_threshold_rgb);

        let mut temp = vec![0.0f32; size];
        let mut output = vec![0.0f32; size];
        let mut hf = vec![0.0f32; size];
        let mut lf_odd = vec![0.0f32; size];
        let mut lf_even = vec![0.0f32; size];
        let mut scratch = vec![0.0f32; size];

        ctx.pool.install(|| {
            guided::prepare_image(input.as_slice(), &mut temp, width, height, rgb_prepare_threshold);

            for _ in 0..iterations {
                anscombe::precondition(&mut temp, a, sigma2_plus_3_8);
                wavelets_process(
                    &temp,
                    &mut output,
                    width,
                    height,
                    detail_scale,
                    scales,
                    &mut hf,
                    &mut lf_odd,
                    &mut lf_even,
                    &mut scratch,
                    ReconstructVariant::Rgb,
                    &p,
                );
                anscombe::backtransform(&mut output, a, sigma2_plus_1_8);
                // RGB ratios make no sense in Anscombe space, so the chroma
                // pass runs on the scene-linear reconstruction.
                anscombe::split_ratios(&mut output);
                wavelets_process(
                    &output,
                    &mut temp,
                    width,
                    height,
                    detail_scale,
                    scales,
                    &mut hf,
                    &mut lf_odd,
                    &mut lf_even,
                    &mut scratch,
                    ReconstructVariant::Chroma,
                    &p,
                );
                guided::prepare_image(&temp, &mut output, width, height, rgb_prepare_threshold);
            }
        });

        crop_to_roi(&output, roi_in, roi_out)
    }
}

/// Trim the processed `roi_in` buffer down to `roi_out` (tiled invocations
/// hand the module a grown input region).
fn crop_to_roi(full: &[f32], roi_in: &Roi, roi_out: &Roi) -> ArgentumResult<PixelBuf> {
    if roi_in == roi_out {
        return PixelBuf::from_vec(roi_out.width, roi_out.height, full.to_vec());
    }

    let dx = (roi_out.x - roi_in.x).max(0) as usize;
    let dy = (roi_out.y - roi_in.y).max(0) as usize;
    let in_w = roi_in.width as usize;

    let mut out = PixelBuf::new(roi_out.width, roi_out.height);
    let out_w = roi_out.width as usize;
    let dst = out.as_mut_slice();
    for y in 0..roi_out.height as usize {
        let src_base = 4 * ((dy + y) * in_w + dx);
        let dst_base = 4 * (y * out_w);
        dst[dst_base..dst_base + 4 * out_w]
            .copy_from_slice(&full[src_base..src_base + 4 * out_w]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{CancelToken, RawImage};

    fn ctx_parts() -> (rayon::ThreadPool, RawImage, CancelToken) {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();
        (pool, RawImage::synthetic(24, 24, 7), CancelToken::new())
    }

    #[test]
    fn identity_knobs_reduce_to_the_anscombe_round_trip() {
        let (pool, raw, cancel) = ctx_parts();
        let ctx = ProcessCtx {
            pool: &pool,
            raw: &raw,
            cancel: &cancel,
        };

        let value = 0.18f32;
        let mut input = PixelBuf::new(24, 24);
        input.fill([value, value, value, 1.0]);
        let roi = Roi::full(24, 24);

        let p = DenoiseParams {
            iterations: 1,
            denoise_rgb: 0.0,
            denoise_chroma: 0.0,
            sharpness: 0.0,
            ..Default::default()
        };
        let params = ParamsBlob::from_typed(1, &p).unwrap();
        let out = Denoise.process(&ctx, &input, &roi, &roi, &params).unwrap();

        // Reference: the Anscombe round-trip alone on the same tile.
        let wb = raw.wb_coeffs;
        let a = [raw.noise_profile[0].a, raw.noise_profile[1].a, raw.noise_profile[2].a];
        let b = [raw.noise_profile[0].b, raw.noise_profile[1].b, raw.noise_profile[2].b];
        let s38 = anscombe::sigma_terms(a, b, wb, 1.0, 3.0 / 8.0);
        let s18 = anscombe::sigma_terms(a, b, wb, 1.0, 1.0 / 8.0);
        let mut reference = vec![value, value, value, 1.0];
        anscombe::precondition(&mut reference, a, s38);
        anscombe::backtransform(&mut reference, a, s18);

        for y in 0..24 {
            for x in 0..24 {
                let px = out.pixel(x, y);
                for c in 0..3 {
                    assert!(
                        (px[c] - reference[c]).abs() < 1e-4,
                        "({x},{y}) channel {c}: {} vs {}",
                        px[c],
                        reference[c]
                    );
                }
            }
        }
    }

    #[test]
    fn full_strength_run_stays_finite() {
        let (pool, raw, cancel) = ctx_parts();
        let ctx = ProcessCtx {
            pool: &pool,
            raw: &raw,
            cancel: &cancel,
        };

        let mut input = PixelBuf::new(24, 24);
        for y in 0..24 {
            for x in 0..24 {
                let v = if (x + y) % 2 == 0 { 0.02 } else { 0.3 };
                input.set_pixel(x, y, [v, v * 0.5, v * 0.25, 1.0]);
            }
        }
        let roi = Roi::full(24, 24);
        let params = Denoise.default_params();
        let out = Denoise.process(&ctx, &input, &roi, &roi, &params).unwrap();
        let mut mean = 0.0f64;
        for v in out.as_slice() {
            assert!(v.is_finite(), "non-finite output {v}");
            mean += f64::from(*v);
        }
        mean /= out.as_slice().len() as f64;
        assert!(mean > 0.0, "signal collapsed to {mean}");
    }

    #[test]
    fn footprint_grows_with_radius() {
        let roi = Roi::full(64, 64);
        let small = Denoise.footprint(
            &roi,
            &roi,
            &ParamsBlob::from_typed(1, &DenoiseParams { radius: 1, ..Default::default() }).unwrap(),
        );
        let large = Denoise.footprint(
            &roi,
            &roi,
            &ParamsBlob::from_typed(1, &DenoiseParams { radius: 32, ..Default::default() }).unwrap(),
        );
        assert!(large.overlap > small.overlap);
    }

    #[test]
    fn crop_extracts_the_inner_region() {
        let roi_in = Roi::new(0, 0, 4, 4, 1.0).unwrap();
        let roi_out = Roi::new(1, 1, 2, 2, 1.0).unwrap();
        let mut full = vec![0.0f32; 4 * 16];
        for (i, chunk) in full.chunks_exact_mut(4).enumerate() {
            chunk[0] = i as f32;
        }
        let out = crop_to_roi(&full, &roi_in, &roi_out).unwrap();
        assert_eq!(out.pixel(0, 0)[0], 5.0);
        assert_eq!(out.pixel(1, 1)[0], 10.0);
    }
}
