use std::sync::Arc;

use argentum::iop::denoise::anscombe;
use argentum::iop::denoise::DenoiseParams;
use argentum::iop::params::ParamsBlob;
use argentum::iop::IopRegistry;
use argentum::{
    NoiseParams, PipeKind, Pipeline, PipelineContext, PipelineOpts, RawImage, RecomputeRequest,
    Roi,
};

fn context() -> PipelineContext {
    PipelineContext::new(PipelineOpts {
        workers: Some(2),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn anscombe_round_trip_holds_at_mid_range() {
    let a = [1.0e-6f32, 1.3e-6, 0.9e-6];
    let b = [3.0e-7f32, 2.0e-7, 4.0e-7];
    let wb = [2.1f32, 1.0, 1.7];
    let s38 = anscombe::sigma_terms(a, b, wb, 1.0, 3.0 / 8.0);
    let s18 = anscombe::sigma_terms(a, b, wb, 1.0, 1.0 / 8.0);

    let mut tile = Vec::new();
    for _ in 0..64 {
        tile.extend_from_slice(&[0.18f32, 0.18, 0.18, 1.0]);
    }
    let reference = tile.clone();

    anscombe::precondition(&mut tile, a, s38);
    anscombe::backtransform(&mut tile, a, s18);

    for (out, expected) in tile.chunks_exact(4).zip(reference.chunks_exact(4)) {
        for c in 0..3 {
            let rel = (out[c] - expected[c]).abs() / expected[c];
            assert!(rel <= 2.0f32.powi(-20), "relative error {rel}");
        }
    }
}

#[test]
fn identity_settings_match_the_anscombe_round_trip_through_the_pipe() {
    let ctx = context();
    let registry = IopRegistry::builtin();

    let value = 0.22f32;
    let mut raw = RawImage::synthetic(24, 24, 5);
    raw.pixels.fill([value, value, value, 1.0]);
    raw.noise_profile = [NoiseParams { a: 1.1e-6, b: 2.5e-7 }; 3];
    let raw = Arc::new(raw);

    let mut pipe = Pipeline::new(PipeKind::Full, Arc::clone(&raw));
    pipe.push_module(registry.get("denoise").unwrap(), None);
    pipe.set_params(
        "denoise",
        ParamsBlob::from_typed(
            1,
            &DenoiseParams {
                iterations: 1,
                denoise_rgb: 0.0,
                denoise_chroma: 0.0,
                sharpness: 0.0,
                ..Default::default()
            },
        )
        .unwrap(),
    )
    .unwrap();

    let out = pipe
        .process(&ctx, &RecomputeRequest::new(Roi::full(24, 24)))
        .unwrap();

    // Reference: the Anscombe round-trip alone.
    let a = [raw.noise_profile[0].a; 3];
    let b = [raw.noise_profile[0].b; 3];
    let s38 = anscombe::sigma_terms(a, b, raw.wb_coeffs, 1.0, 3.0 / 8.0);
    let s18 = anscombe::sigma_terms(a, b, raw.wb_coeffs, 1.0, 1.0 / 8.0);
    let mut reference = vec![value, value, value, 1.0];
    anscombe::precondition(&mut reference, a, s38);
    anscombe::backtransform(&mut reference, a, s18);

    for px in out.line.pixels().as_slice().chunks_exact(4) {
        for c in 0..3 {
            assert!(
                (px[c] - reference[c]).abs() < 1e-4,
                "channel {c}: {} vs {}",
                px[c],
                reference[c]
            );
        }
    }
    assert!(pipe.troubled().is_empty());
}

#[test]
fn denoising_reduces_checkerboard_noise_energy() {
    let ctx = context();
    let registry = IopRegistry::builtin();

    // Flat field plus alternating ±20% single-pixel noise.
    let base = 0.25f32;
    let mut raw = RawImage::synthetic(32, 32, 6);
    for y in 0..32 {
        for x in 0..32 {
            let sign = if (x + y) % 2 == 0 { 1.0 } else { -1.0 };
            let v = base * (1.0 + 0.2 * sign);
            raw.pixels.set_pixel(x, y, [v, v, v, 1.0]);
        }
    }
    let raw = Arc::new(raw);

    let mut pipe = Pipeline::new(PipeKind::Full, Arc::clone(&raw));
    pipe.push_module(registry.get("denoise").unwrap(), None);
    pipe.set_params(
        "denoise",
        ParamsBlob::from_typed(
            1,
            &DenoiseParams {
                iterations: 2,
                radius: 4,
                denoise_rgb: 1.0,
                denoise_chroma: 1.0,
                edges_sensibility_rgb: 0.0,
                edges_sensibility_chroma: 0.0,
                sharpness: 0.0,
                ..Default::default()
            },
        )
        .unwrap(),
    )
    .unwrap();

    let out = pipe
        .process(&ctx, &RecomputeRequest::new(Roi::full(32, 32)))
        .unwrap();

    // Interior deviation from the local mean must shrink.
    let deviation = |pixels: &[f32]| -> f64 {
        let mut acc = 0.0f64;
        let mut n = 0.0f64;
        for y in 8..24usize {
            for x in 8..24usize {
                let v = pixels[4 * (y * 32 + x)];
                acc += f64::from((v - base).abs());
                n += 1.0;
            }
        }
        acc / n
    };

    let noisy: Vec<f32> = raw.pixels.as_slice().to_vec();
    let before = deviation(&noisy);
    let after = deviation(out.line.pixels().as_slice());
    assert!(
        after < before * 0.8,
        "noise energy did not drop: {before} -> {after}"
    );
}
