use crate::color::srgb_oetf;
use crate::foundation::core::{PixelBuf, Roi};
use crate::foundation::error::ArgentumResult;
use crate::iop::params::ParamsBlob;
use crate::iop::{IopColorspace, IopFlags, IopGroup, IopModule, ProcessCtx};

/// Final display transfer: linear display RGB → non-linear, clamped to
/// `[0, 1]`. Publishes the `gamma` tap.
pub struct Gamma;

impl IopModule for Gamma {
    fn op(&self) -> &'static str {
        "gamma"
    }

    fn name(&self) -> &'static str {
        "display transfer"
    }

    fn default_group(&self) -> IopGroup {
        IopGroup::Basic
    }

    fn flags(&self) -> IopFlags {
        IopFlags {
            allow_tiling: true,
            reentrant: true,
            ..Default::default()
        }
    }

    fn colorspace(&self) -> IopColorspace {
        IopColorspace::DisplayRgb
    }

    fn default_params(&self) -> ParamsBlob {
        ParamsBlob {
            version: 1,
            values: serde_json::json!({}),
        }
    }

    fn process(
        &self,
        _ctx: &ProcessCtx<'_>,
        input: &PixelBuf,
        _roi_in: &Roi,
        roi_out: &Roi,
        _params: &ParamsBlob,
    ) -> ArgentumResult<PixelBuf> {
        let mut out = PixelBuf::new(roi_out.width, roi_out.height);
        let src = input.as_slice();
        let dst = out.as_mut_slice();
        for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
            for c in 0..3 {
                d[c] = srgb_oetf(s[c].clamp(0.0, 1.0));
            }
            d[3] = 1.0;
        }
        Ok(out)
    }
}

/// Quantize a gamma-stage float buffer to display RGBA8.
pub fn to_display_rgba8(buf: &PixelBuf) -> Vec<u8> {
    buf.as_slice()
        .chunks_exact(4)
        .flat_map(|px| {
            [
                (px[0].clamp(0.0, 1.0) * 255.0).round() as u8,
                (px[1].clamp(0.0, 1.0) * 255.0).round() as u8,
                (px[2].clamp(0.0, 1.0) * 255.0).round() as u8,
                255u8,
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{CancelToken, RawImage};

    #[test]
    fn transfer_is_monotonic_and_clamped() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();
        let raw = RawImage::synthetic(3, 1, 1);
        let cancel = CancelToken::new();
        let ctx = ProcessCtx {
            pool: &pool,
            raw: &raw,
            cancel: &cancel,
        };

        let mut input = PixelBuf::new(3, 1);
        input.set_pixel(0, 0, [-0.5, 0.18, 2.0, 1.0]);
        input.set_pixel(1, 0, [0.5, 0.5, 0.5, 1.0]);
        input.set_pixel(2, 0, [1.0, 1.0, 1.0, 1.0]);
        let roi = Roi::full(3, 1);
        let out = Gamma
            .process(&ctx, &input, &roi, &roi, &Gamma.default_params())
            .unwrap();

        let low = out.pixel(0, 0);
        assert_eq!(low[0], 0.0);
        assert!((low[2] - 1.0).abs() < 1e-6);
        assert!(out.pixel(1, 0)[0] > 0.5); // sRGB lifts mid-tones
        assert!((out.pixel(2, 0)[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn display_quantization_is_full_range() {
        let mut buf = PixelBuf::new(2, 1);
        buf.set_pixel(0, 0, [0.0, 0.0, 0.0, 1.0]);
        buf.set_pixel(1, 0, [1.0, 1.0, 1.0, 1.0]);
        let bytes = to_display_rgba8(&buf);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 255]);
        assert_eq!(&bytes[4..8], &[255, 255, 255, 255]);
    }
}
