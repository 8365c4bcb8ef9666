use crate::foundation::core::{PixelBuf, Roi};
use crate::foundation::error::ArgentumResult;
use crate::iop::params::ParamsBlob;
use crate::iop::{IopColorspace, IopFlags, IopGroup, IopModule, ProcessCtx};

/// First pipeline stage: black-level subtraction and white balance on the
/// provider's linear sensor RGB. Publishes the `demosaic` tap.
///
/// The raw provider already delivers sensor RGB, so no CFA interpolation
/// happens here; this stage normalizes the signal the rest of the chain
/// assumes.
pub struct Demosaic;

impl IopModule for Demosaic {
    fn op(&self) -> &'static str {
        "demosaic"
    }

    fn name(&self) -> &'static str {
        "demosaic"
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
        IopColorspace::SensorRgb
    }

    fn default_params(&self) -> ParamsBlob {
        ParamsBlob {
            version: 1,
            values: serde_json::json!({}),
        }
    }

    fn process(
        &self,
        ctx: &ProcessCtx<'_>,
        input: &PixelBuf,
        _roi_in: &Roi,
        roi_out: &Roi,
        _params: &ParamsBlob,
    ) -> ArgentumResult<PixelBuf> {
        let black = ctx.raw.black_level;
        let wb = ctx.raw.wb_coeffs;

        let mut out = PixelBuf::new(roi_out.width, roi_out.height);
        let src = input.as_slice();
        let dst = out.as_mut_slice();
        for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
            for c in 0..3 {
                d[c] = ((s[c] - black) * wb[c]).max(0.0);
            }
            d[3] = 1.0;
        }
        Ok(out)
    }
}
