use crate::foundation::core::{PixelBuf, Roi};
use crate::foundation::error::ArgentumResult;
use crate::iop::params::ParamsBlob;
use crate::iop::{IopColorspace, IopFlags, IopGroup, IopModule, ProcessCtx};

/// Output color profile conversion: working RGB → display RGB, linear.
/// Publishes the `colorout` tap.
///
/// Both profiles are plain matrix spaces, so the conversion composes the
/// camera matrix with the display inverse per pixel.
pub struct Colorout;

impl IopModule for Colorout {
    fn op(&self) -> &'static str {
        "colorout"
    }

    fn name(&self) -> &'static str {
        "output color profile"
    }

    fn default_group(&self) -> IopGroup {
        IopGroup::Color
    }

    fn flags(&self) -> IopFlags {
        IopFlags {
            allow_tiling: true,
            reentrant: true,
            ..Default::default()
        }
    }

    fn colorspace(&self) -> IopColorspace {
        IopColorspace::LinearRgb
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
        let input_profile = ctx.raw.input_profile;
        let output_profile = ctx.raw.output_profile;

        let mut out = PixelBuf::new(roi_out.width, roi_out.height);
        let src = input.as_slice();
        let dst = out.as_mut_slice();
        for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
            let xyz = input_profile.rgb_to_xyz([s[0], s[1], s[2]]);
            let rgb = output_profile.xyz_to_rgb(xyz);
            d[0] = rgb[0];
            d[1] = rgb[1];
            d[2] = rgb[2];
            d[3] = s[3];
        }
        Ok(out)
    }
}
