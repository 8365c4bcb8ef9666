use crate::foundation::core::{PixelBuf, Roi};
use crate::foundation::error::ArgentumResult;
use crate::iop::params::{ParamField, ParamsBlob};
use crate::iop::{IopColorspace, IopFlags, IopGroup, IopModule, ProcessCtx};

#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct ExposureParams {
    /// Exposure correction in EV.
    pub exposure_ev: f32,
    /// Additional black point, subtracted before the gain.
    pub black: f32,
}

impl Default for ExposureParams {
    fn default() -> Self {
        Self {
            exposure_ev: 0.0,
            black: 0.0,
        }
    }
}

const SCHEMA: &[ParamField] = &[
    ParamField::float("exposure_ev", -10.0, 10.0, 0.0),
    ParamField::float("black", -0.5, 0.5, 0.0),
];

/// Scene-linear exposure gain and black point.
pub struct Exposure;

impl IopModule for Exposure {
    fn op(&self) -> &'static str {
        "exposure"
    }

    fn name(&self) -> &'static str {
        "exposure"
    }

    fn default_group(&self) -> IopGroup {
        IopGroup::Basic
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
        ParamsBlob::from_typed(1, &ExposureParams::default()).expect("default params serialize")
    }

    fn process(
        &self,
        _ctx: &ProcessCtx<'_>,
        input: &PixelBuf,
        _roi_in: &Roi,
        roi_out: &Roi,
        params: &ParamsBlob,
    ) -> ArgentumResult<PixelBuf> {
        let p: ExposureParams = params.typed()?;
        let gain = 2.0f32.powf(p.exposure_ev);

        let mut out = PixelBuf::new(roi_out.width, roi_out.height);
        let src = input.as_slice();
        let dst = out.as_mut_slice();
        for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
            for c in 0..3 {
                d[c] = (s[c] - p.black) * gain;
            }
            d[3] = s[3];
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{CancelToken, RawImage};

    #[test]
    fn one_ev_doubles_the_signal() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();
        let raw = RawImage::synthetic(1, 1, 1);
        let cancel = CancelToken::new();
        let ctx = ProcessCtx {
            pool: &pool,
            raw: &raw,
            cancel: &cancel,
        };

        let mut input = PixelBuf::new(1, 1);
        input.fill([0.2, 0.2, 0.2, 1.0]);
        let roi = Roi::full(1, 1);
        let params = ParamsBlob::from_typed(
            1,
            &ExposureParams {
                exposure_ev: 1.0,
                black: 0.0,
            },
        )
        .unwrap();

        let out = Exposure.process(&ctx, &input, &roi, &roi, &params).unwrap();
        assert!((out.pixel(0, 0)[0] - 0.4).abs() < 1e-6);
    }
}
