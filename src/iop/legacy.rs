//! Deprecated modules kept for backward-compatible edits.
//!
//! bloom, monochrome, soften, velvia, vibrance, globaltonemap, highpass and
//! colorcontrast are no longer maintained algorithmically; each maps its
//! historical parameters onto one shared scalar pass (gain, saturation,
//! contrast around a pivot, mix) so old edits keep rendering.

use crate::foundation::core::{PixelBuf, Roi};
use crate::foundation::error::{ArgentumError, ArgentumResult};
use crate::iop::params::{ParamField, ParamsBlob};
use crate::iop::{IopColorspace, IopFlags, IopGroup, IopModule, ProcessCtx};

/// Which deprecated module this instance stands in for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyKind {
    Bloom,
    Monochrome,
    Soften,
    Velvia,
    Vibrance,
    GlobalTonemap,
    Highpass,
    ColorContrast,
}

impl LegacyKind {
    pub const ALL: &'static [LegacyKind] = &[
        LegacyKind::Bloom,
        LegacyKind::Monochrome,
        LegacyKind::Soften,
        LegacyKind::Velvia,
        LegacyKind::Vibrance,
        LegacyKind::GlobalTonemap,
        LegacyKind::Highpass,
        LegacyKind::ColorContrast,
    ];

    fn op(self) -> &'static str {
        match self {
            Self::Bloom => "bloom",
            Self::Monochrome => "monochrome",
            Self::Soften => "soften",
            Self::Velvia => "velvia",
            Self::Vibrance => "vibrance",
            Self::GlobalTonemap => "globaltonemap",
            Self::Highpass => "highpass",
            Self::ColorContrast => "colorcontrast",
        }
    }
}

/// The shared scalar transfer every legacy module reduces to.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ScalarPass {
    gain: f32,
    saturation: f32,
    contrast: f32,
    pivot: f32,
    mix: f32,
}

impl Default for ScalarPass {
    fn default() -> Self {
        Self {
            gain: 1.0,
            saturation: 1.0,
            contrast: 1.0,
            pivot: 0.18,
            mix: 1.0,
        }
    }
}

/// One deprecated module expressed through the shared scalar pass.
pub struct LegacyIop {
    kind: LegacyKind,
}

impl LegacyIop {
    pub fn new(kind: LegacyKind) -> Self {
        Self { kind }
    }

    fn map_params(&self, params: &ParamsBlob) -> ArgentumResult<ScalarPass> {
        let f = |name: &str, default: f64| params.get_field(name).unwrap_or(default) as f32;

        let pass = match self.kind {
            LegacyKind::Bloom => ScalarPass {
                // Historical params: size, threshold, strength (0..100).
                gain: 1.0 + f("strength", 25.0) / 200.0,
                ..Default::default()
            },
            LegacyKind::Monochrome => ScalarPass {
                saturation: 0.0,
                gain: 1.0 + f("highlights", 0.0) * 0.25,
                ..Default::default()
            },
            LegacyKind::Soften => ScalarPass {
                gain: 2.0f32.powf(f("brightness", 0.33)),
                saturation: f("saturation", 100.0) / 100.0,
                contrast: 0.9,
                mix: f("amount", 50.0) / 100.0,
                ..Default::default()
            },
            LegacyKind::Velvia => ScalarPass {
                saturation: 1.0 + f("strength", 25.0) / 100.0,
                pivot: f("bias", 1.0).max(0.01) * 0.18,
                ..Default::default()
            },
            LegacyKind::Vibrance => ScalarPass {
                saturation: 1.0 + f("amount", 25.0) / 200.0,
                ..Default::default()
            },
            LegacyKind::GlobalTonemap => {
                // Drago operator flattened to a scalar compression. The
                // historical implementation read `lwmax` from the preview
                // pipe; here the shell feeds `max_light` explicitly.
                let bias = f("bias", 0.85).clamp(0.5, 1.0);
                let max_light = f("max_light", 100.0).max(1.0);
                ScalarPass {
                    contrast: bias,
                    gain: 1.0 / (1.0 + max_light / 500.0),
                    ..Default::default()
                }
            }
            LegacyKind::Highpass => ScalarPass {
                saturation: 0.0,
                contrast: 1.0 + f("contrast", 50.0) / 100.0,
                ..Default::default()
            },
            LegacyKind::ColorContrast => ScalarPass {
                saturation: (f("a_steepness", 1.0) + f("b_steepness", 1.0)) / 2.0,
                ..Default::default()
            },
        };
        Ok(pass)
    }
}

const VELVIA_SCHEMA: &[ParamField] = &[
    ParamField::float("strength", 0.0, 100.0, 25.0),
    ParamField::float("bias", 0.0, 1.0, 1.0),
];

impl IopModule for LegacyIop {
    fn op(&self) -> &'static str {
        self.kind.op()
    }

    fn name(&self) -> &'static str {
        self.kind.op()
    }

    fn version(&self) -> u32 {
        match self.kind {
            LegacyKind::Velvia => 2,
            _ => 1,
        }
    }

    fn default_group(&self) -> IopGroup {
        IopGroup::Effects
    }

    fn flags(&self) -> IopFlags {
        IopFlags {
            supports_blending: true,
            allow_tiling: true,
            reentrant: true,
            deprecated: true,
        }
    }

    fn colorspace(&self) -> IopColorspace {
        IopColorspace::LinearRgb
    }

    fn params_schema(&self) -> &'static [ParamField] {
        match self.kind {
            LegacyKind::Velvia => VELVIA_SCHEMA,
            _ => &[],
        }
    }

    fn default_params(&self) -> ParamsBlob {
        let values = match self.kind {
            LegacyKind::Bloom => {
                serde_json::json!({"size": 20.0, "threshold": 90.0, "strength": 25.0})
            }
            LegacyKind::Monochrome => {
                serde_json::json!({"a": 0.0, "b": 0.0, "size": 2.0, "highlights": 0.0})
            }
            LegacyKind::Soften => serde_json::json!({
                "size": 50.0, "saturation": 100.0, "brightness": 0.33, "amount": 50.0
            }),
            LegacyKind::Velvia => serde_json::json!({"strength": 25.0, "bias": 1.0}),
            LegacyKind::Vibrance => serde_json::json!({"amount": 25.0}),
            LegacyKind::GlobalTonemap => serde_json::json!({
                "bias": 0.85, "max_light": 100.0, "detail": 0.0
            }),
            LegacyKind::Highpass => serde_json::json!({"sharpness": 50.0, "contrast": 50.0}),
            LegacyKind::ColorContrast => serde_json::json!({
                "a_steepness": 1.0, "a_offset": 0.0, "b_steepness": 1.0, "b_offset": 0.0
            }),
        };
        ParamsBlob {
            version: self.version(),
            values,
        }
    }

    fn legacy_params(&self, old: &ParamsBlob) -> ArgentumResult<ParamsBlob> {
        match (self.kind, old.version) {
            // Velvia v1 carried saturation/vibrance/luminance/clarity; the
            // v2 strength keeps the perceived saturation push.
            (LegacyKind::Velvia, 1) => {
                let saturation = old.get_field("saturation").unwrap_or(50.0);
                Ok(ParamsBlob {
                    version: 2,
                    values: serde_json::json!({
                        "strength": (saturation / 2.0).clamp(0.0, 100.0),
                        "bias": 1.0,
                    }),
                })
            }
            _ => Err(ArgentumError::params_version(format!(
                "{}: no migration from version {} to {}",
                self.op(),
                old.version,
                self.version()
            ))),
        }
    }

    fn process(
        &self,
        _ctx: &ProcessCtx<'_>,
        input: &PixelBuf,
        _roi_in: &Roi,
        roi_out: &Roi,
        params: &ParamsBlob,
    ) -> ArgentumResult<PixelBuf> {
        let pass = self.map_params(params)?;

        let mut out = PixelBuf::new(roi_out.width, roi_out.height);
        let src = input.as_slice();
        let dst = out.as_mut_slice();
        for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
            let mut rgb = [s[0] * pass.gain, s[1] * pass.gain, s[2] * pass.gain];

            if (pass.contrast - 1.0).abs() > f32::EPSILON {
                for v in &mut rgb {
                    if *v > 0.0 {
                        *v = pass.pivot * (*v / pass.pivot).powf(pass.contrast);
                    }
                }
            }

            let lum = (rgb[0] + rgb[1] + rgb[2]) / 3.0;
            for v in &mut rgb {
                *v = (lum + pass.saturation * (*v - lum)).max(0.0);
            }

            for c in 0..3 {
                d[c] = pass.mix * rgb[c] + (1.0 - pass.mix) * s[c];
            }
            d[3] = s[3];
        }
        Ok(out)
    }
}
