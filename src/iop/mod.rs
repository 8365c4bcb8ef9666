//! Image operations: the capability trait every pipeline node implements,
//! the plug-in registry, and the built-in modules.

pub mod blend;
pub mod colorout;
pub mod demosaic;
pub mod denoise;
pub mod exposure;
pub mod gamma;
pub mod legacy;
pub mod params;

use std::collections::HashMap;
use std::sync::Arc;

use crate::foundation::core::{CancelToken, PixelBuf, RawImage, Roi};
use crate::foundation::error::{ArgentumError, ArgentumResult};
use crate::iop::params::{ParamField, ParamsBlob};
use crate::pipe::tiling::TilingFootprint;

/// UI grouping a module defaults to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IopGroup {
    Basic,
    Tones,
    Color,
    Correct,
    Effects,
}

/// The color space a module declares for its pixels (and mask blending).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IopColorspace {
    /// Linear sensor RGB before the output profile.
    SensorRgb,
    /// Scene-linear working RGB.
    LinearRgb,
    /// Display-referred RGB after the transfer curve.
    DisplayRgb,
}

/// Capability flags a module declares to the executor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IopFlags {
    /// Mask blending is meaningful for this module.
    pub supports_blending: bool,
    /// The module tolerates tiled invocation.
    pub allow_tiling: bool,
    /// Tiles of one invocation may run concurrently.
    pub reentrant: bool,
    /// Kept only for backward-compatible edits.
    pub deprecated: bool,
}

/// Per-call context handed to [`IopModule::process`].
pub struct ProcessCtx<'a> {
    /// Worker pool for per-row / per-tile parallelism.
    pub pool: &'a rayon::ThreadPool,
    /// Source frame metadata (WB, black level, noise profile, profiles).
    pub raw: &'a RawImage,
    /// Cooperative cancellation; checked between coarse steps only.
    pub cancel: &'a CancelToken,
}

/// One image operation: a pure pixel transformation plus its declarations.
///
/// `process` must produce exactly `roi_out` pixels and read nothing outside
/// `roi_in`. Numeric degeneracy is handled per-pixel inside the module;
/// a returned error makes the executor fall back to identity and flag the
/// piece as troubled.
pub trait IopModule: Send + Sync {
    /// Stable operation id; part of the hash chain.
    fn op(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Current params schema version.
    fn version(&self) -> u32 {
        1
    }

    /// UI group.
    fn default_group(&self) -> IopGroup;

    /// Declared capabilities.
    fn flags(&self) -> IopFlags {
        IopFlags::default()
    }

    /// Declared color space of the module's pixels.
    fn colorspace(&self) -> IopColorspace;

    /// Introspection schema for field-by-field editing.
    fn params_schema(&self) -> &'static [ParamField] {
        &[]
    }

    /// Factory-default params at the current version.
    fn default_params(&self) -> ParamsBlob;

    /// Migrate an older blob to the current version.
    ///
    /// The default refuses; a piece whose blob cannot be migrated is
    /// disabled with a UI-visible warning.
    fn legacy_params(&self, old: &ParamsBlob) -> ArgentumResult<ParamsBlob> {
        Err(ArgentumError::params_version(format!(
            "{}: no migration from version {} to {}",
            self.op(),
            old.version,
            self.version()
        )))
    }

    /// Declared tiling footprint for this ROI pair.
    fn footprint(&self, _roi_in: &Roi, _roi_out: &Roi, _params: &ParamsBlob) -> TilingFootprint {
        TilingFootprint::default()
    }

    /// Inverse ROI propagation; identity unless the module needs margins
    /// or changes geometry.
    fn modify_roi_in(&self, roi_out: &Roi) -> Roi {
        *roi_out
    }

    /// The pixel transformation itself.
    fn process(
        &self,
        ctx: &ProcessCtx<'_>,
        input: &PixelBuf,
        roi_in: &Roi,
        roi_out: &Roi,
        params: &ParamsBlob,
    ) -> ArgentumResult<PixelBuf>;
}

/// Plug-in style registry mapping op ids to module vtables.
#[derive(Clone)]
pub struct IopRegistry {
    map: HashMap<&'static str, Arc<dyn IopModule>>,
}

impl IopRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Registry with every built-in module.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(demosaic::Demosaic));
        reg.register(Arc::new(exposure::Exposure));
        reg.register(Arc::new(denoise::Denoise));
        reg.register(Arc::new(colorout::Colorout));
        reg.register(Arc::new(gamma::Gamma));
        for kind in legacy::LegacyKind::ALL {
            reg.register(Arc::new(legacy::LegacyIop::new(*kind)));
        }
        reg
    }

    /// Add or replace a module.
    pub fn register(&mut self, module: Arc<dyn IopModule>) {
        self.map.insert(module.op(), module);
    }

    /// Look up a module by op id.
    pub fn get(&self, op: &str) -> Option<Arc<dyn IopModule>> {
        self.map.get(op).map(Arc::clone)
    }

    /// All registered op ids, sorted.
    pub fn ops(&self) -> Vec<&'static str> {
        let mut ops: Vec<_> = self.map.keys().copied().collect();
        ops.sort_unstable();
        ops
    }
}

impl Default for IopRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_the_core_chain() {
        let reg = IopRegistry::builtin();
        for op in ["demosaic", "exposure", "denoise", "colorout", "gamma"] {
            assert!(reg.get(op).is_some(), "missing {op}");
        }
        // The deprecated set is still processable.
        for op in [
            "bloom",
            "monochrome",
            "soften",
            "velvia",
            "vibrance",
            "globaltonemap",
            "highpass",
            "colorcontrast",
        ] {
            let module = reg.get(op).unwrap();
            assert!(module.flags().deprecated, "{op} must be deprecated");
        }
    }

    #[test]
    fn default_params_validate_against_their_own_version() {
        let reg = IopRegistry::builtin();
        for op in reg.ops() {
            let module = reg.get(op).unwrap();
            assert_eq!(module.default_params().version, module.version(), "{op}");
        }
    }
}
