use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::color::RgbProfile;
use crate::foundation::error::{ArgentumError, ArgentumResult};

/// Region of interest in reference full-image pixel coordinates.
///
/// `scale` is the effective downsampling applied to the region, in `(0, 1]`.
/// Two ROIs compare equal iff all five fields match; `scale` is compared
/// bitwise so the type can key cache maps.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct Roi {
    /// Left edge, reference coordinates.
    pub x: i32,
    /// Top edge, reference coordinates.
    pub y: i32,
    /// Width in pixels at `scale`.
    pub width: u32,
    /// Height in pixels at `scale`.
    pub height: u32,
    /// Effective downsampling factor, `(0, 1]`.
    pub scale: f32,
}

impl PartialEq for Roi {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.scale.to_bits() == other.scale.to_bits()
    }
}

impl Eq for Roi {}

impl std::hash::Hash for Roi {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.x.hash(state);
        self.y.hash(state);
        self.width.hash(state);
        self.height.hash(state);
        self.scale.to_bits().hash(state);
    }
}

impl Roi {
    /// Create a validated ROI.
    pub fn new(x: i32, y: i32, width: u32, height: u32, scale: f32) -> ArgentumResult<Self> {
        if width == 0 || height == 0 {
            return Err(ArgentumError::validation("Roi dimensions must be > 0"));
        }
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(ArgentumError::validation("Roi scale must be in (0, 1]"));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
            scale,
        })
    }

    /// Full-image ROI at scale 1.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
            scale: 1.0,
        }
    }

    /// Number of pixels covered.
    pub fn npixels(self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Size in bytes of an RGBA f32 buffer shaped like this ROI.
    pub fn byte_len(self) -> usize {
        self.npixels().saturating_mul(4 * std::mem::size_of::<f32>())
    }

    /// Clip this ROI against `outer`, keeping `scale` from `self`.
    ///
    /// Returns `None` when the two rectangles do not intersect.
    pub fn intersect(self, outer: Roi) -> Option<Roi> {
        let x0 = self.x.max(outer.x);
        let y0 = self.y.max(outer.y);
        let x1 = (self.x + self.width as i32).min(outer.x + outer.width as i32);
        let y1 = (self.y + self.height as i32).min(outer.y + outer.height as i32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Roi {
            x: x0,
            y: y0,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
            scale: self.scale,
        })
    }
}

/// 4-channel f32 pixel buffer, row-major, tightly packed.
///
/// Channel order is RGBA; the alpha slot doubles as a mask or norm carrier
/// in some passes.
#[derive(Clone, Debug)]
pub struct PixelBuf {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl PixelBuf {
    /// Zero-filled buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width as usize) * (height as usize) * 4],
        }
    }

    /// Wrap an existing RGBA f32 vector; length must be `4 * width * height`.
    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> ArgentumResult<Self> {
        if data.len() != (width as usize) * (height as usize) * 4 {
            return Err(ArgentumError::validation(
                "PixelBuf data length must be 4 * width * height",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Buffer width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Flat RGBA f32 view.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable flat RGBA f32 view.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Read one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let i = ((y as usize) * (self.width as usize) + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Write one pixel.
    pub fn set_pixel(&mut self, x: u32, y: u32, px: [f32; 4]) {
        let i = ((y as usize) * (self.width as usize) + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&px);
    }

    /// Fill every pixel with the same RGBA value.
    pub fn fill(&mut self, px: [f32; 4]) {
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Take ownership of the flat vector.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Per-channel Poisson-Gauss noise model `(a, b)` from a sensor profile.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NoiseParams {
    /// Poissonian gain term.
    pub a: f32,
    /// Gaussian floor term.
    pub b: f32,
}

/// Input boundary: one decoded raw frame plus its sensor metadata.
#[derive(Clone, Debug)]
pub struct RawImage {
    /// Linear sensor RGB pixels, RGBA f32.
    pub pixels: PixelBuf,
    /// White-balance coefficients applied by the demosaic stage.
    pub wb_coeffs: [f32; 3],
    /// Sensor black level, subtracted before white balance.
    pub black_level: f32,
    /// Per-channel Poisson-Gauss noise model.
    pub noise_profile: [NoiseParams; 3],
    /// Camera input profile (sensor RGB → XYZ).
    pub input_profile: RgbProfile,
    /// Display/export output profile.
    pub output_profile: RgbProfile,
    /// Stable identifier of the source frame; seeds the pipeline hash chain.
    pub source_id: u64,
}

impl RawImage {
    /// Neutral synthetic frame, mainly for tests and tooling.
    pub fn synthetic(width: u32, height: u32, source_id: u64) -> Self {
        Self {
            pixels: PixelBuf::new(width, height),
            wb_coeffs: [1.0, 1.0, 1.0],
            black_level: 0.0,
            noise_profile: [NoiseParams { a: 1.0e-6, b: 1.0e-7 }; 3],
            input_profile: RgbProfile::linear_rec2020(),
            output_profile: RgbProfile::linear_srgb(),
            source_id,
        }
    }
}

/// Which pipeline this is; part of every cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PipeKind {
    /// Darkroom center view at widget resolution.
    Full,
    /// Downscaled preview pipe feeding scopes.
    Preview,
    /// Full-resolution export pipe.
    Export,
}

impl PipeKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Full => 0,
            Self::Preview => 1,
            Self::Export => 2,
        }
    }
}

/// Named pipeline stages whose output is snapshotted for scopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TapStage {
    /// After demosaic: sensor RGB, linear.
    Demosaic,
    /// After the output color profile: display RGB, linear.
    Colorout,
    /// After the display transfer curve: display RGB, non-linear.
    Gamma,
}

impl TapStage {
    /// The op id of the IOP producing this tap.
    pub fn op(self) -> &'static str {
        match self {
            Self::Demosaic => "demosaic",
            Self::Colorout => "colorout",
            Self::Gamma => "gamma",
        }
    }

    /// Map an op id to its tap stage, if it has one.
    pub fn from_op(op: &str) -> Option<Self> {
        match op {
            "demosaic" => Some(Self::Demosaic),
            "colorout" => Some(Self::Colorout),
            "gamma" => Some(Self::Gamma),
            _ => None,
        }
    }
}

/// Options consumed by the core; everything else belongs to the UI shell.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PipelineOpts {
    /// Arena reservation for the pipeline cache, in bytes.
    pub arena_total_bytes: usize,
    /// Soft memory cap used by the tiling planner, in bytes.
    pub cache_memory_budget: usize,
    /// Worker thread count; `None` means logical CPU count.
    pub workers: Option<usize>,
    /// If true, scopes bin only pixels inside active picker regions.
    pub scope_restrict_to_pickers: bool,
    /// Half-extent of the vectorscope u/v axes; clamped to `[32, 512]`.
    pub vectorscope_zoom: f32,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            arena_total_bytes: 256 * 1024 * 1024,
            cache_memory_budget: 64 * 1024 * 1024,
            workers: None,
            scope_restrict_to_pickers: false,
            vectorscope_zoom: 120.0,
        }
    }
}

impl PipelineOpts {
    /// Vectorscope half-extent with the documented clamp applied.
    pub fn vectorscope_zoom_clamped(&self) -> f32 {
        self.vectorscope_zoom.clamp(32.0, 512.0)
    }
}

/// Cooperative cancellation token observed between pieces and tiles.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that never fires unless [`CancelToken::cancel`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the pending request.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
