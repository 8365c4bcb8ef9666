//! Argentum is the pixel-pipeline core of a raw photo editor.
//!
//! A frame enters as linear sensor RGB and exits display- or export-ready
//! after traversing an ordered chain of image operations (IOPs), each
//! fingerprinted by a rolling 128-bit hash so that only the stages whose
//! inputs changed are recomputed. The public API is context-oriented:
//!
//! - Build a [`PipelineContext`] (arena cache, tap slots, worker pool)
//! - Assemble a [`Pipeline`] over a [`RawImage`] from the [`IopRegistry`]
//! - Drive recomputes with [`Pipeline::process`] and read scopes from the
//!   published backbuffer taps
#![forbid(unsafe_code)]

pub mod arena;
pub mod color;
pub mod export;
mod foundation;
pub mod iop;
pub mod pipe;
pub mod scope;

pub use crate::foundation::core::{
    CancelToken, NoiseParams, PipeKind, PipelineOpts, PixelBuf, RawImage, Roi, TapStage,
};
pub use crate::foundation::error::{ArgentumError, ArgentumResult};

pub use crate::arena::{ArenaStats, CacheStats, PageArena, PixelCache};
pub use crate::color::RgbProfile;
pub use crate::iop::{IopModule, IopRegistry};
pub use crate::pipe::{
    Hash128, PipeOutput, Pipeline, PipelineContext, RecomputeRequest, TapSnapshot,
};
pub use crate::scope::PickArea;
