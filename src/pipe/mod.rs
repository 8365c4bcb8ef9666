//! The pipeline: hash chain, ROI propagation, tiling, tap slots, and the
//! executor that drives partial recomputation through the cache.

pub mod context;
pub mod executor;
pub mod hash;
pub mod tap;
pub mod tiling;

pub use context::PipelineContext;
pub use executor::{Piece, PipeOutput, Pipeline, RecomputeRequest};
pub use hash::{Hash128, PieceHasher};
pub use tap::{Backbuf, TapSet, TapSnapshot};
pub use tiling::{Tile, TilingFootprint, plan_tiles};
