use crate::arena::PixelCache;
use crate::foundation::core::PipelineOpts;
use crate::foundation::error::{ArgentumError, ArgentumResult};
use crate::pipe::tap::TapSet;

/// Everything a pipeline run needs, passed explicitly.
///
/// There is no process-wide state in the core: the cache (and its arena),
/// the tap slots, and the worker pool all live here, and every entry point
/// takes a `&PipelineContext`.
#[derive(Debug)]
pub struct PipelineContext {
    opts: PipelineOpts,
    cache: PixelCache,
    taps: TapSet,
    pool: rayon::ThreadPool,
}

impl PipelineContext {
    /// Build a context from options; fails on a bad arena size or an
    /// unusable worker configuration.
    pub fn new(opts: PipelineOpts) -> ArgentumResult<Self> {
        let cache = PixelCache::new(opts.arena_total_bytes)?;
        let pool = build_thread_pool(opts.workers)?;
        Ok(Self {
            opts,
            cache,
            taps: TapSet::new(),
            pool,
        })
    }

    /// The configured options.
    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    /// The pixel cache shared by every pipe in this context.
    pub fn cache(&self) -> &PixelCache {
        &self.cache
    }

    /// The backbuffer tap slots.
    pub fn taps(&self) -> &TapSet {
        &self.taps
    }

    /// The worker pool IOPs parallelize on.
    pub fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }
}

fn build_thread_pool(threads: Option<usize>) -> ArgentumResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ArgentumError::config("workers must be >= 1 when set"));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ArgentumError::config(format!("failed to build worker pool: {e}")))
}
