use std::sync::Arc;

use rayon::prelude::*;

use crate::arena::{CacheKey, CacheLine};
use crate::foundation::core::{CancelToken, PipeKind, PixelBuf, RawImage, Roi, TapStage};
use crate::foundation::error::{ArgentumError, ArgentumResult};
use crate::iop::blend::Mask;
use crate::iop::params::ParamsBlob;
use crate::iop::{IopModule, IopRegistry, ProcessCtx};
use crate::pipe::context::PipelineContext;
use crate::pipe::hash::{Hash128, PieceHasher};
use crate::pipe::tiling::plan_tiles;

/// One IOP instance wired into a pipeline.
pub struct Piece {
    module: Arc<dyn IopModule>,
    enabled: bool,
    params: ParamsBlob,
    mask: Option<Mask>,
    position: u32,
    trouble: bool,
    migration_failed: bool,
}

impl Piece {
    /// The module this piece instantiates.
    pub fn module(&self) -> &Arc<dyn IopModule> {
        &self.module
    }

    /// Disabled pieces keep their upstream hash and are never processed.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Current params blob.
    pub fn params(&self) -> &ParamsBlob {
        &self.params
    }

    /// Set by the executor when `process` failed and identity was
    /// substituted; cleared on the next successful build.
    pub fn trouble(&self) -> bool {
        self.trouble
    }

    /// True when the stored params could not be migrated to the module's
    /// current version; the piece stays disabled with a UI-visible warning.
    pub fn migration_failed(&self) -> bool {
        self.migration_failed
    }
}

/// A recompute request: target region plus its cancellation token.
#[derive(Clone, Debug)]
pub struct RecomputeRequest {
    /// Requested output region.
    pub roi: Roi,
    /// Checked between pieces and between tiles.
    pub cancel: CancelToken,
}

impl RecomputeRequest {
    pub fn new(roi: Roi) -> Self {
        Self {
            roi,
            cancel: CancelToken::new(),
        }
    }
}

/// A finished request: the final buffer, its region, and its chain hash.
#[derive(Clone, Debug)]
pub struct PipeOutput {
    /// Final cache line, pinned while held.
    pub line: Arc<CacheLine>,
    /// Region the buffer covers.
    pub roi: Roi,
    /// Chain hash identifying the output.
    pub hash: Hash128,
}

/// The ordered IOP chain over one raw frame.
pub struct Pipeline {
    kind: PipeKind,
    input: Arc<RawImage>,
    pieces: Vec<Piece>,
}

impl Pipeline {
    /// Empty pipeline over a frame.
    pub fn new(kind: PipeKind, input: Arc<RawImage>) -> Self {
        Self {
            kind,
            input,
            pieces: Vec::new(),
        }
    }

    /// The standard darkroom chain:
    /// demosaic → exposure → denoise → colorout → gamma.
    pub fn default_chain(
        registry: &IopRegistry,
        kind: PipeKind,
        input: Arc<RawImage>,
    ) -> ArgentumResult<Self> {
        let mut pipe = Self::new(kind, input);
        for op in ["demosaic", "exposure", "denoise", "colorout", "gamma"] {
            let module = registry
                .get(op)
                .ok_or_else(|| ArgentumError::config(format!("missing builtin module {op}")))?;
            pipe.push_module(module, None);
        }
        Ok(pipe)
    }

    /// The pipe kind (part of every cache key).
    pub fn kind(&self) -> PipeKind {
        self.kind
    }

    /// The source frame.
    pub fn input(&self) -> &Arc<RawImage> {
        &self.input
    }

    /// The chain in order.
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Append a module instance.
    ///
    /// A params blob from an older schema version goes through
    /// `legacy_params`; when migration is unavailable the piece is added
    /// disabled and flagged, and the pipeline stays usable.
    pub fn push_module(&mut self, module: Arc<dyn IopModule>, params: Option<ParamsBlob>) -> &mut Piece {
        let position = self.pieces.len() as u32;
        let mut enabled = true;
        let mut migration_failed = false;

        let params = match params {
            None => module.default_params(),
            Some(blob) if blob.version == module.version() => blob,
            Some(blob) => match module.legacy_params(&blob) {
                Ok(migrated) => migrated,
                Err(e) => {
                    tracing::warn!(op = module.op(), error = %e, "params migration failed, piece disabled");
                    enabled = false;
                    migration_failed = true;
                    module.default_params()
                }
            },
        };

        self.pieces.push(Piece {
            module,
            enabled,
            params,
            mask: None,
            position,
            trouble: false,
            migration_failed,
        });
        self.pieces.last_mut().expect("just pushed")
    }

    fn piece_index(&self, op: &str) -> ArgentumResult<usize> {
        self.pieces
            .iter()
            .position(|p| p.module.op() == op)
            .ok_or_else(|| ArgentumError::validation(format!("no piece for op `{op}`")))
    }

    /// Replace a piece's params (same version required; migration happens
    /// at insertion time).
    pub fn set_params(&mut self, op: &str, params: ParamsBlob) -> ArgentumResult<()> {
        let i = self.piece_index(op)?;
        let piece = &mut self.pieces[i];
        if params.version != piece.module.version() {
            return Err(ArgentumError::params_version(format!(
                "{op}: expected version {}, got {}",
                piece.module.version(),
                params.version
            )));
        }
        piece.params = params;
        Ok(())
    }

    /// Enable or disable a piece.
    pub fn set_enabled(&mut self, op: &str, enabled: bool) -> ArgentumResult<()> {
        let i = self.piece_index(op)?;
        self.pieces[i].enabled = enabled;
        Ok(())
    }

    /// Attach (or clear) a blend mask shaped like the piece's `roi_out`.
    pub fn set_mask(&mut self, op: &str, mask: Option<Mask>) -> ArgentumResult<()> {
        let i = self.piece_index(op)?;
        self.pieces[i].mask = mask;
        Ok(())
    }

    /// The resolved chain hash after every piece, in pipeline order.
    ///
    /// Disabled pieces repeat their upstream hash; the values are the cache
    /// keys a recompute of the same ROI would use.
    pub fn chain_hashes(&self) -> Vec<Hash128> {
        self.resolve_hashes()
    }

    /// Ops whose last build fell back to identity.
    pub fn troubled(&self) -> Vec<&'static str> {
        self.pieces
            .iter()
            .filter(|p| p.trouble)
            .map(|p| p.module.op())
            .collect()
    }

    /// Root of the hash chain: the source frame and the pipe kind.
    fn source_hash(&self) -> Hash128 {
        let raw = &self.input;
        let mut h = PieceHasher::new();
        h.write_u64(raw.source_id);
        h.write_u32(raw.pixels.width());
        h.write_u32(raw.pixels.height());
        for c in 0..3 {
            h.write_f32(raw.wb_coeffs[c]);
            h.write_f32(raw.noise_profile[c].a);
            h.write_f32(raw.noise_profile[c].b);
        }
        h.write_f32(raw.black_level);
        h.write_str(raw.input_profile.name);
        h.write_str(raw.output_profile.name);
        h.write_u8(self.kind.tag());
        h.finish()
    }

    /// Rolling hash per piece: H(upstream, op, position, params, mask,
    /// enabled). A disabled piece reuses its upstream hash unchanged.
    fn resolve_hashes(&self) -> Vec<Hash128> {
        let mut prev = self.source_hash();
        self.pieces
            .iter()
            .map(|piece| {
                if !piece.enabled {
                    return prev;
                }
                let mut h = PieceHasher::new();
                h.write_hash(prev);
                h.write_str(piece.module.op());
                h.write_u32(piece.position);
                h.write_u32(piece.params.version);
                h.write_json(&piece.params.values);
                match &piece.mask {
                    Some(m) => {
                        h.write_u8(1);
                        h.write_hash(m.fingerprint());
                    }
                    None => h.write_u8(0),
                }
                h.write_bool(piece.enabled);
                prev = h.finish();
                prev
            })
            .collect()
    }

    /// Inverse ROI propagation from the target back to the source:
    /// `roi_in[i]` is what piece i must read to produce `roi_out[i]`.
    fn resolve_rois(&self, target: Roi) -> Vec<(Roi, Roi)> {
        let mut rois = vec![(target, target); self.pieces.len()];
        let mut current = target;
        for (i, piece) in self.pieces.iter().enumerate().rev() {
            let roi_out = current;
            let roi_in = if piece.enabled {
                piece.module.modify_roi_in(&roi_out)
            } else {
                roi_out
            };
            rois[i] = (roi_in, roi_out);
            current = roi_in;
        }
        rois
    }

    /// Extract (and box-downsample when `scale < 1`) the source region.
    fn source_buffer(&self, roi: &Roi) -> ArgentumResult<PixelBuf> {
        let src = &self.input.pixels;
        let step = (1.0 / roi.scale).round().max(1.0) as i64;

        let mut out = PixelBuf::new(roi.width, roi.height);
        for j in 0..roi.height as i64 {
            for i in 0..roi.width as i64 {
                let mut acc = [0.0f32; 4];
                let mut n = 0.0f32;
                for dy in 0..step {
                    for dx in 0..step {
                        let sx = i64::from(roi.x) + i * step + dx;
                        let sy = i64::from(roi.y) + j * step + dy;
                        if sx < 0
                            || sy < 0
                            || sx >= i64::from(src.width())
                            || sy >= i64::from(src.height())
                        {
                            continue;
                        }
                        let px = src.pixel(sx as u32, sy as u32);
                        for c in 0..4 {
                            acc[c] += px[c];
                        }
                        n += 1.0;
                    }
                }
                if n > 0.0 {
                    for c in &mut acc {
                        *c /= n;
                    }
                }
                out.set_pixel(i as u32, j as u32, acc);
            }
        }
        Ok(out)
    }

    /// Run one recompute request.
    ///
    /// Hashes resolve source→target, ROIs target→source, then the forward
    /// walk builds every missing key, publishes tap snapshots, and sweeps
    /// stale keys. A piece whose `process` fails degrades to identity and
    /// raises its trouble flag; the pipeline still completes.
    pub fn process(
        &mut self,
        ctx: &PipelineContext,
        request: &RecomputeRequest,
    ) -> ArgentumResult<PipeOutput> {
        let hashes = self.resolve_hashes();
        let rois = self.resolve_rois(request.roi);
        let source_hash = self.source_hash();

        let mut prev_line: Option<Arc<CacheLine>> = None;
        let mut prev_hash = source_hash;
        let mut prev_roi = rois.first().map_or(request.roi, |(roi_in, _)| *roi_in);

        for i in 0..self.pieces.len() {
            if request.cancel.is_cancelled() {
                return Err(ArgentumError::Cancelled);
            }
            if !self.pieces[i].enabled {
                continue;
            }
            let (roi_in, roi_out) = rois[i];

            // Input: the previous piece's output, or the raw source.
            let input_line = match prev_line.take() {
                Some(line) => line,
                None => {
                    let key = CacheKey {
                        hash: source_hash,
                        roi: roi_in,
                        pipe: self.kind,
                    };
                    ctx.cache()
                        .get_or_build(key, || self.source_buffer(&roi_in))?
                }
            };

            let key = CacheKey {
                hash: hashes[i],
                roi: roi_out,
                pipe: self.kind,
            };

            let built = ctx.cache().get_or_build(key, || {
                self.build_piece(ctx, i, &input_line, roi_in, roi_out, &request.cancel)
            });

            let out_line = match built {
                Ok(line) => {
                    self.pieces[i].trouble = false;
                    line
                }
                Err(e) if e.is_cancelled() => return Err(ArgentumError::Cancelled),
                Err(e) => {
                    // Identity fallback: copy the input through and flag the
                    // piece; downstream modules keep running.
                    tracing::warn!(op = self.pieces[i].module.op(), error = %e, "piece failed, substituting identity");
                    self.pieces[i].trouble = true;
                    ctx.cache().get_or_build(key, || {
                        identity_crop(input_line.pixels(), &roi_in, &roi_out)
                    })?
                }
            };

            if let Some(stage) = TapStage::from_op(self.pieces[i].module.op()) {
                ctx.taps().get(stage).publish(Arc::clone(&out_line), hashes[i]);
            }

            prev_line = Some(out_line);
            prev_hash = hashes[i];
            prev_roi = roi_out;
        }

        let line = match prev_line {
            Some(line) => line,
            None => {
                // Nothing enabled: the output is the raw source region.
                let key = CacheKey {
                    hash: source_hash,
                    roi: request.roi,
                    pipe: self.kind,
                };
                ctx.cache()
                    .get_or_build(key, || self.source_buffer(&request.roi))?
            }
        };

        // Keys whose hash fell out of the chain are unreachable now.
        let mut live = hashes;
        live.push(source_hash);
        ctx.cache().sweep(self.kind, &live);

        Ok(PipeOutput {
            line,
            roi: prev_roi,
            hash: prev_hash,
        })
    }

    /// Build one piece's output: whole-ROI or tiled, then mask blending.
    fn build_piece(
        &self,
        ctx: &PipelineContext,
        index: usize,
        input_line: &Arc<CacheLine>,
        roi_in: Roi,
        roi_out: Roi,
        cancel: &CancelToken,
    ) -> ArgentumResult<PixelBuf> {
        let piece = &self.pieces[index];
        let module = &piece.module;
        let process_ctx = ProcessCtx {
            pool: ctx.pool(),
            raw: &self.input,
            cancel,
        };

        let footprint = module.footprint(&roi_in, &roi_out, &piece.params);
        let budget = ctx.opts().cache_memory_budget;
        let tiled = module.flags().allow_tiling && footprint.needs_tiling(roi_out, budget);

        let mut out = if !tiled {
            module.process(&process_ctx, input_line.pixels(), &roi_in, &roi_out, &piece.params)?
        } else {
            let tiles = plan_tiles(roi_out, roi_in, &footprint, budget);
            tracing::debug!(op = module.op(), tiles = tiles.len(), "tiled build");
            let mut out = PixelBuf::new(roi_out.width, roi_out.height);

            if module.flags().reentrant {
                let results: Vec<ArgentumResult<(crate::pipe::tiling::Tile, PixelBuf)>> = ctx
                    .pool()
                    .install(|| {
                        tiles
                            .par_iter()
                            .map(|tile| {
                                if cancel.is_cancelled() {
                                    return Err(ArgentumError::Cancelled);
                                }
                                let tile_input =
                                    identity_crop(input_line.pixels(), &roi_in, &tile.input)?;
                                let tile_ctx = ProcessCtx {
                                    pool: ctx.pool(),
                                    raw: &self.input,
                                    cancel,
                                };
                                let tile_out = module.process(
                                    &tile_ctx,
                                    &tile_input,
                                    &tile.input,
                                    &tile.out,
                                    &piece.params,
                                )?;
                                Ok((*tile, tile_out))
                            })
                            .collect()
                    });
                for result in results {
                    let (tile, tile_out) = result?;
                    paste_tile(&mut out, &roi_out, &tile.out, &tile_out);
                }
            } else {
                for tile in &tiles {
                    if cancel.is_cancelled() {
                        return Err(ArgentumError::Cancelled);
                    }
                    let tile_input = identity_crop(input_line.pixels(), &roi_in, &tile.input)?;
                    let tile_out = module.process(
                        &process_ctx,
                        &tile_input,
                        &tile.input,
                        &tile.out,
                        &piece.params,
                    )?;
                    paste_tile(&mut out, &roi_out, &tile.out, &tile_out);
                }
            }
            out
        };

        // Blending needs identical geometry on both sides.
        if let Some(mask) = &piece.mask
            && module.flags().supports_blending
            && roi_in == roi_out
        {
            mask.blend(input_line.pixels(), &mut out)?;
        }

        Ok(out)
    }
}

/// Copy the `inner` region out of a buffer shaped like `outer`.
fn identity_crop(input: &PixelBuf, outer: &Roi, inner: &Roi) -> ArgentumResult<PixelBuf> {
    if outer == inner {
        return Ok(input.clone());
    }
    let dx = inner.x - outer.x;
    let dy = inner.y - outer.y;
    if dx < 0
        || dy < 0
        || inner.x + inner.width as i32 > outer.x + outer.width as i32
        || inner.y + inner.height as i32 > outer.y + outer.height as i32
    {
        return Err(ArgentumError::validation(
            "crop region must sit inside the source buffer",
        ));
    }

    let in_w = outer.width as usize;
    let out_w = inner.width as usize;
    let src = input.as_slice();
    let mut out = PixelBuf::new(inner.width, inner.height);
    let dst = out.as_mut_slice();
    for y in 0..inner.height as usize {
        let src_base = 4 * ((dy as usize + y) * in_w + dx as usize);
        let dst_base = 4 * (y * out_w);
        dst[dst_base..dst_base + 4 * out_w].copy_from_slice(&src[src_base..src_base + 4 * out_w]);
    }
    Ok(out)
}

/// Write a tile's pixels into the assembled output buffer.
fn paste_tile(out: &mut PixelBuf, roi_out: &Roi, tile_roi: &Roi, tile: &PixelBuf) {
    let dx = (tile_roi.x - roi_out.x) as usize;
    let dy = (tile_roi.y - roi_out.y) as usize;
    let out_w = roi_out.width as usize;
    let tile_w = tile_roi.width as usize;

    let dst = out.as_mut_slice();
    let src = tile.as_slice();
    for y in 0..tile_roi.height as usize {
        let dst_base = 4 * ((dy + y) * out_w + dx);
        let src_base = 4 * (y * tile_w);
        dst[dst_base..dst_base + 4 * tile_w].copy_from_slice(&src[src_base..src_base + 4 * tile_w]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_crop_rejects_out_of_bounds() {
        let buf = PixelBuf::new(4, 4);
        let outer = Roi::full(4, 4);
        let inner = Roi::new(2, 2, 4, 4, 1.0).unwrap();
        assert!(identity_crop(&buf, &outer, &inner).is_err());
    }

    #[test]
    fn paste_tile_places_at_offset() {
        let mut out = PixelBuf::new(4, 4);
        let roi_out = Roi::full(4, 4);
        let tile_roi = Roi::new(2, 1, 2, 2, 1.0).unwrap();
        let mut tile = PixelBuf::new(2, 2);
        tile.fill([1.0, 2.0, 3.0, 4.0]);
        paste_tile(&mut out, &roi_out, &tile_roi, &tile);
        assert_eq!(out.pixel(2, 1), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out.pixel(3, 2), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out.pixel(0, 0), [0.0; 4]);
    }
}
