use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::arena::pages::{PageArena, PageSpan};
use crate::foundation::core::{PipeKind, PixelBuf, Roi};
use crate::foundation::error::{ArgentumError, ArgentumResult};
use crate::pipe::hash::Hash128;

/// Cache key: module chain hash ⊕ region of interest ⊕ pipe kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Chain hash of the producing piece.
    pub hash: Hash128,
    /// Output region the buffer covers.
    pub roi: Roi,
    /// Owning pipeline kind.
    pub pipe: PipeKind,
}

/// One cached pixel buffer backed by an arena span.
///
/// Lines are shared as `Arc`; a strong count above one means a consumer
/// (executor input, tap slot, scope) is pinning the line, which blocks
/// eviction. The span returns to the arena when the last reference drops.
#[derive(Debug)]
pub struct CacheLine {
    arena: Arc<PageArena>,
    span: PageSpan,
    pixels: PixelBuf,
    roi: Roi,
}

impl CacheLine {
    /// The cached pixels; immutable once built.
    pub fn pixels(&self) -> &PixelBuf {
        &self.pixels
    }

    /// The region this buffer covers.
    pub fn roi(&self) -> Roi {
        self.roi
    }

    /// Page-rounded resident size in bytes.
    pub fn byte_len(&self) -> usize {
        self.span.bytes
    }
}

impl Drop for CacheLine {
    fn drop(&mut self) {
        self.arena.free(self.span);
    }
}

#[derive(Debug)]
enum SlotState {
    /// A builder thread owns this key; waiters sleep on the condvar.
    Building,
    Ready(Arc<CacheLine>),
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    age: u64,
    hits: u32,
}

/// Aggregated cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total lookups.
    pub queries: u64,
    /// Lookups satisfied from a ready entry.
    pub hits: u64,
    /// Live entries (ready or building).
    pub entries: usize,
    /// Page-rounded bytes held by ready entries.
    pub resident_bytes: usize,
}

/// Keyed build-once LRU cache over the page arena.
///
/// `get_or_build` guarantees at most one concurrent build per key; other
/// callers block until the build settles and then share the same line.
#[derive(Debug)]
pub struct PixelCache {
    arena: Arc<PageArena>,
    inner: Mutex<HashMap<CacheKey, Slot>>,
    settled: Condvar,
    tick: AtomicU64,
    queries: AtomicU64,
    hits: AtomicU64,
}

impl PixelCache {
    /// Create a cache over its own arena reservation.
    pub fn new(arena_total_bytes: usize) -> ArgentumResult<Self> {
        Ok(Self::with_arena(Arc::new(PageArena::new(arena_total_bytes)?)))
    }

    /// Create a cache over an existing arena.
    pub fn with_arena(arena: Arc<PageArena>) -> Self {
        Self {
            arena,
            inner: Mutex::new(HashMap::new()),
            settled: Condvar::new(),
            tick: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// The arena backing this cache.
    pub fn arena(&self) -> &Arc<PageArena> {
        &self.arena
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Fetch the line for `key`, or build it exactly once.
    ///
    /// `build` runs outside the cache lock. On build failure the key is
    /// vacated so a later request can retry.
    pub fn get_or_build<F>(&self, key: CacheKey, build: F) -> ArgentumResult<Arc<CacheLine>>
    where
        F: FnOnce() -> ArgentumResult<PixelBuf>,
    {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        loop {
            match guard.get_mut(&key) {
                Some(slot) => match &slot.state {
                    SlotState::Ready(line) => {
                        slot.age = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
                        slot.hits += 1;
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(Arc::clone(line));
                    }
                    SlotState::Building => {
                        guard = self
                            .settled
                            .wait(guard)
                            .expect("cache mutex poisoned");
                    }
                },
                None => {
                    guard.insert(
                        key,
                        Slot {
                            state: SlotState::Building,
                            age: self.next_tick(),
                            hits: 0,
                        },
                    );
                    drop(guard);
                    return self.build_slot(key, build);
                }
            }
        }
    }

    fn build_slot<F>(&self, key: CacheKey, build: F) -> ArgentumResult<Arc<CacheLine>>
    where
        F: FnOnce() -> ArgentumResult<PixelBuf>,
    {
        let outcome = self
            .alloc_with_eviction(key.roi.byte_len())
            .and_then(|span| match build() {
                Ok(pixels) => {
                    if pixels.width() != key.roi.width || pixels.height() != key.roi.height {
                        self.arena.free(span);
                        return Err(ArgentumError::validation(
                            "cache build produced a buffer not shaped like its ROI",
                        ));
                    }
                    Ok(Arc::new(CacheLine {
                        arena: Arc::clone(&self.arena),
                        span,
                        pixels,
                        roi: key.roi,
                    }))
                }
                Err(e) => {
                    self.arena.free(span);
                    Err(e)
                }
            });

        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        match outcome {
            Ok(line) => {
                let slot = guard.get_mut(&key).expect("building slot vanished");
                slot.state = SlotState::Ready(Arc::clone(&line));
                slot.age = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
                drop(guard);
                self.settled.notify_all();
                Ok(line)
            }
            Err(e) => {
                guard.remove(&key);
                drop(guard);
                self.settled.notify_all();
                tracing::debug!(error = %e, "cache build failed, key vacated");
                Err(e)
            }
        }
    }

    /// Look up a ready line without building.
    pub fn get_existing(&self, key: &CacheKey) -> Option<Arc<CacheLine>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        let slot = guard.get_mut(key)?;
        match &slot.state {
            SlotState::Ready(line) => {
                slot.age = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
                slot.hits += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(line))
            }
            SlotState::Building => None,
        }
    }

    /// Allocate a span, evicting LRU unpinned entries under pressure.
    ///
    /// Fails with `Resource` once only pinned or building entries remain.
    fn alloc_with_eviction(&self, bytes: usize) -> ArgentumResult<PageSpan> {
        loop {
            if let Some(span) = self.arena.alloc(bytes) {
                return Ok(span);
            }
            if !self.evict_lru() {
                return Err(ArgentumError::resource(format!(
                    "arena full while allocating {bytes} B and every entry is pinned"
                )));
            }
        }
    }

    /// Drop the least-recently-used unpinned ready entry.
    fn evict_lru(&self) -> bool {
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        let mut candidate: Option<(CacheKey, u64)> = None;
        for (key, slot) in guard.iter() {
            if let SlotState::Ready(line) = &slot.state
                && Arc::strong_count(line) == 1
                && candidate.map_or(true, |(_, age)| slot.age < age)
            {
                candidate = Some((*key, slot.age));
            }
        }
        match candidate {
            Some((key, _)) => {
                guard.remove(&key);
                tracing::debug!(?key, "cache LRU entry evicted");
                true
            }
            None => false,
        }
    }

    /// Drop every unpinned entry belonging to `pipe` (all pipes if `None`).
    pub fn flush(&self, pipe: Option<PipeKind>) {
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        guard.retain(|key, slot| match &slot.state {
            SlotState::Ready(line) => {
                let matches = pipe.is_none_or(|p| p == key.pipe);
                !(matches && Arc::strong_count(line) == 1)
            }
            SlotState::Building => true,
        });
    }

    /// Lazy GC: drop unpinned entries of `pipe` whose hash fell out of the
    /// live set after a chain-hash change.
    pub fn sweep(&self, pipe: PipeKind, live: &[Hash128]) {
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        guard.retain(|key, slot| match &slot.state {
            SlotState::Ready(line) => {
                let dead = key.pipe == pipe
                    && !live.contains(&key.hash)
                    && Arc::strong_count(line) == 1;
                if dead {
                    tracing::debug!(?key, "cache entry unreachable, swept");
                }
                !dead
            }
            SlotState::Building => true,
        });
    }

    /// Drop cold entries: unpinned, idle for more than `max_idle_ticks`,
    /// and hit fewer than `min_hits` times.
    pub fn flush_old(&self, max_idle_ticks: u64, min_hits: u32) {
        let now = self.tick.load(Ordering::Relaxed);
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        guard.retain(|_, slot| match &slot.state {
            SlotState::Ready(line) => {
                let idle = now.saturating_sub(slot.age) > max_idle_ticks;
                !(idle && slot.hits < min_hits && Arc::strong_count(line) == 1)
            }
            SlotState::Building => true,
        });
    }

    /// Snapshot the counters.
    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.lock().expect("cache mutex poisoned");
        let resident_bytes = guard
            .values()
            .filter_map(|slot| match &slot.state {
                SlotState::Ready(line) => Some(line.byte_len()),
                SlotState::Building => None,
            })
            .sum();
        CacheStats {
            queries: self.queries.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            entries: guard.len(),
            resident_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::hash::Hash128;

    fn key(h: u64) -> CacheKey {
        CacheKey {
            hash: Hash128 { hi: h, lo: !h },
            roi: Roi::full(4, 4),
            pipe: PipeKind::Full,
        }
    }

    fn cache(pages: u32) -> PixelCache {
        let arena = PageArena::with_page_size(pages as usize * 1024, 1024).unwrap();
        PixelCache::with_arena(Arc::new(arena))
    }

    fn gray(v: f32) -> PixelBuf {
        let mut buf = PixelBuf::new(4, 4);
        buf.fill([v, v, v, 1.0]);
        buf
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = cache(8);
        let a = cache.get_or_build(key(1), || Ok(gray(0.5))).unwrap();
        let b = cache.get_or_build(key(1), || panic!("must not rebuild")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let stats = cache.stats();
        assert_eq!(stats.queries, 2);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn failed_build_vacates_the_key() {
        let cache = cache(8);
        let err = cache
            .get_or_build(key(2), || Err(ArgentumError::validation("boom")))
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        // The key can be rebuilt afterwards.
        cache.get_or_build(key(2), || Ok(gray(0.1))).unwrap();
    }

    #[test]
    fn eviction_prefers_lru_and_skips_pinned() {
        // Room for two 4x4 RGBA f32 lines (256 B each → 1 page each).
        let cache = cache(2);
        let pinned = cache.get_or_build(key(10), || Ok(gray(0.1))).unwrap();
        let _b = cache.get_or_build(key(11), || Ok(gray(0.2))).unwrap();
        drop(_b);

        // A third line must evict key 11 (unpinned LRU), not pinned key 10.
        cache.get_or_build(key(12), || Ok(gray(0.3))).unwrap();
        assert!(cache.get_existing(&key(10)).is_some());
        assert!(cache.get_existing(&key(11)).is_none());
        drop(pinned);
    }

    #[test]
    fn all_pinned_fails_with_resource() {
        let cache = cache(1);
        let _pin = cache.get_or_build(key(20), || Ok(gray(0.4))).unwrap();
        let err = cache
            .get_or_build(key(21), || Ok(gray(0.5)))
            .unwrap_err();
        assert!(matches!(err, ArgentumError::Resource(_)));
    }

    #[test]
    fn sweep_drops_unreachable_hashes_only() {
        let cache = cache(8);
        cache.get_or_build(key(30), || Ok(gray(0.1))).unwrap();
        cache.get_or_build(key(31), || Ok(gray(0.2))).unwrap();
        cache.sweep(PipeKind::Full, &[key(30).hash]);
        assert!(cache.get_existing(&key(30)).is_some());
        assert!(cache.get_existing(&key(31)).is_none());
    }

    #[test]
    fn misshapen_build_is_rejected() {
        let cache = cache(8);
        let err = cache
            .get_or_build(key(40), || Ok(PixelBuf::new(2, 2)))
            .unwrap_err();
        assert!(matches!(err, ArgentumError::Validation(_)));
        // Span must have been returned to the arena.
        assert_eq!(cache.arena().stats().total_free_pages, 8);
    }
}
