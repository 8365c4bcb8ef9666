use std::sync::{Arc, Mutex};

use crate::arena::CacheLine;
use crate::foundation::core::TapStage;
use crate::pipe::hash::Hash128;

/// What a scope consumer sees when it reads a tap: pinned pixels plus the
/// hash that identifies them.
#[derive(Clone, Debug)]
pub struct TapSnapshot {
    /// The published cache line; holding this pins it against recycling.
    pub line: Arc<CacheLine>,
    /// Snapshot width in pixels.
    pub width: u32,
    /// Snapshot height in pixels.
    pub height: u32,
    /// Chain hash of the piece that produced the snapshot.
    pub hash: Hash128,
}

/// One named backbuffer slot (demosaic / colorout / gamma).
///
/// Single producer (the executor), many readers. The slot mutex covers the
/// swap only; pixel reads happen on the pinned line after release. The held
/// `Arc` keeps the previous buffer alive until the next successful publish.
#[derive(Debug)]
pub struct Backbuf {
    stage: TapStage,
    slot: Mutex<Option<TapSnapshot>>,
}

impl Backbuf {
    pub fn new(stage: TapStage) -> Self {
        Self {
            stage,
            slot: Mutex::new(None),
        }
    }

    /// The stage this slot belongs to.
    pub fn stage(&self) -> TapStage {
        self.stage
    }

    /// Atomically publish a new snapshot.
    ///
    /// Publishing the hash already held is a no-op, so readers holding that
    /// hash observe nothing.
    pub fn publish(&self, line: Arc<CacheLine>, hash: Hash128) {
        let mut slot = self.slot.lock().expect("tap mutex poisoned");
        if let Some(current) = slot.as_ref()
            && current.hash == hash
        {
            return;
        }
        let roi = line.roi();
        tracing::debug!(stage = ?self.stage, %hash, "tap published");
        *slot = Some(TapSnapshot {
            width: roi.width,
            height: roi.height,
            hash,
            line,
        });
    }

    /// Copy the current snapshot out from under the mutex.
    pub fn snapshot(&self) -> Option<TapSnapshot> {
        self.slot.lock().expect("tap mutex poisoned").clone()
    }

    /// The currently published hash, if any.
    pub fn hash(&self) -> Option<Hash128> {
        self.slot
            .lock()
            .expect("tap mutex poisoned")
            .as_ref()
            .map(|s| s.hash)
    }

    /// Drop the held snapshot (pipeline shutdown or input swap).
    pub fn invalidate(&self) {
        *self.slot.lock().expect("tap mutex poisoned") = None;
    }
}

/// The three tap slots owned by a pipeline context.
#[derive(Debug)]
pub struct TapSet {
    demosaic: Backbuf,
    colorout: Backbuf,
    gamma: Backbuf,
}

impl Default for TapSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TapSet {
    pub fn new() -> Self {
        Self {
            demosaic: Backbuf::new(TapStage::Demosaic),
            colorout: Backbuf::new(TapStage::Colorout),
            gamma: Backbuf::new(TapStage::Gamma),
        }
    }

    /// The slot for a stage.
    pub fn get(&self, stage: TapStage) -> &Backbuf {
        match stage {
            TapStage::Demosaic => &self.demosaic,
            TapStage::Colorout => &self.colorout,
            TapStage::Gamma => &self.gamma,
        }
    }

    /// Invalidate every slot.
    pub fn invalidate_all(&self) {
        self.demosaic.invalidate();
        self.colorout.invalidate();
        self.gamma.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{CacheKey, PageArena, PixelCache};
    use crate::foundation::core::{PipeKind, PixelBuf, Roi};

    fn line(v: f32) -> Arc<CacheLine> {
        let arena = Arc::new(PageArena::with_page_size(16 * 1024, 1024).unwrap());
        let cache = PixelCache::with_arena(arena);
        cache
            .get_or_build(
                CacheKey {
                    hash: Hash128 { hi: 1, lo: 2 },
                    roi: Roi::full(2, 2),
                    pipe: PipeKind::Preview,
                },
                || {
                    let mut buf = PixelBuf::new(2, 2);
                    buf.fill([v, v, v, 1.0]);
                    Ok(buf)
                },
            )
            .unwrap()
    }

    #[test]
    fn publish_then_snapshot() {
        let tap = Backbuf::new(TapStage::Demosaic);
        assert!(tap.snapshot().is_none());

        let l = line(0.25);
        let h = Hash128 { hi: 7, lo: 9 };
        tap.publish(Arc::clone(&l), h);

        let snap = tap.snapshot().unwrap();
        assert_eq!(snap.hash, h);
        assert_eq!((snap.width, snap.height), (2, 2));
        assert!(Arc::ptr_eq(&snap.line, &l));
    }

    #[test]
    fn republish_same_hash_is_a_noop() {
        let tap = Backbuf::new(TapStage::Gamma);
        let l1 = line(0.1);
        let h = Hash128 { hi: 3, lo: 4 };
        tap.publish(Arc::clone(&l1), h);

        // A second publish with the same hash must not swap the buffer.
        let l2 = line(0.9);
        tap.publish(l2, h);
        assert!(Arc::ptr_eq(&tap.snapshot().unwrap().line, &l1));
    }

    #[test]
    fn new_hash_replaces_and_unpins_previous() {
        let tap = Backbuf::new(TapStage::Colorout);
        let l1 = line(0.1);
        tap.publish(Arc::clone(&l1), Hash128 { hi: 1, lo: 1 });
        assert_eq!(Arc::strong_count(&l1), 2); // here + slot

        tap.publish(line(0.2), Hash128 { hi: 2, lo: 2 });
        assert_eq!(Arc::strong_count(&l1), 1); // here only
    }
}
