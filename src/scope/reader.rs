use crate::foundation::error::{ArgentumError, ArgentumResult};
use crate::pipe::hash::Hash128;
use crate::pipe::tap::{Backbuf, TapSnapshot};

/// How many re-reads a consumer attempts before reporting staleness.
pub const DEFAULT_TAP_RETRIES: u32 = 3;

/// Read a tap expecting a specific hash.
///
/// The snapshot copy happens under the tap mutex; the hash comparison is
/// the liveness test. If the executor publishes mid-read the observed hash
/// moves, the read retries up to `max_retries` times, then reports
/// inconsistent output without touching the pipeline.
pub fn read_tap(
    tap: &Backbuf,
    expected: Hash128,
    max_retries: u32,
) -> ArgentumResult<TapSnapshot> {
    let mut observed = None;
    for _ in 0..=max_retries {
        match tap.snapshot() {
            Some(snap) if snap.hash == expected => return Ok(snap),
            Some(snap) => observed = Some(snap.hash),
            None => observed = None,
        }
    }
    Err(ArgentumError::inconsistent(match observed {
        Some(hash) => format!(
            "tap {:?} holds {hash}, expected {expected}",
            tap.stage()
        ),
        None => format!("tap {:?} is empty, expected {expected}", tap.stage()),
    }))
}

/// Adopt whatever the tap currently holds (a consumer starting fresh).
pub fn read_tap_latest(tap: &Backbuf) -> ArgentumResult<TapSnapshot> {
    tap.snapshot().ok_or_else(|| {
        ArgentumError::inconsistent(format!("tap {:?} has no published snapshot", tap.stage()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{CacheKey, PageArena, PixelCache};
    use crate::foundation::core::{PipeKind, PixelBuf, Roi, TapStage};
    use std::sync::Arc;

    fn published_tap(hash: Hash128) -> Backbuf {
        let arena = Arc::new(PageArena::with_page_size(16 * 1024, 1024).unwrap());
        let cache = PixelCache::with_arena(arena);
        let line = cache
            .get_or_build(
                CacheKey {
                    hash,
                    roi: Roi::full(2, 2),
                    pipe: PipeKind::Preview,
                },
                || Ok(PixelBuf::new(2, 2)),
            )
            .unwrap();
        let tap = Backbuf::new(TapStage::Colorout);
        tap.publish(line, hash);
        tap
    }

    #[test]
    fn matching_hash_reads_straight_through() {
        let hash = Hash128 { hi: 5, lo: 6 };
        let tap = published_tap(hash);
        let snap = read_tap(&tap, hash, DEFAULT_TAP_RETRIES).unwrap();
        assert_eq!(snap.hash, hash);
    }

    #[test]
    fn stale_expectation_reports_inconsistent_output() {
        let tap = published_tap(Hash128 { hi: 5, lo: 6 });
        let err = read_tap(&tap, Hash128 { hi: 9, lo: 9 }, 2).unwrap_err();
        assert!(matches!(err, ArgentumError::InconsistentOutput(_)));
    }

    #[test]
    fn empty_tap_reports_inconsistent_output() {
        let tap = Backbuf::new(TapStage::Gamma);
        assert!(read_tap(&tap, Hash128 { hi: 1, lo: 1 }, 1).is_err());
        assert!(read_tap_latest(&tap).is_err());
    }

    #[test]
    fn latest_adopts_the_published_hash() {
        let hash = Hash128 { hi: 11, lo: 12 };
        let tap = published_tap(hash);
        assert_eq!(read_tap_latest(&tap).unwrap().hash, hash);
    }
}
