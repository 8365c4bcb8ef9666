use std::sync::Mutex;

use smallvec::SmallVec;

use crate::foundation::error::{ArgentumError, ArgentumResult};

/// Cache pages are 64 KiB.
pub const ARENA_PAGE_SIZE: usize = 64 * 1024;

/// A contiguous run of free pages; the list is kept sorted by `start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FreeRun {
    start: u32,
    length: u32,
}

/// A page-aligned reservation handed out by [`PageArena::alloc`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSpan {
    /// First page of the span.
    pub start_page: u32,
    /// Length in pages.
    pub pages: u32,
    /// Page-rounded size in bytes.
    pub bytes: usize,
}

/// Weak observation of arena occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Sum of all free-run lengths, in pages.
    pub total_free_pages: u32,
    /// Length of the largest free run, in pages.
    pub largest_free_run: u32,
}

/// Page-sliced reservation for the pipeline cache.
///
/// Allocation is a best-fit scan over the sorted free-run list, consuming
/// from the front of the chosen run so the list stays sorted; release
/// re-inserts in order and eagerly coalesces with both neighbours. The mutex
/// guards the run list only — span owners touch their buffers without it.
#[derive(Debug)]
pub struct PageArena {
    page_size: usize,
    num_pages: u32,
    free_runs: Mutex<SmallVec<[FreeRun; 8]>>,
}

impl PageArena {
    /// Reserve `total_bytes` of page-sliced space.
    pub fn new(total_bytes: usize) -> ArgentumResult<Self> {
        Self::with_page_size(total_bytes, ARENA_PAGE_SIZE)
    }

    /// Reserve with an explicit page size (tests use small pages).
    pub fn with_page_size(total_bytes: usize, page_size: usize) -> ArgentumResult<Self> {
        if page_size == 0 {
            return Err(ArgentumError::config("arena page size must be > 0"));
        }
        let pages = total_bytes / page_size;
        if pages == 0 || pages > u32::MAX as usize {
            return Err(ArgentumError::config(format!(
                "arena size {total_bytes} B yields {pages} pages of {page_size} B"
            )));
        }

        let mut free_runs = SmallVec::new();
        free_runs.push(FreeRun {
            start: 0,
            length: pages as u32,
        });

        Ok(Self {
            page_size,
            num_pages: pages as u32,
            free_runs: Mutex::new(free_runs),
        })
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Total page count.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Round a byte size up to pages; `None` when the request is
    /// zero, overflows rounding, or exceeds the whole arena.
    fn calc(&self, size: usize) -> Option<(u32, usize)> {
        if size == 0 {
            return None;
        }
        let pages = size.checked_add(self.page_size - 1)? / self.page_size;
        if pages > self.num_pages as usize {
            return None;
        }
        Some((pages as u32, pages * self.page_size))
    }

    /// Allocate `size` bytes, rounded up to whole pages.
    ///
    /// Best-fit: the smallest run that fits wins, with an exact-fit
    /// early-out; ties go to the lowest start page by scan order.
    pub fn alloc(&self, size: usize) -> Option<PageSpan> {
        let (pages_needed, rounded) = self.calc(size)?;

        let mut runs = self.free_runs.lock().expect("arena mutex poisoned");

        let mut best_index = None;
        let mut best_length = u32::MAX;
        for (i, r) in runs.iter().enumerate() {
            if r.length >= pages_needed && r.length < best_length {
                best_index = Some(i);
                best_length = r.length;
                if best_length == pages_needed {
                    break; // exact fit
                }
            }
        }

        let i = best_index?;
        let first = runs[i].start;

        // Consume from the front of the run so the list stays sorted.
        runs[i].start += pages_needed;
        runs[i].length -= pages_needed;
        if runs[i].length == 0 {
            runs.remove(i);
        }

        Some(PageSpan {
            start_page: first,
            pages: pages_needed,
            bytes: rounded,
        })
    }

    /// Return a span to the arena.
    ///
    /// Out-of-range or overlapping releases (double frees included) are
    /// reported and leave the free list untouched.
    pub fn free(&self, span: PageSpan) {
        if span.pages == 0 {
            return;
        }
        if span.start_page >= self.num_pages || span.pages > self.num_pages - span.start_page {
            tracing::error!(
                start = span.start_page,
                pages = span.pages,
                "arena free: range out of bounds"
            );
            return;
        }

        let mut runs = self.free_runs.lock().expect("arena mutex poisoned");

        // Insertion point keeping the list sorted by start page.
        let mut i = 0;
        while i < runs.len() && runs[i].start < span.start_page {
            i += 1;
        }

        if i > 0 {
            let prev = runs[i - 1];
            if prev.start + prev.length > span.start_page {
                tracing::error!(
                    start = span.start_page,
                    pages = span.pages,
                    "arena free: overlap with previous run"
                );
                return;
            }
        }
        if i < runs.len() {
            let next = runs[i];
            if span.start_page + span.pages > next.start {
                tracing::error!(
                    start = span.start_page,
                    pages = span.pages,
                    "arena free: overlap with next run"
                );
                return;
            }
        }

        runs.insert(
            i,
            FreeRun {
                start: span.start_page,
                length: span.pages,
            },
        );

        // Coalesce with the next run if adjacent.
        if i + 1 < runs.len() && runs[i].start + runs[i].length == runs[i + 1].start {
            runs[i].length += runs[i + 1].length;
            runs.remove(i + 1);
        }

        // Coalesce with the previous run if adjacent.
        if i > 0 && runs[i - 1].start + runs[i - 1].length == runs[i].start {
            runs[i - 1].length += runs[i].length;
            runs.remove(i);
        }
    }

    /// Snapshot total free pages and the largest free run.
    pub fn stats(&self) -> ArenaStats {
        let runs = self.free_runs.lock().expect("arena mutex poisoned");
        let mut stats = ArenaStats::default();
        for r in runs.iter() {
            stats.total_free_pages += r.length;
            stats.largest_free_run = stats.largest_free_run.max(r.length);
        }
        stats
    }

    #[cfg(test)]
    fn runs_snapshot(&self) -> Vec<(u32, u32)> {
        self.free_runs
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.start, r.length))
            .collect()
    }
}
