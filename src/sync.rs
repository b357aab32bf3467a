//! A [`BuddyAllocator`] behind a lock, so it can be shared between cores.

use crate::{
    order::{order_for_pages, MAX_ORDER},
    page::{PageFrame, Pfn},
    AllocStats, BuddyAllocator, Error, Result,
};
use spin::Mutex;

/// A page allocator that serializes every operation through a single lock.
///
/// The lock is not reentrant. Calling into the same `LockedAllocator` while
/// one of its operations is running on the same core, for example from an
/// interrupt handler, will deadlock.
pub struct LockedAllocator<'a>(Mutex<BuddyAllocator<'a>>);

impl<'a> LockedAllocator<'a> {
    /// Create a new, uninitialized allocator.
    ///
    /// This is a `const fn` so it can be used to initialize a `static`.
    pub const fn new() -> Self {
        Self(Mutex::new(BuddyAllocator::new()))
    }

    /// Makes the pages `base..base + frames.len()` available for allocation.
    ///
    /// See [`BuddyAllocator::init`].
    pub fn init(&self, frames: &'a mut [PageFrame], base: Pfn) -> Result<usize> {
        self.0.lock().init(frames, base)
    }

    /// Allocate a single page.
    pub fn alloc(&self) -> Result<Pfn> {
        // order 0 is exactly one page
        self.0.lock().allocate(0)
    }

    /// Allocate at least `count` contiguous pages.
    ///
    /// The number of pages is rounded up to the next power of two,
    /// which must be released again using [`order_for_pages`] as the order.
    /// A `count` that is larger than the largest block fails with
    /// [`Error::InvalidOrder`].
    pub fn alloc_pages(&self, count: usize) -> Result<Pfn> {
        if count == 0 {
            return Err(Error::AllocateZeroPages);
        }

        let order = order_for_pages(count);
        if order >= MAX_ORDER {
            return Err(Error::InvalidOrder);
        }

        self.0.lock().allocate(order)
    }

    /// Allocate a block of `2^order` pages.
    pub fn allocate(&self, order: usize) -> Result<Pfn> {
        self.0.lock().allocate(order)
    }

    /// Give a block that was allocated with the given order back to the allocator.
    pub fn dealloc(&self, block: Pfn, order: usize) -> Result<()> {
        self.0.lock().release(block, order)
    }

    /// Reserve the page at `pfn`, so it will never be allocated.
    pub fn reserve(&self, pfn: Pfn) -> Result<()> {
        self.0.lock().reserve(pfn)
    }

    /// Check if the page at `pfn` is currently free.
    pub fn is_free(&self, pfn: Pfn) -> bool {
        self.0.lock().is_free(pfn)
    }

    /// Returns the name of the underlying allocation algorithm.
    pub fn name(&self) -> &'static str {
        BuddyAllocator::NAME
    }

    /// Return the statistics for this allocator.
    pub fn stats(&self) -> AllocStats {
        self.0.lock().stats()
    }

    /// Write the free lists to the log.
    pub fn dump_state(&self) {
        self.0.lock().dump_state()
    }
}

impl Default for LockedAllocator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::TOP_ORDER;

    #[test]
    fn alloc_pages_rounds_up() {
        let mut frames = vec![PageFrame::new(); 16];
        let alloc = LockedAllocator::new();
        alloc.init(&mut frames, Pfn::new(0)).unwrap();

        let block = alloc.alloc_pages(3).unwrap();
        assert_eq!(block, Pfn::new(0));
        assert_eq!(alloc.stats().allocated, 4);

        alloc.dealloc(block, order_for_pages(3)).unwrap();
        assert_eq!(alloc.stats().allocated, 0);
        assert_eq!(alloc.stats().free, 16);
    }

    #[test]
    fn alloc_pages_rejects_bad_counts() {
        let alloc = LockedAllocator::new();
        assert_eq!(alloc.alloc_pages(0), Err(Error::AllocateZeroPages));
        assert_eq!(
            alloc.alloc_pages((1 << TOP_ORDER) + 1),
            Err(Error::InvalidOrder)
        );
        assert_eq!(alloc.alloc_pages(usize::MAX), Err(Error::InvalidOrder));
    }

    #[test]
    fn shared_between_threads() {
        use std::{sync::Arc, thread};

        let frames: &'static mut [PageFrame] =
            Box::leak(vec![PageFrame::new(); 256].into_boxed_slice());
        let alloc = Arc::new(LockedAllocator::new());
        alloc.init(frames, Pfn::new(0)).unwrap();

        let handles = (0..4)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                thread::spawn(move || {
                    let pages = (0..32).map(|_| alloc.alloc().unwrap()).collect::<Vec<_>>();
                    pages
                        .into_iter()
                        .for_each(|page| alloc.dealloc(page, 0).unwrap());
                })
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .for_each(|handle| handle.join().unwrap());

        let stats = alloc.stats();
        assert_eq!(stats.free, 256);
        assert_eq!(stats.allocated, 0);
        assert_eq!(alloc.name(), "buddy");
    }
}
