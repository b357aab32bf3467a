//! A buddy allocator for physical page frames.
//!
//! The allocator manages a contiguous range of page frames, described by one
//! [`PageFrame`] record per page, and hands out naturally aligned blocks of
//! `2^order` pages. Freed blocks are merged with their buddies so that large
//! blocks become available again.
//!
//! All mutating operations take `&mut self`. To share an allocator between
//! multiple cores, wrap it inside a [`LockedAllocator`].
#![deny(rust_2018_idioms)]
#![cfg_attr(not(test), no_std)]

pub mod buddy;
pub mod free_list;
pub mod order;
pub mod page;
pub mod sync;
pub mod unit;

pub use buddy::BuddyAllocator;
pub use order::{MAX_ORDER, TOP_ORDER};
pub use page::{PageFlags, PageFrame, PageMap, Pfn};
pub use sync::LockedAllocator;

use core::fmt;
use displaydoc_lite::displaydoc;

/// The size of a single page in memory.
///
/// This is also the size of an order-0 block.
pub const PAGE_SIZE: usize = 4 * unit::KIB;

/// Result for every allocator operation.
pub type Result<T, E = Error> = core::result::Result<T, E>;

displaydoc! {
    /// Any error that can happen while using the page allocator.
    ///
    /// Corrupted allocator metadata is never reported through this type,
    /// it causes a panic instead.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Error {
        /// the allocator was already initialized.
        AlreadyInitialized,
        /// tried to initialize the allocator with an empty range of pages.
        RegionTooSmall,
        /// the range of pages overflows the page frame numbers.
        InvalidRegion,
        /// the order is outside of the valid order range.
        InvalidOrder,
        /// tried to allocate zero pages.
        AllocateZeroPages,
        /// the page is not managed by this allocator.
        OutOfRange,
        /// tried to allocate, but there was no free block left.
        NoMemoryAvailable,
        /// tried to reserve a page that is not free.
        PageNotFree,
    }
}

/// Statistics for a page allocator, counted in pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocStats {
    /// The name of the allocator that collected these stats.
    pub name: &'static str,
    /// The number of pages that are currently allocated.
    pub allocated: usize,
    /// The number of pages that were reserved.
    pub reserved: usize,
    /// The number of pages that are left for allocation.
    pub free: usize,
    /// The total number of pages that this allocator manages.
    pub total: usize,
}

impl AllocStats {
    /// Create a new [`AllocStats`] instance for the given allocator name.
    pub const fn with_name(name: &'static str) -> Self {
        Self {
            name,
            allocated: 0,
            reserved: 0,
            free: 0,
            total: 0,
        }
    }

    pub(crate) fn alloc(&mut self, pages: usize) {
        self.free -= pages;
        self.allocated += pages;
    }

    pub(crate) fn dealloc(&mut self, pages: usize) {
        self.free += pages;
        self.allocated = self.allocated.saturating_sub(pages);
    }

    pub(crate) fn reserve(&mut self, pages: usize) {
        self.free -= pages;
        self.reserved += pages;
    }
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f, "\nAllocated: {}", unit::pages(self.allocated))?;
        writeln!(f, "Reserved: {}", unit::pages(self.reserved))?;
        writeln!(f, "Free: {}", unit::pages(self.free))?;
        writeln!(f, "Total: {}", unit::pages(self.total))?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f)?;
        Ok(())
    }
}
