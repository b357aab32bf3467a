//! Implementation of a Buddy Allocator that is responsible for allocating
//! physical page frames, which are then handed out either directly to the
//! kernel or used to back higher level allocators.

use crate::{
    free_list::FreeList,
    order::{
        block_contains, buddy_of, is_aligned, pages_for_order, size_for_order, MAX_ORDER,
        TOP_ORDER,
    },
    page::{PageFlags, PageFrame, PageMap, Pfn},
    unit::ByteUnit,
    AllocStats, Error, Result,
};
use core::{cmp, fmt};
use log::{debug, info, trace};

const EMPTY_ORDERS: [FreeList; MAX_ORDER] = {
    let mut orders = [FreeList::new(0); MAX_ORDER];
    let mut order = 0;
    while order < MAX_ORDER {
        orders[order] = FreeList::new(order);
        order += 1;
    }
    orders
};

/// The central structure that is responsible for allocating
/// page frames using the buddy allocation algorithm.
pub struct BuddyAllocator<'a> {
    orders: [FreeList; MAX_ORDER],
    frames: PageMap<'a>,
    stats: AllocStats,
}

impl<'a> BuddyAllocator<'a> {
    /// The name of this allocation algorithm.
    pub const NAME: &'static str = "buddy";

    /// Create an empty and uninitialized buddy allocator.
    pub const fn new() -> Self {
        Self {
            orders: EMPTY_ORDERS,
            frames: PageMap::empty(),
            stats: AllocStats::with_name(Self::NAME),
        }
    }

    /// Returns the name of this allocation algorithm.
    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Makes the pages `base..base + frames.len()` available for allocation.
    ///
    /// `frames[i]` is the record of page `base + i`. The range is split into
    /// the largest aligned blocks that fit inside it, so a range that is not a
    /// multiple of the top order block size will add smaller blocks for the
    /// remaining pages, and never a block that reaches past the range.
    ///
    /// Returns the number of pages that were added to this allocator.
    pub fn init(&mut self, frames: &'a mut [PageFrame], base: Pfn) -> Result<usize> {
        if !self.frames.is_empty() {
            return Err(Error::AlreadyInitialized);
        }

        if frames.is_empty() {
            return Err(Error::RegionTooSmall);
        }

        let count = frames.len();
        let end = base.checked_add(count).ok_or(Error::InvalidRegion)?;

        self.frames = PageMap::new(frames, base);
        self.frames.reset();

        let mut cursor = base;
        while cursor < end {
            let remaining = end.as_usize() - cursor.as_usize();

            // find the largest order that is aligned and fits into the rest of the range
            let mut order = TOP_ORDER;
            while order > 0 && !(is_aligned(cursor, order) && pages_for_order(order) <= remaining)
            {
                order -= 1;
            }

            debug!(
                "Adding block at {} with order {} to Buddy Allocator",
                cursor, order
            );
            self.orders[order].insert(&mut self.frames, cursor);
            cursor = cursor.add(pages_for_order(order));
        }

        self.stats.total = count;
        self.stats.free = count;

        info!(
            "Made {} available for page allocation",
            crate::unit::pages(count)
        );
        Ok(count)
    }

    /// Splits the free block at `head` into two buddies of the order below.
    ///
    /// Both halves are inserted into the free list of `source_order - 1`,
    /// and the left half, which starts at `head`, is returned.
    fn split(&mut self, head: Pfn, source_order: usize) -> Pfn {
        assert!(
            source_order > 0 && source_order < MAX_ORDER,
            "can not split a block of order {}",
            source_order
        );
        assert!(
            is_aligned(head, source_order),
            "block {} is misaligned for order {}",
            head,
            source_order
        );

        // if this is how the block looked like before the split:
        //
        // +-- `head`
        // v
        // +---------------------------------+
        // |         `source_order`          |
        // +---------------------------------+
        //
        // then this is how it looks like after the split:
        //
        // +-- `head`
        // v
        // +---------------------------------+
        // |     `left`     |    `right`     |
        // +---------------------------------+
        //                  ^
        //                  +-- `head + pages_for_order(target_order)`
        let target_order = source_order - 1;
        let right = head.add(pages_for_order(target_order));

        self.orders[source_order].remove(&mut self.frames, head);
        self.orders[target_order].insert(&mut self.frames, head);
        self.orders[target_order].insert(&mut self.frames, right);

        trace!(
            "Split block {} of order {} into {} and {}",
            head,
            source_order,
            head,
            right
        );
        head
    }

    /// Merges the free block at `head` with its free buddy into a single
    /// block of the order above.
    ///
    /// Returns the head of the merged block, which is always the lower
    /// address of the two buddies.
    fn merge(&mut self, head: Pfn, source_order: usize) -> Pfn {
        assert!(
            is_aligned(head, source_order),
            "block {} is misaligned for order {}",
            head,
            source_order
        );

        let buddy = match buddy_of(head, source_order) {
            Some(buddy) => buddy,
            None => panic!(
                "block {} of order {} has no buddy to merge with",
                head, source_order
            ),
        };
        assert!(
            self.orders[source_order].contains(&self.frames, buddy),
            "buddy {} of block {} is not free in order {}",
            buddy,
            head,
            source_order
        );

        let merged = cmp::min(head, buddy);
        self.orders[source_order].remove(&mut self.frames, head);
        self.orders[source_order].remove(&mut self.frames, buddy);
        self.orders[source_order + 1].insert(&mut self.frames, merged);

        trace!(
            "Merged block {} and {} of order {} into {}",
            head,
            buddy,
            source_order,
            merged
        );
        merged
    }

    /// Allocates a block of `2^order` contiguous pages.
    ///
    /// Returns the page frame number of the first page of the block.
    /// The caller owns the block until it is given back using
    /// [`release`](Self::release) with the same order.
    pub fn allocate(&mut self, order: usize) -> Result<Pfn> {
        if order >= MAX_ORDER {
            return Err(Error::InvalidOrder);
        }

        // find the smallest free block that is large enough before splitting
        // anything, a failed allocation must leave the free lists untouched
        let (mut current, mut block) = (order..MAX_ORDER)
            .find_map(|source| self.orders[source].first().map(|head| (source, head)))
            .ok_or(Error::NoMemoryAvailable)?;

        // walk down the orders and always continue with the left half
        while current > order {
            block = self.split(block, current);
            current -= 1;
        }

        self.orders[order].remove(&mut self.frames, block);
        self.frames.frame_mut(block).mark_allocated(order);
        self.stats.alloc(pages_for_order(order));

        trace!(
            "Allocated block {} of order {} ({})",
            block,
            order,
            ByteUnit(size_for_order(order))
        );
        Ok(block)
    }

    /// Gives the block of `2^order` pages at `block` back to the allocator,
    /// and merges it with its buddies as long as possible.
    ///
    /// The block must have been returned by [`allocate`](Self::allocate) with
    /// the same `order`. Releasing a block that is not owned by the caller
    /// corrupts the allocator.
    ///
    /// # Panics
    ///
    /// If `block` is not aligned for `order`. Debug builds also panic if the
    /// block is already free, or wasn't allocated with `order`.
    pub fn release(&mut self, block: Pfn, order: usize) -> Result<()> {
        if order >= MAX_ORDER {
            return Err(Error::InvalidOrder);
        }

        let pages = pages_for_order(order);
        if !self.frames.covers(block, pages) {
            return Err(Error::OutOfRange);
        }

        assert!(
            is_aligned(block, order),
            "tried to release block {} that is misaligned for order {}",
            block,
            order
        );

        let frame = self.frames.frame_mut(block);
        debug_assert!(
            !frame.flags().contains(PageFlags::FREE),
            "block {} of order {} was released twice",
            block,
            order
        );
        debug_assert_eq!(
            frame.order(),
            Some(order),
            "block {} was not allocated with order {}",
            block,
            order
        );
        frame.clear_allocated();

        self.orders[order].insert(&mut self.frames, block);
        self.stats.dealloc(pages);

        let mut head = block;
        let mut order = order;
        while order < TOP_ORDER {
            let buddy = match buddy_of(head, order) {
                Some(buddy) => buddy,
                None => break,
            };

            // the buddy may be allocated, or split into smaller blocks
            if !self.orders[order].contains(&self.frames, buddy) {
                break;
            }

            head = self.merge(head, order);
            order += 1;
        }

        Ok(())
    }

    /// Removes the single page at `pfn` from the free blocks, so it will
    /// never be allocated.
    ///
    /// The free block that contains the page is split down to order 0, and
    /// all other parts of it stay free.
    ///
    /// # Notes
    ///
    /// A reserved page stays reserved for the lifetime of the allocator.
    /// It can't be released, and it never merges with its buddy.
    pub fn reserve(&mut self, pfn: Pfn) -> Result<()> {
        if self.frames.get(pfn).is_none() {
            return Err(Error::OutOfRange);
        }

        // look for the free block that contains the page, from the largest order down
        let frames = &self.frames;
        let (mut order, mut block) = self
            .orders
            .iter()
            .rev()
            .find_map(|list| {
                list.iter(frames)
                    .find(|&head| block_contains(head, list.order(), pfn))
                    .map(|head| (list.order(), head))
            })
            .ok_or(Error::PageNotFree)?;

        // split down to order 0, always following the half that contains the page
        while order > 0 {
            let left = self.split(block, order);
            order -= 1;

            block = if block_contains(left, order, pfn) {
                left
            } else {
                left.add(pages_for_order(order))
            };
        }

        debug_assert_eq!(block, pfn);
        self.orders[0].remove(&mut self.frames, block);
        self.frames.frame_mut(block).mark_reserved();
        self.stats.reserve(1);

        debug!("Reserved page {}", pfn);
        Ok(())
    }

    /// Check if the page at `pfn` is part of a free block.
    pub fn is_free(&self, pfn: Pfn) -> bool {
        (0..MAX_ORDER).any(|order| {
            let head = Pfn::new(pfn.as_usize() & !(pages_for_order(order) - 1));
            self.orders[order].contains(&self.frames, head)
        })
    }

    /// Returns the free list for the given order.
    ///
    /// # Panics
    ///
    /// If `order` is not smaller than [`MAX_ORDER`].
    pub fn free_list(&self, order: usize) -> &FreeList {
        &self.orders[order]
    }

    /// Returns an iterator over the heads of all free blocks of the given order.
    pub fn free_blocks(&self, order: usize) -> impl Iterator<Item = Pfn> + '_ {
        self.orders[order].iter(&self.frames)
    }

    /// Returns the number of pages that are inside free blocks.
    pub fn free_pages(&self) -> usize {
        self.orders
            .iter()
            .map(|list| list.len() * pages_for_order(list.order()))
            .sum()
    }

    /// Return the page records that back this allocator.
    pub fn frames(&self) -> &PageMap<'a> {
        &self.frames
    }

    /// Return a copy of the statistics for this allocator.
    pub fn stats(&self) -> AllocStats {
        self.stats.clone()
    }

    /// Returns a value that displays every free list of this allocator,
    /// one line per order.
    pub fn state(&self) -> State<'_, 'a> {
        State { allocator: self }
    }

    /// Writes the current free lists to the log.
    pub fn dump_state(&self) {
        debug!("BUDDY STATE:");
        for list in self.orders.iter() {
            debug!(
                "{}",
                OrderLine {
                    list,
                    frames: &self.frames
                }
            );
        }
    }
}

impl Default for BuddyAllocator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BuddyAllocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuddyAllocator")
            .field("frames", &self.frames)
            .field("stats", &self.stats)
            .finish()
    }
}

/// The free lists of a [`BuddyAllocator`], printable using [`Display`](fmt::Display).
pub struct State<'s, 'a> {
    allocator: &'s BuddyAllocator<'a>,
}

impl fmt::Display for State<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.allocator.orders.iter().try_for_each(|list| {
            let line = OrderLine {
                list,
                frames: &self.allocator.frames,
            };
            writeln!(f, "{}", line)
        })
    }
}

/// A single free list, printed as `[order] pfn pfn ...`.
struct OrderLine<'s, 'a> {
    list: &'s FreeList,
    frames: &'s PageMap<'a>,
}

impl fmt::Display for OrderLine<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.list.order())?;
        self.list
            .iter(self.frames)
            .try_for_each(|pfn| write!(f, " {:x}", pfn))
    }
}
