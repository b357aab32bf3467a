//! Address arithmetic for block orders.
//!
//! A block of order `o` spans `2^o` pages and always starts at a page frame
//! number that is a multiple of `2^o`.

use crate::page::Pfn;

/// The number of orders managed by the buddy allocator.
///
/// Valid orders are `0..MAX_ORDER`, so the largest block spans
/// `2^(MAX_ORDER - 1)` pages.
pub const MAX_ORDER: usize = 17;

/// The largest order a block can have.
pub const TOP_ORDER: usize = MAX_ORDER - 1;

/// Calculates the number of pages inside a block of the given order.
#[inline]
pub const fn pages_for_order(order: usize) -> usize {
    1 << order
}

/// Calculates the size in bytes of a block with the given order.
#[inline]
pub const fn size_for_order(order: usize) -> usize {
    pages_for_order(order) * crate::PAGE_SIZE
}

/// Calculates the first order where `count` pages would fit in.
///
/// This function may return an order that is larger than [`TOP_ORDER`].
pub fn order_for_pages(count: usize) -> usize {
    let count = core::cmp::max(count, 1);
    match count.checked_next_power_of_two() {
        Some(pow) => pow.trailing_zeros() as usize,
        None => usize::BITS as usize,
    }
}

/// Check if the given page frame is correctly aligned to start
/// a block of the given order.
#[inline]
pub fn is_aligned(pfn: Pfn, order: usize) -> bool {
    pfn.as_usize() & (pages_for_order(order) - 1) == 0
}

/// Calculate the page frame number of the other buddy for the given block.
///
/// Blocks of the [top order](TOP_ORDER) have no buddy, and neither have
/// blocks that are not aligned for their order.
pub fn buddy_of(head: Pfn, order: usize) -> Option<Pfn> {
    if order >= TOP_ORDER || !is_aligned(head, order) {
        return None;
    }

    // the addresses of two buddies only differ in the bit of their order
    Some(Pfn::new(head.as_usize() ^ pages_for_order(order)))
}

/// Check if the block with the given `head` and `order` covers `pfn`.
#[inline]
pub fn block_contains(head: Pfn, order: usize, pfn: Pfn) -> bool {
    pfn >= head && pfn.as_usize() - head.as_usize() < pages_for_order(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert!(is_aligned(Pfn::new(0), TOP_ORDER));
        assert!(is_aligned(Pfn::new(8), 3));
        assert!(!is_aligned(Pfn::new(8), 4));
        assert!(is_aligned(Pfn::new(7), 0));
    }

    #[test]
    fn buddies_are_an_involution() {
        for order in 0..TOP_ORDER {
            let head = Pfn::new(pages_for_order(order) * 6);
            let buddy = buddy_of(head, order).unwrap();
            assert_eq!(buddy.as_usize(), head.as_usize() + pages_for_order(order));
            assert_eq!(buddy_of(buddy, order), Some(head));
        }
    }

    #[test]
    fn no_buddy_at_top_or_when_misaligned() {
        assert_eq!(buddy_of(Pfn::new(0), TOP_ORDER), None);
        assert_eq!(buddy_of(Pfn::new(3), 1), None);
    }

    #[test]
    fn block_sizes() {
        assert_eq!(size_for_order(0), crate::PAGE_SIZE);
        assert_eq!(size_for_order(3), 32 * crate::unit::KIB);
        assert_eq!(size_for_order(TOP_ORDER), 256 * crate::unit::MIB);
    }

    #[test]
    fn order_for_page_counts() {
        assert_eq!(order_for_pages(0), 0);
        assert_eq!(order_for_pages(1), 0);
        assert_eq!(order_for_pages(2), 1);
        assert_eq!(order_for_pages(3), 2);
        assert_eq!(order_for_pages(1 << 16), 16);
        assert_eq!(order_for_pages((1 << 16) + 1), 17);
    }

    #[test]
    fn containment() {
        let head = Pfn::new(16);
        assert!(block_contains(head, 2, Pfn::new(16)));
        assert!(block_contains(head, 2, Pfn::new(19)));
        assert!(!block_contains(head, 2, Pfn::new(20)));
        assert!(!block_contains(head, 2, Pfn::new(15)));
    }
}
