//! Index based free lists of the buddy allocator.
//!
//! Each list is singly linked through the `next_free` field of the
//! [page records](PageFrame) of the blocks it contains, and is kept
//! sorted by ascending page frame number.

use crate::{
    order::is_aligned,
    page::{PageFrame, PageMap, Pfn},
};

/// A free list holding blocks of a single order.
#[derive(Debug, Clone, Copy)]
pub struct FreeList {
    head: Option<Pfn>,
    order: usize,
    len: usize,
}

impl FreeList {
    /// Create a new, empty list for blocks of the given order.
    pub const fn new(order: usize) -> Self {
        Self {
            head: None,
            order,
            len: 0,
        }
    }

    /// The order of the blocks inside this list.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Returns whether this list is empty.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// The number of blocks inside this list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// The block with the lowest address inside this list.
    pub fn first(&self) -> Option<Pfn> {
        self.head
    }

    /// Check if the block at `head` is a member of this list.
    ///
    /// This consults the state of the page record, which is always updated
    /// together with the list links, so it doesn't need to walk the list.
    pub fn contains(&self, frames: &PageMap<'_>, head: Pfn) -> bool {
        frames
            .get(head)
            .map_or(false, |frame| frame.is_free_head(self.order))
    }

    /// Insert the block at `head` into this list, keeping the list sorted.
    ///
    /// The caller must guarantee that the block doesn't overlap any block
    /// that is already inside this list.
    ///
    /// # Panics
    ///
    /// If `head` is not aligned for the order of this list, or is already
    /// part of this list.
    pub fn insert(&mut self, frames: &mut PageMap<'_>, head: Pfn) {
        assert!(
            is_aligned(head, self.order),
            "block {} is misaligned for order {}",
            head,
            self.order
        );

        // find the last block with a lower address than `head`
        let mut prev = None;
        let mut next = self.head;
        while let Some(pfn) = next {
            if pfn > head {
                break;
            }

            assert_ne!(
                pfn, head,
                "block {} is already in the free list of order {}",
                head, self.order
            );
            prev = Some(pfn);
            next = frames.frame(pfn).next_free();
        }

        let frame = frames.frame_mut(head);
        frame.mark_free(self.order);
        frame.set_next_free(next);

        match prev {
            Some(prev) => frames.frame_mut(prev).set_next_free(Some(head)),
            None => self.head = Some(head),
        }
        self.len += 1;
    }

    /// Unlink the block at `head` from this list.
    ///
    /// # Panics
    ///
    /// If the block is not part of this list, which means that the
    /// free list metadata is corrupt.
    pub fn remove(&mut self, frames: &mut PageMap<'_>, head: Pfn) {
        let mut prev = None;
        let mut cur = self.head;
        while let Some(pfn) = cur {
            if pfn == head {
                break;
            }
            prev = Some(pfn);
            cur = frames.frame(pfn).next_free();
        }

        if cur != Some(head) {
            panic!(
                "block {} is not in the free list of order {}",
                head, self.order
            );
        }

        let frame = frames.frame_mut(head);
        let next = frame.next_free();
        frame.clear_free();

        match prev {
            Some(prev) => frames.frame_mut(prev).set_next_free(next),
            None => self.head = next,
        }
        self.len -= 1;
    }

    /// Returns an iterator over the heads of all blocks inside this list,
    /// in ascending order.
    pub fn iter<'list>(&self, frames: &'list PageMap<'_>) -> Iter<'list> {
        Iter {
            next: self.head,
            frames: frames.frames(),
            base: frames.base(),
        }
    }
}

/// Iterator over the blocks of a [`FreeList`].
pub struct Iter<'list> {
    next: Option<Pfn>,
    frames: &'list [PageFrame],
    base: Pfn,
}

impl Iterator for Iter<'_> {
    type Item = Pfn;

    fn next(&mut self) -> Option<Self::Item> {
        let pfn = self.next?;
        self.next = self
            .frames
            .get(pfn.as_usize() - self.base.as_usize())
            .and_then(PageFrame::next_free);
        Some(pfn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &FreeList, frames: &PageMap<'_>) -> Vec<usize> {
        list.iter(frames).map(Pfn::as_usize).collect()
    }

    #[test]
    fn insert_keeps_ascending_order() {
        let mut frames = [PageFrame::new(); 16];
        let mut map = PageMap::new(&mut frames, Pfn::new(0));
        let mut list = FreeList::new(1);

        for pfn in [8, 2, 14, 0, 6].iter() {
            list.insert(&mut map, Pfn::new(*pfn));
        }

        assert_eq!(collect(&list, &map), [0, 2, 6, 8, 14]);
        assert_eq!(list.len(), 5);
        assert!(list.contains(&map, Pfn::new(6)));
        assert!(!list.contains(&map, Pfn::new(4)));
    }

    #[test]
    fn remove_unlinks_exact_match() {
        let mut frames = [PageFrame::new(); 16];
        let mut map = PageMap::new(&mut frames, Pfn::new(0));
        let mut list = FreeList::new(2);

        for pfn in [0, 4, 8, 12].iter() {
            list.insert(&mut map, Pfn::new(*pfn));
        }

        list.remove(&mut map, Pfn::new(8));
        list.remove(&mut map, Pfn::new(0));
        assert_eq!(collect(&list, &map), [4, 12]);
        assert!(!list.contains(&map, Pfn::new(8)));

        assert_eq!(list.first(), Some(Pfn::new(4)));

        list.remove(&mut map, Pfn::new(4));
        list.remove(&mut map, Pfn::new(12));
        assert_eq!(list.first(), None);
        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
    }

    #[test]
    #[should_panic(expected = "is not in the free list")]
    fn removing_absent_block_is_fatal() {
        let mut frames = [PageFrame::new(); 4];
        let mut map = PageMap::new(&mut frames, Pfn::new(0));
        let mut list = FreeList::new(0);

        list.insert(&mut map, Pfn::new(1));
        list.remove(&mut map, Pfn::new(2));
    }

    #[test]
    #[should_panic(expected = "misaligned")]
    fn inserting_misaligned_block_is_fatal() {
        let mut frames = [PageFrame::new(); 4];
        let mut map = PageMap::new(&mut frames, Pfn::new(0));
        FreeList::new(1).insert(&mut map, Pfn::new(1));
    }
}
