//! Page frame numbers and the per-page records the allocator links
//! its free lists through.

use bitflags::bitflags;
use core::fmt;

/// A page frame number, the index of a physical page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pfn(usize);

impl Pfn {
    /// Create a new page frame number.
    #[inline]
    pub const fn new(pfn: usize) -> Self {
        Self(pfn)
    }

    /// Return the raw page frame number.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Return the page frame that is `pages` pages after this one.
    #[inline]
    pub fn add(self, pages: usize) -> Self {
        Self(self.0 + pages)
    }

    /// Checked version of [`Pfn::add`].
    #[inline]
    pub fn checked_add(self, pages: usize) -> Option<Self> {
        self.0.checked_add(pages).map(Self)
    }
}

impl fmt::Display for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

bitflags! {
    /// State of a page frame.
    ///
    /// Only the first page of a block carries the state of the whole block.
    pub struct PageFlags: u8 {
        /// The page is the head of a block inside a free list.
        const FREE = 1 << 0;
        /// The page is the head of a block that is owned by a caller.
        const ALLOCATED = 1 << 1;
        /// The page was reserved and will never be handed out.
        const RESERVED = 1 << 2;
    }
}

/// The record that exists for every physical page.
///
/// While the page heads a free block, `next_free` links it to the next
/// block in the same free list.
#[derive(Debug, Clone, Copy)]
pub struct PageFrame {
    flags: PageFlags,
    order: u8,
    next_free: Option<Pfn>,
}

impl PageFrame {
    /// Create a new, empty page record.
    pub const fn new() -> Self {
        Self {
            flags: PageFlags::empty(),
            order: 0,
            next_free: None,
        }
    }

    /// Return the state flags of this page.
    pub fn flags(&self) -> PageFlags {
        self.flags
    }

    /// Return the order of the block this page is the head of.
    ///
    /// Returns `None` if this page doesn't head a free or allocated block.
    pub fn order(&self) -> Option<usize> {
        if self.flags.intersects(PageFlags::FREE | PageFlags::ALLOCATED) {
            Some(self.order as usize)
        } else {
            None
        }
    }

    /// Check if this page is the head of a free block of the given order.
    #[inline]
    pub fn is_free_head(&self, order: usize) -> bool {
        self.flags.contains(PageFlags::FREE) && self.order as usize == order
    }

    pub(crate) fn next_free(&self) -> Option<Pfn> {
        self.next_free
    }

    pub(crate) fn set_next_free(&mut self, next: Option<Pfn>) {
        self.next_free = next;
    }

    pub(crate) fn mark_free(&mut self, order: usize) {
        self.flags = PageFlags::FREE;
        self.order = order as u8;
    }

    pub(crate) fn clear_free(&mut self) {
        self.flags.remove(PageFlags::FREE);
        self.next_free = None;
    }

    pub(crate) fn mark_allocated(&mut self, order: usize) {
        self.flags = PageFlags::ALLOCATED;
        self.order = order as u8;
    }

    pub(crate) fn clear_allocated(&mut self) {
        self.flags.remove(PageFlags::ALLOCATED);
    }

    pub(crate) fn mark_reserved(&mut self) {
        self.flags = PageFlags::RESERVED;
        self.order = 0;
    }
}

impl Default for PageFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// The mapping between page frame numbers and their [records](PageFrame).
///
/// The record for page `base + i` lives at index `i` of the backing slice.
pub struct PageMap<'a> {
    base: Pfn,
    frames: Option<&'a mut [PageFrame]>,
}

impl<'a> PageMap<'a> {
    /// Create a map that doesn't contain any page.
    pub const fn empty() -> Self {
        Self {
            base: Pfn::new(0),
            frames: None,
        }
    }

    /// Create a map where `frames[i]` is the record for page `base + i`.
    pub fn new(frames: &'a mut [PageFrame], base: Pfn) -> Self {
        Self {
            base,
            frames: Some(frames),
        }
    }

    /// The first page frame number inside this map.
    pub fn base(&self) -> Pfn {
        self.base
    }

    /// The number of page records inside this map.
    pub fn len(&self) -> usize {
        self.frames.as_deref().map_or(0, <[PageFrame]>::len)
    }

    /// Check if this map doesn't contain any page.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if every page of `pfn..pfn + pages` has a record inside this map.
    pub fn covers(&self, pfn: Pfn, pages: usize) -> bool {
        match pfn.as_usize().checked_sub(self.base.as_usize()) {
            Some(idx) => idx
                .checked_add(pages)
                .map_or(false, |end| end <= self.len()),
            None => false,
        }
    }

    /// Return the record for the given page, if it is part of this map.
    pub fn get(&self, pfn: Pfn) -> Option<&PageFrame> {
        let idx = pfn.as_usize().checked_sub(self.base.as_usize())?;
        self.frames.as_deref()?.get(idx)
    }

    /// Return the mutable record for the given page, if it is part of this map.
    pub fn get_mut(&mut self, pfn: Pfn) -> Option<&mut PageFrame> {
        let idx = pfn.as_usize().checked_sub(self.base.as_usize())?;
        self.frames.as_deref_mut()?.get_mut(idx)
    }

    /// Return all records inside this map.
    pub(crate) fn frames(&self) -> &[PageFrame] {
        self.frames.as_deref().unwrap_or(&[])
    }

    /// Return the record for a page that the free lists reference.
    ///
    /// # Panics
    ///
    /// A missing record means that the free list metadata is corrupt.
    pub(crate) fn frame(&self, pfn: Pfn) -> &PageFrame {
        match self.get(pfn) {
            Some(frame) => frame,
            None => panic!("page {} has no page record", pfn),
        }
    }

    /// Mutable version of [`PageMap::frame`].
    pub(crate) fn frame_mut(&mut self, pfn: Pfn) -> &mut PageFrame {
        match self.get_mut(pfn) {
            Some(frame) => frame,
            None => panic!("page {} has no page record", pfn),
        }
    }

    /// Reset every record to the empty state.
    pub(crate) fn reset(&mut self) {
        if let Some(frames) = self.frames.as_deref_mut() {
            frames.iter_mut().for_each(|frame| *frame = PageFrame::new());
        }
    }
}

impl fmt::Debug for PageMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageMap")
            .field("base", &self.base)
            .field("len", &self.len())
            .finish()
    }
}
