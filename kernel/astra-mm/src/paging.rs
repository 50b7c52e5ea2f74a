//! Two-level x86 paging: page directory, page tables, and directory
//! cloning.
//!
//! Grounded on §4.1: `get_page(addr, make, dir)` walks the directory to the
//! PTE for `addr`, optionally allocating a page table on the way; `alloc_frame`
//! assigns a fresh physical frame to a PTE; `clone_directory` produces a new
//! directory that aliases `kernel_dir`'s tables by pointer and deep-copies
//! every other table page-by-page — a page-for-page copy, not true
//! copy-on-write (a named Non-goal).

use astra_core::addr::{PhysAddr, VirtAddr};
use astra_core::config::PAGE_TABLE_ENTRIES;
use astra_core::errno::Errno;

use crate::frame::{FrameAllocator, FrameError};

/// Errors from paging operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    /// The underlying frame allocator is exhausted.
    NoFreeFrames,
    /// `get_page` was asked to resolve a PTE without `make` and no page
    /// table is present at that address.
    NoPageTable,
}

impl PagingError {
    /// Maps to the nearest POSIX errno.
    #[must_use]
    pub const fn to_errno(self) -> Errno {
        match self {
            Self::NoFreeFrames => Errno::Enomem,
            Self::NoPageTable => Errno::Efault,
        }
    }
}

impl From<FrameError> for PagingError {
    fn from(_: FrameError) -> Self {
        Self::NoFreeFrames
    }
}

bitflags::bitflags! {
    /// Page table / directory entry permission bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        /// Entry maps a present frame.
        const PRESENT = 1 << 0;
        /// Writable (otherwise read-only).
        const WRITABLE = 1 << 1;
        /// Accessible from ring 3 (otherwise supervisor-only).
        const USER = 1 << 2;
        /// Not flushed from the TLB on a directory switch (used for shared
        /// kernel mappings).
        const GLOBAL = 1 << 8;
    }
}

/// A single page-table entry: a frame address plus permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    frame: Option<PhysAddr>,
    flags: PteFlags,
}

impl PageTableEntry {
    const fn empty() -> Self {
        Self {
            frame: None,
            flags: PteFlags::empty(),
        }
    }

    /// Whether this entry currently maps a frame.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.frame.is_some()
    }

    /// The mapped frame, if present.
    #[must_use]
    pub const fn frame(&self) -> Option<PhysAddr> {
        self.frame
    }

    /// The entry's permission flags.
    #[must_use]
    pub const fn flags(&self) -> PteFlags {
        self.flags
    }
}

/// One 1024-entry page table.
#[derive(Clone)]
pub struct PageTable {
    entries: alloc::boxed::Box<[PageTableEntry; PAGE_TABLE_ENTRIES]>,
}

impl PageTable {
    fn new() -> Self {
        Self {
            entries: alloc::boxed::Box::new([PageTableEntry::empty(); PAGE_TABLE_ENTRIES]),
        }
    }
}

/// A page directory: 1024 slots, each either empty, pointing at a privately
/// owned [`PageTable`], or sharing one by reference count with another
/// directory (the kernel's own tables, aliased into every address space).
pub struct PageDirectory {
    tables: alloc::vec::Vec<Option<alloc::sync::Arc<astra_core::sync::SpinLock<PageTable>>>>,
}

impl PageDirectory {
    /// Creates an empty page directory with no tables mapped.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: (0..PAGE_TABLE_ENTRIES).map(|_| None).collect(),
        }
    }

    fn table_index(addr: VirtAddr) -> usize {
        (addr.as_u32() as usize / astra_core::config::PAGE_SIZE / PAGE_TABLE_ENTRIES)
            % PAGE_TABLE_ENTRIES
    }

    fn page_index(addr: VirtAddr) -> usize {
        (addr.as_u32() as usize / astra_core::config::PAGE_SIZE) % PAGE_TABLE_ENTRIES
    }

    /// Returns the PTE for `addr`, creating a fresh page table first if
    /// `make` is set and none exists yet. Mirrors `get_page`.
    pub fn get_page(
        &mut self,
        addr: VirtAddr,
        make: bool,
    ) -> Result<Option<PageTableEntry>, PagingError> {
        let ti = Self::table_index(addr);
        if self.tables[ti].is_none() {
            if !make {
                return Ok(None);
            }
            self.tables[ti] = Some(alloc::sync::Arc::new(astra_core::sync::SpinLock::new(
                PageTable::new(),
            )));
        }
        let table = self.tables[ti].as_ref().unwrap();
        let pi = Self::page_index(addr);
        Ok(Some(table.lock().entries[pi]))
    }

    /// Assigns a fresh frame to the page backing `addr`, allocating a page
    /// table on demand. Sets PRESENT plus the caller's requested
    /// permissions. Mirrors `alloc_frame(page, kernel, rw, global)`.
    pub fn alloc_frame(
        &mut self,
        addr: VirtAddr,
        frames: &FrameAllocator<'_>,
        user: bool,
        writable: bool,
        global: bool,
    ) -> Result<PhysAddr, PagingError> {
        let ti = Self::table_index(addr);
        if self.tables[ti].is_none() {
            self.tables[ti] = Some(alloc::sync::Arc::new(astra_core::sync::SpinLock::new(
                PageTable::new(),
            )));
        }
        let table = self.tables[ti].as_ref().unwrap().clone();
        let pi = Self::page_index(addr);

        let mut guard = table.lock();
        if guard.entries[pi].is_present() {
            return Ok(guard.entries[pi].frame().unwrap());
        }
        let frame = frames.alloc_frame()?;
        let mut flags = PteFlags::PRESENT;
        if writable {
            flags |= PteFlags::WRITABLE;
        }
        if user {
            flags |= PteFlags::USER;
        }
        if global {
            flags |= PteFlags::GLOBAL;
        }
        guard.entries[pi] = PageTableEntry {
            frame: Some(frame),
            flags,
        };
        Ok(frame)
    }

    /// Clears the PTE backing `addr` and returns the frame it held, if any.
    /// The caller is responsible for returning the frame to the allocator —
    /// mirrors `free_frame`, which does not itself call the frame
    /// deallocator.
    pub fn free_frame(&mut self, addr: VirtAddr) -> Option<PhysAddr> {
        let ti = Self::table_index(addr);
        let table = self.tables[ti].as_ref()?;
        let pi = Self::page_index(addr);
        let mut guard = table.lock();
        let frame = guard.entries[pi].frame();
        guard.entries[pi] = PageTableEntry::empty();
        frame
    }

    /// Marks table slot `index` as aliasing `other`'s table at the same
    /// slot, by `Arc` clone rather than copy. Used to share the kernel's
    /// upper-half tables across every address space.
    fn alias_table(&mut self, index: usize, other: &PageDirectory) {
        self.tables[index] = other.tables[index].clone();
    }

    /// Produces a new directory that aliases `kernel_dir`'s tables by
    /// pointer (shared `Arc`) and deep-copies every other table page for
    /// page. Not copy-on-write: every private table's frames are
    /// immediately duplicated, per §4.1's explicit Non-goal.
    pub fn clone_directory(
        &self,
        kernel_dir: &PageDirectory,
        frames: &FrameAllocator<'_>,
        copy_frame: impl Fn(PhysAddr, PhysAddr, &FrameAllocator<'_>),
    ) -> Result<PageDirectory, PagingError> {
        let mut new_dir = PageDirectory::new();
        for i in 0..PAGE_TABLE_ENTRIES {
            let Some(table) = &self.tables[i] else {
                continue;
            };
            if is_same_table(table, kernel_dir.tables[i].as_ref()) {
                new_dir.alias_table(i, kernel_dir);
                continue;
            }
            let src = table.lock();
            let mut dst = PageTable::new();
            for (pi, entry) in src.entries.iter().enumerate() {
                if !entry.is_present() {
                    continue;
                }
                let new_frame = frames.alloc_frame()?;
                copy_frame(entry.frame().unwrap(), new_frame, frames);
                dst.entries[pi] = PageTableEntry {
                    frame: Some(new_frame),
                    flags: entry.flags(),
                };
            }
            new_dir.tables[i] = Some(alloc::sync::Arc::new(astra_core::sync::SpinLock::new(dst)));
        }
        Ok(new_dir)
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn is_same_table(
    a: &alloc::sync::Arc<astra_core::sync::SpinLock<PageTable>>,
    b: Option<&alloc::sync::Arc<astra_core::sync::SpinLock<PageTable>>>,
) -> bool {
    match b {
        Some(b) => alloc::sync::Arc::ptr_eq(a, b),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(words: &mut [u64], total: usize) -> FrameAllocator<'_> {
        FrameAllocator::new(words, total, &[])
    }

    #[test]
    fn alloc_frame_maps_a_present_page() {
        let mut words = [0u64; 16];
        let frames = frames(&mut words, 1000);
        let mut dir = PageDirectory::new();
        let addr = VirtAddr::new(0x1000);
        let frame = dir.alloc_frame(addr, &frames, false, true, false).unwrap();
        let pte = dir.get_page(addr, false).unwrap().unwrap();
        assert!(pte.is_present());
        assert_eq!(pte.frame(), Some(frame));
        assert!(pte.flags().contains(PteFlags::WRITABLE));
    }

    #[test]
    fn get_page_without_make_returns_none_when_absent() {
        let mut dir = PageDirectory::new();
        assert!(dir.get_page(VirtAddr::new(0x5000), false).unwrap().is_none());
    }

    #[test]
    fn free_frame_clears_entry_and_returns_old_frame() {
        let mut words = [0u64; 16];
        let frames = frames(&mut words, 1000);
        let mut dir = PageDirectory::new();
        let addr = VirtAddr::new(0x2000);
        let frame = dir.alloc_frame(addr, &frames, false, true, false).unwrap();
        let freed = dir.free_frame(addr);
        assert_eq!(freed, Some(frame));
        assert!(!dir.get_page(addr, false).unwrap().unwrap().is_present());
    }

    #[test]
    fn clone_directory_aliases_kernel_tables() {
        let mut words = [0u64; 16];
        let frames = frames(&mut words, 1000);
        let mut kernel_dir = PageDirectory::new();
        kernel_dir
            .alloc_frame(VirtAddr::new(0xC000_0000), &frames, false, true, true)
            .unwrap();

        let mut user_dir = PageDirectory::new();
        user_dir.alias_table(PageDirectory::table_index(VirtAddr::new(0xC000_0000)), &kernel_dir);

        let cloned = user_dir
            .clone_directory(&kernel_dir, &frames, |_src, _dst, _frames| {})
            .unwrap();
        let ti = PageDirectory::table_index(VirtAddr::new(0xC000_0000));
        assert!(is_same_table(
            cloned.tables[ti].as_ref().unwrap(),
            kernel_dir.tables[ti].as_ref(),
        ));
    }

    #[test]
    fn clone_directory_deep_copies_private_tables() {
        let mut words = [0u64; 16];
        let frames = frames(&mut words, 1000);
        let kernel_dir = PageDirectory::new();

        let mut user_dir = PageDirectory::new();
        let orig_frame = user_dir
            .alloc_frame(VirtAddr::new(0x1000), &frames, true, true, false)
            .unwrap();

        let cloned = user_dir
            .clone_directory(&kernel_dir, &frames, |_src, _dst, _frames| {})
            .unwrap();

        let cloned_pte = cloned.get_page(VirtAddr::new(0x1000), false).unwrap().unwrap();
        assert!(cloned_pte.is_present());
        assert_ne!(cloned_pte.frame(), Some(orig_frame), "must be a distinct frame, not aliased");
    }
}
