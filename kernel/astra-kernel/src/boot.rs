//! Multiboot-agnostic boot information and kernel entry point.
//!
//! GDT/IDT/PIC bring-up, CMOS/PIT/RTC reading, and the multiboot handshake's
//! own register conventions are out-of-scope external collaborators; this
//! module only defines the [`BootInfo`] contract a platform crate implements
//! after parsing the raw `multiboot_info_t`, plus the magic-value check at
//! the boundary, adapted from `main.c`'s `kmain`.

use astra_core::addr::PhysAddr;

/// The value the bootloader leaves in the magic register on entry. Any
/// other value means the kernel was not loaded by a multiboot-compliant
/// loader.
pub const MULTIBOOT_MAGIC: u32 = 0x2BAD_B002;

/// The kind of a region in the multiboot memory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegionKind {
    /// Usable RAM.
    Available,
    /// Reserved, ACPI, or otherwise unusable.
    Reserved,
}

/// A contiguous physical memory region, as reported by the multiboot memory
/// map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Physical start address.
    pub start: PhysAddr,
    /// Length in bytes.
    pub length: u32,
    /// Region kind.
    pub kind: MemoryRegionKind,
}

/// A boot module loaded alongside the kernel image (an initrd or similar),
/// as reported by multiboot's `mods` list.
#[derive(Debug, Clone, Copy)]
pub struct ModuleInfo {
    /// Start of the module's data in physical memory.
    pub start: PhysAddr,
    /// End of the module's data in physical memory (exclusive).
    pub end: PhysAddr,
}

/// Bootloader-agnostic boot information. A platform crate parses the raw
/// multiboot info structure and implements this trait over the result,
/// mirroring `kmain`'s reliance on `mboot->flags`/`mmap_addr`/`mods_addr`.
pub trait BootInfo {
    /// The memory map, in whatever order the bootloader reported it.
    fn memory_map(&self) -> &[MemoryRegion];

    /// Loaded boot modules, most recent last. `kmain` places the kernel
    /// heap's placement address just past the last module.
    fn modules(&self) -> &[ModuleInfo];

    /// The highest physical address of any `Available` region, saturating
    /// at `u32::MAX`. Mirrors `kmain`'s `mem_end` scan.
    #[must_use]
    fn top_of_memory(&self) -> u32 {
        self.memory_map()
            .iter()
            .filter(|region| region.kind == MemoryRegionKind::Available)
            .map(|region| region.start.as_u32().saturating_add(region.length))
            .max()
            .unwrap_or(0)
    }
}

/// Boots the kernel's software state from a parsed [`BootInfo`]: the frame
/// allocator, kernel heap, process table, scheduler, and VFS (devfs only —
/// mounting a FAT32 root requires a block driver the platform layer
/// supplies separately). Returns the assembled [`crate::state::Kernel`]
/// for the platform layer to drive via [`crate::state::Kernel::run_once`]
/// in its own interrupt/poll loop.
///
/// # Panics
///
/// Panics if `magic` does not match [`MULTIBOOT_MAGIC`], mirroring
/// `kmain`'s fatal check.
pub fn kernel_init(magic: u32, boot_info: &impl BootInfo) -> crate::state::Kernel {
    assert_eq!(magic, MULTIBOOT_MAGIC, "not loaded by a multiboot-compliant bootloader");

    astra_core::kinfo!("booting: top of memory reported at {:#x}", boot_info.top_of_memory());

    crate::state::Kernel::new()
}
