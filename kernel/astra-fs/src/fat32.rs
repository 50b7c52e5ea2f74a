//! FAT32 driver interface contract.
//!
//! The FAT32 on-disk format is named an out-of-scope external collaborator:
//! this module provides only the pluggable-driver shape a platform crate
//! would implement against — boot-sector/FAT-table parsing, cluster chain
//! walking, and directory-entry (8.3 and long-name) decoding are not
//! reproduced here. [`Fat32Driver`] wires that future implementation into
//! [`crate::vfs::Vfs::mount`] via [`crate::vfs::FsDriver`].

use alloc::sync::Arc;

use crate::block::BlockDevice;
use crate::error::FsError;
use crate::inode::FileSystem;
use crate::vfs::{FsDriver, MountFlags};

/// Parses a FAT32 volume's boot sector and produces a mounted
/// [`FileSystem`]. A real implementation reads the BPB (bytes-per-sector,
/// sectors-per-cluster, reserved-sector count, FAT count/size, root
/// cluster), validates the `0x28`/`0x29` extended-boot-signature byte, and
/// builds a cluster-chain walker over the backing device; none of that is
/// provided here.
pub trait Fat32Volume {
    /// Parses `device`'s boot sector, returning a mounted filesystem, or
    /// [`FsError::CorruptFilesystem`] if the BPB signature doesn't check
    /// out.
    fn parse(&self, device: Arc<dyn BlockDevice>) -> Result<Arc<dyn FileSystem>, FsError>;
}

/// An [`FsDriver`] that delegates actual volume parsing to a
/// platform-supplied [`Fat32Volume`] implementation. Registering this under
/// `"fat32"` with [`crate::vfs::Vfs::register_driver`] is what makes
/// `mount(dev, path, "fat32", ...)` work; without a `Fat32Volume` plugged
/// in, every mount attempt fails closed with [`FsError::NotSupported`].
pub struct Fat32Driver {
    volume: Option<Arc<dyn Fat32Volume>>,
}

impl Fat32Driver {
    /// A driver with no backing implementation plugged in yet. Mounting
    /// against it always fails with [`FsError::NotSupported`] — the
    /// documented state until a platform crate supplies one via
    /// [`Self::with_volume`].
    #[must_use]
    pub const fn unimplemented() -> Self {
        Self { volume: None }
    }

    /// A driver that delegates to the given on-disk format implementation.
    #[must_use]
    pub fn with_volume(volume: Arc<dyn Fat32Volume>) -> Self {
        Self { volume: Some(volume) }
    }
}

impl Default for Fat32Driver {
    fn default() -> Self {
        Self::unimplemented()
    }
}

impl FsDriver for Fat32Driver {
    fn requires_device(&self) -> bool {
        true
    }

    fn get_super(
        &self,
        device: Option<Arc<dyn BlockDevice>>,
        _flags: MountFlags,
    ) -> Result<Arc<dyn FileSystem>, FsError> {
        let device = device.ok_or(FsError::NoSuchDevice)?;
        let volume = self.volume.as_ref().ok_or(FsError::NotSupported)?;
        volume.parse(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unimplemented_driver_rejects_every_mount() {
        let driver = Fat32Driver::unimplemented();
        struct Fake;
        impl BlockDevice for Fake {
            fn sector_size(&self) -> u32 {
                512
            }
            fn sector_count(&self) -> u64 {
                0
            }
            fn queue(&self) -> &crate::block::RequestQueue {
                unimplemented!("not exercised by this test")
            }
            fn read_sector_sync(&self, _sector: u64, _buf: &mut [u8]) -> Result<(), FsError> {
                Ok(())
            }
        }
        let result = driver.get_super(Some(Arc::new(Fake)), MountFlags::empty());
        assert_eq!(result.err(), Some(FsError::NotSupported));
    }

    #[test]
    fn driver_without_device_reports_no_such_device() {
        let driver = Fat32Driver::unimplemented();
        assert_eq!(
            driver.get_super(None, MountFlags::empty()).err(),
            Some(FsError::NoSuchDevice)
        );
    }
}
