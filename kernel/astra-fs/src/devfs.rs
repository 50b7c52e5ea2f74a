//! `/dev`: an in-memory filesystem exposing device nodes.
//!
//! Grounded on the teacher's `devfs.rs` for the synthetic `/dev/null` and
//! `/dev/zero` nodes and the directory-as-`BTreeMap` root shape; extended per
//! §4.7 with char-device dispatch through a major-indexed driver table and
//! block-device nodes that route through the bounce-buffer path of §4.6.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;

use astra_core::config::MAX_DEVICE_MAJORS;
use astra_core::sync::SpinLock;

use crate::block::{self, BlockDevice, BlockDriverRegistry};
use crate::error::FsError;
use crate::inode::{DeviceNumber, DirEntry, FileSystem, FsFuture, Inode, InodeType, Permissions};

/// A character device backing a devfs node. Dispatch target for reads and
/// writes on a [`InodeType::CharDevice`] inode.
pub trait CharDevice {
    /// Reads into `buf`, returning the count actually read.
    fn read<'a>(&'a self, offset: usize, buf: &'a mut [u8]) -> FsFuture<'a, usize>;
    /// Writes from `buf`, returning the count actually written.
    fn write<'a>(&'a self, offset: usize, buf: &'a [u8]) -> FsFuture<'a, usize>;
}

/// The major-indexed character-driver table, mirroring
/// [`crate::block::BlockDriverRegistry`]'s shape but for char devices.
pub struct CharDriverRegistry {
    slots: SpinLock<[Option<(&'static str, Arc<dyn CharDevice>)>; MAX_DEVICE_MAJORS]>,
}

impl CharDriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { slots: SpinLock::new(core::array::from_fn(|_| None)) }
    }

    /// Registers `driver` under `major`, or the first free major if `major
    /// == 0`.
    pub fn register(
        &self,
        major: u8,
        name: &'static str,
        driver: Arc<dyn CharDevice>,
    ) -> Result<u8, FsError> {
        let mut slots = self.slots.lock();
        let assigned = if major == 0 {
            (1..=u8::MAX)
                .find(|&candidate| slots[candidate as usize - 1].is_none())
                .ok_or(FsError::NoSuchDevice)?
        } else {
            major
        };
        let slot = &mut slots[assigned as usize - 1];
        if slot.is_some() {
            return Err(FsError::Busy);
        }
        *slot = Some((name, driver));
        Ok(assigned)
    }

    fn get(&self, major: u8) -> Option<Arc<dyn CharDevice>> {
        if major == 0 {
            return None;
        }
        self.slots.lock()[major as usize - 1].as_ref().map(|(_, driver)| driver.clone())
    }
}

impl Default for CharDriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The devfs filesystem: a flat root directory of synthetic and device
/// nodes.
pub struct DevFs {
    root: Arc<DevFsDir>,
    char_registry: Arc<CharDriverRegistry>,
    block_registry: Arc<BlockDriverRegistry>,
}

impl Default for DevFs {
    fn default() -> Self {
        Self::new()
    }
}

impl DevFs {
    /// Creates a devfs with just the standard `null`/`zero` entries and a
    /// fresh pair of major-indexed driver tables.
    #[must_use]
    pub fn new() -> Self {
        let char_registry = Arc::new(CharDriverRegistry::new());
        let block_registry = Arc::new(BlockDriverRegistry::new());
        let mut entries: BTreeMap<String, Arc<dyn Inode>> = BTreeMap::new();
        entries.insert("null".to_string(), Arc::new(DevNull));
        entries.insert("zero".to_string(), Arc::new(DevZero));
        let root = Arc::new(DevFsDir {
            entries: SpinLock::new(entries),
            char_registry: char_registry.clone(),
            block_registry: block_registry.clone(),
        });
        Self { root, char_registry, block_registry }
    }

    /// Registers an additional device node (a real char or block device) at
    /// `/dev/<name>`.
    pub fn add_device(&self, name: &str, inode: Arc<dyn Inode>) {
        self.root.entries.lock().insert(name.to_string(), inode);
    }

    /// The major-indexed char driver table backing this instance's device
    /// nodes. Driver bring-up registers into this table so both
    /// `add_device`d and `mknod`-created char nodes dispatch correctly.
    #[must_use]
    pub fn char_registry(&self) -> &Arc<CharDriverRegistry> {
        &self.char_registry
    }

    /// The major-indexed block driver table backing this instance.
    #[must_use]
    pub fn block_registry(&self) -> &Arc<BlockDriverRegistry> {
        &self.block_registry
    }
}

impl FileSystem for DevFs {
    fn name(&self) -> &'static str {
        "devfs"
    }

    fn root(&self) -> Arc<dyn Inode> {
        self.root.clone()
    }
}

struct DevFsDir {
    entries: SpinLock<BTreeMap<String, Arc<dyn Inode>>>,
    char_registry: Arc<CharDriverRegistry>,
    block_registry: Arc<BlockDriverRegistry>,
}

impl Inode for DevFsDir {
    fn inode_type(&self) -> InodeType {
        InodeType::Directory
    }

    fn size(&self) -> usize {
        0
    }

    fn permissions(&self) -> Permissions {
        Permissions::read_only()
    }

    fn read<'a>(&'a self, _offset: usize, _buf: &'a mut [u8]) -> FsFuture<'a, usize> {
        Box::pin(async { Err(FsError::IsADirectory) })
    }

    fn write<'a>(&'a self, _offset: usize, _buf: &'a [u8]) -> FsFuture<'a, usize> {
        Box::pin(async { Err(FsError::IsADirectory) })
    }

    fn lookup<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn Inode>> {
        Box::pin(async move { self.entries.lock().get(name).cloned().ok_or(FsError::NotFound) })
    }

    fn readdir(&self) -> Pin<Box<dyn Future<Output = Result<Vec<DirEntry>, FsError>> + '_>> {
        Box::pin(async move {
            Ok(self
                .entries
                .lock()
                .iter()
                .map(|(name, inode)| DirEntry { name: name.clone(), inode_type: inode.inode_type() })
                .collect())
        })
    }

    fn create<'a>(
        &'a self,
        name: &'a str,
        itype: InodeType,
        perms: Permissions,
        device: Option<DeviceNumber>,
    ) -> FsFuture<'a, Arc<dyn Inode>> {
        Box::pin(async move {
            // §4.7: `create` accepts only directory, char-device, or
            // block-device modes; everything else (regular files, in
            // particular) has no devfs representation.
            let mut entries = self.entries.lock();
            if entries.contains_key(name) {
                return Err(FsError::AlreadyExists);
            }
            let inode: Arc<dyn Inode> = match itype {
                InodeType::Directory => Arc::new(DevFsDir {
                    entries: SpinLock::new(BTreeMap::new()),
                    char_registry: self.char_registry.clone(),
                    block_registry: self.block_registry.clone(),
                }),
                InodeType::CharDevice => {
                    let number = device.ok_or(FsError::InvalidArgument)?;
                    Arc::new(CharDeviceNode::new(number, self.char_registry.clone(), perms))
                }
                InodeType::BlockDevice => {
                    let number = device.ok_or(FsError::InvalidArgument)?;
                    let backing = self.block_registry.device_of(number.major()).ok_or(FsError::NoSuchDevice)?;
                    Arc::new(BlockDeviceNode::new(number, backing, perms))
                }
                _ => return Err(FsError::NotSupported),
            };
            entries.insert(name.to_string(), inode.clone());
            Ok(inode)
        })
    }

    fn unlink<'a>(&'a self, name: &'a str) -> Pin<Box<dyn Future<Output = Result<(), FsError>> + 'a>> {
        Box::pin(async move {
            self.entries.lock().remove(name).map(|_| ()).ok_or(FsError::NotFound)
        })
    }
}

// ── /dev/null ──────────────────────────────────────────────────────────

/// `/dev/null` — reads return EOF, writes are silently discarded.
pub struct DevNull;

impl Inode for DevNull {
    fn inode_type(&self) -> InodeType {
        InodeType::CharDevice
    }

    fn size(&self) -> usize {
        0
    }

    fn permissions(&self) -> Permissions {
        Permissions::read_write()
    }

    fn read<'a>(&'a self, _offset: usize, _buf: &'a mut [u8]) -> FsFuture<'a, usize> {
        Box::pin(async { Ok(0) })
    }

    fn write<'a>(&'a self, _offset: usize, buf: &'a [u8]) -> FsFuture<'a, usize> {
        Box::pin(async move { Ok(buf.len()) })
    }

    fn lookup<'a>(&'a self, _name: &'a str) -> FsFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn readdir(&self) -> Pin<Box<dyn Future<Output = Result<Vec<DirEntry>, FsError>> + '_>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn create<'a>(
        &'a self,
        _name: &'a str,
        _itype: InodeType,
        _perms: Permissions,
        _device: Option<DeviceNumber>,
    ) -> FsFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn unlink<'a>(&'a self, _name: &'a str) -> Pin<Box<dyn Future<Output = Result<(), FsError>> + 'a>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }
}

// ── /dev/zero ──────────────────────────────────────────────────────────

/// `/dev/zero` — reads fill the buffer with zeros, writes are discarded.
pub struct DevZero;

impl Inode for DevZero {
    fn inode_type(&self) -> InodeType {
        InodeType::CharDevice
    }

    fn size(&self) -> usize {
        0
    }

    fn permissions(&self) -> Permissions {
        Permissions::read_write()
    }

    fn read<'a>(&'a self, _offset: usize, buf: &'a mut [u8]) -> FsFuture<'a, usize> {
        Box::pin(async move {
            buf.fill(0);
            Ok(buf.len())
        })
    }

    fn write<'a>(&'a self, _offset: usize, buf: &'a [u8]) -> FsFuture<'a, usize> {
        Box::pin(async move { Ok(buf.len()) })
    }

    fn lookup<'a>(&'a self, _name: &'a str) -> FsFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn readdir(&self) -> Pin<Box<dyn Future<Output = Result<Vec<DirEntry>, FsError>> + '_>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn create<'a>(
        &'a self,
        _name: &'a str,
        _itype: InodeType,
        _perms: Permissions,
        _device: Option<DeviceNumber>,
    ) -> FsFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn unlink<'a>(&'a self, _name: &'a str) -> Pin<Box<dyn Future<Output = Result<(), FsError>> + 'a>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }
}

// ── registered char device node ──────────────────────────────────────────

/// A devfs node backed by an entry in a [`CharDriverRegistry`], dispatching
/// reads/writes through the major-indexed table rather than holding the
/// driver directly — any later re-registration under the same major is
/// picked up without recreating the node.
pub struct CharDeviceNode {
    number: DeviceNumber,
    registry: Arc<CharDriverRegistry>,
    perms: Permissions,
}

impl CharDeviceNode {
    /// Creates a node for `number`, dispatching through `registry`.
    #[must_use]
    pub fn new(number: DeviceNumber, registry: Arc<CharDriverRegistry>, perms: Permissions) -> Self {
        Self { number, registry, perms }
    }
}

impl Inode for CharDeviceNode {
    fn inode_type(&self) -> InodeType {
        InodeType::CharDevice
    }

    fn size(&self) -> usize {
        0
    }

    fn permissions(&self) -> Permissions {
        self.perms
    }

    fn device_number(&self) -> Option<DeviceNumber> {
        Some(self.number)
    }

    fn read<'a>(&'a self, offset: usize, buf: &'a mut [u8]) -> FsFuture<'a, usize> {
        Box::pin(async move {
            let driver = self.registry.get(self.number.major()).ok_or(FsError::NoSuchDevice)?;
            driver.read(offset, buf).await
        })
    }

    fn write<'a>(&'a self, offset: usize, buf: &'a [u8]) -> FsFuture<'a, usize> {
        Box::pin(async move {
            let driver = self.registry.get(self.number.major()).ok_or(FsError::NoSuchDevice)?;
            driver.write(offset, buf).await
        })
    }

    fn lookup<'a>(&'a self, _name: &'a str) -> FsFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn readdir(&self) -> Pin<Box<dyn Future<Output = Result<Vec<DirEntry>, FsError>> + '_>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn create<'a>(
        &'a self,
        _name: &'a str,
        _itype: InodeType,
        _perms: Permissions,
        _device: Option<DeviceNumber>,
    ) -> FsFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn unlink<'a>(&'a self, _name: &'a str) -> Pin<Box<dyn Future<Output = Result<(), FsError>> + 'a>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }
}

// ── registered block device node ─────────────────────────────────────────

/// A devfs node backed by a [`BlockDevice`], reading and writing through
/// the sector-granular bounce-buffer path of §4.6.
pub struct BlockDeviceNode {
    number: DeviceNumber,
    device: Arc<dyn BlockDevice>,
    perms: Permissions,
}

impl BlockDeviceNode {
    /// Creates a node over `device`.
    #[must_use]
    pub fn new(number: DeviceNumber, device: Arc<dyn BlockDevice>, perms: Permissions) -> Self {
        Self { number, device, perms }
    }
}

impl Inode for BlockDeviceNode {
    fn inode_type(&self) -> InodeType {
        InodeType::BlockDevice
    }

    fn size(&self) -> usize {
        (self.device.sector_count() * u64::from(self.device.sector_size())) as usize
    }

    fn permissions(&self) -> Permissions {
        self.perms
    }

    fn device_number(&self) -> Option<DeviceNumber> {
        Some(self.number)
    }

    fn read<'a>(&'a self, offset: usize, buf: &'a mut [u8]) -> FsFuture<'a, usize> {
        Box::pin(async move { block::read_bytes(self.device.as_ref(), offset, buf) })
    }

    fn write<'a>(&'a self, offset: usize, buf: &'a [u8]) -> FsFuture<'a, usize> {
        Box::pin(async move { block::write_bytes(self.device.as_ref(), offset, buf) })
    }

    fn lookup<'a>(&'a self, _name: &'a str) -> FsFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn readdir(&self) -> Pin<Box<dyn Future<Output = Result<Vec<DirEntry>, FsError>> + '_>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn create<'a>(
        &'a self,
        _name: &'a str,
        _itype: InodeType,
        _perms: Permissions,
        _device: Option<DeviceNumber>,
    ) -> FsFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn unlink<'a>(&'a self, _name: &'a str) -> Pin<Box<dyn Future<Output = Result<(), FsError>> + 'a>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: Future>(mut fut: F) -> F::Output {
        use core::task::{Context, Poll};
        let waker = astra_core_test_waker();
        let mut cx = Context::from_waker(&waker);
        // SAFETY: `fut` is not moved after this point.
        let mut fut = unsafe { Pin::new_unchecked(&mut fut) };
        loop {
            if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
                return v;
            }
        }
    }

    fn astra_core_test_waker() -> core::task::Waker {
        use core::task::{RawWaker, RawWakerVTable, Waker};
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(core::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        // SAFETY: every vtable function is a no-op; nothing reads the data
        // pointer.
        unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) }
    }

    #[test]
    fn null_reads_as_eof_and_discards_writes() {
        let null = DevNull;
        let mut buf = [1u8; 8];
        assert_eq!(block_on(null.read(0, &mut buf)), Ok(0));
        assert_eq!(block_on(null.write(0, b"hello")), Ok(5));
    }

    #[test]
    fn zero_fills_reads_and_discards_writes() {
        let zero = DevZero;
        let mut buf = [1u8; 8];
        assert_eq!(block_on(zero.read(0, &mut buf)), Ok(8));
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn devfs_root_lists_standard_devices() {
        let fs = DevFs::new();
        let entries = block_on(fs.root().readdir()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"null"));
        assert!(names.contains(&"zero"));
    }

    #[test]
    fn devfs_lookup_finds_registered_device() {
        let fs = DevFs::new();
        fs.add_device("console", Arc::new(DevNull));
        let found = block_on(fs.root().lookup("console"));
        assert!(found.is_ok());
    }

    #[test]
    fn char_device_node_dispatches_through_registry() {
        struct Echo;
        impl CharDevice for Echo {
            fn read<'a>(&'a self, _offset: usize, buf: &'a mut [u8]) -> FsFuture<'a, usize> {
                Box::pin(async move {
                    buf.fill(b'e');
                    Ok(buf.len())
                })
            }
            fn write<'a>(&'a self, _offset: usize, buf: &'a [u8]) -> FsFuture<'a, usize> {
                Box::pin(async move { Ok(buf.len()) })
            }
        }
        let registry = Arc::new(CharDriverRegistry::new());
        let major = registry.register(0, "echo", Arc::new(Echo)).unwrap();
        let node = CharDeviceNode::new(DeviceNumber::new(major, 0), registry, Permissions::read_write());
        let mut buf = [0u8; 4];
        assert_eq!(block_on(node.read(0, &mut buf)), Ok(4));
        assert_eq!(&buf, b"eeee");
    }

    struct FakeDisk {
        sectors: SpinLock<alloc::vec::Vec<u8>>,
    }
    impl BlockDevice for FakeDisk {
        fn sector_size(&self) -> u32 {
            512
        }
        fn sector_count(&self) -> u64 {
            (self.sectors.lock().len() / 512) as u64
        }
        fn queue(&self) -> &block::RequestQueue {
            unimplemented!("not exercised by this test")
        }
        fn read_sector_sync(&self, sector: u64, buf: &mut [u8]) -> Result<(), FsError> {
            let start = sector as usize * 512;
            buf.copy_from_slice(&self.sectors.lock()[start..start + 512]);
            Ok(())
        }
        fn write_sector_sync(&self, sector: u64, buf: &[u8]) -> Result<(), FsError> {
            let start = sector as usize * 512;
            self.sectors.lock()[start..start + 512].copy_from_slice(buf);
            Ok(())
        }
    }

    #[test]
    fn mknod_creates_a_block_node_backed_by_the_attached_device() {
        let fs = DevFs::new();
        let disk = Arc::new(FakeDisk { sectors: SpinLock::new(alloc::vec![0u8; 512]) });
        fs.block_registry().attach_device(1, disk).unwrap();

        let created = block_on(fs.root().create(
            "hda",
            InodeType::BlockDevice,
            Permissions::read_write(),
            Some(DeviceNumber::new(1, 0)),
        ))
        .unwrap();
        assert_eq!(created.inode_type(), InodeType::BlockDevice);

        let mut buf = [0u8; 512];
        assert_eq!(block_on(created.read(0, &mut buf)), Ok(512));

        let found = block_on(fs.root().lookup("hda")).unwrap();
        assert_eq!(found.inode_type(), InodeType::BlockDevice);
    }

    #[test]
    fn mknod_without_an_attached_device_reports_no_such_device() {
        let fs = DevFs::new();
        let result = block_on(fs.root().create(
            "hdb",
            InodeType::BlockDevice,
            Permissions::read_write(),
            Some(DeviceNumber::new(2, 0)),
        ));
        assert_eq!(result.err(), Some(FsError::NoSuchDevice));
    }

    #[test]
    fn mknod_rejects_a_name_that_already_exists() {
        let fs = DevFs::new();
        let result = block_on(fs.root().create(
            "null",
            InodeType::CharDevice,
            Permissions::read_write(),
            Some(DeviceNumber::new(5, 0)),
        ));
        assert_eq!(result.err(), Some(FsError::AlreadyExists));
    }
}
