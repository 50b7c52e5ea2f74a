//! VFS mount table, FS-driver registry, and refcounted `kopen`/`close_vfs`.
//!
//! Grounded on `vfs.c`: the flat `path -> filesystem` map plays the role of
//! `filesystem`'s mount tree (nested mounts fall out of
//! [`path::longest_prefix_match`] rather than an explicit tree walk — a
//! collapsed structure in the same spirit as the scheduler's single process
//! arena), `kopen`/`close_vfs` keep refcounts keyed by inode identity instead
//! of a field on a shared tree node, and `mount`/`umount` mirror the
//! driver-lookup, `get_super`, and `close_fs` dance.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicI64, Ordering};

use astra_core::sync::SpinLock;
use bitflags::bitflags;

use crate::block::BlockDevice;
use crate::error::FsError;
use crate::inode::{FileSystem, Inode, InodeType};
use crate::path;

bitflags! {
    /// Mount/unmount flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MountFlags: u32 {
        /// Unmount even if the mount has refcounted descendants.
        const MNT_DETACH = 0b01;
        /// Ask the filesystem driver to discard its own objections too.
        const MNT_FORCE = 0b10;
    }
}

/// A driver factory, registered by name, that produces a mounted
/// [`FileSystem`] instance. Mirrors `fs->get_super`.
pub trait FsDriver {
    /// Whether this driver requires a backing block device to mount.
    fn requires_device(&self) -> bool {
        true
    }

    /// Produces a mounted filesystem instance, given an optional backing
    /// device and the requested mount flags.
    fn get_super(
        &self,
        device: Option<Arc<dyn BlockDevice>>,
        flags: MountFlags,
    ) -> Result<Arc<dyn FileSystem>, FsError>;
}

struct MountEntry {
    fs: Arc<dyn FileSystem>,
    /// Pointer identity of the filesystem's root inode — never tracked in
    /// `open_count`, playing the role of the `refcount == -1` singleton
    /// sentinel.
    root_identity: usize,
}

fn inode_identity(inode: &Arc<dyn Inode>) -> usize {
    Arc::as_ptr(inode).cast::<()>() as usize
}

/// The virtual filesystem: mount table, driver registry, and open-node
/// refcounts.
pub struct Vfs {
    mounts: SpinLock<BTreeMap<String, MountEntry>>,
    drivers: SpinLock<BTreeMap<&'static str, Arc<dyn FsDriver>>>,
    /// Keyed by inode identity; each entry also remembers which mount's
    /// path the handle was opened under, so `umount` can tell a mount with
    /// refcounted descendants from one that merely has nested mounts.
    open_count: SpinLock<BTreeMap<usize, (String, i64)>>,
}

/// A handle returned by [`Vfs::kopen`]. Call [`Vfs::close_vfs`] with it when
/// done; dropping it without closing leaks its refcount entry (harmless —
/// the inode itself is still freed when every `Arc` clone drops — but
/// `umount`'s active-descendant check will see it as still open).
pub struct NodeHandle {
    /// The opened inode.
    pub inode: Arc<dyn Inode>,
    identity: usize,
    tracked: bool,
}

static OPEN_HANDLES: AtomicI64 = AtomicI64::new(0);

impl Vfs {
    /// Creates an empty VFS with no mounts or registered drivers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mounts: SpinLock::new(BTreeMap::new()),
            drivers: SpinLock::new(BTreeMap::new()),
            open_count: SpinLock::new(BTreeMap::new()),
        }
    }

    /// Registers a filesystem driver under `name` (`"devfs"`, `"fat32"`,
    /// ...), for later use by [`Self::mount`].
    pub fn register_driver(&self, name: &'static str, driver: Arc<dyn FsDriver>) {
        self.drivers.lock().insert(name, driver);
    }

    /// Mounts `fs_name` at `relpath` (canonicalized against `cwd`), backed
    /// by `device` if the driver requires one. Fails with
    /// [`FsError::Busy`] if the target path already carries a mount, or
    /// [`FsError::NoSuchDevice`] if the driver needs a device and none was
    /// given.
    pub fn mount(
        &self,
        cwd: &str,
        relpath: &str,
        fs_name: &str,
        device: Option<Arc<dyn BlockDevice>>,
        flags: MountFlags,
    ) -> Result<(), FsError> {
        let canonical = path::canonicalize(cwd, relpath);
        let driver = self.drivers.lock().get(fs_name).cloned().ok_or(FsError::NotFound)?;
        if driver.requires_device() && device.is_none() {
            return Err(FsError::NoSuchDevice);
        }

        let mut mounts = self.mounts.lock();
        if mounts.contains_key(&canonical) {
            return Err(FsError::Busy);
        }

        let fs = driver.get_super(device, flags)?;
        let root_identity = inode_identity(&fs.root());
        mounts.insert(canonical, MountEntry { fs, root_identity });
        Ok(())
    }

    /// Unmounts the filesystem mounted exactly at `relpath`. Rejects
    /// (`Busy`) if another mount is nested beneath it, or if the mount
    /// still has refcounted open handles beneath it, unless
    /// [`MountFlags::MNT_DETACH`] is set. Delegates the final say to the
    /// driver's [`FileSystem::close_fs`].
    pub fn umount(&self, cwd: &str, relpath: &str, flags: MountFlags) -> Result<(), FsError> {
        let canonical = path::canonicalize(cwd, relpath);
        let mut mounts = self.mounts.lock();
        if !mounts.contains_key(&canonical) {
            return Err(FsError::NotFound);
        }

        if !flags.contains(MountFlags::MNT_DETACH) {
            let nested_prefix = alloc::format!("{canonical}/");
            let has_nested_mount = mounts.keys().any(|key| key != &canonical && key.starts_with(&nested_prefix));
            let has_open_descendant = self.open_count.lock().values().any(|(mount_path, count)| *count > 0 && *mount_path == canonical);
            if has_nested_mount || has_open_descendant {
                return Err(FsError::Busy);
            }
        }

        let entry = mounts.get(&canonical).expect("checked above");
        entry.fs.close_fs(flags.contains(MountFlags::MNT_FORCE))?;
        mounts.remove(&canonical);
        Ok(())
    }

    /// Returns the mount-table key whose filesystem contains `abs_path`,
    /// the same lookup [`Self::resolve_with_depth`] uses to pick a root.
    fn mount_path_for(&self, abs_path: &str) -> Option<String> {
        let mounts = self.mounts.lock();
        let keys: alloc::vec::Vec<&str> = mounts.keys().map(String::as_str).collect();
        path::longest_prefix_match(abs_path, keys.into_iter()).map(ToString::to_string)
    }

    /// Resolves an absolute path to its inode, without tracking a refcount.
    /// Used internally by [`Self::kopen`] and available directly for
    /// read-only lookups (e.g. `stat`) that don't need to hold the node
    /// open.
    pub async fn resolve(&self, abs_path: &str) -> Result<Arc<dyn Inode>, FsError> {
        self.resolve_with_depth(abs_path, 0).await
    }

    async fn resolve_with_depth(&self, abs_path: &str, depth: u32) -> Result<Arc<dyn Inode>, FsError> {
        if depth > astra_core::config::MAX_SYMLINK_DEPTH {
            return Err(FsError::SymlinkLoop);
        }
        if !path::is_absolute(abs_path) {
            return Err(FsError::InvalidArgument);
        }

        let (root, remainder) = {
            let mounts = self.mounts.lock();
            let keys: alloc::vec::Vec<&str> = mounts.keys().map(String::as_str).collect();
            let mount_path = path::longest_prefix_match(abs_path, keys.into_iter()).ok_or(FsError::NotFound)?;
            let entry = mounts.get(mount_path).expect("key came from this map");
            (entry.fs.root(), path::strip_mount_prefix(abs_path, mount_path).to_string())
        };

        if remainder.is_empty() {
            return Ok(root);
        }

        let mut current = root;
        for component in path::components(&remainder) {
            current = current.lookup(component).await?;
            if current.inode_type() == InodeType::Symlink {
                let target = current.read_link()?;
                current = Box::pin(self.resolve_with_depth(&target, depth + 1)).await?;
            }
        }
        Ok(current)
    }

    /// Opens `relpath` (canonicalized against `cwd`), returning a refcounted
    /// handle. Mirrors `kopen`: each successful open increments the node's
    /// refcount, except for a mount's singleton root, which is never
    /// tracked.
    pub async fn kopen(&self, cwd: &str, relpath: &str) -> Result<NodeHandle, FsError> {
        let canonical = path::canonicalize(cwd, relpath);
        let inode = self.resolve(&canonical).await?;
        let identity = inode_identity(&inode);

        let is_singleton = self.mounts.lock().values().any(|entry| entry.root_identity == identity);
        if is_singleton {
            return Ok(NodeHandle { inode, identity, tracked: false });
        }

        let mount_path = self.mount_path_for(&canonical).unwrap_or_else(|| canonical.clone());
        let mut open_count = self.open_count.lock();
        open_count.entry(identity).or_insert_with(|| (mount_path, 0)).1 += 1;
        drop(open_count);
        OPEN_HANDLES.fetch_add(1, Ordering::Relaxed);
        Ok(NodeHandle { inode, identity, tracked: true })
    }

    /// Closes a handle opened by [`Self::kopen`], decrementing its
    /// refcount. A singleton (mount-root) handle is a no-op, per `kopen`'s
    /// `refcount == -1` convention.
    pub fn close_vfs(&self, handle: NodeHandle) {
        if !handle.tracked {
            return;
        }
        let mut open_count = self.open_count.lock();
        if let Some((_, count)) = open_count.get_mut(&handle.identity) {
            *count -= 1;
            if *count <= 0 {
                open_count.remove(&handle.identity);
            }
        }
        OPEN_HANDLES.fetch_sub(1, Ordering::Relaxed);
    }

    /// Total number of currently tracked open handles, across every mount.
    /// Exposed for `stat`/diagnostics and for tests asserting refcount
    /// symmetry.
    #[must_use]
    pub fn open_handle_count() -> i64 {
        OPEN_HANDLES.load(Ordering::Relaxed)
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devfs::DevFs;

    fn block_on<F: core::future::Future>(mut fut: F) -> F::Output {
        use core::pin::Pin;
        use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(core::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        let waker = unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) };
        let mut cx = Context::from_waker(&waker);
        let mut fut = unsafe { Pin::new_unchecked(&mut fut) };
        loop {
            if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
                return v;
            }
        }
    }

    struct DevFsDriver;
    impl FsDriver for DevFsDriver {
        fn requires_device(&self) -> bool {
            false
        }
        fn get_super(&self, _device: Option<Arc<dyn BlockDevice>>, _flags: MountFlags) -> Result<Arc<dyn FileSystem>, FsError> {
            Ok(Arc::new(DevFs::new()))
        }
    }

    fn mounted_vfs() -> Vfs {
        let vfs = Vfs::new();
        vfs.register_driver("devfs", Arc::new(DevFsDriver));
        vfs.mount("/", "/dev", "devfs", None, MountFlags::empty()).unwrap();
        vfs
    }

    #[test]
    fn mount_then_resolve_finds_device_node() {
        let vfs = mounted_vfs();
        let inode = block_on(vfs.resolve("/dev/null")).unwrap();
        assert_eq!(inode.inode_type(), InodeType::CharDevice);
    }

    #[test]
    fn mount_twice_at_same_path_is_rejected() {
        let vfs = mounted_vfs();
        assert_eq!(
            vfs.mount("/", "/dev", "devfs", None, MountFlags::empty()),
            Err(FsError::Busy)
        );
    }

    #[test]
    fn mount_with_unknown_driver_name_is_not_found() {
        let vfs = Vfs::new();
        assert_eq!(
            vfs.mount("/", "/dev", "nonexistent", None, MountFlags::empty()),
            Err(FsError::NotFound)
        );
    }

    #[test]
    fn kopen_then_close_returns_refcount_to_zero() {
        let vfs = mounted_vfs();
        let before = Vfs::open_handle_count();
        let handle = block_on(vfs.kopen("/", "/dev/null")).unwrap();
        assert_eq!(Vfs::open_handle_count(), before + 1);
        vfs.close_vfs(handle);
        assert_eq!(Vfs::open_handle_count(), before);
    }

    #[test]
    fn kopen_mount_root_is_a_singleton_never_tracked() {
        let vfs = mounted_vfs();
        let before = Vfs::open_handle_count();
        let handle = block_on(vfs.kopen("/", "/dev")).unwrap();
        assert_eq!(Vfs::open_handle_count(), before);
        vfs.close_vfs(handle);
        assert_eq!(Vfs::open_handle_count(), before);
    }

    #[test]
    fn umount_rejects_nested_mount_without_detach() {
        let vfs = mounted_vfs();
        vfs.register_driver("devfs2", Arc::new(DevFsDriver));
        vfs.mount("/", "/dev/sub", "devfs2", None, MountFlags::empty()).unwrap();
        assert_eq!(vfs.umount("/", "/dev", MountFlags::empty()), Err(FsError::Busy));
        assert!(vfs.umount("/", "/dev", MountFlags::MNT_DETACH).is_ok());
    }

    #[test]
    fn umount_rejects_a_mount_with_an_open_handle_without_detach() {
        let vfs = mounted_vfs();
        let handle = block_on(vfs.kopen("/", "/dev/null")).unwrap();
        assert_eq!(vfs.umount("/", "/dev", MountFlags::empty()), Err(FsError::Busy));
        vfs.close_vfs(handle);
        assert!(vfs.umount("/", "/dev", MountFlags::empty()).is_ok());
    }

    #[test]
    fn umount_with_detach_ignores_open_handles() {
        let vfs = mounted_vfs();
        let _handle = block_on(vfs.kopen("/", "/dev/null")).unwrap();
        assert!(vfs.umount("/", "/dev", MountFlags::MNT_DETACH).is_ok());
    }

    #[test]
    fn umount_unknown_path_is_not_found() {
        let vfs = mounted_vfs();
        assert_eq!(vfs.umount("/", "/nope", MountFlags::empty()), Err(FsError::NotFound));
    }

    #[test]
    fn relative_resolve_joins_cwd() {
        let vfs = mounted_vfs();
        let inode = block_on(vfs.resolve(&path::canonicalize("/dev", "zero"))).unwrap();
        assert_eq!(inode.inode_type(), InodeType::CharDevice);
    }
}
