//! The block I/O pipeline: major-number driver registry, per-device request
//! queues with coalescing, scatter-gather bios, bounce-buffered reads/writes,
//! and MBR partition discovery.
//!
//! Grounded on `register_blkdev`/`get_blkdev_driver`/`add_blkdev` (registry),
//! `make_request_blkdev`/`collate_requests` (request lifecycle and
//! coalescing), and `autopopulate_blkdev` (partition table). A bio here owns
//! its bytes directly (`Vec<u8>`) rather than a `{page, offset}` pair into a
//! physical page — this crate doesn't depend on `astra-mm`, and a boxed
//! buffer plays the same coalescing/completion role without that coupling.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use astra_core::config::{DEFAULT_SECTOR_SIZE, MAX_DEVICE_MAJORS};
use astra_core::sync::{SpinLock, WaitQueue};

use crate::error::FsError;

/// Direction of a block request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read sectors from the device.
    Read,
    /// Write sectors to the device.
    Write,
}

/// A contiguous scatter-gather fragment within a request.
#[derive(Debug, Clone)]
pub struct Bio {
    /// Byte offset into the request's overall transfer.
    pub offset: usize,
    /// Sector-aligned payload for this fragment.
    pub data: Vec<u8>,
}

/// Final outcome of a request, recorded once the driver stops servicing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestStatus {
    Pending,
    Finished,
    /// The driver reported a failure.
    Failed,
    /// The waiter's sleep was interrupted before completion.
    Intr,
}

struct RequestState {
    status: RequestStatus,
    /// Sectors serviced so far, advanced by `end_request`.
    done_sectors: u32,
}

/// A block I/O request: a run of sectors plus the bios that carry its data.
/// Queued on a [`RequestQueue`], serviced by the owning driver's tasklet,
/// and waited on via [`RequestQueue::wait`].
pub struct BlockRequest {
    /// Absolute sector this request starts at (partition offset already
    /// applied).
    pub first_sector: u64,
    /// Number of sectors. Grows when coalesced with a neighboring request.
    pub nsectors: SpinLock<u32>,
    /// Direction.
    pub direction: Direction,
    /// Scatter-gather fragments, concatenated on coalescing.
    pub bios: SpinLock<VecDeque<Bio>>,
    state: SpinLock<RequestState>,
    wq: WaitQueue,
}

impl BlockRequest {
    /// Creates a pending request for `nsectors` sectors starting at
    /// `first_sector`, carrying `bios`.
    #[must_use]
    pub fn new(first_sector: u64, nsectors: u32, direction: Direction, bios: Vec<Bio>) -> Arc<Self> {
        Arc::new(Self {
            first_sector,
            nsectors: SpinLock::new(nsectors),
            direction,
            bios: SpinLock::new(bios.into()),
            state: SpinLock::new(RequestState { status: RequestStatus::Pending, done_sectors: 0 }),
            wq: WaitQueue::new(),
        })
    }

    /// Whether this request directly abuts `other` (same direction, this
    /// request's sectors end exactly where `other`'s begin) — the merge
    /// condition from `collate_requests`.
    #[must_use]
    pub fn abuts(&self, other: &Self) -> bool {
        self.direction == other.direction
            && self.first_sector + u64::from(*self.nsectors.lock()) == other.first_sector
    }

    /// Merges `other` into `self`: extends the sector count and concatenates
    /// bio lists. Caller must have already confirmed [`Self::abuts`].
    pub fn merge(&self, other: &Self) {
        *self.nsectors.lock() += *other.nsectors.lock();
        self.bios.lock().extend(other.bios.lock().drain(..));
    }

    /// Called by the driver's tasklet as sectors are serviced. Mirrors
    /// `end_request`: advances the completed-sector count, drops bios that
    /// lie entirely within the now-completed range, and marks the request
    /// `Finished` (or `Failed`, if `ok` is false) once every sector is
    /// accounted for. Wakes every waiter either way.
    pub fn end_request(&self, ok: bool, nsectors: u32) {
        let mut state = self.state.lock();
        if !ok {
            state.status = RequestStatus::Failed;
            self.wq.wake_all();
            return;
        }
        state.done_sectors += nsectors;
        let total = *self.nsectors.lock();
        if state.done_sectors >= total {
            state.status = RequestStatus::Finished;
        }
        drop(state);
        self.wq.wake_all();
    }

    /// Marks a sleeping waiter as interrupted (e.g. a signal-equivalent
    /// external event), per §4.6's `INTR` status.
    pub fn interrupt(&self) {
        self.state.lock().status = RequestStatus::Intr;
        self.wq.wake_all();
    }

    fn status(&self) -> RequestStatus {
        self.state.lock().status
    }
}

/// A device's pending-request queue: sorted insertion, coalescing, and the
/// waitqueue-based completion protocol. Mirrors `make_request_blkdev` plus
/// `collate_requests`.
pub struct RequestQueue {
    pending: SpinLock<VecDeque<Arc<BlockRequest>>>,
}

impl RequestQueue {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: SpinLock::new(VecDeque::new()) }
    }

    /// Inserts `request` in `first_sector` order, then runs a coalescing
    /// pass merging it with an immediately-adjacent, same-direction
    /// neighbor.
    pub fn post(&self, request: Arc<BlockRequest>) {
        let mut pending = self.pending.lock();
        let insert_at = pending
            .iter()
            .position(|queued| queued.first_sector > request.first_sector)
            .unwrap_or(pending.len());
        pending.insert(insert_at, request);
        Self::collate(&mut pending);
    }

    /// One coalescing pass over the queue: merges every pair of adjacent
    /// entries where the earlier request's sectors end exactly where the
    /// later one begins and their directions match.
    fn collate(pending: &mut VecDeque<Arc<BlockRequest>>) {
        let mut i = 0;
        while i + 1 < pending.len() {
            if pending[i].abuts(&pending[i + 1]) {
                pending[i].merge(&pending[i + 1]);
                pending.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }

    /// Pops the head request for the driver's tasklet to service.
    pub fn dequeue_head(&self) -> Option<Arc<BlockRequest>> {
        self.pending.lock().pop_front()
    }

    /// Blocks until `request` leaves the `Pending` state. Mirrors
    /// `wait_request_blkdev`: returns `Ok(())` once `Finished`,
    /// `Err(FsError::IoError)` if the driver reported failure, and
    /// `Err(FsError::IoError)` (playing the role of `-EINTR` at this layer)
    /// if interrupted.
    pub async fn wait(request: &Arc<BlockRequest>) -> Result<(), FsError> {
        loop {
            match request.status() {
                RequestStatus::Finished => return Ok(()),
                RequestStatus::Failed | RequestStatus::Intr => return Err(FsError::IoError),
                RequestStatus::Pending => request.wq.wait().await,
            }
        }
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// A block device: fixed sector geometry plus a request queue a driver's
/// tasklet drains.
pub trait BlockDevice {
    /// Sector size in bytes (commonly [`DEFAULT_SECTOR_SIZE`]).
    fn sector_size(&self) -> u32;

    /// Total sectors on the device (or partition).
    fn sector_count(&self) -> u64;

    /// The device's request queue.
    fn queue(&self) -> &RequestQueue;

    /// Synchronous single-sector read, for bootstrap operations (MBR probe)
    /// that run before a filesystem — and hence the async executor driving
    /// ordinary request completion — is necessarily available.
    fn read_sector_sync(&self, sector: u64, buf: &mut [u8]) -> Result<(), FsError>;

    /// Synchronous single-sector write. Devices that are read-only (or
    /// whose driver only exposes the async request-queue path) may leave
    /// this at its default, which rejects every write.
    fn write_sector_sync(&self, _sector: u64, _buf: &[u8]) -> Result<(), FsError> {
        Err(FsError::ReadOnly)
    }
}

/// Reads `buf.len()` bytes starting at byte offset `off`, bounce-buffering
/// through whole sectors per §4.6. Returns the count actually read (short
/// reads at device end are not an error).
pub fn read_bytes(device: &dyn BlockDevice, off: usize, buf: &mut [u8]) -> Result<usize, FsError> {
    if buf.is_empty() {
        return Ok(0);
    }
    let sector_size = device.sector_size() as usize;
    let (aligned_offset, delta, len) = bounce_window(off, buf.len(), sector_size);
    let first_sector = (aligned_offset / sector_size) as u64;
    let nsectors = len / sector_size;

    let mut bounce = vec![0u8; len];
    for i in 0..nsectors {
        device.read_sector_sync(first_sector + i as u64, &mut bounce[i * sector_size..(i + 1) * sector_size])?;
    }

    let n = buf.len().min(len - delta);
    buf[..n].copy_from_slice(&bounce[delta..delta + n]);
    Ok(n)
}

/// Writes `buf` starting at byte offset `off`. Sectors fully covered by
/// `buf` are overwritten outright; a sector only partially covered (the
/// first or last) is read, patched, and written back — the read-modify-write
/// rule from §4.6.
pub fn write_bytes(device: &dyn BlockDevice, off: usize, buf: &[u8]) -> Result<usize, FsError> {
    if buf.is_empty() {
        return Ok(0);
    }
    let sector_size = device.sector_size() as usize;
    let (aligned_offset, delta, len) = bounce_window(off, buf.len(), sector_size);
    let first_sector = (aligned_offset / sector_size) as u64;
    let nsectors = len / sector_size;

    let mut bounce = vec![0u8; len];
    let last_sector_partial = (delta + buf.len()) % sector_size != 0;
    for i in 0..nsectors {
        let is_first = i == 0 && delta != 0;
        let is_last = i == nsectors - 1 && last_sector_partial;
        if is_first || is_last {
            device.read_sector_sync(first_sector + i as u64, &mut bounce[i * sector_size..(i + 1) * sector_size])?;
        }
    }

    bounce[delta..delta + buf.len()].copy_from_slice(buf);
    for i in 0..nsectors {
        device.write_sector_sync(first_sector + i as u64, &bounce[i * sector_size..(i + 1) * sector_size])?;
    }
    Ok(buf.len())
}

/// A single slot in the 256-entry major-number registry.
struct DriverSlot {
    name: &'static str,
    device: Option<Arc<dyn BlockDevice>>,
}

/// The major-number driver registry. Mirrors `blk_drivers[256]` /
/// `register_blkdev` / `get_blkdev_driver`.
pub struct BlockDriverRegistry {
    slots: SpinLock<[Option<DriverSlot>; MAX_DEVICE_MAJORS]>,
}

impl BlockDriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { slots: SpinLock::new(core::array::from_fn(|_| None)) }
    }

    /// Registers `name` under `major`, or the first free major if `major ==
    /// 0`. Returns the assigned major.
    pub fn register(&self, major: u8, name: &'static str) -> Result<u8, FsError> {
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
        *slot = Some(DriverSlot { name, device: None });
        Ok(assigned)
    }

    /// Returns the name registered under `major`, if any.
    #[must_use]
    pub fn name_of(&self, major: u8) -> Option<&'static str> {
        if major == 0 {
            return None;
        }
        self.slots.lock()[major as usize - 1].as_ref().map(|s| s.name)
    }

    /// Attaches the concrete device instance backing `major`, so a devfs
    /// node can be built from a bare `dev_t` (`mknod`) without the caller
    /// having the device handle in scope.
    pub fn attach_device(&self, major: u8, device: Arc<dyn BlockDevice>) -> Result<(), FsError> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(major as usize - 1).and_then(Option::as_mut).ok_or(FsError::NoSuchDevice)?;
        slot.device = Some(device);
        Ok(())
    }

    /// Returns the device instance attached to `major`, if any.
    #[must_use]
    pub fn device_of(&self, major: u8) -> Option<Arc<dyn BlockDevice>> {
        if major == 0 {
            return None;
        }
        self.slots.lock().get(major as usize - 1)?.as_ref()?.device.clone()
    }
}

impl Default for BlockDriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry discovered by [`autopopulate`] or configured statically: a
/// contiguous run of sectors relative to the parent device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// First sector, relative to the start of the device.
    pub rel_sector: u64,
    /// Number of sectors.
    pub nsectors: u64,
}

const MBR_PARTITION_TABLE_OFFSET: usize = 446;
const MBR_PARTITION_ENTRY_LEN: usize = 16;
const MBR_PARTITION_COUNT: usize = 4;
const MBR_SIGNATURE_OFFSET: usize = 510;
const MBR_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Reads the MBR from sector 0 and returns its partition table, per §4.6.
/// Validates the `0x55AA` signature; if it's missing, returns a single
/// partition spanning the whole device (mirrors `autopopulate_blkdev`'s
/// whole-disk fallback).
pub fn autopopulate(device: &dyn BlockDevice) -> Result<Vec<Partition>, FsError> {
    let sector_size = device.sector_size().max(DEFAULT_SECTOR_SIZE) as usize;
    let mut mbr = vec![0u8; sector_size];
    device.read_sector_sync(0, &mut mbr)?;

    if sector_size < MBR_SIGNATURE_OFFSET + 2
        || mbr[MBR_SIGNATURE_OFFSET..MBR_SIGNATURE_OFFSET + 2] != MBR_SIGNATURE
    {
        return Ok(vec![Partition { rel_sector: 0, nsectors: device.sector_count() }]);
    }

    let mut partitions = Vec::new();
    for i in 0..MBR_PARTITION_COUNT {
        let entry = &mbr[MBR_PARTITION_TABLE_OFFSET + i * MBR_PARTITION_ENTRY_LEN..][..MBR_PARTITION_ENTRY_LEN];
        let rel_sector = u32::from_le_bytes(entry[8..12].try_into().unwrap());
        let nsectors = u32::from_le_bytes(entry[12..16].try_into().unwrap());
        if rel_sector != 0 || nsectors != 0 {
            partitions.push(Partition { rel_sector: u64::from(rel_sector), nsectors: u64::from(nsectors) });
        }
    }

    if partitions.is_empty() {
        partitions.push(Partition { rel_sector: 0, nsectors: device.sector_count() });
    }
    Ok(partitions)
}

/// Splits a bounce buffer into page-sized scatter-gather bios, per §4.6's
/// assembly rule: one bio per contiguous region within a page, sized so it
/// never crosses a page boundary.
#[must_use]
pub fn assemble_bios(buffer: &[u8], page_size: usize) -> Vec<Bio> {
    let mut bios = Vec::new();
    let mut pos = 0;
    while pos < buffer.len() {
        let page_remaining = page_size - (pos % page_size);
        let chunk_len = page_remaining.min(buffer.len() - pos);
        bios.push(Bio { offset: pos, data: buffer[pos..pos + chunk_len].to_vec() });
        pos += chunk_len;
    }
    bios
}

/// Computes the bounce-buffer window `(aligned_offset, delta, byte_len)` for
/// a non-sector-aligned transfer of `count` bytes starting at `off`, per
/// §4.6: `delta = off mod sector_size`; the buffer covers
/// `ceil((count+delta)/sector_size)` whole sectors.
#[must_use]
pub fn bounce_window(off: usize, count: usize, sector_size: usize) -> (usize, usize, usize) {
    let delta = off % sector_size;
    let aligned_offset = off - delta;
    let sectors = (count + delta).div_ceil(sector_size);
    (aligned_offset, delta, sectors * sector_size)
}
